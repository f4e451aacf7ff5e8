// ABOUTME: Property tests for secret redaction.
// ABOUTME: No secret value survives masking, whatever text surrounds it.

use proptest::prelude::*;
use wharf::redact::{MASK, Redactor};
use wharf::transport::{Collect, LineSink, OutputStream};

proptest! {
    #[test]
    fn masked_text_never_contains_a_secret(
        secrets in prop::collection::vec("[a-zA-Z0-9]{3,12}", 1..4),
        prefix in "[a-z0-9 =]{0,20}",
        suffix in "[a-z0-9 =]{0,20}",
    ) {
        let redactor = Redactor::new(secrets.iter().cloned());
        let text = format!("{}{}{}", prefix, secrets.join(" "), suffix);

        let masked = redactor.redact(&text);

        for secret in &secrets {
            prop_assert!(!masked.contains(secret.as_str()), "{:?} leaked in {:?}", secret, masked);
        }
        prop_assert!(masked.contains(MASK));
    }

    #[test]
    fn sink_lines_are_masked_on_both_streams(
        secret in "[a-zA-Z0-9]{6,16}",
        lines in prop::collection::vec("[a-z ]{0,10}", 1..5),
    ) {
        let redactor = Redactor::new([secret.clone()]);
        let mut sink = redactor.sink(Collect::default());
        for line in &lines {
            sink.line(OutputStream::Stdout, &format!("{line}{secret}"));
            sink.line(OutputStream::Stderr, &format!("{secret}{line}"));
        }
        let collected = sink.into_inner();

        prop_assert!(!collected.stdout.contains(&secret));
        prop_assert!(!collected.stderr.contains(&secret));
    }

    #[test]
    fn text_without_secrets_is_unchanged(text in "[a-z ]{0,40}") {
        let redactor = Redactor::new(["S3CRET"]);
        prop_assert_eq!(redactor.redact(&text), text.as_str());
    }
}
