// ABOUTME: Renders environment variables into the host's env file.
// ABOUTME: Content goes over stdin into a temp sibling, is size-checked, then renamed into place.

use serde::Serialize;
use std::time::Duration;

use crate::deploy::DeployError;
use crate::environment::{Layout, Variables};
use crate::shell::quote;
use crate::transport::{LineSink, RemoteCommand, RemoteSession, Tail, TransportError, execute};

/// Exit code the write script uses when the received size does not match.
const SHORT_WRITE_EXIT: i32 = 65;

/// Result of a successful materialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializeOutcome {
    /// Live env file path on the host.
    pub path: String,
    /// Number of variables written.
    pub variables: usize,
    pub bytes: usize,
}

/// Render `KEY=VALUE` lines sorted by key.
pub fn render(variables: &Variables) -> Result<String, DeployError> {
    let mut content = String::new();
    for (name, var) in variables.iter() {
        if var.value.contains(['\n', '\r']) {
            return Err(DeployError::MaterializeFailed(format!(
                "value of {} contains a newline",
                name
            )));
        }
        content.push_str(name.as_str());
        content.push('=');
        content.push_str(&var.value);
        content.push('\n');
    }
    Ok(content)
}

fn write_script(layout: &Layout, expected: usize) -> String {
    let live = quote(&layout.env_file()).into_owned();
    let source = quote(&layout.source()).into_owned();
    format!(
        "set -e\n\
         umask 077\n\
         mkdir -p {shared}\n\
         tmp={tmp}\n\
         trap 'rm -f \"$tmp\"' EXIT\n\
         cat > \"$tmp\"\n\
         actual=$(wc -c < \"$tmp\" | tr -d ' ')\n\
         if [ \"$actual\" != {expected} ]; then\n\
         \x20 echo \"received $actual of {expected} bytes\" >&2\n\
         \x20 exit {SHORT_WRITE_EXIT}\n\
         fi\n\
         mv -f \"$tmp\" {live}\n\
         if [ -d {source} ]; then ln -sfn {live} {link}; fi\n",
        shared = quote(&layout.shared()),
        tmp = quote(&format!("{}.tmp", layout.env_file())),
        link = quote(&layout.env_link()),
    )
}

/// Write the env file for `variables` on the host.
///
/// The previous file stays intact on any failure. The content only ever
/// travels on stdin, so it never appears in a command line or log.
pub async fn materialize(
    session: &dyn RemoteSession,
    layout: &Layout,
    variables: &Variables,
    timeout: Duration,
    sink: &mut dyn LineSink,
) -> Result<MaterializeOutcome, DeployError> {
    let content = render(variables)?;
    let bytes = content.len();
    let script = write_script(layout, bytes);

    tracing::debug!(
        host = %session.label(),
        variables = variables.len(),
        bytes,
        "writing {}",
        layout.env_file()
    );

    let mut tail = Tail::new(sink);
    let command = RemoteCommand::new(&script, timeout).stdin(content.as_bytes());
    let status = match execute(session, command, &mut tail).await {
        Ok(status) => status,
        Err(e) if e.is_connection_loss() => {
            return Err(DeployError::UnreachableHost {
                host: session.label().to_string(),
                reason: e.to_string(),
            });
        }
        Err(TransportError::Timeout(t)) => {
            return Err(DeployError::MaterializeFailed(format!(
                "timed out after {:?}",
                t
            )));
        }
        Err(e) => return Err(DeployError::MaterializeFailed(e.to_string())),
    };

    if !status.success() {
        let reason = match (status.code(), tail.detail()) {
            (Some(SHORT_WRITE_EXIT), Some(detail)) => format!("short write: {}", detail),
            (_, Some(detail)) => format!("{}: {}", status, detail),
            (_, None) => status.to_string(),
        };
        return Err(DeployError::MaterializeFailed(reason));
    }

    Ok(MaterializeOutcome {
        path: layout.env_file(),
        variables: variables.len(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VariableName;

    fn vars(pairs: &[(&str, &str, bool)]) -> Variables {
        let mut vars = Variables::new();
        for (k, v, secret) in pairs {
            vars.insert(VariableName::new(k).unwrap(), *v, *secret);
        }
        vars
    }

    #[test]
    fn renders_sorted_lines() {
        let content = render(&vars(&[
            ("HTTP_PORT", "4000", false),
            ("DB_DSN", "postgres://db/app", true),
        ]))
        .unwrap();
        assert_eq!(content, "DB_DSN=postgres://db/app\nHTTP_PORT=4000\n");
    }

    #[test]
    fn rejects_multiline_values() {
        let err = render(&vars(&[("KEY", "a\nb", false)])).unwrap_err();
        assert!(matches!(err, DeployError::MaterializeFailed(_)));
    }

    #[test]
    fn empty_variables_render_empty_file() {
        assert_eq!(render(&Variables::new()).unwrap(), "");
    }

    #[test]
    fn script_uses_umask_and_rename() {
        let layout = Layout::new("/srv/app").unwrap();
        let script = write_script(&layout, 42);
        assert!(script.contains("umask 077"));
        assert!(script.contains("tmp=/srv/app/shared/.envrc.tmp"));
        assert!(script.contains("!= 42"));
        assert!(script.contains("mv -f \"$tmp\" /srv/app/shared/.envrc"));
        assert!(script.contains("ln -sfn /srv/app/shared/.envrc /srv/app/source/.envrc"));
    }
}
