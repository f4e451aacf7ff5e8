// ABOUTME: Local shell process execution with line-streamed, lossily decoded output.
// ABOUTME: Shared by local hook stages and the loopback transport.

use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::CommandStatus;
use super::lines::LineSplitter;
use super::sink::{LineSink, OutputStream};

const READ_CHUNK: usize = 8 * 1024;

/// Options for a local `sh -c` invocation.
#[derive(Debug, Default)]
pub struct ShellCommand<'a> {
    pub script: &'a str,
    pub cwd: Option<&'a Path>,
    pub envs: Vec<(String, String)>,
    pub stdin: Option<&'a [u8]>,
}

/// Run a shell script locally, streaming stdout and stderr lines to `sink`.
///
/// The child is killed if the returned future is dropped, which is how
/// timeouts and cancellation stop local commands.
pub async fn run_shell(
    command: ShellCommand<'_>,
    sink: &mut dyn LineSink,
) -> std::io::Result<CommandStatus> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command.script)
        .envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(if command.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = command.cwd {
        cmd.current_dir(cwd);
    }

    let mut child = cmd.spawn()?;

    // Feed stdin from a separate task so a child that writes before it
    // reads cannot deadlock against us.
    let writer = match (child.stdin.take(), command.stdin) {
        (Some(mut stdin), Some(input)) => {
            let input = input.to_vec();
            Some(tokio::spawn(async move {
                let result = stdin.write_all(&input).await;
                drop(stdin);
                result
            }))
        }
        _ => None,
    };

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout was not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr was not captured"))?;

    let mut out_lines = LineSplitter::new(OutputStream::Stdout);
    let mut err_lines = LineSplitter::new(OutputStream::Stderr);
    let mut out_buf = vec![0u8; READ_CHUNK];
    let mut err_buf = vec![0u8; READ_CHUNK];
    let mut out_done = false;
    let mut err_done = false;

    while !(out_done && err_done) {
        tokio::select! {
            read = stdout.read(&mut out_buf), if !out_done => match read? {
                0 => out_done = true,
                n => out_lines.push(&out_buf[..n], sink),
            },
            read = stderr.read(&mut err_buf), if !err_done => match read? {
                0 => err_done = true,
                n => err_lines.push(&err_buf[..n], sink),
            },
        }
    }
    out_lines.finish(sink);
    err_lines.finish(sink);

    let status = child.wait().await?;

    if let Some(writer) = writer {
        match writer.await {
            Ok(Ok(())) => {}
            // The child may exit without draining stdin; its exit status
            // already tells the caller what happened.
            Ok(Err(e)) => tracing::debug!("stdin write to local command failed: {}", e),
            Err(e) => tracing::debug!("stdin writer task failed: {}", e),
        }
    }

    Ok(CommandStatus::from_exit_status(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Collect;

    #[tokio::test]
    async fn streams_both_streams_and_exit_code() {
        let mut collect = Collect::default();
        let status = run_shell(
            ShellCommand {
                script: "echo out; echo err >&2; exit 3",
                ..Default::default()
            },
            &mut collect,
        )
        .await
        .unwrap();

        assert_eq!(status.code(), Some(3));
        assert!(!status.success());
        assert_eq!(collect.stdout, "out\n");
        assert_eq!(collect.stderr, "err\n");
    }

    #[tokio::test]
    async fn invalid_utf8_is_decoded_lossily() {
        let mut collect = Collect::default();
        let status = run_shell(
            ShellCommand {
                script: "printf 'caf\\351\\n'; printf 'no newline'",
                ..Default::default()
            },
            &mut collect,
        )
        .await
        .unwrap();

        assert!(status.success());
        assert_eq!(collect.stdout, "caf\u{fffd}\nno newline\n");
    }

    #[tokio::test]
    async fn stdin_and_env_are_passed_through() {
        let mut collect = Collect::default();
        let status = run_shell(
            ShellCommand {
                script: "cat; echo \"$GREETING\"",
                envs: vec![("GREETING".to_string(), "hi".to_string())],
                stdin: Some(b"from stdin\n"),
                ..Default::default()
            },
            &mut collect,
        )
        .await
        .unwrap();

        assert!(status.success());
        assert_eq!(collect.stdout, "from stdin\nhi\n");
    }
}
