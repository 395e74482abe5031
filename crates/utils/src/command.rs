//! Helpers intended for [`std::process::Command`] and related structures.

use std::process::{Command, Output, Stdio};

use anyhow::{Context, Result};

/// Helpers intended for [`std::process::Command`].
pub trait CommandRunExt {
    /// Log (at debug level) the full child commandline.
    fn log_debug(&mut self) -> &mut Self;

    /// Execute the child process, capturing its output. On failure the
    /// error carries the full commandline, the exit status and whatever
    /// the child wrote to stdout and stderr.
    fn run_capture_output(&mut self) -> Result<Output>;

    /// Execute the child process, discarding its output on success.
    fn run(&mut self) -> Result<()> {
        self.run_capture_output().map(drop)
    }

    /// Execute the child process and parse its stdout as a UTF-8 string.
    fn run_get_string(&mut self) -> Result<String> {
        let o = self.run_capture_output()?;
        String::from_utf8(o.stdout).context("Parsing child stdout as UTF-8")
    }

    /// Render the commandline the way a POSIX shell would accept it.
    /// Backslashes are escaped inside double quotes, so a Windows path
    /// such as `C:\layers` renders as `"C:\\layers"`.
    fn to_string_pretty(&self) -> String;
}

fn lossy_trimmed(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).trim_end().to_owned()
}

impl CommandRunExt for Command {
    fn log_debug(&mut self) -> &mut Self {
        tracing::debug!("exec: {}", self.to_string_pretty());
        self
    }

    fn run_capture_output(&mut self) -> Result<Output> {
        let cmdline = self.to_string_pretty();
        tracing::trace!("exec: {cmdline}");
        let output = self
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Spawning ({cmdline})"))?;
        if output.status.success() {
            return Ok(output);
        }
        let stdout = lossy_trimmed(&output.stdout);
        let stderr = lossy_trimmed(&output.stderr);
        let mut msg = format!(
            "Command ({cmdline}) failed: {}, output: {stdout}",
            output.status
        );
        if !stderr.is_empty() {
            msg.push_str(&format!("\nstderr: {stderr}"));
        }
        Err(anyhow::Error::msg(msg))
    }

    fn to_string_pretty(&self) -> String {
        std::iter::once(self.get_program())
            .chain(self.get_args())
            .map(|v| v.to_string_lossy())
            .map(|v| {
                shlex::try_quote(&v)
                    .map(|q| q.into_owned())
                    .unwrap_or_else(|_| v.into_owned())
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_run_ext() {
        Command::new("true").run().unwrap();
        assert!(Command::new("false").run().is_err());
        let s = Command::new("echo").args(["hello", "world"]).run_get_string().unwrap();
        assert_eq!(s.trim_end(), "hello world");
    }

    #[test]
    fn failure_carries_cmdline_and_output() {
        let e = Command::new("sh")
            .args(["-c", "echo partial write; echo oops >&2; exit 3"])
            .run()
            .unwrap_err();
        let msg = format!("{e:#}");
        assert!(msg.contains("sh -c 'echo partial write; echo oops >&2; exit 3'"), "{msg}");
        assert!(msg.contains("output: partial write"), "{msg}");
        assert!(msg.contains("stderr: oops"), "{msg}");
    }

    #[test]
    fn spawn_failure() {
        let e = Command::new("/nonexistent/uvmboot-tool")
            .arg("x")
            .run()
            .unwrap_err();
        let msg = format!("{e:#}");
        assert!(msg.starts_with("Spawning (/nonexistent/uvmboot-tool x)"), "{msg}");
    }

    #[test]
    fn pretty_quoting() {
        let mut c = Command::new("bcdedit.exe");
        c.args(["/store", r"C:\Boot Files\BCD", "/offline"]);
        similar_asserts::assert_eq!(
            c.to_string_pretty(),
            r#"bcdedit.exe /store "C:\\Boot Files\\BCD" /offline"#
        );
        // Backslashes alone force double quoting; braces are single quoted
        let mut c = Command::new("wclayer.exe");
        c.args(["activate", r"C:\layers", "{default}"]);
        similar_asserts::assert_eq!(
            c.to_string_pretty(),
            r#"wclayer.exe activate "C:\\layers" '{default}'"#
        );
    }
}
