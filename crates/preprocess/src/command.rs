//! External-command preprocessor.
//!
//! Invokes a configured program with two positional arguments — the input
//! path and the output path — under a hard timeout. The program is expected
//! to write its result to the output path and exit zero.

use crate::error::{ErrorKind, Result};
use crate::Preprocessor;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Preprocessor shelling out to an external program.
///
/// # Examples
///
/// ```no_run
/// use docsink_preprocess::CommandPreprocessor;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pp = CommandPreprocessor::new(
///     ["ocrmypdf", "--force-ocr"],
///     Duration::from_secs(120),
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CommandPreprocessor {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandPreprocessor {
    /// Create a preprocessor from a command argv.
    ///
    /// The first element is the program; it is resolved through `PATH` at
    /// construction so a misconfiguration surfaces at startup instead of on
    /// the first file.
    pub fn new(argv: impl IntoIterator<Item = impl Into<String>>, timeout: Duration) -> Result<Self> {
        let mut argv = argv.into_iter().map(Into::into);
        let Some(program) = argv.next().filter(|p| !p.is_empty()) else {
            exn::bail!(ErrorKind::Spawn("empty preprocessor command".to_string()));
        };
        let program = which::which(&program).map_err(|e| ErrorKind::Spawn(format!("{program}: {e}")))?;
        Ok(Self {
            program,
            args: argv.collect(),
            timeout,
        })
    }

    fn output_path(input: &Path) -> PathBuf {
        // Sibling of the input so the two stay on one filesystem.
        let mut name = input.file_name().unwrap_or_default().to_os_string();
        name.push(".out");
        input.with_file_name(name)
    }
}

#[async_trait]
impl Preprocessor for CommandPreprocessor {
    fn name(&self) -> &str {
        "command"
    }

    async fn process(&self, input: &Path, original_name: &str) -> Result<PathBuf> {
        let output = Self::output_path(input);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(input)
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ErrorKind::Spawn(format!("{}: {e}", self.program.display())))?;

        let waited = tokio::time::timeout(self.timeout, child.wait_with_output()).await;
        let out = match waited {
            Ok(result) => result.map_err(ErrorKind::Io)?,
            Err(_elapsed) => {
                // wait_with_output consumed the child; kill_on_drop already
                // reaped it when the future was dropped by the timeout.
                let _ = tokio::fs::remove_file(&output).await;
                exn::bail!(ErrorKind::Timeout(self.timeout.as_secs()));
            },
        };
        if !out.status.success() {
            tracing::warn!(
                file = original_name,
                stderr = %String::from_utf8_lossy(&out.stderr),
                "Preprocessor failed",
            );
            let _ = tokio::fs::remove_file(&output).await;
            exn::bail!(ErrorKind::Exit(out.status.code().unwrap_or(-1)));
        }
        if !tokio::fs::try_exists(&output).await.map_err(ErrorKind::Io)? {
            exn::bail!(ErrorKind::Spawn(format!(
                "{} exited 0 but wrote no output for {original_name}",
                self.program.display()
            )));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_input(content: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.pdf");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_empty_command_rejected() {
        let argv: Vec<String> = vec![];
        assert!(CommandPreprocessor::new(argv, Duration::from_secs(1)).is_err());
        assert!(CommandPreprocessor::new([""], Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_unknown_program_rejected_at_construction() {
        let err = CommandPreprocessor::new(["definitely-not-a-real-binary-xyz"], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Spawn(_)));
    }

    #[tokio::test]
    async fn test_successful_transform() {
        let (_dir, input) = temp_input(b"payload");
        let pp = CommandPreprocessor::new(["cp"], Duration::from_secs(5)).unwrap();
        let output = pp.process(&input, "input.pdf").await.unwrap();
        assert_ne!(output, input);
        assert_eq!(std::fs::read(&output).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let (_dir, input) = temp_input(b"payload");
        let pp = CommandPreprocessor::new(["false"], Duration::from_secs(5)).unwrap();
        let err = pp.process(&input, "input.pdf").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Exit(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let (_dir, input) = temp_input(b"payload");
        // The positional paths land in $0/$1 and are ignored by the script.
        let pp = CommandPreprocessor::new(["sh", "-c", "sleep 30"], Duration::from_millis(50)).unwrap();
        let err = pp.process(&input, "input.pdf").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Timeout(_)));
    }

    #[tokio::test]
    async fn test_exit_zero_without_output() {
        let (_dir, input) = temp_input(b"payload");
        // `true` ignores its arguments and writes nothing.
        let pp = CommandPreprocessor::new(["true"], Duration::from_secs(5)).unwrap();
        assert!(pp.process(&input, "input.pdf").await.is_err());
    }
}
