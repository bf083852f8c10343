//! External tool invocation and the startup dependency check.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::CodecConfig;
use crate::error::{PipelineError, PipelineResult, SetupError};

/// Run `program` with `args` and return its stdout.
///
/// A non-zero exit or spawn failure goes through `on_failure`; running past
/// `timeout_ms` kills the child and yields [`PipelineError::Timeout`].
pub(crate) async fn run_tool<I, S>(
    program: &str,
    args: I,
    timeout_ms: u64,
    path: &Path,
    stage: &str,
    on_failure: impl FnOnce(String) -> PipelineError,
) -> PipelineResult<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(Duration::from_millis(timeout_ms), command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(on_failure(format!("failed to run {program}: {e}"))),
        Err(_) => {
            return Err(PipelineError::Timeout {
                path: path.to_path_buf(),
                stage: stage.to_string(),
                timeout_ms,
            })
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(on_failure(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(output.stdout)
}

/// Platform-appropriate install command for the external backend.
pub fn install_hint() -> &'static str {
    if cfg!(target_os = "macos") {
        "brew install webp imagemagick"
    } else {
        "sudo apt-get install webp imagemagick"
    }
}

/// Verify every binary the external backend shells out to can be spawned.
pub async fn check_dependencies(codec: &CodecConfig) -> Result<(), SetupError> {
    let mut missing = Vec::new();
    for binary in [&codec.cwebp, &codec.identify, &codec.convert] {
        let spawned = Command::new(binary)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = spawned {
            tracing::debug!("Dependency check for {binary} failed: {e}");
            missing.push(binary.clone());
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SetupError::MissingTools {
            missing,
            install_hint: install_hint().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binaries_are_reported() {
        let codec = CodecConfig {
            cwebp: "squish-test-no-such-cwebp".into(),
            identify: "squish-test-no-such-identify".into(),
            convert: "squish-test-no-such-convert".into(),
            ..Default::default()
        };
        let err = check_dependencies(&codec).await.unwrap_err();
        let SetupError::MissingTools {
            missing,
            install_hint,
        } = err
        else {
            panic!("expected MissingTools");
        };
        assert_eq!(missing.len(), 3);
        assert!(install_hint.contains("webp imagemagick"));
    }

    #[tokio::test]
    async fn test_run_tool_spawn_failure_uses_on_failure() {
        let err = run_tool(
            "squish-test-no-such-binary",
            ["--help"],
            1000,
            Path::new("x.png"),
            "encode",
            |message| PipelineError::Codec {
                path: "x.png".into(),
                message,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Codec { .. }));
    }
}
