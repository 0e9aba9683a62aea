//! OCR through an external `tesseract`-compatible executable.
//!
//! The image is streamed to the child's stdin and the recognized text read
//! from stdout (`<cmd> stdin stdout [-l <lang>]`). The child is killed if it
//! outlives `extract.ocr_timeout_secs`.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::ExtractConfig;
use crate::extract::ExtractError;

/// Run OCR over an encoded image and return the raw recognized text.
pub async fn image_to_string(image: &[u8], config: &ExtractConfig) -> Result<String, ExtractError> {
    let mut cmd = Command::new(&config.ocr_command);
    cmd.arg("stdin").arg("stdout");
    if let Some(lang) = &config.ocr_lang {
        cmd.args(["-l", lang]);
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        ExtractError::Ocr(format!("failed to run '{}': {}", config.ocr_command, e))
    })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| ExtractError::Ocr("child stdin unavailable".to_string()))?;
    let input = image.to_vec();
    // Feed stdin concurrently so a chatty child cannot block on a full stdout pipe.
    let writer = tokio::spawn(async move {
        let result = stdin.write_all(&input).await;
        drop(stdin);
        result
    });

    let output = tokio::time::timeout(
        Duration::from_secs(config.ocr_timeout_secs),
        child.wait_with_output(),
    )
    .await
    .map_err(|_| {
        ExtractError::Ocr(format!(
            "'{}' timed out after {}s",
            config.ocr_command, config.ocr_timeout_secs
        ))
    })??;

    if let Err(e) = writer.await? {
        tracing::debug!(error = %e, "OCR stdin closed early");
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractError::Ocr(format!(
            "'{}' exited with {}: {}",
            config.ocr_command,
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
