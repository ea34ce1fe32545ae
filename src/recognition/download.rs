use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

fn model_filename(model_name: &str) -> String {
    format!("ggml-{model_name}.bin")
}

/// Download the model on first run; returns true if a download happened
///
/// # Errors
/// Returns error if the download or the file write fails
pub fn ensure_model(model_name: &str, model_path: &Path) -> Result<bool> {
    if model_path.exists() {
        tracing::debug!(path = %model_path.display(), "model present");
        return Ok(false);
    }

    tracing::info!(
        model = model_name,
        path = %model_path.display(),
        "model not found, downloading"
    );

    fetch_model(model_name, model_path)?;
    Ok(true)
}

fn fetch_model(model_name: &str, model_path: &Path) -> Result<()> {
    let url = format!("{}/{}", MODEL_BASE_URL, model_filename(model_name));

    if let Some(parent) = model_path.parent() {
        fs::create_dir_all(parent).context("failed to create model directory")?;
    }

    let mut response = reqwest::blocking::get(&url)
        .with_context(|| format!("failed to download model from {url}"))?;
    if !response.status().is_success() {
        anyhow::bail!("download failed with status {}: {}", response.status(), url);
    }

    // Download into a sibling temp file; the rename makes the model appear
    // atomically and a crashed download never leaves a half-written model.
    let temp_path = model_path.with_extension("part");
    let mut file = fs::File::create(&temp_path)
        .with_context(|| format!("failed to create {}", temp_path.display()))?;
    let written = response
        .copy_to(&mut file)
        .context("failed to stream model to disk")?;
    drop(file);

    fs::rename(&temp_path, model_path).with_context(|| {
        format!(
            "failed to rename {} to {}",
            temp_path.display(),
            model_path.display()
        )
    })?;

    tracing::info!(path = %model_path.display(), bytes = written, "model downloaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_filename() {
        assert_eq!(model_filename("tiny"), "ggml-tiny.bin");
        assert_eq!(model_filename("small"), "ggml-small.bin");
    }

    #[test]
    fn test_existing_model_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("ggml-small.bin");
        fs::write(&model_path, b"model bytes").unwrap();

        let downloaded = ensure_model("small", &model_path).unwrap();
        assert!(!downloaded);
    }

    #[test]
    fn test_invalid_model_name_fails() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("ggml-bogus.bin");

        let result = fetch_model("model-that-does-not-exist-xyz", &model_path);
        assert!(result.is_err());
        assert!(!model_path.exists());
    }

    #[test]
    #[ignore = "requires network access and downloads a large file"]
    fn test_download_tiny_model() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("ggml-tiny.bin");

        let downloaded = ensure_model("tiny", &model_path).unwrap();
        assert!(downloaded);
        assert!(model_path.exists());
        assert!(fs::metadata(&model_path).unwrap().len() > 0);
    }
}
