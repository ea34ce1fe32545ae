use anyhow::{Context, Result};
use arboard::Clipboard;

/// Copy the transcript to the system clipboard
///
/// # Errors
/// Returns error if the clipboard is unavailable or the write fails
pub fn copy_text(text: &str) -> Result<()> {
    let mut clipboard = Clipboard::new().context("failed to access clipboard")?;
    clipboard
        .set_text(text)
        .context("failed to copy text to clipboard")?;
    Ok(())
}
