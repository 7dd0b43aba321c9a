use anyhow::{anyhow, Context, Result};
use client_core::Clipboard;

/// System clipboard, opened on first use so headless runs only fail when
/// something is actually copied.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl Clipboard for SystemClipboard {
    fn write_text(&mut self, text: &str) -> Result<()> {
        if self.inner.is_none() {
            self.inner = Some(arboard::Clipboard::new().context("failed to open system clipboard")?);
        }
        let Some(clipboard) = self.inner.as_mut() else {
            return Err(anyhow!("system clipboard unavailable"));
        };
        clipboard
            .set_text(text)
            .context("failed to write text to system clipboard")
    }
}
