use anyhow::Result;
use shared::domain::Theme;
use tracing::warn;

use crate::KeyValueStore;

/// Global theme key. Contains no `:` so it never overlaps a progress key.
pub const THEME_KEY: &str = "theme";

pub async fn load_theme<S: KeyValueStore + ?Sized>(store: &S) -> Theme {
    match store.get(THEME_KEY).await {
        Ok(Some(raw)) => raw.parse().unwrap_or_else(|error: String| {
            warn!(%error, "ignoring stored theme preference");
            Theme::default()
        }),
        Ok(None) => Theme::default(),
        Err(error) => {
            warn!(%error, "failed to read theme preference");
            Theme::default()
        }
    }
}

pub async fn save_theme<S: KeyValueStore + ?Sized>(store: &S, theme: Theme) -> Result<()> {
    store.set(THEME_KEY, theme.as_str()).await
}
