use std::{borrow::Cow, path::Path};

pub fn normalise_path(path: &Path) -> Cow<'_, Path> {
    // Try to expand tilde prefix to home directory
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return Cow::Owned(home.join(stripped));
        }
        tracing::warn!("cannot determine home directory, using path as-is");
    }
    Cow::Borrowed(path)
}

/// Join command tokens into one interpreter line, escaping spaces inside tokens
pub fn escape_tokens<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|token| token.as_ref().replace(' ', "\\ "))
        .collect::<Vec<_>>()
        .join(" ")
}
