use std::collections::HashMap;

use crate::types::Pane;

/// Last content written to each pane
#[derive(Debug, Default)]
pub struct ContentCache {
    panes: HashMap<Pane, Vec<String>>,
}

impl ContentCache {
    pub fn is_current(&self, pane: Pane, lines: &[String]) -> bool {
        self.panes
            .get(&pane)
            .is_some_and(|cached| cached.as_slice() == lines)
    }

    pub fn store(&mut self, pane: Pane, lines: Vec<String>) {
        self.panes.insert(pane, lines);
    }

    pub fn get(&self, pane: Pane) -> Option<&[String]> {
        self.panes.get(&pane).map(Vec::as_slice)
    }

    /// Forget a pane so the next render writes it unconditionally
    pub fn invalidate(&mut self, pane: Pane) {
        self.panes.remove(&pane);
    }
}

/// Split text into buffer lines, prefixing each.
///
/// The last element continues whatever follows and is only prefixed when non-empty, so text
/// ending in a newline yields a trailing empty line for the next append to continue.
pub fn split_output(text: &str, prefix: &str) -> Vec<String> {
    let text = text.replace("\r\n", "\n");
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    let last = lines.len() - 1;
    for (i, line) in lines.iter_mut().enumerate() {
        if i < last || !line.is_empty() {
            line.insert_str(0, prefix);
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cache_tracks_last_write() {
        let mut cache = ContentCache::default();
        assert!(!cache.is_current(Pane::Locals, &[]));

        cache.store(Pane::Locals, lines(&["(int) x = 1"]));
        assert!(cache.is_current(Pane::Locals, &lines(&["(int) x = 1"])));
        assert!(!cache.is_current(Pane::Locals, &lines(&["(int) x = 2"])));
        assert!(!cache.is_current(Pane::Registers, &lines(&["(int) x = 1"])));

        cache.invalidate(Pane::Locals);
        assert!(cache.get(Pane::Locals).is_none());
    }

    #[test]
    fn split_keeps_trailing_partial_line() {
        assert_eq!(split_output("a\nb", "✓"), lines(&["✓a", "✓b"]));
        assert_eq!(split_output("a\r\nb\n", "✓"), lines(&["✓a", "✓b", ""]));
        assert_eq!(split_output("", "✗"), lines(&[""]));
        assert_eq!(split_output("\n", ""), lines(&["", ""]));
    }
}
