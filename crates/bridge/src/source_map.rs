use std::path::{Path, PathBuf};

/// Debugger-side path remapping (`target.source-map`), applied before looking up buffers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    mappings: Vec<(PathBuf, PathBuf)>,
}

impl SourceMap {
    pub const QUERY: &'static str = "settings show target.source-map";

    /// Parse the output of [`SourceMap::QUERY`]:
    ///
    /// ```text
    /// target.source-map (path-map) =
    /// [0] "/build/src" -> "/home/me/src"
    /// ```
    ///
    /// Mappings where either side is relative are ignored.
    pub fn parse(output: &str) -> Self {
        let mappings = output
            .lines()
            .skip(1)
            .filter_map(|line| {
                let (_, rest) = line.split_once('"')?;
                let rest = rest.trim_end().strip_suffix('"')?;
                let (from, to) = rest.split_once("\" -> \"")?;
                let (from, to) = (PathBuf::from(from), PathBuf::from(to));
                (from.is_absolute() && to.is_absolute()).then_some((from, to))
            })
            .collect();
        Self { mappings }
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Rewrite `path` through the longest matching prefix. Paths that only match a prefix
    /// exactly (nothing left after it) are returned unchanged.
    pub fn apply(&self, path: &Path) -> PathBuf {
        self.mappings
            .iter()
            .filter_map(|(from, to)| {
                let rest = path.strip_prefix(from).ok()?;
                (!rest.as_os_str().is_empty()).then(|| (from.components().count(), to.join(rest)))
            })
            .max_by_key(|(depth, _)| *depth)
            .map(|(_, mapped)| mapped)
            .unwrap_or_else(|| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = r#"target.source-map (path-map) =
[0] "/build" -> "/home/me/project"
[1] "/build/vendor" -> "/opt/vendor"
[2] "relative" -> "/ignored"
"#;

    #[test]
    fn parse_absolute_mappings() {
        let map = SourceMap::parse(OUTPUT);
        assert_eq!(map.mappings.len(), 2);
    }

    #[test]
    fn longest_prefix_wins() {
        let map = SourceMap::parse(OUTPUT);
        assert_eq!(
            map.apply(Path::new("/build/src/a.c")),
            PathBuf::from("/home/me/project/src/a.c")
        );
        assert_eq!(
            map.apply(Path::new("/build/vendor/lib.c")),
            PathBuf::from("/opt/vendor/lib.c")
        );
    }

    #[test]
    fn unmatched_paths_unchanged() {
        let map = SourceMap::parse(OUTPUT);
        assert_eq!(map.apply(Path::new("/other/a.c")), PathBuf::from("/other/a.c"));
        assert_eq!(map.apply(Path::new("/build")), PathBuf::from("/build"));
    }

    #[test]
    fn empty_setting() {
        assert!(SourceMap::parse("target.source-map (path-map) =\n").is_empty());
    }
}
