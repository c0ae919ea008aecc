//! Built-in pre-processors

use super::Preprocessor;
use crate::error::BundleResult;

const BOM: char = '\u{feff}';

/// Drop a leading UTF-8 byte order mark
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix(BOM).unwrap_or(text)
}

/// Removes `sourceMappingURL` comments, which point at the wrong file once
/// sources are concatenated
#[derive(Debug, Clone, Copy, Default)]
pub struct StripSourceMapComments;

impl StripSourceMapComments {
    fn is_source_map_comment(line: &str) -> bool {
        let line = line.trim();
        ["//# sourceMappingURL=", "//@ sourceMappingURL="]
            .iter()
            .any(|marker| line.starts_with(marker))
            || (line.starts_with("/*# sourceMappingURL=") && line.ends_with("*/"))
    }
}

impl Preprocessor for StripSourceMapComments {
    fn name(&self) -> &str {
        "strip-source-maps"
    }

    fn transform(&self, input: &str, _path: &str) -> BundleResult<String> {
        if !input.contains("sourceMappingURL=") {
            return Ok(input.to_string());
        }

        let kept: Vec<&str> = input
            .lines()
            .filter(|line| !Self::is_source_map_comment(line))
            .collect();
        Ok(kept.join("\n"))
    }
}
