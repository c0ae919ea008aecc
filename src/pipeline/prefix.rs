//! Vendor prefixing for combined stylesheets

use super::PostProcessor;
use crate::error::{BundleError, BundleResult};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};

/// Resolve browserslist queries (e.g. `"last 2 versions"`, `"ie 10"`).
///
/// Returns `None` for an empty list.
pub fn parse_browsers(queries: &[String]) -> BundleResult<Option<Browsers>> {
    let queries: Vec<&str> = queries
        .iter()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .collect();
    if queries.is_empty() {
        return Ok(None);
    }

    Browsers::from_browserslist(queries.iter().copied()).map_err(|e| {
        BundleError::transform("prefix", "style.prefix.browsers", e.to_string())
    })
}

/// Adds the vendor-prefixed fallbacks the target browsers need.
///
/// Output stays readable; only the minify stage strips whitespace.
#[derive(Debug, Clone)]
pub struct VendorPrefixer {
    browsers: Browsers,
}

impl VendorPrefixer {
    pub fn new(browsers: Browsers) -> Self {
        Self { browsers }
    }

    /// Build from browserslist queries; `None` when the list is empty
    pub fn from_queries(queries: &[String]) -> BundleResult<Option<Self>> {
        Ok(parse_browsers(queries)?.map(Self::new))
    }

    pub fn browsers(&self) -> &Browsers {
        &self.browsers
    }

    fn targets(&self) -> Targets {
        Targets::from(self.browsers.clone())
    }
}

impl PostProcessor for VendorPrefixer {
    fn name(&self) -> &str {
        "vendor-prefix"
    }

    fn process(&self, combined: &str) -> BundleResult<String> {
        let mut stylesheet = StyleSheet::parse(combined, ParserOptions::default())
            .map_err(|e| BundleError::transform("prefix", "<style bundle>", e.to_string()))?;

        // lightningcss inserts prefixes while lowering for targets
        stylesheet
            .minify(MinifyOptions {
                targets: self.targets(),
                ..MinifyOptions::default()
            })
            .map_err(|e| BundleError::transform("prefix", "<style bundle>", e.to_string()))?;

        let printed = stylesheet
            .to_css(PrinterOptions {
                minify: false,
                targets: self.targets(),
                ..PrinterOptions::default()
            })
            .map_err(|e| BundleError::transform("prefix", "<style bundle>", e.to_string()))?;

        Ok(printed.code)
    }
}
