//! Minifiers
//!
//! Scripts go through oxc, styles through lightningcss. Both offer the same
//! two profiles:
//!
//! | Profile       | Scripts                                | Styles                       |
//! |---------------|----------------------------------------|------------------------------|
//! | `Aggressive`  | compress, mangle locals and arguments  | merge rules, drop whitespace |
//! | `PassThrough` | parse and re-print, names untouched    | parse and re-print           |

use crate::error::{BundleError, BundleResult};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{Minifier as OxcMinifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::fmt;

/// Minification strength
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinifyProfile {
    /// Smallest output; local names may be renamed
    Aggressive,
    /// Syntactic normalisation only
    PassThrough,
}

/// Final whole-bundle transform
pub trait Minifier: Send + Sync + fmt::Debug {
    fn minify(&self, input: &str, profile: MinifyProfile) -> BundleResult<String>;
}

/// oxc-based script minifier.
///
/// Input is parsed as a classic (non-module) script, so top-level
/// declarations are globals and keep their names under `Aggressive`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptMinifier;

impl Minifier for ScriptMinifier {
    fn minify(&self, input: &str, profile: MinifyProfile) -> BundleResult<String> {
        let allocator = Allocator::default();
        let source_type = SourceType::default().with_script(true);
        let parsed = Parser::new(&allocator, input, source_type).parse();

        if parsed.panicked || !parsed.errors.is_empty() {
            let reason = parsed
                .errors
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unrecoverable syntax error".to_string());
            return Err(BundleError::transform("minify", "<script bundle>", reason));
        }

        let mut program = parsed.program;
        let code = match profile {
            MinifyProfile::Aggressive => {
                let minified = OxcMinifier::new(MinifierOptions::default())
                    .minify(&allocator, &mut program);
                Codegen::new()
                    .with_options(CodegenOptions::minify())
                    .with_scoping(minified.scoping)
                    .build(&program)
                    .code
            }
            MinifyProfile::PassThrough => Codegen::new().build(&program).code,
        };

        Ok(code)
    }
}

/// lightningcss-based style minifier
#[derive(Debug, Clone, Default)]
pub struct StyleMinifier {
    browsers: Option<Browsers>,
}

impl StyleMinifier {
    /// Minify for the given browser targets so prefixes they need survive
    pub fn for_browsers(browsers: Option<Browsers>) -> Self {
        Self { browsers }
    }

    fn targets(&self) -> Targets {
        self.browsers.clone().map(Targets::from).unwrap_or_default()
    }
}

impl Minifier for StyleMinifier {
    fn minify(&self, input: &str, profile: MinifyProfile) -> BundleResult<String> {
        let mut stylesheet = StyleSheet::parse(input, ParserOptions::default())
            .map_err(|e| BundleError::transform("minify", "<style bundle>", e.to_string()))?;

        let aggressive = profile == MinifyProfile::Aggressive;
        if aggressive {
            stylesheet
                .minify(MinifyOptions {
                    targets: self.targets(),
                    ..MinifyOptions::default()
                })
                .map_err(|e| BundleError::transform("minify", "<style bundle>", e.to_string()))?;
        }

        let printed = stylesheet
            .to_css(PrinterOptions {
                minify: aggressive,
                targets: self.targets(),
                ..PrinterOptions::default()
            })
            .map_err(|e| BundleError::transform("minify", "<style bundle>", e.to_string()))?;

        Ok(printed.code)
    }
}
