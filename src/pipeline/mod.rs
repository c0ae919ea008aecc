//! Transform pipeline
//!
//! Every entry goes through the extension-keyed pre-processors before it is
//! concatenated. The combined text then goes through the post-processors
//! (vendor prefixing for styles) and finally the minifier.
//!
//! ```text
//! entry ─► preprocess* ─► concat ─► post-process* ─► minify ─► artifact
//! ```
//!
//! The registry is assembled once by `PipelineBuilder` and is immutable
//! afterwards.

pub mod builtin;
pub mod minify;
pub mod prefix;

use crate::bundle::ResourceKind;
use crate::error::BundleResult;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub use builtin::{strip_bom, StripSourceMapComments};
pub use minify::{Minifier, MinifyProfile, ScriptMinifier, StyleMinifier};
pub use prefix::{parse_browsers, VendorPrefixer};

/// Per-file text transform, keyed by file extension
pub trait Preprocessor: Send + Sync + fmt::Debug {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Transform one file's content. `path` is the resolved file path for
    /// local entries and the token for remote ones.
    fn transform(&self, input: &str, path: &str) -> BundleResult<String>;
}

/// Transform applied once to the concatenated bundle
pub trait PostProcessor: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn process(&self, combined: &str) -> BundleResult<String>;
}

/// Normalise an extension to lower case without the leading dot
fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn has_extension(name: &str, ext: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower
        .strip_suffix(ext)
        .is_some_and(|stem| stem.ends_with('.') && stem.len() > 1)
}

/// Ordered mapping from extension to pre-processors
#[derive(Debug, Clone, Default)]
pub struct PreprocessorRegistry {
    rules: Vec<(String, Vec<Arc<dyn Preprocessor>>)>,
}

impl PreprocessorRegistry {
    /// Extensions with at least one registration, in registration order
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(ext, _)| ext.as_str())
    }

    /// Whether `name` carries an extension some pre-processor is keyed on
    pub fn recognizes(&self, name: &str) -> bool {
        self.rules.iter().any(|(ext, _)| has_extension(name, ext))
    }

    /// Pre-processors for `name`, in registration order
    pub fn matching<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Arc<dyn Preprocessor>> {
        self.rules
            .iter()
            .filter(move |(ext, _)| has_extension(name, ext))
            .flat_map(|(_, processors)| processors.iter())
    }

    /// Run every matching pre-processor over `content`
    pub fn apply(&self, content: String, name: &str) -> BundleResult<String> {
        self.matching(name).try_fold(content, |text, processor| {
            debug!("Preprocessing {} with {}", name, processor.name());
            processor.transform(&text, name)
        })
    }

    fn register(&mut self, ext: &str, processor: Arc<dyn Preprocessor>) {
        let ext = normalize_extension(ext);
        match self.rules.iter_mut().find(|(existing, _)| *existing == ext) {
            Some((_, processors)) => processors.push(processor),
            None => self.rules.push((ext, vec![processor])),
        }
    }
}

/// Transform stages for one resource kind
#[derive(Debug, Clone)]
pub struct Pipeline {
    kind: ResourceKind,
    registry: PreprocessorRegistry,
    post_processors: Vec<Arc<dyn PostProcessor>>,
    minifier: Arc<dyn Minifier>,
}

impl Pipeline {
    /// Start a pipeline for `kind` with its default minifier and the
    /// built-in source-map stripper on the base extension
    pub fn builder(kind: ResourceKind) -> PipelineBuilder {
        PipelineBuilder::new(kind)
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn registry(&self) -> &PreprocessorRegistry {
        &self.registry
    }

    /// Whether a token names a local file of this kind
    pub fn is_local(&self, token: &str) -> bool {
        has_extension(token, self.kind.extension()) || self.registry.recognizes(token)
    }

    /// Per-file stage
    pub fn preprocess(&self, content: String, name: &str) -> BundleResult<String> {
        self.registry.apply(content, name)
    }

    /// Whole-bundle stage
    pub fn post_process(&self, combined: String) -> BundleResult<String> {
        self.post_processors
            .iter()
            .try_fold(combined, |text, processor| {
                debug!("Post-processing bundle with {}", processor.name());
                processor.process(&text)
            })
    }

    /// Final stage: aggressive minify, pass-through normalisation, or nothing
    pub fn finish(&self, combined: String, minify: bool, normalize: bool) -> BundleResult<String> {
        if minify {
            self.minifier.minify(&combined, MinifyProfile::Aggressive)
        } else if normalize {
            self.minifier.minify(&combined, MinifyProfile::PassThrough)
        } else {
            Ok(combined)
        }
    }
}

/// Assembles a `Pipeline`; the result is immutable
pub struct PipelineBuilder {
    kind: ResourceKind,
    registry: PreprocessorRegistry,
    post_processors: Vec<Arc<dyn PostProcessor>>,
    minifier: Arc<dyn Minifier>,
}

impl PipelineBuilder {
    fn new(kind: ResourceKind) -> Self {
        let mut registry = PreprocessorRegistry::default();
        registry.register(kind.extension(), Arc::new(StripSourceMapComments));

        let minifier: Arc<dyn Minifier> = match kind {
            ResourceKind::Script => Arc::new(ScriptMinifier),
            ResourceKind::Style => Arc::new(StyleMinifier::default()),
        };

        Self {
            kind,
            registry,
            post_processors: Vec::new(),
            minifier,
        }
    }

    /// Register a pre-processor for files ending in `.ext`
    pub fn preprocessor(mut self, ext: &str, processor: Arc<dyn Preprocessor>) -> Self {
        self.registry.register(ext, processor);
        self
    }

    pub fn post_processor(mut self, processor: Arc<dyn PostProcessor>) -> Self {
        self.post_processors.push(processor);
        self
    }

    pub fn minifier(mut self, minifier: Arc<dyn Minifier>) -> Self {
        self.minifier = minifier;
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            kind: self.kind,
            registry: self.registry,
            post_processors: self.post_processors,
            minifier: self.minifier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BundleError;

    #[derive(Debug)]
    struct Append(&'static str);

    impl Preprocessor for Append {
        fn name(&self) -> &str {
            self.0
        }

        fn transform(&self, input: &str, _path: &str) -> BundleResult<String> {
            Ok(format!("{}{}", input, self.0))
        }
    }

    #[derive(Debug)]
    struct Upper;

    impl PostProcessor for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn process(&self, combined: &str) -> BundleResult<String> {
            Ok(combined.to_uppercase())
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl Preprocessor for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn transform(&self, _input: &str, path: &str) -> BundleResult<String> {
            Err(BundleError::transform("failing", path, "bad input"))
        }
    }

    #[test]
    fn extension_matching() {
        assert!(has_extension("site.css", "css"));
        assert!(has_extension("SITE.CSS", "css"));
        assert!(has_extension("~/css/site.min.css", "css"));
        assert!(!has_extension("site.scss", "css"));
        assert!(!has_extension("css", "css"));
        assert!(!has_extension(".css", "css"));
        assert!(!has_extension("jquery", "js"));
    }

    #[test]
    fn base_extension_is_local() {
        let pipeline = Pipeline::builder(ResourceKind::Script).build();
        assert!(pipeline.is_local("app.js"));
        assert!(pipeline.is_local("*.js"));
        assert!(!pipeline.is_local("app.coffee"));
        assert!(!pipeline.is_local("jquery"));
    }

    #[test]
    fn registered_extension_is_local() {
        let pipeline = Pipeline::builder(ResourceKind::Style)
            .preprocessor(".LESS", Arc::new(Append("!")))
            .build();
        assert!(pipeline.is_local("theme.less"));
        assert_eq!(pipeline.registry().extensions().collect::<Vec<_>>(), vec!["css", "less"]);
    }

    #[test]
    fn preprocessors_run_in_registration_order() {
        let pipeline = Pipeline::builder(ResourceKind::Script)
            .preprocessor("js", Arc::new(Append("1")))
            .preprocessor("coffee", Arc::new(Append("x")))
            .preprocessor("js", Arc::new(Append("2")))
            .build();

        let out = pipeline.preprocess("a".to_string(), "lib/a.js").unwrap();
        assert_eq!(out, "a12");
    }

    #[test]
    fn unmatched_name_passes_through() {
        let pipeline = Pipeline::builder(ResourceKind::Script)
            .preprocessor("coffee", Arc::new(Append("x")))
            .build();
        let out = pipeline.preprocess("var a;".to_string(), "jquery").unwrap();
        assert_eq!(out, "var a;");
    }

    #[test]
    fn preprocessor_failure_propagates() {
        let pipeline = Pipeline::builder(ResourceKind::Script)
            .preprocessor("js", Arc::new(Failing))
            .build();
        let err = pipeline.preprocess("x".to_string(), "a.js").unwrap_err();
        assert!(matches!(err, BundleError::Transform { .. }));
    }

    #[test]
    fn post_processors_run_over_whole_bundle() {
        let pipeline = Pipeline::builder(ResourceKind::Style)
            .post_processor(Arc::new(Upper))
            .build();
        let out = pipeline.post_process("a {}\nb {}\n".to_string()).unwrap();
        assert_eq!(out, "A {}\nB {}\n");
    }

    #[test]
    fn finish_leaves_text_alone_without_flags() {
        let pipeline = Pipeline::builder(ResourceKind::Script).build();
        let text = "function  f ( value ) { return value; }\n".to_string();
        assert_eq!(pipeline.finish(text.clone(), false, false).unwrap(), text);
    }

    #[test]
    fn finish_normalizes_without_renaming() {
        let pipeline = Pipeline::builder(ResourceKind::Script).build();
        let out = pipeline
            .finish("function f( value ){return value}".to_string(), false, true)
            .unwrap();
        assert!(out.contains("value"));
    }
}
