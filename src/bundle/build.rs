//! Bundle orchestrator
//!
//! `Bundler` turns a `BundleRequest` into an artifact: fingerprint, take the
//! single-flight slot, then resolve, load, transform and concatenate every
//! entry in order. Entries load concurrently but are always appended in
//! request order.

use super::{BuildOptions, BuildStage, BundleRequest, ResourceKind};
use crate::audit::{AuditLog, RemoteDecision};
use crate::cache::{
    Artifact, BundleCache, Built, CacheStore, FileStore, MemoryStore, SourceMonitor,
};
use crate::config::{Config, ConfigManager};
use crate::error::{BundleError, BundleResult};
use crate::fingerprint::CacheKey;
use crate::pipeline::{
    parse_browsers, strip_bom, Pipeline, PostProcessor, Preprocessor, StyleMinifier,
    VendorPrefixer,
};
use crate::remote::{FetchLimits, Fetcher, HttpFetcher, Whitelist};
use crate::resolve::{LocalResolver, PathMapper, RootMapper};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Per-kind resolution and transform settings
struct KindSettings {
    resolver: LocalResolver,
    pipeline: Pipeline,
    normalize: bool,
}

struct Inner {
    cache: BundleCache,
    whitelist: Whitelist,
    fetcher: Arc<dyn Fetcher>,
    audit: AuditLog,
    allow_remote: bool,
    limits: FetchLimits,
    script: KindSettings,
    style: KindSettings,
    style_bundles: BTreeMap<String, Vec<String>>,
}

/// A resolved entry, ready to load
enum Source {
    Local { token: String, path: PathBuf },
    Remote { token: String, url: Url },
}

impl Source {
    fn token(&self) -> &str {
        match self {
            Self::Local { token, .. } | Self::Remote { token, .. } => token,
        }
    }
}

/// A loaded and preprocessed entry
struct Loaded {
    text: String,
    monitor: Option<SourceMonitor>,
}

/// Script and stylesheet bundler.
///
/// Cheap to clone; clones share the cache, whitelist and pipelines.
#[derive(Clone)]
pub struct Bundler {
    inner: Arc<Inner>,
}

impl Bundler {
    /// Start building a bundler from configuration
    pub fn builder(config: Config) -> BundlerBuilder {
        BundlerBuilder::new(config)
    }

    /// Return the artifact for `request`, building it at most once per key
    pub async fn bundle(&self, request: &BundleRequest) -> BundleResult<Artifact> {
        let key = request.key();
        let inner = Arc::clone(&self.inner);
        let owned = request.clone();

        let artifact = self
            .inner
            .cache
            .get_or_build(key, move || async move { inner.build(owned, key).await })
            .await?;

        debug!("Bundle {}: {}", key.short(), BuildStage::Done);
        Ok(artifact)
    }

    /// Bundle scripts
    pub async fn script<I, S>(&self, minify: bool, tokens: I) -> BundleResult<Artifact>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bundle(&BundleRequest::script(tokens).minified(minify))
            .await
    }

    /// Bundle stylesheets
    pub async fn style<I, S>(&self, minify: bool, tokens: I) -> BundleResult<Artifact>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bundle(&BundleRequest::style(tokens).minified(minify))
            .await
    }

    pub fn cache(&self) -> &BundleCache {
        &self.inner.cache
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.inner.whitelist
    }

    /// Tokens after style bundle expansion
    pub fn expand(&self, kind: ResourceKind, tokens: Vec<String>) -> Vec<String> {
        self.inner.expand(kind, tokens)
    }
}

impl Inner {
    fn settings(&self, kind: ResourceKind) -> &KindSettings {
        match kind {
            ResourceKind::Script => &self.script,
            ResourceKind::Style => &self.style,
        }
    }

    fn expand(&self, kind: ResourceKind, tokens: Vec<String>) -> Vec<String> {
        if kind != ResourceKind::Style || self.style_bundles.is_empty() {
            return tokens;
        }

        tokens
            .into_iter()
            .flat_map(|token| match self.style_bundles.get(&token) {
                Some(members) => {
                    debug!("Expanding style bundle {} ({} entries)", token, members.len());
                    members.clone()
                }
                None => vec![token],
            })
            .collect()
    }

    async fn build(&self, request: BundleRequest, key: CacheKey) -> BundleResult<Built> {
        let kind = request.kind;
        let settings = self.settings(kind);
        let mut options = BuildOptions {
            minify: request.minify,
            normalize: settings.normalize,
            cache_key: key,
            allow_remote: self.allow_remote,
            limits: self.limits,
            root_folder: None,
        };

        log_stage(&options, BuildStage::Expanding);
        let tokens = self.expand(kind, request.tokens);

        // The active root folder threads left to right, so resolution is
        // sequential and stops at the first failure.
        log_stage(&options, BuildStage::Resolving);
        let mut sources = Vec::with_capacity(tokens.len());
        let mut unresolved = None;
        for token in &tokens {
            match self.resolve_entry(settings, token, &mut options).await {
                Ok(source) => sources.push(source),
                Err(e) => {
                    unresolved = Some(entry_failed(token, e));
                    break;
                }
            }
        }

        // Entries ahead of an unresolved one still load so that an earlier
        // failure takes precedence.
        log_stage(&options, BuildStage::Loading);
        let results = join_all(
            sources
                .iter()
                .map(|source| self.load_entry(settings, source, &options)),
        )
        .await;

        let mut loaded = Vec::with_capacity(results.len());
        for (source, result) in sources.iter().zip(results) {
            loaded.push(result.map_err(|e| entry_failed(source.token(), e))?);
        }
        if let Some(failure) = unresolved {
            return Err(failure);
        }

        log_stage(&options, BuildStage::Concatenating);
        let mut combined = String::with_capacity(loaded.iter().map(|l| l.text.len() + 1).sum());
        let mut monitors: Vec<SourceMonitor> = Vec::new();
        for entry in loaded {
            combined.push_str(&entry.text);
            if !entry.text.ends_with('\n') {
                combined.push('\n');
            }
            if let Some(monitor) = entry.monitor {
                if !monitors.iter().any(|m| m.path == monitor.path) {
                    monitors.push(monitor);
                }
            }
        }

        let pipeline = settings.pipeline.clone();
        let finishing = options.clone();
        let artifact = tokio::task::spawn_blocking(move || {
            log_stage(&finishing, BuildStage::PostProcessing);
            let processed = pipeline.post_process(combined)?;
            log_stage(&finishing, BuildStage::Minifying);
            pipeline.finish(processed, finishing.minify, finishing.normalize)
        })
        .await
        .map_err(|e| BundleError::Internal(format!("bundle finishing task failed: {}", e)))?
        .map_err(|e| BundleError::build_failed("after concatenation", e))?;

        log_stage(&options, BuildStage::Caching);
        info!(
            "Built {} bundle {} ({} entries, {} bytes)",
            kind,
            key.short(),
            tokens.len(),
            artifact.len()
        );

        Ok(Built {
            artifact,
            monitors,
        })
    }

    async fn resolve_entry(
        &self,
        settings: &KindSettings,
        token: &str,
        options: &mut BuildOptions,
    ) -> BundleResult<Source> {
        if settings.pipeline.is_local(token) {
            let path = settings
                .resolver
                .resolve(token, options.root_folder.as_deref())
                .await?;
            if let Some(parent) = path.parent() {
                options.root_folder = Some(parent.to_path_buf());
            }
            debug!("Resolved {} to {}", token, path.display());
            return Ok(Source::Local {
                token: token.to_string(),
                path,
            });
        }

        let url = match self.whitelist.lookup(token) {
            Ok(url) => url.clone(),
            Err(e) => {
                self.audit
                    .remote(token, None, RemoteDecision::NotWhitelisted)
                    .await;
                return Err(e);
            }
        };

        if !options.allow_remote {
            self.audit
                .remote(token, Some(&url), RemoteDecision::Disabled)
                .await;
            return Err(BundleError::RemoteDisabled {
                token: token.to_string(),
            });
        }

        Ok(Source::Remote {
            token: token.to_string(),
            url,
        })
    }

    async fn load_entry(
        &self,
        settings: &KindSettings,
        source: &Source,
        options: &BuildOptions,
    ) -> BundleResult<Loaded> {
        match source {
            Source::Local { path, .. } => {
                // Captured before the read: an edit racing the read shows up
                // as a changed signature on the next lookup.
                let monitor = SourceMonitor::capture(path).await?;
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| BundleError::io(format!("reading {}", path.display()), e))?;

                let name = path.to_string_lossy();
                let raw = String::from_utf8(bytes).map_err(|e| {
                    BundleError::transform("decode", name.to_string(), e.to_string())
                })?;
                log_stage(options, BuildStage::Transforming);
                let text = settings
                    .pipeline
                    .preprocess(strip_bom(&raw).to_string(), &name)?;

                Ok(Loaded {
                    text,
                    monitor: Some(monitor),
                })
            }
            Source::Remote { token, url } => {
                debug!("Fetching {} from {}", token, url);
                let body = match self.fetcher.fetch(url, options.limits).await {
                    Ok(body) => body,
                    Err(e) => {
                        self.audit
                            .remote(token, Some(url), RemoteDecision::Failed { error: &e })
                            .await;
                        return Err(e);
                    }
                };
                self.audit
                    .remote(token, Some(url), RemoteDecision::Fetched { bytes: body.len() })
                    .await;

                log_stage(options, BuildStage::Transforming);
                let text = settings
                    .pipeline
                    .preprocess(strip_bom(&body).to_string(), token)?;

                Ok(Loaded {
                    text,
                    monitor: None,
                })
            }
        }
    }
}

fn log_stage(options: &BuildOptions, stage: BuildStage) {
    debug!("Bundle {}: {}", options.cache_key.short(), stage);
}

fn entry_failed(token: &str, error: BundleError) -> BundleError {
    BundleError::build_failed(format!("for entry '{}'", token), error)
}

/// Directory for persisted bundles
fn bundle_directory(configured: &str, mapper: &dyn PathMapper) -> PathBuf {
    let configured = configured.trim();
    if configured.is_empty() {
        ConfigManager::state_dir().join("bundles")
    } else if Path::new(configured).is_absolute() {
        PathBuf::from(configured)
    } else {
        mapper.map_path(configured)
    }
}

/// Assembles a `Bundler` from configuration plus host-supplied parts
pub struct BundlerBuilder {
    config: Config,
    mapper: Option<Arc<dyn PathMapper>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    store: Option<Arc<dyn CacheStore>>,
    audit: Option<AuditLog>,
    preprocessors: Vec<(ResourceKind, String, Arc<dyn Preprocessor>)>,
    post_processors: Vec<Arc<dyn PostProcessor>>,
}

impl BundlerBuilder {
    fn new(config: Config) -> Self {
        Self {
            config,
            mapper: None,
            fetcher: None,
            store: None,
            audit: None,
            preprocessors: Vec::new(),
            post_processors: Vec::new(),
        }
    }

    /// Override how `~/` paths map to the filesystem (default: `general.root`)
    pub fn path_mapper(mut self, mapper: Arc<dyn PathMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Register a pre-processor for `kind` files ending in `.ext`
    pub fn preprocessor(
        mut self,
        kind: ResourceKind,
        ext: &str,
        processor: Arc<dyn Preprocessor>,
    ) -> Self {
        self.preprocessors.push((kind, ext.to_string(), processor));
        self
    }

    /// Add a whole-bundle stylesheet transform, run after vendor prefixing
    pub fn style_post_processor(mut self, processor: Arc<dyn PostProcessor>) -> Self {
        self.post_processors.push(processor);
        self
    }

    /// Validate configuration and assemble the bundler
    pub fn build(self) -> BundleResult<Bundler> {
        let config = self.config;
        let whitelist = Whitelist::from_entries(&config.remote.whitelist)?;

        let mapper: Arc<dyn PathMapper> = match self.mapper {
            Some(mapper) => mapper,
            None => Arc::new(RootMapper::new(config.general.root.clone())),
        };
        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new()),
        };
        let store: Arc<dyn CacheStore> = match self.store {
            Some(store) => store,
            None if config.cache.persist => {
                let dir = bundle_directory(&config.cache.directory, mapper.as_ref());
                debug!("Persisting bundles under {}", dir.display());
                Arc::new(FileStore::new(dir))
            }
            None => Arc::new(MemoryStore::new()),
        };
        let audit = self.audit.unwrap_or_else(|| AuditLog::new(&config));

        let mut script = Pipeline::builder(ResourceKind::Script);
        let mut style = Pipeline::builder(ResourceKind::Style);
        for (kind, ext, processor) in self.preprocessors {
            match kind {
                ResourceKind::Script => script = script.preprocessor(&ext, processor),
                ResourceKind::Style => style = style.preprocessor(&ext, processor),
            }
        }

        let browsers = if config.style.prefix.enabled {
            parse_browsers(&config.style.prefix.browsers)?
        } else {
            None
        };
        if let Some(browsers) = browsers.clone() {
            style = style.post_processor(Arc::new(VendorPrefixer::new(browsers)));
        }
        for processor in self.post_processors {
            style = style.post_processor(processor);
        }
        style = style.minifier(Arc::new(StyleMinifier::for_browsers(browsers)));

        debug!(
            "Bundler ready: {} whitelisted tokens, remote downloads {}",
            whitelist.len(),
            if config.remote.allow_downloads {
                "enabled"
            } else {
                "disabled"
            }
        );

        let inner = Inner {
            cache: BundleCache::new(store, config.cache.expiration_days),
            whitelist,
            fetcher,
            audit,
            allow_remote: config.remote.allow_downloads,
            limits: FetchLimits::new(config.remote.max_bytes, config.remote.timeout_ms),
            script: KindSettings {
                resolver: LocalResolver::new(
                    Arc::clone(&mapper),
                    config.script.search_paths.clone(),
                ),
                pipeline: script.build(),
                normalize: config.script.normalize,
            },
            style: KindSettings {
                resolver: LocalResolver::new(mapper, config.style.search_paths.clone()),
                pipeline: style.build(),
                normalize: config.style.normalize,
            },
            style_bundles: config.style.bundles,
        };

        Ok(Bundler {
            inner: Arc::new(inner),
        })
    }
}
