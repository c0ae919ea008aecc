//! Local file resolution
//!
//! Resolves a path token to a file on disk:
//! 1. `~/...` tokens map through the host's `PathMapper`
//! 2. Other tokens containing a path separator resolve against the active
//!    root folder of the build (or the application root)
//! 3. Bare filenames (optionally with `*`, `?`, `[...]` wildcards) are
//!    searched recursively under every configured search path; the first
//!    match wins
//!
//! A path token must land under the application root or one of the search
//! paths once symlinks and `..` segments are resolved. Anything else is
//! reported as not found.

use crate::error::{BundleError, BundleResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Host capability that turns a virtual path into a real one
pub trait PathMapper: Send + Sync {
    /// Map `virtual_path` (e.g. `~/css`) to a filesystem path
    fn map_path(&self, virtual_path: &str) -> PathBuf;
}

/// Maps `~/` to a fixed application root directory.
///
/// A leading separator is relative to the root as well, so `/js/app.js`
/// maps to `<root>/js/app.js`.
#[derive(Debug, Clone)]
pub struct RootMapper {
    root: PathBuf,
}

impl RootMapper {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PathMapper for RootMapper {
    fn map_path(&self, virtual_path: &str) -> PathBuf {
        let trimmed = virtual_path.trim();
        let relative = trimmed
            .strip_prefix("~/")
            .or_else(|| trimmed.strip_prefix("~\\"))
            .or_else(|| trimmed.strip_prefix('~'))
            .unwrap_or(trimmed)
            .trim_start_matches(['/', '\\']);
        self.root.join(relative)
    }
}

/// Whether a token is a bare filename rather than a path
pub fn is_filename_only(token: &str) -> bool {
    !token.contains('/') && !token.contains('\\')
}

fn is_virtual(token: &str) -> bool {
    token.starts_with("~/") || token.starts_with("~\\")
}

fn has_wildcards(token: &str) -> bool {
    token.contains(['*', '?', '['])
}

/// Resolves tokens for one resource kind against its search paths
pub struct LocalResolver {
    mapper: Arc<dyn PathMapper>,
    search_paths: Vec<String>,
}

impl LocalResolver {
    pub fn new(mapper: Arc<dyn PathMapper>, search_paths: Vec<String>) -> Self {
        Self {
            mapper,
            search_paths,
        }
    }

    /// Resolve `token` to the first matching file.
    ///
    /// `root_hint` is the directory of the previously resolved local file in
    /// the same build, used for relative paths.
    pub async fn resolve(&self, token: &str, root_hint: Option<&Path>) -> BundleResult<PathBuf> {
        let candidates = self.candidates(token, root_hint).await?;

        if candidates.len() > 1 {
            debug!(
                "{} matches for {}, using {}",
                candidates.len(),
                token,
                candidates[0].display()
            );
        }

        candidates
            .into_iter()
            .next()
            .ok_or_else(|| BundleError::LocalFileNotFound {
                token: token.to_string(),
                searched: self.describe_search(token, root_hint),
            })
    }

    /// Every file `token` could refer to, in search-path declaration order
    pub async fn candidates(
        &self,
        token: &str,
        root_hint: Option<&Path>,
    ) -> BundleResult<Vec<PathBuf>> {
        if !is_filename_only(token) {
            let path = self.direct_path(token, root_hint);
            let exists = tokio::fs::metadata(&path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false);
            if !exists {
                return Ok(Vec::new());
            }
            if !self.is_contained(&path).await {
                warn!("Refusing {}: outside the application root", path.display());
                return Ok(Vec::new());
            }
            return Ok(vec![path]);
        }

        let roots: Vec<PathBuf> = self
            .search_paths
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| self.mapper.map_path(p))
            .collect();
        let token = token.to_string();

        tokio::task::spawn_blocking(move || {
            let matcher = NameMatcher::new(&token);
            roots
                .iter()
                .filter(|root| root.is_dir())
                .flat_map(|root| search_root(root, &matcher))
                .collect::<Vec<PathBuf>>()
        })
        .await
        .map_err(|e| BundleError::Internal(format!("file search task failed: {}", e)))
    }

    /// Whether `path` resolves to somewhere under the application root or a
    /// search path
    async fn is_contained(&self, path: &Path) -> bool {
        let Ok(real) = tokio::fs::canonicalize(path).await else {
            return false;
        };

        let allowed = std::iter::once("~/").chain(
            self.search_paths
                .iter()
                .map(String::as_str)
                .filter(|p| !p.trim().is_empty()),
        );
        for root in allowed {
            if let Ok(root) = tokio::fs::canonicalize(self.mapper.map_path(root)).await {
                if real.starts_with(&root) {
                    return true;
                }
            }
        }
        false
    }

    fn direct_path(&self, token: &str, root_hint: Option<&Path>) -> PathBuf {
        if is_virtual(token) {
            return self.mapper.map_path(token);
        }
        match root_hint {
            Some(root) => root.join(token),
            None => self.mapper.map_path(token),
        }
    }

    fn describe_search(&self, token: &str, root_hint: Option<&Path>) -> String {
        if !is_filename_only(token) {
            return self.direct_path(token, root_hint).display().to_string();
        }
        let searched: Vec<String> = self
            .search_paths
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| self.mapper.map_path(p).display().to_string())
            .collect();
        if searched.is_empty() {
            "no search paths configured".to_string()
        } else {
            searched.join(", ")
        }
    }
}

enum NameMatcher {
    Literal(String),
    Glob(glob::Pattern),
}

impl NameMatcher {
    fn new(token: &str) -> Self {
        if has_wildcards(token) {
            if let Ok(pattern) = glob::Pattern::new(token) {
                return Self::Glob(pattern);
            }
        }
        Self::Literal(token.to_string())
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Literal(literal) => name == literal,
            Self::Glob(pattern) => pattern.matches(name),
        }
    }
}

/// Matching files under one root, shallowest first, then by path
fn search_root(root: &Path, matcher: &NameMatcher) -> Vec<PathBuf> {
    let mut found: Vec<(usize, PathBuf)> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| matcher.matches(&entry.file_name().to_string_lossy()))
        .map(|entry| (entry.depth(), entry.into_path()))
        .collect();

    found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    found.into_iter().map(|(_, path)| path).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingMapper {
        inner: RootMapper,
        calls: AtomicUsize,
    }

    impl PathMapper for CountingMapper {
        fn map_path(&self, virtual_path: &str) -> PathBuf {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.map_path(virtual_path)
        }
    }

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn resolver(root: &Path, search: &[&str]) -> LocalResolver {
        LocalResolver::new(
            Arc::new(RootMapper::new(root)),
            search.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn filename_only_detection() {
        assert!(is_filename_only("site.css"));
        assert!(is_filename_only("*.js"));
        assert!(!is_filename_only("lib/site.css"));
        assert!(!is_filename_only("~/js/app.js"));
        assert!(!is_filename_only("..\\app.js"));
    }

    #[test]
    fn root_mapper_strips_virtual_prefix() {
        let mapper = RootMapper::new("/srv/app");
        assert_eq!(mapper.map_path("~/js"), PathBuf::from("/srv/app/js"));
        assert_eq!(mapper.map_path("css"), PathBuf::from("/srv/app/css"));
        assert_eq!(
            mapper.map_path("/abs/x.js"),
            PathBuf::from("/srv/app/abs/x.js")
        );
    }

    #[tokio::test]
    async fn bare_name_follows_search_path_order() {
        let temp = TempDir::new().unwrap();
        let vendor = write(temp.path(), "vendor/app.js", "vendor");
        write(temp.path(), "js/app.js", "js");

        let resolver = resolver(temp.path(), &["~/vendor", "~/js"]);
        let candidates = resolver.candidates("app.js", None).await.unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], vendor);
        assert_eq!(resolver.resolve("app.js", None).await.unwrap(), vendor);
    }

    #[tokio::test]
    async fn bare_name_searches_recursively() {
        let temp = TempDir::new().unwrap();
        let deep = write(temp.path(), "js/lib/util/helpers.js", "x");

        let resolver = resolver(temp.path(), &["~/js"]);
        assert_eq!(resolver.resolve("helpers.js", None).await.unwrap(), deep);
    }

    #[tokio::test]
    async fn shallow_match_beats_nested_match() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "js/a/site.js", "nested");
        let top = write(temp.path(), "js/site.js", "top");

        let resolver = resolver(temp.path(), &["~/js"]);
        assert_eq!(resolver.resolve("site.js", None).await.unwrap(), top);
    }

    #[tokio::test]
    async fn glob_token_takes_first_match() {
        let temp = TempDir::new().unwrap();
        let first = write(temp.path(), "css/a.css", "a");
        write(temp.path(), "css/b.css", "b");

        let resolver = resolver(temp.path(), &["~/css"]);
        assert_eq!(resolver.candidates("*.css", None).await.unwrap().len(), 2);
        assert_eq!(resolver.resolve("*.css", None).await.unwrap(), first);
    }

    #[tokio::test]
    async fn relative_path_uses_root_hint() {
        let temp = TempDir::new().unwrap();
        let theme = write(temp.path(), "css/themes/dark.css", "x");

        let resolver = resolver(temp.path(), &["~/css"]);
        let hint = temp.path().join("css");
        let resolved = resolver
            .resolve("themes/dark.css", Some(&hint))
            .await
            .unwrap();
        assert_eq!(resolved, theme);
    }

    #[tokio::test]
    async fn virtual_path_ignores_root_hint() {
        let temp = TempDir::new().unwrap();
        let file = write(temp.path(), "js/app.js", "x");

        let resolver = resolver(temp.path(), &[]);
        let elsewhere = temp.path().join("nowhere");
        let resolved = resolver
            .resolve("~/js/app.js", Some(&elsewhere))
            .await
            .unwrap();
        assert_eq!(resolved, file);
    }

    #[tokio::test]
    async fn absolute_token_cannot_leave_root() {
        let app = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        write(app.path(), "js/app.js", "x");
        let secret = write(outside.path(), "secret.js", "x");
        let token = secret.to_string_lossy().to_string();

        let resolver = resolver(app.path(), &["~/js"]);
        let err = resolver.resolve(&token, None).await.unwrap_err();
        assert!(matches!(err, BundleError::LocalFileNotFound { .. }));

        // Joining an absolute token onto the hint yields the token itself
        let hint = app.path().join("js");
        let err = resolver.resolve(&token, Some(&hint)).await.unwrap_err();
        assert!(matches!(err, BundleError::LocalFileNotFound { .. }));
    }

    #[tokio::test]
    async fn parent_segments_cannot_leave_root() {
        let base = TempDir::new().unwrap();
        let app = base.path().join("app");
        write(base.path(), "app/js/app.js", "x");
        write(base.path(), "secret.css", "x");

        let resolver = resolver(&app, &["~/js"]);
        let hint = app.join("js");
        let err = resolver
            .resolve("../../secret.css", Some(&hint))
            .await
            .unwrap_err();
        assert!(matches!(err, BundleError::LocalFileNotFound { .. }));

        let err = resolver.resolve("../secret.css", None).await.unwrap_err();
        assert!(matches!(err, BundleError::LocalFileNotFound { .. }));
    }

    #[tokio::test]
    async fn parent_segments_inside_root_resolve() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "css/base.css", "x");
        write(temp.path(), "css/themes/dark.css", "x");

        let resolver = resolver(temp.path(), &["~/css"]);
        let hint = temp.path().join("css/themes");
        let resolved = resolver
            .resolve("../base.css", Some(&hint))
            .await
            .unwrap();
        assert!(resolved.ends_with("base.css"));
    }

    #[tokio::test]
    async fn missing_file_is_local_not_found() {
        let temp = TempDir::new().unwrap();
        let resolver = resolver(temp.path(), &["~/js", "  "]);

        let err = resolver.resolve("missing.js", None).await.unwrap_err();
        match err {
            BundleError::LocalFileNotFound { token, searched } => {
                assert_eq!(token, "missing.js");
                assert!(searched.contains("js"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = resolver.resolve("lib/missing.js", None).await.unwrap_err();
        assert!(matches!(err, BundleError::LocalFileNotFound { .. }));
    }

    #[tokio::test]
    async fn search_maps_every_configured_root() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "js/app.js", "x");
        let mapper = Arc::new(CountingMapper {
            inner: RootMapper::new(temp.path()),
            calls: AtomicUsize::new(0),
        });
        let resolver = LocalResolver::new(
            mapper.clone(),
            vec!["~/vendor".to_string(), "~/js".to_string()],
        );

        resolver.resolve("app.js", None).await.unwrap();
        assert_eq!(mapper.calls.load(Ordering::SeqCst), 2);
    }
}
