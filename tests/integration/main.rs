//! Integration tests for Stitch

mod bundle_tests {
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};
    use stitch::config::Config;
    use stitch::remote::{FetchLimits, Fetcher, WhitelistEntry};
    use stitch::resolve::{PathMapper, RootMapper};
    use stitch::{BundleError, BundleRequest, BundleResult, Bundler};
    use tempfile::TempDir;
    use url::Url;

    /// Path mapper that counts how often resolution touches the filesystem
    struct CountingMapper {
        inner: RootMapper,
        calls: AtomicUsize,
    }

    impl CountingMapper {
        fn new(root: &Path) -> Arc<Self> {
            Arc::new(Self {
                inner: RootMapper::new(root),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PathMapper for CountingMapper {
        fn map_path(&self, virtual_path: &str) -> PathBuf {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.map_path(virtual_path)
        }
    }

    /// Remote fetcher that answers after a fixed delay
    struct SlowFetcher {
        delay: Duration,
    }

    #[async_trait]
    impl Fetcher for SlowFetcher {
        async fn fetch(&self, url: &Url, _limits: FetchLimits) -> BundleResult<String> {
            tokio::time::sleep(self.delay).await;
            Ok(format!("/* {} */", url.path()))
        }
    }

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn config(root: &Path) -> Config {
        let mut config = Config::default();
        config.general.root = root.to_path_buf();
        config.script.search_paths = vec!["~/js".to_string()];
        config.style.search_paths = vec!["~/css".to_string()];
        config
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_identical_requests_build_once() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "js/app.js", "var app = 1;");
        let mapper = CountingMapper::new(temp.path());

        let bundler = Bundler::builder(config(temp.path()))
            .path_mapper(mapper.clone())
            .build()
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let bundler = bundler.clone();
            handles.push(tokio::spawn(async move {
                bundler.script(false, ["app.js"]).await
            }));
        }

        let mut artifacts = Vec::new();
        for handle in handles {
            artifacts.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(mapper.calls(), 1);
        assert!(artifacts.iter().all(|a| Arc::ptr_eq(a, &artifacts[0])));
        assert_eq!(&*artifacts[0], "var app = 1;\n");
    }

    #[tokio::test]
    async fn output_order_matches_request_order() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "js/first.js", "var first;");
        write(temp.path(), "js/last.js", "var last;");

        let mut config = config(temp.path());
        config.remote.allow_downloads = true;
        config.remote.whitelist = vec![WhitelistEntry::new(
            "cdn-lib",
            "https://cdn.example.com/lib.js",
        )];

        let bundler = Bundler::builder(config)
            .fetcher(Arc::new(SlowFetcher {
                delay: Duration::from_millis(200),
            }))
            .build()
            .unwrap();

        let out = bundler
            .script(false, ["first.js", "cdn-lib", "last.js"])
            .await
            .unwrap();
        assert_eq!(&*out, "var first;\n/* /lib.js */\nvar last;\n");
    }

    #[tokio::test]
    async fn minified_scripts_keep_top_level_names() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "js/a.js",
            "function f(value) {\n  return value * 2;\n}\n",
        );
        write(temp.path(), "js/b.js", "console.log(f(21));\n");

        let bundler = Bundler::builder(config(temp.path())).build().unwrap();
        let out = bundler.script(true, ["a.js", "b.js"]).await.unwrap();

        assert!(out.contains("function f("), "{out}");
        assert!(out.contains("f(21)"), "{out}");
        assert!(!out.contains("value"), "{out}");
        assert!(out.find("function f(") < out.find("f(21)"));
    }

    #[tokio::test]
    async fn styles_get_vendor_prefixes_without_minification() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "css/theme.css", ".row {\n  display:flex;\n}\n");

        let mut config = config(temp.path());
        config.style.prefix.browsers = vec!["ie 10".to_string()];

        let bundler = Bundler::builder(config).build().unwrap();
        let out = bundler.style(false, ["theme.css"]).await.unwrap();

        assert!(out.contains("display: -ms-flexbox"), "{out}");
        assert!(out.contains("display: flex"), "{out}");
        assert!(out.contains('\n'), "{out}");
    }

    #[tokio::test]
    async fn touching_a_source_invalidates_the_artifact() {
        let temp = TempDir::new().unwrap();
        let path = write(temp.path(), "js/app.js", "var v = 1;");
        let mapper = CountingMapper::new(temp.path());

        let bundler = Bundler::builder(config(temp.path()))
            .path_mapper(mapper.clone())
            .build()
            .unwrap();

        let first = bundler.script(false, ["app.js"]).await.unwrap();
        let second = bundler.script(false, ["app.js"]).await.unwrap();
        assert_eq!(mapper.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));

        std::fs::write(&path, "var v = 2;").unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();

        let third = bundler.script(false, ["app.js"]).await.unwrap();
        assert_eq!(mapper.calls(), 2);
        assert_eq!(&*third, "var v = 2;\n");
    }

    #[tokio::test]
    async fn remote_only_artifact_survives_filesystem_changes() {
        let temp = TempDir::new().unwrap();
        let mut config = config(temp.path());
        config.remote.allow_downloads = true;
        config.remote.whitelist = vec![WhitelistEntry::new("lib", "https://cdn.example.com/lib.js")];

        let bundler = Bundler::builder(config)
            .fetcher(Arc::new(SlowFetcher {
                delay: Duration::ZERO,
            }))
            .build()
            .unwrap();

        let request = BundleRequest::script(["lib"]);
        let first = bundler.bundle(&request).await.unwrap();
        write(temp.path(), "js/lib.js", "unrelated");
        let second = bundler.bundle(&request).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let entry = bundler.cache().store().get(&request.key()).await.unwrap();
        assert!(entry.monitors.is_empty());
    }

    #[tokio::test]
    async fn persisted_bundle_is_served_after_restart() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "js/app.js", "var app = 1;");

        let mut config = config(temp.path());
        config.cache.persist = true;
        config.cache.directory = temp.path().join("bundles").display().to_string();

        let first = Bundler::builder(config.clone()).build().unwrap();
        first.script(false, ["app.js"]).await.unwrap();
        drop(first);

        let mapper = CountingMapper::new(temp.path());
        let second = Bundler::builder(config)
            .path_mapper(mapper.clone())
            .build()
            .unwrap();
        let out = second.script(false, ["app.js"]).await.unwrap();

        assert_eq!(&*out, "var app = 1;\n");
        assert_eq!(mapper.calls(), 0);
    }

    #[tokio::test]
    async fn absolute_token_outside_root_is_not_served() {
        let app = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        write(app.path(), "js/app.js", "var app;");
        let secret = write(outside.path(), "secret.js", "var secret;");

        let bundler = Bundler::builder(config(app.path())).build().unwrap();
        let err = bundler
            .script(false, ["app.js".to_string(), secret.display().to_string()])
            .await
            .unwrap_err();

        assert!(matches!(
            err.root_cause(),
            BundleError::LocalFileNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_remote_token_fails_whole_build() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "js/app.js", "var app;");

        let bundler = Bundler::builder(config(temp.path())).build().unwrap();
        let err = bundler
            .script(false, ["app.js", "not-registered"])
            .await
            .unwrap_err();

        assert!(matches!(
            err.root_cause(),
            BundleError::NotWhitelisted { .. }
        ));
        assert!(err.hint().is_some());
    }
}

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn stitch() -> Command {
        cargo_bin_cmd!("stitch")
    }

    /// Command pinned to a config file inside `dir`, ignoring any local config
    fn stitch_in(dir: &Path) -> Command {
        let mut cmd = stitch();
        cmd.arg("--no-local")
            .arg("--config")
            .arg(dir.join("config.toml"));
        cmd
    }

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("js")).unwrap();
        std::fs::write(temp.path().join("js/a.js"), "var a = 1;").unwrap();
        std::fs::write(temp.path().join("js/b.js"), "var b = 2;").unwrap();
        std::fs::write(
            temp.path().join("config.toml"),
            r#"
[script]
search_paths = ["~/js"]

[remote]
allow_downloads = false

[[remote.whitelist]]
token = "jquery"
url = "https://code.jquery.com/jquery-3.7.1.min.js"
"#,
        )
        .unwrap();
        temp
    }

    #[test]
    fn help_displays() {
        stitch()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("stylesheet bundler"));
    }

    #[test]
    fn version_displays() {
        stitch()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("stitch"));
    }

    #[test]
    fn config_path() {
        stitch()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        stitch_in(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"));
    }

    #[test]
    fn config_init_then_refuses_overwrite() {
        let temp = TempDir::new().unwrap();
        stitch_in(temp.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(temp.path().join("config.toml").exists());

        stitch_in(temp.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn bundle_prints_entries_in_order() {
        let temp = project();
        stitch_in(temp.path())
            .arg("bundle")
            .arg("--root")
            .arg(temp.path())
            .args(["b.js", "a.js"])
            .assert()
            .success()
            .stdout(predicate::eq("var b = 2;\nvar a = 1;\n"));
    }

    #[test]
    fn bundle_writes_output_file() {
        let temp = project();
        let out = temp.path().join("dist/app.js");
        stitch_in(temp.path())
            .arg("bundle")
            .arg("--root")
            .arg(temp.path())
            .arg("-o")
            .arg(&out)
            .args(["a.js"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Wrote script bundle"));

        assert_eq!(std::fs::read_to_string(out).unwrap(), "var a = 1;\n");
    }

    #[test]
    fn bundle_missing_file_fails_with_hint() {
        let temp = project();
        stitch_in(temp.path())
            .arg("bundle")
            .arg("--root")
            .arg(temp.path())
            .args(["a.js", "missing.js"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Local file not found"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn bundle_rejects_remote_when_disabled() {
        let temp = project();
        stitch_in(temp.path())
            .arg("bundle")
            .arg("--root")
            .arg(temp.path())
            .args(["jquery"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Remote downloads are disabled"));
    }

    #[test]
    fn bundle_persists_to_cache_directory() {
        let temp = project();
        let bundles = temp.path().join("bundles");
        let mut config = std::fs::read_to_string(temp.path().join("config.toml")).unwrap();
        config.push_str(&format!(
            "\n[cache]\npersist = true\ndirectory = '{}'\n",
            bundles.display()
        ));
        std::fs::write(temp.path().join("config.toml"), config).unwrap();

        stitch_in(temp.path())
            .arg("bundle")
            .arg("--root")
            .arg(temp.path())
            .args(["a.js"])
            .assert()
            .success()
            .stdout(predicate::eq("var a = 1;\n"));

        let persisted: Vec<_> = std::fs::read_dir(&bundles)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "bundle"))
            .collect();
        assert_eq!(persisted.len(), 1);
        assert_eq!(std::fs::read_to_string(&persisted[0]).unwrap(), "var a = 1;\n");
    }

    #[test]
    fn whitelist_lists_tokens() {
        let temp = project();
        stitch_in(temp.path())
            .arg("whitelist")
            .assert()
            .success()
            .stdout(predicate::str::contains("jquery"))
            .stdout(predicate::str::contains("code.jquery.com"))
            .stdout(predicate::str::contains("1 token(s)"));
    }
}
