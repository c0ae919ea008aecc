//! Bundle command - build one bundle

use crate::bundle::{BundleRequest, Bundler, ResourceKind};
use crate::cli::args::BundleArgs;
use crate::config::Config;
use crate::error::{BundleError, BundleResult};
use console::style;
use tokio::fs;

/// Execute the bundle command
pub async fn execute(args: BundleArgs, config: &Config) -> BundleResult<()> {
    let mut config = config.clone();
    if let Some(root) = args.root {
        config.general.root = root;
    }

    let kind = if args.style {
        ResourceKind::Style
    } else {
        ResourceKind::Script
    };

    let bundler = Bundler::builder(config).build()?;
    let request = BundleRequest::new(kind, args.tokens).minified(args.minify);
    let artifact = bundler.bundle(&request).await?;

    match args.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BundleError::io(format!("creating {}", parent.display()), e))?;
            }
            fs::write(&path, artifact.as_bytes())
                .await
                .map_err(|e| BundleError::io(format!("writing {}", path.display()), e))?;

            eprintln!(
                "  {} Wrote {} bundle to {} ({} bytes)",
                style("[OK]").green(),
                kind,
                path.display(),
                artifact.len()
            );
        }
        None => print!("{}", artifact),
    }

    Ok(())
}
