//! Whitelist command - show remote tokens

use crate::config::Config;
use crate::error::BundleResult;
use crate::remote::Whitelist;
use console::style;

/// Execute the whitelist command
pub async fn execute(config: &Config) -> BundleResult<()> {
    let whitelist = Whitelist::from_entries(&config.remote.whitelist)?;

    let downloads = if config.remote.allow_downloads {
        style("enabled").green()
    } else {
        style("disabled").yellow()
    };
    println!("Remote downloads: {}", downloads);

    if whitelist.is_empty() {
        println!("No whitelisted tokens");
        return Ok(());
    }

    println!();
    println!("{:<24} {}", style("TOKEN").bold(), style("URL").bold());
    println!("{}", "-".repeat(72));
    for (token, url) in whitelist.iter() {
        println!("{:<24} {}", token, url);
    }

    println!();
    println!("{} token(s)", whitelist.len());

    Ok(())
}
