//! `pta cache` subcommands.

use anyhow::Result;

use pta_artifact::ArtifactCache;

pub fn list(cache: &ArtifactCache) -> Result<()> {
    let entries = cache.list()?;
    if entries.is_empty() {
        println!("Cache at {} is empty", cache.root().display());
        return Ok(());
    }
    for entry in entries {
        let source = entry
            .source
            .as_ref()
            .map(|s| s.location().to_string())
            .unwrap_or_else(|| "<unknown source>".to_string());
        println!("{}  {source}", entry.key);
    }
    Ok(())
}

pub fn path(cache: &ArtifactCache, locator: &str) -> Result<()> {
    let path = cache.entry_path(locator);
    if cache.contains(locator) {
        println!("{}", path.display());
    } else {
        println!("{} (not cached)", path.display());
    }
    Ok(())
}

pub fn remove(cache: &ArtifactCache, locator: &str) -> Result<()> {
    if cache.remove(locator)? {
        println!("Removed {locator}");
    } else {
        println!("{locator} is not cached");
    }
    Ok(())
}

pub fn clear(cache: &ArtifactCache) -> Result<()> {
    let removed = cache.clear()?;
    println!("Removed {removed} cached artifact(s) from {}", cache.root().display());
    Ok(())
}
