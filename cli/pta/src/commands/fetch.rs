//! `pta fetch` and `pta meta`.

use anyhow::{Context, Result};

use pta_artifact::{LoadOptions, Resolver};

/// Run `pta fetch <locator>`: materialize it and print the local path.
pub fn fetch(resolver: &Resolver, locator: &str, sha256: Option<String>, refresh: bool) -> Result<()> {
    let options = LoadOptions {
        expected_sha256: sha256,
        refresh,
    };
    let path = resolver
        .materialize(locator, &options)
        .with_context(|| format!("fetching {locator}"))?;
    println!("{}", path.display());
    Ok(())
}

/// Run `pta meta <locator>`: print the artifact's metadata as JSON.
pub fn meta(resolver: &Resolver, locator: &str) -> Result<()> {
    let path = resolver
        .materialize(locator, &LoadOptions::default())
        .with_context(|| format!("fetching {locator}"))?;
    let metadata = resolver.metadata(&path)?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}
