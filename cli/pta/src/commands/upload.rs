//! `pta upload`: package an artifact and publish it.

use std::path::Path;

use anyhow::{Context, Result};

use pta_artifact::{Resolver, UploadOptions};

pub fn run(
    resolver: &Resolver,
    dir: &Path,
    destination: &str,
    max_file_size: Option<u64>,
    name: Option<String>,
) -> Result<()> {
    let locator = resolver
        .upload(dir, destination, &UploadOptions { max_file_size, name })
        .with_context(|| format!("uploading {} to {destination}", dir.display()))?;
    println!("Published {} as {locator}", dir.display());
    Ok(())
}
