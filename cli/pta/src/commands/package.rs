//! `pta package`: build a package file from an artifact directory.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use pta_artifact::{build_package, ArtifactMetadata, PackageOptions, PACKAGE_FILE};

/// Parse a byte size such as `1048576`, `500M`, or `2GB` (binary units).
pub fn parse_size(raw: &str) -> std::result::Result<u64, String> {
    let trimmed = raw.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size '{raw}'"))?;
    let shift = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 0,
        "K" | "KB" => 10,
        "M" | "MB" => 20,
        "G" | "GB" => 30,
        "T" | "TB" => 40,
        other => return Err(format!("unknown size unit '{other}'")),
    };
    value
        .checked_mul(1u64 << shift)
        .filter(|v| *v > 0)
        .ok_or_else(|| format!("size '{raw}' is out of range"))
}

/// Descriptor fields given on the command line, if any.
pub fn metadata_override(
    artifact_type: Option<String>,
    format: Option<String>,
    package_hint: Option<String>,
) -> Option<ArtifactMetadata> {
    if artifact_type.is_none() && format.is_none() && package_hint.is_none() {
        return None;
    }
    Some(ArtifactMetadata {
        artifact_type,
        format,
        package_hint,
        ..Default::default()
    })
}

/// Run `pta package <dir>`.
pub fn run(
    dir: &Path,
    output: Option<PathBuf>,
    max_file_size: Option<u64>,
    metadata: Option<ArtifactMetadata>,
) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let package_path = output.unwrap_or_else(|| PathBuf::from(PACKAGE_FILE));
    let manifest = build_package(
        dir,
        &PackageOptions {
            package_path: package_path.clone(),
            max_file_size,
            metadata,
        },
    )
    .with_context(|| format!("packaging {}", dir.display()))?;

    println!("Package:  {}", package_path.display());
    println!("SHA-256:  {}", manifest.expected_sha256.as_deref().unwrap_or("-"));
    println!(
        "Size:     {} ({} files)",
        pta_io::human_bytes(manifest.total_size as f64),
        manifest.contents.len()
    );
    if let Some(segments) = &manifest.segments {
        println!("Segments: {}", segments.len());
    }
    Ok(())
}
