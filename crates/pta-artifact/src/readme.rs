//! The `README.md` card published next to an uploaded package.

use crate::error::Result;
use crate::metadata::ArtifactMetadata;

pub const README_FILE: &str = "README.md";

/// Hub tags describing an artifact: `pyterrier`, `pyterrier-artifact`, then
/// one tag per level of `type[.format]`.
pub fn artifact_tags(metadata: &ArtifactMetadata) -> Vec<String> {
    let mut tags = vec!["pyterrier".to_string(), "pyterrier-artifact".to_string()];
    if let Some(artifact_type) = metadata.artifact_type.as_deref().filter(|t| !t.is_empty()) {
        tags.push(format!("pyterrier-artifact.{artifact_type}"));
        if let Some(format) = metadata.format.as_deref().filter(|f| !f.is_empty()) {
            tags.push(format!("pyterrier-artifact.{artifact_type}.{format}"));
        }
    }
    tags
}

/// Render the card for an artifact published at `destination`.
pub fn render_readme(name: &str, destination: &str, metadata: &ArtifactMetadata) -> Result<String> {
    let mut out = String::from("---\ntags:\n");
    for tag in artifact_tags(metadata) {
        out.push_str(&format!("- {tag}\n"));
    }
    out.push_str("task_categories:\n- text-retrieval\nviewer: false\n---\n\n");

    out.push_str(&format!("# {name}\n\n"));
    out.push_str("## Usage\n\n```sh\n");
    out.push_str(&format!("pta fetch {destination}\n"));
    out.push_str("```\n\n");
    out.push_str("## Metadata\n\n```json\n");
    out.push_str(&serde_json::to_string_pretty(metadata)?);
    out.push_str("\n```\n");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_follow_type_and_format() {
        let tags = artifact_tags(&ArtifactMetadata::new("sparse_index", "terrier"));
        assert_eq!(
            tags,
            vec![
                "pyterrier",
                "pyterrier-artifact",
                "pyterrier-artifact.sparse_index",
                "pyterrier-artifact.sparse_index.terrier",
            ]
        );
        assert_eq!(artifact_tags(&ArtifactMetadata::default()).len(), 2);
    }

    #[test]
    fn card_contains_front_matter_and_metadata() {
        let meta = ArtifactMetadata::new("dense_index", "flex").with_package_hint("pyterrier-dr");
        let card = render_readme("msmarco.flex", "hf:org/msmarco.flex", &meta).unwrap();
        assert!(card.starts_with("---\ntags:\n- pyterrier\n"));
        assert!(card.contains("- pyterrier-artifact.dense_index.flex\n"));
        assert!(card.contains("# msmarco.flex"));
        assert!(card.contains("pta fetch hf:org/msmarco.flex"));
        assert!(card.contains("\"package_hint\": \"pyterrier-dr\""));
    }
}
