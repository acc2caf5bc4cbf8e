use std::{fs, path::Path};

use eyre::{Result, WrapErr};

use crate::error::PipelineError;

/// Labels of the default colonoscopy multi-label model, in output order.
pub const DEFAULT_LABELS: [&str; 14] = [
    "appendix",
    "blood",
    "diverticule",
    "grasper",
    "ileocaecalvalve",
    "ileum",
    "low_quality",
    "nbi",
    "needle",
    "outside",
    "polyp",
    "snare",
    "water_jet",
    "wound",
];

pub fn default_labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|l| l.to_string()).collect()
}

/// Reads a label vocabulary, either a JSON array or one label per line.
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read labels {}", path.display()))?;

    let labels: Vec<String> = if content.trim_start().starts_with('[') {
        serde_json::from_str(&content)
            .wrap_err_with(|| format!("Failed to parse labels {}", path.display()))?
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    };

    if labels.is_empty() {
        return Err(PipelineError::InvalidConfig(format!(
            "no labels in {}",
            path.display()
        ))
        .into());
    }

    let mut seen = labels.clone();
    seen.sort();
    seen.dedup();
    if seen.len() != labels.len() {
        return Err(PipelineError::InvalidConfig(format!(
            "duplicate labels in {}",
            path.display()
        ))
        .into());
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_json_and_text_labels() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("labels.json");
        fs::write(&json, r#"["outside", "polyp"]"#).unwrap();
        assert_eq!(load_labels(&json).unwrap(), vec!["outside", "polyp"]);

        let text = dir.path().join("labels.txt");
        fs::write(&text, "outside\n\n polyp \n").unwrap();
        assert_eq!(load_labels(&text).unwrap(), vec!["outside", "polyp"]);
    }

    #[test]
    fn test_rejects_empty_and_duplicate_labels() {
        let dir = tempfile::tempdir().unwrap();

        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "\n").unwrap();
        assert!(load_labels(&empty).is_err());

        let dup = dir.path().join("dup.json");
        fs::write(&dup, r#"["polyp", "polyp"]"#).unwrap();
        assert!(load_labels(&dup).is_err());
    }
}
