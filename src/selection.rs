//! Selection presets: save and restore which expressions are enabled and
//! their edited suffixes.
//!
//! Presets are YAML (`.yaml`/`.yml`) or JSON (`.json`) files holding a list of
//! `{label, suffix, enabled}` entries.

use crate::catalog::{SuffixCatalog, SuffixEntry};
use crate::error::{ExpressionError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk shape of a selection preset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPreset {
    #[serde(default)]
    pub entries: Vec<SuffixEntry>,
}

impl SelectionPreset {
    pub fn from_catalog(catalog: &SuffixCatalog) -> Self {
        Self {
            entries: catalog.entries().to_vec(),
        }
    }

    /// Applies every preset entry onto `catalog`. Labels absent from the
    /// preset keep their current state.
    pub fn apply_to(&self, catalog: &mut SuffixCatalog) -> Result<()> {
        for entry in &self.entries {
            catalog.set_enabled(&entry.label, entry.enabled)?;
            catalog.set_suffix(&entry.label, entry.suffix.as_str())?;
        }
        Ok(())
    }
}

/// Reads a preset, choosing the format from the file extension.
pub fn read_preset(path: &Path) -> Result<SelectionPreset> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ExpressionError::config(format!(
            "Failed to read preset {}: {}",
            path.display(),
            e
        ))
    })?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let parsed: std::result::Result<SelectionPreset, String> = match ext.as_str() {
        "json" => serde_json::from_str(&content).map_err(|e| e.to_string()),
        _ => serde_yaml::from_str(&content).map_err(|e| e.to_string()), // yaml/yml
    };
    parsed.map_err(|e| {
        ExpressionError::config(format!("Invalid preset {}: {}", path.display(), e))
    })
}

/// Writes `preset` as YAML, or JSON when `path` ends in `.json`.
pub fn write_preset(path: &Path, preset: &SelectionPreset) -> Result<()> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let body = if is_json {
        serde_json::to_string_pretty(preset).map_err(|e| e.to_string())
    } else {
        serde_yaml::to_string(preset).map_err(|e| e.to_string())
    }
    .map_err(|e| ExpressionError::config(format!("Preset serialization error: {}", e)))?;

    std::fs::write(path, body).map_err(|source| ExpressionError::Filesystem {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads a preset file onto the standard catalog.
pub fn load_catalog(path: &Path) -> Result<SuffixCatalog> {
    let mut catalog = SuffixCatalog::standard();
    read_preset(path)?.apply_to(&mut catalog)?;
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_write_and_read_preset_yaml() {
        let dir = std::env::temp_dir().join("expression_preset_yaml_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("preset.yaml");

        let mut catalog = SuffixCatalog::standard();
        catalog.retain_only(&["joy", "anger"]).unwrap();
        catalog.set_suffix("joy", "beaming").unwrap();
        write_preset(&path, &SelectionPreset::from_catalog(&catalog)).unwrap();

        let loaded = load_catalog(&path).unwrap();
        assert_eq!(loaded.enabled_count(), 2);
        assert_eq!(loaded.get("joy").unwrap().suffix, "beaming");
        assert_eq!(loaded, catalog);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_read_partial_json_preset() {
        let dir = std::env::temp_dir().join("expression_preset_json_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("preset.json");
        fs::write(
            &path,
            r#"{"entries":[{"label":"fear","suffix":"terrified","enabled":false}]}"#,
        )
        .unwrap();

        let loaded = load_catalog(&path).unwrap();
        assert_eq!(loaded.enabled_count(), 27);
        let fear = loaded.get("fear").unwrap();
        assert!(!fear.enabled);
        assert_eq!(fear.suffix, "terrified");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_label_in_preset_is_rejected() {
        let dir = std::env::temp_dir().join("expression_preset_unknown_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("preset.yml");
        fs::write(&path, "entries:\n  - label: boredom\n    suffix: yawning\n").unwrap();

        let error = load_catalog(&path).unwrap_err();
        assert!(matches!(error, ExpressionError::Config(_)));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_preset_is_config_error() {
        let path = std::env::temp_dir().join("expression_preset_missing.yaml");
        assert!(matches!(
            read_preset(&path),
            Err(ExpressionError::Config(_))
        ));
    }
}
