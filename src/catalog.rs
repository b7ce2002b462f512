//! Built-in emotion suffix catalog and the per-run selection state.
//!
//! Every entry pairs an emotion label with the prompt fragment appended to
//! the base prompt when generating that expression.

use crate::error::{ExpressionError, Result};
use serde::{Deserialize, Serialize};

pub const STANDARD_CATALOG_NAME: &str = "Standard Emotions";

/// Label and default suffix for the standard 28-image expression set.
pub const STANDARD_EMOTIONS: &[(&str, &str)] = &[
    ("admiration", "admiration, loving expression, admiring"),
    (
        "amusement",
        "amused, laughing, smiling, bright eyes, relaxed, open mouth",
    ),
    ("anger", "angry, upset, frown"),
    ("annoyance", "annoyed, half-closed eyes, frown"),
    ("approval", "approval, approving smile, happy"),
    (
        "caring",
        "loving smile, gentle smile, caring expression, gentle expression",
    ),
    ("confusion", "confused"),
    (
        "curiosity",
        "interested expression, curious, bright eyes, :o",
    ),
    ("desire", "longing expression, desire, horny"),
    ("disappointment", "disappointed, frowning, unhappy"),
    ("disapproval", "disapproving expression, empty eyes"),
    (
        "disgust",
        "hate, disgust, disgusted expression, green blush",
    ),
    (
        "embarrassment",
        "shy, embarrassed, averting gaze, blushing",
    ),
    ("excitement", "happy, excited, open mouth, smile"),
    ("fear", "fear, afraid, panic, teary eyes, narrow pupils"),
    (
        "gratitude",
        "loving eyes, grateful expression, thanking, loving expression",
    ),
    ("grief", "grief, sad, tears, crying"),
    ("joy", "laughing, smile, happy, very happy, warm smile"),
    (
        "love",
        "ahegao, aroused, loving, love, heart eyes, heart pupils, smile",
    ),
    (
        "nervousness",
        "nervous, blushing, averted gaze, surprised, nervous eyes",
    ),
    ("neutral", "neutral expression, mild smile"),
    (
        "optimism",
        "smile, optimistic expression, half closed happy eyes",
    ),
    (
        "pride",
        "smug, prideful, half open eyes, happy, open mouth smile",
    ),
    ("realization", "eyes wide open, :o, surprise"),
    ("relief", "relief, ahegao, relaxed, cumming, orgasm face"),
    ("remorse", "sad, remorseful, empty eyes"),
    ("sadness", "sad, very sad, tears"),
    ("surprise", "open mouth, :o, surprised"),
];

/// One selectable expression: label, current suffix text and enabled flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffixEntry {
    pub label: String,
    pub suffix: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SuffixEntry {
    pub fn new(label: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            suffix: suffix.into(),
            enabled: true,
        }
    }
}

/// Ordered, editable view over a suffix table.
///
/// The table itself never changes; only the `enabled` flags and suffix text
/// of the entries are edited between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixCatalog {
    name: String,
    defaults: Vec<(String, String)>,
    entries: Vec<SuffixEntry>,
}

impl SuffixCatalog {
    /// The 28-entry standard emotion set, everything enabled.
    pub fn standard() -> Self {
        Self::from_pairs(STANDARD_CATALOG_NAME, STANDARD_EMOTIONS.iter().copied())
    }

    pub fn from_pairs<'a>(
        name: &str,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let defaults: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(label, suffix)| (label.to_string(), suffix.to_string()))
            .collect();
        let entries = defaults
            .iter()
            .map(|(label, suffix)| SuffixEntry::new(label.as_str(), suffix.as_str()))
            .collect();

        Self {
            name: name.to_string(),
            defaults,
            entries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[SuffixEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.enabled).count()
    }

    pub fn get(&self, label: &str) -> Option<&SuffixEntry> {
        self.entries.iter().find(|entry| entry.label == label)
    }

    pub fn default_suffix(&self, label: &str) -> Option<&str> {
        self.defaults
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, suffix)| suffix.as_str())
    }

    pub fn select_all(&mut self) {
        self.set_all(true);
    }

    pub fn select_none(&mut self) {
        self.set_all(false);
    }

    fn set_all(&mut self, enabled: bool) {
        for entry in &mut self.entries {
            entry.enabled = enabled;
        }
    }

    pub fn set_enabled(&mut self, label: &str, enabled: bool) -> Result<()> {
        self.entry_mut(label)?.enabled = enabled;
        Ok(())
    }

    pub fn set_suffix(&mut self, label: &str, suffix: impl Into<String>) -> Result<()> {
        self.entry_mut(label)?.suffix = suffix.into();
        Ok(())
    }

    /// Enables exactly the given labels and disables everything else.
    pub fn retain_only<S: AsRef<str>>(&mut self, labels: &[S]) -> Result<()> {
        for label in labels {
            self.entry_mut(label.as_ref().trim())?;
        }
        for entry in &mut self.entries {
            entry.enabled = labels
                .iter()
                .any(|label| label.as_ref().trim() == entry.label);
        }
        Ok(())
    }

    pub fn reset_suffixes(&mut self) {
        for (entry, (_, suffix)) in self.entries.iter_mut().zip(self.defaults.iter()) {
            entry.suffix.clone_from(suffix);
        }
    }

    fn entry_mut(&mut self, label: &str) -> Result<&mut SuffixEntry> {
        let catalog = self.name.clone();
        self.entries
            .iter_mut()
            .find(|entry| entry.label == label)
            .ok_or_else(|| {
                ExpressionError::config(format!(
                    "unknown expression label '{}' in catalog {}",
                    label, catalog
                ))
            })
    }
}

impl Default for SuffixCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_has_28_enabled_entries() {
        let catalog = SuffixCatalog::standard();
        assert_eq!(catalog.len(), 28);
        assert_eq!(catalog.enabled_count(), 28);
        assert_eq!(catalog.entries()[0].label, "admiration");
        assert_eq!(catalog.entries()[27].label, "surprise");
        assert_eq!(
            catalog.get("anger").map(|entry| entry.suffix.as_str()),
            Some("angry, upset, frown")
        );
    }

    #[test]
    fn test_labels_are_unique() {
        let catalog = SuffixCatalog::standard();
        let mut labels: Vec<_> = catalog.entries().iter().map(|e| &e.label).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), catalog.len());
    }

    #[test]
    fn test_select_none_then_all() {
        let mut catalog = SuffixCatalog::standard();
        catalog.select_none();
        assert_eq!(catalog.enabled_count(), 0);
        catalog.select_all();
        assert_eq!(catalog.enabled_count(), 28);
    }

    #[test]
    fn test_retain_only_enables_named_labels() {
        let mut catalog = SuffixCatalog::standard();
        catalog.retain_only(&["joy", " anger "]).unwrap();
        let enabled: Vec<_> = catalog
            .entries()
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| entry.label.as_str())
            .collect();
        assert_eq!(enabled, vec!["anger", "joy"]);
    }

    #[test]
    fn test_unknown_label_is_config_error() {
        let mut catalog = SuffixCatalog::standard();
        let error = catalog.set_enabled("boredom", true).unwrap_err();
        assert!(matches!(error, ExpressionError::Config(_)));
        assert!(catalog.retain_only(&["joy", "boredom"]).is_err());
        // Failed retain leaves the selection untouched.
        assert_eq!(catalog.enabled_count(), 28);
    }

    #[test]
    fn test_edited_suffix_resets_to_default() {
        let mut catalog = SuffixCatalog::standard();
        catalog.set_suffix("joy", "grinning").unwrap();
        assert_eq!(catalog.get("joy").unwrap().suffix, "grinning");
        assert_eq!(
            catalog.default_suffix("joy"),
            Some("laughing, smile, happy, very happy, warm smile")
        );
        catalog.reset_suffixes();
        assert_eq!(
            catalog.get("joy").unwrap().suffix,
            "laughing, smile, happy, very happy, warm smile"
        );
    }
}
