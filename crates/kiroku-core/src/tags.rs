use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::TagStoreError;

/// Built-in fallback when no categories are configured at all.
pub const FALLBACK_CATEGORY: &str = "life";
pub const FALLBACK_COLOR: &str = "#95E1D3";

/// One configured category: a classification label with a display color and
/// a description the prompt embeds as a classification rubric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryRecord {
    pub name: String,
    pub color: String,
    pub description: String,
    pub is_default: bool,
}

/// Ordered read-only snapshot of the configured categories. Loaded once per
/// pipeline invocation; never mutated by the pipeline. Insertion order is
/// significant: the first record is the default when none is flagged.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryConfiguration {
    records: Vec<CategoryRecord>,
}

impl CategoryConfiguration {
    pub fn new(records: Vec<CategoryRecord>) -> Self {
        Self { records }
    }

    /// Read a JSON array of category records from disk.
    pub fn load(path: &Path) -> Result<Self, TagStoreError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, TagStoreError> {
        let records: Vec<CategoryRecord> = serde_json::from_str(content)?;
        Ok(Self::new(records))
    }

    pub fn records(&self) -> &[CategoryRecord] {
        &self.records
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.iter().any(|record| record.name == name)
    }

    /// The category name substituted for missing or unrecognized tags.
    pub fn default_name(&self) -> &str {
        self.records
            .iter()
            .find(|record| record.is_default)
            .or_else(|| self.records.first())
            .map(|record| record.name.as_str())
            .unwrap_or(FALLBACK_CATEGORY)
    }

    /// Look up a category by name. Always succeeds: unknown or unset names
    /// resolve to the default record, or to a neutral built-in when nothing
    /// is configured.
    pub fn resolve(&self, name: Option<&str>) -> CategoryRecord {
        if let Some(name) = name
            && let Some(record) = self.records.iter().find(|record| record.name == name)
        {
            return record.clone();
        }
        let default_name = self.default_name();
        self.records
            .iter()
            .find(|record| record.name == default_name)
            .cloned()
            .unwrap_or_else(|| CategoryRecord {
                name: FALLBACK_CATEGORY.to_string(),
                color: FALLBACK_COLOR.to_string(),
                description: String::new(),
                is_default: true,
            })
    }
}

impl Default for CategoryConfiguration {
    /// The scaffolded category set; `kiroku init` writes this to disk.
    fn default() -> Self {
        fn record(name: &str, color: &str, description: &str, is_default: bool) -> CategoryRecord {
            CategoryRecord {
                name: name.to_string(),
                color: color.to_string(),
                description: description.to_string(),
                is_default,
            }
        }
        Self::new(vec![
            record("work", "#FF6B6B", "meetings, project work, anything job related", false),
            record("study", "#45B7D1", "learning, reading, courses, practice", false),
            record(
                FALLBACK_CATEGORY,
                FALLBACK_COLOR,
                "meals, commute, errands, daily routine",
                true,
            ),
            record("leisure", "#FFA07A", "entertainment, games, socializing", false),
            record("exercise", "#98D8A8", "running, gym, sports", false),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_name_prefers_flagged_record() {
        let categories = CategoryConfiguration::default();
        assert_eq!(categories.default_name(), "life");
    }

    #[test]
    fn default_name_falls_back_to_first_record() {
        let categories = CategoryConfiguration::new(vec![
            CategoryRecord {
                name: "work".to_string(),
                ..CategoryRecord::default()
            },
            CategoryRecord {
                name: "study".to_string(),
                ..CategoryRecord::default()
            },
        ]);
        assert_eq!(categories.default_name(), "work");
    }

    #[test]
    fn resolve_known_name_returns_its_record() {
        let categories = CategoryConfiguration::default();
        let record = categories.resolve(Some("exercise"));
        assert_eq!(record.name, "exercise");
        assert_eq!(record.color, "#98D8A8");
    }

    #[test]
    fn resolve_unknown_name_returns_default_record() {
        let categories = CategoryConfiguration::default();
        assert_eq!(categories.resolve(Some("not-a-real-category")).name, "life");
        assert_eq!(categories.resolve(None).name, "life");
    }

    #[test]
    fn resolve_with_empty_configuration_uses_builtin() {
        let categories = CategoryConfiguration::new(Vec::new());
        let record = categories.resolve(Some("anything"));
        assert_eq!(record.name, FALLBACK_CATEGORY);
        assert_eq!(record.color, FALLBACK_COLOR);
    }

    #[test]
    fn from_json_preserves_order() {
        let content = r##"[
            {"name": "a", "color": "#111111", "description": "", "is_default": false},
            {"name": "b", "color": "#222222", "description": "second", "is_default": false}
        ]"##;
        let categories = CategoryConfiguration::from_json(content).unwrap();
        assert_eq!(categories.records()[0].name, "a");
        assert_eq!(categories.default_name(), "a");
        assert!(categories.contains("b"));
    }
}
