use serde::{Deserialize, Deserializer, Serialize};

use crate::classifier::RipenessLevel;

const FALLBACK_SWATCH: &str = "#666";

/// One step of the printed reference chart field staff compare against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorChartEntry {
    pub level: RipenessLevel,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    pub color: String,
}

/// Backend rows carry `"name": null` for unnamed levels.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorChart {
    entries: Vec<ColorChartEntry>,
}

impl Default for ColorChart {
    /// Chart used when the backend copy cannot be fetched.
    fn default() -> Self {
        let entries = [
            (2, "All Green", "#2E7D32"),
            (3, "Light Green", "#4CAF50"),
            (4, "Half Green", "#8BC34A"),
            (5, "Green Tip", "#CDDC39"),
            (6, "Full Yellow", "#FFEB3B"),
            (7, "Star", "#FFC107"),
            (8, "", "#FF9800"),
            (9, "", "#795548"),
        ]
        .into_iter()
        .map(|(level, name, color)| ColorChartEntry {
            level: RipenessLevel(level),
            name: name.to_string(),
            color: color.to_string(),
        })
        .collect();

        Self { entries }
    }
}

impl ColorChart {
    pub fn new(entries: Vec<ColorChartEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ColorChartEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, level: RipenessLevel) -> Option<&ColorChartEntry> {
        self.entries.iter().find(|entry| entry.level == level)
    }

    pub fn contains(&self, level: RipenessLevel) -> bool {
        self.get(level).is_some()
    }

    /// Chart name for `level`, or the generic `Color <n>` label.
    pub fn display_name(&self, level: RipenessLevel) -> String {
        match self.get(level) {
            Some(entry) if !entry.name.is_empty() => entry.name.clone(),
            _ => level.label(),
        }
    }

    pub fn swatch(&self, level: RipenessLevel) -> &str {
        self.get(level)
            .map(|entry| entry.color.as_str())
            .unwrap_or(FALLBACK_SWATCH)
    }
}
