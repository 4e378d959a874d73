//! Step-by-step scenario guides that work without a network.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::storage::Storage;

const BUILTIN_GUIDES: &str = include_str!("../data/guides.json");

/// Emergency situations with a guide
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scenario {
    #[serde(rename = "fire")]
    Fire,
    #[serde(rename = "earthquake")]
    Earthquake,
    #[serde(rename = "firstAid")]
    FirstAid,
    #[serde(rename = "lost")]
    Lost,
    #[serde(rename = "theft")]
    Theft,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Fire => "fire",
            Scenario::Earthquake => "earthquake",
            Scenario::FirstAid => "firstAid",
            Scenario::Lost => "lost",
            Scenario::Theft => "theft",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "fire" => Some(Scenario::Fire),
            "earthquake" => Some(Scenario::Earthquake),
            "firstAid" | "first-aid" | "first_aid" => Some(Scenario::FirstAid),
            "lost" => Some(Scenario::Lost),
            "theft" => Some(Scenario::Theft),
            _ => None,
        }
    }

    pub fn all() -> Vec<Scenario> {
        vec![
            Scenario::Fire,
            Scenario::Earthquake,
            Scenario::FirstAid,
            Scenario::Lost,
            Scenario::Theft,
        ]
    }

    fn storage_key(&self) -> String {
        format!("emergency_guide_{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guide {
    pub title: String,
    pub steps: Vec<String>,
}

impl Guide {
    /// Steps prefixed with their 1-based position
    pub fn numbered_steps(&self) -> Vec<String> {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step))
            .collect()
    }
}

/// All scenario guides, read-only after construction
#[derive(Debug, Clone)]
pub struct GuideBook {
    guides: BTreeMap<Scenario, Guide>,
}

impl GuideBook {
    pub fn builtin() -> Self {
        let guides = serde_json::from_str(BUILTIN_GUIDES).unwrap_or_default();
        Self { guides }
    }

    pub async fn load_from_json(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read guides file {:?}: {}", path, e))?;
        let guides: BTreeMap<Scenario, Guide> = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Invalid guides file {:?}: {}", path, e))?;
        tracing::info!(guides = guides.len(), "loaded scenario guides from {:?}", path);
        Ok(Self { guides })
    }

    pub fn get(&self, scenario: Scenario) -> Option<&Guide> {
        self.guides.get(&scenario)
    }

    /// Copy every guide into `storage` so they stay readable offline
    pub fn store_offline(&self, storage: &dyn Storage) -> Result<()> {
        for (scenario, guide) in &self.guides {
            storage.set_item(&scenario.storage_key(), &serde_json::to_string(guide)?)?;
        }
        tracing::debug!(guides = self.guides.len(), "offline guides stored");
        Ok(())
    }

    pub fn offline_copy_present(storage: &dyn Storage) -> bool {
        matches!(storage.get_item(&Scenario::Earthquake.storage_key()), Ok(Some(_)))
    }

    /// Read a guide from `storage`, falling back to this book when the stored
    /// copy is missing or unreadable
    pub fn load_offline(&self, storage: &dyn Storage, scenario: Scenario) -> Option<Guide> {
        match storage.get_item(&scenario.storage_key()) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(guide) => return Some(guide),
                Err(e) => tracing::warn!(scenario = scenario.as_str(), error = %e, "stored guide is corrupt"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(scenario = scenario.as_str(), error = %e, "could not read stored guide"),
        }
        self.get(scenario).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_builtin_has_every_scenario() {
        let parsed: BTreeMap<Scenario, Guide> = serde_json::from_str(BUILTIN_GUIDES).unwrap();
        let book = GuideBook { guides: parsed };
        for scenario in Scenario::all() {
            let guide = book.get(scenario).unwrap();
            assert!(!guide.steps.is_empty(), "{} has no steps", scenario.as_str());
        }
    }

    #[test]
    fn test_lookup_by_directory_id() {
        let book = GuideBook::builtin();
        let title = |id: &str| Scenario::from_id(id).and_then(|s| book.get(s)).map(|g| g.title.as_str());
        assert_eq!(title("fire"), Some("Qué hacer en caso de incendio"));
        assert_eq!(title("firstAid"), Some("Primeros auxilios básicos"));
        assert_eq!(title("flood"), None);
    }

    #[test]
    fn test_scenario_ids_round_trip() {
        for scenario in Scenario::all() {
            assert_eq!(Scenario::from_id(scenario.as_str()), Some(scenario));
        }
    }

    #[test]
    fn test_guide_text_formats() {
        let guide = Guide {
            title: "t".to_string(),
            steps: vec!["Uno".to_string(), "Dos".to_string()],
        };
        assert_eq!(guide.numbered_steps(), vec!["1. Uno", "2. Dos"]);
    }

    #[test]
    fn test_offline_store_and_fallback() {
        let book = GuideBook::builtin();
        let storage = MemoryStorage::new();
        assert!(!GuideBook::offline_copy_present(&storage));

        // Nothing stored yet: falls back to the book
        let lost = book.load_offline(&storage, Scenario::Lost).unwrap();
        assert_eq!(&lost, book.get(Scenario::Lost).unwrap());

        book.store_offline(&storage).unwrap();
        assert!(GuideBook::offline_copy_present(&storage));

        storage.set_item("emergency_guide_fire", "{broken").unwrap();
        let fire = book.load_offline(&storage, Scenario::Fire).unwrap();
        assert_eq!(fire.steps.last().unwrap(), "Llama a los bomberos al 122 o 123");
    }
}
