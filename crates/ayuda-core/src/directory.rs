use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};

const BUILTIN_DIRECTORY: &str = include_str!("../data/directory.json");

/// Icon family an icon name belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IconType {
    MaterialCommunity,
    Fa5,
    Material,
    Ionicons,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyServiceItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Guide identifier (`fire`, `earthquake`, ...) for guide entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    pub icon: String,
    pub color: String,
    pub icon_type: IconType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyCategory {
    pub title: String,
    pub icon: String,
    pub icon_type: IconType,
    pub color: String,
    pub items: Vec<EmergencyServiceItem>,
}

/// Numbers that must be reachable without any network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyNumbers {
    pub police: String,
    pub firefighters: String,
    pub firefighters_municipal: String,
    pub ambulance: String,
    pub child_protection: String,
}

/// Read-only emergency directory: the home screen shortcuts and the full
/// service listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directory {
    numbers: EmergencyNumbers,
    home: Vec<EmergencyCategory>,
    explore: Vec<EmergencyCategory>,
}

impl Directory {
    /// The directory compiled into the binary
    pub fn builtin() -> Self {
        // The embedded file is covered by tests, so parsing it cannot fail at runtime
        serde_json::from_str(BUILTIN_DIRECTORY).unwrap_or_else(|_| Self::empty())
    }

    fn empty() -> Self {
        Self {
            numbers: EmergencyNumbers {
                police: "110".to_string(),
                firefighters: "122".to_string(),
                firefighters_municipal: "123".to_string(),
                ambulance: "128".to_string(),
                child_protection: "1546".to_string(),
            },
            home: Vec::new(),
            explore: Vec::new(),
        }
    }

    pub async fn load_from_json(path: &std::path::Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read directory file {:?}: {}", path, e))?;
        let directory: Directory = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Invalid directory file {:?}: {}", path, e))?;

        tracing::info!(
            categories = directory.explore.len(),
            services = directory.service_count(),
            "loaded emergency directory from {:?}",
            path
        );
        Ok(directory)
    }

    pub fn numbers(&self) -> &EmergencyNumbers {
        &self.numbers
    }

    pub fn home_categories(&self) -> &[EmergencyCategory] {
        &self.home
    }

    pub fn service_count(&self) -> usize {
        self.explore.iter().map(|c| c.items.len()).sum()
    }

    /// Case-insensitive match on service name, category title or phone number
    pub fn search(&self, query: &str, limit: usize) -> Vec<(&EmergencyCategory, &EmergencyServiceItem)> {
        let query_lower = query.trim().to_lowercase();

        self.explore
            .iter()
            .flat_map(|category| category.items.iter().map(move |item| (category, item)))
            .filter(|(category, item)| {
                query_lower.is_empty()
                    || item.name.to_lowercase().contains(&query_lower)
                    || category.title.to_lowercase().contains(&query_lower)
                    || item.phone.as_deref().is_some_and(|p| p.contains(&query_lower))
            })
            .take(limit)
            .collect()
    }
}

/// Parse `#RRGGBB`
pub fn parse_hex_color(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_directory_parses() {
        let directory: Directory = serde_json::from_str(BUILTIN_DIRECTORY).unwrap();
        assert_eq!(directory.home_categories().len(), 2);
        assert_eq!(directory.explore.len(), 5);
        assert_eq!(directory.service_count(), 16);
        assert_eq!(directory.numbers().ambulance, "128");
    }

    #[test]
    fn test_home_scenarios() {
        let directory = Directory::builtin();
        let scenarios: Vec<&str> = directory
            .home_categories()
            .iter()
            .flat_map(|c| c.items.iter())
            .filter_map(|i| i.scenario.as_deref())
            .collect();
        assert_eq!(scenarios, vec!["fire", "earthquake", "firstAid", "lost"]);
    }

    #[test]
    fn test_search_matches_name_category_and_phone() {
        let directory = Directory::builtin();

        let by_name = directory.search("roosevelt", 10);
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].1.phone.as_deref(), Some("2321-7400"));

        let by_category = directory.search("médicos", 10);
        assert_eq!(by_category.len(), 3);

        let by_phone = directory.search("1566", 10);
        assert_eq!(by_phone[0].1.name, "CONRED");

        assert_eq!(directory.search("", 4).len(), 4);
        assert!(directory.search("zzz", 10).is_empty());
    }

    #[test]
    fn test_icon_type_names() {
        let item: EmergencyServiceItem = serde_json::from_str(
            r##"{"name":"x","icon":"pets","color":"#00BBF9","icon_type":"material-community"}"##,
        )
        .unwrap();
        assert_eq!(item.icon_type, IconType::MaterialCommunity);
        assert_eq!(serde_json::to_string(&IconType::Fa5).unwrap(), "\"fa5\"");
    }

    #[test]
    fn test_colors() {
        assert_eq!(parse_hex_color("#F8333C"), Some((0xF8, 0x33, 0x3C)));
        assert_eq!(parse_hex_color("F8333C"), Some((0xF8, 0x33, 0x3C)));
        assert_eq!(parse_hex_color("#FFF"), None);
    }

    #[tokio::test]
    async fn test_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("directory.json");
        std::fs::write(&path, BUILTIN_DIRECTORY).unwrap();

        let directory = Directory::load_from_json(&path).await.unwrap();
        assert_eq!(directory.service_count(), 16);

        assert!(Directory::load_from_json(&dir.path().join("missing.json")).await.is_err());
    }
}
