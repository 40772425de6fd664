use serde::{Deserialize, Serialize};

/// A linked application shown in the service directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceEntry {
    /// Stable identifier / slug
    pub id: String,
    /// Display name
    pub name: String,
    /// Browser-visible URL
    pub url: String,
    pub description: String,
    /// Emoji or icon name
    pub icon: String,
}

impl ServiceEntry {
    pub fn new(id: &str, name: &str, url: &str, description: &str, icon: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            description: description.to_string(),
            icon: icon.to_string(),
        }
    }
}
