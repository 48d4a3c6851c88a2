use serde::{Deserialize, Serialize};

/// Behavior switches of an editing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    /// Re-fetch the remote tree before reconciling reparented nodes
    #[serde(default = "default_true")]
    pub verify_moves_remotely: bool,

    /// Expand a node when a child is staged under it
    #[serde(default = "default_true")]
    pub expand_on_create: bool,

    /// Title given to cards created without one
    #[serde(default = "default_card_title")]
    pub default_card_title: String,
}

fn default_true() -> bool {
    true
}

fn default_card_title() -> String {
    "Untitled".to_string()
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            verify_moves_remotely: default_true(),
            expand_on_create: default_true(),
            default_card_title: default_card_title(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: EditorConfig = serde_json::from_str(r#"{ "verifyMovesRemotely": false }"#).unwrap();

        assert!(!config.verify_moves_remotely);
        assert!(config.expand_on_create);
        assert_eq!(config.default_card_title, "Untitled");
    }
}
