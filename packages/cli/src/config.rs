use mindtree_editor::EditorConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_NAME: &str = "mindtree.config.json";

/// Mindtree configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// JSON tree snapshot the in-memory remote store starts from
    #[serde(default = "default_tree_file")]
    pub tree_file: String,

    /// Engine switches
    #[serde(default)]
    pub editor: EditorConfig,
}

fn default_tree_file() -> String {
    "tree.json".to_string()
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &str) -> anyhow::Result<Self> {
        let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Absolute path of the tree snapshot
    pub fn get_tree_path(&self, cwd: &str) -> PathBuf {
        PathBuf::from(cwd).join(&self.tree_file)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tree_file: default_tree_file(),
            editor: EditorConfig::default(),
        }
    }
}
