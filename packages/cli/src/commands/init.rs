use crate::config::{Config, DEFAULT_CONFIG_NAME};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Tree snapshot file to create
    #[arg(short, long, default_value = "tree.json")]
    pub tree_file: String,

    /// Skip re-fetching the remote tree before committing moves
    #[arg(long)]
    pub trust_local_edges: bool,

    /// Force overwrite existing config
    #[arg(short, long)]
    pub force: bool,
}

const EXAMPLE_TREE: &str = r#"{
  "nodes": [
    { "id": "root", "text": "Course", "order": 1 },
    { "id": "ch1", "text": "Chapter 1", "order": 1 },
    { "id": "ch2", "text": "Chapter 2", "order": 2 }
  ],
  "edges": [
    { "id": "e-ch1", "source": "root", "target": "ch1" },
    { "id": "e-ch2", "source": "root", "target": "ch2" }
  ],
  "cardsByNode": {
    "ch1": [
      { "docId": "c1", "nodeId": "ch1", "title": "Welcome", "content": "Hello!", "order": 1 }
    ]
  }
}
"#;

pub fn init(args: InitArgs, cwd: &str) -> Result<()> {
    let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

    if config_path.exists() && !args.force {
        println!(
            "{} {} already exists",
            "⚠️".yellow(),
            DEFAULT_CONFIG_NAME.bright_white()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    println!("{}", "📝 Initializing mindtree project...".bright_blue().bold());

    let mut config = Config {
        tree_file: args.tree_file.clone(),
        ..Default::default()
    };
    config.editor.verify_moves_remotely = !args.trust_local_edges;

    let tree_path = config.get_tree_path(cwd);
    if !tree_path.exists() {
        if let Some(dir) = tree_path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&tree_path, EXAMPLE_TREE)?;
        println!("  {} Created {}", "✓".green(), args.tree_file);
    }

    let config_json = serde_json::to_string_pretty(&config)?;
    fs::write(&config_path, config_json)?;

    println!("  {} Created {}", "✓".green(), DEFAULT_CONFIG_NAME);
    println!();
    println!("{}", "✅ Project initialized!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Run: mindtree show");
    println!("  2. Write a script of edits and run: mindtree replay <script.json>");

    Ok(())
}
