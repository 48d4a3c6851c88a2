use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use mindtree_editor::{
    ClipboardMode, EntityKind, MemoryRemote, OutlineRow, OutlineSession, TreeSnapshot,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Tree snapshot to show (defaults to the configured tree file)
    pub tree: Option<PathBuf>,

    /// Only show root nodes
    #[arg(short, long)]
    pub collapsed: bool,

    /// Print rows as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn show(args: ShowArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let path = args.tree.unwrap_or_else(|| config.get_tree_path(cwd));
    let session = open_session(&path, &config).await?;

    if !args.collapsed {
        session.expand_all();
    }
    let rows = session.rows();

    if args.json {
        println!("{}", serde_json::to_string_pretty(rows.as_slice())?);
        return Ok(());
    }

    println!("🌳 {} {}", "Outline".green().bold(), path.display());
    println!();
    print_rows(&rows);
    Ok(())
}

/// Read a tree snapshot and load it into a session backed by an in-memory remote
pub async fn open_session(path: &Path, config: &Config) -> Result<OutlineSession<MemoryRemote>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Cannot read tree file {}", path.display()))?;
    let tree: TreeSnapshot = serde_json::from_str(&content)
        .with_context(|| format!("Invalid tree file {}", path.display()))?;
    debug!(nodes = tree.nodes.len(), edges = tree.edges.len(), "Read tree snapshot");

    let session = OutlineSession::with_config(MemoryRemote::with_tree(tree), config.editor.clone());
    session.load().await?;
    Ok(session)
}

pub fn print_rows(rows: &[OutlineRow]) {
    if rows.is_empty() {
        println!("   (empty)");
    }
    for row in rows {
        println!("{}", render_row(row));
    }
}

pub fn render_row(row: &OutlineRow) -> String {
    let marker = match row.entity.kind {
        EntityKind::Card => "□",
        EntityKind::Node if !row.has_children => "•",
        EntityKind::Node if row.is_expanded => "▾",
        EntityKind::Node => "▸",
    };
    let label = match row.entity.kind {
        EntityKind::Node => row.label.as_str().bold(),
        EntityKind::Card => row.label.as_str().normal(),
    };

    let mut line = format!("{}{} {}", "  ".repeat(row.depth), marker, label);
    if row.is_temporary {
        line.push_str(&format!(" {}", "(new)".cyan()));
    } else if row.has_pending_changes {
        line.push_str(&format!(" {}", "*".yellow()));
    }
    match row.clipboard {
        Some(ClipboardMode::Cut) => line.push_str(&format!(" {}", "[cut]".red())),
        Some(ClipboardMode::Copy) => line.push_str(&format!(" {}", "[copy]".blue())),
        None => {}
    }
    line
}
