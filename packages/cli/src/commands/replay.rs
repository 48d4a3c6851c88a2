use crate::commands::show::{open_session, print_rows};
use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use mindtree_editor::{
    CommitReport, EntityRef, Identifier, OutlineSession, Problem, RemoteStore,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// JSON script of staged operations
    pub script: PathBuf,

    /// Tree snapshot to start from (defaults to the configured tree file)
    #[arg(short, long)]
    pub tree: Option<PathBuf>,

    /// Write the remote tree to this file when the script is done
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Entity addressed by a script. Ids starting with `$` name an alias bound
/// by an earlier step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Node(String),
    Card(String),
}

/// One scripted operation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    CreateNode {
        #[serde(default, rename = "as")]
        alias: Option<String>,
        #[serde(default)]
        parent: Option<String>,
        text: String,
    },
    CreateCard {
        #[serde(default, rename = "as")]
        alias: Option<String>,
        node: String,
        #[serde(default)]
        title: String,
        #[serde(default)]
        content: String,
    },
    Rename {
        target: Target,
        name: String,
    },
    Edit {
        card: String,
        content: String,
    },
    Problems {
        card: String,
        problems: Vec<Problem>,
    },
    Delete {
        target: Target,
    },
    Move {
        target: Target,
        #[serde(default)]
        parent: Option<String>,
        #[serde(default)]
        position: Option<usize>,
    },
    Reorder {
        target: Target,
        position: usize,
    },
    Copy {
        target: Target,
    },
    Cut {
        target: Target,
    },
    Paste {
        parent: String,
        #[serde(default, rename = "as")]
        alias: Option<String>,
    },
    Commit,
}

pub async fn replay(args: ReplayArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let tree_path = args.tree.unwrap_or_else(|| config.get_tree_path(cwd));
    let content = fs::read_to_string(&args.script)
        .with_context(|| format!("Cannot read script {}", args.script.display()))?;
    let steps: Vec<Step> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid script {}", args.script.display()))?;

    println!("▶️  {} {} step(s)", "Replaying".green().bold(), steps.len());
    println!("   Tree:   {}", tree_path.display());
    println!("   Script: {}", args.script.display());
    println!();

    let session = open_session(&tree_path, &config).await?;
    let mut replay = Replay::new(&session);
    for (i, step) in steps.iter().enumerate() {
        replay
            .run(step)
            .await
            .with_context(|| format!("Step {} failed: {:?}", i + 1, step))?;
    }

    println!();
    session.expand_all();
    print_rows(&session.rows());

    let pending = session.pending_count();
    println!();
    if pending > 0 {
        println!("{} {} change(s) left staged", "⚠️".yellow(), pending);
    }
    if let Some(output) = args.output {
        let tree = session.remote().tree();
        fs::write(&output, serde_json::to_string_pretty(&tree)?)?;
        println!("  {} Wrote {}", "✓".green(), output.display());
    }

    Ok(())
}

/// Runs steps against a session, tracking script aliases across promotion
pub struct Replay<'a, R: RemoteStore> {
    session: &'a OutlineSession<R>,
    aliases: HashMap<String, Identifier>,
    reports: Vec<CommitReport>,
}

impl<'a, R: RemoteStore> Replay<'a, R> {
    pub fn new(session: &'a OutlineSession<R>) -> Self {
        Self {
            session,
            aliases: HashMap::new(),
            reports: Vec::new(),
        }
    }

    pub fn reports(&self) -> &[CommitReport] {
        &self.reports
    }

    pub fn alias(&self, name: &str) -> Option<&Identifier> {
        self.aliases.get(name)
    }

    fn resolve(&self, raw: &str) -> Result<Identifier> {
        match raw.strip_prefix('$') {
            Some(name) => self
                .aliases
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow!("Unknown alias ${name}")),
            None => Ok(Identifier::parse(raw)?),
        }
    }

    fn resolve_parent(&self, raw: Option<&String>) -> Result<Option<Identifier>> {
        raw.map(|p| self.resolve(p)).transpose()
    }

    fn target(&self, target: &Target) -> Result<EntityRef> {
        Ok(match target {
            Target::Node(raw) => EntityRef::node(self.resolve(raw)?),
            Target::Card(raw) => EntityRef::card(self.resolve(raw)?),
        })
    }

    fn bind(&mut self, alias: &Option<String>, id: Identifier) {
        if let Some(alias) = alias {
            debug!(alias = %alias, id = %id, "Bound alias");
            self.aliases.insert(alias.clone(), id);
        }
    }

    pub async fn run(&mut self, step: &Step) -> Result<()> {
        let session = self.session;
        match step {
            Step::CreateNode {
                alias,
                parent,
                text,
            } => {
                let parent = self.resolve_parent(parent.as_ref())?;
                let id = session.stage_create_node(parent.as_ref(), text)?;
                self.bind(alias, id);
            }
            Step::CreateCard {
                alias,
                node,
                title,
                content,
            } => {
                let id = session.stage_create_card(&self.resolve(node)?, title, content)?;
                self.bind(alias, id);
            }
            Step::Rename { target, name } => session.stage_rename(&self.target(target)?, name)?,
            Step::Edit { card, content } => session.stage_edit(&self.resolve(card)?, content)?,
            Step::Problems { card, problems } => {
                session.stage_problems(&self.resolve(card)?, problems.clone())?
            }
            Step::Delete { target } => {
                session.stage_delete(&self.target(target)?)?;
            }
            Step::Move {
                target,
                parent,
                position,
            } => {
                let entity = self.target(target)?;
                let parent = self.resolve_parent(parent.as_ref())?;
                match position {
                    Some(position) => session.stage_move_to(&entity, parent.as_ref(), *position)?,
                    None => session.stage_move(&entity, parent.as_ref())?,
                }
            }
            Step::Reorder { target, position } => {
                session.stage_reorder(&self.target(target)?, *position)?
            }
            Step::Copy { target } => session.copy(&self.target(target)?)?,
            Step::Cut { target } => session.cut(&self.target(target)?)?,
            Step::Paste { parent, alias } => {
                let pasted = session.paste(&self.resolve(parent)?)?;
                self.bind(alias, pasted.id);
            }
            Step::Commit => {
                let report = session.commit().await?;
                print_report(&report);
                for id in self.aliases.values_mut() {
                    if let Some(real) = report.real_id_for(id) {
                        *id = real.clone();
                    }
                }
                self.reports.push(report);
            }
        }
        Ok(())
    }
}

fn print_report(report: &CommitReport) {
    if report.is_success() {
        println!("💾 {} {}", "Commit".green().bold(), report);
    } else {
        println!("💾 {} {}", "Commit".yellow().bold(), report);
    }
    for line in report.details() {
        println!("   {} {}", "✗".red(), line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindtree_editor::{MemoryRemote, TreeSnapshot};

    const TREE: &str = r#"{
        "nodes": [{ "id": "root", "text": "Root", "order": 1 }],
        "edges": []
    }"#;

    #[test]
    fn test_parse_script() {
        let json = r#"[
            { "op": "createNode", "as": "n1", "parent": "root", "text": "N1" },
            { "op": "rename", "target": { "card": "$c1" }, "name": "Intro" },
            { "op": "move", "target": { "node": "a" } },
            { "op": "commit" }
        ]"#;

        let steps: Vec<Step> = serde_json::from_str(json).unwrap();
        assert_eq!(
            steps[0],
            Step::CreateNode {
                alias: Some("n1".to_string()),
                parent: Some("root".to_string()),
                text: "N1".to_string(),
            }
        );
        assert_eq!(
            steps[2],
            Step::Move {
                target: Target::Node("a".to_string()),
                parent: None,
                position: None,
            }
        );
        assert_eq!(steps[3], Step::Commit);
    }

    #[tokio::test]
    async fn test_aliases_follow_promotion() {
        let tree: TreeSnapshot = serde_json::from_str(TREE).unwrap();
        let session = OutlineSession::new(MemoryRemote::with_tree(tree));
        session.load().await.unwrap();

        let steps: Vec<Step> = serde_json::from_str(
            r#"[
                { "op": "createNode", "as": "n1", "parent": "root", "text": "N1" },
                { "op": "createCard", "as": "c1", "node": "$n1", "title": "Draft" },
                { "op": "rename", "target": { "card": "$c1" }, "name": "Intro" },
                { "op": "commit" },
                { "op": "edit", "card": "$c1", "content": "Welcome" },
                { "op": "commit" }
            ]"#,
        )
        .unwrap();

        let mut replay = Replay::new(&session);
        for step in &steps {
            replay.run(step).await.unwrap();
        }

        let card = replay.alias("c1").unwrap();
        assert!(card.is_real());
        assert_eq!(replay.reports().len(), 2);
        assert_eq!(replay.reports()[1].updated.len(), 1);
        assert_eq!(session.content_of(card), Some("Welcome".to_string()));
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_alias_is_an_error() {
        let session = OutlineSession::new(MemoryRemote::new());
        let mut replay = Replay::new(&session);

        let err = replay
            .run(&Step::Edit {
                card: "$missing".to_string(),
                content: String::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown alias $missing");
    }
}
