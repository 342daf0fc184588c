pub mod domain;
mod render;

pub use domain::{CommandAction, CommandResponse};

use anyhow::Result;
use codestack_indexer::{RepoRecord, StackCoordinator};
use serde::Serialize;
use serde_json::{json, Value};

pub struct CommandHandler {
    coordinator: StackCoordinator,
    interactive: bool,
}

fn to_data<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn confirm_recovery(stuck: &[RepoRecord]) -> bool {
    eprintln!("Repositories left in `indexing` by an interrupted run:");
    for record in stuck {
        eprintln!("  {} ({})", record.name, record.path.display());
    }
    dialoguer::Confirm::new()
        .with_prompt("Reset them to pending?")
        .default(false)
        .interact()
        .unwrap_or(false)
}

impl CommandHandler {
    pub fn new(coordinator: StackCoordinator) -> Self {
        Self {
            coordinator,
            interactive: true,
        }
    }

    /// Without a terminal to ask, `recover` proceeds only with `--force`.
    #[must_use]
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub async fn execute(&self, action: &CommandAction) -> Result<CommandResponse> {
        let coordinator = &self.coordinator;
        let (data, text) = match action {
            CommandAction::Add {
                source,
                name,
                no_index,
            } => {
                let added = coordinator
                    .add_repo(source, name.as_deref(), !no_index)
                    .await?;
                (to_data(&added)?, render::added(&added))
            }
            CommandAction::List => {
                let records = coordinator.stack().list().await?;
                (to_data(&records)?, render::records(&records))
            }
            CommandAction::Status => {
                let stats = coordinator.stack_stats().await?;
                let interrupted = coordinator.interrupted();
                let mut text = render::stats(&stats);
                if !interrupted.is_empty() {
                    text.push('\n');
                    text.push_str(&render::names(
                        &interrupted,
                        "",
                        "Interrupted (run `codestack recover`):",
                    ));
                }
                (
                    json!({ "stats": stats, "interrupted": interrupted }),
                    text,
                )
            }
            CommandAction::Remove { name } => {
                let record = coordinator.remove_repo(name).await?;
                let text = format!("Removed {}", record.name);
                (to_data(&record)?, text)
            }
            CommandAction::Reindex { name, force } => {
                let result = coordinator.reindex_repo(name, *force).await?;
                (to_data(&result)?, render::index_result(&result))
            }
            CommandAction::CheckUpdates => {
                let stale = coordinator.check_updates().await?;
                let text = render::names(
                    &stale,
                    "All repositories are up to date.",
                    "Repositories with new commits:",
                );
                (to_data(&stale)?, text)
            }
            CommandAction::ReindexChanged => {
                let outcomes = coordinator.reindex_changed().await?;
                (to_data(&outcomes)?, render::sweep(&outcomes))
            }
            CommandAction::Recover { force } => {
                let interactive = self.interactive;
                let reset = coordinator
                    .recover(*force, |stuck| interactive && confirm_recovery(stuck))
                    .await?;
                let text = render::names(&reset, "Nothing recovered.", "Reset to pending:");
                (to_data(&reset)?, text)
            }
            CommandAction::Deps { name: Some(name) } => {
                let summary = coordinator.dependency_summary(name).await?;
                let cycles = coordinator.circular_dependencies(name).await?;
                let text = render::dependencies(&summary, &cycles);
                (json!({ "summary": summary, "cycles": cycles }), text)
            }
            CommandAction::Deps { name: None } => {
                let edges = coordinator.cross_repo_dependencies().await?;
                (to_data(&edges)?, render::edges(&edges))
            }
            CommandAction::Suggest => {
                let suggestions = coordinator.suggest_missing_repos().await?;
                (to_data(&suggestions)?, render::suggestions(&suggestions))
            }
        };
        Ok(CommandResponse::ok(action, data, text))
    }
}
