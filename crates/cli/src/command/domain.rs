use clap::Subcommand;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum CommandAction {
    /// Register a local repository or clone a remote URL
    Add {
        /// Local path or git URL (https://, git@, git://)
        source: String,

        /// Catalog name (default: directory or URL basename)
        #[arg(long)]
        name: Option<String>,

        /// Register only; index later with `reindex`
        #[arg(long)]
        no_index: bool,
    },

    /// List catalog repositories
    List,

    /// Catalog totals by status
    Status,

    /// Remove a repository and its indexed chunks
    Remove { name: String },

    /// Reindex one repository
    Reindex {
        name: String,

        /// Reindex even if HEAD has not moved
        #[arg(long)]
        force: bool,
    },

    /// List indexed repositories whose HEAD moved
    CheckUpdates,

    /// Reindex every repository whose HEAD moved
    ReindexChanged,

    /// Reset repositories left in `indexing` by an interrupted run
    Recover {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Dependency summary for one repository, or cross-repo edges
    Deps { name: Option<String> },

    /// Suggest repositories referenced but missing from the catalog
    Suggest,
}

impl CommandAction {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::List => "list",
            Self::Status => "status",
            Self::Remove { .. } => "remove",
            Self::Reindex { .. } => "reindex",
            Self::CheckUpdates => "check_updates",
            Self::ReindexChanged => "reindex_changed",
            Self::Recover { .. } => "recover",
            Self::Deps { .. } => "deps",
            Self::Suggest => "suggest",
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Ok,
    Error,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub action: &'static str,
    pub status: CommandStatus,
    /// Human-readable rendering of `data`.
    #[serde(skip)]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: Value,
}

impl CommandResponse {
    pub fn ok(action: &CommandAction, data: Value, text: String) -> Self {
        Self {
            action: action.name(),
            status: CommandStatus::Ok,
            text,
            message: None,
            data,
        }
    }

    pub fn error(action: &CommandAction, err: &anyhow::Error) -> Self {
        Self {
            action: action.name(),
            status: CommandStatus::Error,
            text: String::new(),
            message: Some(format!("{err:#}")),
            data: Value::Null,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.status, CommandStatus::Error)
    }
}
