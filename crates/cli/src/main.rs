mod command;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use codestack_indexer::{StackCoordinator, StackSettings};
use command::{CommandAction, CommandHandler, CommandResponse};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "codestack")]
#[command(about = "Index a stack of repositories and keep it current", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (default: $CODESTACK_CONFIG or ~/.codestack/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Trace-level logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: CommandAction,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        match (self.debug, self.verbose) {
            (true, _) | (_, 2..) => "trace",
            (_, 1) => "debug",
            _ => "info",
        }
    }
}

fn init_logging(level: &str) {
    // RUST_LOG wins over the flags.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .try_init();
}

fn print_response(response: &CommandResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
    } else if response.is_error() {
        eprintln!("Error: {}", response.message.as_deref().unwrap_or("unknown"));
    } else if !response.text.is_empty() {
        println!("{}", response.text);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<bool> {
    let settings =
        StackSettings::load(cli.config.as_deref()).context("Failed to load settings")?;
    log::debug!("Catalog at {}", settings.catalog_path().display());

    let coordinator = StackCoordinator::open(settings)
        .await
        .context("Failed to open the repository stack")?;
    let handler = CommandHandler::new(coordinator).interactive(std::io::stdin().is_terminal());

    let response = match handler.execute(&cli.command).await {
        Ok(response) => response,
        Err(err) => CommandResponse::error(&cli.command, &err),
    };
    print_response(&response, cli.json)?;
    Ok(!response.is_error())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level());

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("codestack").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = parse(&["reindex", "api", "--force", "--json", "-vv"]);
        assert_eq!(
            cli.command,
            CommandAction::Reindex {
                name: "api".to_string(),
                force: true
            }
        );
        assert!(cli.json);
        assert_eq!(cli.log_level(), "trace");
    }

    #[test]
    fn add_accepts_name_and_no_index() {
        let cli = parse(&[
            "--config",
            "/tmp/c.toml",
            "add",
            "git@github.com:acme/api.git",
            "--name",
            "backend",
            "--no-index",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert_eq!(
            cli.command,
            CommandAction::Add {
                source: "git@github.com:acme/api.git".to_string(),
                name: Some("backend".to_string()),
                no_index: true,
            }
        );
        assert_eq!(cli.log_level(), "info");
    }

    #[test]
    fn kebab_case_subcommands() {
        assert_eq!(parse(&["check-updates"]).command, CommandAction::CheckUpdates);
        assert_eq!(parse(&["reindex-changed", "-v"]).log_level(), "debug");
        assert_eq!(parse(&["deps"]).command, CommandAction::Deps { name: None });
        assert!(Cli::try_parse_from(["codestack", "remove"]).is_err());
    }

    #[test]
    fn error_response_serializes_message_without_text() {
        let action = CommandAction::List;
        let response = CommandResponse::error(&action, &anyhow::anyhow!("catalog locked"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "action": "list",
                "status": "error",
                "message": "catalog locked",
                "data": null
            })
        );
    }
}
