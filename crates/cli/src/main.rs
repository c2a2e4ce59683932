use anyhow::Result;
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use termdesk_book::{load_books, Operation};
use termdesk_core::{Credential, DeskConfig, TerminalClient, TerminalFactory};
use termdesk_engine::{AccountInfoAction, Action, Desk, DeskError, ListBooksAction};
use termdesk_terminals_metatrader::MetaTraderFactory;
use termdesk_terminals_simulated::SimulatedTerminal;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_CONFIG: &str = "termdesk.toml";

#[derive(Parser)]
#[command(name = "termdesk")]
#[command(about = "Trading desk over pooled MetaTrader terminals")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Path to the configuration file
    #[arg(short, long, env = "TERMDESK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct AccountArgs {
    /// Account login
    #[arg(long)]
    login: u64,

    /// Account password
    #[arg(long, env = "TERMDESK_PASSWORD", hide_env_values = true)]
    password: String,

    /// Account server (e.g. "XMTrading-Real 12")
    #[arg(long)]
    server: String,
}

impl AccountArgs {
    fn credential(&self) -> Credential {
        Credential::new(self.login, self.password.clone(), self.server.clone())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Bind address; overrides the config file
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// List registered terminals
    Terminals,

    /// List an account's pending orders and open positions
    Books {
        #[command(flatten)]
        account: AccountArgs,

        /// Only books with this magic number
        #[arg(long)]
        magic: Option<u64>,
    },

    /// Show the account snapshot
    Account {
        #[command(flatten)]
        account: AccountArgs,
    },

    /// Close a pending order or open position by ticket
    Close {
        #[command(flatten)]
        account: AccountArgs,

        #[arg(long)]
        ticket: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt().with_env_filter(filter).with_target(false).init();

    let config = load_config(cli.config.as_deref())?;
    let desk = Desk::from_config(terminal_factory(&config), &config);

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            termdesk_api::start_server(desk, &bind).await?;
        }
        Commands::Terminals => {
            let terminals = desk.list_terminals();
            if terminals.is_empty() {
                println!("No terminals registered.");
            }
            for (broker, paths) in terminals {
                println!("{}:", broker);
                for path in paths {
                    println!("  {}", path);
                }
            }
        }
        Commands::Books { account, magic } => {
            let action = ListBooksAction::new(magic);
            run_once(&desk, account.credential(), Box::new(action)).await?;
        }
        Commands::Account { account } => {
            run_once(&desk, account.credential(), Box::new(AccountInfoAction)).await?;
        }
        Commands::Close { account, ticket } => {
            let action = CloseTicket { ticket };
            run_once(&desk, account.credential(), Box::new(action)).await?;
        }
    }

    Ok(())
}

/// Explicit path, else `termdesk.toml` in the working directory, else defaults.
fn load_config(path: Option<&Path>) -> Result<DeskConfig> {
    let config = match path {
        Some(path) => DeskConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => DeskConfig::load(DEFAULT_CONFIG)?,
        None => DeskConfig::default(),
    };
    Ok(config)
}

fn terminal_factory(config: &DeskConfig) -> Arc<dyn TerminalFactory> {
    match &config.bridge {
        Some(bridge) => {
            tracing::info!(host = %bridge.host, port = bridge.port, "Using MetaTrader bridge");
            Arc::new(MetaTraderFactory::new(bridge.clone()))
        }
        None => {
            tracing::warn!("No bridge configured, terminals are simulated");
            Arc::new(|_: &str| -> Box<dyn TerminalClient> { Box::new(SimulatedTerminal::demo()) })
        }
    }
}

async fn run_once(desk: &Desk, credential: Credential, action: Box<dyn Action>) -> Result<()> {
    let (id, result) = desk.run(credential, action).await;
    tracing::debug!(action_id = %id, "Action finished");
    let value = result?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Finds a ticket in the account's inventory and closes it.
struct CloseTicket {
    ticket: u64,
}

#[async_trait]
impl Action for CloseTicket {
    fn name(&self) -> &str {
        "close_ticket"
    }

    async fn run(&mut self, terminal: &mut dyn TerminalClient) -> Result<Value, DeskError> {
        let mut book = load_books(terminal, None)
            .await?
            .into_iter()
            .find(|b| b.ticket_id == Some(self.ticket))
            .ok_or_else(|| DeskError::Action(format!("ticket {} not found", self.ticket)))?;

        let outcome = book.apply(terminal, Operation::Close).await?.escalate()?;
        Ok(serde_json::json!({ "book": book, "outcome": outcome }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from([
            "termdesk",
            "books",
            "--login",
            "7",
            "--password",
            "pw",
            "--server",
            "Acme-Live",
            "--magic",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Books { account, magic } => {
                assert_eq!(account.credential().validate(), Ok(7));
                assert_eq!(magic, Some(3));
            }
            _ => panic!("expected books"),
        }
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/termdesk.toml"))).is_err());
    }
}
