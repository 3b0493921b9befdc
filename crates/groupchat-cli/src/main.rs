mod config;
mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use config::{BotConfig, Overrides};
use groupchat::ConversationEngine;
use groupchat::llm::providers::OpenAICompatProvider;
use groupchat::storage::create_stores;
use repl::ChatSession;

#[derive(Parser, Debug)]
#[command(name = "groupchat-cli", version, about = "Chat with the group chat bot from a terminal")]
struct Cli {
    /// Config file (default: <config dir>/groupchat/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chat in a room, one line per message
    Chat(ChatArgs),
    /// Print the effective configuration as YAML
    ShowConfig(ChatArgs),
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// Conversation identifier, one per group chat
    #[arg(short, long, default_value = "cli")]
    room: String,

    /// Speaker label prefixed to each message
    #[arg(short, long)]
    speaker: Option<String>,

    /// Model identifier sent to the provider
    #[arg(short, long)]
    model: Option<String>,

    /// Keep history in the configured store
    #[arg(long)]
    persist: bool,

    /// Let the bot remember facts across conversations
    #[arg(long)]
    memory: bool,
}

impl ChatArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            persist: self.persist,
            memory: self.memory,
            speaker: self.speaker.clone(),
            model: self.model.clone(),
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>, args: &ChatArgs) -> Result<BotConfig> {
    let mut config = BotConfig::load(path.map(PathBuf::as_path))?;
    config.apply_overrides(&args.overrides());
    Ok(config)
}

async fn chat(config: BotConfig, room: String) -> Result<()> {
    let llm = OpenAICompatProvider::new(&config.provider).context("failed to set up the model provider")?;
    info!(base_url = llm.base_url(), model = %config.conversation.model, "Provider ready");

    let mut builder = ConversationEngine::builder().llm(Arc::new(llm));
    if let Some(stores) = create_stores(&config.storage)
        .await
        .context("failed to open storage")?
    {
        builder = builder.history_store(stores.history).memory_store(stores.memory);
    }
    let engine = builder.build()?;

    ChatSession::new(engine, room, config.conversation).run().await
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Chat(args) => {
            let config = load_config(cli.config.as_ref(), &args)?;
            chat(config, args.room).await
        }
        Command::ShowConfig(args) => {
            let config = load_config(cli.config.as_ref(), &args)?;
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_chat_flags() {
        let cli = Cli::try_parse_from([
            "groupchat-cli",
            "chat",
            "--room",
            "room-1",
            "--speaker",
            "Alice",
            "--persist",
            "--memory",
        ])
        .unwrap();

        let Command::Chat(args) = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(args.room, "room-1");
        assert_eq!(args.speaker.as_deref(), Some("Alice"));
        assert!(args.persist && args.memory);
    }

    #[test]
    fn test_config_flag_is_global() {
        let cli = Cli::try_parse_from(["groupchat-cli", "show-config", "--config", "bot.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("bot.yaml")));
        assert!(matches!(cli.command, Command::ShowConfig(ref args) if args.room == "cli"));
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
