//! Mai Assistant - Terminal Driver
//!
//! Drives the streaming assistant from a terminal: chat replies stream to
//! stdout, tool activity and errors go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Ask a question
//! mai chat "How much did I spend on groceries in May?"
//!
//! # Continue a stored conversation
//! mai chat --conversation 12 "And in June?"
//!
//! # Turn free text into transactions, then create them
//! mai parse "coffee 3.50 yesterday, salary 2400 on the 1st" --confirm
//!
//! # Browse stored conversations
//! mai history
//! mai history 12
//!
//! # Replay a captured event stream without a backend
//! mai replay capture.sse --chunk-size 7
//!
//! # Verbose logging
//! RUST_LOG=debug mai chat "hi"
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl-C): cancel the request in flight, keep what arrived

mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use assistant_core::api::ReferenceBook;
use assistant_core::{
    default_config_path, load_config_from_path, ApiClient, AssistantConfig, ChatController,
    ConfigOverrides, ConversationId, Credentials, EventTransport, HttpTransport, ParseController,
    ReplayTransport, Session, SessionStatus,
};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use render::{ChatPrinter, ParsePrinter};

/// Mai - streaming personal-finance assistant
#[derive(Parser, Debug)]
#[command(name = "mai")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "MAI_CONFIG", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// API base URL
    #[arg(long, value_name = "URL", global = true)]
    api_url: Option<String>,

    /// Bearer token
    #[arg(long, value_name = "TOKEN", global = true)]
    token: Option<String>,

    /// Account the assistant works on
    #[arg(long, value_name = "ID", global = true)]
    account: Option<i64>,

    /// User that confirmed transactions belong to
    #[arg(long, value_name = "ID", global = true)]
    user: Option<i64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "MAI_LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message and stream the reply
    Chat {
        /// The message
        message: String,

        /// Continue a stored conversation
        #[arg(long, value_name = "ID")]
        conversation: Option<String>,
    },

    /// Turn free text into transaction proposals
    Parse {
        /// Text describing one or more transactions
        text: String,

        /// Create every selected proposal once revealed
        #[arg(long)]
        confirm: bool,
    },

    /// List stored conversations, or show one
    History {
        /// Conversation to show
        id: Option<String>,
    },

    /// Play a captured event stream through the client
    Replay {
        /// File holding the raw stream bytes
        file: PathBuf,

        /// Deliver the bytes in pieces of this size
        #[arg(long, default_value_t = 4096)]
        chunk_size: usize,

        /// Treat the capture as a parse stream instead of a chat reply
        #[arg(long)]
        parse: bool,
    },
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("mai={level},assistant_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Load configuration and apply command-line overrides
fn resolve_config(args: &Args) -> Result<AssistantConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(url) = &args.api_url {
        overrides = overrides.with_api_base_url(url.clone());
    }
    if let Some(token) = &args.token {
        overrides = overrides.with_api_token(token.clone());
    }
    if let Some(account) = args.account {
        overrides = overrides.with_account_id(account);
    }
    if let Some(user) = args.user {
        overrides = overrides.with_user_id(user);
    }
    overrides.apply(&mut config);
    config.validate()?;

    info!(source = %config.source(), api = %config.api_base_url, "Configuration resolved");
    Ok(config)
}

/// Follow a chat session until it ends; Ctrl-C cancels it
async fn stream_chat<T: EventTransport + 'static>(
    chat: &ChatController<T>,
    session: Session,
    mut printer: ChatPrinter,
) -> Result<SessionStatus> {
    let mut snapshots = chat.subscribe();
    let status = loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break session.wait().await;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                printer.update(&snapshot)?;
            }
            status = session.wait() => break status,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling reply");
                chat.cancel();
            }
        }
    };
    printer.update(&chat.snapshot())?;
    if status == SessionStatus::Cancelled {
        println!();
    }
    Ok(status)
}

/// Follow a parse session through its reveal; Ctrl-C cancels it
async fn stream_parse<T: EventTransport + 'static>(
    parse: &ParseController<T>,
    session: Session,
    references: &ReferenceBook,
) -> Result<SessionStatus> {
    let mut printer = ParsePrinter::new(references);
    let mut snapshots = parse.subscribe();
    let mut status = None;

    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        printer.update(&snapshot)?;
        if snapshot.done || snapshot.error.is_some() || status == Some(SessionStatus::Cancelled) {
            break;
        }
        if status.is_some() && !snapshot.loading {
            break;
        }

        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            finished = session.wait(), if status.is_none() => status = Some(finished),
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling parse");
                parse.cancel();
                status = Some(SessionStatus::Cancelled);
            }
        }
    }
    Ok(status.unwrap_or(session.status()))
}

async fn run_chat<T: EventTransport + 'static>(
    chat: &ChatController<T>,
    message: &str,
) -> Result<SessionStatus> {
    let printer = ChatPrinter::after(&chat.snapshot());
    let Some(session) = chat.send_message(message) else {
        anyhow::bail!("Nothing to send");
    };
    let status = stream_chat(chat, session, printer).await?;

    let snapshot = chat.snapshot();
    if !snapshot.pending_transactions.is_empty() {
        eprintln!(
            "{} transaction(s) proposed; use `mai parse` to review and create them",
            snapshot.pending_transactions.len()
        );
    }
    if let Some(id) = &snapshot.conversation_id {
        eprintln!("conversation {id}");
    }
    Ok(status)
}

async fn chat_command(
    config: &AssistantConfig,
    credentials: Credentials,
    message: &str,
    conversation: Option<String>,
) -> Result<SessionStatus> {
    let transport = Arc::new(HttpTransport::from_config(config, credentials.clone())?);
    let chat = ChatController::new(transport, config.account_id);

    if let Some(id) = conversation {
        let client = ApiClient::from_config(config, credentials)?;
        chat.resume(&client.conversations(), &ConversationId::new(id))
            .await
            .context("Failed to load conversation")?;
        render::print_transcript(&chat.snapshot().transcript)?;
    }

    run_chat(&chat, message).await
}

async fn parse_command(
    config: &AssistantConfig,
    credentials: Credentials,
    text: &str,
    confirm: bool,
) -> Result<SessionStatus> {
    let client = ApiClient::from_config(config, credentials.clone())?;
    let references = match ReferenceBook::load(&client).await {
        Ok(references) => references,
        Err(e) => {
            warn!(error = %e, "Could not load categories and tags");
            ReferenceBook::default()
        }
    };

    let transport = Arc::new(HttpTransport::from_config(config, credentials)?);
    let parse = ParseController::with_timing(transport, config.account_id, config.reveal);
    let Some(session) = parse.parse(text) else {
        anyhow::bail!("Nothing to parse");
    };
    let status = stream_parse(&parse, session, &references).await?;

    if confirm && parse.snapshot().done {
        let created = parse
            .confirm(&client.transactions(config.user_id))
            .await
            .context("Failed to create transactions")?;
        println!("created {} transaction(s)", created.len());
    }
    Ok(status)
}

async fn history_command(
    config: &AssistantConfig,
    credentials: Credentials,
    id: Option<String>,
) -> Result<SessionStatus> {
    let client = ApiClient::from_config(config, credentials)?;
    let conversations = client.conversations();
    match id {
        Some(id) => {
            let stored = conversations.get(&ConversationId::new(id)).await?;
            if !stored.title.is_empty() {
                println!("# {}", stored.title);
            }
            render::print_transcript(&stored.into_turns())?;
        }
        None => render::print_conversations(&conversations.list().await?)?,
    }
    Ok(SessionStatus::Completed)
}

async fn replay_command(
    config: &AssistantConfig,
    file: PathBuf,
    chunk_size: usize,
    parse: bool,
) -> Result<SessionStatus> {
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read capture {}", file.display()))?;
    info!(path = %file.display(), bytes = bytes.len(), chunk_size, "Replaying capture");

    let transport = Arc::new(ReplayTransport::new());
    transport.push_bytes(&bytes, chunk_size);

    if parse {
        let parse = ParseController::with_timing(transport, config.account_id, config.reveal);
        let Some(session) = parse.parse("(replay)") else {
            anyhow::bail!("Nothing to parse");
        };
        stream_parse(&parse, session, &ReferenceBook::default()).await
    } else {
        let chat = ChatController::new(transport, config.account_id);
        run_chat(&chat, "(replay)").await
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = resolve_config(&args)?;
    let credentials = Credentials::new(config.api_token.clone());

    let status = match args.command {
        Command::Chat {
            message,
            conversation,
        } => chat_command(&config, credentials, &message, conversation).await?,
        Command::Parse { text, confirm } => parse_command(&config, credentials, &text, confirm).await?,
        Command::History { id } => history_command(&config, credentials, id).await?,
        Command::Replay {
            file,
            chunk_size,
            parse,
        } => replay_command(&config, file, chunk_size, parse).await?,
    };

    match status {
        SessionStatus::Errored => std::process::exit(1),
        SessionStatus::Cancelled => std::process::exit(130),
        _ => Ok(()),
    }
}
