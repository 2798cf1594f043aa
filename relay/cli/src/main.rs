//! Relay CLI - Terminal Front End for the Conversation Relay
//!
//! Runs one turn against the configured backend and prints the downstream
//! frames as `text/event-stream` records on stdout. Logs go to stderr so the
//! frame output can be piped.
//!
//! # Usage
//!
//! ```bash
//! # New conversation
//! relay chat "What is the capital of France?"
//!
//! # Continue a conversation
//! relay chat --conversation 6f1c... "And of Spain?"
//!
//! # Different backend for one run
//! relay --backend single-json --endpoint http://localhost:8080/chat chat "Hi"
//!
//! # Browse stored conversations
//! relay conversations --limit 5
//! relay history 6f1c...
//! relay delete 6f1c...
//!
//! # Verbose logging
//! RUST_LOG=relay_core=debug relay chat "Hi"
//! ```
//!
//! # Signals
//!
//! - `SIGINT`: cancels the running turn; `stream_end` is still printed

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use relay_core::{
    build_transport, load_config_from_path, store::DEFAULT_CONVERSATION_LIMIT,
    store::DEFAULT_MESSAGE_LIMIT, wire, BackendKind, ChatTurn, ConfigOverrides, ConversationStore,
    RelayConfig, RelayError, SqliteStore, StreamOrchestrator, TurnRequest, WireDialect,
};

/// Relay - stream a conversation turn through an LLM agent backend
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "RELAY_CONFIG", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    /// Backend kind (delta-stream, single-json, accept-and-forget)
    #[arg(short = 'b', long, value_parser = parse_backend, global = true)]
    backend: Option<BackendKind>,

    /// Upstream endpoint URL
    #[arg(short = 'e', long, value_name = "URL", global = true)]
    endpoint: Option<String>,

    /// Emit the legacy frame dialect
    #[arg(long, global = true)]
    legacy_wire: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "RELAY_LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a user message and stream the reply
    Chat {
        /// Message text; multiple words are joined with spaces
        #[arg(required = true)]
        message: Vec<String>,

        /// Continue an existing conversation
        #[arg(long, value_name = "ID")]
        conversation: Option<String>,

        /// Title for a new conversation
        #[arg(long)]
        title: Option<String>,
    },

    /// List stored conversations, most recently updated first
    Conversations {
        /// Maximum number of conversations
        #[arg(long, default_value_t = DEFAULT_CONVERSATION_LIMIT)]
        limit: usize,

        /// Number of conversations to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Print the messages of one conversation, oldest first
    History {
        /// Conversation id
        id: String,

        /// Maximum number of messages
        #[arg(long, default_value_t = DEFAULT_MESSAGE_LIMIT)]
        limit: usize,

        /// Number of messages to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Delete a conversation and its messages
    Delete {
        /// Conversation id
        id: String,
    },
}

fn parse_backend(value: &str) -> Result<BackendKind, String> {
    value.parse()
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("relay={level},relay_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration and apply command-line overrides
fn resolve_config(args: &Args) -> Result<RelayConfig> {
    let mut config =
        load_config_from_path(args.config.clone()).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(kind) = args.backend {
        overrides = overrides.with_backend_kind(kind);
    }
    if let Some(endpoint) = &args.endpoint {
        overrides = overrides.with_endpoint(endpoint.clone());
    }
    if let Some(db) = &args.db {
        overrides = overrides.with_store_path(db.clone());
    }
    if args.legacy_wire {
        overrides = overrides.with_wire_dialect(WireDialect::Legacy);
    }
    overrides.apply(&mut config);

    info!(
        source = %config.source(),
        backend = %config.backend.kind,
        store = ?config.store_path,
        "Configuration resolved"
    );
    Ok(config)
}

async fn open_store(config: &RelayConfig) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&config.store_path)
        .await
        .with_context(|| format!("Failed to open database at {:?}", config.store_path))?;
    Ok(Arc::new(store))
}

async fn run_chat(
    config: RelayConfig,
    message: String,
    conversation: Option<String>,
    title: Option<String>,
) -> Result<()> {
    config.validate()?;

    let store = open_store(&config).await?;
    let transport = build_transport(&config.backend)?;
    let orchestrator =
        StreamOrchestrator::new(store, transport).with_config(config.orchestrator.clone());

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling turn");
                cancel.cancel();
            }
        })
    };

    let mut request =
        TurnRequest::new(vec![ChatTurn::user(message)]).with_cancellation(cancel.clone());
    if let Some(id) = conversation {
        request = request.with_conversation(id);
    }
    if let Some(title) = title {
        request = request.with_title(title);
    }

    let turn = match orchestrator.stream(request).await {
        Ok(turn) => turn,
        Err(e) => {
            ctrl_c.abort();
            let status = e.status_hint();
            return Err(anyhow::Error::new(e).context(format!("Turn rejected (status {status})")));
        }
    };
    info!(conversation_id = turn.conversation_id(), "Streaming turn");

    let written = write_records(
        wire::encode_stream(turn, config.wire_dialect),
        &mut tokio::io::stdout(),
    )
    .await;

    ctrl_c.abort();
    written
}

/// Write each SSE record as it arrives, flushing after every record
async fn write_records<S, W>(records: S, out: &mut W) -> Result<()>
where
    S: Stream<Item = String>,
    W: AsyncWrite + Unpin,
{
    let mut records = std::pin::pin!(records);
    while let Some(record) = records.next().await {
        out.write_all(record.as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}

async fn run_conversations(config: RelayConfig, limit: usize, offset: usize) -> Result<()> {
    let store = open_store(&config).await?;
    let summaries = store.list_conversations(limit, offset).await?;
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}

async fn run_history(config: RelayConfig, id: String, limit: usize, offset: usize) -> Result<()> {
    let store = open_store(&config).await?;
    if !store.conversation_exists(&id).await? {
        return Err(RelayError::NotFound { conversation_id: id }.into());
    }
    let messages = store.get_messages(&id, limit, offset).await?;
    println!("{}", serde_json::to_string_pretty(&messages)?);
    Ok(())
}

async fn run_delete(config: RelayConfig, id: String) -> Result<()> {
    let store = open_store(&config).await?;
    if !store.conversation_exists(&id).await? {
        return Err(RelayError::NotFound { conversation_id: id }.into());
    }
    store.delete_conversation(&id).await?;
    info!(conversation_id = %id, "Conversation deleted");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = resolve_config(&args)?;

    match args.command {
        Command::Chat {
            message,
            conversation,
            title,
        } => run_chat(config, message.join(" "), conversation, title).await,
        Command::Conversations { limit, offset } => run_conversations(config, limit, offset).await,
        Command::History { id, limit, offset } => run_history(config, id, limit, offset).await,
        Command::Delete { id } => run_delete(config, id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_args_join_words() {
        let args = Args::try_parse_from([
            "relay",
            "--backend",
            "single_json",
            "chat",
            "--conversation",
            "abc",
            "hello",
            "there",
        ])
        .unwrap();

        assert_eq!(args.backend, Some(BackendKind::SingleJson));
        match args.command {
            Command::Chat {
                message,
                conversation,
                title,
            } => {
                assert_eq!(message.join(" "), "hello there");
                assert_eq!(conversation.as_deref(), Some("abc"));
                assert!(title.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["relay", "conversations", "--limit", "5", "--legacy-wire"])
                .unwrap();
        assert!(args.legacy_wire);
        assert!(matches!(
            args.command,
            Command::Conversations { limit: 5, offset: 0 }
        ));
    }

    #[test]
    fn test_rejects_unknown_backend() {
        assert!(Args::try_parse_from(["relay", "--backend", "carrier-pigeon", "delete", "x"]).is_err());
    }

    #[tokio::test]
    async fn test_write_records_in_order() {
        let frames = futures::stream::iter([
            relay_core::DownstreamFrame::Conversation {
                conversation_id: "c1".to_string(),
            },
            relay_core::DownstreamFrame::StreamEnd,
        ]);
        let mut out: Vec<u8> = Vec::new();

        write_records(wire::encode_stream(frames, WireDialect::Standard), &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let records: Vec<&str> = text.split_terminator("\n\n").collect();
        assert_eq!(records.len(), 2);
        assert!(records[0].starts_with("data: {"));
        assert!(records[0].contains("\"conversation_id\":\"c1\""));
        assert_eq!(records[1], r#"data: {"type":"stream_end"}"#);
    }

    #[test]
    fn test_chat_requires_message() {
        assert!(Args::try_parse_from(["relay", "chat"]).is_err());
    }
}
