//! Interactive chat client.
//!
//! Demonstrates:
//! - Building a connection config with all four callbacks
//! - Connecting and sending a user message per stdin line
//! - Automatic reconnect after a dropped connection
//! - Clean shutdown on Ctrl+C
//!
//! Usage:
//!   cargo run --example chat_client -- ws://localhost:3000/ws my-flow
//!   cargo run --example chat_client -- ws://localhost:3000/ws my-flow --chat-id abc
//!   cargo run --example chat_client -- ws://localhost:3000/ws my-flow --debug

// ============================================================================
// Imports
// ============================================================================

use anyhow::{Context, Result, bail};
use chatflow_ws::{ConnectionConfig, ConnectionManager, Message, MessageType};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Args
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    url: String,
    chatflowid: String,
    chat_id: Option<String>,
    debug: bool,
}

impl Args {
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

        let chat_id = args
            .iter()
            .position(|a| a == "--chat-id")
            .and_then(|i| args.get(i + 1))
            .cloned();

        let (Some(url), Some(chatflowid)) = (positional.first(), positional.get(1)) else {
            bail!("usage: chat_client <ws-url> <chatflowid> [--chat-id ID] [--debug]");
        };

        Ok(Self {
            url: (*url).clone(),
            chatflowid: (*chatflowid).clone(),
            chat_id,
            debug: args.iter().any(|a| a == "--debug"),
        })
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "chatflow_ws=debug"
    } else {
        "chatflow_ws=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn run() -> Result<()> {
    let args = Args::parse()?;
    init_logging(args.debug);

    println!("=== Chat Client ===\n");
    println!("    Endpoint: {}", args.url);
    println!("    Chatflow: {}\n", args.chatflowid);

    let mut builder = ConnectionConfig::builder(&args.url, &args.chatflowid)
        .on_open(|| println!("[open] connected"))
        .on_message(print_message)
        .on_close(|info| println!("[close] {info}"))
        .on_error(|e| eprintln!("[error] {e}"));
    if let Some(chat_id) = &args.chat_id {
        builder = builder.chat_id(chat_id);
    }
    let config = builder.build().context("invalid connection settings")?;

    let manager = ConnectionManager::new(config);
    manager.connect().await.context("initial connect failed")?;

    println!("Type a message and press Enter. Ctrl+C to exit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }

                let mut message = Message::user(text);
                if let Some(chat_id) = manager.config().chat_id() {
                    message = message.with_chat_id(chat_id);
                }
                manager.send(&message);
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    manager.disconnect();
    println!("\n[done] disconnected");
    Ok(())
}

fn print_message(message: Message) {
    let body = match &message.data {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };

    match message.message_type {
        MessageType::BotMessage => println!("bot> {body}"),
        MessageType::Error => eprintln!("[server error] {body}"),
        other => println!("[{}] {body}", other.as_str()),
    }
}
