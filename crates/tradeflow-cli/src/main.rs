//! tradeflow - follow a chat session's stream from the terminal
//!
//! Connects to one session, prints connection changes, streamed assistant
//! text and notices. Commands on stdin: `r` reconnects, `h` runs a heartbeat
//! check, `c` clears the event history, `q` quits.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tradeflow_stream::{
    ClientEvent, ConnectionIndicator, MessageDelta, SseTransport, StaticCredentials, StreamClient,
    StreamConfig,
};
use tracing_subscriber::EnvFilter;

/// Follow a TradeFlow chat session stream
#[derive(Parser, Debug)]
#[command(name = "tradeflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Session to follow
    #[arg(short, long)]
    session: String,

    /// Bearer token
    #[arg(long, env = "TRADEFLOW_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Config file (defaults to ~/.tradeflow/stream.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API base URL, overrides config and environment
    #[arg(long)]
    base_url: Option<String>,

    /// Do not reconnect automatically
    #[arg(long)]
    no_reconnect: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<StreamConfig> {
    let mut config = StreamConfig::load(cli.config.as_deref()).context("loading config")?;
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if cli.no_reconnect {
        config.reconnect.auto_reconnect = false;
    }
    config.validate().context("validating config")?;
    Ok(config)
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::StateChanged(status) => {
            let indicator = ConnectionIndicator::from(status);
            eprintln!("[{}] {}", indicator.label, indicator.description);
        }
        ClientEvent::Message(MessageDelta::Created(message)) => {
            print!("\n{}> {}", message.id, message.content);
        }
        ClientEvent::Message(MessageDelta::Appended { text, .. }) => print!("{}", text),
        ClientEvent::Message(MessageDelta::Finalized { .. }) => println!(),
        ClientEvent::Message(MessageDelta::Failed { ids }) => {
            eprintln!("\n[failed] {}", ids.join(", "));
        }
        ClientEvent::Notice(error) => eprintln!("[notice] {}", error),
        ClientEvent::Reconnecting { attempt, delay } => {
            eprintln!("[reconnecting] attempt {} in {:?}", attempt, delay);
        }
        ClientEvent::Event(_) => {}
    }
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let config = load_config(&cli)?;
    let credentials = match &cli.token {
        Some(token) => StaticCredentials::new(token.clone()),
        None => StaticCredentials::signed_out(),
    };
    let transport = SseTransport::new().context("creating HTTP transport")?;
    let client = StreamClient::new(config, Arc::new(transport), Arc::new(credentials));

    let mut events = client.subscribe();
    client
        .connect(cli.session.as_str())
        .await
        .context("connecting")?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event output lagged");
                }
                Err(RecvError::Closed) => break,
            },
            line = stdin.next_line(), if stdin_open => match line.context("reading stdin")? {
                Some(line) => match line.trim() {
                    "r" => client.connect(cli.session.as_str()).await.context("reconnecting")?,
                    "h" => {
                        let health = client.check_heartbeat().await?;
                        eprintln!(
                            "[heartbeat] state={} ready={:?} last_server_heartbeat={:?}",
                            health.state, health.ready_state, health.last_heartbeat_at
                        );
                    }
                    "c" => client.clear_history(),
                    "q" => break,
                    "" => {}
                    other => eprintln!("unknown command '{}': r, h, c or q", other),
                },
                None => stdin_open = false,
            },
        }
    }

    client.disconnect().await?;
    Ok(())
}
