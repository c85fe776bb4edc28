use clap::Parser;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::select;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sse_chat::client::{MessageSession, Sender, SessionUpdate};
use sse_chat::config::ClientConfig;

/// Terminal chat client for the SSE chat server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Stream endpoint to connect to
    #[arg(long, env = "CHAT_SERVER_URL")]
    server: Option<String>,

    /// User id attached to every sent message
    #[arg(long, env = "CHAT_USER_ID")]
    user_id: Option<String>,

    /// Connect to the server on startup
    #[arg(long)]
    connect: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sse_chat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let mut config = ClientConfig::from_env();
    if let Some(server) = args.server {
        config.server_url = server;
    }
    if args.user_id.is_some() {
        config.user_id = args.user_id;
    }

    if let Err(e) = run(config, args.connect).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: ClientConfig, connect_on_start: bool) -> io::Result<()> {
    let mut session = MessageSession::from_config(&config);
    // `next_line` keeps partial input buffered when another branch wins the select
    let mut stdin = BufReader::new(io::stdin()).lines();

    write_stdout("*** commands: /connect [url], /disconnect, /status, /quit").await?;
    if connect_on_start {
        connect(&mut session, &config.server_url, "").await?;
    }

    loop {
        select! {
            update = session.process_next() => render_update(update).await?,
            line = stdin.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !handle_input(&mut session, &config, line.trim()).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(e) = ctrl_c {
                    tracing::warn!("Ctrl-C handler failed: {}", e);
                }
                break;
            }
        }
    }

    session.disconnect();
    Ok(())
}

/// Returns false when the user asked to leave
async fn handle_input(
    session: &mut MessageSession,
    config: &ClientConfig,
    text: &str,
) -> io::Result<bool> {
    if text.is_empty() {
        return Ok(true);
    }

    let (command, rest) = text.split_once(' ').unwrap_or((text, ""));
    match command {
        "/quit" => {
            write_stdout("*** leaving chat").await?;
            return Ok(false);
        }
        "/connect" => connect(session, &config.server_url, rest).await?,
        "/disconnect" => {
            session.disconnect();
            write_stdout(&format!("*** {}", session.status())).await?;
        }
        "/status" => {
            let endpoint = session.controller().endpoint();
            if endpoint.is_empty() {
                write_stdout(&format!("*** {}", session.status())).await?;
            } else {
                write_stdout(&format!("*** {} ({})", session.status(), endpoint)).await?;
            }
        }
        _ => {
            if let Some(message) = session.send(text) {
                tracing::debug!("Queued message {}", message.id);
            }
        }
    }
    Ok(true)
}

async fn connect(session: &mut MessageSession, default_url: &str, url: &str) -> io::Result<()> {
    let url = if url.trim().is_empty() { default_url } else { url };
    match session.connect(url) {
        Ok(()) => write_stdout(&format!("*** {} {}", session.status(), url.trim())).await,
        Err(e) => write_stderr(&format!("!!! cannot connect: {}", e)).await,
    }
}

async fn render_update(update: SessionUpdate) -> io::Result<()> {
    match update {
        SessionUpdate::Appended(message) => match message.sender {
            Sender::Remote => {
                write_stdout(&format!(
                    "[{}] {}",
                    message.timestamp.format("%H:%M:%S"),
                    message.content
                ))
                .await
            }
            Sender::User => Ok(()),
        },
        SessionUpdate::StatusChanged(status) => write_stdout(&format!("*** {}", status)).await,
        SessionUpdate::Idle => Ok(()),
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
