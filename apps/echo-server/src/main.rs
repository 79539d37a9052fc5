//! Saltpipe secure echo server and client
//!
//! `saltpipe -l <PORT>` serves forever; `saltpipe <HOST:PORT> [MESSAGE]`
//! sends one message and prints the echo.

use std::io::Write;

use anyhow::Context;
use clap::Parser;
use echo_server::{EchoServer, echo_once};
use secure_channel::{ChannelConfig, MAX_PLAINTEXT};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "saltpipe", version, about = "Secure echo server and client")]
struct Cli {
    /// Run the echo server on this TCP port
    #[arg(short = 'l', long = "listen", value_name = "PORT")]
    listen: Option<u16>,

    /// Address of an echo server to talk to
    #[arg(
        value_name = "HOST:PORT",
        required_unless_present = "listen",
        conflicts_with = "listen"
    )]
    addr: Option<String>,

    /// Message to send; without it only the handshake is performed
    #[arg(value_name = "MESSAGE", requires = "addr")]
    message: Option<String>,

    /// Largest message in bytes; both peers must agree
    #[arg(long, value_name = "BYTES", default_value_t = MAX_PLAINTEXT)]
    max_message: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout only carries the echoed message
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("saltpipe=info".parse()?)
                .add_directive("echo_server=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ChannelConfig::new(cli.max_message)?;

    match (cli.listen, cli.addr) {
        (Some(port), _) => run_server(port, config).await,
        (None, Some(addr)) => run_client(&addr, cli.message.as_deref(), config).await,
        (None, None) => anyhow::bail!("either -l <PORT> or <HOST:PORT> is required"),
    }
}

async fn run_server(port: u16, config: ChannelConfig) -> anyhow::Result<()> {
    let server = EchoServer::bind(("0.0.0.0", port), config).await?;
    info!("Starting Saltpipe echo server on {}", server.local_addr()?);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }
    Ok(())
}

async fn run_client(addr: &str, message: Option<&str>, config: ChannelConfig) -> anyhow::Result<()> {
    let reply = echo_once(addr, message.map(str::as_bytes), config)
        .await
        .with_context(|| format!("echo via {addr} failed"))?;

    if let Some(reply) = reply {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&reply)?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
    }
    Ok(())
}
