use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tracing::debug;

use crate::{cli::ClientArgs, protocol::write_line};

pub async fn run(args: ClientArgs) -> Result<()> {
    let response = send_request(args.server, args.request.line()).await?;
    write_stdout(&response).await?;
    Ok(())
}

/// Sends one request line and returns everything the server replies with,
/// minus the final newline.
pub async fn send_request(server: SocketAddr, line: &str) -> Result<String> {
    let mut stream = TcpStream::connect(server)
        .await
        .with_context(|| format!("failed to connect to {server}"))?;
    debug!("connected to {}", server);

    write_line(&mut stream, line)
        .await
        .with_context(|| format!("failed to send request to {server}"))?;

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .with_context(|| format!("failed to read response from {server}"))?;

    let trimmed = response.strip_suffix('\n').unwrap_or(&response);
    Ok(trimmed.to_string())
}

async fn write_stdout(text: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
