use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufRead, AsyncWriteExt, BufReader},
    net::TcpStream,
    time::timeout,
};
use tracing::{debug, warn};

use crate::{
    audit::AuditLog,
    protocol::{self, MAX_REQUEST_BYTES, read_request, write_line},
    store::VoteStore,
};

/// Everything a connection worker needs, shared by all workers.
#[derive(Debug)]
pub struct SharedState {
    pub store: Arc<VoteStore>,
    pub audit: AuditLog,
    /// How long a client may take to send its request; `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

/// Pool job for one accepted connection. Errors stay inside this connection.
pub async fn serve(stream: TcpStream, peer: SocketAddr, state: Arc<SharedState>) {
    if let Err(err) = handle_connection(stream, peer, &state).await {
        warn!(peer = %peer, error = ?err, "connection closed with error");
    }
}

/// Reads one request, records it, answers it and closes the connection.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: &SharedState,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let raw = match read_within(&mut reader, state.idle_timeout).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!(%peer, "client closed the connection before sending a request");
            return Ok(());
        }
        Err(err) if err.kind() == io::ErrorKind::TimedOut => {
            debug!(%peer, "client sent no request before the idle timeout");
            return Ok(());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read request from {peer}"));
        }
    };

    if let Err(err) = state.audit.record(peer.ip(), &raw).await {
        warn!(%peer, error = %err, "failed to record request in audit log");
    }

    let response = protocol::process(&state.store, &raw);
    debug!(%peer, request = %raw, "answering request");

    write_line(&mut writer, &response)
        .await
        .with_context(|| format!("failed to send response to {peer}"))?;
    writer
        .shutdown()
        .await
        .with_context(|| format!("failed to close connection to {peer}"))?;

    Ok(())
}

async fn read_within<R>(
    reader: &mut R,
    idle_timeout: Option<Duration>,
) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let read = read_request(reader, MAX_REQUEST_BYTES);
    match idle_timeout {
        None => read.await,
        Some(limit) => timeout(limit, read).await.unwrap_or_else(|_| {
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "no request before idle timeout",
            ))
        }),
    }
}
