//! Append-only audit trail of every request the server reads.
//!
//! Each entry is one line, `<DD-MM-YYYY : HH:mm:ss> : <client> : <request>`,
//! where the request is `show` or `vote <option>`. Writers from every worker
//! share one sink behind an async mutex, so lines never interleave.

use std::{
    fmt, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, TimeZone};
use thiserror::Error;
use tokio::{
    fs::OpenOptions,
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::protocol::Request;

const TIMESTAMP_FORMAT: &str = "%d-%m-%Y : %H:%M:%S";

type Sink = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log is closed")]
    Closed,
    #[error("failed to write audit entry: {0}")]
    Io(#[from] io::Error),
}

/// How an existing log file is treated when the server starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogMode {
    /// Start a fresh log for this run.
    #[default]
    Truncate,
    /// Keep earlier entries and add to the end.
    Append,
}

pub struct AuditLog {
    sink: Mutex<Option<Sink>>,
    path: Option<PathBuf>,
}

impl AuditLog {
    /// Opens (creating if needed) the log file at `path`.
    pub async fn open(path: impl AsRef<Path>, mode: LogMode) -> io::Result<Self> {
        let path = path.as_ref();
        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            LogMode::Truncate => options.write(true).truncate(true),
            LogMode::Append => options.append(true),
        };
        let file = options.open(path).await?;

        Ok(Self {
            sink: Mutex::new(Some(Box::new(file))),
            path: Some(path.to_path_buf()),
        })
    }

    /// Wraps an arbitrary writer, e.g. an in-memory pipe.
    pub fn from_writer<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            sink: Mutex::new(Some(Box::new(writer))),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends one entry for `raw_request` received from `client`.
    ///
    /// The timestamp is taken after the sink lock is held, so entries are in
    /// timestamp order.
    pub async fn record(
        &self,
        client: impl fmt::Display,
        raw_request: &str,
    ) -> Result<(), AuditError> {
        let request = Request::parse(raw_request);
        let mut sink = self.sink.lock().await;
        let writer = sink.as_mut().ok_or(AuditError::Closed)?;

        let mut line = format_entry(&Local::now(), client, &request);
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Flushes and releases the sink. Returns `false` if it was already closed.
    pub async fn close(&self) -> Result<bool, AuditError> {
        let Some(mut writer) = self.sink.lock().await.take() else {
            return Ok(false);
        };
        writer.shutdown().await?;
        Ok(true)
    }
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog").field("path", &self.path).finish()
    }
}

/// Formats one entry without its trailing newline.
pub fn format_entry<Tz>(
    timestamp: &DateTime<Tz>,
    client: impl fmt::Display,
    request: &Request,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!(
        "{} : {client} : {request}",
        timestamp.format(TIMESTAMP_FORMAT)
    )
}
