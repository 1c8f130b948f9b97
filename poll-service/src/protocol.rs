use std::{fmt, io};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::store::VoteStore;

/// Longest request line a client may send, terminator included.
pub const MAX_REQUEST_BYTES: usize = 4096;

const SHOW: &str = "show";
const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// A single client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Show,
    Vote(String),
}

impl Request {
    /// Anything other than the literal `show` is a vote for that text.
    pub fn parse(line: &str) -> Self {
        if line == SHOW {
            Request::Show
        } else {
            Request::Vote(line.to_string())
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Show => f.write_str(SHOW),
            Request::Vote(option) => write!(f, "vote {option}"),
        }
    }
}

/// Outcome of a request; `Display` yields the exact wire text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Tally(String),
    Voted { option: String, count: u64 },
    Rejected { option: String },
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Tally(listing) => f.write_str(listing),
            Response::Voted { option, count } => write!(f, "{option} now has {count} vote(s)"),
            Response::Rejected { option } => {
                write!(f, "ERROR: The choice {option} is not an option in the poll")
            }
        }
    }
}

/// Applies `request` to the store. Unknown options become a `Rejected` response.
pub fn respond(store: &VoteStore, request: Request) -> Response {
    match request {
        Request::Show => Response::Tally(store.render()),
        Request::Vote(option) => match store.increment(&option) {
            Ok(count) => Response::Voted { option, count },
            // `increment` only fails for options outside the poll.
            Err(_) => Response::Rejected { option },
        },
    }
}

/// Maps one raw request line to its response text.
pub fn process(store: &VoteStore, line: &str) -> String {
    respond(store, Request::parse(line)).to_string()
}

/// Reads one request line, without its terminator.
///
/// Returns `Ok(None)` when the peer closed before sending anything. A final
/// line without a newline still counts as a request. Bytes that are not valid
/// UTF-8 are replaced, so such a line is still answered as a vote.
pub async fn read_request<R>(reader: &mut R, limit: usize) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();
    let mut limited = (&mut *reader).take(limit as u64);
    let bytes = limited.read_until(b'\n', &mut raw).await?;
    if bytes == 0 {
        return Ok(None);
    }

    let terminated = raw.last() == Some(&b'\n');
    if bytes >= limit && !terminated && !reader.fill_buf().await?.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("request line exceeds {limit} bytes"),
        ));
    }

    let line = String::from_utf8_lossy(&raw);
    Ok(Some(line.trim_end_matches(LINE_ENDINGS).to_string()))
}

/// Writes `text` followed by a newline and flushes.
pub async fn write_line<W>(writer: &mut W, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = Vec::with_capacity(text.len() + 1);
    encoded.extend_from_slice(text.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}
