use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand, builder::TypedValueParser as _};

use crate::{
    audit::LogMode,
    server::{DEFAULT_LOG_FILE, DEFAULT_POOL_SIZE, ServerConfig},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the poll server with a fixed set of options.
    Server(ServerArgs),
    /// Send a single request to a poll server and print the reply.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Options voters can choose from (at least two, all distinct).
    #[arg(required = true, num_args = 2.., value_name = "OPTION")]
    pub options: Vec<String>,

    /// Socket address to listen on. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "0.0.0.0:7777")]
    pub listen: SocketAddr,

    /// Number of connections served at the same time.
    #[arg(
        long,
        default_value_t = DEFAULT_POOL_SIZE,
        value_parser = clap::value_parser!(u64).range(1..).map(|n| n as usize),
    )]
    pub workers: usize,

    /// File that receives one audit line per request.
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Keep entries from earlier runs instead of starting a fresh log.
    #[arg(long)]
    pub append_log: bool,

    /// Drop clients that send nothing for this many seconds (default: wait forever).
    #[arg(long, value_name = "SECS")]
    pub idle_timeout_secs: Option<u64>,

    /// Seconds to let in-flight requests finish on shutdown.
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    pub drain_timeout_secs: u64,
}

impl From<&ServerArgs> for ServerConfig {
    fn from(args: &ServerArgs) -> Self {
        Self {
            listen: args.listen,
            pool_size: args.workers,
            log_file: args.log_file.clone(),
            log_mode: if args.append_log {
                LogMode::Append
            } else {
                LogMode::Truncate
            },
            idle_timeout: args.idle_timeout_secs.map(Duration::from_secs),
            drain_timeout: Duration::from_secs(args.drain_timeout_secs),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the poll server.
    #[arg(long, default_value = "127.0.0.1:7777")]
    pub server: SocketAddr,

    #[command(subcommand)]
    pub request: ClientRequest,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    /// Print the current tally.
    Show,
    /// Cast one vote.
    Vote {
        /// Option to vote for.
        option: String,
    },
}

impl ClientRequest {
    /// The line sent over the wire.
    pub fn line(&self) -> &str {
        match self {
            ClientRequest::Show => "show",
            ClientRequest::Vote { option } => option,
        }
    }
}
