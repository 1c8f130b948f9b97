//! Single-poll voting service over plain TCP.
//!
//! A server holds a fixed set of options and their tallies. Each client
//! connection carries exactly one request line, either `show` or the name of
//! an option to vote for, and receives one textual reply before the server
//! closes it.
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`server`] binds the listener, runs the accept loop and owns shutdown.
//! - [`pool`] bounds how many connections are served at once.
//! - [`connection`] handles one connection from first byte to close.
//! - [`protocol`] turns request lines into responses and frames them.
//! - [`store`] keeps the tallies behind a single lock.
//! - [`audit`] appends a timestamped line for every request.
//! - [`client`] sends one request and prints the reply.
//!
//! Integration tests drive the server in-process and through the binary.

pub mod audit;
pub mod cli;
pub mod client;
pub mod connection;
pub mod pool;
pub mod protocol;
pub mod server;
pub mod store;
