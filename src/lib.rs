#![doc = include_str!("../README.md")]

/// Line-oriented input and back-pressured output over byte streams
pub mod buffered;
mod client;
/// NNTP command lines and builders
pub mod commands;
mod config;
mod error;
/// Arena-backed doubly linked lists
pub mod list;
/// NNTP replies, status codes and code tables
pub mod response;
/// Cooperative event loop and blocking bridge
pub mod runloop;

pub use client::{
    BoxedTransport, ConnectionId, Delegate, Event, Nntp, PendingCommand, Status, Transport,
};
pub use commands::Command;
pub use config::{BufferLimits, ServerConfig};
pub use error::{ErrorContext, ErrorKind, NntpError, Result};
pub use response::{codes, Reply, ReplyClass};
pub use runloop::EventLoop;
