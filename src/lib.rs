#![forbid(unsafe_code)]

//! A DHCPv6 server core: interface discovery, multi-socket listening and
//! multicast handling, bounded worker dispatch, and supervision, built
//! around a pluggable [`Handler`] that implements the actual protocol
//! logic.
//!
//! This crate owns everything up to parsing a datagram into an opaque
//! [`Message`] and dispatching a [`HandlerResult`] back out; it does not
//! know what a DHCPv6 option is. Pair it with a handler crate that
//! understands the wire format.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::net::SocketAddrV6;
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use dhcp6d::{Handler, HandlerResult, Message};
//!
//! struct DropEverything;
//!
//! #[async_trait]
//! impl Handler for DropEverything {
//!     fn name(&self) -> &'static str {
//!         "drop-everything"
//!     }
//!
//!     async fn handle(&self, _msg: &Message, _sender: SocketAddrV6, _local: SocketAddrV6) -> HandlerResult {
//!         HandlerResult::None
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> dhcp6d::Result<()> {
//!     dhcp6d::serve("/etc/dhcp6d.conf", Arc::new(DropEverything), 0).await
//! }
//! ```

mod config;
mod duid;
mod error;
mod handler;
mod iface;
mod listener;
mod logging;
mod message;
mod privilege;
mod socket;
mod supervisor;
mod worker;

pub use config::{HandlerDescriptor, InterfaceConfig, ServerConfig, SyslogFacility};
pub use duid::Duid;
pub use error::{Error, Result};
pub use handler::Handler;
pub use message::{HandlerResult, Message};
pub use supervisor::{render_config, serve};
