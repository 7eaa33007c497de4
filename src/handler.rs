//! The pluggable request handler contract.
//!
//! A [`Handler`] is the boundary past which this crate does not reach: it
//! owns lease state, protocol option decoding, and every policy decision.
//! The core's job ends at dispatching a parsed [`Message`] to one and
//! taking the [`HandlerResult`] it returns.

use std::net::SocketAddrV6;

use async_trait::async_trait;

use crate::message::{HandlerResult, Message};

/// Implemented by whatever component answers DHCPv6 requests.
///
/// A name for logs, and an async entry point invoked once per inbound
/// datagram. A `Handler` never touches sockets directly — it receives
/// addresses and returns a result, and the core decides how to send it.
#[async_trait]
pub trait Handler: Send + Sync {
    /// A static name for this handler, used in logs.
    fn name(&self) -> &'static str;

    /// Handles one inbound message.
    ///
    /// `sender` is the peer's address; `local` is the local address the
    /// datagram arrived on (needed to pick the matching reply-from socket
    /// for multicast listeners).
    async fn handle(&self, message: &Message, sender: SocketAddrV6, local: SocketAddrV6) -> HandlerResult;

    /// Invoked on `SIGHUP`, giving the handler a chance to reload
    /// configuration or lease state without a process restart. The
    /// default implementation does nothing.
    async fn reload(&self) {}
}
