//! Building the set of sockets a server listens on.
//!
//! Raw sockets are configured with `socket2` then handed to Tokio via
//! `UdpSocket::from_std`. A DHCPv6 listener needs one bound socket per
//! configured address plus, for multicast-enabled interfaces, an extra
//! socket joined to the relay/server group and paired with a
//! link-local socket to reply from.

mod multicast;

use std::io;
use std::net::{SocketAddr, SocketAddrV6};
use std::sync::Arc;

use getifaddrs::if_nametoindex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use multicast::{ALL_DHCP_RELAY_AGENTS_AND_SERVERS, join_all_dhcp_servers};

/// The well-known DHCPv6 server/relay port (RFC 8415 §7.2).
pub(crate) const SERVER_PORT: u16 = 547;

/// A bound socket, plus the interface it belongs to and, for multicast
/// sockets, the unicast socket replies should actually be sent from.
pub struct ListeningSocket {
    pub interface: String,
    pub socket: Arc<UdpSocket>,
    reply_socket: Option<Arc<UdpSocket>>,
}

impl ListeningSocket {
    fn unicast(interface: String, socket: Arc<UdpSocket>) -> Self {
        ListeningSocket { interface, socket, reply_socket: None }
    }

    fn multicast(interface: String, socket: Arc<UdpSocket>, reply_from: Arc<UdpSocket>) -> Self {
        ListeningSocket { interface, socket, reply_socket: Some(reply_from) }
    }

    /// The socket a reply should actually be sent on: the paired
    /// link-local socket for a multicast listener, otherwise itself.
    pub(crate) fn reply_socket(&self) -> &Arc<UdpSocket> {
        self.reply_socket.as_ref().unwrap_or(&self.socket)
    }

    pub(crate) fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

fn bind_udp(addr: SocketAddrV6) -> Result<Socket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_only_v6(true)?;
    socket.bind(&SocketAddr::V6(addr).into())?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

fn into_tokio(socket: Socket) -> Result<UdpSocket> {
    Ok(UdpSocket::from_std(socket.into())?)
}

/// Builds every listening socket for a resolved configuration, per
/// interface: one socket per global address, one per link-local address,
/// and (when `multicast = yes`) one more bound to the relay/server group
/// and paired with the interface's first link-local socket.
pub(crate) fn build_sockets(config: &ServerConfig) -> Result<Vec<ListeningSocket>> {
    let mut sockets = Vec::new();

    for (name, iface) in &config.interfaces {
        let index = if_nametoindex(name)?;

        for addr in &iface.global {
            let raw = bind_udp(SocketAddrV6::new(*addr, SERVER_PORT, 0, 0))?;
            let udp = Arc::new(into_tokio(raw)?);
            tracing::debug!(interface = %name, address = %addr, "bound global socket");
            sockets.push(ListeningSocket::unicast(name.clone(), udp));
        }

        let mut link_local_sockets = Vec::new();
        for addr in &iface.link_local {
            let raw = bind_udp(SocketAddrV6::new(*addr, SERVER_PORT, 0, index))?;
            let udp = Arc::new(into_tokio(raw)?);
            tracing::debug!(interface = %name, address = %addr, "bound link-local socket");
            link_local_sockets.push(udp.clone());
            sockets.push(ListeningSocket::unicast(name.clone(), udp));
        }

        if iface.multicast {
            let reply_from = link_local_sockets
                .first()
                .cloned()
                .ok_or_else(|| Error::MulticastWithoutLinkLocal { interface: name.clone() })?;

            let raw = bind_udp(SocketAddrV6::new(ALL_DHCP_RELAY_AGENTS_AND_SERVERS, SERVER_PORT, 0, index))?;
            join_all_dhcp_servers(&raw, index, iface.listen_to_self)?;
            let udp = Arc::new(into_tokio(raw)?);
            tracing::debug!(
                interface = %name,
                reply_from = %reply_from.local_addr()?,
                "bound multicast socket"
            );
            sockets.push(ListeningSocket::multicast(name.clone(), udp, reply_from));
        }
    }

    if sockets.is_empty() {
        return Err(Error::NoAddrAvailable("no interfaces produced any socket".to_string()));
    }

    Ok(sockets)
}

/// Test-only helpers for building a [`ListeningSocket`] over real loopback
/// sockets, used by [`crate::listener`]'s dispatch tests.
#[cfg(test)]
pub(crate) mod test_support {
    use super::{Arc, ListeningSocket, UdpSocket};

    pub(crate) async fn bind_loopback() -> Arc<UdpSocket> {
        Arc::new(UdpSocket::bind("[::1]:0").await.expect("failed to bind loopback test socket"))
    }

    pub(crate) fn unicast_for_test(socket: Arc<UdpSocket>) -> ListeningSocket {
        ListeningSocket::unicast("test0".to_string(), socket)
    }

    pub(crate) fn multicast_for_test(socket: Arc<UdpSocket>, reply_from: Arc<UdpSocket>) -> ListeningSocket {
        ListeningSocket::multicast("test0".to_string(), socket, reply_from)
    }
}
