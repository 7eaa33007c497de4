//! Joining the DHCPv6 relay/server multicast group.

use std::net::Ipv6Addr;

use socket2::Socket;

use crate::error::Result;

/// `ff02::1:2`, All_DHCP_Relay_Agents_and_Servers (RFC 8415 §7.1).
pub(crate) const ALL_DHCP_RELAY_AGENTS_AND_SERVERS: Ipv6Addr =
    Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 1, 2);

/// Joins the relay/server multicast group on the given interface, enabling
/// loopback delivery first when `listen_to_self` requests it.
pub(crate) fn join_all_dhcp_servers(
    socket: &Socket,
    interface_index: u32,
    listen_to_self: bool,
) -> Result<()> {
    if listen_to_self {
        socket.set_multicast_loop_v6(true)?;
    }
    socket.join_multicast_v6(&ALL_DHCP_RELAY_AGENTS_AND_SERVERS, interface_index)?;
    Ok(())
}
