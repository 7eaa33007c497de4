use std::net::Ipv6Addr;

use thiserror::Error;

/// Centralized error type for the server core.
///
/// Every variant that can occur during the pre-listening sequence is fatal
/// to the process; variants raised while serving requests are caught at
/// the call site and logged instead of propagated.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot open configuration file '{path}': {source}")]
    ConfigOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error at line {line}: {message}")]
    ConfigSyntax { line: usize, message: String },

    #[error("interface '{0}' not found on this system")]
    InterfaceNotFound(String),

    #[error("interface '{interface}' option '{option}' must contain link-local addresses, found {address}")]
    NotLinkLocal {
        interface: String,
        option: &'static str,
        address: Ipv6Addr,
    },

    #[error("interface '{interface}' option '{option}' must contain global unicast or ULA addresses, found {address}")]
    NotGlobalOrUla {
        interface: String,
        option: &'static str,
        address: Ipv6Addr,
    },

    #[error("interface '{interface}' listens for multicast but has no link-local address to reply from")]
    MulticastWithoutLinkLocal { interface: String },

    #[error("invalid IPv6 address '{0}'")]
    InvalidAddress(String),

    #[error("configured DUID contains invalid hex: {0}")]
    InvalidDuidHex(String),

    #[error("configured DUID is structurally invalid: {0}")]
    InvalidDuid(String),

    #[error("DUID length must be between 1 and 130 bytes, got {0}")]
    DuidLength(usize),

    #[error("no usable DUID could be derived from any interface's link-layer address")]
    NoDuidAvailable,

    #[error("unknown syslog facility: {0}")]
    UnknownFacility(String),

    #[error("cannot resolve user '{0}'")]
    UnknownUser(String),

    #[error("cannot resolve group '{0}'")]
    UnknownGroup(String),

    #[error("failed to drop privileges: {0}")]
    PrivilegeDrop(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no valid socket address available for interface '{0}'")]
    NoAddrAvailable(String),

    #[error("message too short to be a DHCPv6 datagram ({0} bytes)")]
    MessageTooShort(usize),

    #[error("message serialization failed: {0}")]
    Serialize(String),

    #[error("too many internal faults ({count}) within {window_s:.1}s, shutting down")]
    ExceptionStorm { count: usize, window_s: f64 },
}

/// Alias for `Result<T, dhcp6d::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
