//! DUID boundary type and server DUID selection.
//!
//! The real DUID wire format belongs to the handler's codec crate; this
//! module implements only the thin slice of RFC 8415 §11 the core needs to
//! validate a configured DUID and to derive one from a link-layer address.

use std::fmt;

use crate::config::UnresolvedConfig;
use crate::error::{Error, Result};
use crate::iface::NetworkInterface;

const DUID_LL: u16 = 3;
const ETHERNET: u16 = 1;
const MAX_LEN: usize = 130;

/// An opaque, validated DHCP Unique Identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duid(Vec<u8>);

impl Duid {
    /// Builds a DUID-LL (type 3) with hardware type Ethernet (1) from a
    /// link-layer address.
    pub fn link_layer(hardware_type: u16, address: &[u8]) -> Result<Self> {
        let mut bytes = Vec::with_capacity(4 + address.len());
        bytes.extend_from_slice(&DUID_LL.to_be_bytes());
        bytes.extend_from_slice(&hardware_type.to_be_bytes());
        bytes.extend_from_slice(address);
        Duid::parse(bytes)
    }

    /// Decodes and validates a hex-encoded DUID, as accepted in
    /// `[server] duid=`.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes = decode_hex(hex.trim()).map_err(|_| Error::InvalidDuidHex(hex.to_string()))?;
        Duid::parse(bytes)
    }

    /// Validates a raw byte string as a structurally plausible DUID.
    ///
    /// The core does not implement a full RFC 8415 DUID parser (that is the
    /// handler codec's job); it checks only the overall length bound and,
    /// when at least a type code is present, that the type is one of the
    /// four RFC 8415 DUID types.
    pub fn parse(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() || bytes.len() > MAX_LEN {
            return Err(Error::DuidLength(bytes.len()));
        }
        if bytes.len() >= 2 {
            let duid_type = u16::from_be_bytes([bytes[0], bytes[1]]);
            if !(1..=4).contains(&duid_type) {
                return Err(Error::InvalidDuid(format!("unknown DUID type {duid_type}")));
            }
        }
        Ok(Duid(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Duid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

fn decode_hex(s: &str) -> std::result::Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

/// Selects the server DUID: prefer the configured one, otherwise derive a
/// link-layer DUID from the first decodable MAC address across interfaces
/// and addresses sorted lexicographically.
pub(crate) fn select_duid(config: &UnresolvedConfig, interfaces: &[NetworkInterface]) -> Result<Duid> {
    if let Some(hex) = config.configured_duid_hex() {
        let duid = Duid::from_hex(hex)?;
        tracing::info!(duid = %duid, "using server DUID from configuration");
        return Ok(duid);
    }

    let mut sorted: Vec<&NetworkInterface> = interfaces.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    for iface in sorted {
        let mut macs: Vec<[u8; 6]> = iface.mac.into_iter().collect();
        macs.sort();

        for mac in macs {
            if let Ok(duid) = Duid::link_layer(ETHERNET, &mac) {
                tracing::info!(
                    interface = %iface.name,
                    duid = %duid,
                    "using server DUID derived from link-layer address"
                );
                return Ok(duid);
            }
        }
    }

    Err(Error::NoDuidAvailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_layer_duid_round_trips_through_hex() {
        let duid = Duid::link_layer(ETHERNET, &[0x02, 0x42, 0xac, 0x11, 0x00, 0x02]).unwrap();
        let hex = duid.to_string();
        let decoded = Duid::from_hex(&hex).unwrap();
        assert_eq!(duid, decoded);
    }

    #[test]
    fn rejects_oversized_duid() {
        let bytes = vec![0u8; MAX_LEN + 1];
        assert!(matches!(Duid::parse(bytes), Err(Error::DuidLength(_))));
    }

    #[test]
    fn rejects_empty_duid() {
        assert!(matches!(Duid::parse(Vec::new()), Err(Error::DuidLength(0))));
    }

    #[test]
    fn rejects_unknown_duid_type() {
        let bytes = vec![0xff, 0xff, 0x00, 0x01];
        assert!(matches!(Duid::parse(bytes), Err(Error::InvalidDuid(_))));
    }

    #[test]
    fn rejects_odd_length_hex() {
        assert!(Duid::from_hex("abc").is_err());
    }
}
