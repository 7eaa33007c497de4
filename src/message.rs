//! The opaque inbound/outbound message boundary between the core and a
//! handler's own DHCPv6 codec.

use std::net::SocketAddrV6;

use crate::error::{Error, Result};

const MIN_MESSAGE_LEN: usize = 4;

/// A DHCPv6 datagram as raw bytes.
///
/// The core never interprets message type, transaction ID or options; it
/// only enforces the minimum length RFC 8415 §8 requires of any message
/// (a one-byte type plus a three-byte transaction ID) so obviously
/// truncated datagrams are rejected before reaching a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(Vec<u8>);

impl Message {
    /// Parses `bytes` into a [`Message`], rejecting anything shorter than
    /// the minimum DHCPv6 header.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_MESSAGE_LEN {
            return Err(Error::MessageTooShort(bytes.len()));
        }
        Ok(Message(bytes.to_vec()))
    }

    /// Wraps an already-built message for sending, without re-validating
    /// its contents (a handler is trusted to build a well-formed reply).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Message(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Serializes the message to the bytes a reply actually sends.
    ///
    /// `from_bytes` does not validate on construction, so this is where a
    /// handler-built reply that is too short to be a real DHCPv6 datagram
    /// gets caught, rather than being sent out as-is.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        if self.0.len() < MIN_MESSAGE_LEN {
            return Err(Error::Serialize(format!(
                "outbound message is {} bytes, minimum is {MIN_MESSAGE_LEN}",
                self.0.len()
            )));
        }
        Ok(self.0.clone())
    }
}

/// What a handler wants done with an inbound datagram: drop it, reply
/// to whoever sent the request, or reply to an explicit destination.
#[derive(Debug, Clone)]
pub enum HandlerResult {
    /// Drop the request silently.
    None,
    /// Reply to the address the request came from.
    Reply(Message),
    /// Reply to an explicit destination, overriding the sender's address.
    ReplyTo(Message, SocketAddrV6),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_datagrams() {
        assert!(matches!(Message::parse(&[1, 2]), Err(Error::MessageTooShort(2))));
    }

    #[test]
    fn accepts_minimum_length_datagram() {
        assert!(Message::parse(&[1, 2, 3, 4]).is_ok());
    }

    #[test]
    fn serialize_round_trips_a_valid_message() {
        let message = Message::from_bytes(vec![1, 2, 3, 4]);
        assert_eq!(message.serialize().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn serialize_rejects_too_short_messages() {
        let message = Message::from_bytes(vec![1, 2]);
        assert!(matches!(message.serialize(), Err(Error::Serialize(_))));
    }
}
