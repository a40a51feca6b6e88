use std::cmp::Ordering;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Client to destination.
    Request,
    /// Destination back to client.
    Reply,
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Request => f.write_str("request"),
            Direction::Reply => f.write_str("reply"),
        }
    }
}

/// Opaque key of the session a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub [u8; 16]);

impl From<[u8; 16]> for SessionId {
    fn from(id: [u8; 16]) -> Self {
        Self(id)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[8..].copy_from_slice(&id.to_be_bytes());
        Self(bytes)
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&Uuid::from_bytes(self.0).simple().to_string())
    }
}

/// A unit of traffic handed to the mix by the recoding layer.
///
/// The payload is opaque. Messages order by payload bytes (shorter first,
/// then bytewise) so that batches come out in a reproducible order that has
/// nothing to do with arrival time. `sequence` only breaks ties between
/// identical payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    pub direction: Direction,
    pub owner: SessionId,
    pub payload: Vec<u8>,
    pub sequence: u64,
}

impl Message {
    pub fn new(direction: Direction, owner: SessionId, payload: Vec<u8>, sequence: u64) -> Self {
        Self {
            direction,
            owner,
            payload,
            sequence,
        }
    }

    pub fn request(owner: SessionId, payload: Vec<u8>, sequence: u64) -> Self {
        Self::new(Direction::Request, owner, payload, sequence)
    }

    pub fn reply(owner: SessionId, payload: Vec<u8>, sequence: u64) -> Self {
        Self::new(Direction::Reply, owner, payload, sequence)
    }

    pub fn is_request(&self) -> bool {
        self.direction == Direction::Request
    }
}

impl Ord for Message {
    fn cmp(&self, other: &Self) -> Ordering {
        self.payload
            .len()
            .cmp(&other.payload.len())
            .then_with(|| self.payload.cmp(&other.payload))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for Message {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Hands out monotonically increasing sequence numbers.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    next: std::sync::atomic::AtomicU64,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(payload: &[u8], sequence: u64) -> Message {
        Message::request(SessionId::from(0u64), payload.to_vec(), sequence)
    }

    #[test]
    fn shorter_payload_sorts_first() {
        assert!(msg(&[9], 0) < msg(&[0, 0], 1));
        assert!(msg(&[], 5) < msg(&[0], 0));
    }

    #[test]
    fn equal_length_payloads_compare_bytewise() {
        assert!(msg(&[1, 2, 3], 7) < msg(&[1, 2, 4], 0));
        assert!(msg(&[2, 0, 0], 0) > msg(&[1, 255, 255], 9));
    }

    #[test]
    fn sequence_breaks_ties() {
        assert!(msg(&[1], 0) < msg(&[1], 1));
        assert_eq!(msg(&[1], 3).cmp(&msg(&[1], 3)), Ordering::Equal);
    }

    #[test]
    fn session_id_from_index_is_distinct() {
        assert_ne!(SessionId::from(1u64), SessionId::from(2u64));
        assert_eq!(SessionId::from(7u64), SessionId::from(7u64));
    }

    #[test]
    fn session_id_displays_as_hex() {
        assert_eq!(
            SessionId::from(255u64).to_string(),
            "000000000000000000000000000000ff"
        );
    }

    #[test]
    fn sequence_generator_is_monotonic() {
        let generator = SequenceGenerator::new();
        let first = generator.next();
        let second = generator.next();
        assert!(second > first);
    }
}
