//! Event value types.
//!
//! An entity's durable truth is its log of [`FullyEvent`]s. Each carries the
//! domain payload plus an [`EventBase`] holding the 1-based version and the
//! event timestamp (unix milliseconds).

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Identifier of a single entity.
///
/// Blanket-implemented for every type satisfying the bounds, so `i64`,
/// `String` and `uuid::Uuid` all work as keys.
pub trait StateKey:
    Clone + Eq + Hash + Display + FromStr + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> StateKey for T where
    T: Clone
        + Eq
        + Hash
        + Display
        + FromStr
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// The closed set of events one entity type can raise and apply.
///
/// Implement on a serde-tagged enum; `type_code` names the variant on the
/// wire so consumers can route without decoding the body.
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// Registered type code for this variant.
    fn type_code(&self) -> &'static str;
}

/// Number of bytes in the encoded [`EventBase`].
pub const EVENT_BASE_LEN: usize = 16;

/// Version and timestamp of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventBase {
    pub version: i64,
    pub timestamp: i64,
}

impl EventBase {
    pub fn new(version: i64, timestamp: i64) -> Self {
        Self { version, timestamp }
    }

    /// Encode as two little-endian `i64`s: version, then timestamp.
    pub fn to_bytes(&self) -> [u8; EVENT_BASE_LEN] {
        let mut buf = [0u8; EVENT_BASE_LEN];
        buf[..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..].copy_from_slice(&self.timestamp.to_le_bytes());
        buf
    }

    /// Decode from the layout written by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != EVENT_BASE_LEN {
            return None;
        }
        let version = i64::from_le_bytes(bytes[..8].try_into().ok()?);
        let timestamp = i64::from_le_bytes(bytes[8..].try_into().ok()?);
        Some(Self { version, timestamp })
    }
}

/// A domain event bound to its owning entity and position in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "K: DeserializeOwned, E: DeserializeOwned"))]
pub struct FullyEvent<K, E> {
    pub state_id: K,
    pub event: E,
    pub base: EventBase,
}

impl<K: StateKey, E: DomainEvent> FullyEvent<K, E> {
    pub fn new(state_id: K, event: E, base: EventBase) -> Self {
        Self {
            state_id,
            event,
            base,
        }
    }

    pub fn version(&self) -> i64 {
        self.base.version
    }

    pub fn timestamp(&self) -> i64 {
        self.base.timestamp
    }
}

/// Caller-assigned idempotency key and timestamp for a raise.
///
/// Client retries carrying the same `uid` are appended at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventUid {
    pub uid: String,
    pub timestamp: i64,
}

impl EventUid {
    pub fn new(uid: impl Into<String>, timestamp: i64) -> Self {
        Self {
            uid: uid.into(),
            timestamp,
        }
    }

    /// Key stamped with the current wall-clock time.
    pub fn now(uid: impl Into<String>) -> Self {
        Self::new(uid, crate::utils::now_millis())
    }
}
