//! Flow keys and the packet boundary.
use crate::consts::FilterMode;
use crate::errors::{Result, SeenError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two packet fields a filter is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub sport: u16,
    pub dport: u16,
}

impl FlowKey {
    pub const fn new(sport: u16, dport: u16) -> Self {
        Self { sport, dport }
    }

    /// Fields as handed to the hash collaborator.
    #[inline]
    pub fn fields(&self) -> (u64, u64) {
        (self.sport as u64, self.dport as u64)
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sport, self.dport)
    }
}

fn port(v: i64, what: &str) -> Result<u16> {
    u16::try_from(v).map_err(|_| SeenError::InvalidKey(format!("{what} {v} out of range 0..=65535")))
}

impl TryFrom<(i64, i64)> for FlowKey {
    type Error = SeenError;

    fn try_from((sport, dport): (i64, i64)) -> Result<Self> {
        Ok(Self { sport: port(sport, "sport")?, dport: port(dport, "dport")? })
    }
}

/// Accepts `SPORT:DPORT`.
impl FromStr for FlowKey {
    type Err = SeenError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (a, b) = s
            .split_once(':')
            .ok_or_else(|| SeenError::InvalidKey(format!("{s:?}: expected SPORT:DPORT")))?;
        let parse = |v: &str, what: &str| -> Result<i64> {
            v.trim()
                .parse::<i64>()
                .map_err(|_| SeenError::InvalidKey(format!("{what} {v:?} is not an integer")))
        };
        Self::try_from((parse(a, "sport")?, parse(b, "dport")?))
    }
}

/// A packet as seen by the filter: key fields plus the operation to run.
/// Deserialisation routes the ports through `FlowKey::try_from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPacket")]
pub struct Packet {
    pub sport: u16,
    pub dport: u16,
    pub mode: FilterMode,
}

/// Wire form of a packet before the key fields are checked.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPacket {
    pub sport: serde_json::Value,
    pub dport: serde_json::Value,
    pub mode: FilterMode,
}

fn int_field(v: &serde_json::Value, what: &str) -> Result<i64> {
    v.as_i64()
        .ok_or_else(|| SeenError::InvalidKey(format!("{what} {v} is not an integer")))
}

impl TryFrom<RawPacket> for Packet {
    type Error = SeenError;

    fn try_from(raw: RawPacket) -> Result<Self> {
        let key = FlowKey::try_from((int_field(&raw.sport, "sport")?, int_field(&raw.dport, "dport")?))?;
        Ok(Self { sport: key.sport, dport: key.dport, mode: raw.mode })
    }
}

impl Packet {
    pub fn key(&self) -> FlowKey {
        FlowKey::new(self.sport, self.dport)
    }

    /// Parses one JSON packet. Bad key fields come back as `InvalidKey`,
    /// anything else malformed as `SerdeJson`.
    pub fn from_json(line: &str) -> Result<Self> {
        let raw: RawPacket = serde_json::from_str(line)?;
        Packet::try_from(raw)
    }
}

/// Result of classifying one packet. `member` is set only for query mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub sport: u16,
    pub dport: u16,
    pub mode: FilterMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<bool>,
}
