use std::fmt;
use std::fmt::Debug;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable index of a node in an experiment, always in `0..node_count`.
#[derive(
    Deserialize, Serialize, Default, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash,
)]
pub struct NodeId(u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.parse::<u32>()?;
        Ok(Self(id))
    }
}

impl From<u32> for NodeId {
    fn from(f: u32) -> Self {
        Self(f)
    }
}

impl From<usize> for NodeId {
    fn from(f: usize) -> Self {
        Self(f as u32)
    }
}

impl NodeId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
    pub fn as_u64(&self) -> u64 {
        self.0 as u64
    }
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

/// Identity of an application (traffic endpoint) scheduled by the engine.
#[derive(Deserialize, Default, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct AppId(u32);

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app-{}", self.0)
    }
}

impl From<u32> for AppId {
    fn from(f: u32) -> Self {
        Self(f)
    }
}

impl AppId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// App order indicates the order in which the applications are stepped.
///
/// At each step, applications are sorted by their order and then by their id. Stage one
/// runs in ascending order and stage two in descending order. Sinks use a lower order than
/// sources so that a receiver is always listening before a sender of the same step runs.
#[derive(Deserialize, Debug, Copy, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppOrder(pub u32);

impl From<u32> for AppOrder {
    fn from(f: u32) -> Self {
        Self(f)
    }
}

impl AppOrder {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}
