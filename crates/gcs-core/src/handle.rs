//! Integer handles for sketch objects
//!
//! Handles are allocated by a [`Sketch`](crate::Sketch) and are only
//! meaningful for the instance that created them (or a clone of it).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a scalar unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParamId(u32);

impl ParamId {
    /// Wrap a raw handle value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw handle value
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Identifier of a geometric entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    /// Wrap a raw handle value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw handle value
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Identifier of a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConstraintId(u32);

impl ConstraintId {
    /// Wrap a raw handle value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw handle value
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Identifier of a solve group. Groups solve in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(u32);

impl GroupId {
    /// Wrap a raw group number
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw group number
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}
