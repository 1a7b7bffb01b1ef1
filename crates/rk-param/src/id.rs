//! Persistent identifiers
//!
//! An [`Identifier`] names one sub-shape of one feature's result across
//! regenerations. Fresh identifiers are derived deterministically from the
//! owning feature's id and a key describing how the sub-shape came to be,
//! so the same inputs always produce the same names.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a feature, also used as its derivation seed
pub type FeatureId = Uuid;

/// Persistent name of a sub-shape
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Identifier(Uuid);

impl Identifier {
    /// The nil identifier (unassigned, or "whole shape" in a pick)
    pub const NIL: Identifier = Identifier(Uuid::nil());

    pub fn nil() -> Self {
        Self::NIL
    }

    /// Random identifier, for ad-hoc use outside regeneration
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic identifier from a seed and a derivation key
    pub fn derive(seed: FeatureId, key: &DerivationKey) -> Self {
        Self(Uuid::new_v5(&seed, key.as_bytes()))
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// First eight hex digits, for logs and graph dumps
    pub fn short(&self) -> String {
        let mut text = self.0.simple().to_string();
        text.truncate(8);
        text
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for Identifier {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Byte key describing how a sub-shape was derived
///
/// Parts are length-prefixed so different part sequences never collide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivationKey {
    bytes: Vec<u8>,
}

impl DerivationKey {
    pub fn new(rule: &str) -> Self {
        Self::default().text(rule)
    }

    pub fn text(mut self, part: &str) -> Self {
        self.push(part.as_bytes());
        self
    }

    pub fn id(mut self, id: Identifier) -> Self {
        self.push(id.0.as_bytes());
        self
    }

    pub fn feature(mut self, feature: FeatureId) -> Self {
        self.push(feature.as_bytes());
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.push(&(index as u64).to_le_bytes());
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn push(&mut self, part: &[u8]) {
        self.bytes.extend_from_slice(&(part.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(part);
    }
}
