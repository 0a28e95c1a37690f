//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID
//! すべての ID は `Id<T>` でラップした ULID です。`T` は実行時には使わない
//! マーカー型（PhantomData）で、`AddressId` を `EnvironmentId` の位置に
//! 渡すとコンパイルエラーになります。
//!
//! ## Display
//! - `addr-<ulid>`: TestAddress
//! - `env-<ulid>`: 環境
//! - `run-<ulid>`: run

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for id kinds. Provides the display prefix.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID-backed id.
#[repr(transparent)]
#[derive(Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

// Manual impls: derives would put bounds on `T`, which is never instantiated.
impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: IdMarker> Copy for Id<T> {}

impl<T: IdMarker> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ulid == other.ulid
    }
}

impl<T: IdMarker> Eq for Id<T> {}

impl<T: IdMarker> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ulid.hash(state);
    }
}

impl<T: IdMarker> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdMarker> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ulid.cmp(&other.ulid)
    }
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Fresh id from the process-wide ULID source.
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// Markers
// ========================================

/// Marker for staged test addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {}

impl IdMarker for Address {
    fn prefix() -> &'static str {
        "addr-"
    }
}

/// Marker for provisioned execution environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Environment {}

impl IdMarker for Environment {
    fn prefix() -> &'static str {
        "env-"
    }
}

/// Marker for a single orchestrated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

/// Identity of one invocable test target.
pub type AddressId = Id<Address>;

/// Identity of one live execution environment.
pub type EnvironmentId = Id<Environment>;

/// Identity of one run (stage, invoke all, tear down).
pub type RunId = Id<Run>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();

        let address = AddressId::from_ulid(ulid1);
        let env = EnvironmentId::from_ulid(ulid2);

        assert_eq!(address.as_ulid(), ulid1);
        assert_eq!(env.as_ulid(), ulid2);

        assert!(address.to_string().starts_with("addr-"));
        assert!(env.to_string().starts_with("env-"));
        assert!(RunId::generate().to_string().starts_with("run-"));
        // let _: AddressId = env; // <- does not compile
    }

    #[test]
    fn ids_serialize_as_plain_ulid() {
        let id = EnvironmentId::generate();
        let serialized = serde_json::to_string(&id).unwrap();
        assert_eq!(serialized, format!("\"{}\"", id.as_ulid()));

        let back: EnvironmentId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<AddressId>(), size_of::<Ulid>());
        assert_eq!(size_of::<EnvironmentId>(), 16);
    }
}
