//! Persistent topological naming
//!
//! Each feature owns an [`IdentityStore`] naming the sub-shapes of its
//! result and an [`EvolutionLedger`] recording where those names came from.
//! The [`IdMapper`] fills both after every regeneration.

pub mod ledger;
pub mod mapping;
pub mod store;

pub use ledger::{EvolutionLedger, Source};
pub use mapping::{IdMapper, MappingPlan, MappingSummary, Upstream};
pub use store::{IdentityError, IdentityStore, StoreEntry};
