//! Types library for the shared-expense ledger
//!
//! This library provides all core type definitions used across the ledger
//! system, ensuring type safety and deterministic behavior.
//!
//! # Modules
//! - `ids`: Unique identifiers (UserId, GroupId, RecordId)
//! - `profile`: User profiles and the identity-provider view
//! - `group`: Expense-sharing groups with member rosters
//! - `record`: Expense and settlement ledger records
//! - `balance`: Scopes and derived balance state
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod profile;
pub mod group;
pub mod record;
pub mod balance;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::balance::*;
    pub use crate::errors::*;
    pub use crate::group::*;
    pub use crate::ids::*;
    pub use crate::profile::*;
    pub use crate::record::*;
}
