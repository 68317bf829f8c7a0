//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The ledger service
//! depends only on these traits, not on the Sheets client.

mod tabular_store;

pub use tabular_store::{StoreConnector, TabularStore, ValueInput};
