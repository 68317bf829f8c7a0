//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - Google Sheets REST client for the TabularStore port
//! - Google OAuth installed-app flow for obtaining credentials
//! - In-memory store for demo mode and tests

pub mod memory;
pub mod oauth;
pub mod sheets;

#[cfg(test)]
pub mod sheets_mock;
