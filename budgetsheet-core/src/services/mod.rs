//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions.

mod ledger;
pub mod logging;

pub use ledger::{InitializeReport, LedgerService};
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService, OperationStats};
