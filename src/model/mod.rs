//! Types that represent the core data model, such as `Record` and `Amount`.
mod amount;
mod date;
mod record;

pub use amount::{Amount, AmountError};
pub use date::{DateError, LedgerDate};
pub use record::{Record, RecordFields, RecordId, RecordPatch, Status, PLACEHOLDER};
