//! Shared domain types for the order-sync bridge.
//!
//! These are plain data types with no I/O and no business logic — every
//! other crate in the workspace depends on this one so that the wire shape
//! of a `Connection`, a `RetryItem`, or an outbound `Envelope` has exactly
//! one definition.

mod connection;
mod envelope;
mod ledger;
mod retry;
mod synclog;

pub use connection::{BreakerState, Connection, NewConnection};
pub use envelope::{
    Customer, Envelope, EnvelopeItem, EnvelopeOrder, EnvelopeSource, PlatformAttributes,
    ShippingAddress,
};
pub use ledger::SentOrder;
pub use retry::{RetryItem, RetryStatus};
pub use synclog::SyncLog;
