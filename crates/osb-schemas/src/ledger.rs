use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One delivery-ledger entry: proof that `(connection, upstream_order_id,
/// write_date)` has already been observed, either by a successful dispatch
/// or by cursor seeding.
///
/// Never mutated after insert. The uniqueness of `(connection_id,
/// upstream_order_id, write_date)` is enforced by the Store, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentOrder {
    pub connection_id: String,
    pub upstream_order_id: i64,
    pub write_date: DateTime<Utc>,
    pub sent_at: DateTime<Utc>,
}
