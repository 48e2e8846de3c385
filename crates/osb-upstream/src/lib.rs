//! UpstreamClient: transport and typed accessors for the upstream RPC service.
//!
//! One instance per connection. Holds the cached session identifier and an
//! HTTP client (a bulkhead: every connection's task owns its own
//! `reqwest::Client`). Speaks JSON-RPC 2.0 against the upstream's
//! `common`/`object` services.

mod client;
mod error;
mod records;
mod rpc;

pub use client::{FetchCandidatesRequest, UpstreamClient};
pub use error::UpstreamError;
pub use records::{AttributeValue, Line, OrderRecord, Partner, Product, Template};
