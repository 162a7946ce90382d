//! Transport layer for the reasoning service.
//!
//! - [`types`] -- Request/response bodies, session identity, fragments.
//! - [`client`] -- HTTP client with retry and stream→non-stream fallback.
//! - [`streaming`] -- Line framing and parsing for `/chat/stream`.
//! - [`retry`] -- Exponential-backoff retry policy.

pub mod client;
pub mod retry;
pub mod streaming;
pub mod types;

pub use client::{FragmentStream, TransportClient};
pub use retry::RetryPolicy;
pub use types::{ChatReply, Mode, Session, StreamFragment, Usage};
