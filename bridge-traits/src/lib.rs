//! # Host Bridge Traits
//!
//! Host abstraction traits the sync core depends on.
//!
//! ## Overview
//!
//! The reconciliation engine talks to the outside world through a very small
//! surface: an HTTP client for the remote music services, a clock used to stamp
//! snapshots, and an optional sink that forwards structured logs to the host.
//! Each capability is a trait so that tests can substitute deterministic fakes
//! and hosts can inject their own networking stack.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry policy
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! | Host    | Implementation Crate | Status |
//! |---------|----------------------|--------|
//! | Desktop | `bridge-desktop`     | ✅ Available |
//! | Tests   | `mockall` / fakes    | ✅ Available |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert transport-specific failures into it and keep the message actionable
//! (include the URL or status code where known).
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync` so handles can be shared across the
//! concurrent per-target tasks of a sync round.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
//!
//! async fn whoami(client: &dyn HttpClient, token: &str) -> bridge_traits::error::Result<String> {
//!     let request = HttpRequest::new(HttpMethod::Get, "https://api.spotify.com/v1/me")
//!         .bearer_token(token);
//!     client.execute(request).await?.text()
//! }
//! ```

pub mod error;
pub mod http;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
