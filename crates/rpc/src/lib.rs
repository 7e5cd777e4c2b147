//! `sc-rpc`: request/response channel with transparent credential refresh.
//!
//! Every outgoing [`RpcRequest`] goes through the [`RefreshCoordinator`],
//! which attaches the current bearer token, recognises credential-expiry
//! errors, and runs at most one refresh exchange at a time.  Requests that
//! fail while a refresh is in flight wait on a ticket and are replayed with
//! the new token once it lands.
//!
//! The concrete sender ([`RpcTransport`]), refresh call ([`TokenRefresher`])
//! and redirect target ([`Navigator`]) are injected capabilities; the
//! crate ships a reqwest-backed [`HttpTransport`], a [`TransportRefresher`]
//! that issues the refresh operation through any transport, and an
//! in-memory [`RecordingNavigator`].

pub mod coordinator;
pub mod envelope;
pub mod http;
pub mod navigator;
pub mod refresher;
pub mod signature;
pub mod traits;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use coordinator::{RefreshCoordinator, RefreshFailure, RpcError};
pub use envelope::{ErrorExtensions, OriginalError, RpcRequest, ServerError, TransportError};
pub use http::HttpTransport;
pub use navigator::RecordingNavigator;
pub use refresher::TransportRefresher;
pub use signature::{classify, ErrorClass};
pub use traits::{Navigator, RpcTransport, TokenRefresher};
