//! Connector substrate for LinkedIn's private API.
//!
//! The crate is organized by concern:
//! - `client`: the [`Client`] that owns identity, cookies, and the realtime slot.
//! - `request`: authenticated request construction and error classification.
//! - `realtime`: the long-lived event stream and its dispatch table.
//! - `push`: Android push registration and its binary payload.
//! - `transport`: the HTTP execution seam and its reqwest implementation.
//! - `cookies`, `identity`, `config`: shared state and configuration.

/// Client handle.
pub mod client;
/// Client options and version metadata.
pub mod config;
/// Cookie and CSRF state.
pub mod cookies;
/// Session identity and entity URNs.
pub mod identity;
/// Push notification registration.
pub mod push;
/// Realtime session, events, and handlers.
pub mod realtime;
/// Authenticated request builder.
pub mod request;
/// HTTP transport abstraction.
pub mod transport;

pub use client::Client;
pub use config::ClientOptions;
pub use cookies::CookieJar;
pub use identity::{SessionIdentity, Urn};
pub use realtime::events::{EventKind, RealtimeError, RealtimeEvent};
pub use realtime::handlers::{EventContext, Handlers};
pub use realtime::session::RealtimeState;
pub use request::RequestError;
