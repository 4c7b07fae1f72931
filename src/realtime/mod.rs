//! Realtime stream modules.
//!
//! - `frame`: splits the event-stream body into frames.
//! - `events`: typed events, frame decoding, and failure classification.
//! - `handlers`: the optional callback table events are dispatched to.
//! - `session`: connection lifecycle and the background read loop.
//! - `reconnect`: caller-side reconnect decisions.

/// Typed realtime events.
pub mod events;
/// Event-stream frame splitting.
pub mod frame;
/// Event dispatch table.
pub mod handlers;
/// Reconnect backoff decisions.
pub mod reconnect;
/// Realtime session state machine.
pub mod session;
