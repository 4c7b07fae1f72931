//! Realtime session lifecycle.
//!
//! One background task owns the streamed response. It walks
//! `Idle -> Connecting -> Streaming -> {Closed, Errored}`, dispatches every
//! decoded frame inline in arrival order, and finishes by dispatching exactly
//! one terminal event. Nothing here reconnects; that decision belongs to the
//! caller.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::realtime::events::{classify_failure, decode_frame, RealtimeError, RealtimeEvent};
use crate::realtime::frame::FrameDecoder;
use crate::realtime::handlers::{EventContext, Handlers};
use crate::request::AuthedRequest;

pub const REALTIME_CONNECT_PATH: &str = "/realtime/connect";
pub const HEADER_REALTIME_SESSION: &str = "x-li-realtime-session";
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RealtimeState {
    Idle,
    Connecting,
    Streaming,
    /// Stopped by the caller or closed cleanly by the server.
    Closed,
    Errored,
}

impl RealtimeState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Streaming)
    }
}

/// Handle to the one live realtime task of a client.
pub(crate) struct RealtimeConnection {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RealtimeConnection {
    pub(crate) fn spawn(
        request: AuthedRequest,
        handlers: Arc<Handlers>,
        state: Arc<watch::Sender<RealtimeState>>,
        realtime_session_id: Uuid,
    ) -> Self {
        let cancel = CancellationToken::new();
        let ctx = EventContext {
            cancel: cancel.clone(),
            realtime_session_id,
        };
        state.send_replace(RealtimeState::Connecting);
        let task = tokio::spawn(run_realtime_session(request, handlers, state, ctx));
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Cancels the stream and waits until its terminal event was dispatched.
    pub(crate) async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(event = "realtime_task_failed", error = %err);
            }
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_realtime_session(
    request: AuthedRequest,
    handlers: Arc<Handlers>,
    state: Arc<watch::Sender<RealtimeState>>,
    ctx: EventContext,
) {
    let (terminal, final_state) = match stream_events(request, &handlers, &state, &ctx).await {
        None => {
            info!(
                event = "realtime_closed",
                realtime_session_id = %ctx.realtime_session_id,
                cancelled = ctx.cancel.is_cancelled()
            );
            (RealtimeEvent::TransientDisconnect(None), RealtimeState::Closed)
        }
        Some(err) => {
            warn!(
                event = "realtime_errored",
                realtime_session_id = %ctx.realtime_session_id,
                error = %err
            );
            (classify_failure(err), RealtimeState::Errored)
        }
    };

    state.send_replace(final_state);
    handlers.dispatch(&ctx, &terminal);
}

/// Runs the stream to completion.
///
/// Returns `None` for a clean close (server EOF or cancellation) and the
/// failure otherwise.
async fn stream_events(
    request: AuthedRequest,
    handlers: &Handlers,
    state: &watch::Sender<RealtimeState>,
    ctx: &EventContext,
) -> Option<RealtimeError> {
    let response = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return None,
        result = request.send() => result,
    };
    let response = match response {
        Ok(response) => response,
        Err(err) => return Some(RealtimeError::Connect(err)),
    };
    if !response.status.is_success() {
        return Some(RealtimeError::UnexpectedStatus(response.status));
    }

    state.send_replace(RealtimeState::Streaming);
    info!(
        event = "realtime_streaming",
        realtime_session_id = %ctx.realtime_session_id,
        status = response.status.as_u16()
    );

    let mut body = response.body;
    let mut decoder = FrameDecoder::new();
    loop {
        let chunk = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return None,
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for frame in decoder.push(&bytes) {
                    dispatch_frame(&frame, handlers, ctx);
                }
            }
            Some(Err(err)) => return Some(RealtimeError::Read(err)),
            None => {
                if let Some(frame) = decoder.finish() {
                    dispatch_frame(&frame, handlers, ctx);
                }
                return None;
            }
        }
    }
}

fn dispatch_frame(frame: &str, handlers: &Handlers, ctx: &EventContext) {
    match decode_frame(frame) {
        Ok(Some(event)) => {
            if let RealtimeEvent::ClientConnection(conn) = &event {
                info!(event = "realtime_client_connection", connection_id = %conn.id);
            }
            handlers.dispatch(ctx, &event);
        }
        Ok(None) => debug!(event = "realtime_frame_ignored", frame_len = frame.len()),
        Err(err) => warn!(event = "realtime_frame_undecodable", error = %err),
    }
}
