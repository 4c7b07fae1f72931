//! Callback table invoked from the realtime read loop.
//!
//! Every slot is optional; dispatching to an empty slot does nothing. Handlers
//! run inline on the read loop, so a slow handler holds back the next frame.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::realtime::events::{ClientConnection, DecoratedEvent, RealtimeError, RealtimeEvent};

/// Context handed to every handler invocation.
#[derive(Clone, Debug)]
pub struct EventContext {
    /// Cancelled when the session that produced the event is stopped.
    pub cancel: CancellationToken,
    pub realtime_session_id: Uuid,
}

impl EventContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub type HeartbeatHandler = dyn Fn(&EventContext) + Send + Sync;
pub type ClientConnectionHandler = dyn Fn(&EventContext, &ClientConnection) + Send + Sync;
pub type TransientDisconnectHandler = dyn Fn(&EventContext, Option<&RealtimeError>) + Send + Sync;
pub type ErrorHandler = dyn Fn(&EventContext, &RealtimeError) + Send + Sync;
pub type DecoratedEventHandler = dyn Fn(&EventContext, &DecoratedEvent) + Send + Sync;

#[derive(Clone, Default)]
pub struct Handlers {
    heartbeat: Option<Arc<HeartbeatHandler>>,
    client_connection: Option<Arc<ClientConnectionHandler>>,
    transient_disconnect: Option<Arc<TransientDisconnectHandler>>,
    bad_credentials: Option<Arc<ErrorHandler>>,
    unknown_error: Option<Arc<ErrorHandler>>,
    decorated_event: Option<Arc<DecoratedEventHandler>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_heartbeat(mut self, handler: impl Fn(&EventContext) + Send + Sync + 'static) -> Self {
        self.heartbeat = Some(Arc::new(handler));
        self
    }

    pub fn on_client_connection(
        mut self,
        handler: impl Fn(&EventContext, &ClientConnection) + Send + Sync + 'static,
    ) -> Self {
        self.client_connection = Some(Arc::new(handler));
        self
    }

    pub fn on_transient_disconnect(
        mut self,
        handler: impl Fn(&EventContext, Option<&RealtimeError>) + Send + Sync + 'static,
    ) -> Self {
        self.transient_disconnect = Some(Arc::new(handler));
        self
    }

    pub fn on_bad_credentials(
        mut self,
        handler: impl Fn(&EventContext, &RealtimeError) + Send + Sync + 'static,
    ) -> Self {
        self.bad_credentials = Some(Arc::new(handler));
        self
    }

    pub fn on_unknown_error(
        mut self,
        handler: impl Fn(&EventContext, &RealtimeError) + Send + Sync + 'static,
    ) -> Self {
        self.unknown_error = Some(Arc::new(handler));
        self
    }

    pub fn on_decorated_event(
        mut self,
        handler: impl Fn(&EventContext, &DecoratedEvent) + Send + Sync + 'static,
    ) -> Self {
        self.decorated_event = Some(Arc::new(handler));
        self
    }

    /// Routes `event` to its slot.
    pub fn dispatch(&self, ctx: &EventContext, event: &RealtimeEvent) {
        match event {
            RealtimeEvent::Heartbeat => self.heartbeat(ctx),
            RealtimeEvent::ClientConnection(conn) => self.client_connection(ctx, conn),
            RealtimeEvent::TransientDisconnect(err) => {
                self.transient_disconnect(ctx, err.as_ref())
            }
            RealtimeEvent::BadCredentials(err) => self.bad_credentials(ctx, err),
            RealtimeEvent::UnknownError(err) => self.unknown_error(ctx, err),
            RealtimeEvent::DecoratedEvent(event) => self.decorated_event(ctx, event),
        }
    }

    pub fn heartbeat(&self, ctx: &EventContext) {
        if let Some(handler) = &self.heartbeat {
            handler(ctx);
        }
    }

    pub fn client_connection(&self, ctx: &EventContext, conn: &ClientConnection) {
        if let Some(handler) = &self.client_connection {
            handler(ctx, conn);
        }
    }

    pub fn transient_disconnect(&self, ctx: &EventContext, err: Option<&RealtimeError>) {
        if let Some(handler) = &self.transient_disconnect {
            handler(ctx, err);
        }
    }

    pub fn bad_credentials(&self, ctx: &EventContext, err: &RealtimeError) {
        if let Some(handler) = &self.bad_credentials {
            handler(ctx, err);
        }
    }

    pub fn unknown_error(&self, ctx: &EventContext, err: &RealtimeError) {
        if let Some(handler) = &self.unknown_error {
            handler(ctx, err);
        }
    }

    pub fn decorated_event(&self, ctx: &EventContext, event: &DecoratedEvent) {
        if let Some(handler) = &self.decorated_event {
            handler(ctx, event);
        }
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("heartbeat", &self.heartbeat.is_some())
            .field("client_connection", &self.client_connection.is_some())
            .field("transient_disconnect", &self.transient_disconnect.is_some())
            .field("bad_credentials", &self.bad_credentials.is_some())
            .field("unknown_error", &self.unknown_error.is_some())
            .field("decorated_event", &self.decorated_event.is_some())
            .finish()
    }
}
