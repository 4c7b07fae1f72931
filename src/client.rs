//! The connector client.

use std::sync::Arc;

use reqwest::Method;
use tokio::sync::{watch, Mutex};
use tracing::info;

use crate::config::ClientOptions;
use crate::cookies::CookieJar;
use crate::identity::{SessionIdentity, Urn};
use crate::realtime::handlers::Handlers;
use crate::realtime::session::{
    RealtimeConnection, RealtimeState, EVENT_STREAM_CONTENT_TYPE, HEADER_REALTIME_SESSION,
    REALTIME_CONNECT_PATH,
};
use crate::request::{AuthedRequest, RequestContext};
use crate::transport::{HttpTransport, ReqwestTransport, TransportError};

/// Issues authenticated requests and owns at most one realtime session.
///
/// Cloning is cheap; clones share the cookie jar, identity, and realtime slot.
#[derive(Clone)]
pub struct Client {
    context: RequestContext,
    options: Arc<ClientOptions>,
    handlers: Arc<Handlers>,
    realtime: Arc<Mutex<Option<RealtimeConnection>>>,
    state: Arc<watch::Sender<RealtimeState>>,
}

impl Client {
    /// Creates a client backed by reqwest with default options.
    pub fn new(
        user_entity_urn: Urn,
        jar: Arc<CookieJar>,
        handlers: Handlers,
    ) -> Result<Self, TransportError> {
        Self::with_options(user_entity_urn, jar, handlers, ClientOptions::default())
    }

    pub fn with_options(
        user_entity_urn: Urn,
        jar: Arc<CookieJar>,
        handlers: Handlers,
        options: ClientOptions,
    ) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(options.connect_timeout)?;
        Ok(Self::with_transport(
            Arc::new(transport),
            user_entity_urn,
            jar,
            handlers,
            options,
        ))
    }

    /// Creates a client on top of a caller-supplied transport.
    pub fn with_transport(
        transport: Arc<dyn HttpTransport>,
        user_entity_urn: Urn,
        jar: Arc<CookieJar>,
        handlers: Handlers,
        options: ClientOptions,
    ) -> Self {
        let identity = SessionIdentity::new(user_entity_urn, &options.versions);
        info!(
            event = "client_created",
            user = %identity.user_entity_urn(),
            realtime_session_id = %identity.realtime_session_id(),
            client_id = %identity.client_id(),
            service_version = identity.service_version()
        );
        let (state, _) = watch::channel(RealtimeState::Idle);

        Self {
            context: RequestContext {
                transport,
                jar,
                identity: Arc::new(identity),
            },
            options: Arc::new(options),
            handlers: Arc::new(handlers),
            realtime: Arc::new(Mutex::new(None)),
            state: Arc::new(state),
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.context.identity
    }

    pub fn cookie_jar(&self) -> &Arc<CookieJar> {
        &self.context.jar
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Starts an authenticated request to `path` on the configured origin.
    ///
    /// Absolute URLs are used as-is.
    pub fn new_authed_request(&self, method: Method, path: &str) -> AuthedRequest {
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            self.options.endpoint(path)
        };
        AuthedRequest::new(self.context.clone(), method, url)
    }

    /// Opens the realtime stream in the background.
    ///
    /// A session that is still running is stopped first, and its terminal
    /// event dispatched, before the new one begins connecting. Connect
    /// failures are reported through the handlers, never returned.
    pub async fn start_realtime(&self) {
        let mut slot = self.realtime.lock().await;
        if let Some(previous) = slot.take() {
            previous.shutdown().await;
        }

        let request = self.realtime_connect_request();
        *slot = Some(RealtimeConnection::spawn(
            request,
            Arc::clone(&self.handlers),
            Arc::clone(&self.state),
            self.context.identity.realtime_session_id(),
        ));
    }

    /// Stops the realtime stream, if any, and waits for it to wind down.
    ///
    /// Calling this with no active session does nothing.
    pub async fn stop_realtime(&self) {
        let previous = self.realtime.lock().await.take();
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
    }

    /// Whether a realtime task exists that has not finished yet.
    pub async fn is_realtime_running(&self) -> bool {
        self.realtime
            .lock()
            .await
            .as_ref()
            .is_some_and(|connection| !connection.is_finished())
    }

    pub fn realtime_state(&self) -> RealtimeState {
        *self.state.borrow()
    }

    pub fn subscribe_realtime_state(&self) -> watch::Receiver<RealtimeState> {
        self.state.subscribe()
    }

    fn realtime_connect_request(&self) -> AuthedRequest {
        let identity = &self.context.identity;
        self.new_authed_request(Method::GET, REALTIME_CONNECT_PATH)
            .with_query_param("rc", "1")
            .with_query_param("clientId", identity.client_id().to_string())
            .with_xli_headers()
            .with_csrf()
            .with_accept(EVENT_STREAM_CONTENT_TYPE)
            .with_header(
                HEADER_REALTIME_SESSION,
                &identity.realtime_session_id().to_string(),
            )
    }
}
