//! Authenticated request construction.
//!
//! [`AuthedRequest`] is a fluent builder in the style of reqwest's
//! `RequestBuilder`: failures while composing (a missing CSRF token, an
//! invalid header) are recorded and reported by [`AuthedRequest::send`]
//! before any network call is made.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, COOKIE, SET_COOKIE, USER_AGENT,
};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::cookies::{CookieJar, CSRF_COOKIE, SESSION_COOKIE};
use crate::identity::SessionIdentity;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

const ERROR_BODY_SNIPPET_LEN: usize = 220;

pub const HEADER_CSRF_TOKEN: &str = "csrf-token";
pub const HEADER_LI_TRACK: &str = "x-li-track";
pub const HEADER_LI_PAGE_INSTANCE: &str = "x-li-page-instance";
pub const HEADER_RESTLI_PROTOCOL_VERSION: &str = "x-restli-protocol-version";

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("authentication required: {reason}")]
    AuthRequired { reason: String },

    #[error("network error: {0}")]
    Network(#[from] TransportError),

    #[error("server error {status}: {body}")]
    ServerError { status: StatusCode, body: String },

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

impl RequestError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::ServerError { .. } => true,
            Self::AuthRequired { .. }
            | Self::UnexpectedStatus { .. }
            | Self::InvalidHeader { .. } => false,
        }
    }

    pub fn is_auth_required(&self) -> bool {
        matches!(self, Self::AuthRequired { .. })
    }

    fn missing_cookie(name: &str) -> Self {
        Self::AuthRequired {
            reason: format!("cookie {name} is not present"),
        }
    }
}

/// Everything an authenticated request needs from its client.
#[derive(Clone)]
pub(crate) struct RequestContext {
    pub(crate) transport: Arc<dyn HttpTransport>,
    pub(crate) jar: Arc<CookieJar>,
    pub(crate) identity: Arc<SessionIdentity>,
}

#[must_use = "an AuthedRequest does nothing until sent"]
pub struct AuthedRequest {
    context: RequestContext,
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Bytes>,
    csrf: bool,
    error: Option<RequestError>,
}

impl AuthedRequest {
    pub(crate) fn new(context: RequestContext, method: Method, url: impl Into<String>) -> Self {
        Self {
            context,
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            csrf: false,
            error: None,
        }
    }

    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attaches the client-tracking, page-instance and user-agent headers.
    ///
    /// The service version travels in the user agent (`LinkedIn/<version> ...`)
    /// and in the tracking blob; there is no separate version header.
    pub fn with_xli_headers(self) -> Self {
        let identity = Arc::clone(&self.context.identity);
        self.with_header(HEADER_LI_TRACK, identity.x_li_track())
            .with_header(HEADER_LI_PAGE_INSTANCE, identity.page_instance())
            .with_header(USER_AGENT.as_str(), identity.user_agent())
            .with_header(HEADER_RESTLI_PROTOCOL_VERSION, "2.0.0")
    }

    /// Attaches the CSRF token.
    ///
    /// The token is read at send time, from the same jar snapshot that renders
    /// the `Cookie` header.
    pub fn with_csrf(mut self) -> Self {
        self.csrf = true;
        self
    }

    pub fn with_content_type(self, content_type: &str) -> Self {
        self.with_header(CONTENT_TYPE.as_str(), content_type)
    }

    pub fn with_accept(self, accept: &str) -> Self {
        self.with_header(ACCEPT.as_str(), accept)
    }

    /// Sets a header, replacing any earlier value for the same name.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name_parsed = HeaderName::from_bytes(name.as_bytes());
        let value_parsed = HeaderValue::from_str(value);
        match (name_parsed, value_parsed) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            (Err(err), _) => self.record(RequestError::InvalidHeader {
                name: name.to_string(),
                reason: err.to_string(),
            }),
            (_, Err(err)) => self.record(RequestError::InvalidHeader {
                name: name.to_string(),
                reason: err.to_string(),
            }),
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sends the request without following redirects.
    ///
    /// 2xx and 3xx responses are returned as-is; every other status is
    /// classified into a [`RequestError`]. `Set-Cookie` headers on any
    /// response are applied to the jar.
    pub async fn send(self) -> Result<HttpResponse, RequestError> {
        let context = self.context.clone();
        let request = self.into_http_request()?;
        let method = request.method.clone();
        let url = request.url.clone();

        let response = context.transport.execute(request).await?;
        let absorbed = context.jar.absorb_set_cookie(
            response
                .headers
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok()),
        );
        let status = response.status;
        debug!(
            event = "authed_request_completed",
            %method,
            url = %url,
            status = status.as_u16(),
            cookies_updated = absorbed
        );

        if status.is_success() || status.is_redirection() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }

    fn into_http_request(mut self) -> Result<HttpRequest, RequestError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        let cookies = self.context.jar.snapshot();
        let mut headers = self.headers;
        if self.csrf {
            let token = cookies
                .csrf_token
                .ok_or_else(|| RequestError::missing_cookie(CSRF_COOKIE))?;
            headers.insert(
                HeaderName::from_static(HEADER_CSRF_TOKEN),
                header_value(HEADER_CSRF_TOKEN, token.expose_secret())?,
            );
        }
        if !cookies.has_session_cookie {
            return Err(RequestError::missing_cookie(SESSION_COOKIE));
        }
        if let Some(cookie_header) = cookies.header {
            headers.insert(COOKIE, header_value(COOKIE.as_str(), &cookie_header)?);
        }

        Ok(HttpRequest {
            method: self.method,
            url: append_query(&self.url, &self.query),
            headers,
            body: self.body,
        })
    }

    fn record(&mut self, error: RequestError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, RequestError> {
    HeaderValue::from_str(value).map_err(|err| RequestError::InvalidHeader {
        name: name.to_string(),
        reason: err.to_string(),
    })
}

fn append_query(url: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let encoded = query
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&");
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{encoded}")
}

pub(crate) fn classify_status(status: StatusCode, body: &str) -> RequestError {
    let body = summarize_error_body(body);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        RequestError::AuthRequired {
            reason: format!("server responded {status}: {body}"),
        }
    } else if status.is_server_error() {
        RequestError::ServerError { status, body }
    } else {
        RequestError::UnexpectedStatus { status, body }
    }
}

fn summarize_error_body(body: &str) -> String {
    #[derive(Debug, Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.message.or(parsed.error) {
            return message;
        }
    }

    body.chars().take(ERROR_BODY_SNIPPET_LEN).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};
    use reqwest::{Method, StatusCode};

    use super::{
        append_query, classify_status, AuthedRequest, RequestContext, RequestError,
        HEADER_CSRF_TOKEN, HEADER_LI_PAGE_INSTANCE, HEADER_LI_TRACK,
    };
    use crate::config::ClientVersions;
    use crate::cookies::CookieJar;
    use crate::identity::{SessionIdentity, Urn};
    use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

    struct RecordingTransport {
        status: StatusCode,
        set_cookie: Option<&'static str>,
        body: &'static str,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingTransport {
        fn new(status: StatusCode) -> Self {
            Self {
                status,
                set_cookie: None,
                body: "",
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().expect("lock").len()
        }

        fn last(&self) -> HttpRequest {
            self.seen
                .lock()
                .expect("lock")
                .last()
                .cloned()
                .expect("a request was sent")
        }
    }

    #[async_trait]
    impl HttpTransport for RecordingTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().expect("lock").push(request);
            let mut headers = HeaderMap::new();
            if let Some(cookie) = self.set_cookie {
                headers.insert(SET_COOKIE, HeaderValue::from_static(cookie));
            }
            Ok(HttpResponse::from_bytes(self.status, headers, self.body))
        }
    }

    fn context(transport: Arc<RecordingTransport>, cookies: &str) -> RequestContext {
        RequestContext {
            transport,
            jar: Arc::new(CookieJar::from_cookie_string(cookies)),
            identity: Arc::new(SessionIdentity::new(
                Urn::new("fsd_profile", "me"),
                &ClientVersions::default(),
            )),
        }
    }

    const AUTHED: &str = r#"li_at=AQED; JSESSIONID="ajax:42""#;

    #[tokio::test]
    async fn missing_csrf_fails_without_network_call() {
        let transport = Arc::new(RecordingTransport::new(StatusCode::OK));
        let ctx = context(Arc::clone(&transport), "li_at=AQED");

        let result = AuthedRequest::new(ctx, Method::GET, "https://example.test/x")
            .with_csrf()
            .send()
            .await;

        assert!(matches!(result, Err(RequestError::AuthRequired { .. })));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn missing_session_cookie_fails_without_network_call() {
        let transport = Arc::new(RecordingTransport::new(StatusCode::OK));
        let ctx = context(Arc::clone(&transport), r#"JSESSIONID="ajax:42""#);

        let result = AuthedRequest::new(ctx, Method::GET, "https://example.test/x")
            .with_csrf()
            .send()
            .await;

        assert!(result.expect_err("no li_at").is_auth_required());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn builds_identity_csrf_cookie_and_query() {
        let transport = Arc::new(RecordingTransport::new(StatusCode::OK));
        let ctx = context(Arc::clone(&transport), AUTHED);
        let track = ctx.identity.x_li_track().to_string();

        AuthedRequest::new(ctx, Method::POST, "https://example.test/api")
            .with_query_param("action", "register")
            .with_query_param("q", "a b&c")
            .with_xli_headers()
            .with_csrf()
            .with_content_type("application/json")
            .with_body("{}")
            .send()
            .await
            .expect("send");

        let sent = transport.last();
        assert_eq!(sent.method, Method::POST);
        assert_eq!(
            sent.url,
            "https://example.test/api?action=register&q=a%20b%26c"
        );
        assert_eq!(sent.headers[HEADER_CSRF_TOKEN], "ajax:42");
        assert_eq!(sent.headers[HEADER_LI_TRACK], track.as_str());
        assert_eq!(
            sent.headers[HEADER_LI_PAGE_INSTANCE],
            "urn:li:page:p_flagship3_feed;BltLF3nASzyVYjGAMq/2og=="
        );
        assert_eq!(sent.headers["cookie"], r#"JSESSIONID="ajax:42"; li_at=AQED"#);
        assert_eq!(sent.headers["content-type"], "application/json");
        assert_eq!(sent.body.as_deref(), Some(&b"{}"[..]));
    }

    #[tokio::test]
    async fn csrf_header_matches_cookie_sent_with_it() {
        let transport = Arc::new(RecordingTransport::new(StatusCode::OK));
        let ctx = context(Arc::clone(&transport), r#"li_at=A; JSESSIONID="ajax:old""#);
        let jar = Arc::clone(&ctx.jar);

        let request = AuthedRequest::new(ctx, Method::GET, "https://example.test/")
            .with_csrf();
        jar.replace_all(r#"li_at=B; JSESSIONID="ajax:new""#);
        request.send().await.expect("send");

        let sent = transport.last();
        assert_eq!(sent.headers[HEADER_CSRF_TOKEN], "ajax:new");
        assert_eq!(sent.headers["cookie"], r#"JSESSIONID="ajax:new"; li_at=B"#);
    }

    #[tokio::test]
    async fn csrf_cleared_after_build_fails_without_network_call() {
        let transport = Arc::new(RecordingTransport::new(StatusCode::OK));
        let ctx = context(Arc::clone(&transport), AUTHED);
        let jar = Arc::clone(&ctx.jar);

        let request = AuthedRequest::new(ctx, Method::GET, "https://example.test/")
            .with_csrf();
        jar.remove("JSESSIONID");
        let error = request.send().await.expect_err("csrf removed");

        assert!(error.is_auth_required());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn user_agent_carries_service_version() {
        let transport = Arc::new(RecordingTransport::new(StatusCode::OK));
        let ctx = context(Arc::clone(&transport), AUTHED);
        let version = ctx.identity.service_version().to_string();

        AuthedRequest::new(ctx, Method::GET, "https://example.test/")
            .with_xli_headers()
            .send()
            .await
            .expect("send");

        let sent = transport.last();
        let agent = sent.headers["user-agent"].to_str().expect("ascii");
        assert!(agent.starts_with(&format!("LinkedIn/{version} ")));
        assert!(sent.headers[HEADER_LI_TRACK]
            .to_str()
            .expect("ascii")
            .contains(&version));
    }

    #[tokio::test]
    async fn later_header_wins() {
        let transport = Arc::new(RecordingTransport::new(StatusCode::OK));
        let ctx = context(Arc::clone(&transport), AUTHED);

        AuthedRequest::new(ctx, Method::GET, "https://example.test/")
            .with_xli_headers()
            .with_header("X-LI-Track", "override")
            .send()
            .await
            .expect("send");

        let sent = transport.last();
        let values: Vec<_> = sent.headers.get_all(HEADER_LI_TRACK).iter().collect();
        assert_eq!(values, vec!["override"]);
    }

    #[tokio::test]
    async fn redirects_are_returned_not_followed() {
        let transport = Arc::new(RecordingTransport::new(StatusCode::FOUND));
        let ctx = context(Arc::clone(&transport), AUTHED);

        let response = AuthedRequest::new(ctx, Method::GET, "https://example.test/")
            .send()
            .await
            .expect("3xx is not an error");
        assert_eq!(response.status, StatusCode::FOUND);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn set_cookie_updates_shared_jar() {
        let mut transport = RecordingTransport::new(StatusCode::OK);
        transport.set_cookie = Some(r#"JSESSIONID="ajax:99"; Path=/"#);
        let transport = Arc::new(transport);
        let ctx = context(Arc::clone(&transport), AUTHED);
        let jar = Arc::clone(&ctx.jar);

        AuthedRequest::new(ctx, Method::GET, "https://example.test/")
            .send()
            .await
            .expect("send");

        assert_eq!(
            secrecy::ExposeSecret::expose_secret(&jar.csrf_token().expect("csrf")),
            "ajax:99"
        );
    }

    #[tokio::test]
    async fn server_errors_are_classified() {
        let mut transport = RecordingTransport::new(StatusCode::BAD_GATEWAY);
        transport.body = r#"{"message":"upstream down"}"#;
        let ctx = context(Arc::new(transport), AUTHED);

        let error = AuthedRequest::new(ctx, Method::GET, "https://example.test/")
            .send()
            .await
            .expect_err("5xx");
        match error {
            RequestError::ServerError { status, body } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(StatusCode::UNAUTHORIZED, "").is_auth_required());
        assert!(classify_status(StatusCode::FORBIDDEN, "").is_auth_required());
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "nope"),
            RequestError::UnexpectedStatus { .. }
        ));
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "").is_retryable());
        assert!(!classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
    }

    #[test]
    fn invalid_header_is_reported() {
        let transport = Arc::new(RecordingTransport::new(StatusCode::OK));
        let request = AuthedRequest::new(
            context(transport, AUTHED),
            Method::GET,
            "https://example.test/",
        )
        .with_header("bad header", "x");
        assert!(matches!(
            request.into_http_request(),
            Err(RequestError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn query_appends_to_existing_query_string() {
        let query = vec![("clientId".to_string(), "abc".to_string())];
        assert_eq!(
            append_query("https://x.test/connect?rc=1", &query),
            "https://x.test/connect?rc=1&clientId=abc"
        );
        assert_eq!(append_query("https://x.test/", &[]), "https://x.test/");

        let query = vec![("topic".to_string(), "urn:li:x/é ~".to_string())];
        assert_eq!(
            append_query("https://x.test/", &query),
            "https://x.test/?topic=urn%3Ali%3Ax%2F%C3%A9%20~"
        );
    }
}
