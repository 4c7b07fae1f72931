//! Shared cookie and anti-forgery state.
//!
//! The jar is the only mutable state shared between ordinary requests and the
//! realtime stream. Reads take a shared lock; every update (single cookie,
//! `Set-Cookie` batch, or whole-jar replacement) happens under one exclusive
//! lock so request construction never sees a half-applied refresh.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use secrecy::{ExposeSecret, SecretString};

/// Cookie whose value doubles as the CSRF token.
pub const CSRF_COOKIE: &str = "JSESSIONID";
/// Long-lived authentication cookie.
pub const SESSION_COOKIE: &str = "li_at";

type CookieMap = BTreeMap<String, SecretString>;

/// Everything a request reads from the jar, taken under a single read lock.
#[derive(Debug, Clone)]
pub struct CookieSnapshot {
    pub csrf_token: Option<SecretString>,
    pub has_session_cookie: bool,
    /// Rendered `Cookie` header, `None` for an empty jar.
    pub header: Option<String>,
}

#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: RwLock<BTreeMap<String, SecretString>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `name=value; name2=value2` string as stored by callers.
    pub fn from_cookie_string(cookies: &str) -> Self {
        let jar = Self::new();
        jar.replace_all(cookies);
        jar
    }

    /// Serializes the jar back into the `name=value; ...` form.
    pub fn to_cookie_string(&self) -> String {
        render_cookies(&self.read())
    }

    /// Atomically swaps the whole jar for the cookies in `cookies`.
    pub fn replace_all(&self, cookies: &str) {
        let parsed = parse_cookie_pairs(cookies);
        *self.write() = parsed;
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.write()
            .insert(name.into(), SecretString::new(value.into()));
    }

    pub fn remove(&self, name: &str) -> Option<SecretString> {
        self.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<SecretString> {
        self.read().get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Returns the CSRF token: the `JSESSIONID` value without its quotes.
    pub fn csrf_token(&self) -> Option<SecretString> {
        csrf_token(&self.read())
    }

    pub fn has_session_cookie(&self) -> bool {
        has_session_cookie(&self.read())
    }

    /// Renders the `Cookie` request header, or `None` for an empty jar.
    pub fn cookie_header(&self) -> Option<String> {
        cookie_header(&self.read())
    }

    /// Reads the CSRF token, session presence and `Cookie` header together,
    /// so the three always describe the same jar contents.
    pub fn snapshot(&self) -> CookieSnapshot {
        let guard = self.read();
        CookieSnapshot {
            csrf_token: csrf_token(&guard),
            has_session_cookie: has_session_cookie(&guard),
            header: cookie_header(&guard),
        }
    }

    /// Applies a batch of `Set-Cookie` header values under one write lock.
    ///
    /// Returns the number of cookies that were set or deleted.
    pub fn absorb_set_cookie<'a, I>(&self, headers: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let updates: Vec<SetCookie> = headers.into_iter().filter_map(SetCookie::parse).collect();
        if updates.is_empty() {
            return 0;
        }

        let mut guard = self.write();
        for update in &updates {
            if update.deletes() {
                guard.remove(&update.name);
            } else {
                guard.insert(update.name.clone(), SecretString::new(update.value.clone()));
            }
        }
        updates.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, CookieMap> {
        self.cookies.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CookieMap> {
        self.cookies.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn csrf_token(cookies: &CookieMap) -> Option<SecretString> {
    let raw = cookies.get(CSRF_COOKIE)?;
    let token = raw.expose_secret().trim_matches('"');
    (!token.is_empty()).then(|| SecretString::new(token.to_string()))
}

fn has_session_cookie(cookies: &CookieMap) -> bool {
    cookies
        .get(SESSION_COOKIE)
        .is_some_and(|value| !value.expose_secret().is_empty())
}

fn render_cookies(cookies: &CookieMap) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{name}={}", value.expose_secret()))
        .collect::<Vec<_>>()
        .join("; ")
}

fn cookie_header(cookies: &CookieMap) -> Option<String> {
    let header = render_cookies(cookies);
    (!header.is_empty()).then_some(header)
}

fn parse_cookie_pairs(cookies: &str) -> CookieMap {
    cookies
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), SecretString::new(value.trim().to_string())))
        })
        .collect()
}

struct SetCookie {
    name: String,
    value: String,
    expired: bool,
}

impl SetCookie {
    fn parse(header: &str) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        // Max-Age wins over Expires when both are present.
        let mut max_age_expired = None;
        let mut expires_passed = false;
        for attribute in parts {
            let Some((key, attr_value)) = attribute.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let attr_value = attr_value.trim();
            if key.eq_ignore_ascii_case("max-age") {
                if let Ok(age) = attr_value.parse::<i64>() {
                    max_age_expired = Some(age <= 0);
                }
            } else if key.eq_ignore_ascii_case("expires") {
                expires_passed = httpdate::parse_http_date(attr_value)
                    .is_ok_and(|when| when <= SystemTime::now());
            }
        }

        Some(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
            expired: max_age_expired.unwrap_or(expires_passed),
        })
    }

    fn deletes(&self) -> bool {
        self.expired || self.value.is_empty() || self.value == "delete me"
    }
}
