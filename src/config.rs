//! Client configuration.
//!
//! Version strings and device metadata are injected through [`ClientOptions`]
//! instead of living in module-level globals, so a caller can roll them
//! forward without a new release of this crate.

use std::time::Duration;

use serde::Serialize;

/// Production origin for every request the client issues.
pub const LINKEDIN_BASE_URL: &str = "https://www.linkedin.com";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClientDefaults;

impl ClientDefaults {
    pub const SERVICE_VERSION: &'static str = "9.31.2856";
    pub const PAGE_INSTANCE: &'static str = "urn:li:page:p_flagship3_feed;BltLF3nASzyVYjGAMq/2og==";
    pub const NETWORK_SUFFIX: &'static str = "CFNetwork/3855.100.1 Darwin/25.0.0";
    pub const TRACK_OS_NAME: &'static str = "iOS";
    pub const TRACK_MP_NAME: &'static str = "voyager-ios";
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Version strings advertised by the client in its identity headers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientVersions {
    pub service_version: String,
    pub page_instance: String,
    pub os_name: String,
    pub mp_name: String,
}

impl ClientVersions {
    /// `LinkedIn/<service version> <network suffix>`.
    pub fn user_agent(&self) -> String {
        format!(
            "LinkedIn/{} {}",
            self.service_version,
            ClientDefaults::NETWORK_SUFFIX
        )
    }

    /// Renders the `x-li-track` blob sent on every authenticated request.
    pub fn track_header(&self) -> String {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Track<'a> {
            client_version: &'a str,
            mp_version: &'a str,
            os_name: &'a str,
            mp_name: &'a str,
        }

        serde_json::to_string(&Track {
            client_version: &self.service_version,
            mp_version: &self.service_version,
            os_name: &self.os_name,
            mp_name: &self.mp_name,
        })
        .unwrap_or_default()
    }
}

impl Default for ClientVersions {
    fn default() -> Self {
        Self {
            service_version: ClientDefaults::SERVICE_VERSION.to_string(),
            page_instance: ClientDefaults::PAGE_INSTANCE.to_string(),
            os_name: ClientDefaults::TRACK_OS_NAME.to_string(),
            mp_name: ClientDefaults::TRACK_MP_NAME.to_string(),
        }
    }
}

/// Device metadata reported when registering an Android push token.
///
/// These values have never been confirmed against a current Android build,
/// which is why they are configuration rather than constants.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AndroidDeviceProfile {
    pub os_name: String,
    pub os_version: String,
    pub client_version: String,
    pub client_minor_version: u64,
    pub app_id: String,
    pub store_id: String,
    pub is_ad_tracking_limited: bool,
    pub mp_name: String,
    pub mp_version: String,
}

impl Default for AndroidDeviceProfile {
    fn default() -> Self {
        Self {
            os_name: "Android OS".to_string(),
            os_version: "35".to_string(),
            client_version: "4.1.1090".to_string(),
            client_minor_version: 199_800,
            app_id: "com.linkedin.android".to_string(),
            store_id: "us_googleplay".to_string(),
            is_ad_tracking_limited: true,
            mp_name: "voyager-android".to_string(),
            mp_version: "2.168.97".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Origin used for every endpoint; trailing slashes are ignored.
    pub base_url: String,
    pub versions: ClientVersions,
    pub android_device: AndroidDeviceProfile,
    /// Only applies to the built-in reqwest transport.
    pub connect_timeout: Duration,
}

impl ClientOptions {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end().trim_end_matches('/').to_string();
        self
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: LINKEDIN_BASE_URL.to_string(),
            versions: ClientVersions::default(),
            android_device: AndroidDeviceProfile::default(),
            connect_timeout: ClientDefaults::CONNECT_TIMEOUT,
        }
    }
}
