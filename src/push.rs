//! Android push registration.
//!
//! The registration body uses LinkedIn's compact binary map encoding. Only the
//! single payload shape the registration endpoint needs is implemented:
//!
//! ```text
//! 00                      format marker
//! 02                      key count
//! 14 <len> "pushNotificationTokens"
//!    01 01                array marker, element count
//!    14 <len> 01 <token>  ordinal, length, element marker, token bytes
//! 14 <len> "pushNotificationEnabled"
//!    08                   boolean true
//! ```
//!
//! Every length is a single byte.

use reqwest::Method;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::client::Client;
use crate::config::AndroidDeviceProfile;
use crate::request::{RequestError, HEADER_LI_TRACK};

pub const PUSH_REGISTRATION_PATH: &str = "/voyager/api/voyagerNotificationsDashPushRegistration";
pub const PUSH_REGISTRATION_CONTENT_TYPE: &str = "application/x-protobuf2;symbol-table=voyager-21304";
pub const PUSH_REGISTRATION_ACCEPT: &str = "application/vnd.linkedin.deduped+x-protobuf";

pub const PUSH_TOKENS_KEY: &str = "pushNotificationTokens";
pub const PUSH_ENABLED_KEY: &str = "pushNotificationEnabled";

const FORMAT_MARKER: u8 = 0x00;
const KEY_COUNT: u8 = 0x02;
const ORDINAL_MARKER: u8 = 0x14;
const ARRAY_MARKER: u8 = 0x01;
const ELEMENT_MARKER: u8 = 0x01;
const BOOL_TRUE: u8 = 0x08;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum PayloadError {
    #[error("push token is {0} bytes; at most 255 are encodable")]
    TokenTooLong(usize),

    #[error("payload truncated at offset {0}")]
    Truncated(usize),

    #[error("unexpected byte {found:#04x} at offset {offset}, expected {expected:#04x}")]
    UnexpectedByte { offset: usize, expected: u8, found: u8 },

    #[error("unexpected key {0:?}")]
    UnexpectedKey(String),
}

#[derive(Debug, Error)]
pub enum PushRegistrationError {
    #[error("failed to build push registration payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("failed to register push notification: {0}")]
    Request(#[from] RequestError),
}

/// Decoded form of a registration payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PushRegistration {
    pub tokens: Vec<Vec<u8>>,
    pub enabled: bool,
}

/// Encodes the registration body for `token`.
pub fn encode_push_registration_payload(token: &str) -> Result<Vec<u8>, PayloadError> {
    let token_len =
        u8::try_from(token.len()).map_err(|_| PayloadError::TokenTooLong(token.len()))?;

    let mut payload = Vec::with_capacity(8 + PUSH_TOKENS_KEY.len() + PUSH_ENABLED_KEY.len() + token.len());
    payload.extend_from_slice(&[FORMAT_MARKER, KEY_COUNT]);

    push_key(&mut payload, PUSH_TOKENS_KEY);
    payload.extend_from_slice(&[ARRAY_MARKER, 1, ORDINAL_MARKER, token_len, ELEMENT_MARKER]);
    payload.extend_from_slice(token.as_bytes());

    push_key(&mut payload, PUSH_ENABLED_KEY);
    payload.push(BOOL_TRUE);

    Ok(payload)
}

fn push_key(payload: &mut Vec<u8>, key: &'static str) {
    // Both keys are compile-time constants well under 256 bytes.
    payload.push(ORDINAL_MARKER);
    payload.push(key.len() as u8);
    payload.extend_from_slice(key.as_bytes());
}

/// Decodes a payload produced by [`encode_push_registration_payload`].
pub fn decode_push_registration_payload(payload: &[u8]) -> Result<PushRegistration, PayloadError> {
    let mut reader = Reader { payload, offset: 0 };
    reader.expect(FORMAT_MARKER)?;
    let key_count = reader.byte()?;

    let mut registration = PushRegistration {
        tokens: Vec::new(),
        enabled: false,
    };
    for _ in 0..key_count {
        reader.expect(ORDINAL_MARKER)?;
        let key = reader.sized()?;
        match key {
            k if k == PUSH_TOKENS_KEY.as_bytes() => {
                reader.expect(ARRAY_MARKER)?;
                let count = reader.byte()?;
                for _ in 0..count {
                    reader.expect(ORDINAL_MARKER)?;
                    let len = reader.byte()? as usize;
                    reader.expect(ELEMENT_MARKER)?;
                    registration.tokens.push(reader.take(len)?.to_vec());
                }
            }
            k if k == PUSH_ENABLED_KEY.as_bytes() => {
                reader.expect(BOOL_TRUE)?;
                registration.enabled = true;
            }
            other => {
                return Err(PayloadError::UnexpectedKey(
                    String::from_utf8_lossy(other).into_owned(),
                ))
            }
        }
    }
    Ok(registration)
}

struct Reader<'a> {
    payload: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, PayloadError> {
        let value = *self
            .payload
            .get(self.offset)
            .ok_or(PayloadError::Truncated(self.offset))?;
        self.offset += 1;
        Ok(value)
    }

    fn expect(&mut self, expected: u8) -> Result<(), PayloadError> {
        let offset = self.offset;
        let found = self.byte()?;
        if found != expected {
            return Err(PayloadError::UnexpectedByte {
                offset,
                expected,
                found,
            });
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], PayloadError> {
        let end = self.offset + len;
        let slice = self
            .payload
            .get(self.offset..end)
            .ok_or(PayloadError::Truncated(self.payload.len()))?;
        self.offset = end;
        Ok(slice)
    }

    fn sized(&mut self) -> Result<&'a [u8], PayloadError> {
        let len = self.byte()? as usize;
        self.take(len)
    }
}

/// Renders the per-request `x-li-track` header for the device being registered.
pub(crate) fn device_track_header(
    profile: &AndroidDeviceProfile,
    device_id: Uuid,
) -> Result<String, serde_json::Error> {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct DeviceTrack<'a> {
        os_name: &'a str,
        os_version: &'a str,
        client_version: &'a str,
        client_minor_version: u64,
        app_id: &'a str,
        device_id: String,
        store_id: &'a str,
        is_ad_tracking_limited: bool,
        mp_name: &'a str,
        mp_version: &'a str,
    }

    serde_json::to_string(&DeviceTrack {
        os_name: &profile.os_name,
        os_version: &profile.os_version,
        client_version: &profile.client_version,
        client_minor_version: profile.client_minor_version,
        app_id: &profile.app_id,
        device_id: device_id.to_string(),
        store_id: &profile.store_id,
        is_ad_tracking_limited: profile.is_ad_tracking_limited,
        mp_name: &profile.mp_name,
        mp_version: &profile.mp_version,
    })
}

impl Client {
    /// Registers an Android (FCM) push token for this session.
    pub async fn register_android_push(&self, token: &str) -> Result<(), PushRegistrationError> {
        let payload = encode_push_registration_payload(token)?;
        let device_id = Uuid::new_v4();
        let track = device_track_header(&self.options().android_device, device_id).map_err(
            |err| RequestError::InvalidHeader {
                name: HEADER_LI_TRACK.to_string(),
                reason: err.to_string(),
            },
        )?;

        self.new_authed_request(Method::POST, PUSH_REGISTRATION_PATH)
            .with_query_param("action", "register")
            .with_xli_headers()
            .with_csrf()
            .with_content_type(PUSH_REGISTRATION_CONTENT_TYPE)
            .with_accept(PUSH_REGISTRATION_ACCEPT)
            .with_header(HEADER_LI_TRACK, &track)
            .with_body(payload)
            .send()
            .await?;

        info!(event = "push_registered", %device_id);
        Ok(())
    }
}
