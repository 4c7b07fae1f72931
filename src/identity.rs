//! Per-client identity values fixed at construction.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

use crate::config::ClientVersions;

/// A LinkedIn entity URN such as `urn:li:fsd_profile:ACoAAB...`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Urn {
    entity_type: String,
    id: String,
}

#[derive(Debug, Error, Eq, PartialEq)]
#[error("invalid urn {0:?}")]
pub struct InvalidUrn(pub String);

impl Urn {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl FromStr for Urn {
    type Err = InvalidUrn;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let rest = value
            .strip_prefix("urn:li:")
            .ok_or_else(|| InvalidUrn(value.to_string()))?;
        // Ids may themselves be tuples containing colons.
        match rest.split_once(':') {
            Some((entity_type, id)) if !entity_type.is_empty() && !id.is_empty() => {
                Ok(Self::new(entity_type, id))
            }
            _ => Err(InvalidUrn(value.to_string())),
        }
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "urn:li:{}:{}", self.entity_type, self.id)
    }
}

/// Immutable identifiers and identity headers owned by one client.
#[derive(Clone, Debug)]
pub struct SessionIdentity {
    user_entity_urn: Urn,
    realtime_session_id: Uuid,
    client_id: Uuid,
    page_instance: String,
    x_li_track: String,
    service_version: String,
    user_agent: String,
}

impl SessionIdentity {
    /// Generates fresh realtime-session and client ids.
    pub fn new(user_entity_urn: Urn, versions: &ClientVersions) -> Self {
        Self {
            user_entity_urn,
            realtime_session_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            page_instance: versions.page_instance.clone(),
            x_li_track: versions.track_header(),
            service_version: versions.service_version.clone(),
            user_agent: versions.user_agent(),
        }
    }

    pub fn user_entity_urn(&self) -> &Urn {
        &self.user_entity_urn
    }

    pub fn realtime_session_id(&self) -> Uuid {
        self.realtime_session_id
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub fn page_instance(&self) -> &str {
        &self.page_instance
    }

    pub fn x_li_track(&self) -> &str {
        &self.x_li_track
    }

    pub fn service_version(&self) -> &str {
        &self.service_version
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[cfg(test)]
mod tests {
    use super::{InvalidUrn, SessionIdentity, Urn};
    use crate::config::ClientVersions;

    #[test]
    fn parses_profile_urn() {
        let urn: Urn = "urn:li:fsd_profile:ACoAAB123".parse().expect("parse urn");
        assert_eq!(urn.entity_type(), "fsd_profile");
        assert_eq!(urn.id(), "ACoAAB123");
        assert_eq!(urn.to_string(), "urn:li:fsd_profile:ACoAAB123");
    }

    #[test]
    fn keeps_colons_inside_tuple_ids() {
        let urn: Urn = "urn:li:msg_message:(urn:li:fsd_profile:A,2-B)"
            .parse()
            .expect("parse tuple urn");
        assert_eq!(urn.entity_type(), "msg_message");
        assert_eq!(urn.id(), "(urn:li:fsd_profile:A,2-B)");
    }

    #[test]
    fn rejects_foreign_urns() {
        assert_eq!(
            "urn:other:x:y".parse::<Urn>(),
            Err(InvalidUrn("urn:other:x:y".to_string()))
        );
        assert!("urn:li:fsd_profile:".parse::<Urn>().is_err());
    }

    #[test]
    fn identities_get_distinct_random_ids() {
        let versions = ClientVersions::default();
        let a = SessionIdentity::new(Urn::new("fsd_profile", "a"), &versions);
        let b = SessionIdentity::new(Urn::new("fsd_profile", "a"), &versions);
        assert_ne!(a.realtime_session_id(), b.realtime_session_id());
        assert_ne!(a.client_id(), a.realtime_session_id());
        assert_eq!(a.service_version(), "9.31.2856");
        assert_eq!(a.x_li_track(), versions.track_header());
    }
}
