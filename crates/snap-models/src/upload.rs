//! Upload sessions issued by the token service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UploadToken;

/// A staged-upload grant, stored at `uploadTokens/{token}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    #[serde(skip)]
    pub token: Option<UploadToken>,

    /// UID of the caller the token was issued to
    pub owner: String,

    /// Token is unusable from this instant on. Issuers must set a future
    /// instant; one stamped with the issuance time is expired on arrival.
    pub valid_until: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(token: UploadToken, owner: impl Into<String>, valid_until: DateTime<Utc>) -> Self {
        Self {
            token: Some(token),
            owner: owner.into(),
            valid_until,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_until
    }

    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.owner == uid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let s = UploadSession::new(UploadToken::from("t"), "u1", now + Duration::minutes(5));
        assert!(!s.is_expired(now));
        assert!(s.is_expired(now + Duration::minutes(5)));
        assert!(s.is_owned_by("u1"));
        assert!(!s.is_owned_by("u2"));
    }

    #[test]
    fn test_issuance_timestamp_is_already_expired() {
        let issued = Utc::now();
        let s = UploadSession::new(UploadToken::from("t"), "u1", issued);
        assert!(s.is_expired(issued));
        assert!(s.is_expired(issued + Duration::milliseconds(1)));
    }
}
