use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuthError;

/// Remote music services a playlist can be mirrored to.
///
/// The set is closed: adding a service means adding a variant, an adapter
/// crate and a registry entry.
///
/// # Examples
///
/// ```
/// use core_auth::ServiceKind;
///
/// let service: ServiceKind = "youtube".parse().unwrap();
/// assert_eq!(service, ServiceKind::YouTube);
/// assert_eq!(service.display_name(), "YouTube");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Plex,
    Spotify,
    #[serde(rename = "youtube")]
    YouTube,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 3] = [ServiceKind::Plex, ServiceKind::Spotify, ServiceKind::YouTube];

    /// Get the human-readable display name for this service
    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceKind::Plex => "Plex",
            ServiceKind::Spotify => "Spotify",
            ServiceKind::YouTube => "YouTube",
        }
    }

    /// Get the service tag used in storage and configuration
    ///
    /// ```
    /// use core_auth::ServiceKind;
    ///
    /// assert_eq!(ServiceKind::Spotify.as_str(), "spotify");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Plex => "plex",
            ServiceKind::Spotify => "spotify",
            ServiceKind::YouTube => "youtube",
        }
    }
}

impl FromStr for ServiceKind {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "plex" => Ok(ServiceKind::Plex),
            "spotify" => Ok(ServiceKind::Spotify),
            "youtube" | "youtube_music" => Ok(ServiceKind::YouTube),
            other => Err(AuthError::InvalidService(other.to_string())),
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// OAuth 2.0 token set.
///
/// # Security
///
/// The `Debug` implementation redacts both tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// The access token used for API requests
    pub access_token: String,
    /// The refresh token used to obtain new access tokens
    pub refresh_token: String,
    /// When the access token expires (UTC)
    pub expires_at: DateTime<Utc>,
}

impl OAuthTokens {
    /// Create a token set that expires `expires_in` seconds after `issued_at`.
    pub fn new(
        access_token: String,
        refresh_token: String,
        issued_at: DateTime<Utc>,
        expires_in: i64,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: issued_at + Duration::seconds(expires_in),
        }
    }

    /// Whether the access token is expired or expires within `buffer_seconds`
    /// of `now`.
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use core_auth::OAuthTokens;
    ///
    /// let now = Utc::now();
    /// let tokens = OAuthTokens::new("a".into(), "r".into(), now, 600);
    ///
    /// assert!(!tokens.is_expired_with_buffer(now, 60));
    /// assert!(tokens.is_expired_with_buffer(now + Duration::minutes(9), 60));
    /// ```
    pub fn is_expired_with_buffer(&self, now: DateTime<Utc>, buffer_seconds: i64) -> bool {
        now >= self.expires_at - Duration::seconds(buffer_seconds)
    }
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_service_kind_round_trips_tag() {
        for service in ServiceKind::ALL {
            assert_eq!(service.as_str().parse::<ServiceKind>().unwrap(), service);
        }
        assert_eq!(" Spotify ".parse::<ServiceKind>().unwrap(), ServiceKind::Spotify);
    }

    #[test]
    fn test_unknown_service_is_rejected() {
        match "tidal".parse::<ServiceKind>() {
            Err(AuthError::InvalidService(name)) => assert_eq!(name, "tidal"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_service_kind_serde_uses_tags() {
        let json = serde_json::to_string(&ServiceKind::YouTube).unwrap();
        assert_eq!(json, "\"youtube\"");
        let back: ServiceKind = serde_json::from_str("\"plex\"").unwrap();
        assert_eq!(back, ServiceKind::Plex);
    }

    #[test]
    fn test_token_expiry_buffer() {
        let issued = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let tokens = OAuthTokens::new("access".into(), "refresh".into(), issued, 3600);

        assert!(!tokens.is_expired_with_buffer(issued, 300));
        assert!(!tokens.is_expired_with_buffer(issued + Duration::minutes(54), 300));
        assert!(tokens.is_expired_with_buffer(issued + Duration::minutes(55), 300));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let tokens = OAuthTokens::new("secret-a".into(), "secret-r".into(), Utc::now(), 60);
        let rendered = format!("{:?}", tokens);
        assert!(!rendered.contains("secret-a"));
        assert!(!rendered.contains("secret-r"));
    }
}
