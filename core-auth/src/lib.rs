//! # Authentication Module
//!
//! Service identities and access-token handling for the remote adapters.
//!
//! ## Overview
//!
//! Interactive authorization flows live outside the core. By the time a sync
//! round runs, each service is represented by a [`TokenSource`]:
//!
//! - Plex uses a static server token ([`StaticToken`])
//! - Spotify and YouTube use OAuth 2.0 refresh-token grants
//!   ([`OAuthTokenSource`]), refreshed shortly before expiry and invalidated
//!   when an adapter sees a 401
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::{OAuthTokenSource, ServiceKind, TokenSource};
//!
//! let source = OAuthTokenSource::spotify(credentials, http_client, clock);
//! let token = source.access_token().await?;
//! ```

pub mod error;
pub mod oauth;
pub mod token;
pub mod types;

pub use error::{AuthError, Result};
pub use oauth::{OAuthEndpoint, OAuthTokenSource};
pub use token::{StaticToken, TokenSource};
pub use types::{OAuthTokens, ServiceKind};
