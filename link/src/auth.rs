//! Authentication for the Venered client.
//!
//! Every request carries the project `apikey` header. Anonymous requests use
//! the api key as bearer token too; signed-in requests use the session's
//! access token so row-level security sees the caller.

use std::fmt;

use uuid::Uuid;

use crate::error::Result;
use crate::models::LoginResponse;

/// Credentials attached to every REST request.
///
/// # Examples
///
/// ```rust
/// use venered_link::AuthProvider;
///
/// // Anonymous access (sign-in, public reads)
/// let auth = AuthProvider::api_key("anon-key");
///
/// // Signed-in access
/// let auth = AuthProvider::session("anon-key", "eyJhbGc...");
/// ```
#[derive(Clone)]
pub enum AuthProvider {
    /// Project key only.
    ApiKey(String),

    /// Project key plus a user access token.
    Session { api_key: String, access_token: String },
}

impl AuthProvider {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey(key.into())
    }

    pub fn session(api_key: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::Session {
            api_key: api_key.into(),
            access_token: access_token.into(),
        }
    }

    /// The project key, present in both variants.
    pub fn project_key(&self) -> &str {
        match self {
            Self::ApiKey(key) => key,
            Self::Session { api_key, .. } => api_key,
        }
    }

    /// The token sent as `Authorization: Bearer`.
    pub fn bearer(&self) -> &str {
        match self {
            Self::ApiKey(key) => key,
            Self::Session { access_token, .. } => access_token,
        }
    }

    /// Attach `apikey` and `Authorization: Bearer` headers to a request.
    pub fn apply_to_request(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder> {
        Ok(request
            .header("apikey", self.project_key())
            .bearer_auth(self.bearer()))
    }

    /// Check if a user session is attached.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Session { .. })
    }
}

impl fmt::Debug for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("AuthProvider::ApiKey(<redacted>)"),
            Self::Session { .. } => f.write_str("AuthProvider::Session(<redacted>)"),
        }
    }
}

/// The signed-in user every reducer, feed and service is built for.
///
/// Operations that need a current user take this by type, so "no user"
/// cannot reach them.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub access_token: String,
}

impl AuthContext {
    pub fn new(user_id: Uuid, access_token: impl Into<String>) -> Self {
        Self {
            user_id,
            email: None,
            access_token: access_token.into(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// The user id as it appears in filters and row columns.
    pub fn user_key(&self) -> String {
        self.user_id.to_string()
    }
}

impl From<LoginResponse> for AuthContext {
    fn from(login: LoginResponse) -> Self {
        Self {
            user_id: login.user.id,
            email: login.user.email,
            access_token: login.access_token,
        }
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_provider_creation() {
        let anon = AuthProvider::api_key("anon");
        assert!(!anon.is_authenticated());
        assert_eq!(anon.bearer(), "anon");

        let session = AuthProvider::session("anon", "token");
        assert!(session.is_authenticated());
        assert_eq!(session.project_key(), "anon");
        assert_eq!(session.bearer(), "token");
    }

    #[test]
    fn test_apply_to_request() {
        let auth = AuthProvider::session("anon", "token");
        let client = reqwest::Client::new();
        let request = auth
            .apply_to_request(client.get("http://localhost:54321/rest/v1/messages"))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(request.headers()["apikey"], "anon");
        assert_eq!(request.headers()["authorization"], "Bearer token");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let auth = AuthProvider::session("anon-secret", "token-secret");
        assert!(!format!("{:?}", auth).contains("secret"));

        let ctx = AuthContext::new(Uuid::nil(), "token-secret");
        assert!(!format!("{:?}", ctx).contains("token-secret"));
    }
}
