//! Main Venered client with builder pattern.
//!
//! Holds the project settings (base URL, API key, timeouts) and hands out
//! per-user backends, realtime connections and sessions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use url::Url;

use crate::{
    auth::{AuthContext, AuthProvider},
    error::{Result, VeneredLinkError},
    event_handlers::EventHandlers,
    models::{ConnectionOptions, LoginRequest, LoginResponse},
    query::RestBackend,
    realtime::connection::{resolve_ws_url, RealtimeConnection},
    session::Session,
    timeouts::VeneredLinkTimeouts,
    upload::ImageUploader,
};

/// Main Venered client.
///
/// Use [`VeneredLinkClientBuilder`] to construct instances.
///
/// # Examples
///
/// ```rust,no_run
/// use venered_link::VeneredLinkClient;
///
/// # async fn example() -> venered_link::Result<()> {
/// let client = VeneredLinkClient::builder()
///     .base_url("https://project.supabase.co")
///     .api_key("anon-key")
///     .build()?;
///
/// let auth = client.sign_in("ana@example.com", "secret").await?;
/// let session = client.session(auth).await?;
/// let badge = session.unread_messages();
/// badge.start(session.realtime()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct VeneredLinkClient {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
    max_retries: u32,
    timeouts: VeneredLinkTimeouts,
    connection_options: ConnectionOptions,
    event_handlers: EventHandlers,
    uploader: ImageUploader,
}

impl VeneredLinkClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> VeneredLinkClientBuilder {
        VeneredLinkClientBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeouts(&self) -> &VeneredLinkTimeouts {
        &self.timeouts
    }

    pub fn event_handlers(&self) -> &EventHandlers {
        &self.event_handlers
    }

    pub fn uploader(&self) -> &ImageUploader {
        &self.uploader
    }

    /// Exchange email and password for an [`AuthContext`].
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthContext> {
        let url = format!("{}/auth/v1/token", self.base_url);
        debug!("[LOGIN] Authenticating '{}' at url={}", email, url);

        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let start = Instant::now();
        let builder = self
            .http_client
            .post(&url)
            .query(&[("grant_type", "password")])
            .json(&request);
        let response = AuthProvider::api_key(&self.api_key)
            .apply_to_request(builder)?
            .send()
            .await?;

        let status = response.status();
        debug!("[LOGIN] HTTP response received in {:?}, status={}", start.elapsed(), status);
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            debug!("[LOGIN] Login failed: {}", error_text);
            return Err(VeneredLinkError::AuthenticationError(format!(
                "Login failed ({}): {}",
                status, error_text
            )));
        }

        let login = response.json::<LoginResponse>().await?;
        if login.access_token.is_empty() {
            return Err(VeneredLinkError::NotAuthenticated);
        }
        debug!("[LOGIN] Authenticated user {} in {:?}", login.user.id, start.elapsed());
        Ok(AuthContext::from(login))
    }

    /// Backend acting as `auth`'s user.
    pub fn backend_for(&self, auth: &AuthContext) -> RestBackend {
        RestBackend::new(
            self.base_url.clone(),
            self.http_client.clone(),
            AuthProvider::session(&self.api_key, &auth.access_token),
            self.max_retries,
        )
    }

    /// Backend with only the project key, for public reads.
    pub fn anonymous_backend(&self) -> RestBackend {
        RestBackend::new(
            self.base_url.clone(),
            self.http_client.clone(),
            AuthProvider::api_key(&self.api_key),
            self.max_retries,
        )
    }

    /// Open the realtime socket as `auth`'s user.
    pub async fn connect_realtime(&self, auth: &AuthContext) -> Result<RealtimeConnection> {
        let ws_url = resolve_ws_url(&self.base_url, &self.api_key)?;
        RealtimeConnection::connect(
            ws_url,
            auth.access_token.clone(),
            self.timeouts.clone(),
            self.connection_options.clone(),
            self.event_handlers.clone(),
        )
        .await
    }

    /// Backend plus realtime connection for `auth`'s user.
    pub async fn session(&self, auth: AuthContext) -> Result<Session> {
        let realtime = self.connect_realtime(&auth).await?;
        let backend = self.backend_for(&auth);
        Ok(Session::new(
            auth,
            Arc::new(backend),
            Arc::new(realtime),
            self.event_handlers.clone(),
        ))
    }
}

/// Builder for configuring [`VeneredLinkClient`] instances.
pub struct VeneredLinkClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
    max_retries: u32,
    timeouts: VeneredLinkTimeouts,
    connection_options: ConnectionOptions,
    event_handlers: EventHandlers,
    image_upload_key: Option<String>,
    image_upload_endpoint: Option<String>,
}

impl VeneredLinkClientBuilder {
    fn new() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            timeouts: VeneredLinkTimeouts::default(),
            connection_options: ConnectionOptions::default(),
            event_handlers: EventHandlers::default(),
            image_upload_key: None,
            image_upload_endpoint: None,
        }
    }

    /// Project URL, e.g. `https://project.supabase.co`
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Public (anon) project key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set request timeout (for HTTP requests)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set maximum number of retries for failed requests
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set timeout configuration for all operations. Also sets the HTTP
    /// request timeout to the receive timeout.
    pub fn timeouts(mut self, timeouts: VeneredLinkTimeouts) -> Self {
        self.timeout = timeouts.receive_timeout;
        self.timeouts = timeouts;
        self
    }

    /// Reconnect and dedup behavior of realtime channels
    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    /// Lifecycle and alert callbacks
    ///
    /// ```rust,no_run
    /// use venered_link::{EventHandlers, VeneredLinkClient};
    ///
    /// # fn example() -> venered_link::Result<()> {
    /// let client = VeneredLinkClient::builder()
    ///     .base_url("https://project.supabase.co")
    ///     .api_key("anon-key")
    ///     .event_handlers(EventHandlers::new().on_alert(|cue| println!("new row in {}", cue.table)))
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Key for the image host
    pub fn image_upload_key(mut self, key: impl Into<String>) -> Self {
        self.image_upload_key = Some(key.into());
        self
    }

    /// Override the image host endpoint
    pub fn image_upload_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.image_upload_endpoint = Some(endpoint.into());
        self
    }

    /// Build the client
    pub fn build(self) -> Result<VeneredLinkClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| VeneredLinkError::ConfigurationError("base_url is required".into()))?;
        let parsed = Url::parse(&base_url).map_err(|e| {
            VeneredLinkError::ConfigurationError(format!("invalid base_url '{}': {}", base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(VeneredLinkError::ConfigurationError(format!(
                "base_url must be http or https, got '{}'",
                parsed.scheme()
            )));
        }
        let base_url = base_url.trim_end_matches('/').to_string();

        let api_key = self
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| VeneredLinkError::ConfigurationError("api_key is required".into()))?;

        // Keep-alive pooling: most calls go to the same host
        let http_client = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeouts.connection_timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| VeneredLinkError::ConfigurationError(e.to_string()))?;

        let mut uploader = ImageUploader::new(http_client.clone(), self.image_upload_key);
        if let Some(endpoint) = self.image_upload_endpoint {
            uploader = uploader.with_endpoint(endpoint);
        }

        Ok(VeneredLinkClient {
            base_url,
            api_key,
            http_client,
            max_retries: self.max_retries,
            timeouts: self.timeouts,
            connection_options: self.connection_options,
            event_handlers: self.event_handlers,
            uploader,
        })
    }
}
