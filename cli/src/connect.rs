use std::sync::Arc;
use std::time::Duration;

use venered_cli::{CLIConfiguration, CLIError, Result};
use venered_link::{AuthContext, Backend, EventHandlers, VeneredLinkClient};

use crate::args::Cli;

/// Server and sign-in settings after applying flags over config and env.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub url: String,
    pub api_key: String,
    pub email: String,
    pub password: String,
}

/// Flags win over the environment, which already won over the file.
pub fn resolve_settings(cli: &Cli, config: &CLIConfiguration) -> Result<Settings> {
    fn required(flag: Option<&String>, configured: Option<&String>, what: &str) -> Result<String> {
        flag.or(configured).cloned().ok_or_else(|| {
            CLIError::ConfigurationError(format!(
                "{} is not set (flag, VENERED_* variable or config file)",
                what
            ))
        })
    }

    Ok(Settings {
        url: required(cli.url.as_ref(), config.server.url.as_ref(), "server url")?,
        api_key: required(cli.api_key.as_ref(), config.server.api_key.as_ref(), "api key")?,
        email: required(cli.email.as_ref(), config.auth.email.as_ref(), "email")?,
        password: required(cli.password.as_ref(), config.auth.password.as_ref(), "password")?,
    })
}

/// A signed-in user with a REST backend.
pub struct Connected {
    pub client: VeneredLinkClient,
    pub auth: AuthContext,
    pub backend: Arc<dyn Backend>,
}

pub async fn connect(
    cli: &Cli,
    config: &CLIConfiguration,
    handlers: EventHandlers,
) -> Result<Connected> {
    let settings = resolve_settings(cli, config)?;

    let mut builder = VeneredLinkClient::builder()
        .base_url(&settings.url)
        .api_key(&settings.api_key)
        .timeout(Duration::from_secs(config.server.timeout))
        .max_retries(config.server.max_retries)
        .connection_options(config.to_connection_options())
        .event_handlers(handlers)
        .image_upload_endpoint(&config.upload.endpoint);
    if let Some(key) = &config.upload.imgbb_key {
        builder = builder.image_upload_key(key);
    }
    let client = builder.build()?;

    let auth = client.sign_in(&settings.email, &settings.password).await?;
    log::debug!("[LOGIN] Signed in as {}", auth.user_id);

    let backend: Arc<dyn Backend> = Arc::new(client.backend_for(&auth));
    Ok(Connected {
        client,
        auth,
        backend,
    })
}
