use crate::{
    config::Config,
    error::{AppError, Result},
    models::session::{Session, SessionEvent, User},
};
use reqwest::Client;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Client for the external identity provider.
///
/// All credential handling, redirects and token exchange happen inside the
/// provider; this service only retrieves the session belonging to a token,
/// forwards sign-out requests, and fans session-change notifications out to
/// mounted views. Token material stays opaque throughout.
#[derive(Clone)]
pub struct IdentityService {
    config: Config,
    http_client: Client,
    session_events: broadcast::Sender<SessionEvent>,
}

impl IdentityService {
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let (session_events, _) = broadcast::channel(64);

        Ok(Self {
            config: config.clone(),
            http_client,
            session_events,
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!(
            "{}/auth/v1{}",
            self.config.backend_url.trim_end_matches('/'),
            path
        )
    }

    /// Fetch the user the provider associates with this token. A provider
    /// rejection (expired or bogus token) is reported as `Ok(None)`; only
    /// transport-level failures surface as errors.
    pub async fn get_current_user(&self, access_token: &str) -> Result<Option<User>> {
        let response = self
            .http_client
            .get(self.auth_url("/user"))
            .header("apikey", &self.config.backend_anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach identity provider: {}", e);
                AppError::ExternalService("Failed to reach identity provider".to_string())
            })?;

        if !response.status().is_success() {
            debug!("Identity provider rejected token: {}", response.status());
            return Ok(None);
        }

        let user: User = response.json().await.map_err(|e| {
            error!("Failed to parse identity provider response: {}", e);
            AppError::ExternalService("Invalid response from identity provider".to_string())
        })?;

        Ok(Some(user))
    }

    /// Retrieve the session for a token, if one exists.
    pub async fn get_current_session(&self, access_token: &str) -> Result<Option<Session>> {
        Ok(self.get_current_user(access_token).await?.map(|user| Session {
            access_token: access_token.to_string(),
            user,
        }))
    }

    /// Provider authorization URL for the single supported provider. The
    /// redirect target is derived from the configured site origin; visual
    /// theming is carried separately by the sign-in surface.
    pub fn authorize_url(&self) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("provider", &self.config.auth_provider)
            .append_pair("redirect_to", &self.config.redirect_target())
            .finish();
        format!("{}?{}", self.auth_url("/authorize"), query)
    }

    /// Invalidate the session at the provider, then notify local views.
    pub async fn sign_out(&self, session: &Session) -> Result<()> {
        let response = self
            .http_client
            .post(self.auth_url("/logout"))
            .header("apikey", &self.config.backend_anon_key)
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach identity provider for sign-out: {}", e);
                AppError::ExternalService("Failed to reach identity provider".to_string())
            })?;

        if !response.status().is_success() {
            warn!("Identity provider sign-out returned {}", response.status());
        }

        info!("User signed out: {}", session.user_id());
        self.notify(SessionEvent::SignedOut {
            user_id: session.user_id().to_string(),
        });
        Ok(())
    }

    /// Record a session produced by the provider's redirect flow and notify
    /// local views. Called by the auth routes once the callback page reports
    /// its token.
    pub fn notify_signed_in(&self, session: Session) {
        info!("User signed in: {}", session.user_id());
        self.notify(SessionEvent::SignedIn(session));
    }

    pub fn notify_token_refreshed(&self, session: Session) {
        debug!("Token refreshed for user: {}", session.user_id());
        self.notify(SessionEvent::TokenRefreshed(session));
    }

    /// Register for session-change notifications. Dropping the receiver
    /// deregisters the listener.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_events.subscribe()
    }

    pub(crate) fn notify(&self, event: SessionEvent) {
        // send only fails when no view is mounted, which is fine
        let _ = self.session_events.send(event);
    }
}
