use crate::{
    config::Config,
    models::session::{Session, SessionEvent},
    services::IdentityService,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

/// What the sign-in surface asks the external identity widget to show:
/// a single named provider, the post-authentication redirect target, and a
/// visual theme. Credential handling, redirects and provider errors all stay
/// inside the widget.
#[derive(Debug, Clone, Serialize)]
pub struct SignInPrompt {
    pub heading: String,
    pub provider: String,
    pub authorize_url: String,
    pub redirect_to: String,
    pub theme: String,
}

/// The sign-in surface. Registers its own session-change listener on mount,
/// independent of the gate's, and mirrors the session only to know when to
/// render nothing. The gate decides which surface is live.
pub struct SignInSurface {
    provider: String,
    theme: String,
    redirect_to: String,
    authorize_url: String,
    session: Option<Session>,
    events: Option<broadcast::Receiver<SessionEvent>>,
}

impl SignInSurface {
    pub fn mount(config: &Config, identity: &IdentityService) -> Self {
        Self {
            provider: config.auth_provider.clone(),
            theme: config.auth_theme.clone(),
            redirect_to: config.redirect_target(),
            authorize_url: identity.authorize_url(),
            session: None,
            events: Some(identity.subscribe()),
        }
    }

    /// Mirror the next session-change notification for idempotent re-render.
    /// Pends forever once disposed or after the notification stream ends.
    pub async fn next_session_change(&mut self) -> SessionEvent {
        let received = {
            let Some(receiver) = self.events.as_mut() else {
                return std::future::pending().await;
            };
            loop {
                match receiver.recv().await {
                    Ok(event) => break Some(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Sign-in surface lagged behind {} notifications", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break None,
                }
            }
        };
        match received {
            Some(event) => {
                self.apply(&event);
                event
            }
            None => {
                self.events = None;
                std::future::pending().await
            }
        }
    }

    /// Events on the shared channel apply only when they name this view's
    /// mirrored principal, the same rule the gate follows. A surface mounted
    /// without a session keeps its prompt no matter who else signs in.
    fn apply(&mut self, event: &SessionEvent) {
        let Some(mirrored) = self.session.as_ref().map(|s| s.user_id().to_string()) else {
            return;
        };
        match event {
            SessionEvent::SignedIn(session) | SessionEvent::TokenRefreshed(session)
                if session.user_id() == mirrored =>
            {
                self.session = Some(session.clone());
            }
            SessionEvent::SignedOut { user_id } if *user_id == mirrored => {
                self.session = None;
            }
            _ => {}
        }
    }

    /// Render the provider prompt, or nothing when the mirrored session says
    /// someone is already signed in.
    pub fn render(&self) -> Option<SignInPrompt> {
        if self.session.is_some() {
            return None;
        }
        Some(SignInPrompt {
            heading: "Smart Bookmarks".to_string(),
            provider: self.provider.clone(),
            authorize_url: self.authorize_url.clone(),
            redirect_to: self.redirect_to.clone(),
            theme: self.theme.clone(),
        })
    }

    /// Deregister the listener. Mirrors component unmount.
    pub fn dispose(&mut self) {
        self.events = None;
    }
}
