use crate::{
    models::session::{Session, SessionEvent},
    services::IdentityService,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Which surface the gate currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSurface {
    SignIn,
    Bookmarks,
}

/// Owns the mirrored session for one mounted view and decides which surface
/// renders. On mount it retrieves the current session and registers for
/// session-change notifications; `dispose` deregisters so no event can act
/// on a torn-down view.
pub struct SessionGate {
    session: Option<Session>,
    events: Option<broadcast::Receiver<SessionEvent>>,
}

impl SessionGate {
    /// Mount the gate. A failed session fetch is treated identically to
    /// "no session": logged, never retried.
    pub async fn mount(identity: &IdentityService, access_token: Option<&str>) -> Self {
        let events = Some(identity.subscribe());

        let session = match access_token {
            Some(token) => match identity.get_current_session(token).await {
                Ok(session) => session,
                Err(e) => {
                    warn!("Session retrieval failed, treating as signed out: {}", e);
                    None
                }
            },
            None => None,
        };

        Self { session, events }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn active_surface(&self) -> ActiveSurface {
        if self.session.is_some() {
            ActiveSurface::Bookmarks
        } else {
            ActiveSurface::SignIn
        }
    }

    /// Wait for the next session-change notification and apply it. Returns
    /// the applied event, or `None` once the gate is disposed.
    pub async fn next_session_change(&mut self) -> Option<SessionEvent> {
        loop {
            let event = {
                let receiver = self.events.as_mut()?;
                loop {
                    match receiver.recv().await {
                        Ok(event) => break event,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!("Session gate lagged behind {} notifications", missed);
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            };
            if self.applies(&event) {
                self.apply_session_event(&event);
                return Some(event);
            }
        }
    }

    /// Whether a broadcast event concerns this gate's view. The channel is
    /// shared by every connection, so only events naming the mirrored
    /// principal apply; a gate without a session accepts nothing (a sign-in
    /// on this browser arrives as a fresh connection carrying the token, not
    /// as a broadcast). Anything looser would hand one user's session to
    /// another connection's view.
    fn applies(&self, event: &SessionEvent) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        let mirrored = session.user_id();
        match event {
            SessionEvent::SignedIn(session) => session.user_id() == mirrored,
            SessionEvent::SignedOut { user_id } => user_id == mirrored,
            SessionEvent::TokenRefreshed(session) => session.user_id() == mirrored,
        }
    }

    pub fn apply_session_event(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::SignedIn(session) => {
                debug!("Session gate: signed in as {}", session.user_id());
                self.session = Some(session.clone());
            }
            SessionEvent::SignedOut { user_id } => {
                debug!("Session gate: signed out {}", user_id);
                self.session = None;
            }
            SessionEvent::TokenRefreshed(session) => {
                debug!("Session gate: token refreshed for {}", session.user_id());
                self.session = Some(session.clone());
            }
        }
    }

    /// Deregister from session-change notifications. Mirrors component
    /// unmount; afterwards `next_session_change` resolves to `None`.
    pub fn dispose(&mut self) {
        self.events = None;
    }
}
