use crate::{
    models::{
        bookmark::{Bookmark, BookmarkForm, NewBookmark},
        feed::{ChangeEvent, EventType},
        session::{Session, User},
    },
    services::{ChangeFeedService, FeedSubscription, IdentityService, StorageService},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Render snapshot pushed to the client after every state transition.
#[derive(Debug, Clone, Serialize)]
pub struct SurfaceView {
    pub surface: &'static str,
    pub user: Option<User>,
    pub bookmarks: Option<Vec<Bookmark>>,
    pub form: BookmarkForm,
    pub submitting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<&'static str>,
}

/// The bookmark surface for one mounted view.
///
/// Holds the authenticated user, the in-memory bookmark list, the pending
/// form values and the submitting flag. After the initial load the change
/// feed is the sole writer to the list: create and delete responses never
/// touch it, so the view is eventually consistent with backend state.
pub struct BookmarkSurface {
    identity: Arc<IdentityService>,
    storage: Arc<StorageService>,
    feed: Arc<ChangeFeedService>,
    access_token: String,
    user: Option<User>,
    bookmarks: Option<Vec<Bookmark>>,
    form: BookmarkForm,
    submitting: bool,
    subscription: Option<FeedSubscription>,
}

impl BookmarkSurface {
    pub fn new(
        identity: Arc<IdentityService>,
        storage: Arc<StorageService>,
        feed: Arc<ChangeFeedService>,
        access_token: String,
    ) -> Self {
        Self {
            identity,
            storage,
            feed,
            access_token,
            user: None,
            bookmarks: None,
            form: BookmarkForm::default(),
            submitting: false,
            subscription: None,
        }
    }

    /// Fetch the user identity, replace the local list with a full
    /// owner-scoped query, and establish the feed subscription. Every
    /// failure is logged and leaves the affected state unset.
    pub async fn initialize(&mut self) {
        match self.identity.get_current_user(&self.access_token).await {
            Ok(Some(user)) => {
                let user_id = user.id.clone();
                self.user = Some(user);

                match self
                    .storage
                    .list_bookmarks(&self.access_token, &user_id)
                    .await
                {
                    Ok(bookmarks) => self.bookmarks = Some(bookmarks),
                    Err(e) => error!("Error fetching bookmarks: {}", e),
                }

                self.resubscribe().await;
            }
            Ok(None) => debug!("No authenticated user, bookmark surface stays empty"),
            Err(e) => error!("Error fetching user: {}", e),
        }
    }

    /// Establish the change-feed subscription for the current user identity,
    /// tearing any previous subscription down first. At most one
    /// subscription is active per mounted surface.
    pub async fn resubscribe(&mut self) {
        if let Some(previous) = self.subscription.take() {
            previous.unsubscribe();
        }

        let Some(user) = &self.user else {
            return;
        };

        match self.feed.subscribe(&self.access_token, &user.id).await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => error!("Error subscribing to change feed: {}", e),
        }
    }

    /// Wait for the next change-feed event. Pends forever while no
    /// subscription is active, so it is safe to poll inside a select loop.
    pub async fn next_change(&mut self) -> ChangeEvent {
        let next = match &mut self.subscription {
            Some(subscription) => subscription.next_event().await,
            None => return std::future::pending().await,
        };
        match next {
            Some(event) => event,
            None => {
                // stream ended; stop delivering rather than spin
                warn!("Change feed ended for mounted surface");
                self.subscription = None;
                std::future::pending().await
            }
        }
    }

    /// Apply one feed event to the local list. Inserts are de-duplicated by
    /// identifier, so a direct insert response racing its own feed
    /// notification cannot produce a duplicate row. Update events are not
    /// handled.
    pub fn apply_change(&mut self, event: ChangeEvent) {
        match event.event_type {
            EventType::Insert => {
                let Some(record) = event.new_record else {
                    return;
                };
                let bookmark: Bookmark = match serde_json::from_value(record) {
                    Ok(bookmark) => bookmark,
                    Err(e) => {
                        warn!("Ignoring malformed insert event: {}", e);
                        return;
                    }
                };
                let list = self.bookmarks.get_or_insert_with(Vec::new);
                if list.iter().any(|b| b.id == bookmark.id) {
                    debug!("Skipping duplicate insert for bookmark: {}", bookmark.id);
                    return;
                }
                list.push(bookmark);
            }
            EventType::Delete => {
                let id = event
                    .old_record
                    .as_ref()
                    .and_then(|record| record.get("id"))
                    .and_then(|id| id.as_str())
                    .map(str::to_string);
                let Some(id) = id else {
                    warn!("Ignoring delete event without record id");
                    return;
                };
                if let Some(list) = &mut self.bookmarks {
                    list.retain(|b| b.id != id);
                }
            }
            EventType::Update => {}
        }
    }

    pub fn set_title(&mut self, value: String) {
        self.form.title = value;
    }

    pub fn set_url(&mut self, value: String) {
        self.form.url = value;
    }

    /// First phase of a create: latch the submitting flag so the in-flight
    /// disablement can render before the storage call settles. Returns false
    /// when the submit is a no-op: no user, a submit already in flight, or
    /// either field empty after trimming. No storage call is issued then.
    pub fn begin_submit(&mut self) -> bool {
        if self.user.is_none() || self.submitting || self.form.trimmed().is_none() {
            return false;
        }
        self.submitting = true;
        true
    }

    /// Second phase: issue the insert and settle. On success only the form
    /// is cleared; the new record reaches the list via the change feed. On
    /// failure the form stays populated for retry. The submitting flag
    /// clears on both outcomes.
    pub async fn finish_submit(&mut self) {
        let record = match (&self.user, self.form.trimmed()) {
            (Some(user), Some((title, url))) => NewBookmark {
                title,
                url,
                user_id: user.id.clone(),
            },
            _ => {
                self.submitting = false;
                return;
            }
        };

        match self.storage.insert_bookmark(&self.access_token, record).await {
            Ok(_) => self.form.clear(),
            Err(e) => error!("Error adding bookmark: {}", e),
        }

        self.submitting = false;
    }

    /// Submit the create form, both phases back to back.
    pub async fn submit(&mut self) {
        if self.begin_submit() {
            self.finish_submit().await;
        }
    }

    /// Delete one bookmark by identifier. The request is scoped by id only;
    /// cross-user deletion is the backend's authorization to reject. The
    /// local list is neither optimistically updated nor rolled back;
    /// removal arrives via the feed delete event.
    pub async fn remove(&mut self, bookmark_id: &str) {
        if let Err(e) = self
            .storage
            .delete_bookmark(&self.access_token, bookmark_id)
            .await
        {
            error!("Error deleting bookmark: {}", e);
        }
    }

    /// Delegate sign-out to the identity provider. Local bookmark state is
    /// deliberately left alone; the gate's unmount discards it.
    pub async fn sign_out(&mut self) {
        let Some(user) = &self.user else {
            return;
        };
        let session = Session {
            access_token: self.access_token.clone(),
            user: user.clone(),
        };
        if let Err(e) = self.identity.sign_out(&session).await {
            error!("Error signing out: {}", e);
        }
    }

    /// Release the feed subscription. Mirrors component unmount: events that
    /// keep arriving afterwards mutate nothing.
    pub fn dispose(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn bookmarks(&self) -> Option<&[Bookmark]> {
        self.bookmarks.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn has_subscription(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn subscribed_user_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.user_id())
    }

    pub fn render(&self) -> SurfaceView {
        let placeholder = match &self.bookmarks {
            Some(list) if list.is_empty() => {
                Some("No bookmarks yet. Add your first bookmark above!")
            }
            _ => None,
        };
        SurfaceView {
            surface: "bookmarks",
            user: self.user.clone(),
            bookmarks: self.bookmarks.clone(),
            form: self.form.clone(),
            submitting: self.submitting,
            placeholder,
        }
    }
}

impl Drop for BookmarkSurface {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::Utc;
    use futures_util::StreamExt;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as WireMessage;

    fn test_user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            display_name: None,
            avatar_url: None,
            created_at: None,
        }
    }

    fn surface_with_config(user_id: &str, config: &Config) -> BookmarkSurface {
        let mut surface = BookmarkSurface::new(
            Arc::new(IdentityService::new(config).unwrap()),
            Arc::new(StorageService::new(config).unwrap()),
            Arc::new(ChangeFeedService::new(config)),
            "token".to_string(),
        );
        surface.user = Some(test_user(user_id));
        surface.bookmarks = Some(Vec::new());
        surface
    }

    fn surface_for(user_id: &str) -> BookmarkSurface {
        surface_with_config(user_id, &Config::for_tests())
    }

    fn insert_event(id: &str, title: &str) -> ChangeEvent {
        ChangeEvent::insert(json!({
            "id": id,
            "title": title,
            "url": "https://example.com",
            "user_id": "user_1",
            "created_at": Utc::now(),
        }))
    }

    fn delete_event(id: &str) -> ChangeEvent {
        ChangeEvent::delete(json!({ "id": id }))
    }

    #[tokio::test]
    async fn test_insert_event_appends_record() {
        let mut surface = surface_for("user_1");
        surface.apply_change(insert_event("bm_1", "Example"));

        let list = surface.bookmarks().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "bm_1");
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_deduplicated() {
        let mut surface = surface_for("user_1");
        surface.apply_change(insert_event("bm_1", "Example"));
        surface.apply_change(insert_event("bm_1", "Example"));

        assert_eq!(surface.bookmarks().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_event_removes_by_id() {
        let mut surface = surface_for("user_1");
        surface.apply_change(insert_event("bm_1", "First"));
        surface.apply_change(insert_event("bm_2", "Second"));
        surface.apply_change(delete_event("bm_1"));

        let list = surface.bookmarks().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "bm_2");
    }

    #[tokio::test]
    async fn test_delete_for_unknown_id_changes_nothing() {
        let mut surface = surface_for("user_1");
        surface.apply_change(insert_event("bm_1", "First"));
        surface.apply_change(delete_event("bm_99"));

        assert_eq!(surface.bookmarks().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_events_are_ignored() {
        let mut surface = surface_for("user_1");
        surface.apply_change(insert_event("bm_1", "First"));
        surface.apply_change(ChangeEvent {
            event_type: EventType::Update,
            new_record: Some(json!({ "id": "bm_1", "title": "Renamed" })),
            old_record: None,
        });

        assert_eq!(surface.bookmarks().unwrap()[0].title, "First");
    }

    #[tokio::test]
    async fn test_empty_form_submit_is_a_no_op() {
        let mut surface = surface_for("user_1");
        surface.set_title("   ".to_string());
        surface.set_url("https://example.com".to_string());

        surface.submit().await;

        // No storage call was issued: the submitting flag never latched and
        // the form was not cleared.
        assert!(!surface.is_submitting());
        assert_eq!(surface.render().form.url, "https://example.com");
        assert!(surface.bookmarks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_begin_submit_latches_in_flight_flag() {
        // Backend is unroutable; the insert itself is expected to fail.
        let mut config = Config::for_tests();
        config.backend_url = "http://127.0.0.1:1".to_string();
        let mut surface = surface_with_config("user_1", &config);
        surface.set_title("Example".to_string());
        surface.set_url("https://example.com".to_string());

        assert!(surface.begin_submit());
        assert!(surface.render().submitting);
        // a second submit while one is in flight is a no-op
        assert!(!surface.begin_submit());

        surface.finish_submit().await;
        let view = surface.render();
        assert!(!view.submitting);
        assert_eq!(view.form.title, "Example");
    }

    #[tokio::test]
    async fn test_identity_change_replaces_feed_subscription() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut connections = Vec::new();
            for _ in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
                let frame = loop {
                    match socket.next().await {
                        Some(Ok(WireMessage::Text(text))) => break text,
                        Some(Ok(_)) => continue,
                        other => panic!("expected subscribe frame, got {:?}", other),
                    }
                };
                let frame: serde_json::Value = serde_json::from_str(&frame).unwrap();
                connections.push((frame, socket));
            }
            connections
        });

        let mut config = Config::for_tests();
        config.backend_url = format!("http://{}", addr);
        let mut surface = surface_with_config("user_1", &config);

        surface.resubscribe().await;
        assert_eq!(surface.subscribed_user_id(), Some("user_1"));

        surface.user = Some(test_user("user_2"));
        surface.resubscribe().await;
        assert_eq!(surface.subscribed_user_id(), Some("user_2"));

        let mut connections = server.await.unwrap();
        let (second_frame, _second_socket) = connections.pop().unwrap();
        let (first_frame, mut first_socket) = connections.pop().unwrap();
        assert_eq!(first_frame["filter"], json!({ "user_id": "user_1" }));
        assert_eq!(second_frame["filter"], json!({ "user_id": "user_2" }));

        // the prior stream is torn down, not leaked
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match first_socket.next().await {
                    None | Some(Err(_)) | Some(Ok(WireMessage::Close(_))) => break,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "prior feed stream never closed");
    }

    #[tokio::test]
    async fn test_submit_without_user_is_a_no_op() {
        let mut surface = surface_for("user_1");
        surface.user = None;
        surface.set_title("Example".to_string());
        surface.set_url("https://example.com".to_string());

        surface.submit().await;
        assert!(!surface.is_submitting());
        assert_eq!(surface.render().form.title, "Example");
    }

    #[tokio::test]
    async fn test_disposed_surface_stops_consuming_events() {
        let mut surface = surface_for("user_1");
        let (tx, subscription) = FeedSubscription::detached("user_1");
        surface.subscription = Some(subscription);

        surface.dispose();
        assert!(!surface.has_subscription());

        // Events that keep arriving after unmount go nowhere.
        assert!(tx.send(insert_event("bm_1", "Late")).is_err());
        assert!(surface.bookmarks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_list_renders_placeholder() {
        let surface = surface_for("user_1");
        let view = surface.render();
        assert_eq!(
            view.placeholder,
            Some("No bookmarks yet. Add your first bookmark above!")
        );

        let mut surface = surface_for("user_1");
        surface.apply_change(insert_event("bm_1", "Example"));
        assert!(surface.render().placeholder.is_none());
    }

    proptest! {
        /// For any event sequence with distinct insert identifiers, the list
        /// length equals the number of inserts minus the processed deletes.
        #[test]
        fn prop_list_length_tracks_inserts_minus_deletes(
            ops in proptest::collection::vec((any::<bool>(), 0u8..16), 0..64)
        ) {
            let mut surface = surface_for("user_1");
            let mut live: HashSet<u8> = HashSet::new();

            for (is_insert, id) in ops {
                let key = format!("bm_{}", id);
                if is_insert {
                    surface.apply_change(insert_event(&key, "t"));
                    live.insert(id);
                } else {
                    surface.apply_change(delete_event(&key));
                    live.remove(&id);
                }
            }

            prop_assert_eq!(surface.bookmarks().unwrap().len(), live.len());
        }
    }
}
