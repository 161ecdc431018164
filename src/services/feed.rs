use crate::{
    config::Config,
    error::{AppError, Result},
    models::feed::{ChangeEvent, SubscribeFrame},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Client for the backend's push-based change feed.
///
/// Each subscription is one WebSocket connection carrying a server-side
/// filtered event stream for a single collection and owner. The returned
/// handle owns the connection; releasing the handle releases the stream.
#[derive(Clone)]
pub struct ChangeFeedService {
    config: Config,
}

impl ChangeFeedService {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn feed_url(&self) -> String {
        let base = self.config.backend_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!(
            "{}/realtime/v1/websocket?apikey={}",
            ws_base, self.config.backend_anon_key
        )
    }

    /// Open one live subscription to insert/delete events on the bookmark
    /// collection, filtered server-side by owner. The connection is handed
    /// to a reader task; parsed events arrive on the handle's channel.
    pub async fn subscribe(&self, access_token: &str, user_id: &str) -> Result<FeedSubscription> {
        let url = self.feed_url();
        let collection = self.config.bookmark_collection.clone();

        let (mut socket, _) = connect_async(&url).await.map_err(|e| {
            error!("Failed to connect to change feed: {}", e);
            AppError::ExternalService("Failed to connect to change feed".to_string())
        })?;

        let frame = SubscribeFrame::owner_scoped(&collection, user_id, access_token);
        let payload = serde_json::to_string(&frame)?;
        socket.send(Message::Text(payload)).await.map_err(|e| {
            error!("Failed to send subscribe frame: {}", e);
            AppError::ExternalService("Failed to subscribe to change feed".to_string())
        })?;

        info!(
            "Change-feed subscription established for user: {} on {}",
            user_id, collection
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let owner = user_id.to_string();
        let reader = tokio::spawn(async move {
            while let Some(frame) = socket.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ChangeEvent>(&text) {
                        Ok(event) => {
                            if events_tx.send(event).is_err() {
                                // subscriber released the handle
                                break;
                            }
                        }
                        Err(_) => {
                            // acks and heartbeats share the socket
                            debug!("Ignoring non-event feed frame: {}", text);
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!("Change feed closed by backend for user: {}", owner);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Change feed read error for user {}: {}", owner, e);
                        break;
                    }
                }
            }
            debug!("Change-feed reader ended for user: {}", owner);
        });

        Ok(FeedSubscription {
            user_id: user_id.to_string(),
            events: events_rx,
            reader,
        })
    }
}

/// Handle to one live change-feed subscription.
///
/// The handle is the subscription: dropping it aborts the reader task and
/// closes the connection, so release is guaranteed on every exit path,
/// including teardown during re-subscription on identity change.
pub struct FeedSubscription {
    pub(crate) user_id: String,
    pub(crate) events: mpsc::UnboundedReceiver<ChangeEvent>,
    pub(crate) reader: JoinHandle<()>,
}

impl FeedSubscription {
    /// Owner identifier this subscription is filtered to.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Next event from the feed, or `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Explicitly tear the subscription down.
    pub fn unsubscribe(self) {
        debug!("Unsubscribing change feed for user: {}", self.user_id);
        // Drop does the work.
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
impl FeedSubscription {
    /// Build a subscription around a bare channel, bypassing the network.
    pub(crate) fn detached(user_id: &str) -> (mpsc::UnboundedSender<ChangeEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = Self {
            user_id: user_id.to_string(),
            events: rx,
            reader: tokio::spawn(async {}),
        };
        (tx, subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_url_scheme_mapping() {
        let mut config = Config::for_tests();
        config.backend_url = "https://project.example.co".to_string();
        let feed = ChangeFeedService::new(&config);
        assert_eq!(
            feed.feed_url(),
            "wss://project.example.co/realtime/v1/websocket?apikey=anon-key"
        );

        config.backend_url = "http://localhost:8000/".to_string();
        let feed = ChangeFeedService::new(&config);
        assert_eq!(
            feed.feed_url(),
            "ws://localhost:8000/realtime/v1/websocket?apikey=anon-key"
        );
    }

    #[tokio::test]
    async fn test_detached_subscription_delivers_events() {
        let (tx, mut subscription) = FeedSubscription::detached("user_1");
        tx.send(ChangeEvent::insert(serde_json::json!({"id": "bm_1"})))
            .unwrap();

        let event = subscription.next_event().await.unwrap();
        assert!(event.new_record.is_some());
    }
}
