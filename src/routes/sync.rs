use crate::{
    models::session::SessionEvent,
    state::AppState,
    surface::{ActiveSurface, BookmarkSurface, SessionGate, SignInSurface},
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/sync", get(sync_handler))
}

#[derive(Debug, Deserialize)]
struct SyncQuery {
    access_token: Option<String>,
}

/// Commands the shell can relay into its mounted surface.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientCommand {
    SetTitle { value: String },
    SetUrl { value: String },
    Submit,
    Delete { id: String },
    SignOut,
}

/// One sync connection per browser view. The connection mounts a session
/// gate; the gate decides which surface is live. Everything the view owns
/// is torn down when the socket closes.
/// GET /api/sync
async fn sync_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SyncQuery>,
) -> Response {
    let connection_id = format!("conn_{}", uuid::Uuid::new_v4());
    info!("Sync connection opened: {}", connection_id);

    ws.on_upgrade(move |socket| {
        handle_sync_connection(socket, state, query.access_token, connection_id)
    })
}

async fn handle_sync_connection(
    mut socket: WebSocket,
    state: Arc<AppState>,
    access_token: Option<String>,
    connection_id: String,
) {
    let mut gate = SessionGate::mount(&state.identity_service, access_token.as_deref()).await;

    loop {
        match gate.active_surface() {
            ActiveSurface::SignIn => {
                let mut signin = SignInSurface::mount(&state.config, &state.identity_service);
                let view = json!({ "surface": "sign_in", "prompt": signin.render() });
                if send_json(&mut socket, &view).await.is_err() {
                    signin.dispose();
                    break;
                }
                let disconnected = wait_for_sign_in(&mut socket, &mut gate, &mut signin).await;
                signin.dispose();
                if disconnected {
                    break;
                }
            }
            ActiveSurface::Bookmarks => {
                let Some(session) = gate.session().cloned() else {
                    continue;
                };
                let mut surface = BookmarkSurface::new(
                    state.identity_service.clone(),
                    state.storage_service.clone(),
                    state.feed_service.clone(),
                    session.access_token.clone(),
                );
                surface.initialize().await;
                if send_json(&mut socket, &surface.render()).await.is_err() {
                    surface.dispose();
                    break;
                }

                let disconnected = run_bookmark_loop(&mut socket, &mut gate, &mut surface).await;
                // Unmount discards surface state and releases the feed
                // subscription; in-flight requests are not aborted.
                surface.dispose();
                if disconnected {
                    break;
                }
            }
        }
    }

    gate.dispose();
    info!("Sync connection closed: {}", connection_id);
}

/// Park on the sign-in surface. A sign-in on this browser arrives as a new
/// connection carrying the token (the callback page reconnects), not as a
/// broadcast, so a session-less gate applies no events; the surface's own
/// mirror only triggers idempotent re-renders. Returns true when the socket
/// is gone.
async fn wait_for_sign_in(
    socket: &mut WebSocket,
    gate: &mut SessionGate,
    signin: &mut SignInSurface,
) -> bool {
    loop {
        tokio::select! {
            event = gate.next_session_change() => {
                match event {
                    Some(_) => return false,
                    None => return true,
                }
            }
            _ = signin.next_session_change() => {
                let view = json!({ "surface": "sign_in", "prompt": signin.render() });
                if send_json(socket, &view).await.is_err() {
                    return true;
                }
            }
            frame = socket.recv() => {
                match frame {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return true,
                    // No commands are meaningful before sign-in.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Single event-loop consumer for one mounted bookmark surface: client
/// commands, feed events and session changes are applied sequentially, so
/// the surface state never needs a lock. Returns true when the socket is
/// gone, false when the surface should remount (sign-out or identity
/// change).
async fn run_bookmark_loop(
    socket: &mut WebSocket,
    gate: &mut SessionGate,
    surface: &mut BookmarkSurface,
) -> bool {
    loop {
        tokio::select! {
            event = surface.next_change() => {
                surface.apply_change(event);
                if send_json(socket, &surface.render()).await.is_err() {
                    return true;
                }
            }
            change = gate.next_session_change() => {
                match change {
                    None => return true,
                    Some(SessionEvent::SignedOut { user_id }) => {
                        debug!("Session ended for {}, unmounting bookmark surface", user_id);
                        return false;
                    }
                    Some(SessionEvent::SignedIn(session)) => {
                        debug!("Session renewed for {}, remounting surface", session.user_id());
                        return false;
                    }
                    Some(SessionEvent::TokenRefreshed(_)) => {
                        // Same principal, fresh token material; remount picks it up.
                        return false;
                    }
                }
            }
            frame = socket.recv() => {
                let text = match frame {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return true,
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                };
                let command = match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(command) => command,
                    Err(e) => {
                        warn!("Ignoring malformed client command: {}", e);
                        continue;
                    }
                };
                match command {
                    ClientCommand::SetTitle { value } => surface.set_title(value),
                    ClientCommand::SetUrl { value } => surface.set_url(value),
                    ClientCommand::Submit => {
                        if surface.begin_submit() {
                            // show the in-flight disablement before the
                            // insert settles
                            if send_json(socket, &surface.render()).await.is_err() {
                                return true;
                            }
                            surface.finish_submit().await;
                        }
                    }
                    ClientCommand::Delete { id } => surface.remove(&id).await,
                    ClientCommand::SignOut => surface.sign_out().await,
                }
                if send_json(socket, &surface.render()).await.is_err() {
                    return true;
                }
            }
        }
    }
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, view: &T) -> Result<(), ()> {
    let payload = match serde_json::to_string(view) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Failed to serialize view snapshot: {}", e);
            return Ok(());
        }
    };
    socket.send(Message::Text(payload)).await.map_err(|e| {
        debug!("Sync socket send failed: {}", e);
    })
}
