use axum::{response::Html, routing::get, Router};
use std::sync::Arc;

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        .route("/auth/callback", get(auth_callback))
}

/// Unstyled application shell. The session gate runs server-side over the
/// sync socket; the shell only relays commands and renders the view
/// snapshots it receives.
async fn index() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Smart Bookmarks</title></head>
<body>
<div id="app"></div>
<script>
  const token = localStorage.getItem("access_token");
  const proto = location.protocol === "https:" ? "wss" : "ws";
  const query = token ? "?access_token=" + encodeURIComponent(token) : "";
  const sync = new WebSocket(proto + "://" + location.host + "/api/sync" + query);
  sync.onmessage = (msg) => {
    window.view = JSON.parse(msg.data);
    document.dispatchEvent(new CustomEvent("render", { detail: window.view }));
  };
  window.send = (command) => sync.send(JSON.stringify(command));
</script>
</body>
</html>"#,
    )
}

/// Post-authentication landing page. The provider returns the token in the
/// URL fragment, which only the page can see; it reports the token to the
/// session route and returns to the shell.
async fn auth_callback() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Signing in...</title></head>
<body>
<script>
  const params = new URLSearchParams(location.hash.slice(1));
  const token = params.get("access_token");
  if (token) {
    localStorage.setItem("access_token", token);
    fetch("/api/auth/session", {
      method: "POST",
      headers: { "content-type": "application/json" },
      body: JSON.stringify({ access_token: token }),
    }).finally(() => location.replace("/"));
  } else {
    location.replace("/");
  }
</script>
</body>
</html>"#,
    )
}
