pub mod bookmarks;
pub mod gate;
pub mod signin;

pub use bookmarks::{BookmarkSurface, SurfaceView};
pub use gate::{ActiveSurface, SessionGate};
pub use signin::{SignInPrompt, SignInSurface};
