pub mod bookmark;
pub mod feed;
pub mod session;

pub use bookmark::{Bookmark, BookmarkForm, NewBookmark};
pub use feed::{ChangeEvent, EventType};
pub use session::{Session, SessionEvent, User};
