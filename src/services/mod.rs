pub mod feed;
pub mod identity;
pub mod storage;

pub use feed::{ChangeFeedService, FeedSubscription};
pub use identity::IdentityService;
pub use storage::StorageService;
