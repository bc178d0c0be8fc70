//! Content platform abstraction layer.
//!
//! - Reddit over its OAuth HTTP API
//! - Mock platform for tests and dry runs

pub mod mock;
pub mod reddit;
pub mod traits;

pub use mock::{MockPlatform, Submission};
pub use reddit::{Credentials, RedditClient};
pub use traits::{ContentPlatform, Item, Location, PlatformError};
