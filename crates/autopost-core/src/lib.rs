pub mod error;
pub mod extract;
pub mod generate;
pub mod images;
pub mod models;
pub mod rehost;
pub mod shutdown;
pub mod sources;
pub mod taxonomy;

pub use error::{AppError, Result};
pub use models::{Article, Generated, LogLevel, NewsSource, PostResult, Topic, TopicStatus};
