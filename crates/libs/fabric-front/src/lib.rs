//! Front endpoint: request/response correlation via traceID,
//! topic/component dispatch, and the keep-alive loop that re-registers a
//! front's node-info on a fixed cadence.

mod config;
mod error;
mod front;
mod handler;
mod keepalive;
mod topic_queue;

pub use config::FrontConfig;
pub use error::FrontError;
pub use front::{ErrCallback, Front, RespCallback};
pub use handler::{MessageHandler, ResponseSender};
pub use keepalive::run as run_keep_alive;
pub use topic_queue::TopicQueues;
