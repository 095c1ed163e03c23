pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod io;
pub mod model;
pub mod nesting;
pub mod paths;
pub mod reducer;
pub mod session;
pub mod store;
pub mod sync;
pub mod translate;

pub use error::{ChatError, Result};
pub use event::{StreamEvent, ToolCall};
pub use model::{Message, MessageBody, Role};
pub use nesting::NestingPolicy;
pub use reducer::{Applied, Reducer, StreamStatus};
pub use session::{SessionRecord, SessionStore};
pub use store::SessionDb;
pub use sync::{ConnectionState, SessionSync};
pub use translate::Translator;
