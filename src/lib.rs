//! titan - terminal playground for the TitanCraft router API
//!
//! The library is the session engine; `main.rs` and `ui.rs` are thin front
//! ends that raise intents on [`session::SessionState`] and render it.

pub mod admin;
pub mod client;
pub mod config;
pub mod history;
pub mod routes;
pub mod session;

pub use admin::AdminAction;
pub use client::{Dispatcher, Method, RequestSpec, ResponseResult};
pub use config::{Config, ConfigStore};
pub use history::{HistoryItem, HistoryStore};
pub use routes::{Diagnostic, Task};
pub use session::{Completion, Intent, PendingDispatch, Rejected, SessionState};
