pub mod commands;
pub mod config;
pub mod core;
pub mod directives;
pub mod dispatch;
pub mod display;
pub mod input;
pub mod providers;
pub mod search;
pub mod session;
pub mod store;
pub mod workspace;

pub use crate::config::Config;
pub use crate::core::error::{Result, ShuperError};
pub use dispatch::{DispatchOutcome, Dispatcher, SendRequest, TurnState};
pub use session::{Session, SessionSlots};
pub use workspace::{TurnOptions, TurnReport, Workspace};
