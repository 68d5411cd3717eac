pub mod audit;
pub mod auto_delete;
pub mod cache;
pub mod commands;
pub mod config;
pub mod data;
pub mod duration;
pub mod entities;
pub mod error;
pub mod event_log;
pub mod events;
pub mod filters;
pub mod handlers;
pub mod logging;
pub mod platform;
pub mod scheduler;
pub mod store;

pub const BOT_NAME: &str = "paladin";
pub const COMMAND_TARGET: &str = "paladin::command";
pub const ERROR_TARGET: &str = "paladin::error";
pub const EVENT_TARGET: &str = "paladin::handlers";
pub const EVENT_BUS_TARGET: &str = "paladin::events";
pub const SCHEDULER_TARGET: &str = "paladin::scheduler";
pub const CONSOLE_TARGET: &str = "paladin";

pub use data::{Data, DataInner};
pub use error::{PaladinError, PaladinResult};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
