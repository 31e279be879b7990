pub mod app;
pub mod cli;
pub mod config;
pub mod feed;
pub mod filter;
pub mod reconstruct;
pub mod storage;
pub mod ui;

pub use app::{Tick, Watcher};
pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use storage::{ChannelId, DeletedRecord, RecordStore};
