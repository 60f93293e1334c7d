pub mod client;
pub mod config;
pub mod dispatch;
pub mod download;
pub mod error;
pub mod models;
pub mod server;
pub mod store;

pub use error::{Result, VoiceError};
