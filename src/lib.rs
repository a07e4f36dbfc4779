pub mod app;
pub mod cache;
pub mod commands;
pub mod config;
pub mod context;
pub mod database;
pub mod dto;
pub mod error;
pub mod queue;
pub mod rating;
pub mod shutdown;
pub mod test_utils;

pub use app::App;
pub use config::Config;
pub use context::RequestContext;
pub use error::AppError;
