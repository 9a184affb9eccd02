pub mod aggregate;
pub mod bucket;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod lookup;
pub mod models;
pub mod predict;
#[cfg(feature = "gui")]
pub mod ui;

pub use error::{DashError, Result};
