//! DWD weather warning poller.
//!
//! Periodically fetches the warning feed of the Deutscher Wetterdienst,
//! filters it by configured location patterns and hands new warnings to a
//! consumer through a bounded queue.

pub mod config;
pub mod errors;
mod helpers;
pub mod models;
pub mod routes;
pub mod services;

pub use errors::WarnError;
pub use models::{Warning, WeatherInfo};
pub use services::poller::{PollerStatus, WarningPoller};
