pub mod config;
pub mod database;
pub mod migration;
pub mod models;
pub mod week;
pub mod rollover;
pub mod report;
pub mod utils;
pub mod cli;
pub mod tui;

pub use config::Config;
pub use database::Database;
pub use models::{Category, Project, Task, YearWeek};
pub use utils::Profile;
