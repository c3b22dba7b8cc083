// Library exports for the CLI and integration tests
pub mod config;
pub mod conversation_stats;
pub mod error;
pub mod feature_usage;
pub mod logging;
pub mod models;
pub mod rates;
pub mod renderer;
pub mod report;
pub mod report_builder;
pub mod store;
pub mod timefmt;
pub mod uptime;
pub mod user_activity;
pub mod window;
