pub mod app;
pub mod cli;
pub mod config;
pub mod logtail;
pub mod manifest;
pub mod monitor;
pub mod report;
pub mod session;
pub mod ui;
pub mod util;
