pub mod config;
pub mod history;
pub mod metric;
pub mod snapshot;
pub mod threshold;
pub mod tool;
