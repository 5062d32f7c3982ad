pub mod aggregator;
pub mod display;
pub mod history;
pub mod runner;
pub mod scan_loop;
pub mod settings;
pub mod thresholds;
pub mod toolchain;
pub mod workspace;
