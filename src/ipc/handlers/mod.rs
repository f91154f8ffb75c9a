pub mod backup;
pub mod calendar;
pub mod catalog;
pub mod core;
pub mod plan;
pub mod progress;
pub mod setup;
pub mod workload;
