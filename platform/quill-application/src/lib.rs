pub mod backtesting;
pub mod benchmarking;
pub mod config;
pub mod experiments;
pub mod logging;
pub mod memo;
mod shared;
pub mod validation;
