pub mod audit;
pub mod engine;
pub mod equity;
pub mod indicators;
pub mod ledger;
pub mod normalizer;
pub mod state_machine;
pub mod stats;
pub mod strategy;
