pub mod bar;
pub mod equity_point;
pub mod position;
pub mod reversal_mode;
pub mod side;
pub mod signal;
pub mod trade;
