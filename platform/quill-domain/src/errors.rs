use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BacktestError {
    #[error("unknown engine: {0} (supported: vectorized, event, custom)")]
    UnknownEngine(String),
    #[error("unknown strategy: {0} (supported: ema_crossover, vwap_breakout)")]
    UnknownStrategy(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("backtest cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::BacktestError;

    #[test]
    fn unknown_engine_message_names_the_input() {
        let err = BacktestError::UnknownEngine("zipline".to_string());
        assert!(err.to_string().contains("zipline"));
        assert!(err.to_string().contains("vectorized"));
    }
}
