use quill_domain::entities::config::BacktestConfig;
use quill_domain::services::indicators::Session;
use quill_domain::services::strategy::{resolve_strategy, Strategy, VwapParams};
use quill_domain::value_objects::reversal_mode::ReversalMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub run: RunConfig,
    pub data: DataConfig,
    pub strategy: StrategyConfig,
    pub account: AccountConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub run_id: String,
    /// vectorized | vectorbt | event | backtestingpy | custom
    pub engine: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    pub path: String,
    pub symbol: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    pub name: String,
    pub fast: usize,
    pub slow: usize,
    pub qty: f64,
    pub reversal_mode: Option<String>,
    pub vwap: Option<VwapConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct VwapConfig {
    pub session: Option<String>,
    pub mult: Option<f64>,
    pub stop_loss: Option<f64>,
    pub target_profit: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    pub cash: f64,
    pub commission: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    pub out_dir: String,
}

impl Config {
    pub fn reversal_mode(&self) -> Result<ReversalMode, String> {
        match self.strategy.reversal_mode.as_deref() {
            Some(raw) => ReversalMode::parse(raw),
            None => Ok(ReversalMode::default()),
        }
    }

    /// Domain inputs for one run, validated against what the configured
    /// strategy reads.
    pub fn backtest_config(&self) -> Result<BacktestConfig, String> {
        let config = BacktestConfig {
            fast: self.strategy.fast,
            slow: self.strategy.slow,
            qty: self.strategy.qty,
            cash: self.account.cash,
            commission: self.account.commission.unwrap_or(0.0),
            reversal_mode: self.reversal_mode()?,
            symbol: self.data.symbol.clone(),
        };
        resolve_strategy(&self.strategy.name, self.vwap_params()?)
            .and_then(|strategy| strategy.validate_config(&config))
            .map_err(|err| err.to_string())?;
        Ok(config)
    }

    pub fn vwap_params(&self) -> Result<VwapParams, String> {
        let defaults = VwapParams::default();
        let Some(vwap) = &self.strategy.vwap else {
            return Ok(defaults);
        };
        let params = VwapParams {
            session: match vwap.session.as_deref() {
                Some(raw) => Session::parse(raw)?,
                None => defaults.session,
            },
            mult: vwap.mult.unwrap_or(defaults.mult),
            stop_loss: vwap.stop_loss.unwrap_or(defaults.stop_loss),
            target_profit: vwap.target_profit.unwrap_or(defaults.target_profit),
        };
        for (name, value) in [
            ("strategy.vwap.mult", params.mult),
            ("strategy.vwap.stop_loss", params.stop_loss),
            ("strategy.vwap.target_profit", params.target_profit),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{name} must be a finite number >= 0 (got {value})"));
            }
        }
        Ok(params)
    }
}

pub fn load_config_with_source(path: &Path) -> Result<(Config, String), String> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {}", path.display(), err))?;
    let config = toml::from_str(&contents)
        .map_err(|err| format!("failed to parse TOML {}: {}", path.display(), err))?;
    Ok((config, contents))
}

#[cfg(test)]
mod tests {
    use super::Config;
    use quill_domain::services::indicators::Session;
    use quill_domain::value_objects::reversal_mode::ReversalMode;

    const MINIMAL: &str = r#"
[run]
run_id = "ema_btc"
engine = "event"

[data]
path = "data/btcusdt_1h.csv"
symbol = "BTCUSDT"

[strategy]
name = "ema_crossover"
fast = 9
slow = 21
qty = 0.01

[account]
cash = 100000.0

[paths]
out_dir = "runs/"
"#;

    fn parse_config(toml_str: &str) -> Config {
        toml::from_str(toml_str).expect("config should parse")
    }

    #[test]
    fn parse_config_rejects_malformed_toml() {
        let err = toml::from_str::<Config>("[run\nrun_id = 1").expect_err("malformed");
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn parse_config_rejects_unknown_fields() {
        let toml_str = format!("{MINIMAL}\nunknown_field = 123\n");
        let err = toml::from_str::<Config>(&toml_str).expect_err("unknown field should fail");
        assert!(err.to_string().to_lowercase().contains("unknown field"));
    }

    #[test]
    fn minimal_config_maps_to_defaults() {
        let config = parse_config(MINIMAL);
        let backtest = config.backtest_config().expect("valid");
        assert_eq!(backtest.symbol, "BTCUSDT");
        assert_eq!(backtest.commission, 0.0);
        assert_eq!(backtest.reversal_mode, ReversalMode::Reverse);
        assert_eq!(config.vwap_params().expect("vwap").session, Session::Week);
    }

    #[test]
    fn full_config_parses_every_table() {
        let toml_str = r#"
[run]
run_id = "vwap_btc"
engine = "custom"

[data]
path = "data/btcusdt_1h.csv"
symbol = "BTCUSDT"

[strategy]
name = "vwap_breakout"
fast = 9
slow = 21
qty = 1.0
reversal_mode = "close_only"

[strategy.vwap]
session = "D"
mult = 1.5
stop_loss = 0.02
target_profit = 0.05

[account]
cash = 5000.0
commission = 0.001

[paths]
out_dir = "runs/"
"#;
        let config = parse_config(toml_str);
        let backtest = config.backtest_config().expect("valid");
        assert_eq!(backtest.reversal_mode, ReversalMode::CloseOnly);
        assert_eq!(backtest.commission, 0.001);
        let vwap = config.vwap_params().expect("vwap");
        assert_eq!(vwap.session, Session::Day);
        assert_eq!(vwap.mult, 1.5);
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut config = parse_config(MINIMAL);
        config.strategy.fast = 30;
        assert!(config.backtest_config().expect_err("fast >= slow").contains("fast"));

        let mut config = parse_config(MINIMAL);
        config.strategy.reversal_mode = Some("flip".to_string());
        assert!(config.backtest_config().is_err());

        let mut config = parse_config(MINIMAL);
        config.strategy.name = "rsi".to_string();
        assert!(config.backtest_config().expect_err("unknown").contains("rsi"));
    }

    #[test]
    fn vwap_configs_skip_the_ema_period_checks() {
        let mut config = parse_config(MINIMAL);
        config.strategy.name = "vwap_breakout".to_string();
        config.strategy.fast = 30;
        let backtest = config.backtest_config().expect("vwap ignores fast/slow");
        assert_eq!(backtest.fast, 30);

        config.account.cash = -1.0;
        assert!(config.backtest_config().expect_err("negative cash").contains("cash"));
    }
}
