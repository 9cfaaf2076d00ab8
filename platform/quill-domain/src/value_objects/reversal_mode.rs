use serde::{Deserialize, Serialize};

/// How an opposite-direction signal is handled while a position is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversalMode {
    /// The opposite signal only closes the live position.
    CloseOnly,
    /// The opposite signal closes the live position and opens the other direction
    /// at the same timestamp and price.
    #[default]
    Reverse,
}

impl ReversalMode {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "close_only" | "close" => Ok(ReversalMode::CloseOnly),
            "reverse" | "reversal" => Ok(ReversalMode::Reverse),
            other => Err(format!(
                "unsupported reversal_mode: {other} (use: close_only | reverse)"
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReversalMode::CloseOnly => "close_only",
            ReversalMode::Reverse => "reverse",
        }
    }
}
