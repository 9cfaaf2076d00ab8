use crate::value_objects::bar::PriceBar;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct PriceQuery {
    pub path: PathBuf,
    pub symbol: String,
}

/// What the loader had to drop or reorder to hand back a clean series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataQualityReport {
    pub rows: usize,
    pub invalid_rows: usize,
    pub duplicates: usize,
    pub out_of_order: usize,
}

impl DataQualityReport {
    pub fn is_clean(&self) -> bool {
        self.invalid_rows == 0 && self.duplicates == 0 && self.out_of_order == 0
    }
}

pub trait MarketDataRepository {
    fn load_bars(&self, query: &PriceQuery) -> Result<(Vec<PriceBar>, DataQualityReport), String>;
}
