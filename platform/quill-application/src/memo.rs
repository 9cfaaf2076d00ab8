use crate::shared::to_hex_short;
use quill_domain::entities::config::BacktestConfig;
use quill_domain::errors::BacktestError;
use quill_domain::services::engine::{EngineBackend, EngineOutput};
use quill_domain::services::strategy::Strategy;
use quill_domain::value_objects::bar::PriceBar;
use quill_domain::value_objects::signal::Signal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// SHA-256 over the canonical JSON of everything that determines an engine
/// result. Equal fingerprints mean bit-identical outputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunFingerprint(String);

impl RunFingerprint {
    pub fn compute(
        bars: &[PriceBar],
        signals: &[Signal],
        config: &BacktestConfig,
        engine: EngineBackend,
        strategy: &dyn Strategy,
    ) -> Result<Self, String> {
        let mut hasher = Sha256::new();
        hash_part(&mut hasher, "bars", &bars)?;
        hash_part(&mut hasher, "signals", &signals)?;
        hash_part(&mut hasher, "config", config)?;
        hash_part(&mut hasher, "engine", &engine)?;
        hash_part(&mut hasher, "strategy", &strategy.name())?;
        hash_part(&mut hasher, "params", &strategy.params(config))?;
        let bytes = hasher.finalize();
        Ok(Self(to_hex_short(&bytes[..], 64)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for RunFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hash_part<T: Serialize + ?Sized>(hasher: &mut Sha256, label: &str, value: &T) -> Result<(), String> {
    let canonical = serde_json::to_vec(value)
        .map_err(|err| format!("failed to fingerprint {label}: {err}"))?;
    hasher.update(label.as_bytes());
    hasher.update(b"\n");
    hasher.update(&canonical);
    hasher.update(b"\n");
    Ok(())
}

/// Engine outputs keyed by fingerprint, shared by every worker of a sweep.
/// Failed and cancelled runs are never stored.
#[derive(Debug, Default)]
pub struct RunCache {
    entries: Mutex<HashMap<RunFingerprint, Arc<EngineOutput>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &RunFingerprint) -> Option<Arc<EngineOutput>> {
        self.lock().get(fingerprint).cloned()
    }

    /// Returns the cached output (and `true`) or runs `compute` outside the lock
    /// and stores its result. Concurrent misses on one fingerprint may each
    /// compute; the first stored output is kept and returned to both.
    pub fn get_or_run<F>(
        &self,
        fingerprint: &RunFingerprint,
        compute: F,
    ) -> Result<(Arc<EngineOutput>, bool), BacktestError>
    where
        F: FnOnce() -> Result<EngineOutput, BacktestError>,
    {
        if let Some(hit) = self.get(fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((hit, true));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let output = Arc::new(compute()?);
        let stored = self
            .lock()
            .entry(fingerprint.clone())
            .or_insert(output)
            .clone();
        Ok((stored, false))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RunFingerprint, Arc<EngineOutput>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
