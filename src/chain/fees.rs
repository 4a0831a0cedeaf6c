//! Fee rates handed to the node, in sat/vB.
//!
//! Rates are refreshed from the backend's `estimate_fee` (BTC/kB) and cached
//! in atomics. A failed or non-positive estimate keeps the cached rate, which
//! starts at the defaults.

use super::ChainBackend;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

const URGENT_TARGET: u32 = 1;
const NORMAL_TARGET: u32 = 6;
const BACKGROUND_TARGET: u32 = 24;

/// BTC/kB → sat/vB
const BTC_PER_KB_TO_SAT_PER_VB: f64 = 100_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimates {
    pub urgent: u32,
    pub normal: u32,
    pub background: u32,
    pub minimum: u32,
}

impl Default for FeeEstimates {
    fn default() -> Self {
        Self { urgent: 20, normal: 10, background: 5, minimum: 1 }
    }
}

impl FeeEstimates {
    /// sat/kw as LDK-style estimators expect (1 vB = 4 wu).
    pub fn to_sat_per_kw(rate_sat_vb: u32) -> u32 { rate_sat_vb.saturating_mul(250) }

    fn clamped(mut self) -> Self {
        self.minimum = self.minimum.max(1);
        self.background = self.background.max(self.minimum);
        self.normal = self.normal.max(self.minimum);
        self.urgent = self.urgent.max(self.minimum);
        self
    }
}

pub struct FeeCache {
    urgent: AtomicU32,
    normal: AtomicU32,
    background: AtomicU32,
    minimum: AtomicU32,
}

impl Default for FeeCache {
    fn default() -> Self {
        let d = FeeEstimates::default();
        Self {
            urgent: AtomicU32::new(d.urgent),
            normal: AtomicU32::new(d.normal),
            background: AtomicU32::new(d.background),
            minimum: AtomicU32::new(d.minimum),
        }
    }
}

impl FeeCache {
    pub fn current(&self) -> FeeEstimates {
        FeeEstimates {
            urgent: self.urgent.load(Ordering::Acquire),
            normal: self.normal.load(Ordering::Acquire),
            background: self.background.load(Ordering::Acquire),
            minimum: self.minimum.load(Ordering::Acquire),
        }
    }

    pub async fn refresh(&self, backend: &dyn ChainBackend) -> FeeEstimates {
        for (target, slot) in [
            (URGENT_TARGET, &self.urgent),
            (NORMAL_TARGET, &self.normal),
            (BACKGROUND_TARGET, &self.background),
        ] {
            match backend.estimate_fee(target).await {
                Ok(btc_per_kb) if btc_per_kb > 0.0 => {
                    let sat_vb = (btc_per_kb * BTC_PER_KB_TO_SAT_PER_VB).round() as u32;
                    slot.store(sat_vb, Ordering::Release);
                }
                Ok(rate) => debug!(target, rate, "backend has no fee estimate, keeping cached"),
                Err(e) => debug!(target, error = %e, "fee estimate failed, keeping cached"),
            }
        }
        self.current().clamped()
    }
}
