// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Temperature sweep expansion.
//!
//! Each variation step `k` adds the pair `T × (1 + 0.25k)` and
//! `T × (1 − 0.25k)`. Values are rounded to three decimals, deduplicated and
//! sorted; anything above `1.0` is dropped. Negative values are kept.

use crate::scenario::Scenario;
use std::collections::BTreeSet;

const STEP: f64 = 0.25;
const MAX_TEMPERATURE_MILLIS: i64 = 1000;

/// Temperatures produced by sweeping `variations` steps around `base`.
pub fn expand_temperatures(base: f64, variations: u32) -> Vec<f64> {
    // Keyed by thousandths so rounding and dedup happen on integers.
    let mut millis = BTreeSet::new();
    for k in 0..=variations {
        let delta = STEP * f64::from(k);
        for factor in [1.0 + delta, 1.0 - delta] {
            millis.insert((base * factor * 1000.0).round() as i64);
        }
    }

    millis
        .into_iter()
        .filter(|m| *m <= MAX_TEMPERATURE_MILLIS)
        .map(|m| m as f64 / 1000.0)
        .collect()
}

/// Clone every scenario once per retained temperature of its own base
/// temperature. Order follows the input, then ascending temperature.
pub fn expand_scenarios(scenarios: &[Scenario], variations: u32) -> Vec<Scenario> {
    scenarios
        .iter()
        .flat_map(|scenario| {
            expand_temperatures(scenario.temperature, variations)
                .into_iter()
                .map(move |t| scenario.with_temperature(t))
        })
        .collect()
}
