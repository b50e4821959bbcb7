// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Token cost math shared by providers and judges.

/// Cost in USD of a call priced per 1000 tokens.
pub fn token_cost(
    input_tokens: u64,
    output_tokens: u64,
    input_cost_per_1k: f64,
    output_cost_per_1k: f64,
) -> f64 {
    input_tokens as f64 * (input_cost_per_1k / 1000.0)
        + output_tokens as f64 * (output_cost_per_1k / 1000.0)
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_cost() {
        let cost = token_cost(1000, 500, 0.003, 0.015);
        assert!((cost - 0.0105).abs() < 1e-12);
        assert_eq!(token_cost(0, 0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 4), 1.2346);
        assert_eq!(round_to(0.875, 2), 0.88);
        assert_eq!(round_to(3.0, 2), 3.0);
    }
}
