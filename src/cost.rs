//! Cost estimation from token counts.
//!
//! Rates are per 1,000,000 tokens and cover a small closed set of models.
//! Unknown identifiers are billed at the `gemini-2.5-flash` rate so custom or
//! misspelled model names never block a run.

/// Per-1M-token rates for one model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rate {
    pub input: f64,
    pub output: f64,
}

/// The `gemini-2.5-flash` rate; applies to any identifier missing from [`RATES`].
pub const DEFAULT_RATE: Rate = Rate {
    input: 0.10,
    output: 0.40,
};

/// `(model, rate)` pairs.
pub const RATES: &[(&str, Rate)] = &[
    ("gemini-2.5-flash", DEFAULT_RATE),
    ("gemini-2.5-pro", Rate { input: 2.50, output: 10.00 }),
    ("gpt-4o", Rate { input: 5.00, output: 15.00 }),
    ("claude-3.5-sonnet", Rate { input: 3.00, output: 15.00 }),
];

/// Look up the rate for `model`, falling back to the default tier.
pub fn rate_for(model: &str) -> Rate {
    RATES
        .iter()
        .find(|(id, _)| *id == model)
        .map(|(_, rate)| *rate)
        .unwrap_or(DEFAULT_RATE)
}

/// Estimated monetary cost of one call. Full precision, no rounding.
pub fn estimate(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let rate = rate_for(model);
    (input_tokens as f64 / 1_000_000.0) * rate.input
        + (output_tokens as f64 / 1_000_000.0) * rate.output
}

/// Display form used by the CLI and reports: `$0.00012`.
pub fn format_cost(cost: f64) -> String {
    format!("${:.5}", cost)
}
