/// Usage cost calculation from a per-token price table.
use crate::model::Costs;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// No price entry for this provider/model pair.
    UnknownModel {
        provider: Option<String>,
        model: Option<String>,
    },
    /// Neither input nor output token counts are known.
    MissingUsage,
    /// Pricing is disabled.
    Unavailable,
}

impl std::fmt::Display for PriceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceError::UnknownModel { provider, model } => write!(
                f,
                "no price for provider={} model={}",
                provider.as_deref().unwrap_or("?"),
                model.as_deref().unwrap_or("?")
            ),
            PriceError::MissingUsage => write!(f, "token usage unknown"),
            PriceError::Unavailable => write!(f, "pricing unavailable"),
        }
    }
}

impl std::error::Error for PriceError {}

/// Computes input/output cost for a run.
pub trait Pricer {
    fn price(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
        input_tokens: Option<u64>,
        output_tokens: Option<u64>,
    ) -> Result<Costs, PriceError>;
}

/// Per-token USD rates for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub input_per_token: Decimal,
    pub output_per_token: Decimal,
}

/// A `[[pricing.models]]` config entry. Rates are decimal strings so they
/// never pass through a float.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceEntry {
    pub provider: String,
    pub model: String,
    pub input_per_token: String,
    pub output_per_token: String,
}

const BUILTIN_RATES: &[(&str, &str, &str, &str)] = &[
    ("openai", "gpt-4o-mini", "0.00000015", "0.0000006"),
    ("openai", "gpt-4o", "0.0000005", "0.0000015"),
    ("anthropic", "claude-3-5-sonnet", "0.0000008", "0.0000024"),
    ("google", "gemini-1.5-pro", "0.0000005", "0.0000015"),
];

/// Static price table keyed by (provider, model).
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    rates: HashMap<(String, String), Rate>,
}

impl PriceTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table seeded with the built-in rates.
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        for (provider, model, input, output) in BUILTIN_RATES {
            if let (Ok(i), Ok(o)) = (Decimal::from_str(input), Decimal::from_str(output)) {
                table.insert(provider, model, Rate {
                    input_per_token: i,
                    output_per_token: o,
                });
            }
        }
        table
    }

    /// Built-in rates extended and overridden by config entries. Entries with
    /// unparseable rates are skipped with a warning.
    pub fn with_entries(entries: &[PriceEntry]) -> Self {
        let mut table = Self::builtin();
        for entry in entries {
            match (
                Decimal::from_str(entry.input_per_token.trim()),
                Decimal::from_str(entry.output_per_token.trim()),
            ) {
                (Ok(i), Ok(o)) => table.insert(&entry.provider, &entry.model, Rate {
                    input_per_token: i,
                    output_per_token: o,
                }),
                _ => tracing::warn!(
                    provider = %entry.provider,
                    model = %entry.model,
                    "ignoring price entry with invalid rate"
                ),
            }
        }
        table
    }

    pub fn insert(&mut self, provider: &str, model: &str, rate: Rate) {
        self.rates
            .insert((provider.to_string(), model.to_string()), rate);
    }

    /// All (provider, model) pairs, sorted.
    pub fn models(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.rates.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn rate(&self, provider: Option<&str>, model: Option<&str>) -> Option<Rate> {
        let model = model?;
        if let Some(provider) = provider {
            if let Some(rate) = self.rates.get(&(provider.to_string(), model.to_string())) {
                return Some(*rate);
            }
        }
        // Unknown or unmatched provider: accept a model name that is unique
        // across providers.
        let mut matches = self.rates.iter().filter(|((_, m), _)| m == model);
        match (matches.next(), matches.next()) {
            (Some((_, rate)), None) => Some(*rate),
            _ => None,
        }
    }
}

impl Pricer for PriceTable {
    fn price(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
        input_tokens: Option<u64>,
        output_tokens: Option<u64>,
    ) -> Result<Costs, PriceError> {
        if input_tokens.is_none() && output_tokens.is_none() {
            return Err(PriceError::MissingUsage);
        }
        let rate = self
            .rate(provider, model)
            .ok_or_else(|| PriceError::UnknownModel {
                provider: provider.map(str::to_string),
                model: model.map(str::to_string),
            })?;

        let input = Decimal::from(input_tokens.unwrap_or(0)) * rate.input_per_token;
        let output = Decimal::from(output_tokens.unwrap_or(0)) * rate.output_per_token;
        Ok(Costs {
            input: input.normalize(),
            output: output.normalize(),
        })
    }
}

/// Pricer used when no table is configured; every record keeps null costs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPricing;

impl Pricer for NoPricing {
    fn price(
        &self,
        _provider: Option<&str>,
        _model: Option<&str>,
        _input_tokens: Option<u64>,
        _output_tokens: Option<u64>,
    ) -> Result<Costs, PriceError> {
        Err(PriceError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn gpt_4o_mini_scenario() {
        let costs = PriceTable::builtin()
            .price(Some("openai"), Some("gpt-4o-mini"), Some(1000), Some(200))
            .unwrap();
        assert_eq!(costs.input, dec("0.00015"));
        assert_eq!(costs.output, dec("0.00012"));
        assert_eq!(costs.total(), dec("0.00027"));
    }

    #[test]
    fn one_missing_count_prices_as_zero() {
        let costs = PriceTable::builtin()
            .price(Some("openai"), Some("gpt-4o"), Some(2000), None)
            .unwrap();
        assert_eq!(costs.input, dec("0.001"));
        assert_eq!(costs.output, Decimal::ZERO);
    }

    #[test]
    fn both_counts_missing_is_an_error() {
        let result = PriceTable::builtin().price(Some("openai"), Some("gpt-4o"), None, None);
        assert_eq!(result, Err(PriceError::MissingUsage));
    }

    #[test]
    fn unknown_model_is_an_error() {
        let result = PriceTable::builtin().price(Some("openai"), Some("gpt-9"), Some(1), Some(1));
        assert!(matches!(result, Err(PriceError::UnknownModel { .. })));
    }

    #[test]
    fn model_only_lookup_when_provider_missing() {
        let table = PriceTable::builtin();
        assert!(table.rate(None, Some("claude-3-5-sonnet")).is_some());
        assert!(table.rate(None, None).is_none());
    }

    #[test]
    fn ambiguous_model_only_lookup_fails() {
        let mut table = PriceTable::builtin();
        table.insert("azure", "gpt-4o", Rate {
            input_per_token: dec("0.000001"),
            output_per_token: dec("0.000002"),
        });
        assert!(table.rate(None, Some("gpt-4o")).is_none());
        assert!(table.rate(Some("azure"), Some("gpt-4o")).is_some());
    }

    #[test]
    fn config_entries_override_builtin() {
        let table = PriceTable::with_entries(&[
            PriceEntry {
                provider: "openai".into(),
                model: "gpt-4o-mini".into(),
                input_per_token: "0.000001".into(),
                output_per_token: "0.000002".into(),
            },
            PriceEntry {
                provider: "local".into(),
                model: "bad".into(),
                input_per_token: "abc".into(),
                output_per_token: "0".into(),
            },
        ]);
        let rate = table.rate(Some("openai"), Some("gpt-4o-mini")).unwrap();
        assert_eq!(rate.input_per_token, dec("0.000001"));
        assert!(table.rate(Some("local"), Some("bad")).is_none());
    }

    #[test]
    fn no_pricing_always_unavailable() {
        assert_eq!(
            NoPricing.price(Some("openai"), Some("gpt-4o"), Some(1), Some(1)),
            Err(PriceError::Unavailable)
        );
    }
}
