//! Pipeline policy configuration.
//!
//! An explicit immutable struct handed to the orchestrator. Inner components
//! never read the environment; the serving layer parses env values once
//! through the helpers here and passes the result down.

use std::collections::BTreeMap;

use flowgate_core::Cct;

use crate::classify::CctPolicy;

/// Tunable ingestion policy. Changes to classifier behavior bump
/// `policy_version`, which is stamped on every committed batch.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Minimum accepted/total row ratio; `None` disables the guardrail.
    pub min_accept_ratio: Option<f64>,
    /// Global CCT confidence floor; `0` disables the gate.
    pub min_cct_confidence: f64,
    /// Ambiguity window between differing top-2 CCT buckets.
    pub ambiguity_delta: f64,
    /// Per-bucket threshold overrides.
    pub cct_thresholds: BTreeMap<Cct, f64>,
    /// Dev-only: honor a per-request missing-watermark override.
    pub allow_missing_watermark: bool,
    /// Stamped on every committed batch.
    pub policy_version: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_accept_ratio: Some(0.10),
            min_cct_confidence: 0.70,
            ambiguity_delta: 0.05,
            cct_thresholds: BTreeMap::new(),
            allow_missing_watermark: false,
            policy_version: "cct-policy/v1".to_string(),
        }
    }
}

impl PolicyConfig {
    /// The classifier-facing slice of this policy.
    pub fn cct_policy(&self) -> CctPolicy {
        CctPolicy {
            min_confidence: self.min_cct_confidence,
            ambiguity_delta: self.ambiguity_delta,
            thresholds: self.cct_thresholds.clone(),
        }
    }

    /// Parse a `MIN_ACCEPT_RATIO` value.
    ///
    /// Unset keeps the default; empty/`0`/`0.0`/`none`/`null` disables the
    /// guardrail; an unparseable value falls back to the default.
    pub fn parse_accept_ratio(raw: Option<&str>) -> Option<f64> {
        const DEFAULT: f64 = 0.10;
        let Some(raw) = raw else {
            return Some(DEFAULT);
        };
        let normalized = raw.trim().to_ascii_lowercase();
        if matches!(normalized.as_str(), "" | "0" | "0.0" | "none" | "null") {
            return None;
        }
        Some(normalized.parse().unwrap_or(DEFAULT))
    }

    /// Parse a confidence-style float with empty/`none`/`null` meaning the
    /// default and unparseable values falling back to it.
    pub fn parse_confidence(raw: Option<&str>, default: f64) -> f64 {
        let Some(raw) = raw else {
            return default;
        };
        let normalized = raw.trim().to_ascii_lowercase();
        if matches!(normalized.as_str(), "" | "none" | "null") {
            return default;
        }
        normalized.parse().unwrap_or(default)
    }

    /// Parse `CCT_THRESHOLDS_JSON`: a JSON object mapping bucket names to
    /// thresholds. Malformed input or unknown buckets are ignored.
    pub fn parse_threshold_overrides(raw: Option<&str>) -> BTreeMap<Cct, f64> {
        let mut overrides = BTreeMap::new();
        let Some(raw) = raw else {
            return overrides;
        };
        let Ok(serde_json::Value::Object(map)) =
            serde_json::from_str::<serde_json::Value>(raw.trim())
        else {
            return overrides;
        };
        for (key, value) in map {
            if let (Some(cct), Some(threshold)) =
                (Cct::parse(&key.to_ascii_uppercase()), value.as_f64())
            {
                overrides.insert(cct, threshold);
            }
        }
        overrides
    }

    /// Lenient boolean env parse (`1`, `true`, `yes`, `y`).
    pub fn parse_flag(raw: Option<&str>) -> bool {
        raw.map(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "y"
            )
        })
        .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_ratio_default_and_disable() {
        assert_eq!(PolicyConfig::parse_accept_ratio(None), Some(0.10));
        assert_eq!(PolicyConfig::parse_accept_ratio(Some("0.25")), Some(0.25));
        for disabled in ["", "0", "0.0", "none", "NULL"] {
            assert_eq!(PolicyConfig::parse_accept_ratio(Some(disabled)), None);
        }
        // Misconfigured value falls back to the default
        assert_eq!(PolicyConfig::parse_accept_ratio(Some("lots")), Some(0.10));
    }

    #[test]
    fn test_confidence_parse() {
        assert_eq!(PolicyConfig::parse_confidence(None, 0.70), 0.70);
        assert_eq!(PolicyConfig::parse_confidence(Some("0.9"), 0.70), 0.9);
        assert_eq!(PolicyConfig::parse_confidence(Some("0"), 0.70), 0.0);
        assert_eq!(PolicyConfig::parse_confidence(Some("none"), 0.70), 0.70);
        assert_eq!(PolicyConfig::parse_confidence(Some("junk"), 0.70), 0.70);
    }

    #[test]
    fn test_threshold_overrides() {
        let parsed = PolicyConfig::parse_threshold_overrides(Some(
            r#"{"free": 0.8, "PASS_THROUGH": 0.9, "bogus": 0.5}"#,
        ));
        assert_eq!(parsed.get(&Cct::Free), Some(&0.8));
        assert_eq!(parsed.get(&Cct::PassThrough), Some(&0.9));
        assert_eq!(parsed.len(), 2);

        assert!(PolicyConfig::parse_threshold_overrides(Some("not json")).is_empty());
        assert!(PolicyConfig::parse_threshold_overrides(None).is_empty());
    }

    #[test]
    fn test_parse_flag() {
        assert!(PolicyConfig::parse_flag(Some("1")));
        assert!(PolicyConfig::parse_flag(Some("TRUE")));
        assert!(!PolicyConfig::parse_flag(Some("0")));
        assert!(!PolicyConfig::parse_flag(None));
    }
}
