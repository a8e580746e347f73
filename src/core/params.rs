use serde_json::Value;
use std::collections::HashMap;

/// Open mapping of generation option name to value.
pub type Parameters = HashMap<String, Value>;

/// Options that only mean something while sampling is enabled.
pub const SAMPLING_ONLY: [&str; 2] = ["temperature", "top_p"];

/// Merges `overrides` over `defaults`, then removes every `unsupported` key.
///
/// A `null` override counts as "not provided" and keeps the default. When
/// the merged set disables sampling (`do_sample: false`) the sampling-only
/// options are dropped as well, so every backend sees the same thing.
pub fn normalize<'a, I>(defaults: &Parameters, overrides: &Parameters, unsupported: I) -> Parameters
where
    I: IntoIterator<Item = &'a str>,
{
    let mut merged = defaults.clone();

    for (key, value) in overrides {
        if !value.is_null() {
            merged.insert(key.clone(), value.clone());
        }
    }

    for key in unsupported {
        merged.remove(key);
    }

    if sampling_disabled(&merged) {
        for key in SAMPLING_ONLY {
            merged.remove(key);
        }
    }

    merged
}

fn sampling_disabled(params: &Parameters) -> bool {
    matches!(params.get("do_sample"), Some(Value::Bool(false)))
}

/// Builds a parameter map from literal pairs.
pub fn parameters<K, I>(pairs: I) -> Parameters
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Reads a numeric option as `usize`, accepting integral floats.
pub fn as_usize(value: &Value) -> Option<usize> {
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        })
        .map(|n| n as usize)
}
