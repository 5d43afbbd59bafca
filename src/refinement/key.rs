use std::collections::BTreeMap;

use crate::scene::model::{FeatureId, OptionId, ScanId};

const XXH32_SEED: u32 = 0;

/// Content key of one refinement request.
///
/// Equal inputs always produce equal keys; distinct inputs may collide.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct RefinementKey(u32);

impl RefinementKey {
    /// Wrap a raw hash value.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw hash value.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for RefinementKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Everything a refinement depends on.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RefinementInputs {
    /// Scan being previewed.
    pub scan_id: Option<ScanId>,
    /// Selected option per feature.
    pub selections: BTreeMap<FeatureId, OptionId>,
    /// Free-form extra parameters.
    pub extras: serde_json::Map<String, serde_json::Value>,
    /// User-authored instruction text.
    pub user_prompt: String,
    /// Variation counter; bump to ask for a different take.
    pub variant: u32,
}

impl RefinementInputs {
    /// Key derived from the canonical JSON form of the inputs.
    pub fn key(&self) -> RefinementKey {
        let value = serde_json::json!({
            "scanId": self.scan_id.as_ref().map(ScanId::as_str),
            "selections": self.selections,
            "extras": self.extras,
            "userPrompt": self.user_prompt,
            "variant": self.variant,
        });
        key_for_value(&value)
    }
}

/// Hash the canonical text of `value`.
pub fn key_for_value(value: &serde_json::Value) -> RefinementKey {
    let text = canonical_json(value);
    RefinementKey(xxhash_rust::xxh32::xxh32(text.as_bytes(), XXH32_SEED))
}

/// Serialize `value` with object keys sorted recursively; array order is kept.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &serde_json::Value) {
    match value {
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(out, &map[k]);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/refinement/key.rs"]
mod tests;
