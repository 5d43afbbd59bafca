use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::refinement::key::canonical_json;
use crate::scene::model::{FeatureId, FeatureModule, OptionId, SceneCategory, SceneDescription};

/// Deterministic synthesis instruction for the current selection.
///
/// Modules are listed in their configured order; extras are listed sorted by name. Selections
/// naming unknown features or options are ignored.
pub fn build_instruction(
    scene: &SceneDescription,
    modules: &[FeatureModule],
    selections: &BTreeMap<FeatureId, OptionId>,
    extras: &serde_json::Map<String, serde_json::Value>,
    user_prompt: &str,
    variant: u32,
) -> String {
    let mut out = String::new();
    let place = match serde_name(&scene.subcategory) {
        Some(sub) if sub != "unknown" => sub.replace('_', " "),
        _ => match scene.category {
            SceneCategory::Interior => "room".to_owned(),
            SceneCategory::Exterior => "building exterior".to_owned(),
        },
    };
    let _ = writeln!(
        out,
        "Edit this {place} photo. Keep the camera, geometry and lighting exactly as they are."
    );
    let _ = writeln!(out, "Only change the listed surfaces:");

    let mut changed = 0usize;
    for module in modules {
        let Some(option) = selections.get(&module.id).and_then(|o| module.option(o)) else {
            continue;
        };
        changed += 1;
        let _ = write!(out, "- {}: {}", module.label, option.label);
        let hint = option.render_hint.trim();
        if !hint.is_empty() {
            let _ = write!(out, " ({hint})");
        }
        out.push('\n');
    }
    if changed == 0 {
        let _ = writeln!(out, "- none; return the photo unchanged in content.");
    }

    if !extras.is_empty() {
        let _ = writeln!(out, "Additional parameters:");
        let mut names: Vec<&String> = extras.keys().collect();
        names.sort();
        for name in names {
            let value = match &extras[name] {
                serde_json::Value::String(s) => s.clone(),
                other => canonical_json(other),
            };
            let _ = writeln!(out, "- {name}: {value}");
        }
    }

    let prompt = user_prompt.trim();
    if !prompt.is_empty() {
        let _ = writeln!(out, "User direction: {prompt}");
    }
    if variant > 0 {
        let _ = writeln!(out, "Variation #{variant}.");
    }
    out
}

fn serde_name<T: serde::Serialize>(value: &T) -> Option<String> {
    match serde_json::to_value(value).ok()? {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/refinement/instruction.rs"]
mod tests;
