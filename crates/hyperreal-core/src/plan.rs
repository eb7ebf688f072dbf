//! Plan Catalog: the ordered, immutable shot list.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, ValidationError};

const DEFAULT_PLAN_JSON: &str = include_str!("../data/default_plan.json");

/// Subject noun used in scene prompts and fallback captions.
pub const DEFAULT_SUBJECT: &str = "woman";

/// One shot of the dataset plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItem {
    pub id: u32,
    /// Camera framing, e.g. "Coffee Shop Candid".
    #[serde(alias = "shot", alias = "shotType")]
    pub shot_type: String,
    pub expression: String,
    pub lighting: String,
    pub outfit: String,
    /// Free-text pose and scene description.
    pub description: String,
}

impl PlanItem {
    /// Text handed to the sketch pass.
    pub fn pose_text(&self) -> String {
        format!(
            "{}, {} expression, {}, body pose: {}",
            self.shot_type, self.expression, self.outfit, self.description
        )
    }

    /// Prompt handed to the synthesizer.
    pub fn scene_prompt(&self, subject: &str) -> String {
        format!(
            "{} of a {}, {} expression, wearing {}, {} lighting. {}",
            self.shot_type, subject, self.expression, self.outfit, self.lighting, self.description
        )
    }

    /// Framing-relevant text used to pick identity references.
    pub fn selection_text(&self) -> String {
        format!("{}, {}", self.shot_type, self.expression)
    }

    /// Caption composed from shot metadata when the remote captioner gives nothing.
    pub fn fallback_caption(&self, trigger_label: &str, subject: &str) -> String {
        format!(
            "{}, {} of a {}, {}, {}, {}, {}",
            trigger_label,
            self.shot_type,
            subject,
            self.description,
            self.expression,
            self.outfit,
            self.lighting
        )
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("shot_type", &self.shot_type),
            ("expression", &self.expression),
            ("lighting", &self.lighting),
            ("outfit", &self.outfit),
            ("description", &self.description),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidPlanItem { id: self.id, field });
            }
        }
        Ok(())
    }
}

/// Ordered list of shots, validated once at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCatalog {
    items: Arc<[PlanItem]>,
}

impl PlanCatalog {
    /// Build a catalog, rejecting items with empty fields or duplicate ids.
    pub fn new(items: Vec<PlanItem>) -> Result<Self, ValidationError> {
        let mut seen = std::collections::HashSet::new();
        for item in &items {
            item.validate()?;
            if !seen.insert(item.id) {
                return Err(ValidationError::DuplicatePlanId(item.id));
            }
        }
        Ok(Self {
            items: items.into(),
        })
    }

    /// The built-in 50-shot plan: structural anchors, lifestyle, edge cases.
    pub fn builtin() -> Self {
        let items: Vec<PlanItem> = serde_json::from_str(DEFAULT_PLAN_JSON)
            .unwrap_or_default();
        Self {
            items: items.into(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ForgeError> {
        let items: Vec<PlanItem> = serde_json::from_str(json)?;
        Ok(Self::new(items)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ForgeError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn get(&self, index: usize) -> Option<&PlanItem> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlanItem> {
        self.items.iter()
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn item(id: u32, description: &str) -> PlanItem {
        PlanItem {
            id,
            shot_type: "Classic Portrait".to_string(),
            expression: "Intense".to_string(),
            lighting: "Rembrandt Studio Light".to_string(),
            outfit: "Black turtleneck".to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_builtin_plan_is_valid() {
        let plan = PlanCatalog::builtin();
        assert_eq!(plan.len(), 50);
        // Re-validate through the checked constructor.
        let checked = PlanCatalog::new(plan.iter().cloned().collect()).unwrap();
        assert_eq!(checked, plan);
        assert_eq!(plan.get(0).unwrap().id, 1);
        assert_eq!(plan.get(49).unwrap().id, 50);
        assert!(plan.get(50).is_none());
    }

    #[test]
    fn test_builtin_plan_opens_with_structural_anchors() {
        let plan = PlanCatalog::builtin();
        assert!(plan.get(0).unwrap().shot_type.contains("Front"));
        assert!(plan.get(1).unwrap().shot_type.contains("Side Profile"));
        assert!(plan.get(2).unwrap().shot_type.contains("Back"));
    }

    #[test]
    fn test_empty_field_rejected() {
        let mut bad = item(3, "desc");
        bad.lighting = "  ".to_string();
        let err = PlanCatalog::new(vec![item(1, "ok"), bad]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidPlanItem {
                id: 3,
                field: "lighting"
            }
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = PlanCatalog::new(vec![item(1, "a"), item(1, "b")]).unwrap_err();
        assert_eq!(err, ValidationError::DuplicatePlanId(1));
    }

    #[test]
    fn test_from_json_accepts_source_field_names() {
        let json = r#"[{"id": 9, "shot": "Boat Ride", "expression": "Windy",
            "lighting": "Open Water Sun", "outfit": "Nautical stripes shirt",
            "description": "Wind messing up hair"}]"#;
        let plan = PlanCatalog::from_json(json).unwrap();
        assert_eq!(plan.get(0).unwrap().shot_type, "Boat Ride");
    }

    #[test]
    fn test_prompt_composition() {
        let it = item(45, "Simple textured background");
        assert_eq!(
            it.pose_text(),
            "Classic Portrait, Intense expression, Black turtleneck, body pose: Simple textured background"
        );
        assert_eq!(
            it.scene_prompt(DEFAULT_SUBJECT),
            "Classic Portrait of a woman, Intense expression, wearing Black turtleneck, Rembrandt Studio Light lighting. Simple textured background"
        );
        assert_eq!(it.selection_text(), "Classic Portrait, Intense");
        assert_eq!(
            it.fallback_caption("lola", DEFAULT_SUBJECT),
            "lola, Classic Portrait of a woman, Simple textured background, Intense, Black turtleneck, Rembrandt Studio Light"
        );
    }
}
