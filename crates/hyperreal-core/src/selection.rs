//! Reference selection: which identity images go to the synthesizer, and how.
//!
//! Scene text is classified by an ordered rule list (first match wins). Each
//! rule names the slots it wants and the slots it forbids. Forbidden slots are
//! honoured for every rule whose keywords appear in the text, not only the
//! winning one, so a scene that mentions both "side" and "behind" still never
//! receives a front-facing reference.
//!
//! Selection is a pure function of `(ReferenceSet, scene text)`.

use hyperreal_remote::{IdentityFocus, IdentityReference};
use serde::{Deserialize, Serialize};

use crate::reference::{ReferenceSet, ReferenceSlot};
use crate::transform;

use crate::reference::ReferenceSlot as S;
use self::Transform::{Crop, Full};

/// How a reference image is prepared before submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Central face crop; strips the reference's own pose and framing.
    Crop,
    /// Untouched; keeps geometry for angle-matched references.
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionEntry {
    pub slot: ReferenceSlot,
    pub transform: Transform,
}

impl SelectionEntry {
    pub const fn new(slot: ReferenceSlot, transform: Transform) -> Self {
        Self { slot, transform }
    }

    /// Label shown to the synthesizer in its image map.
    pub fn label(&self) -> String {
        match self.transform {
            Transform::Crop => format!("{} (center crop)", self.slot.description()),
            Transform::Full => self.slot.description().to_string(),
        }
    }
}

/// Scene category decided by the rule list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneCategory {
    Profile,
    BackView,
    Expression,
    Default,
}

impl SceneCategory {
    pub fn identity_focus(&self) -> IdentityFocus {
        match self {
            SceneCategory::Profile => IdentityFocus::Profile,
            SceneCategory::BackView => IdentityFocus::BackView,
            SceneCategory::Expression => IdentityFocus::Expression,
            SceneCategory::Default => IdentityFocus::Front,
        }
    }
}

impl std::fmt::Display for SceneCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SceneCategory::Profile => "profile",
            SceneCategory::BackView => "back_view",
            SceneCategory::Expression => "expression",
            SceneCategory::Default => "default",
        };
        f.write_str(s)
    }
}

/// Slots a matching rule forbids from the final plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exclusion {
    None,
    /// `front` must not be sent uncropped.
    FullFront,
    /// No slot that shows the face head-on.
    FrontFacing,
}

impl Exclusion {
    fn forbids(&self, entry: &SelectionEntry) -> bool {
        match self {
            Exclusion::None => false,
            Exclusion::FullFront => {
                entry.slot == ReferenceSlot::Front && entry.transform == Transform::Full
            }
            Exclusion::FrontFacing => entry.slot.is_front_facing(),
        }
    }
}

/// How a rule picks its slots.
#[derive(Debug, Clone, Copy)]
enum Pick {
    /// Every listed slot that is populated.
    All(&'static [SelectionEntry]),
    /// The first listed slot that is populated.
    FirstOf(&'static [SelectionEntry]),
}

struct Rule {
    category: SceneCategory,
    keywords: &'static [&'static str],
    pick: Pick,
    exclusion: Exclusion,
}

impl Rule {
    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k))
    }

    fn pick(&self, references: &ReferenceSet) -> Vec<SelectionEntry> {
        let present = |e: &&SelectionEntry| references.contains(e.slot);
        match self.pick {
            Pick::All(entries) => entries.iter().filter(present).copied().collect(),
            Pick::FirstOf(entries) => entries.iter().find(present).copied().into_iter().collect(),
        }
    }
}

/// Priority-ordered classification rules.
const RULES: &[Rule] = &[
    Rule {
        category: SceneCategory::Profile,
        keywords: &["side", "profile", "90"],
        pick: Pick::FirstOf(&[
            SelectionEntry::new(S::Side90, Full),
            SelectionEntry::new(S::Side, Full),
        ]),
        exclusion: Exclusion::FullFront,
    },
    Rule {
        category: SceneCategory::BackView,
        keywords: &["back", "behind"],
        pick: Pick::All(&[
            SelectionEntry::new(S::ThreeQuarter, Full),
            SelectionEntry::new(S::Side, Full),
        ]),
        exclusion: Exclusion::FrontFacing,
    },
    Rule {
        category: SceneCategory::Expression,
        keywords: &["smile", "laugh", "happy"],
        pick: Pick::All(&[
            SelectionEntry::new(S::Expression, Crop),
            SelectionEntry::new(S::Front, Crop),
        ]),
        exclusion: Exclusion::None,
    },
];

const DEFAULT_RULE: Rule = Rule {
    category: SceneCategory::Default,
    keywords: &[],
    pick: Pick::All(&[
        SelectionEntry::new(S::Front, Crop),
        SelectionEntry::new(S::ThreeQuarter, Full),
    ]),
    exclusion: Exclusion::None,
};

const FALLBACK: SelectionEntry = SelectionEntry::new(S::Front, Crop);

/// Ordered `(slot, transform)` list for one shot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPlan {
    pub category: SceneCategory,
    pub entries: Vec<SelectionEntry>,
}

impl SelectionPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SelectionEntry> {
        self.entries.iter()
    }

    pub fn contains(&self, slot: ReferenceSlot) -> bool {
        self.entries.iter().any(|e| e.slot == slot)
    }

    pub fn transform_of(&self, slot: ReferenceSlot) -> Option<Transform> {
        self.entries
            .iter()
            .find(|e| e.slot == slot)
            .map(|e| e.transform)
    }

    pub fn identity_focus(&self) -> IdentityFocus {
        self.category.identity_focus()
    }

    /// Resolve entries against `references`, cropping where requested.
    ///
    /// Decoding work happens here; run it off the async executor.
    pub fn materialize(&self, references: &ReferenceSet) -> Vec<IdentityReference> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let image = references.get(entry.slot)?;
                let payload = match entry.transform {
                    Transform::Crop => transform::crop(image),
                    Transform::Full => image.clone(),
                };
                Some(IdentityReference {
                    label: entry.label(),
                    payload,
                })
            })
            .collect()
    }
}

/// Classify scene text into exactly one category.
pub fn classify(scene_text: &str) -> SceneCategory {
    let lowered = scene_text.to_lowercase();
    RULES
        .iter()
        .find(|r| r.matches(&lowered))
        .map(|r| r.category)
        .unwrap_or(SceneCategory::Default)
}

/// Choose the identity references for a scene.
pub fn select(references: &ReferenceSet, scene_text: &str) -> SelectionPlan {
    let lowered = scene_text.to_lowercase();
    let matched: Vec<&Rule> = RULES.iter().filter(|r| r.matches(&lowered)).collect();
    let forbidden = |entry: &SelectionEntry| matched.iter().any(|r| r.exclusion.forbids(entry));

    let rule = matched.first().copied().unwrap_or(&DEFAULT_RULE);
    let mut entries = rule.pick(references);
    entries.retain(|e| !forbidden(e));

    if entries.is_empty() && references.has_front() && !forbidden(&FALLBACK) {
        entries.push(FALLBACK);
    }

    entries.extend(
        references
            .products()
            .map(|slot| SelectionEntry::new(slot, Full)),
    );

    SelectionPlan {
        category: rule.category,
        entries,
    }
}
