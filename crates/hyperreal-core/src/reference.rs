//! Identity reference slots and the caller-owned reference set.

use std::collections::BTreeMap;
use std::path::Path;

use hyperreal_remote::ImagePayload;
use serde::{Deserialize, Serialize};

use crate::error::ForgeError;

/// Fixed enumeration of reference slots.
///
/// Declaration order is the canonical submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceSlot {
    Front,
    Side,
    ThreeQuarter,
    Expression,
    Side90,
    Product1,
    Product2,
    Product3,
    Product4,
}

impl ReferenceSlot {
    pub const ALL: [ReferenceSlot; 9] = [
        ReferenceSlot::Front,
        ReferenceSlot::Side,
        ReferenceSlot::ThreeQuarter,
        ReferenceSlot::Expression,
        ReferenceSlot::Side90,
        ReferenceSlot::Product1,
        ReferenceSlot::Product2,
        ReferenceSlot::Product3,
        ReferenceSlot::Product4,
    ];

    pub const PRODUCTS: [ReferenceSlot; 4] = [
        ReferenceSlot::Product1,
        ReferenceSlot::Product2,
        ReferenceSlot::Product3,
        ReferenceSlot::Product4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceSlot::Front => "front",
            ReferenceSlot::Side => "side",
            ReferenceSlot::ThreeQuarter => "threeQuarter",
            ReferenceSlot::Expression => "expression",
            ReferenceSlot::Side90 => "side90",
            ReferenceSlot::Product1 => "product1",
            ReferenceSlot::Product2 => "product2",
            ReferenceSlot::Product3 => "product3",
            ReferenceSlot::Product4 => "product4",
        }
    }

    /// Role of the slot in the synthesizer's image map.
    pub fn description(&self) -> &'static str {
        match self {
            ReferenceSlot::Front => "FRONT VIEW - PRIMARY LIKENESS",
            ReferenceSlot::Side => "SIDE PROFILE - NOSE/JAW STRUCTURE",
            ReferenceSlot::ThreeQuarter => "3/4 ANGLE - DEPTH",
            ReferenceSlot::Expression => "EXPRESSION REF - SMILE/TEETH",
            ReferenceSlot::Side90 => "90 DEGREE SIDE PROFILE - STRICT STRUCTURE",
            ReferenceSlot::Product1
            | ReferenceSlot::Product2
            | ReferenceSlot::Product3
            | ReferenceSlot::Product4 => "PRODUCT / GARMENT - REPRODUCE EXACTLY",
        }
    }

    pub fn is_product(&self) -> bool {
        Self::PRODUCTS.contains(self)
    }

    /// Slots that show the face from the front.
    pub fn is_front_facing(&self) -> bool {
        matches!(self, ReferenceSlot::Front | ReferenceSlot::Expression)
    }
}

impl std::fmt::Display for ReferenceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReferenceSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace(['-', '_'], "").to_ascii_lowercase();
        ReferenceSlot::ALL
            .into_iter()
            .find(|slot| slot.as_str().to_ascii_lowercase() == wanted)
            .ok_or_else(|| format!("unknown reference slot '{s}'"))
    }
}

/// Slot -> image mapping supplied by the caller. The pipeline only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    images: BTreeMap<ReferenceSlot, ImagePayload>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, slot: ReferenceSlot, image: ImagePayload) -> Self {
        self.insert(slot, image);
        self
    }

    pub fn insert(&mut self, slot: ReferenceSlot, image: ImagePayload) {
        self.images.insert(slot, image);
    }

    pub fn remove(&mut self, slot: ReferenceSlot) -> Option<ImagePayload> {
        self.images.remove(&slot)
    }

    /// Load an image file into `slot`; the MIME type comes from the extension.
    pub fn load_file(&mut self, slot: ReferenceSlot, path: &Path) -> Result<(), ForgeError> {
        let format = image::ImageFormat::from_path(path)
            .map_err(|e| ForgeError::Image(format!("{}: {e}", path.display())))?;
        let bytes = std::fs::read(path)?;
        self.insert(slot, ImagePayload::new(format.to_mime_type(), bytes));
        Ok(())
    }

    pub fn get(&self, slot: ReferenceSlot) -> Option<&ImagePayload> {
        self.images.get(&slot)
    }

    pub fn contains(&self, slot: ReferenceSlot) -> bool {
        self.images.contains_key(&slot)
    }

    /// The minimum a run needs.
    pub fn has_front(&self) -> bool {
        self.contains(ReferenceSlot::Front)
    }

    /// Populated product slots in slot order.
    pub fn products(&self) -> impl Iterator<Item = ReferenceSlot> + '_ {
        ReferenceSlot::PRODUCTS
            .into_iter()
            .filter(|slot| self.contains(*slot))
    }

    /// Populated slots in slot order.
    pub fn slots(&self) -> impl Iterator<Item = ReferenceSlot> + '_ {
        self.images.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
