//! Built-in tracking vocabulary
//!
//! Each tracking mode has a fixed, ordered list of input keys: position,
//! head rotation and eyes first, then blend shapes alphabetically. The same
//! lists seed the default 1:1 mapping set and define where each output key
//! lands in the mode's array channel.
//!
//! Two vocabularies exist for perfect sync. The compact one is chosen at
//! build time with the `compact-catalog` feature or at runtime through
//! configuration; nothing else branches on it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::channel::ArrayChannel;
use crate::error::BridgeError;
use crate::mapping::{InputKey, TrackingKey, TrackingMappingEntry};

/// Built-in key names
pub mod keys {
    pub const POS_X: &str = "_posX";
    pub const POS_Y: &str = "_posY";
    pub const POS_Z: &str = "_posZ";
    pub const HEAD_X: &str = "_headX";
    pub const HEAD_Y: &str = "_headY";
    pub const HEAD_Z: &str = "_headZ";
    pub const EYE_X: &str = "_eyeX";
    pub const EYE_Y: &str = "_eyeY";
    pub const BLINK_L: &str = "_blinkL";
    pub const BLINK_R: &str = "_blinkR";
    pub const MOUTH: &str = "_mouth";

    /// ARKit face blend shapes, alphabetical
    pub const ARKIT: [&str; 52] = [
        "browDownLeft",
        "browDownRight",
        "browInnerUp",
        "browOuterUpLeft",
        "browOuterUpRight",
        "cheekPuff",
        "cheekSquintLeft",
        "cheekSquintRight",
        "eyeBlinkLeft",
        "eyeBlinkRight",
        "eyeLookDownLeft",
        "eyeLookDownRight",
        "eyeLookInLeft",
        "eyeLookInRight",
        "eyeLookOutLeft",
        "eyeLookOutRight",
        "eyeLookUpLeft",
        "eyeLookUpRight",
        "eyeSquintLeft",
        "eyeSquintRight",
        "eyeWideLeft",
        "eyeWideRight",
        "jawForward",
        "jawLeft",
        "jawOpen",
        "jawRight",
        "mouthClose",
        "mouthDimpleLeft",
        "mouthDimpleRight",
        "mouthFrownLeft",
        "mouthFrownRight",
        "mouthFunnel",
        "mouthLeft",
        "mouthLowerDownLeft",
        "mouthLowerDownRight",
        "mouthPressLeft",
        "mouthPressRight",
        "mouthPucker",
        "mouthRight",
        "mouthRollLower",
        "mouthRollUpper",
        "mouthShrugLower",
        "mouthShrugUpper",
        "mouthSmileLeft",
        "mouthSmileRight",
        "mouthStretchLeft",
        "mouthStretchRight",
        "mouthUpperUpLeft",
        "mouthUpperUpRight",
        "noseSneerLeft",
        "noseSneerRight",
        "tongueOut",
    ];

    /// Subset of [`ARKIT`] used by the compact vocabulary, alphabetical
    pub const ARKIT_COMPACT: [&str; 21] = [
        "browDownLeft",
        "browDownRight",
        "browInnerUp",
        "browOuterUpLeft",
        "browOuterUpRight",
        "cheekPuff",
        "eyeBlinkLeft",
        "eyeBlinkRight",
        "eyeSquintLeft",
        "eyeSquintRight",
        "eyeWideLeft",
        "eyeWideRight",
        "jawOpen",
        "mouthClose",
        "mouthFrownLeft",
        "mouthFrownRight",
        "mouthFunnel",
        "mouthPucker",
        "mouthSmileLeft",
        "mouthSmileRight",
        "tongueOut",
    ];
}

struct CoreKey {
    key: &'static str,
    bounds: (f32, f32),
    range: (f32, f32),
    /// Perfect sync drives blinks through `eyeBlink*` instead
    perfect_sync: bool,
}

static CORE_KEYS: [CoreKey; 11] = [
    CoreKey { key: keys::POS_X, bounds: (-1.0, 1.0), range: (-1.0, 1.0), perfect_sync: true },
    CoreKey { key: keys::POS_Y, bounds: (-1.0, 1.0), range: (-1.0, 1.0), perfect_sync: true },
    CoreKey { key: keys::POS_Z, bounds: (-1.0, 1.0), range: (-1.0, 1.0), perfect_sync: true },
    CoreKey { key: keys::HEAD_X, bounds: (-90.0, 90.0), range: (-90.0, 90.0), perfect_sync: true },
    CoreKey { key: keys::HEAD_Y, bounds: (-90.0, 90.0), range: (-90.0, 90.0), perfect_sync: true },
    CoreKey { key: keys::HEAD_Z, bounds: (-90.0, 90.0), range: (-90.0, 90.0), perfect_sync: true },
    CoreKey { key: keys::EYE_X, bounds: (-1.0, 1.0), range: (-1.0, 1.0), perfect_sync: true },
    CoreKey { key: keys::EYE_Y, bounds: (-1.0, 1.0), range: (-1.0, 1.0), perfect_sync: true },
    CoreKey { key: keys::BLINK_L, bounds: (0.0, 1.0), range: (0.02, 0.98), perfect_sync: false },
    CoreKey { key: keys::BLINK_R, bounds: (0.0, 1.0), range: (0.02, 0.98), perfect_sync: false },
    CoreKey { key: keys::MOUTH, bounds: (0.0, 1.0), range: (0.0, 1.0), perfect_sync: true },
];

const BLEND_SHAPE_BOUNDS: (f32, f32) = (0.0, 1.0);

impl CoreKey {
    fn to_key(&self) -> InputKey {
        TrackingKey::new(self.key, self.bounds.0..=self.bounds.1)
            .with_range(self.range.0, self.range.1)
    }
}

fn blend_shape_key(name: &str) -> InputKey {
    TrackingKey::new(name, BLEND_SHAPE_BOUNDS.0..=BLEND_SHAPE_BOUNDS.1)
}

/// Output key to array slot, per mode in [`TrackingMode::ALL`] order
static SLOTS: Lazy<[HashMap<&'static str, usize>; 2]> = Lazy::new(|| {
    TrackingMode::ALL.map(|mode| {
        TrackingCatalog::new(CatalogVariant::Standard)
            .key_names(mode)
            .take(mode.array_channel().array_size())
            .enumerate()
            .map(|(slot, name)| (name, slot))
            .collect()
    })
});

/// Which set of input channels a tracking source provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(i32)]
pub enum TrackingMode {
    /// Core channels only (position, rotation, eyes, blink, mouth)
    BlendShape = 0,
    /// Core channels plus ARKit face blend shapes
    PerfectSync = 1,
}

impl TrackingMode {
    pub const ALL: [TrackingMode; 2] = [TrackingMode::BlendShape, TrackingMode::PerfectSync];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingMode::BlendShape => "blendShape",
            TrackingMode::PerfectSync => "perfectSync",
        }
    }

    pub fn id(self) -> i32 {
        self as i32
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(TrackingMode::BlendShape),
            1 => Some(TrackingMode::PerfectSync),
            _ => None,
        }
    }

    /// Array channel carrying this mode's mapped output
    pub fn array_channel(self) -> ArrayChannel {
        match self {
            TrackingMode::BlendShape => ArrayChannel::BlendShapeTracking,
            TrackingMode::PerfectSync => ArrayChannel::PerfectSync,
        }
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blendShape" | "blend-shape" | "blend_shape" => Ok(TrackingMode::BlendShape),
            "perfectSync" | "perfect-sync" | "perfect_sync" => Ok(TrackingMode::PerfectSync),
            other => Err(BridgeError::UnknownTrackingMode(other.to_string())),
        }
    }
}

/// Perfect-sync vocabulary size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogVariant {
    Standard,
    Compact,
}

impl Default for CatalogVariant {
    fn default() -> Self {
        if cfg!(feature = "compact-catalog") {
            CatalogVariant::Compact
        } else {
            CatalogVariant::Standard
        }
    }
}

/// The built-in input vocabulary for one catalog variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackingCatalog {
    variant: CatalogVariant,
}

impl TrackingCatalog {
    pub const fn new(variant: CatalogVariant) -> Self {
        Self { variant }
    }

    pub fn variant(&self) -> CatalogVariant {
        self.variant
    }

    fn blend_shape_names(&self) -> &'static [&'static str] {
        match self.variant {
            CatalogVariant::Standard => &keys::ARKIT,
            CatalogVariant::Compact => &keys::ARKIT_COMPACT,
        }
    }

    fn key_names(&self, mode: TrackingMode) -> impl Iterator<Item = &'static str> {
        let shapes: &'static [&'static str] = match mode {
            TrackingMode::BlendShape => &[],
            TrackingMode::PerfectSync => self.blend_shape_names(),
        };
        CORE_KEYS
            .iter()
            .filter(move |c| mode == TrackingMode::BlendShape || c.perfect_sync)
            .map(|c| c.key)
            .chain(shapes.iter().copied())
    }

    /// Ordered input keys offered for `mode`
    pub fn available_input_keys(&self, mode: TrackingMode) -> Vec<InputKey> {
        self.key_names(mode)
            .filter_map(|name| self.find(name))
            .collect()
    }

    /// One enabled identity mapping per available input key
    pub fn default_mappings(&self, mode: TrackingMode) -> Vec<TrackingMappingEntry> {
        self.available_input_keys(mode)
            .into_iter()
            .map(TrackingMappingEntry::identity)
            .collect()
    }

    /// Catalog defaults for a key name, `None` for custom names
    pub fn find(&self, key: &str) -> Option<InputKey> {
        if let Some(core) = CORE_KEYS.iter().find(|c| c.key == key) {
            return Some(core.to_key());
        }
        self.blend_shape_names()
            .iter()
            .find(|name| **name == key)
            .map(|name| blend_shape_key(name))
    }

    /// Whether `key` is part of this catalog
    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Position of an output key inside `mode`'s array channel.
    ///
    /// Slots follow the standard vocabulary whatever the variant, so both
    /// sides of the bridge agree on the layout.
    pub fn slot_index(mode: TrackingMode, key: &str) -> Option<usize> {
        SLOTS[mode as usize].get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STANDARD: TrackingCatalog = TrackingCatalog::new(CatalogVariant::Standard);
    const COMPACT: TrackingCatalog = TrackingCatalog::new(CatalogVariant::Compact);

    #[test]
    fn test_blend_shape_vocabulary() {
        let names: Vec<String> = STANDARD
            .available_input_keys(TrackingMode::BlendShape)
            .into_iter()
            .map(|k| k.key)
            .collect();
        assert_eq!(
            names,
            vec![
                "_posX", "_posY", "_posZ", "_headX", "_headY", "_headZ", "_eyeX", "_eyeY",
                "_blinkL", "_blinkR", "_mouth"
            ]
        );
        assert_eq!(COMPACT.available_input_keys(TrackingMode::BlendShape).len(), 11);
    }

    #[test]
    fn test_default_blend_shape_mappings() {
        let entries = STANDARD.default_mappings(TrackingMode::BlendShape);
        assert_eq!(entries.len(), 11);
        for entry in &entries {
            assert!(entry.is_enabled);
            assert_eq!(entry.output_key.key, entry.input.key);
            assert_eq!(entry.output_key.bounds(), entry.input.bounds());
        }
    }

    #[test]
    fn test_perfect_sync_vocabulary_fills_array() {
        let keys = STANDARD.available_input_keys(TrackingMode::PerfectSync);
        assert_eq!(keys.len(), ArrayChannel::PerfectSync.array_size());
        assert_eq!(keys[0].key, keys::POS_X);
        assert_eq!(keys[8].key, keys::MOUTH);
        assert_eq!(keys[9].key, "browDownLeft");
        assert_eq!(keys[60].key, "tongueOut");
        assert!(keys.iter().all(|k| k.key != keys::BLINK_L));
    }

    #[test]
    fn test_blend_shapes_are_alphabetical() {
        for list in [&keys::ARKIT[..], &keys::ARKIT_COMPACT[..]] {
            let mut sorted = list.to_vec();
            sorted.sort();
            assert_eq!(sorted, list.to_vec());
        }
        for name in keys::ARKIT_COMPACT {
            assert!(keys::ARKIT.contains(&name));
        }
    }

    #[test]
    fn test_compact_catalog_is_smaller() {
        let standard = STANDARD.available_input_keys(TrackingMode::PerfectSync).len();
        let compact = COMPACT.available_input_keys(TrackingMode::PerfectSync).len();
        assert_eq!(compact, 9 + keys::ARKIT_COMPACT.len());
        assert!(compact < standard);
        assert!(STANDARD.contains("mouthRollLower"));
        assert!(!COMPACT.contains("mouthRollLower"));
    }

    #[test]
    fn test_find() {
        let head = STANDARD.find(keys::HEAD_Y).unwrap();
        assert_eq!(head.bounds(), -90.0..=90.0);
        let jaw = STANDARD.find("jawOpen").unwrap();
        assert_eq!(jaw.range(), 0.0..=1.0);
        assert!(STANDARD.find("Fcl_MTH_A").is_none());
    }

    #[test]
    fn test_slot_index() {
        assert_eq!(TrackingCatalog::slot_index(TrackingMode::BlendShape, keys::POS_X), Some(0));
        assert_eq!(TrackingCatalog::slot_index(TrackingMode::BlendShape, keys::MOUTH), Some(10));
        assert_eq!(TrackingCatalog::slot_index(TrackingMode::BlendShape, "jawOpen"), None);
        assert_eq!(TrackingCatalog::slot_index(TrackingMode::PerfectSync, "tongueOut"), Some(60));
        assert_eq!(TrackingCatalog::slot_index(TrackingMode::PerfectSync, keys::BLINK_L), None);
    }

    #[test]
    fn test_slots_follow_standard_vocabulary() {
        for mode in TrackingMode::ALL {
            for (slot, key) in STANDARD.available_input_keys(mode).iter().enumerate() {
                assert_eq!(TrackingCatalog::slot_index(mode, &key.key), Some(slot));
            }
            for key in COMPACT.available_input_keys(mode) {
                assert_eq!(
                    TrackingCatalog::slot_index(mode, &key.key),
                    STANDARD.available_input_keys(mode).iter().position(|k| k.key == key.key)
                );
            }
        }
    }

    #[test]
    fn test_mode_parsing_and_ids() {
        assert_eq!("perfect-sync".parse::<TrackingMode>().unwrap(), TrackingMode::PerfectSync);
        assert_eq!("blendShape".parse::<TrackingMode>().unwrap(), TrackingMode::BlendShape);
        assert!("arkit".parse::<TrackingMode>().is_err());
        for mode in TrackingMode::ALL {
            assert_eq!(TrackingMode::from_id(mode.id()), Some(mode));
        }
        assert_eq!(TrackingMode::from_id(7), None);
    }
}
