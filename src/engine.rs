//! Tracking engine
//!
//! Turns one frame of raw tracking samples into the packed float array the
//! renderer reads for the active tracking mode.
//!
//! Stages per frame:
//! 1. Map - every enabled entry scales its input sample onto `[-1, 1]`
//! 2. Resolve - later entries win when several target the same output key
//! 3. Pack - values land at their output key's slot in the mode's array
//! 4. Write - the array goes through the bridge and into the value cache

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::bridge::Bridge;
use crate::catalog::{TrackingCatalog, TrackingMode};
use crate::mapping::TrackingMappingEntry;
use crate::store::MappingStore;

/// Raw samples for one tracking frame, keyed by input key name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingFrame {
    samples: HashMap<String, f32>,
}

impl TrackingFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f32) {
        self.samples.insert(key.into(), value);
    }

    pub fn with(mut self, key: impl Into<String>, value: f32) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<f32> {
        self.samples.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f32)> for TrackingFrame {
    fn from_iter<I: IntoIterator<Item = (K, f32)>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// A scaled value addressed to one output key
#[derive(Debug, Clone, PartialEq)]
pub struct MappedValue {
    pub key: String,
    pub value: f32,
}

/// Applies a store's mappings to tracking frames and forwards the result
#[derive(Debug, Clone)]
pub struct TrackingEngine {
    store: Arc<MappingStore>,
    bridge: Arc<Bridge>,
}

impl TrackingEngine {
    pub fn new(store: Arc<MappingStore>, bridge: Arc<Bridge>) -> Self {
        Self { store, bridge }
    }

    pub fn store(&self) -> &Arc<MappingStore> {
        &self.store
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Map, pack and write one frame for `mode`, returning the packed array
    pub fn process(&self, mode: TrackingMode, frame: &TrackingFrame) -> Vec<f32> {
        let mapped = self
            .store
            .with_mappings(mode, |entries| Self::map_frame(entries, frame));
        let packed = Self::pack(mode, &mapped);
        trace!(%mode, mapped = mapped.len(), "frame processed");
        self.bridge.array_binding(mode.array_channel()).set(packed.clone());
        packed
    }

    /// Scale every enabled entry whose input is present in `frame`.
    ///
    /// Output order follows the first entry targeting each key; the value
    /// comes from the last one.
    pub fn map_frame(entries: &[TrackingMappingEntry], frame: &TrackingFrame) -> Vec<MappedValue> {
        let mut mapped: Vec<MappedValue> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();

        for entry in entries.iter().filter(|e| e.is_enabled) {
            let Some(raw) = frame.get(&entry.input.key) else {
                continue;
            };
            let value = entry.scale_value(raw);
            let key = entry.output_key.key.as_str();
            match positions.get(key) {
                Some(&i) => mapped[i].value = value,
                None => {
                    positions.insert(key, mapped.len());
                    mapped.push(MappedValue {
                        key: key.to_string(),
                        value,
                    });
                }
            }
        }
        mapped
    }

    /// Lay mapped values out in `mode`'s array channel. Keys without a slot
    /// are dropped and unset slots stay `0`.
    pub fn pack(mode: TrackingMode, values: &[MappedValue]) -> Vec<f32> {
        let mut packed = vec![0.0; mode.array_channel().array_size()];
        for mapped in values {
            if let Some(slot) = TrackingCatalog::slot_index(mode, &mapped.key) {
                packed[slot] = mapped.value;
            }
        }
        packed
    }
}
