//! Last-known array values
//!
//! UI code that cannot wait on the tracking loop reads the most recent array
//! values from here. The cache is created once at startup, shared by `Arc`,
//! and cleared when the renderer tears down.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::channel::ArrayChannel;

/// Process-wide cache of the last value seen on each array channel
#[derive(Debug, Default)]
pub struct ValueCache {
    arrays: RwLock<HashMap<ArrayChannel, Vec<f32>>>,
}

impl ValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest value. Last write wins.
    pub fn store(&self, channel: ArrayChannel, values: &[f32]) {
        let mut arrays = self.arrays.write();
        let slot = arrays.entry(channel).or_default();
        slot.clear();
        slot.extend_from_slice(values);
    }

    /// Latest value, or an empty vector if nothing has been seen
    pub fn array(&self, channel: ArrayChannel) -> Vec<f32> {
        self.arrays.read().get(&channel).cloned().unwrap_or_default()
    }

    /// Run `f` over the latest value without copying it
    pub fn with_array<R>(&self, channel: ArrayChannel, f: impl FnOnce(&[f32]) -> R) -> R {
        let arrays = self.arrays.read();
        f(arrays.get(&channel).map(Vec::as_slice).unwrap_or(&[]))
    }

    pub fn contains(&self, channel: ArrayChannel) -> bool {
        self.arrays.read().contains_key(&channel)
    }

    pub fn clear(&self) {
        self.arrays.write().clear();
    }
}
