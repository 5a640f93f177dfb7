//! Tracking mapping model
//!
//! A mapping entry routes one tracking input (head yaw, a blink, an ARKit
//! blend shape...) onto one avatar output. Each side carries its natural
//! bounds plus a user-adjustable sub-range; scaling normalizes the raw input
//! against that sub-range onto `[-1, 1]` so channels measured in degrees and
//! channels measured as 0-1 weights look the same downstream.
//!
//! Nothing here fails. Degenerate ranges scale to the neutral value `0`.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{CatalogVariant, TrackingCatalog};

/// One end of a mapping: a named channel with bounds and a configured range.
///
/// Keys starting with `_` are built-in channels (position, rotation, eyes,
/// blink, mouth); anything else is a model-specific blend shape name. The
/// distinction only matters for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingKey {
    pub key: String,
    /// Natural lower bound of the channel's raw units
    pub bounds_min: f32,
    /// Natural upper bound of the channel's raw units
    pub bounds_max: f32,
    /// Configured lower edge used for normalization
    pub range_min: f32,
    /// Configured upper edge used for normalization
    pub range_max: f32,
}

/// Tracking-side end of a mapping
pub type InputKey = TrackingKey;
/// Avatar-side end of a mapping
pub type OutputKey = TrackingKey;

impl TrackingKey {
    /// A key whose configured range equals its bounds
    pub fn new(key: impl Into<String>, bounds: RangeInclusive<f32>) -> Self {
        let (min, max) = bounds.into_inner();
        Self {
            key: key.into(),
            bounds_min: min,
            bounds_max: max,
            range_min: min,
            range_max: max,
        }
    }

    pub fn with_range(mut self, range_min: f32, range_max: f32) -> Self {
        self.set_range(range_min, range_max);
        self
    }

    pub fn bounds(&self) -> RangeInclusive<f32> {
        self.bounds_min..=self.bounds_max
    }

    pub fn range(&self) -> RangeInclusive<f32> {
        self.range_min..=self.range_max
    }

    /// Built-in channel rather than a model blend shape
    pub fn is_core(&self) -> bool {
        self.key.starts_with('_')
    }

    /// Name used for display lookup
    pub fn display_key(&self) -> &str {
        self.key.strip_prefix('_').unwrap_or(&self.key)
    }

    /// Set the configured range. Not validated against the bounds.
    pub fn set_range(&mut self, range_min: f32, range_max: f32) {
        self.range_min = range_min;
        self.range_max = range_max;
    }

    /// Whether the configured range lies inside the natural bounds
    pub fn range_within_bounds(&self) -> bool {
        let (lo, hi) = ordered(self.bounds_min, self.bounds_max);
        lo <= self.range_min && self.range_min <= hi && lo <= self.range_max && self.range_max <= hi
    }

    /// Pull the configured range back inside the natural bounds
    pub fn clamp_range_to_bounds(&mut self) {
        let (lo, hi) = ordered(self.bounds_min, self.bounds_max);
        self.range_min = self.range_min.max(lo).min(hi);
        self.range_max = self.range_max.max(lo).min(hi);
    }

    /// Normalize a raw sample onto `[-1, 1]` using the configured range.
    ///
    /// Samples outside the range are clamped to it first. A zero-width or
    /// non-finite range, or a NaN sample, yields `0`. An inverted range
    /// (`range_min > range_max`) inverts the output.
    pub fn scale_value(&self, raw: f32) -> f32 {
        let width = self.range_max - self.range_min;
        if width == 0.0 || !width.is_finite() || raw.is_nan() {
            return 0.0;
        }
        let (lo, hi) = ordered(self.range_min, self.range_max);
        let clamped = raw.max(lo).min(hi);
        (clamped - self.range_min) / width * 2.0 - 1.0
    }

    /// Restore bounds and range from the built-in vocabulary.
    ///
    /// Resolves against the standard catalog, which contains every key of
    /// the compact one with the same defaults, so the result does not depend
    /// on the catalog a build or configuration selects.
    pub fn reset_to_default(&mut self) {
        self.reset_to_default_in(&TrackingCatalog::new(CatalogVariant::Standard));
    }

    /// Restore bounds and range from `catalog`. Unknown keys are left as-is.
    pub fn reset_to_default_in(&mut self, catalog: &TrackingCatalog) {
        if let Some(default) = catalog.find(&self.key) {
            self.bounds_min = default.bounds_min;
            self.bounds_max = default.bounds_max;
            self.range_min = default.range_min;
            self.range_max = default.range_max;
        }
    }
}

fn ordered(a: f32, b: f32) -> (f32, f32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// One input-to-output remap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingMappingEntry {
    pub id: Uuid,
    pub is_enabled: bool,
    pub input: InputKey,
    pub output_key: OutputKey,
}

impl TrackingMappingEntry {
    /// An enabled entry with a fresh id
    pub fn new(input: InputKey, output_key: OutputKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            is_enabled: true,
            input,
            output_key,
        }
    }

    /// An enabled entry whose output mirrors the input key
    pub fn identity(input: InputKey) -> Self {
        let output_key = input.clone();
        Self::new(input, output_key)
    }

    /// Scale a raw sample through the input range
    pub fn scale_value(&self, raw: f32) -> f32 {
        self.input.scale_value(raw)
    }

    pub fn reset_to_default(&mut self) {
        self.input.reset_to_default();
        self.output_key.reset_to_default();
    }

    pub fn reset_to_default_in(&mut self, catalog: &TrackingCatalog) {
        self.input.reset_to_default_in(catalog);
        self.output_key.reset_to_default_in(catalog);
    }
}
