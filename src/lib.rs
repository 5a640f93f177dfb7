//! VCam Bridge - typed value bridge and tracking mapping engine for a
//! virtual camera avatar renderer
//!
//! The native host and the renderer exchange tracking and control values
//! through a fixed set of typed channels: host → bindings → marshalling →
//! renderer callbacks. Raw face tracking is remapped per frame through a
//! user-editable mapping table before it reaches the avatar rig.
//!
//! ## Modules
//!
//! - **Bridge**: channel registry, value bindings, marshalling, method dispatch
//! - **Tracking**: mapping model, built-in catalog, mapping store, per-frame engine

pub mod binding;
pub mod bridge;
pub mod cache;
pub mod catalog;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod marshal;
pub mod method;
pub mod store;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use binding::{Binding, ValueBinding};
pub use bridge::{Bridge, RendererCallbacks};
pub use cache::ValueCache;
pub use catalog::{CatalogVariant, TrackingCatalog, TrackingMode};
pub use channel::{
    ArrayChannel, BoolChannel, Channel, ChannelCategory, FloatChannel, IntChannel, StringChannel,
    StructChannel, TriggerChannel,
};
pub use config::BridgeConfig;
pub use engine::{TrackingEngine, TrackingFrame};
pub use error::{BridgeError, BridgeResult};
pub use mapping::{InputKey, OutputKey, TrackingKey, TrackingMappingEntry};
pub use marshal::RgbaColor;
pub use method::{Command, MethodDispatcher, MethodId};
pub use store::{MappingDocument, MappingStore};

/// Library version
pub const VCAM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name written by the command-line tool
pub const PRODUCER_NAME: &str = "vcam-bridge";
