//! Mapping store
//!
//! Holds the ordered mapping table for every tracking mode and persists it as
//! a JSON document. Edits are applied under one write lock, so a concurrent
//! reader sees each edit (including clearing a whole mode) entirely or not at
//! all. When a dispatcher is attached, every edit is mirrored to the renderer
//! in the same order it was applied.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{TrackingCatalog, TrackingMode};
use crate::error::{BridgeError, BridgeResult};
use crate::mapping::TrackingMappingEntry;
use crate::method::{Command, MappingUpdate, MethodDispatcher};

/// Current mapping document version
pub const MAPPING_DOCUMENT_VERSION: u32 = 1;

/// Mapping entries for every tracking mode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingTable {
    #[serde(default)]
    pub blend_shape: Vec<TrackingMappingEntry>,
    #[serde(default)]
    pub perfect_sync: Vec<TrackingMappingEntry>,
}

impl MappingTable {
    pub fn get(&self, mode: TrackingMode) -> &[TrackingMappingEntry] {
        match mode {
            TrackingMode::BlendShape => &self.blend_shape,
            TrackingMode::PerfectSync => &self.perfect_sync,
        }
    }

    pub fn get_mut(&mut self, mode: TrackingMode) -> &mut Vec<TrackingMappingEntry> {
        match mode {
            TrackingMode::BlendShape => &mut self.blend_shape,
            TrackingMode::PerfectSync => &mut self.perfect_sync,
        }
    }
}

/// On-disk form of a mapping table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingDocument {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub mappings: MappingTable,
}

impl MappingDocument {
    pub fn new(mappings: MappingTable) -> Self {
        Self {
            version: MAPPING_DOCUMENT_VERSION,
            saved_at: Utc::now(),
            mappings,
        }
    }

    pub fn from_json(json: &str) -> BridgeResult<Self> {
        let document: MappingDocument = serde_json::from_str(json)?;
        if document.version > MAPPING_DOCUMENT_VERSION {
            return Err(BridgeError::UnsupportedVersion(document.version));
        }
        Ok(document)
    }

    pub fn to_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Shared, thread-safe mapping table
#[derive(Debug, Default)]
pub struct MappingStore {
    table: RwLock<MappingTable>,
    /// Held from applying an edit until its commands are delivered, so the
    /// renderer sees edits in the order they were applied
    sync_order: Mutex<()>,
    catalog: TrackingCatalog,
    enforce_range_within_bounds: bool,
    sync: Option<Arc<MethodDispatcher>>,
}

impl MappingStore {
    pub fn new(catalog: TrackingCatalog) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    /// Clamp configured ranges into the natural bounds on every edit
    pub fn with_range_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_range_within_bounds = enforce;
        self
    }

    /// Mirror every edit to the renderer through `dispatcher`.
    ///
    /// Commands are delivered after the table lock is released, so the
    /// receiving end may read the store. It must not edit it.
    pub fn with_sync(mut self, dispatcher: Arc<MethodDispatcher>) -> Self {
        self.sync = Some(dispatcher);
        self
    }

    pub fn catalog(&self) -> &TrackingCatalog {
        &self.catalog
    }

    /// Snapshot of one mode's entries
    pub fn mappings(&self, mode: TrackingMode) -> Vec<TrackingMappingEntry> {
        self.table.read().get(mode).to_vec()
    }

    /// Run `f` over one mode's entries under the read lock
    pub fn with_mappings<R>(
        &self,
        mode: TrackingMode,
        f: impl FnOnce(&[TrackingMappingEntry]) -> R,
    ) -> R {
        f(self.table.read().get(mode))
    }

    /// Snapshot of the whole table
    pub fn table(&self) -> MappingTable {
        self.table.read().clone()
    }

    pub fn len(&self, mode: TrackingMode) -> usize {
        self.table.read().get(mode).len()
    }

    pub fn is_empty(&self, mode: TrackingMode) -> bool {
        self.len(mode) == 0
    }

    fn prepare(&self, mut entry: TrackingMappingEntry) -> TrackingMappingEntry {
        if self.enforce_range_within_bounds {
            entry.input.clamp_range_to_bounds();
            entry.output_key.clamp_range_to_bounds();
        }
        entry
    }

    /// Apply `edit` under the write lock, then deliver the commands it queued
    fn edit<R>(&self, edit: impl FnOnce(&mut MappingTable, &mut Vec<Command>) -> R) -> R {
        let _order = self.sync_order.lock();
        let mut commands = Vec::new();
        let result = {
            let mut table = self.table.write();
            edit(&mut *table, &mut commands)
        };
        if let Some(sync) = &self.sync {
            for command in &commands {
                sync.dispatch(command);
            }
        }
        result
    }

    /// Queue a clear plus one add per entry of `mode`
    fn queue_replay(&self, mode: TrackingMode, table: &MappingTable, commands: &mut Vec<Command>) {
        if self.sync.is_none() {
            return;
        }
        commands.push(Command::ClearTrackingMappings { mode });
        commands.extend(table.get(mode).iter().enumerate().map(|(index, entry)| {
            Command::AddTrackingMapping(MappingUpdate::from_entry(mode, index, entry))
        }));
    }

    fn out_of_bounds(mode: TrackingMode, index: usize, len: usize) -> BridgeError {
        BridgeError::MappingIndexOutOfBounds {
            mode: mode.to_string(),
            index,
            len,
        }
    }

    /// Append an entry, returning its index
    pub fn add(&self, mode: TrackingMode, entry: TrackingMappingEntry) -> usize {
        let entry = self.prepare(entry);
        self.edit(|table, commands| {
            let entries = table.get_mut(mode);
            let index = entries.len();
            commands.push(Command::AddTrackingMapping(MappingUpdate::from_entry(
                mode, index, &entry,
            )));
            entries.push(entry);
            debug!(%mode, index, "mapping added");
            index
        })
    }

    /// Replace the entry at `index`
    pub fn update(
        &self,
        mode: TrackingMode,
        index: usize,
        entry: TrackingMappingEntry,
    ) -> BridgeResult<()> {
        let entry = self.prepare(entry);
        self.edit(|table, commands| -> BridgeResult<()> {
            let entries = table.get_mut(mode);
            let len = entries.len();
            let slot = entries
                .get_mut(index)
                .ok_or_else(|| Self::out_of_bounds(mode, index, len))?;
            commands.push(Command::UpdateTrackingMapping(MappingUpdate::from_entry(
                mode, index, &entry,
            )));
            *slot = entry;
            debug!(%mode, index, "mapping updated");
            Ok(())
        })
    }

    /// Toggle whether the entry at `index` is applied
    pub fn set_enabled(&self, mode: TrackingMode, index: usize, enabled: bool) -> BridgeResult<()> {
        self.edit(|table, commands| -> BridgeResult<()> {
            let entries = table.get_mut(mode);
            let len = entries.len();
            let entry = entries
                .get_mut(index)
                .ok_or_else(|| Self::out_of_bounds(mode, index, len))?;
            if entry.is_enabled != enabled {
                entry.is_enabled = enabled;
                commands.push(Command::UpdateTrackingMapping(MappingUpdate::from_entry(
                    mode, index, entry,
                )));
            }
            debug!(%mode, index, enabled, "mapping toggled");
            Ok(())
        })
    }

    /// Remove and return the entry at `index`
    pub fn remove(&self, mode: TrackingMode, index: usize) -> BridgeResult<TrackingMappingEntry> {
        self.edit(|table, commands| -> BridgeResult<TrackingMappingEntry> {
            let entries = table.get_mut(mode);
            if index >= entries.len() {
                return Err(Self::out_of_bounds(mode, index, entries.len()));
            }
            commands.push(Command::DeleteTrackingMapping {
                mode,
                index: index as i32,
            });
            let removed = entries.remove(index);
            debug!(%mode, index, "mapping removed");
            Ok(removed)
        })
    }

    /// Remove every entry of `mode` in one step
    pub fn clear(&self, mode: TrackingMode) {
        self.edit(|table, commands| {
            commands.push(Command::ClearTrackingMappings { mode });
            table.get_mut(mode).clear();
        });
        info!(%mode, "mappings cleared");
    }

    /// Replace `mode`'s entries with the catalog defaults in one step
    pub fn reset_to_defaults(&self, mode: TrackingMode) {
        let defaults = self.catalog.default_mappings(mode);
        self.edit(|table, commands| {
            *table.get_mut(mode) = defaults;
            self.queue_replay(mode, table, commands);
        });
        info!(%mode, "mappings reset to defaults");
    }

    /// Seed `mode` with catalog defaults if it has no entries yet
    pub fn ensure_defaults(&self, mode: TrackingMode) -> bool {
        self.edit(|table, commands| {
            if !table.get(mode).is_empty() {
                return false;
            }
            *table.get_mut(mode) = self.catalog.default_mappings(mode);
            self.queue_replay(mode, table, commands);
            true
        })
    }

    /// Push the full table for `mode` to the renderer, e.g. after it reconnects
    pub fn resync(&self, mode: TrackingMode) {
        self.edit(|table, commands| self.queue_replay(mode, table, commands));
    }

    /// Replace the whole table from a JSON document
    pub fn load_json(&self, json: &str) -> BridgeResult<()> {
        let document = MappingDocument::from_json(json)?;
        let mut mappings = document.mappings;
        for mode in TrackingMode::ALL {
            let entries = std::mem::take(mappings.get_mut(mode));
            *mappings.get_mut(mode) = entries.into_iter().map(|e| self.prepare(e)).collect();
        }
        let (blend_shape, perfect_sync) = (mappings.blend_shape.len(), mappings.perfect_sync.len());
        self.edit(|table, commands| {
            *table = mappings;
            for mode in TrackingMode::ALL {
                self.queue_replay(mode, table, commands);
            }
        });
        info!(blend_shape, perfect_sync, "mappings loaded");
        Ok(())
    }

    /// Serialize the whole table as a JSON document
    pub fn to_json(&self) -> BridgeResult<String> {
        MappingDocument::new(self.table()).to_json()
    }

    pub fn load_file(&self, path: &Path) -> BridgeResult<()> {
        let json = fs::read_to_string(path)?;
        self.load_json(&json)
    }

    pub fn save_file(&self, path: &Path) -> BridgeResult<()> {
        let json = self.to_json()?;
        fs::write(path, json)?;
        info!(path = %path.display(), "mappings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{keys, CatalogVariant};
    use crate::mapping::TrackingKey;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn store() -> MappingStore {
        MappingStore::new(TrackingCatalog::new(CatalogVariant::Standard))
    }

    fn synced_store() -> (MappingStore, Arc<Mutex<Vec<Command>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let dispatcher = Arc::new(MethodDispatcher::new());
        dispatcher.wire(move |method, payload, extra| {
            if let Some(command) = unsafe { Command::decode(method, payload, extra) } {
                sink.lock().push(command);
            }
        });
        (store().with_sync(dispatcher), received)
    }

    fn custom_entry() -> TrackingMappingEntry {
        TrackingMappingEntry::new(
            TrackingKey::new(keys::MOUTH, 0.0..=1.0).with_range(0.1, 0.7),
            TrackingKey::new("Fcl_MTH_A", 0.0..=1.0),
        )
    }

    #[test]
    fn test_ensure_defaults_seeds_once() {
        let store = store();
        assert!(store.ensure_defaults(TrackingMode::BlendShape));
        assert!(!store.ensure_defaults(TrackingMode::BlendShape));
        assert_eq!(store.len(TrackingMode::BlendShape), 11);
        assert!(store.is_empty(TrackingMode::PerfectSync));
    }

    #[test]
    fn test_add_update_remove() {
        let store = store();
        let index = store.add(TrackingMode::PerfectSync, custom_entry());
        assert_eq!(index, 0);

        let mut edited = store.mappings(TrackingMode::PerfectSync)[0].clone();
        edited.input.set_range(0.2, 0.6);
        store.update(TrackingMode::PerfectSync, 0, edited.clone()).unwrap();
        assert_eq!(store.mappings(TrackingMode::PerfectSync), vec![edited.clone()]);

        store.set_enabled(TrackingMode::PerfectSync, 0, false).unwrap();
        let removed = store.remove(TrackingMode::PerfectSync, 0).unwrap();
        assert!(!removed.is_enabled);
        assert_eq!(removed.id, edited.id);
        assert!(store.is_empty(TrackingMode::PerfectSync));
    }

    #[test]
    fn test_out_of_bounds_edits_fail() {
        let store = store();
        assert!(matches!(
            store.update(TrackingMode::BlendShape, 3, custom_entry()),
            Err(BridgeError::MappingIndexOutOfBounds { index: 3, len: 0, .. })
        ));
        assert!(store.remove(TrackingMode::BlendShape, 0).is_err());
        assert!(store.set_enabled(TrackingMode::BlendShape, 0, true).is_err());
    }

    #[test]
    fn test_clear_only_touches_one_mode() {
        let store = store();
        store.reset_to_defaults(TrackingMode::BlendShape);
        store.reset_to_defaults(TrackingMode::PerfectSync);
        store.clear(TrackingMode::BlendShape);
        assert!(store.is_empty(TrackingMode::BlendShape));
        assert_eq!(store.len(TrackingMode::PerfectSync), 61);
    }

    #[test]
    fn test_clear_is_atomic_for_concurrent_readers() {
        let store = Arc::new(store());
        store.reset_to_defaults(TrackingMode::BlendShape);

        let reader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    let len = store.len(TrackingMode::BlendShape);
                    assert!(len == 0 || len == 11, "partial state: {len}");
                }
            })
        };
        for _ in 0..100 {
            store.clear(TrackingMode::BlendShape);
            store.reset_to_defaults(TrackingMode::BlendShape);
        }
        reader.join().unwrap();
    }

    #[test]
    fn test_range_enforcement() {
        let store = store().with_range_enforcement(true);
        let mut entry = custom_entry();
        entry.input.set_range(-0.5, 1.5);
        store.add(TrackingMode::BlendShape, entry);
        assert_eq!(store.mappings(TrackingMode::BlendShape)[0].input.range(), 0.0..=1.0);

        let loose = MappingStore::new(TrackingCatalog::default());
        let mut entry = custom_entry();
        entry.input.set_range(-0.5, 1.5);
        loose.add(TrackingMode::BlendShape, entry);
        assert_eq!(loose.mappings(TrackingMode::BlendShape)[0].input.range(), -0.5..=1.5);
    }

    #[test]
    fn test_json_round_trip() {
        let store = store();
        store.reset_to_defaults(TrackingMode::BlendShape);
        store.add(TrackingMode::PerfectSync, custom_entry());
        store.set_enabled(TrackingMode::BlendShape, 4, false).unwrap();

        let json = store.to_json().unwrap();
        let restored = MappingStore::new(TrackingCatalog::default());
        restored.load_json(&json).unwrap();

        assert_eq!(restored.table(), store.table());
    }

    #[test]
    fn test_document_version_check() {
        let mut document = MappingDocument::new(MappingTable::default());
        document.version = MAPPING_DOCUMENT_VERSION + 1;
        let json = document.to_json().unwrap();
        assert!(matches!(
            MappingDocument::from_json(&json),
            Err(BridgeError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            MappingDocument::from_json("{"),
            Err(BridgeError::JsonError(_))
        ));
    }

    #[test]
    fn test_missing_mode_decodes_empty() {
        let json = r#"{"version":1,"savedAt":"2024-01-15T10:00:00Z","mappings":{}}"#;
        let document = MappingDocument::from_json(json).unwrap();
        assert!(document.mappings.blend_shape.is_empty());
        assert!(document.mappings.perfect_sync.is_empty());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.json");

        let store = store();
        store.reset_to_defaults(TrackingMode::PerfectSync);
        store.save_file(&path).unwrap();

        let restored = MappingStore::new(TrackingCatalog::default());
        restored.load_file(&path).unwrap();
        assert_eq!(restored.mappings(TrackingMode::PerfectSync), store.mappings(TrackingMode::PerfectSync));
        assert!(restored.load_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_edits_are_mirrored_in_order() {
        let (store, received) = synced_store();
        let entry = custom_entry();
        store.add(TrackingMode::BlendShape, entry.clone());
        store.update(TrackingMode::BlendShape, 0, entry.clone()).unwrap();
        store.remove(TrackingMode::BlendShape, 0).unwrap();
        store.clear(TrackingMode::PerfectSync);

        let update = MappingUpdate::from_entry(TrackingMode::BlendShape, 0, &entry);
        assert_eq!(
            *received.lock(),
            vec![
                Command::AddTrackingMapping(update.clone()),
                Command::UpdateTrackingMapping(update),
                Command::DeleteTrackingMapping { mode: TrackingMode::BlendShape, index: 0 },
                Command::ClearTrackingMappings { mode: TrackingMode::PerfectSync },
            ]
        );
    }

    #[test]
    fn test_toggle_is_mirrored_with_enabled_flag() {
        let (store, received) = synced_store();
        store.reset_to_defaults(TrackingMode::BlendShape);
        received.lock().clear();

        store.set_enabled(TrackingMode::BlendShape, 0, false).unwrap();
        store.set_enabled(TrackingMode::BlendShape, 0, false).unwrap();
        {
            let commands = received.lock();
            assert_eq!(commands.len(), 1);
            assert!(matches!(
                &commands[0],
                Command::UpdateTrackingMapping(u) if u.index == 0 && !u.enabled
            ));
        }

        received.lock().clear();
        store.resync(TrackingMode::BlendShape);
        let commands = received.lock();
        let enabled: Vec<bool> = commands
            .iter()
            .filter_map(|c| match c {
                Command::AddTrackingMapping(u) => Some(u.enabled),
                _ => None,
            })
            .collect();
        assert_eq!(enabled.len(), 11);
        assert!(!enabled[0]);
        assert_eq!(enabled.iter().filter(|e| **e).count(), 10);
    }

    #[test]
    fn test_sync_handler_may_read_store() {
        let slot: Arc<Mutex<Option<Arc<MappingStore>>>> = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Arc::new(MethodDispatcher::new());
        {
            let slot = Arc::clone(&slot);
            let seen = Arc::clone(&seen);
            dispatcher.wire(move |_, _, _| {
                let store = slot.lock().clone();
                if let Some(store) = store {
                    seen.lock().push(store.len(TrackingMode::BlendShape));
                }
            });
        }
        let store = Arc::new(store().with_sync(dispatcher));
        *slot.lock() = Some(Arc::clone(&store));
        store.ensure_defaults(TrackingMode::BlendShape);

        let (done, finished) = std::sync::mpsc::channel();
        let worker = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                store.clear(TrackingMode::BlendShape);
                store.add(TrackingMode::BlendShape, custom_entry());
                done.send(()).unwrap();
            })
        };
        finished
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("store edit blocked on its own sync handler");
        worker.join().unwrap();
        *slot.lock() = None;

        // The handler sees each edit already applied
        let seen = seen.lock();
        assert_eq!(&seen[seen.len() - 2..], &[0, 1]);
    }

    #[test]
    fn test_resync_replays_table() {
        let (store, received) = synced_store();
        store.reset_to_defaults(TrackingMode::BlendShape);
        received.lock().clear();

        store.resync(TrackingMode::BlendShape);
        let commands = received.lock();
        assert_eq!(commands.len(), 12);
        assert_eq!(commands[0], Command::ClearTrackingMappings { mode: TrackingMode::BlendShape });
        assert!(matches!(&commands[11], Command::AddTrackingMapping(u) if u.index == 10));
    }
}
