//! Method dispatch
//!
//! One-shot commands sent to the renderer: play a motion, apply an
//! expression, mirror a tracking-mapping edit, and so on. Each command has a
//! stable method id and a fixed-layout payload struct; an optional second
//! payload pointer carries a trailing scalar for a few commands.
//!
//! Dispatch is fire-and-forget. There is no return value and no retry, and
//! the payload pointers are only valid for the duration of the call.
//! Ordering between calls is the caller's business.

use std::ffi::c_void;
use std::fmt;
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::catalog::TrackingMode;
use crate::mapping::TrackingMappingEntry;
use crate::marshal::{read_string, read_struct, TransientString, TransientStruct};

/// Stable method ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MethodId {
    PlayMotion = 0,
    StopMotion = 1,
    ApplyExpression = 2,
    AddTrackingMapping = 3,
    UpdateTrackingMapping = 4,
    DeleteTrackingMapping = 5,
    ClearTrackingMappings = 6,
    SetScreenResolution = 7,
    LoadScene = 8,
}

impl MethodId {
    pub fn from_id(id: i32) -> Option<Self> {
        Some(match id {
            0 => MethodId::PlayMotion,
            1 => MethodId::StopMotion,
            2 => MethodId::ApplyExpression,
            3 => MethodId::AddTrackingMapping,
            4 => MethodId::UpdateTrackingMapping,
            5 => MethodId::DeleteTrackingMapping,
            6 => MethodId::ClearTrackingMappings,
            7 => MethodId::SetScreenResolution,
            8 => MethodId::LoadScene,
            _ => return None,
        })
    }
}

/// Payload carrying one name
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct NamePayload {
    pub name: *const c_char,
}

impl Default for NamePayload {
    fn default() -> Self {
        Self { name: ptr::null() }
    }
}

/// Payload for add/update tracking mapping
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct TrackingMappingPayload {
    pub mode: i32,
    pub index: i32,
    pub input_key: *const c_char,
    pub output_key: *const c_char,
    pub input_range_min: f32,
    pub input_range_max: f32,
    pub output_range_min: f32,
    pub output_range_max: f32,
    pub is_enabled: bool,
}

impl Default for TrackingMappingPayload {
    fn default() -> Self {
        Self {
            mode: 0,
            index: 0,
            input_key: ptr::null(),
            output_key: ptr::null(),
            input_range_min: 0.0,
            input_range_max: 0.0,
            output_range_min: 0.0,
            output_range_max: 0.0,
            is_enabled: false,
        }
    }
}

/// Payload addressing one mapping row
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct MappingIndexPayload {
    pub mode: i32,
    pub index: i32,
}

/// Payload addressing a whole tracking mode
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct ModePayload {
    pub mode: i32,
}

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct ResolutionPayload {
    pub width: i32,
    pub height: i32,
}

/// Wire form of one tracking-mapping row
#[derive(Debug, Clone, PartialEq)]
pub struct MappingUpdate {
    pub mode: TrackingMode,
    pub index: i32,
    pub input_key: String,
    pub output_key: String,
    pub input_range: (f32, f32),
    pub output_range: (f32, f32),
    pub enabled: bool,
}

impl MappingUpdate {
    pub fn from_entry(mode: TrackingMode, index: usize, entry: &TrackingMappingEntry) -> Self {
        Self {
            mode,
            index: index as i32,
            input_key: entry.input.key.clone(),
            output_key: entry.output_key.key.clone(),
            input_range: (entry.input.range_min, entry.input.range_max),
            output_range: (entry.output_key.range_min, entry.output_key.range_max),
            enabled: entry.is_enabled,
        }
    }
}

/// A renderer command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PlayMotion { name: String, looping: bool },
    StopMotion { name: String },
    ApplyExpression { name: String, weight: f32 },
    AddTrackingMapping(MappingUpdate),
    UpdateTrackingMapping(MappingUpdate),
    DeleteTrackingMapping { mode: TrackingMode, index: i32 },
    ClearTrackingMappings { mode: TrackingMode },
    SetScreenResolution { width: i32, height: i32 },
    LoadScene { name: String },
}

impl Command {
    pub fn method_id(&self) -> MethodId {
        match self {
            Command::PlayMotion { .. } => MethodId::PlayMotion,
            Command::StopMotion { .. } => MethodId::StopMotion,
            Command::ApplyExpression { .. } => MethodId::ApplyExpression,
            Command::AddTrackingMapping(_) => MethodId::AddTrackingMapping,
            Command::UpdateTrackingMapping(_) => MethodId::UpdateTrackingMapping,
            Command::DeleteTrackingMapping { .. } => MethodId::DeleteTrackingMapping,
            Command::ClearTrackingMappings { .. } => MethodId::ClearTrackingMappings,
            Command::SetScreenResolution { .. } => MethodId::SetScreenResolution,
            Command::LoadScene { .. } => MethodId::LoadScene,
        }
    }

    /// Lay the command out as transient payloads and hand the pointers to `f`.
    ///
    /// Every buffer the pointers reference lives until `f` returns.
    pub fn with_payload<R>(&self, f: impl FnOnce(MethodId, *const c_void, *const c_void) -> R) -> R {
        let method = self.method_id();
        match self {
            Command::PlayMotion { name, looping } => {
                let name = TransientString::new(name);
                let payload = TransientStruct::new(NamePayload { name: name.as_ptr() });
                let looping = TransientStruct::new(*looping);
                f(method, payload.as_ptr(), looping.as_ptr())
            }
            Command::StopMotion { name } | Command::LoadScene { name } => {
                let name = TransientString::new(name);
                let payload = TransientStruct::new(NamePayload { name: name.as_ptr() });
                f(method, payload.as_ptr(), ptr::null())
            }
            Command::ApplyExpression { name, weight } => {
                let name = TransientString::new(name);
                let payload = TransientStruct::new(NamePayload { name: name.as_ptr() });
                let weight = TransientStruct::new(*weight);
                f(method, payload.as_ptr(), weight.as_ptr())
            }
            Command::AddTrackingMapping(update) | Command::UpdateTrackingMapping(update) => {
                let input_key = TransientString::new(&update.input_key);
                let output_key = TransientString::new(&update.output_key);
                let payload = TransientStruct::new(TrackingMappingPayload {
                    mode: update.mode.id(),
                    index: update.index,
                    input_key: input_key.as_ptr(),
                    output_key: output_key.as_ptr(),
                    input_range_min: update.input_range.0,
                    input_range_max: update.input_range.1,
                    output_range_min: update.output_range.0,
                    output_range_max: update.output_range.1,
                    is_enabled: update.enabled,
                });
                f(method, payload.as_ptr(), ptr::null())
            }
            Command::DeleteTrackingMapping { mode, index } => {
                let payload = TransientStruct::new(MappingIndexPayload {
                    mode: mode.id(),
                    index: *index,
                });
                f(method, payload.as_ptr(), ptr::null())
            }
            Command::ClearTrackingMappings { mode } => {
                let payload = TransientStruct::new(ModePayload { mode: mode.id() });
                f(method, payload.as_ptr(), ptr::null())
            }
            Command::SetScreenResolution { width, height } => {
                let payload = TransientStruct::new(ResolutionPayload {
                    width: *width,
                    height: *height,
                });
                f(method, payload.as_ptr(), ptr::null())
            }
        }
    }

    /// Decode a command from its wire payloads, copying everything out.
    ///
    /// Returns `None` for a null primary payload or an unknown tracking mode.
    ///
    /// # Safety
    /// `payload` and `extra` must be null or point to the payload types
    /// [`Command::with_payload`] produces for `method`, valid for this call.
    pub unsafe fn decode(
        method: MethodId,
        payload: *const c_void,
        extra: *const c_void,
    ) -> Option<Command> {
        if payload.is_null() {
            return None;
        }
        let command = match method {
            MethodId::PlayMotion => {
                let p: NamePayload = read_struct(payload);
                Command::PlayMotion {
                    name: read_string(p.name),
                    looping: read_struct::<bool>(extra),
                }
            }
            MethodId::StopMotion => {
                let p: NamePayload = read_struct(payload);
                Command::StopMotion {
                    name: read_string(p.name),
                }
            }
            MethodId::LoadScene => {
                let p: NamePayload = read_struct(payload);
                Command::LoadScene {
                    name: read_string(p.name),
                }
            }
            MethodId::ApplyExpression => {
                let p: NamePayload = read_struct(payload);
                Command::ApplyExpression {
                    name: read_string(p.name),
                    weight: read_struct::<f32>(extra),
                }
            }
            MethodId::AddTrackingMapping | MethodId::UpdateTrackingMapping => {
                let p: TrackingMappingPayload = read_struct(payload);
                let update = MappingUpdate {
                    mode: TrackingMode::from_id(p.mode)?,
                    index: p.index,
                    input_key: read_string(p.input_key),
                    output_key: read_string(p.output_key),
                    input_range: (p.input_range_min, p.input_range_max),
                    output_range: (p.output_range_min, p.output_range_max),
                    enabled: p.is_enabled,
                };
                if method == MethodId::AddTrackingMapping {
                    Command::AddTrackingMapping(update)
                } else {
                    Command::UpdateTrackingMapping(update)
                }
            }
            MethodId::DeleteTrackingMapping => {
                let p: MappingIndexPayload = read_struct(payload);
                Command::DeleteTrackingMapping {
                    mode: TrackingMode::from_id(p.mode)?,
                    index: p.index,
                }
            }
            MethodId::ClearTrackingMappings => {
                let p: ModePayload = read_struct(payload);
                Command::ClearTrackingMappings {
                    mode: TrackingMode::from_id(p.mode)?,
                }
            }
            MethodId::SetScreenResolution => {
                let p: ResolutionPayload = read_struct(payload);
                Command::SetScreenResolution {
                    width: p.width,
                    height: p.height,
                }
            }
        };
        Some(command)
    }
}

type Handler = Arc<dyn Fn(MethodId, *const c_void, *const c_void) + Send + Sync>;

/// Swappable command sink, silent when unwired
#[derive(Default)]
pub struct MethodDispatcher {
    handler: RwLock<Option<Handler>>,
}

impl fmt::Debug for MethodDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDispatcher")
            .field("wired", &self.is_wired())
            .finish()
    }
}

impl MethodDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the receiving end. The handler must not retain the pointers.
    pub fn wire<H>(&self, handler: H)
    where
        H: Fn(MethodId, *const c_void, *const c_void) + Send + Sync + 'static,
    {
        *self.handler.write() = Some(Arc::new(handler));
        debug!("method handler wired");
    }

    pub fn is_wired(&self) -> bool {
        self.handler.read().is_some()
    }

    pub fn reset(&self) {
        *self.handler.write() = None;
        debug!("method handler reset");
    }

    /// Send a command; dropped when nothing is wired.
    pub fn dispatch(&self, command: &Command) {
        let handler = self.handler.read().clone();
        match handler {
            Some(handler) => {
                trace!(method = ?command.method_id(), "dispatch");
                command.with_payload(|method, payload, extra| handler(method, payload, extra));
            }
            None => trace!(method = ?command.method_id(), "dispatch dropped, no handler"),
        }
    }

    /// Send a raw method id received from elsewhere, rejecting unknown ids.
    ///
    /// # Safety
    /// Same payload contract as [`Command::decode`].
    pub unsafe fn dispatch_raw(&self, method: i32, payload: *const c_void, extra: *const c_void) {
        let Some(method) = MethodId::from_id(method) else {
            warn!(method, "unknown method id");
            return;
        };
        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            handler(method, payload, extra);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::TrackingKey;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn recording_dispatcher() -> (MethodDispatcher, Arc<Mutex<Vec<Command>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let dispatcher = MethodDispatcher::new();
        dispatcher.wire(move |method, payload, extra| {
            if let Some(command) = unsafe { Command::decode(method, payload, extra) } {
                sink.lock().push(command);
            }
        });
        (dispatcher, received)
    }

    #[test]
    fn test_commands_round_trip_through_payloads() {
        let (dispatcher, received) = recording_dispatcher();
        let entry = TrackingMappingEntry::new(
            TrackingKey::new("_headX", -90.0..=90.0).with_range(-45.0, 45.0),
            TrackingKey::new("_headY", -90.0..=90.0).with_range(-30.0, 60.0),
        );

        let commands = vec![
            Command::PlayMotion { name: "wave".into(), looping: true },
            Command::StopMotion { name: "wave".into() },
            Command::ApplyExpression { name: "happy".into(), weight: 0.75 },
            Command::AddTrackingMapping(MappingUpdate::from_entry(TrackingMode::PerfectSync, 3, &entry)),
            Command::UpdateTrackingMapping(MappingUpdate::from_entry(TrackingMode::BlendShape, 0, &entry)),
            Command::DeleteTrackingMapping { mode: TrackingMode::BlendShape, index: 2 },
            Command::ClearTrackingMappings { mode: TrackingMode::PerfectSync },
            Command::SetScreenResolution { width: 1920, height: 1080 },
            Command::LoadScene { name: "studio".into() },
        ];
        for command in &commands {
            dispatcher.dispatch(command);
        }

        assert_eq!(*received.lock(), commands);
    }

    #[test]
    fn test_mapping_payload_layout() {
        let mut entry = TrackingMappingEntry::new(
            TrackingKey::new("_mouth", 0.0..=1.0).with_range(0.1, 0.8),
            TrackingKey::new("jawOpen", 0.0..=1.0).with_range(0.0, 0.5),
        );
        entry.is_enabled = false;
        let command = Command::UpdateTrackingMapping(MappingUpdate::from_entry(TrackingMode::PerfectSync, 7, &entry));
        command.with_payload(|method, payload, extra| {
            assert_eq!(method, MethodId::UpdateTrackingMapping);
            assert!(extra.is_null());
            let raw: TrackingMappingPayload = unsafe { read_struct(payload) };
            assert_eq!(raw.mode, 1);
            assert_eq!(raw.index, 7);
            assert_eq!(unsafe { read_string(raw.input_key) }, "_mouth");
            assert_eq!(unsafe { read_string(raw.output_key) }, "jawOpen");
            assert_eq!(
                (raw.input_range_min, raw.input_range_max, raw.output_range_min, raw.output_range_max),
                (0.1, 0.8, 0.0, 0.5)
            );
            assert!(!raw.is_enabled);
        });
    }

    #[test]
    fn test_unwired_dispatch_is_silent() {
        let dispatcher = MethodDispatcher::new();
        dispatcher.dispatch(&Command::LoadScene { name: "none".into() });
        assert!(!dispatcher.is_wired());
    }

    #[test]
    fn test_reset_stops_delivery() {
        let (dispatcher, received) = recording_dispatcher();
        dispatcher.dispatch(&Command::StopMotion { name: "a".into() });
        dispatcher.reset();
        dispatcher.dispatch(&Command::StopMotion { name: "b".into() });
        assert_eq!(received.lock().len(), 1);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        unsafe {
            assert_eq!(Command::decode(MethodId::LoadScene, ptr::null(), ptr::null()), None);
            let bad_mode = TransientStruct::new(ModePayload { mode: 9 });
            assert_eq!(
                Command::decode(MethodId::ClearTrackingMappings, bad_mode.as_ptr(), ptr::null()),
                None
            );
        }
        assert_eq!(MethodId::from_id(99), None);
    }

    #[test]
    fn test_raw_dispatch_ignores_unknown_methods() {
        let (dispatcher, received) = recording_dispatcher();
        let payload = TransientStruct::new(ResolutionPayload { width: 640, height: 480 });
        unsafe {
            dispatcher.dispatch_raw(42, payload.as_ptr(), ptr::null());
            dispatcher.dispatch_raw(7, payload.as_ptr(), ptr::null());
        }
        assert_eq!(
            *received.lock(),
            vec![Command::SetScreenResolution { width: 640, height: 480 }]
        );
    }
}
