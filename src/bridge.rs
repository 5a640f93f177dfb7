//! Renderer bridge
//!
//! The renderer hands over a table of C callbacks when it starts. Connecting
//! wires every [`ValueBinding`](crate::binding::ValueBinding) and the
//! [`MethodDispatcher`] to those callbacks; disconnecting resets them all,
//! after which reads fall back to defaults again. Connecting replaces any
//! earlier wiring, so callbacks missing from the new table leave their
//! direction unwired.

use std::ffi::c_void;
use std::os::raw::c_char;
use std::sync::Arc;

use tracing::info;

use crate::binding::{
    ArrayBinding, Binding, BoolBinding, FloatBinding, IntBinding, StringBinding, StructBinding,
    TriggerBinding,
};
use crate::cache::ValueCache;
use crate::channel::{ArrayChannel, Channel};
use crate::marshal::{
    read_array_channel, read_optional_string, read_struct, RgbaColor, TransientArray,
    TransientString, TransientStruct,
};
use crate::method::{Command, MethodDispatcher, MethodId};

/// Callback table supplied by the renderer. Every entry may be null.
///
/// Pointers handed to or returned from these callbacks are only valid for
/// the duration of the call.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct RendererCallbacks {
    pub get_int: Option<unsafe extern "C" fn(channel: i32) -> i32>,
    pub set_int: Option<unsafe extern "C" fn(channel: i32, value: i32)>,
    pub get_float: Option<unsafe extern "C" fn(channel: i32) -> f32>,
    pub set_float: Option<unsafe extern "C" fn(channel: i32, value: f32)>,
    pub get_bool: Option<unsafe extern "C" fn(channel: i32) -> bool>,
    pub set_bool: Option<unsafe extern "C" fn(channel: i32, value: bool)>,
    /// Returns a NUL-terminated UTF-8 string or null
    pub get_string: Option<unsafe extern "C" fn(channel: i32) -> *const c_char>,
    pub set_string: Option<unsafe extern "C" fn(channel: i32, value: *const c_char)>,
    pub trigger: Option<unsafe extern "C" fn(channel: i32)>,
    /// Returns a pointer to an [`RgbaColor`] or null
    pub get_struct: Option<unsafe extern "C" fn(channel: i32) -> *const c_void>,
    pub set_struct: Option<unsafe extern "C" fn(channel: i32, value: *const c_void)>,
    /// Returns `array_size(channel)` packed floats or null
    pub get_array: Option<unsafe extern "C" fn(channel: i32) -> *const f32>,
    pub set_array: Option<unsafe extern "C" fn(channel: i32, values: *const f32, count: i32)>,
    pub call_method:
        Option<unsafe extern "C" fn(method: i32, payload: *const c_void, extra: *const c_void)>,
}

/// All bindings for one renderer connection
#[derive(Debug)]
pub struct Bridge {
    ints: Arc<IntBinding>,
    floats: Arc<FloatBinding>,
    bools: Arc<BoolBinding>,
    strings: Arc<StringBinding>,
    triggers: Arc<TriggerBinding>,
    structs: Arc<StructBinding>,
    arrays: Arc<ArrayBinding>,
    methods: Arc<MethodDispatcher>,
    cache: Arc<ValueCache>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(Arc::new(ValueCache::new()))
    }
}

impl Bridge {
    /// Create a disconnected bridge sharing `cache`
    pub fn new(cache: Arc<ValueCache>) -> Self {
        Self {
            ints: Arc::new(IntBinding::new()),
            floats: Arc::new(FloatBinding::new()),
            bools: Arc::new(BoolBinding::new()),
            strings: Arc::new(StringBinding::new()),
            triggers: Arc::new(TriggerBinding::new()),
            structs: Arc::new(StructBinding::new()),
            arrays: Arc::new(ArrayBinding::new()),
            methods: Arc::new(MethodDispatcher::new()),
            cache,
        }
    }

    /// Wire every binding to the renderer's callbacks.
    ///
    /// # Safety
    /// Each non-null callback must stay callable from any thread until
    /// [`Bridge::disconnect`] returns, and must honor the layout documented
    /// on [`RendererCallbacks`].
    pub unsafe fn connect(&self, callbacks: RendererCallbacks) {
        self.reset_wiring();
        self.wire_callbacks(callbacks);
        info!("renderer connected");
    }

    fn wire_callbacks(&self, callbacks: RendererCallbacks) {
        if let Some(get) = callbacks.get_int {
            self.ints.wire_getter(move |c| Some(unsafe { get(c.id()) }));
        }
        if let Some(set) = callbacks.set_int {
            self.ints.wire_setter(move |c, v| unsafe { set(c.id(), v) });
        }
        if let Some(get) = callbacks.get_float {
            self.floats.wire_getter(move |c| Some(unsafe { get(c.id()) }));
        }
        if let Some(set) = callbacks.set_float {
            self.floats.wire_setter(move |c, v| unsafe { set(c.id(), v) });
        }
        if let Some(get) = callbacks.get_bool {
            self.bools.wire_getter(move |c| Some(unsafe { get(c.id()) }));
        }
        if let Some(set) = callbacks.set_bool {
            self.bools.wire_setter(move |c, v| unsafe { set(c.id(), v) });
        }
        if let Some(get) = callbacks.get_string {
            self.strings
                .wire_getter(move |c| unsafe { read_optional_string(get(c.id())) });
        }
        if let Some(set) = callbacks.set_string {
            self.strings.wire_setter(move |c, v: String| {
                let value = TransientString::new(&v);
                unsafe { set(c.id(), value.as_ptr()) }
            });
        }
        if let Some(fire) = callbacks.trigger {
            self.triggers.wire_setter(move |c, ()| unsafe { fire(c.id()) });
        }
        if let Some(get) = callbacks.get_struct {
            self.structs.wire_getter(move |c| {
                let ptr = unsafe { get(c.id()) };
                (!ptr.is_null()).then(|| unsafe { read_struct::<RgbaColor>(ptr) })
            });
        }
        if let Some(set) = callbacks.set_struct {
            self.structs.wire_setter(move |c, v| {
                let value = TransientStruct::new(v);
                unsafe { set(c.id(), value.as_ptr()) }
            });
        }
        if let Some(get) = callbacks.get_array {
            self.arrays.wire_getter(move |c: ArrayChannel| {
                let ptr = unsafe { get(c.id()) };
                (!ptr.is_null()).then(|| unsafe { read_array_channel(c, ptr) })
            });
        }
        if let Some(set) = callbacks.set_array {
            self.arrays.wire_setter(move |c: ArrayChannel, v: Vec<f32>| {
                let value = TransientArray::new(c, &v);
                unsafe { set(c.id(), value.as_ptr(), value.len() as i32) }
            });
        }
        if let Some(call) = callbacks.call_method {
            self.methods.wire(move |method: MethodId, payload, extra| unsafe {
                call(method as i32, payload, extra)
            });
        }
    }

    /// Drop all wiring and forget cached values. Idempotent.
    pub fn disconnect(&self) {
        self.reset_wiring();
        self.cache.clear();
        info!("renderer disconnected");
    }

    fn reset_wiring(&self) {
        self.ints.reset();
        self.floats.reset();
        self.bools.reset();
        self.strings.reset();
        self.triggers.reset();
        self.structs.reset();
        self.arrays.reset();
        self.methods.reset();
    }

    pub fn is_connected(&self) -> bool {
        self.ints.is_wired()
            || self.floats.is_wired()
            || self.bools.is_wired()
            || self.strings.is_wired()
            || self.triggers.is_wired()
            || self.structs.is_wired()
            || self.arrays.is_wired()
            || self.methods.is_wired()
    }

    pub fn ints(&self) -> &Arc<IntBinding> {
        &self.ints
    }

    pub fn floats(&self) -> &Arc<FloatBinding> {
        &self.floats
    }

    pub fn bools(&self) -> &Arc<BoolBinding> {
        &self.bools
    }

    pub fn strings(&self) -> &Arc<StringBinding> {
        &self.strings
    }

    pub fn triggers(&self) -> &Arc<TriggerBinding> {
        &self.triggers
    }

    pub fn structs(&self) -> &Arc<StructBinding> {
        &self.structs
    }

    pub fn arrays(&self) -> &Arc<ArrayBinding> {
        &self.arrays
    }

    pub fn methods(&self) -> &Arc<MethodDispatcher> {
        &self.methods
    }

    pub fn cache(&self) -> &Arc<ValueCache> {
        &self.cache
    }

    /// Accessor for an array channel that mirrors every value it reads or
    /// writes into the shared cache
    pub fn array_binding(&self, channel: ArrayChannel) -> Binding<Vec<f32>> {
        let on_get = Arc::clone(&self.cache);
        let on_set = Arc::clone(&self.cache);
        self.arrays
            .binding(channel)
            .on_get(move |values| {
                if !values.is_empty() {
                    on_get.store(channel, values)
                }
            })
            .on_set(move |values| on_set.store(channel, values))
    }

    /// Last array value that went through [`Bridge::array_binding`]
    pub fn cached_array(&self, channel: ArrayChannel) -> Vec<f32> {
        self.cache.array(channel)
    }

    pub fn dispatch(&self, command: &Command) {
        self.methods.dispatch(command);
    }
}
