//! Value binding transport
//!
//! A [`ValueBinding`] is a swappable get/set indirection for one channel
//! category. Until something wires it, reads return the value type's default
//! and writes are discarded, so the app keeps working with no renderer
//! attached (early startup, preview, after teardown).
//!
//! Wiring is guarded by a lock because the renderer connects and tears down
//! on its own schedule while the tracking and UI threads keep reading. The
//! lock is only held long enough to clone the wired function; the call itself
//! runs unlocked.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::channel::{
    ArrayChannel, BoolChannel, Channel, FloatChannel, IntChannel, StringChannel, StructChannel,
    TriggerChannel,
};
use crate::marshal::RgbaColor;

type Getter<V, C> = Arc<dyn Fn(C) -> Option<V> + Send + Sync>;
type Setter<V, C> = Arc<dyn Fn(C, V) + Send + Sync>;

struct Wiring<V, C> {
    getter: Option<Getter<V, C>>,
    setter: Option<Setter<V, C>>,
}

/// Swappable get/set transport for one channel category.
///
/// Both directions live behind one lock, so a reader never observes a
/// binding that is half wired or half reset.
pub struct ValueBinding<V, C> {
    wiring: RwLock<Wiring<V, C>>,
    _channel: PhantomData<fn(C)>,
}

pub type IntBinding = ValueBinding<i32, IntChannel>;
pub type FloatBinding = ValueBinding<f32, FloatChannel>;
pub type BoolBinding = ValueBinding<bool, BoolChannel>;
pub type StringBinding = ValueBinding<String, StringChannel>;
pub type TriggerBinding = ValueBinding<(), TriggerChannel>;
pub type StructBinding = ValueBinding<RgbaColor, StructChannel>;
pub type ArrayBinding = ValueBinding<Vec<f32>, ArrayChannel>;

impl<V, C> Default for ValueBinding<V, C>
where
    V: Clone + Default + Send + Sync + 'static,
    C: Channel,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, C> fmt::Debug for ValueBinding<V, C>
where
    C: Channel,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wiring = self.wiring.read();
        f.debug_struct("ValueBinding")
            .field("category", &C::CATEGORY)
            .field("getter", &wiring.getter.is_some())
            .field("setter", &wiring.setter.is_some())
            .finish()
    }
}

impl<V, C> ValueBinding<V, C>
where
    V: Clone + Default + Send + Sync + 'static,
    C: Channel,
{
    /// Create an unwired binding
    pub fn new() -> Self {
        Self {
            wiring: RwLock::new(Wiring {
                getter: None,
                setter: None,
            }),
            _channel: PhantomData,
        }
    }

    /// Wire both directions at once
    pub fn wire<G, S>(&self, get: G, set: S)
    where
        G: Fn(C) -> Option<V> + Send + Sync + 'static,
        S: Fn(C, V) + Send + Sync + 'static,
    {
        let mut wiring = self.wiring.write();
        wiring.getter = Some(Arc::new(get));
        wiring.setter = Some(Arc::new(set));
        debug!(category = C::CATEGORY.as_str(), "binding wired");
    }

    pub fn wire_getter<G>(&self, get: G)
    where
        G: Fn(C) -> Option<V> + Send + Sync + 'static,
    {
        self.wiring.write().getter = Some(Arc::new(get));
        debug!(category = C::CATEGORY.as_str(), "getter wired");
    }

    pub fn wire_setter<S>(&self, set: S)
    where
        S: Fn(C, V) + Send + Sync + 'static,
    {
        self.wiring.write().setter = Some(Arc::new(set));
        debug!(category = C::CATEGORY.as_str(), "setter wired");
    }

    /// Whether either direction is wired
    pub fn is_wired(&self) -> bool {
        let wiring = self.wiring.read();
        wiring.getter.is_some() || wiring.setter.is_some()
    }

    /// Read a channel, falling back to `V::default()` when unwired or when the
    /// other side reports no value.
    pub fn get(&self, channel: C) -> V {
        let getter = self.wiring.read().getter.clone();
        getter.and_then(|get| get(channel)).unwrap_or_default()
    }

    /// Write a channel; discarded when unwired.
    pub fn set(&self, channel: C, value: V) {
        let setter = self.wiring.read().setter.clone();
        if let Some(set) = setter {
            set(channel, value);
        }
    }

    /// A setter bound to one channel.
    ///
    /// The returned closure resolves the wiring on every call, so it keeps
    /// working across reconnects.
    pub fn setter(self: &Arc<Self>, channel: C) -> impl Fn(V) + Send + Sync + 'static {
        let binding = Arc::clone(self);
        move |value| binding.set(channel, value)
    }

    /// A read/write accessor for one channel
    pub fn binding(self: &Arc<Self>, channel: C) -> Binding<V> {
        let reader = Arc::clone(self);
        let writer = Arc::clone(self);
        Binding::new(move || reader.get(channel), move |value| writer.set(channel, value))
    }

    /// Drop all wiring. Idempotent.
    pub fn reset(&self) {
        let mut wiring = self.wiring.write();
        wiring.getter = None;
        wiring.setter = None;
        debug!(category = C::CATEGORY.as_str(), "binding reset");
    }
}

impl ValueBinding<(), TriggerChannel> {
    /// Fire a trigger
    pub fn trigger(&self, channel: TriggerChannel) {
        self.set(channel, ());
    }
}

/// A read/write accessor pair, suitable for handing to UI code
pub struct Binding<V> {
    get: Arc<dyn Fn() -> V + Send + Sync>,
    set: Arc<dyn Fn(V) + Send + Sync>,
}

impl<V> Clone for Binding<V> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
        }
    }
}

impl<V> fmt::Debug for Binding<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding").finish_non_exhaustive()
    }
}

impl<V: 'static> Binding<V> {
    pub fn new<G, S>(get: G, set: S) -> Self
    where
        G: Fn() -> V + Send + Sync + 'static,
        S: Fn(V) + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            set: Arc::new(set),
        }
    }

    /// A binding that always reads `value` and ignores writes
    pub fn constant(value: V) -> Self
    where
        V: Clone + Send + Sync,
    {
        Self::new(move || value.clone(), |_| {})
    }

    pub fn get(&self) -> V {
        (self.get)()
    }

    pub fn set(&self, value: V) {
        (self.set)(value)
    }

    /// Run `hook` on every value read through this binding
    pub fn on_get<H>(self, hook: H) -> Self
    where
        H: Fn(&V) + Send + Sync + 'static,
    {
        let get = self.get;
        Self {
            get: Arc::new(move || {
                let value = get();
                hook(&value);
                value
            }),
            set: self.set,
        }
    }

    /// Run `hook` on every value written through this binding, before it is forwarded
    pub fn on_set<H>(self, hook: H) -> Self
    where
        H: Fn(&V) + Send + Sync + 'static,
    {
        let set = self.set;
        Self {
            get: self.get,
            set: Arc::new(move |value| {
                hook(&value);
                set(value)
            }),
        }
    }

    /// Project a sub-field of the bound value.
    ///
    /// Writes are read-modify-write on the parent: read the whole value,
    /// replace the field, write the whole value back.
    pub fn field<F, G, S>(&self, get_field: G, set_field: S) -> Binding<F>
    where
        F: 'static,
        G: Fn(&V) -> F + Send + Sync + 'static,
        S: Fn(&mut V, F) + Send + Sync + 'static,
    {
        let read_parent = Arc::clone(&self.get);
        let modify_parent = Arc::clone(&self.get);
        let write_parent = Arc::clone(&self.set);
        Binding::new(
            move || get_field(&read_parent()),
            move |field| {
                let mut parent = modify_parent();
                set_field(&mut parent, field);
                write_parent(parent);
            },
        )
    }
}
