//! Typed channel registry
//!
//! Every value the bridge can exchange with the renderer is a named channel in
//! one of seven closed categories. A channel's tag is a small stable integer:
//! new channels are appended and retired tags are never reused, so persisted
//! or foreign references stay valid across releases.

use std::fmt::Debug;
use std::hash::Hash;

/// Wire-kind of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ChannelCategory {
    Int = 0,
    Float = 1,
    Bool = 2,
    String = 3,
    Trigger = 4,
    Struct = 5,
    Array = 6,
}

impl ChannelCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelCategory::Int => "int",
            ChannelCategory::Float => "float",
            ChannelCategory::Bool => "bool",
            ChannelCategory::String => "string",
            ChannelCategory::Trigger => "trigger",
            ChannelCategory::Struct => "struct",
            ChannelCategory::Array => "array",
        }
    }
}

/// A channel identifier belonging to exactly one category
pub trait Channel: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Category this channel set belongs to
    const CATEGORY: ChannelCategory;

    /// Stable wire tag
    fn id(self) -> i32;

    /// Resolve a wire tag, `None` for tags this build does not know
    fn from_id(id: i32) -> Option<Self>;
}

macro_rules! channels {
    (
        $(#[$meta:meta])*
        $name:ident: $category:ident {
            $($(#[$vmeta:meta])* $variant:ident = $id:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $id,)+
        }

        impl $name {
            /// Every channel of this category, in tag order
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];
        }

        impl Channel for $name {
            const CATEGORY: ChannelCategory = ChannelCategory::$category;

            fn id(self) -> i32 {
                self as i32
            }

            fn from_id(id: i32) -> Option<Self> {
                match id {
                    $($id => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

channels! {
    /// 32-bit integer channels
    IntChannel: Int {
        CameraFps = 0,
        QualityLevel = 1,
        TrackingMode = 2,
        LipSyncSource = 3,
        // 4 retired (legacy eye tracking source)
        ExpressionIndex = 5,
        MotionIndex = 6,
    }
}

channels! {
    /// 32-bit float channels
    FloatChannel: Float {
        FieldOfView = 0,
        LightIntensity = 1,
        ShoulderRotationWeight = 2,
        SwivelOffset = 3,
        LipSyncSensitivity = 4,
        EyeBlinkSensitivity = 5,
        AvatarScale = 6,
    }
}

channels! {
    /// Boolean channels
    BoolChannel: Bool {
        UseBlinker = 0,
        UseAutoLookAtCamera = 1,
        UseFullTracking = 2,
        UseShadow = 3,
        HasPerfectSyncBlendShapes = 4,
        UseHandTracking = 5,
    }
}

channels! {
    /// UTF-8 string channels
    StringChannel: String {
        AvatarName = 0,
        LoadedSceneName = 1,
        CurrentExpression = 2,
        CurrentMotion = 3,
    }
}

channels! {
    /// Value-less triggers
    TriggerChannel: Trigger {
        ResetCamera = 0,
        ResetAvatarPosition = 1,
        ReloadAvatar = 2,
        Pause = 3,
        Resume = 4,
    }
}

channels! {
    /// Fixed-layout struct channels (RGBA colors)
    StructChannel: Struct {
        BackgroundColor = 0,
        LightColor = 1,
        EnvironmentLightColor = 2,
    }
}

channels! {
    /// Fixed-size `f32` array channels
    ArrayChannel: Array {
        /// position xyz, rotation xyzw, eye xy, blink lr, mouth, body lean
        HeadTransform = 0,
        /// wrist and index tip xy per hand, plus palm normal xy per hand
        HandKeypoints = 1,
        /// perfect-sync output vector, see `TrackingCatalog::slot_index`
        PerfectSync = 2,
        EyeGaze = 3,
        /// spine and chest rotation xyz
        BodyRotation = 4,
        /// blend-shape mode output vector
        BlendShapeTracking = 5,
        FingerCurls = 6,
    }
}

impl ArrayChannel {
    /// Exact element count of this channel.
    ///
    /// Writer and reader must agree on this number. Nothing on the wire
    /// carries the count, so a mismatch between the two sides is a
    /// programming error, not a recoverable condition.
    pub const fn array_size(self) -> usize {
        match self {
            ArrayChannel::HeadTransform => 13,
            ArrayChannel::HandKeypoints => 12,
            ArrayChannel::PerfectSync => 61,
            ArrayChannel::EyeGaze => 2,
            ArrayChannel::BodyRotation => 6,
            ArrayChannel::BlendShapeTracking => 11,
            ArrayChannel::FingerCurls => 10,
        }
    }
}
