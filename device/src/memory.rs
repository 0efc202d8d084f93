//! Reference-typed kernel arguments: buffers, images and samplers.
//!
//! These are shared through `Arc`; cloning the `Arc` is a retain and dropping
//! it is a release. A launch keeps its arguments alive by holding clones.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use snafu::OptionExt;
use strum::{Display, EnumIter};

use crate::device::{Context, ContextId, Device, DeviceId};
use crate::error::{MissingBindingSnafu, NotAnImageSnafu, Result};

static NEXT_MEM: AtomicU64 = AtomicU64::new(1);
static NEXT_SAMPLER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemId(pub u64);

/// Opaque device-side address of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
#[strum(serialize_all = "snake_case")]
pub enum MemAccess {
    #[default]
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemFlags {
    pub access: MemAccess,
    /// Storage lives in host memory supplied by the caller.
    pub use_host_ptr: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ChannelOrder {
    R,
    Rx,
    A,
    Intensity,
    Luminance,
    Rg,
    Rgx,
    Ra,
    Rgb,
    Rgbx,
    Rgba,
    Argb,
    Bgra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ChannelType {
    SnormInt8,
    SnormInt16,
    UnormInt8,
    UnormInt16,
    UnormShort565,
    UnormShort555,
    UnormInt101010,
    SignedInt8,
    SignedInt16,
    SignedInt32,
    UnsignedInt8,
    UnsignedInt16,
    UnsignedInt32,
    HalfFloat,
    Float,
}

impl ChannelType {
    /// Bytes per channel element.
    pub fn element_size(self) -> usize {
        use ChannelType::*;
        match self {
            SnormInt8 | UnormInt8 | SignedInt8 | UnsignedInt8 => 1,
            SnormInt16 | UnormInt16 | SignedInt16 | UnsignedInt16 | UnormShort555 | UnormShort565 | HalfFloat => 2,
            SignedInt32 | UnsignedInt32 | Float | UnormInt101010 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageFormat {
    pub order: ChannelOrder,
    pub data_type: ChannelType,
}

impl ImageFormat {
    pub fn new(order: ChannelOrder, data_type: ChannelType) -> Self {
        Self { order, data_type }
    }

    /// Channels the executor-side image exposes. Packed orders are one channel.
    pub fn channel_count(&self) -> usize {
        match self.order {
            ChannelOrder::Rgb | ChannelOrder::Rgbx | ChannelOrder::R | ChannelOrder::Rx | ChannelOrder::A => 1,
            _ => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageDesc {
    pub format: ImageFormat,
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub row_pitch: usize,
    pub slice_pitch: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemKind {
    Buffer,
    Image(ImageDesc),
}

/// Image descriptor handed to the executor for an image argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceImage {
    pub data: DeviceHandle,
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub row_pitch: usize,
    pub slice_pitch: usize,
    pub format: ImageFormat,
    pub num_channels: usize,
    pub elem_size: usize,
}

#[derive(Debug)]
pub struct MemObject {
    id: MemId,
    context: ContextId,
    size: usize,
    flags: MemFlags,
    kind: MemKind,
    bindings: RwLock<HashMap<DeviceId, DeviceHandle>>,
}

impl MemObject {
    pub fn buffer(context: &Context, size: usize, flags: MemFlags) -> Arc<Self> {
        Self::with_kind(context, size, flags, MemKind::Buffer)
    }

    pub fn image(context: &Context, desc: ImageDesc, flags: MemFlags) -> Arc<Self> {
        let depth = desc.depth.max(1);
        let size = desc.row_pitch * desc.height.max(1) * depth;
        Self::with_kind(context, size, flags, MemKind::Image(desc))
    }

    fn with_kind(context: &Context, size: usize, flags: MemFlags, kind: MemKind) -> Arc<Self> {
        Arc::new(Self {
            id: MemId(NEXT_MEM.fetch_add(1, Ordering::Relaxed)),
            context: context.id(),
            size,
            flags,
            kind,
            bindings: RwLock::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> MemId {
        self.id
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn flags(&self) -> MemFlags {
        self.flags
    }

    pub fn kind(&self) -> MemKind {
        self.kind
    }

    pub fn is_image(&self) -> bool {
        matches!(self.kind, MemKind::Image(_))
    }

    /// Record where the object lives on `device`.
    pub fn bind(&self, device: &Device, handle: DeviceHandle) {
        self.bindings.write().insert(device.id(), handle);
    }

    pub fn device_binding(&self, device: &Device) -> Result<DeviceHandle> {
        self.bindings
            .read()
            .get(&device.id())
            .copied()
            .context(MissingBindingSnafu { mem: self.id.0, device: device.id().0 })
    }

    pub fn device_image(&self, device: &Device) -> Result<DeviceImage> {
        let MemKind::Image(desc) = self.kind else {
            return NotAnImageSnafu { mem: self.id.0 }.fail();
        };
        Ok(DeviceImage {
            data: self.device_binding(device)?,
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            row_pitch: desc.row_pitch,
            slice_pitch: desc.slice_pitch,
            format: desc.format,
            num_channels: desc.format.channel_count(),
            elem_size: desc.format.data_type.element_size(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum AddressingMode {
    None,
    #[default]
    ClampToEdge,
    Clamp,
    Repeat,
    MirroredRepeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SamplerId(pub u64);

#[derive(Debug)]
pub struct Sampler {
    id: SamplerId,
    context: ContextId,
    pub normalized_coords: bool,
    pub addressing: AddressingMode,
    pub filter: FilterMode,
}

impl Sampler {
    pub fn new(context: &Context, normalized_coords: bool, addressing: AddressingMode, filter: FilterMode) -> Arc<Self> {
        Arc::new(Self {
            id: SamplerId(NEXT_SAMPLER.fetch_add(1, Ordering::Relaxed)),
            context: context.id(),
            normalized_coords,
            addressing,
            filter,
        })
    }

    pub fn id(&self) -> SamplerId {
        self.id
    }

    pub fn context(&self) -> ContextId {
        self.context
    }
}
