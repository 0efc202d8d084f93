//! Device descriptors and contexts.
//!
//! A [`Device`] only carries the limits the launch path validates against; how
//! devices are discovered is someone else's concern.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bon::bon;
use snafu::ensure;

use crate::error::{ForeignDeviceSnafu, Result};

static NEXT_DEVICE: AtomicU64 = AtomicU64::new(1);
static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Process-unique device identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-unique context identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

/// Size in bytes of a buffer/image/sampler handle on the host.
pub const HOST_HANDLE_SIZE: usize = std::mem::size_of::<usize>();

#[derive(Debug, Clone)]
pub struct Device {
    id: DeviceId,
    name: String,
    max_dimensions: usize,
    max_group_volume: usize,
    max_item_sizes: [usize; 3],
    preferred_multiple: usize,
    kernel_multiples: HashMap<String, usize>,
    handle_size: usize,
    spmd: bool,
}

#[bon]
impl Device {
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        #[builder(default = 3)] max_dimensions: usize,
        #[builder(default = 4096)] max_group_volume: usize,
        #[builder(default = [4096; 3])] max_item_sizes: [usize; 3],
        #[builder(default = 8)] preferred_multiple: usize,
        #[builder(default)] kernel_multiples: HashMap<String, usize>,
        #[builder(default = HOST_HANDLE_SIZE)] handle_size: usize,
        #[builder(default = false)] spmd: bool,
    ) -> Self {
        Self {
            id: DeviceId(NEXT_DEVICE.fetch_add(1, Ordering::Relaxed)),
            name,
            max_dimensions: max_dimensions.clamp(1, 3),
            max_group_volume,
            max_item_sizes,
            preferred_multiple: preferred_multiple.max(1),
            kernel_multiples,
            handle_size,
            spmd,
        }
    }
}

impl Device {
    /// The host CPU with generous limits.
    pub fn host() -> Arc<Self> {
        Arc::new(Self::builder().name("host").build())
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_dimensions(&self) -> usize {
        self.max_dimensions
    }

    pub fn max_group_volume(&self) -> usize {
        self.max_group_volume
    }

    pub fn max_item_sizes(&self) -> [usize; 3] {
        self.max_item_sizes
    }

    /// Group size multiple that keeps the kernel's lanes fully vectorized.
    /// Never zero.
    pub fn preferred_group_multiple(&self, kernel: &str) -> usize {
        self.kernel_multiples.get(kernel).copied().map_or(self.preferred_multiple, |m| m.max(1))
    }

    pub fn handle_size(&self) -> usize {
        self.handle_size
    }

    /// Executes one worker per hardware lane.
    pub fn is_spmd(&self) -> bool {
        self.spmd
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Device {}

/// A set of devices that objects can be shared between.
#[derive(Debug)]
pub struct Context {
    id: ContextId,
    devices: Vec<Arc<Device>>,
}

impl Context {
    pub fn new(devices: impl IntoIterator<Item = Arc<Device>>) -> Arc<Self> {
        Arc::new(Self {
            id: ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed)),
            devices: devices.into_iter().collect(),
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn devices(&self) -> &[Arc<Device>] {
        &self.devices
    }

    pub fn contains(&self, device: &Device) -> bool {
        self.devices.iter().any(|d| d.id == device.id)
    }

    pub fn ensure_contains(&self, device: &Device) -> Result<()> {
        ensure!(self.contains(device), ForeignDeviceSnafu { device: device.id.0, context: self.id.0 });
        Ok(())
    }
}
