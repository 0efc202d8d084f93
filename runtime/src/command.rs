//! Command nodes handed from the launch path to an executor.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use snafu::ResultExt;
use tessel_device::{CommandStatus, Device, DeviceHandle, DeviceImage, Event, MemObject, SamplerId};

use crate::args::{ArgKind, ArgSlot};
use crate::error::{DeviceSnafu, Result};
use crate::kernel::Kernel;
use crate::queue::QueueId;
use crate::shape::GroupShape;

static NEXT_COMMAND: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

/// Everything an executor needs to run one kernel launch.
#[derive(Debug)]
pub struct NdRangeRun {
    kernel: Arc<Kernel>,
    arguments: Vec<ArgSlot>,
    retained_memory: Vec<Arc<MemObject>>,
    shape: GroupShape,
    artifact: PathBuf,
    device: Arc<Device>,
}

/// An argument resolved for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecArg<'a> {
    Bytes(&'a [u8]),
    Buffer(Option<DeviceHandle>),
    Image(DeviceImage),
    Sampler(Option<SamplerId>),
    /// Size of a per-group local allocation.
    Local(usize),
}

impl NdRangeRun {
    pub fn new(
        kernel: Arc<Kernel>,
        arguments: Vec<ArgSlot>,
        shape: GroupShape,
        artifact: PathBuf,
        device: Arc<Device>,
    ) -> Self {
        let retained_memory = crate::args::retained_memory(&arguments, kernel.signature().len());
        Self { kernel, arguments, retained_memory, shape, artifact, device }
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn arguments(&self) -> &[ArgSlot] {
        &self.arguments
    }

    pub fn retained_memory(&self) -> &[Arc<MemObject>] {
        &self.retained_memory
    }

    pub fn shape(&self) -> &GroupShape {
        &self.shape
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Arguments in the form the generated work-group function takes them.
    pub fn exec_args(&self) -> Result<Vec<ExecArg<'_>>> {
        self.arguments
            .iter()
            .map(|slot| {
                Ok(match slot.kind {
                    ArgKind::Value => ExecArg::Bytes(slot.bytes().unwrap_or_default()),
                    ArgKind::LocalBuffer => ExecArg::Local(slot.size),
                    ArgKind::Pointer => ExecArg::Buffer(
                        slot.memory().map(|m| m.device_binding(&self.device)).transpose().context(DeviceSnafu)?,
                    ),
                    ArgKind::Image => match slot.memory() {
                        Some(mem) => ExecArg::Image(mem.device_image(&self.device).context(DeviceSnafu)?),
                        None => ExecArg::Buffer(None),
                    },
                    ArgKind::Sampler => ExecArg::Sampler(slot.sampler().map(|s| s.id())),
                })
            })
            .collect()
    }
}

#[derive(Debug)]
pub enum CommandKind {
    NdRangeKernel(NdRangeRun),
}

/// Caller's view of a submitted command.
#[derive(Debug, Clone)]
pub struct CommandHandle {
    pub id: CommandId,
    pub event: Arc<Event>,
}

impl CommandHandle {
    pub fn wait(&self) -> tessel_device::Result<()> {
        self.event.wait()
    }
}

#[derive(Debug)]
pub struct CommandNode {
    id: CommandId,
    kind: CommandKind,
    queue: QueueId,
    wait_list: Vec<Arc<Event>>,
    event: Arc<Event>,
}

impl CommandNode {
    pub fn new(kind: CommandKind, queue: QueueId, wait_list: Vec<Arc<Event>>, event: Arc<Event>) -> Self {
        Self { id: CommandId(NEXT_COMMAND.fetch_add(1, Ordering::Relaxed)), kind, queue, wait_list, event }
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn run(&self) -> Option<&NdRangeRun> {
        match &self.kind {
            CommandKind::NdRangeKernel(run) => Some(run),
        }
    }

    pub fn queue(&self) -> QueueId {
        self.queue
    }

    pub fn wait_list(&self) -> &[Arc<Event>] {
        &self.wait_list
    }

    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }

    pub fn handle(&self) -> CommandHandle {
        CommandHandle { id: self.id, event: Arc::clone(&self.event) }
    }

    /// Every event this command waits on has finished.
    pub fn is_ready(&self) -> bool {
        self.wait_list.iter().all(|e| e.is_complete())
    }

    /// Finish the command: retained kernel, arguments and memory objects are
    /// released and the completion event fires.
    pub fn complete(self, outcome: std::result::Result<(), String>) {
        let Self { id, kind, event, .. } = self;
        drop(kind);
        let status = match outcome {
            Ok(()) => CommandStatus::Complete,
            Err(message) => CommandStatus::Failed(message),
        };
        tracing::debug!(command.id = id.0, status = %status, "command finished");
        event.set_status(status);
    }
}
