//! Submitting an N-dimensional kernel launch.
//!
//! [`Launcher::submit_launch`] validates a launch request against the kernel,
//! the queue's device and the wait list, picks a group shape, makes sure the
//! work-group artifact for that shape exists, and queues a command carrying a
//! snapshot of the kernel arguments.
//!
//! Checks run in a fixed order and the first failure is reported:
//!
//! 1. queue, kernel, and that both belong to the same context
//! 2. work dimension within the device limit
//! 3. global size present and non-zero on every used axis
//! 4. every kernel argument set
//! 5. group shape, explicit or derived, within the device limits and dividing
//!    the global size
//! 6. wait list well-formed
//!
//! Nothing is queued when a check fails.

use std::sync::Arc;

use bon::Builder;
use snafu::{OptionExt, ResultExt, ensure};
use tessel_device::Event;
use tessel_schedule::{Pipeline, WorkitemHandler};

use crate::cache::{CacheLayout, WorkGroupCache};
use crate::command::{CommandHandle, CommandKind, CommandNode, NdRangeRun};
use crate::config::{RuntimeConfig, ToolchainConfig};
use crate::error::{
    GenerationSnafu, InvalidCommandQueueSnafu, InvalidContextSnafu, InvalidEventWaitListSnafu,
    InvalidGlobalWorkSizeSnafu, InvalidKernelArgsSnafu, InvalidKernelSnafu, InvalidWorkDimensionSnafu,
    InvalidWorkGroupSizeSnafu, Result,
};
use crate::kernel::Kernel;
use crate::queue::CommandQueue;
use crate::shape::{self, GroupShape};
use crate::toolchain::{CommandToolchain, Toolchain};

/// One launch as the caller describes it.
///
/// Axes beyond `work_dim` are ignored in every array; missing offsets are zero.
#[derive(Debug, Clone, Builder)]
pub struct LaunchRequest<'a> {
    pub queue: Option<&'a Arc<CommandQueue>>,
    pub kernel: Option<&'a Arc<Kernel>>,
    pub work_dim: usize,
    pub global_offset: Option<&'a [usize]>,
    pub global_size: &'a [usize],
    /// Derived from the device limits when absent.
    pub local_size: Option<&'a [usize]>,
    pub wait_list: Option<&'a [Option<Arc<Event>>]>,
}

pub struct Launcher {
    config: RuntimeConfig,
    cache: WorkGroupCache,
    toolchain: Arc<dyn Toolchain>,
}

impl Launcher {
    /// Launcher with the default on-disk cache layout under `config.cache_dir`.
    pub fn new(config: RuntimeConfig, toolchain: Arc<dyn Toolchain>) -> Self {
        let cache = WorkGroupCache::new(CacheLayout::new(&config.cache_dir));
        Self::with_cache(config, cache, toolchain)
    }

    pub fn with_cache(config: RuntimeConfig, cache: WorkGroupCache, toolchain: Arc<dyn Toolchain>) -> Self {
        Self { config, cache, toolchain }
    }

    /// Launcher configured entirely from `TESSEL_*` variables.
    pub fn from_env() -> Self {
        let config = RuntimeConfig::from_env();
        let toolchain = CommandToolchain::new(ToolchainConfig::from_env(), config.cross_compile, config.verbose);
        Self::new(config, Arc::new(toolchain))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn cache(&self) -> &WorkGroupCache {
        &self.cache
    }

    #[tracing::instrument(skip_all, fields(kernel = tracing::field::Empty, work_dim = request.work_dim))]
    pub fn submit_launch(&self, request: LaunchRequest<'_>) -> Result<CommandHandle> {
        let queue = request.queue.context(InvalidCommandQueueSnafu)?;
        let kernel = request.kernel.context(InvalidKernelSnafu)?;
        tracing::Span::current().record("kernel", kernel.name());
        ensure!(
            kernel.context().id() == queue.context().id(),
            InvalidContextSnafu { kernel: kernel.context().id().0, queue: queue.context().id().0 }
        );

        let device = queue.device();
        let work_dim = request.work_dim;
        ensure!(
            (1..=device.max_dimensions()).contains(&work_dim),
            InvalidWorkDimensionSnafu { work_dim, max: device.max_dimensions() }
        );
        ensure!(
            request.global_size.len() >= work_dim && request.global_size[..work_dim].iter().all(|&n| n > 0),
            InvalidGlobalWorkSizeSnafu { global: request.global_size.to_vec() }
        );
        let global = shape::expand(work_dim, request.global_size, 1);
        let offset = shape::expand(work_dim, request.global_offset.unwrap_or_default(), 0);

        if let Some(index) = kernel.first_unset_arg() {
            return InvalidKernelArgsSnafu { index }.fail();
        }

        let local = match request.local_size {
            Some(local) => {
                ensure!(
                    local.len() >= work_dim,
                    InvalidWorkGroupSizeSnafu { local: local.to_vec(), reason: "fewer entries than work_dim" }
                );
                shape::expand(work_dim, local, 1)
            }
            None => shape::derive_local(
                global,
                device.max_group_volume(),
                device.preferred_group_multiple(kernel.name()),
            ),
        };
        shape::validate(device, work_dim, global, local)?;

        let wait_list = match request.wait_list {
            None => Vec::new(),
            Some([]) => return InvalidEventWaitListSnafu { reason: "list is empty" }.fail(),
            Some(events) => events
                .iter()
                .map(|event| event.clone().context(InvalidEventWaitListSnafu { reason: "list contains a null event" }))
                .collect::<Result<Vec<_>>>()?,
        };

        let handler = WorkitemHandler::select(self.config.method, device.is_spmd());
        let program = kernel.program();
        let lock = self.cache.acquire_writer_lock(program, device.id());
        let artifact = self.cache.resolve_or_generate(&lock, kernel, device, local, handler, |output| {
            let generated = Pipeline::run(program.module(), kernel.name(), local, handler).context(GenerationSnafu)?;
            self.toolchain.generate_artifact(&generated, device, output)
        })?;

        let arguments = kernel.snapshot()?;
        let shape = GroupShape::new(work_dim, offset, global, local);
        let run = NdRangeRun::new(Arc::clone(kernel), arguments, shape, artifact, Arc::clone(device));
        let node =
            CommandNode::new(CommandKind::NdRangeKernel(run), queue.id(), wait_list, Event::new(queue.context().id()));
        let handle = node.handle();
        queue.enqueue(node);
        drop(lock);

        tracing::debug!(command.id = handle.id.0, ?local, groups = ?shape.groups, %handler, "launch queued");
        Ok(handle)
    }
}
