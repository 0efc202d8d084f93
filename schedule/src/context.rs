//! Inputs shared by every pass of one pipeline run.

use strum::{Display, EnumString};
use tessel_ir::BARRIER_FUNCTION;

/// Work-group tile dimensions `[x, y, z]`.
pub type LocalSize = [usize; 3];

/// How the per-group function is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
#[strum(serialize_all = "lowercase")]
pub enum WorkitemHandler {
    /// Nested loops over the local id space, one loop nest per barrier region.
    #[default]
    Loops,
    /// One hardware lane per worker; local ids come from the lane-id intrinsic.
    Spmd,
}

impl WorkitemHandler {
    /// Pick the handler for a kernel. SPMD devices always get [`WorkitemHandler::Spmd`].
    pub fn select(method: WorkGroupMethod, device_is_spmd: bool) -> Self {
        match method {
            _ if device_is_spmd => WorkitemHandler::Spmd,
            WorkGroupMethod::Spmd => WorkitemHandler::Spmd,
            WorkGroupMethod::Loops | WorkGroupMethod::LoopVec => WorkitemHandler::Loops,
        }
    }

    /// File name of the linked artifact produced for this handler.
    pub fn artifact_name(self) -> &'static str {
        match self {
            WorkitemHandler::Loops => "parallel.so",
            WorkitemHandler::Spmd => "parallel_spmd.so",
        }
    }
}

/// User-facing work-group generation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WorkGroupMethod {
    #[default]
    Loops,
    /// Loops, with the vectorizer expected to widen across the x loop.
    LoopVec,
    Spmd,
}

/// Everything a pass needs besides the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassContext {
    pub kernel: String,
    pub local_size: LocalSize,
    /// Name of the barrier builtin.
    pub barrier: String,
    pub handler: WorkitemHandler,
}

impl PassContext {
    pub fn new(kernel: impl Into<String>, local_size: LocalSize, handler: WorkitemHandler) -> Self {
        Self { kernel: kernel.into(), local_size, barrier: BARRIER_FUNCTION.to_string(), handler }
    }

    pub fn volume(&self) -> usize {
        self.local_size.iter().product()
    }

    /// Name of the generated work-group function.
    pub fn workgroup_function(&self) -> String {
        workgroup_function_name(&self.kernel)
    }
}

pub fn workgroup_function_name(kernel: &str) -> String {
    format!("_tessel_workgroup_{kernel}")
}
