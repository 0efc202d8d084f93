//! Error types for the launch path.

use std::path::PathBuf;

use snafu::Snafu;
use strum::Display;

use crate::args::ArgKind;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse grouping of [`Error`] variants for callers that map errors to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    InvalidArgument,
    InvalidWorkSpec,
    GenerationFailure,
    ResourceExhaustion,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("no command queue given"))]
    InvalidCommandQueue,

    #[snafu(display("no kernel given"))]
    InvalidKernel,

    /// Kernel and queue were created in different contexts.
    #[snafu(display("kernel context {kernel} does not match queue context {queue}"))]
    InvalidContext { kernel: u64, queue: u64 },

    #[snafu(display("work dimension {work_dim} outside 1..={max}"))]
    InvalidWorkDimension { work_dim: usize, max: usize },

    #[snafu(display("invalid global work size {global:?}"))]
    InvalidGlobalWorkSize { global: Vec<usize> },

    #[snafu(display("kernel argument {index} is not set"))]
    InvalidKernelArgs { index: usize },

    #[snafu(display("invalid work-group size {local:?}: {reason}"))]
    InvalidWorkGroupSize { local: Vec<usize>, reason: String },

    #[snafu(display("local size {size} on axis {axis} exceeds device limit {max}"))]
    InvalidWorkItemSize { axis: usize, size: usize, max: usize },

    #[snafu(display("invalid event wait list: {reason}"))]
    InvalidEventWaitList { reason: &'static str },

    #[snafu(display("argument index {index} out of range for {count} arguments"))]
    InvalidArgIndex { index: usize, count: usize },

    #[snafu(display("argument {index} cannot take {size} bytes"))]
    InvalidArgSize { index: usize, size: usize },

    #[snafu(display("argument {index} expects a {expected} value"))]
    InvalidArgValue { index: usize, expected: ArgKind },

    #[snafu(display("failed to allocate {size} bytes of host memory"))]
    OutOfHostMemory { size: usize },

    #[snafu(display("kernel '{name}' not found in program"))]
    KernelNotFound { name: String },

    #[snafu(display("program module is malformed: {source}"))]
    InvalidProgram { source: tessel_ir::Error },

    #[snafu(display("device error: {source}"))]
    Device { source: tessel_device::Error },

    /// The work-group pipeline rejected the kernel.
    #[snafu(display("work-group generation failed: {source}"))]
    Generation { source: tessel_schedule::Error },

    #[snafu(display("failed to run {program}: {source}"))]
    ToolchainSpawn { program: String, source: std::io::Error },

    #[snafu(display("{program} exited with {status}:\n{stderr}"))]
    ToolchainFailed { program: String, status: String, stderr: String },

    #[snafu(display("cache I/O on {}: {source}", path.display()))]
    CacheIo { path: PathBuf, source: std::io::Error },
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidWorkDimension { .. }
            | Error::InvalidGlobalWorkSize { .. }
            | Error::InvalidWorkGroupSize { .. }
            | Error::InvalidWorkItemSize { .. } => ErrorCategory::InvalidWorkSpec,
            Error::Generation { .. }
            | Error::ToolchainSpawn { .. }
            | Error::ToolchainFailed { .. }
            | Error::CacheIo { .. } => ErrorCategory::GenerationFailure,
            Error::OutOfHostMemory { .. } => ErrorCategory::ResourceExhaustion,
            Error::InvalidCommandQueue
            | Error::InvalidKernel
            | Error::InvalidContext { .. }
            | Error::InvalidKernelArgs { .. }
            | Error::InvalidEventWaitList { .. }
            | Error::InvalidArgIndex { .. }
            | Error::InvalidArgSize { .. }
            | Error::InvalidArgValue { .. }
            | Error::KernelNotFound { .. }
            | Error::InvalidProgram { .. }
            | Error::Device { .. } => ErrorCategory::InvalidArgument,
        }
    }
}
