//! Kernel launch path for tessel.
//!
//! A [`Program`] wraps a verified module; [`Kernel`]s created from it carry
//! argument bindings. [`Launcher::submit_launch`] validates a launch, selects
//! a group shape, resolves the work-group artifact through the
//! [`WorkGroupCache`] (generating it with the schedule pipeline and a
//! [`Toolchain`] on a miss) and queues a [`CommandNode`] on a
//! [`CommandQueue`].
//!
//! # Configuration
//!
//! [`RuntimeConfig`] and [`ToolchainConfig`] read `TESSEL_*` environment
//! variables; see their `from_env` constructors.

pub mod args;
pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod kernel;
pub mod launch;
pub mod queue;
pub mod shape;
pub mod toolchain;

#[cfg(test)]
pub mod test;

pub use args::{ArgInfo, ArgKind, ArgSlot, ArgValue, MAX_EXTENDED_ALIGNMENT};
pub use cache::{CacheLayout, CacheLock, PathService, WorkGroupCache};
pub use command::{CommandHandle, CommandId, CommandKind, CommandNode, ExecArg, NdRangeRun};
pub use config::{RuntimeConfig, ToolchainConfig};
pub use error::{Error, ErrorCategory, Result};
pub use kernel::{Kernel, KernelId, Program, ProgramId};
pub use launch::{LaunchRequest, Launcher};
pub use queue::{CommandQueue, QueueId};
pub use shape::GroupShape;
pub use toolchain::{CommandToolchain, Toolchain};
