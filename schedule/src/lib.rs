//! Work-group generation for tessel kernels.
//!
//! A kernel is written for one worker. [`Pipeline::run`] turns it into a
//! function that executes every worker of a group while honoring barriers:
//!
//! 1. [`passes::automatic_locals`] - group-local variables become parameters
//! 2. [`passes::flatten`] - helpers that read worker identity are force-inlined
//! 3. [`passes::workitem_alias`] - accesses are annotated with their per-worker pattern
//! 4. [`passes::loop_barriers`] - loops containing barriers get entry and latch barriers
//! 5. [`passes::workitem`] - the work-group function is generated
//!
//! Passes take the module and a [`PassContext`] explicitly; there is no shared
//! state between runs.

pub mod alias;
pub mod context;
pub mod error;
pub mod passes;
pub mod pipeline;


pub use alias::{AliasResult, WorkerAccess, work_item_alias};
pub use context::{LocalSize, PassContext, WorkGroupMethod, WorkitemHandler, workgroup_function_name};
pub use error::{Error, Result};
pub use passes::collect_automatic_locals;
pub use pipeline::{Pipeline, WorkGroupModule};
