//! Run the five passes over a copy of a module.

use snafu::{ResultExt, ensure};
use tessel_ir::Module;

use crate::context::{LocalSize, PassContext, WorkitemHandler};
use crate::error::{InvalidLocalSizeSnafu, IrSnafu, Result};
use crate::passes::{PASSES, kernel};

/// A module after work-group generation.
#[derive(Debug, Clone)]
pub struct WorkGroupModule {
    pub module: Module,
    pub kernel: String,
    /// Name of the generated work-group entry point.
    pub function: String,
    pub local_size: LocalSize,
    pub handler: WorkitemHandler,
    /// `(pass, changed)` in run order.
    pub changes: Vec<(&'static str, bool)>,
}

pub struct Pipeline;

impl Pipeline {
    /// Transform `kernel` for one group shape. The input module is not modified.
    #[tracing::instrument(skip_all, fields(kernel = %kernel, local_size = ?local_size, handler = %handler))]
    pub fn run(
        module: &Module,
        kernel: &str,
        local_size: LocalSize,
        handler: WorkitemHandler,
    ) -> Result<WorkGroupModule> {
        ensure!(local_size.iter().all(|&n| n > 0), InvalidLocalSizeSnafu { local_size });
        let ctx = PassContext::new(kernel, local_size, handler);
        let mut module = module.clone();
        module.verify().context(IrSnafu)?;
        self::kernel(&module, &ctx)?;

        let mut changes = Vec::with_capacity(PASSES.len());
        for (name, pass) in PASSES {
            let changed = pass(&mut module, &ctx)?;
            tracing::debug!(pass = name, changed, "pass finished");
            changes.push((name, changed));
        }
        module.verify().context(IrSnafu)?;

        Ok(WorkGroupModule {
            module,
            kernel: ctx.kernel.clone(),
            function: ctx.workgroup_function(),
            local_size,
            handler,
            changes,
        })
    }
}
