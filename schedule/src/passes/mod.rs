//! The work-group transformation passes, in pipeline order.
//!
//! Every pass has the shape `fn(&mut Module, &PassContext) -> Result<bool>`,
//! reports whether it changed the module, and is safe to run again on its
//! own output.

pub mod automatic_locals;
pub mod flatten;
pub mod loop_barriers;
pub mod workitem;
pub mod workitem_alias;

pub use automatic_locals::{automatic_locals, collect_automatic_locals};
pub use flatten::flatten;
pub use loop_barriers::loop_barriers;
pub use workitem::workitem;
pub use workitem_alias::workitem_alias;

use tessel_ir::{Function, Module};

use crate::context::PassContext;
use crate::error::{KernelNotFoundSnafu, Result};

pub type Pass = fn(&mut Module, &PassContext) -> Result<bool>;

/// Passes in the order the pipeline runs them.
pub const PASSES: [(&str, Pass); 5] = [
    ("automatic_locals", automatic_locals),
    ("flatten", flatten),
    ("workitem_alias", workitem_alias),
    ("loop_barriers", loop_barriers),
    ("workitem", workitem),
];

pub(crate) fn kernel<'m>(module: &'m Module, ctx: &PassContext) -> Result<&'m Function> {
    module
        .function(&ctx.kernel)
        .filter(|f| f.is_kernel())
        .ok_or_else(|| KernelNotFoundSnafu { name: &ctx.kernel }.build())
}

pub(crate) fn kernel_mut<'m>(module: &'m mut Module, ctx: &PassContext) -> Result<&'m mut Function> {
    module
        .function_mut(&ctx.kernel)
        .filter(|f| f.is_kernel())
        .ok_or_else(|| KernelNotFoundSnafu { name: &ctx.kernel }.build())
}
