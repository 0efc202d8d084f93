//! Force inlining of every helper that can observe worker identity.
//!
//! Reads of context globals must end up in the kernel body itself so that the
//! work-group generator can see identity-dependent control flow. Starting from
//! the functions that load a context global, callers are followed transitively.

use std::collections::HashSet;

use tessel_ir::{ContextVar, InlineHint, Module};

use crate::context::PassContext;
use crate::error::Result;

pub fn flatten(module: &mut Module, _ctx: &PassContext) -> Result<bool> {
    let mut worklist: Vec<String> = module
        .functions()
        .iter()
        .filter(|f| !f.is_declaration())
        .filter(|f| ContextVar::all().any(|var| f.references_global(&var.symbol())))
        .map(|f| f.name.clone())
        .collect();

    let mut visited = HashSet::new();
    let mut changed = false;
    while let Some(name) = worklist.pop() {
        if !visited.insert(name.clone()) {
            continue;
        }
        if let Some(func) = module.function_mut(&name)
            && !func.is_entry_point()
            && func.inline != InlineHint::Always
        {
            tracing::debug!(function = %name, previous = %func.inline, "forcing inline");
            func.inline = InlineHint::Always;
            changed = true;
        }
        let callers = module.functions().iter().filter(|f| f.callees().any(|callee| callee == name));
        worklist.extend(callers.map(|f| f.name.clone()).filter(|caller| !visited.contains(caller)));
    }
    Ok(changed)
}
