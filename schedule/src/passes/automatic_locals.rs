//! Group-local variables become trailing kernel parameters.
//!
//! A `local` alloca inside the kernel, or a `local` global owned by the kernel
//! and used nowhere else, is replaced by a `LocalBuffer` parameter. The
//! runtime allocates one buffer per launched group and binds it there, so
//! every worker of a group shares it and separate launches never do.

use tessel_ir::{AddrSpace, AutomaticLocal, Function, InstrKind, Module, Operand, Param, ParamKind, ValueId};

use super::{kernel, kernel_mut};
use crate::context::PassContext;
use crate::error::{KernelNotFoundSnafu, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Alloca(ValueId),
    Global(String),
}

#[derive(Debug, Clone)]
struct Candidate {
    source: Source,
    local: AutomaticLocal,
}

fn candidates(module: &Module, kernel: &Function) -> Vec<Candidate> {
    let allocas = kernel.instrs().filter_map(|(_, _, instr)| match &instr.kind {
        InstrKind::Alloca { name, space: AddrSpace::Local, size, align } => Some(Candidate {
            source: Source::Alloca(instr.result?),
            local: AutomaticLocal { name: name.clone(), size: *size, align: *align },
        }),
        _ => None,
    });

    let globals = module
        .globals()
        .iter()
        .filter(|g| g.space == AddrSpace::Local && g.owner.as_deref() == Some(kernel.name.as_str()))
        .filter(|g| {
            module.functions().iter().filter(|f| f.name != kernel.name).all(|f| !f.references_global(&g.name))
        })
        .map(|g| Candidate {
            source: Source::Global(g.name.clone()),
            local: AutomaticLocal { name: g.name.clone(), size: g.size, align: g.align },
        });

    allocas.chain(globals).collect()
}

/// The automatic locals a kernel has, or will have once the pass runs.
/// Already-promoted locals come first.
pub fn collect_automatic_locals(module: &Module, kernel: &str) -> Result<Vec<AutomaticLocal>> {
    let func = module
        .function(kernel)
        .filter(|f| f.is_kernel())
        .ok_or_else(|| KernelNotFoundSnafu { name: kernel }.build())?;
    let mut locals = func.automatic_locals.clone();
    locals.extend(candidates(module, func).into_iter().map(|c| c.local));
    Ok(locals)
}

pub fn automatic_locals(module: &mut Module, ctx: &PassContext) -> Result<bool> {
    let found = candidates(module, kernel(module, ctx)?);
    if found.is_empty() {
        return Ok(false);
    }

    for candidate in &found {
        if let Source::Global(name) = &candidate.source {
            module.remove_global(name);
        }
    }

    let kernel = kernel_mut(module, ctx)?;
    for Candidate { source, local } in found {
        let index = kernel.push_param(Param {
            name: local.name.clone(),
            type_name: "local".into(),
            kind: ParamKind::LocalBuffer { size: local.size },
        });
        let from = match source {
            Source::Alloca(value) => {
                for block in &mut kernel.blocks {
                    block.instrs.retain(|instr| instr.result != Some(value));
                }
                Operand::Value(value)
            }
            Source::Global(name) => Operand::Global(name),
        };
        kernel.replace_uses(&from, &Operand::Param(index));
        tracing::debug!(kernel = %kernel.name, local = %local.name, size = local.size, param = index, "promoted automatic local");
        kernel.automatic_locals.push(local);
    }
    Ok(true)
}
