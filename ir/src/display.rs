//! Textual form of the IR.
//!
//! This is what gets written next to a generated artifact and handed to the
//! external code generator, so it must be deterministic.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::module::{
    AccessBase, Block, Function, FunctionKind, GlobalVar, Instr, InstrKind, Module, Operand, ParamKind, Terminator,
};
use crate::types::InlineHint;

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(v) => write!(f, "%{}", v.0),
            Operand::Param(i) => write!(f, "%arg{i}"),
            Operand::Global(name) => write!(f, "@{name}"),
            Operand::Const(c) => write!(f, "{c}"),
        }
    }
}

impl Display for ParamKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Scalar { size } => write!(f, "scalar({size})"),
            ParamKind::Pointer { space } => write!(f, "ptr {space}"),
            ParamKind::LocalBuffer { size } => write!(f, "local({size})"),
            ParamKind::Image => f.write_str("image"),
            ParamKind::Sampler => f.write_str("sampler"),
        }
    }
}

impl Display for Instr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(result) = self.result {
            write!(f, "%{} = ", result.0)?;
        }
        match &self.kind {
            InstrKind::Alloca { name, space, size, align } => {
                write!(f, "alloca {space} {size}, align {align} ; {name}")?
            }
            InstrKind::Load { ptr } => write!(f, "load {ptr}")?,
            InstrKind::Store { ptr, value } => write!(f, "store {value}, {ptr}")?,
            InstrKind::Index { base, offset } => write!(f, "index {base}, {offset}")?,
            InstrKind::Binary { op, lhs, rhs } => write!(f, "{op} {lhs}, {rhs}")?,
            InstrKind::Call { callee, args } => write!(f, "call @{callee}({})", args.iter().join(", "))?,
        }
        if let Some(access) = &self.meta.access
            && access.lane_disjoint
        {
            let base = match &access.base {
                AccessBase::Param(i) => format!("%arg{i}"),
                AccessBase::Global(name) => format!("@{name}"),
                AccessBase::Private(v) => format!("%{}", v.0),
            };
            write!(f, " !lane_disjoint({base})")?;
        }
        if let Some(region) = self.meta.region {
            write!(f, " !region({region})")?;
        }
        Ok(())
    }
}

fn fmt_block(func: &Function, block: &Block, f: &mut Formatter<'_>) -> fmt::Result {
    writeln!(f, "{}:", block.label)?;
    for instr in &block.instrs {
        writeln!(f, "  {instr}")?;
    }
    let label = |id: &crate::module::BlockId| func.block(*id).label.clone();
    match &block.term {
        Terminator::Br(target) => writeln!(f, "  br {}", label(target)),
        Terminator::CondBr { cond, then_block, else_block } => {
            writeln!(f, "  br {cond}, {}, {}", label(then_block), label(else_block))
        }
        Terminator::Ret => writeln!(f, "  ret"),
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let keyword = match self.kind {
            FunctionKind::Kernel => "kernel",
            FunctionKind::Helper => "define",
            FunctionKind::WorkGroup => "workgroup",
            FunctionKind::Declaration => "declare",
        };
        let params = self.params.iter().map(|p| format!("{}: {}", p.name, p.kind)).join(", ");
        write!(f, "{keyword} @{}({params})", self.name)?;
        if self.inline != InlineHint::Default {
            write!(f, " inline({})", self.inline)?;
        }
        if self.is_declaration() {
            return writeln!(f);
        }
        writeln!(f, " {{")?;
        for block in &self.blocks {
            fmt_block(self, block, f)?;
        }
        writeln!(f, "}}")
    }
}

impl Display for GlobalVar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "@{} = global {} {}, align {}", self.name, self.space, self.size, self.align)?;
        if let Some(owner) = &self.owner {
            write!(f, " ; owned by @{owner}")?;
        }
        Ok(())
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for global in self.globals() {
            writeln!(f, "{global}")?;
        }
        for func in self.functions() {
            writeln!(f)?;
            write!(f, "{func}")?;
        }
        Ok(())
    }
}
