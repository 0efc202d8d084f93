//! Structural well-formedness checks.

use std::collections::HashSet;

use snafu::ensure;

use crate::error::*;
use crate::module::{Function, Module, Operand};

impl Module {
    /// Check that branches, calls, globals, parameters and values all resolve.
    pub fn verify(&self) -> Result<()> {
        for func in self.functions().iter().filter(|f| !f.is_declaration()) {
            self.verify_function(func)?;
        }
        Ok(())
    }

    fn verify_function(&self, func: &Function) -> Result<()> {
        let name = func.name.as_str();
        let mut defined = HashSet::new();
        for (_, _, instr) in func.instrs() {
            if let Some(v) = instr.result {
                ensure!(defined.insert(v), RedefinedValueSnafu { function: name, value: v.0 });
            }
        }

        let check = |op: &Operand| -> Result<()> {
            match op {
                Operand::Value(v) => ensure!(defined.contains(v), UndefinedValueSnafu { function: name, value: v.0 }),
                Operand::Param(index) => ensure!(
                    *index < func.params.len(),
                    UnknownParamSnafu { function: name, index: *index, count: func.params.len() }
                ),
                Operand::Global(global) => {
                    ensure!(self.has_symbol(global), UnknownGlobalSnafu { function: name, global: global.as_str() })
                }
                Operand::Const(_) => {}
            }
            Ok(())
        };

        for block in &func.blocks {
            for instr in &block.instrs {
                instr.operands().into_iter().try_for_each(&check)?;
                if let Some(callee) = instr.callee() {
                    ensure!(self.function(callee).is_some(), UnknownCalleeSnafu { function: name, callee });
                }
            }
            block.term.operand().into_iter().try_for_each(&check)?;
            for succ in block.term.successors() {
                ensure!(succ.index() < func.blocks.len(), UnknownBlockSnafu { function: name, block: succ.0 });
            }
        }
        Ok(())
    }
}
