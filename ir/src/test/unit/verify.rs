use crate::error::Error;
use crate::module::{Module, Operand, ParamKind};
use crate::types::{AddrSpace, Axis, ContextVar};
use crate::{BlockId, FunctionBuilder, Terminator};

fn module_with(func: crate::Function) -> Module {
    let mut module = Module::new("m");
    module.declare_context_symbols();
    module.declare_barrier();
    module.add_function(func).unwrap();
    module
}

#[test]
fn test_verify_accepts_well_formed_kernel() {
    let mut b = FunctionBuilder::kernel("k");
    let out = b.param("out", "int*", ParamKind::Pointer { space: AddrSpace::Global });
    let lid = b.context(ContextVar::LocalId(Axis::X));
    let addr = b.index(out, lid.clone());
    b.barrier();
    b.store(addr, lid);
    b.ret();

    module_with(b.finish()).verify().unwrap();
}

#[test]
fn test_verify_rejects_unknown_global() {
    let mut b = FunctionBuilder::kernel("k");
    b.load(Operand::global("nope"));
    let err = module_with(b.finish()).verify().unwrap_err();
    assert!(matches!(err, Error::UnknownGlobal { ref global, .. } if global == "nope"));
}

#[test]
fn test_verify_rejects_undeclared_callee() {
    let mut b = FunctionBuilder::kernel("k");
    b.call_void("helper", vec![]);
    let err = module_with(b.finish()).verify().unwrap_err();
    assert!(matches!(err, Error::UnknownCallee { .. }));
}

#[test]
fn test_verify_rejects_param_out_of_range() {
    let mut b = FunctionBuilder::kernel("k");
    b.load(Operand::Param(3));
    let err = module_with(b.finish()).verify().unwrap_err();
    assert!(matches!(err, Error::UnknownParam { index: 3, count: 0, .. }));
}

#[test]
fn test_verify_rejects_dangling_branch() {
    let mut func = FunctionBuilder::kernel("k").finish();
    func.block_mut(BlockId::ENTRY).term = Terminator::Br(BlockId(7));
    let err = module_with(func).verify().unwrap_err();
    assert!(matches!(err, Error::UnknownBlock { block: 7, .. }));
}
