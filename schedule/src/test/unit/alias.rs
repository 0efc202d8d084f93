use tessel_ir::{AddrSpace, FunctionBuilder, Instr, Operand, ParamKind};

use crate::alias::{AliasResult, WorkerAccess, work_item_alias};
use crate::context::WorkitemHandler;
use crate::pipeline::Pipeline;
use crate::test::helpers::{barrier_kernel, module_with};

/// Annotated kernel accesses placed in the generated work-group function.
fn annotated_accesses(kernel: tessel_ir::Function) -> Vec<Instr> {
    let name = kernel.name.clone();
    let out = Pipeline::run(&module_with([kernel]), &name, [4, 1, 1], WorkitemHandler::Loops).unwrap();
    let wg = out.module.function(&out.function).unwrap();
    wg.instrs()
        .filter(|(_, _, i)| i.meta.region.is_some() && i.meta.access.is_some())
        .filter(|(_, _, i)| i.address().and_then(Operand::as_global).is_none())
        .map(|(_, _, i)| i.clone())
        .collect()
}

#[test]
fn test_distinct_workers_same_region_no_alias() {
    let accesses = annotated_accesses(barrier_kernel());
    let store = accesses.first().unwrap();

    let a = WorkerAccess::new(store, [0, 0, 0]);
    let b = WorkerAccess::new(store, [1, 0, 0]);
    assert_eq!(work_item_alias(a, b), AliasResult::NoAlias);
}

#[test]
fn test_same_worker_may_alias() {
    let accesses = annotated_accesses(barrier_kernel());
    let store = accesses.first().unwrap();

    let a = WorkerAccess::new(store, [2, 0, 0]);
    assert_eq!(work_item_alias(a, a), AliasResult::MayAlias);
}

#[test]
fn test_different_regions_may_alias() {
    let accesses = annotated_accesses(barrier_kernel());
    let first = accesses.iter().find(|i| i.meta.region == Some(0)).unwrap();
    let second = accesses.iter().find(|i| i.meta.region == Some(1)).unwrap();

    let result = work_item_alias(WorkerAccess::new(first, [0, 0, 0]), WorkerAccess::new(second, [1, 0, 0]));
    assert_eq!(result, AliasResult::MayAlias);
}

#[test]
fn test_shared_address_may_alias() {
    let mut b = FunctionBuilder::kernel("flag");
    let out = b.param("out", "int*", ParamKind::Pointer { space: AddrSpace::Global });
    b.store(out, Operand::Const(1));
    b.ret();
    let accesses = annotated_accesses(b.finish());
    let store = accesses.first().unwrap();

    let result = work_item_alias(WorkerAccess::new(store, [0, 0, 0]), WorkerAccess::new(store, [3, 0, 0]));
    assert_eq!(result, AliasResult::MayAlias);
}

#[test]
fn test_unannotated_access_may_alias() {
    let instr = Instr::barrier();
    let result = work_item_alias(WorkerAccess::new(&instr, [0, 0, 0]), WorkerAccess::new(&instr, [1, 0, 0]));
    assert_eq!(result, AliasResult::MayAlias);
}
