use tessel_ir::{AddrSpace, FunctionBuilder, Module, Operand, ParamKind};

use crate::context::WorkitemHandler;
use crate::error::Error;
use crate::passes::PASSES;
use crate::pipeline::Pipeline;
use crate::test::helpers::{Machine, Value, barrier_kernel, module_with, rotate_sum_kernel};

#[test]
fn test_reports_changes_in_pass_order() {
    let module = module_with([barrier_kernel()]);
    let out = Pipeline::run(&module, "shift", [4, 1, 1], WorkitemHandler::Loops).unwrap();

    let names: Vec<_> = out.changes.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, PASSES.map(|(name, _)| name));
    let changed: Vec<_> = out.changes.iter().map(|(_, changed)| *changed).collect();
    assert_eq!(changed, vec![false, false, true, false, true]);
    assert_eq!(out.function, "_tessel_workgroup_shift");
    assert_eq!(out.kernel, "shift");
    assert_eq!(out.local_size, [4, 1, 1]);
}

#[test]
fn test_input_module_untouched() {
    let module = module_with([barrier_kernel()]);
    let before = module.clone();
    Pipeline::run(&module, "shift", [2, 2, 1], WorkitemHandler::Loops).unwrap();
    assert_eq!(module, before);
}

#[test]
fn test_rerun_on_output_changes_nothing() {
    let module = module_with([barrier_kernel()]);
    let out = Pipeline::run(&module, "shift", [4, 1, 1], WorkitemHandler::Loops).unwrap();
    let again = Pipeline::run(&out.module, "shift", [4, 1, 1], WorkitemHandler::Loops).unwrap();

    assert!(again.changes.iter().all(|(_, changed)| !changed), "{:?}", again.changes);
    assert_eq!(again.module, out.module);
}

#[test]
fn test_barrier_in_loop_end_to_end() {
    let module = module_with([rotate_sum_kernel()]);
    let out = Pipeline::run(&module, "rotate_sum", [4, 1, 1], WorkitemHandler::Loops).unwrap();
    let wg = out.module.function(&out.function).unwrap();

    let mut machine = Machine::default();
    let buf = machine.buffer(&[1, 2, 3, 4]);
    machine.run(wg, &[buf, Value::Int(2)]);

    // [1,2,3,4] -> [3,5,7,5] -> [8,12,12,8]
    assert_eq!(machine.read(buf, 4), vec![8, 12, 12, 8]);
}

#[test]
fn test_rejects_empty_local_size() {
    let module = module_with([barrier_kernel()]);
    let err = Pipeline::run(&module, "shift", [0, 1, 1], WorkitemHandler::Loops).unwrap_err();
    assert!(matches!(err, Error::InvalidLocalSize { .. }));
}

#[test]
fn test_helper_is_not_a_kernel() {
    let mut helper = FunctionBuilder::helper("util");
    helper.ret();
    let module = module_with([barrier_kernel(), helper.finish()]);

    let err = Pipeline::run(&module, "util", [4, 1, 1], WorkitemHandler::Loops).unwrap_err();
    assert!(matches!(err, Error::KernelNotFound { name } if name == "util"));
}

#[test]
fn test_malformed_module_fails_verification() {
    let mut module = Module::new("broken");
    let mut b = FunctionBuilder::kernel("k");
    let out = b.param("out", "int*", ParamKind::Pointer { space: AddrSpace::Global });
    b.store(out, Operand::global("nowhere"));
    b.ret();
    module.add_function(b.finish()).unwrap();

    let err = Pipeline::run(&module, "k", [1, 1, 1], WorkitemHandler::Loops).unwrap_err();
    assert!(matches!(err, Error::Ir { .. }));
}
