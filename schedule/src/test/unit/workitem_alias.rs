use test_case::test_case;
use tessel_ir::{
    AccessBase, AccessPattern, AddrSpace, Axis, ContextVar, FunctionBuilder, GlobalVar, Instr, InstrKind, Operand,
    ParamKind, UniformTerm,
};

use crate::context::{PassContext, WorkitemHandler};
use crate::passes::workitem_alias;
use crate::passes::workitem_alias::injective_over;
use crate::test::helpers::{barrier_kernel, module_with};

fn annotate(kernel: tessel_ir::Function, local_size: [usize; 3]) -> Vec<Instr> {
    let name = kernel.name.clone();
    let mut module = module_with([kernel]);
    workitem_alias(&mut module, &PassContext::new(&name, local_size, WorkitemHandler::Loops)).unwrap();
    let func = module.function(&name).unwrap();
    // Context reads are memory accesses too; only the kernel's own are of interest.
    func.instrs()
        .filter(|(_, _, i)| i.is_memory_access() && i.address().and_then(Operand::as_global).is_none())
        .map(|(_, _, i)| i.clone())
        .collect()
}

fn stored_at(build: impl FnOnce(&mut FunctionBuilder, Operand) -> Operand) -> Option<AccessPattern> {
    let mut b = FunctionBuilder::kernel("k");
    let out = b.param("out", "int*", ParamKind::Pointer { space: AddrSpace::Global });
    let addr = build(&mut b, out);
    b.store(addr, Operand::Const(0));
    b.ret();
    annotate(b.finish(), [8, 4, 1]).pop().and_then(|store| store.meta.access)
}

#[test]
fn test_lane_indexed_access_is_disjoint() {
    let accesses = annotate(barrier_kernel(), [8, 1, 1]);

    let access = accesses.iter().map(|i| i.meta.access.clone()).collect::<Vec<_>>();
    let expected = AccessPattern {
        base: AccessBase::Param(0),
        lane_coeffs: [4, 0, 0],
        uniform: vec![],
        constant: 0,
        lane_disjoint: true,
    };
    assert!(access.iter().all(|a| a.as_ref() == Some(&expected)));
    assert_eq!(access.len(), 3);
}

#[test]
fn test_unused_axis_breaks_disjointness() {
    // Workers differing only in y share an address.
    let accesses = annotate(barrier_kernel(), [8, 2, 1]);
    assert!(accesses.iter().all(|i| i.meta.access.as_ref().is_some_and(|a| !a.lane_disjoint)));
}

#[test]
fn test_fixed_address_is_shared() {
    let pattern = stored_at(|_, out| out).unwrap();
    assert_eq!(pattern.lane_coeffs, [0, 0, 0]);
    assert!(!pattern.lane_disjoint);
}

#[test]
fn test_row_major_2d_index() {
    // out[(lid_y * 8 + lid_x) * 4 + group * 256]
    let pattern = stored_at(|b, out| {
        let x = b.context(ContextVar::LocalId(Axis::X));
        let y = b.context(ContextVar::LocalId(Axis::Y));
        let g = b.context(ContextVar::GroupId(Axis::X));
        let row = b.mul(y, Operand::Const(8));
        let linear = b.add(row, x);
        let bytes = b.binary(tessel_ir::BinaryOp::Shl, linear, Operand::Const(2));
        let base = b.mul(g, Operand::Const(256));
        let offset = b.add(bytes, base);
        b.index(out, offset)
    })
    .unwrap();

    assert_eq!(pattern.lane_coeffs, [4, 32, 0]);
    assert_eq!(pattern.uniform, vec![(UniformTerm::Context(ContextVar::GroupId(Axis::X)), 256)]);
    assert!(pattern.lane_disjoint);
}

#[test]
fn test_data_dependent_address_unannotated() {
    let pattern = stored_at(|b, out| {
        let loaded = b.load(out.clone());
        b.index(out, loaded)
    });
    assert_eq!(pattern, None);
}

#[test]
fn test_private_alloca_always_disjoint() {
    let mut b = FunctionBuilder::kernel("k");
    let slot = b.alloca("acc", AddrSpace::Private, 4);
    b.store(slot, Operand::Const(1));
    b.ret();
    let pattern = annotate(b.finish(), [16, 16, 1]).pop().and_then(|i| i.meta.access).unwrap();
    assert!(matches!(pattern.base, AccessBase::Private(_)));
    assert!(pattern.lane_disjoint);
}

#[test]
fn test_annotation_is_stable() {
    let mut module = module_with([barrier_kernel()]);
    let ctx = PassContext::new("shift", [8, 1, 1], WorkitemHandler::Loops);
    assert!(workitem_alias(&mut module, &ctx).unwrap());
    assert!(!workitem_alias(&mut module, &ctx).unwrap());
}

#[test_case([1, 0, 0], [8, 1, 1], 1, true ; "byte stride")]
#[test_case([1, 0, 0], [8, 1, 1], 4, false ; "stride narrower than element")]
#[test_case([4, 0, 0], [8, 1, 1], 4, true ; "element stride")]
#[test_case([0, 0, 0], [1, 1, 1], 8, true ; "single worker")]
#[test_case([1, 8, 0], [8, 4, 1], 1, true ; "row major")]
#[test_case([4, 28, 0], [8, 4, 1], 4, false ; "rows overlap by one element")]
#[test_case([1, 7, 0], [8, 4, 1], 1, false ; "overlapping rows")]
#[test_case([-4, 0, 0], [8, 1, 1], 4, true ; "negative stride")]
#[test_case([1, 0, 0], [8, 2, 1], 1, false ; "missing y coefficient")]
#[test_case([2, 1, 0], [2, 2, 1], 1, true ; "transposed")]
#[test_case([8, 4, 0], [2, 2, 1], 4, true ; "transposed elements")]
fn test_injective_over(lane: [i64; 3], local_size: [usize; 3], width: u64, expected: bool) {
    assert_eq!(injective_over(lane, local_size, width), expected);
}

#[test_case("int*", false ; "int elements overlap")]
#[test_case("uchar*", true ; "byte elements")]
#[test_case("struct pixel*", false ; "unknown element width")]
fn test_unscaled_lane_index(type_name: &str, disjoint: bool) {
    // out + lid_x, without scaling by the element size
    let mut b = FunctionBuilder::kernel("k");
    let out = b.param("out", type_name, ParamKind::Pointer { space: AddrSpace::Global });
    let lid = b.context(ContextVar::LocalId(Axis::X));
    let addr = b.index(out, lid);
    b.store(addr, Operand::Const(0));
    b.ret();

    let pattern = annotate(b.finish(), [8, 1, 1]).pop().and_then(|i| i.meta.access).unwrap();
    assert_eq!(pattern.lane_coeffs, [1, 0, 0]);
    assert_eq!(pattern.lane_disjoint, disjoint);
}

#[test]
fn test_group_local_global_not_disjoint() {
    // The element width of a module-level buffer is unknown.
    let mut b = FunctionBuilder::kernel("k");
    let lid = b.context(ContextVar::LocalId(Axis::X));
    let offset = b.mul(lid, Operand::Const(4));
    let addr = b.index(Operand::Global("tile".into()), offset);
    b.store(addr, Operand::Const(0));
    b.ret();
    let mut module = module_with([b.finish()]);
    module.add_global(GlobalVar::new("tile", AddrSpace::Local, 64)).unwrap();
    workitem_alias(&mut module, &PassContext::new("k", [8, 1, 1], WorkitemHandler::Loops)).unwrap();

    let func = module.function("k").unwrap();
    let (_, _, store) = func.instrs().find(|(_, _, i)| matches!(i.kind, InstrKind::Store { .. })).unwrap();
    let pattern = store.meta.access.clone().unwrap();
    assert_eq!(pattern.base, AccessBase::Global("tile".into()));
    assert!(!pattern.lane_disjoint);
}
