//! Small kernels shared by the pass tests.

use std::collections::HashMap;

use tessel_ir::{
    AddrSpace, Axis, BinaryOp, BlockId, ContextVar, Function, FunctionBuilder, InstrKind, Module, Operand, ParamKind,
    Terminator, ValueId,
};

/// Module with context symbols and the barrier declared, holding `funcs`.
pub fn module_with(funcs: impl IntoIterator<Item = Function>) -> Module {
    let mut module = Module::new("test");
    module.declare_context_symbols();
    module.declare_barrier();
    for func in funcs {
        module.add_function(func).unwrap();
    }
    module
}

/// ```text
/// kernel @shift(out)
///   out[lid] = lid
///   barrier
///   out[lid] = out[lid] + 1
/// ```
pub fn barrier_kernel() -> Function {
    let mut b = FunctionBuilder::kernel("shift");
    let out = b.param("out", "int*", ParamKind::Pointer { space: AddrSpace::Global });
    let lid = b.context(ContextVar::LocalId(Axis::X));
    let offset = b.mul(lid.clone(), Operand::Const(4));
    let addr = b.index(out, offset);
    b.store(addr.clone(), lid);
    b.barrier();
    let value = b.load(addr.clone());
    let bumped = b.add(value, Operand::Const(1));
    b.store(addr, bumped);
    b.ret();
    b.finish()
}

/// ```text
/// kernel @looped(n)
///   i = 0
///   while i < n { barrier; i += 1 }
/// ```
///
/// Returns the kernel plus its `(entry, header, body, exit)` blocks.
pub fn loop_kernel() -> (Function, [BlockId; 4]) {
    let mut b = FunctionBuilder::kernel("looped");
    let n = b.param("n", "int", ParamKind::Scalar { size: 4 });
    let header = b.block("header");
    let body = b.block("body");
    let exit = b.block("exit");

    let i = b.alloca("i", AddrSpace::Private, 8);
    b.store(i.clone(), Operand::Const(0));
    b.br(header);

    b.position_at(header);
    let iv = b.load(i.clone());
    let more = b.binary(BinaryOp::Lt, iv, n);
    b.cond_br(more, body, exit);

    b.position_at(body);
    b.barrier();
    let iv = b.load(i.clone());
    let next = b.add(iv, Operand::Const(1));
    b.store(i, next);
    b.br(header);

    b.position_at(exit);
    b.ret();
    (b.finish(), [BlockId::ENTRY, header, body, exit])
}

pub fn barrier_count(func: &Function) -> usize {
    func.instrs().filter(|(_, _, instr)| instr.is_barrier()).count()
}

/// ```text
/// kernel @reverse(src, dst)
///   src[lid] = lid * 10
///   barrier
///   dst[lid] = src[local_size - 1 - lid]
/// ```
pub fn reverse_kernel() -> Function {
    let mut b = FunctionBuilder::kernel("reverse");
    let src = b.param("src", "long*", ParamKind::Pointer { space: AddrSpace::Global });
    let dst = b.param("dst", "long*", ParamKind::Pointer { space: AddrSpace::Global });
    let lid = b.context(ContextVar::LocalId(Axis::X));
    let offset = b.mul(lid.clone(), Operand::Const(8));
    let mine = b.index(src.clone(), offset.clone());
    let value = b.mul(lid.clone(), Operand::Const(10));
    b.store(mine, value);
    b.barrier();
    let size = b.context(ContextVar::LocalSize(Axis::X));
    let last = b.binary(BinaryOp::Sub, size, Operand::Const(1));
    let mirror = b.binary(BinaryOp::Sub, last, lid);
    let mirror = b.mul(mirror, Operand::Const(8));
    let theirs = b.index(src, mirror);
    let value = b.load(theirs);
    let out = b.index(dst, offset);
    b.store(out, value);
    b.ret();
    b.finish()
}

/// ```text
/// kernel @rotate_sum(buf, n)
///   for i in 0..n {
///     t = buf[(lid + 1) % local_size]
///     barrier
///     buf[lid] += t
///     barrier
///   }
/// ```
pub fn rotate_sum_kernel() -> Function {
    let mut b = FunctionBuilder::kernel("rotate_sum");
    let buf = b.param("buf", "long*", ParamKind::Pointer { space: AddrSpace::Global });
    let n = b.param("n", "int", ParamKind::Scalar { size: 4 });
    let header = b.block("header");
    let body = b.block("body");
    let exit = b.block("exit");

    let i = b.alloca("i", AddrSpace::Private, 8);
    b.store(i.clone(), Operand::Const(0));
    b.br(header);

    b.position_at(header);
    let iv = b.load(i.clone());
    let more = b.binary(BinaryOp::Lt, iv, n);
    b.cond_br(more, body, exit);

    b.position_at(body);
    let lid = b.context(ContextVar::LocalId(Axis::X));
    let size = b.context(ContextVar::LocalSize(Axis::X));
    let next = b.add(lid.clone(), Operand::Const(1));
    let neighbour = b.binary(BinaryOp::Rem, next, size);
    let neighbour = b.mul(neighbour, Operand::Const(8));
    let theirs = b.index(buf.clone(), neighbour);
    let t = b.load(theirs);
    b.barrier();
    let offset = b.mul(lid, Operand::Const(8));
    let mine = b.index(buf, offset);
    let current = b.load(mine.clone());
    let sum = b.add(current, t);
    b.store(mine, sum);
    b.barrier();
    let iv = b.load(i.clone());
    let bumped = b.add(iv, Operand::Const(1));
    b.store(i, bumped);
    b.br(header);

    b.position_at(exit);
    b.ret();
    b.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Ptr { buf: usize, off: i64 },
}

impl Value {
    fn int(self) -> i64 {
        match self {
            Value::Int(v) => v,
            Value::Ptr { .. } => panic!("expected an integer, got {self:?}"),
        }
    }
}

const STEP_LIMIT: usize = 1_000_000;

/// Sequential reference interpreter for barrier-free functions.
///
/// Memory is a map from `(buffer, byte offset)` to a whole value, which is
/// enough for kernels that always access a location with the same width.
#[derive(Debug, Default)]
pub struct Machine {
    memory: HashMap<(usize, i64), Value>,
    buffers: usize,
    globals: HashMap<String, usize>,
}

impl Machine {
    fn alloc(&mut self) -> usize {
        self.buffers += 1;
        self.buffers - 1
    }

    /// A fresh buffer holding `init` at 8-byte strides.
    pub fn buffer(&mut self, init: &[i64]) -> Value {
        let buf = self.alloc();
        for (i, &v) in init.iter().enumerate() {
            self.memory.insert((buf, i as i64 * 8), Value::Int(v));
        }
        Value::Ptr { buf, off: 0 }
    }

    pub fn read(&self, ptr: Value, len: usize) -> Vec<i64> {
        let Value::Ptr { buf, off } = ptr else { panic!("not a pointer: {ptr:?}") };
        (0..len as i64).map(|i| self.memory.get(&(buf, off + i * 8)).map_or(0, |v| v.int())).collect()
    }

    fn global(&mut self, name: &str) -> Value {
        let buf = match self.globals.get(name) {
            Some(&buf) => buf,
            None => {
                let buf = self.alloc();
                self.globals.insert(name.to_string(), buf);
                buf
            }
        };
        Value::Ptr { buf, off: 0 }
    }

    fn eval(&mut self, op: &Operand, values: &HashMap<ValueId, Value>, args: &[Value]) -> Value {
        match op {
            Operand::Const(c) => Value::Int(*c),
            Operand::Param(i) => args[*i],
            Operand::Global(name) => self.global(name),
            Operand::Value(v) => values[v],
        }
    }

    pub fn run(&mut self, func: &Function, args: &[Value]) {
        let mut values = HashMap::new();
        let mut block = func.entry();
        for _ in 0..STEP_LIMIT {
            let body = func.block(block);
            for instr in &body.instrs {
                let result = match &instr.kind {
                    InstrKind::Alloca { .. } => Some(Value::Ptr { buf: self.alloc(), off: 0 }),
                    InstrKind::Load { ptr } => {
                        let Value::Ptr { buf, off } = self.eval(ptr, &values, args) else { panic!("load from int") };
                        Some(self.memory.get(&(buf, off)).copied().unwrap_or(Value::Int(0)))
                    }
                    InstrKind::Store { ptr, value } => {
                        let Value::Ptr { buf, off } = self.eval(ptr, &values, args) else { panic!("store to int") };
                        let value = self.eval(value, &values, args);
                        self.memory.insert((buf, off), value);
                        None
                    }
                    InstrKind::Index { base, offset } => {
                        let Value::Ptr { buf, off } = self.eval(base, &values, args) else { panic!("index of int") };
                        Some(Value::Ptr { buf, off: off + self.eval(offset, &values, args).int() })
                    }
                    InstrKind::Binary { op, lhs, rhs } => {
                        let (l, r) = (self.eval(lhs, &values, args).int(), self.eval(rhs, &values, args).int());
                        Some(Value::Int(apply(*op, l, r)))
                    }
                    InstrKind::Call { callee, .. } => panic!("unexpected call to {callee}"),
                };
                if let (Some(id), Some(value)) = (instr.result, result) {
                    values.insert(id, value);
                }
            }
            block = match &body.term {
                Terminator::Ret => return,
                Terminator::Br(next) => *next,
                Terminator::CondBr { cond, then_block, else_block } => {
                    if self.eval(cond, &values, args).int() != 0 { *then_block } else { *else_block }
                }
            };
        }
        panic!("{} did not return within {STEP_LIMIT} blocks", func.name);
    }
}

fn apply(op: BinaryOp, l: i64, r: i64) -> i64 {
    match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => l / r,
        BinaryOp::Rem => l % r,
        BinaryOp::Shl => l << r,
        BinaryOp::Shr => l >> r,
        BinaryOp::And => l & r,
        BinaryOp::Or => l | r,
        BinaryOp::Xor => l ^ r,
        BinaryOp::Lt => (l < r) as i64,
        BinaryOp::Le => (l <= r) as i64,
        BinaryOp::Eq => (l == r) as i64,
        BinaryOp::Ne => (l != r) as i64,
    }
}
