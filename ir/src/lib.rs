//! Intermediate Representation (IR) for tessel kernels.
//!
//! A kernel arrives here written for a single logical worker. The schedule
//! crate rewrites it into a function that runs a whole work-group; this crate
//! only provides the data structures and analyses those passes share.
//!
//! # Module Organization
//!
//! - [`types`] - Axes, address spaces, operators and context-identity variables
//! - [`module`] - Module, function, block and instruction definitions
//! - [`builder`] - Incremental construction of function bodies
//! - [`cfg`] - Control-flow graph, dominators and natural loops
//! - [`error`] - Error types and result handling

pub mod builder;
pub mod cfg;
pub mod display;
pub mod error;
pub mod module;
pub mod types;
pub mod verify;


pub use builder::FunctionBuilder;
pub use cfg::{ControlFlow, DominatorTree, Loop, LoopForest};
pub use error::{Error, Result};
pub use module::{
    AccessBase, AccessPattern, AutomaticLocal, Block, BlockId, Function, FunctionKind, GlobalVar, Instr, InstrKind,
    InstrMeta, Module, Operand, Param, ParamKind, Terminator, UniformTerm, ValueId, workgroup_context_vars,
};
pub use types::{AddrSpace, Axis, BARRIER_FUNCTION, BinaryOp, ContextVar, InlineHint, LANE_ID_INTRINSIC};
