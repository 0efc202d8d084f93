//! Kernel argument slots and their launch-time copies.
//!
//! Value arguments are kept as aligned byte blobs so that an executor can hand
//! them to generated code without another copy. Reference-typed arguments hold
//! an `Arc` to the object, which keeps it alive for as long as the slot (or a
//! snapshot of it) exists.

use std::alloc::{Layout, alloc, dealloc};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use snafu::OptionExt;
use strum::Display;
use tessel_device::{MemObject, Sampler};
use tessel_ir::{AddrSpace, Param, ParamKind};

use crate::error::{OutOfHostMemorySnafu, Result};

/// Largest alignment a value argument is ever given.
pub const MAX_EXTENDED_ALIGNMENT: usize = 128;

/// `min(next_pow2(size), MAX_EXTENDED_ALIGNMENT)`
pub fn alignment_for(size: usize) -> usize {
    size.checked_next_power_of_two().map_or(MAX_EXTENDED_ALIGNMENT, |a| a.min(MAX_EXTENDED_ALIGNMENT))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ArgKind {
    Value,
    Pointer,
    LocalBuffer,
    Sampler,
    Image,
}

impl ArgKind {
    pub fn of(param: &ParamKind) -> Self {
        match param {
            ParamKind::Scalar { .. } => ArgKind::Value,
            ParamKind::Pointer { space: AddrSpace::Local } | ParamKind::LocalBuffer { .. } => ArgKind::LocalBuffer,
            ParamKind::Pointer { .. } => ArgKind::Pointer,
            ParamKind::Image => ArgKind::Image,
            ParamKind::Sampler => ArgKind::Sampler,
        }
    }

    /// Set through an object handle rather than by value.
    pub fn is_handle(self) -> bool {
        matches!(self, ArgKind::Pointer | ArgKind::Image | ArgKind::Sampler)
    }
}

/// One entry of a kernel's declared signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgInfo {
    pub name: String,
    pub type_name: String,
    pub kind: ArgKind,
}

impl From<&Param> for ArgInfo {
    fn from(param: &Param) -> Self {
        Self { name: param.name.clone(), type_name: param.type_name.clone(), kind: ArgKind::of(&param.kind) }
    }
}

/// Heap bytes aligned to [`alignment_for`] their length, with an allocation
/// of at least that alignment.
pub struct AlignedBytes {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

// SAFETY: AlignedBytes uniquely owns its allocation and only hands out
// borrows tied to `&self`.
unsafe impl Send for AlignedBytes {}
unsafe impl Sync for AlignedBytes {}

impl AlignedBytes {
    pub fn copy_from(bytes: &[u8]) -> Result<Self> {
        let align = alignment_for(bytes.len());
        let size = bytes.len().max(align);
        let layout = Layout::from_size_align(size, align).ok().context(OutOfHostMemorySnafu { size })?;
        // SAFETY: `layout` has a non-zero size since `align >= 1`.
        let raw = unsafe { alloc(layout) };
        let ptr = NonNull::new(raw).context(OutOfHostMemorySnafu { size })?;
        // SAFETY: the fresh allocation is valid for `size >= bytes.len()` bytes
        // and cannot overlap `bytes`.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) };
        Ok(Self { ptr, len: bytes.len(), layout })
    }

    pub fn try_clone(&self) -> Result<Self> {
        Self::copy_from(self.as_slice())
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the first `len` bytes were initialized in `copy_from`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    /// Bytes actually reserved, never less than the alignment.
    pub fn capacity(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for AlignedBytes {
    fn drop(&mut self) {
        // SAFETY: `ptr` was returned by `alloc` with exactly this layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl fmt::Debug for AlignedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBytes").field("bytes", &self.as_slice()).field("align", &self.alignment()).finish()
    }
}

/// What a caller passes to [`crate::Kernel::set_arg`].
#[derive(Debug, Clone)]
pub enum ArgValue<'a> {
    /// Raw bytes of a by-value argument.
    Bytes(&'a [u8]),
    /// A buffer or image; `None` binds a null buffer.
    Mem(Option<Arc<MemObject>>),
    Sampler(Arc<Sampler>),
    /// Group-local memory: only its size is given.
    Local,
}

impl ArgValue<'_> {
    fn fits(&self, kind: ArgKind) -> bool {
        match (kind, self) {
            (ArgKind::Value, ArgValue::Bytes(_)) | (ArgKind::LocalBuffer, ArgValue::Local) => true,
            (ArgKind::Pointer, ArgValue::Mem(mem)) => mem.as_ref().is_none_or(|m| !m.is_image()),
            (ArgKind::Image, ArgValue::Mem(Some(mem))) => mem.is_image(),
            (ArgKind::Sampler, ArgValue::Sampler(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug)]
pub enum ArgPayload {
    Empty,
    Bytes(AlignedBytes),
    Mem(Option<Arc<MemObject>>),
    Sampler(Arc<Sampler>),
}

impl ArgPayload {
    /// What `value` stores in a slot of `kind`, or `None` when it does not fit.
    pub fn from_value(kind: ArgKind, value: &ArgValue<'_>) -> Option<Result<Self>> {
        if !value.fits(kind) {
            return None;
        }
        Some(match value {
            ArgValue::Bytes(bytes) => AlignedBytes::copy_from(bytes).map(ArgPayload::Bytes),
            ArgValue::Mem(mem) => Ok(ArgPayload::Mem(mem.clone())),
            ArgValue::Sampler(sampler) => Ok(ArgPayload::Sampler(Arc::clone(sampler))),
            ArgValue::Local => Ok(ArgPayload::Empty),
        })
    }

    fn try_clone(&self) -> Result<Self> {
        Ok(match self {
            ArgPayload::Empty => ArgPayload::Empty,
            ArgPayload::Bytes(bytes) => ArgPayload::Bytes(bytes.try_clone()?),
            ArgPayload::Mem(mem) => ArgPayload::Mem(mem.clone()),
            ArgPayload::Sampler(sampler) => ArgPayload::Sampler(Arc::clone(sampler)),
        })
    }
}

#[derive(Debug)]
pub struct ArgSlot {
    pub kind: ArgKind,
    pub size: usize,
    pub payload: ArgPayload,
    pub is_set: bool,
}

impl ArgSlot {
    pub fn unset(kind: ArgKind) -> Self {
        Self { kind, size: 0, payload: ArgPayload::Empty, is_set: false }
    }

    /// A group-local buffer of `size` bytes, already set.
    pub fn local(size: usize) -> Self {
        Self { kind: ArgKind::LocalBuffer, size, payload: ArgPayload::Empty, is_set: true }
    }

    pub fn alignment(&self) -> usize {
        alignment_for(self.size)
    }

    /// The memory object bound to a buffer or image slot, if any.
    pub fn memory(&self) -> Option<&Arc<MemObject>> {
        match &self.payload {
            ArgPayload::Mem(mem) => mem.as_ref(),
            _ => None,
        }
    }

    pub fn sampler(&self) -> Option<&Arc<Sampler>> {
        match &self.payload {
            ArgPayload::Sampler(sampler) => Some(sampler),
            _ => None,
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            ArgPayload::Bytes(bytes) => Some(bytes.as_slice()),
            _ => None,
        }
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self { kind: self.kind, size: self.size, payload: self.payload.try_clone()?, is_set: self.is_set })
    }
}

/// Non-null memory objects bound to the first `declared` slots.
pub fn retained_memory(slots: &[ArgSlot], declared: usize) -> Vec<Arc<MemObject>> {
    slots
        .iter()
        .take(declared)
        .filter(|slot| matches!(slot.kind, ArgKind::Pointer | ArgKind::Image))
        .filter_map(|slot| slot.memory().cloned())
        .collect()
}
