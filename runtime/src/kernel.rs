//! Programs and the kernels created from them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use snafu::{OptionExt, ResultExt, ensure};
use tessel_device::{Context, HOST_HANDLE_SIZE, MemObject};
use tessel_ir::{AutomaticLocal, Module};
use tessel_schedule::collect_automatic_locals;
use xxhash_rust::xxh64::xxh64;

use crate::args::{self, ArgInfo, ArgKind, ArgPayload, ArgSlot, ArgValue};
use crate::error::{
    GenerationSnafu, InvalidArgIndexSnafu, InvalidArgSizeSnafu, InvalidArgValueSnafu, InvalidProgramSnafu,
    KernelNotFoundSnafu, Result,
};

static NEXT_PROGRAM: AtomicU64 = AtomicU64::new(1);
static NEXT_KERNEL: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelId(pub u64);

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A built module plus the kernels currently created from it.
#[derive(Debug)]
pub struct Program {
    id: ProgramId,
    context: Arc<Context>,
    module: Module,
    hash: u64,
    kernels: Mutex<BTreeMap<KernelId, String>>,
}

impl Program {
    pub fn new(context: Arc<Context>, module: Module) -> Result<Arc<Self>> {
        module.verify().context(InvalidProgramSnafu)?;
        let hash = xxh64(module.to_string().as_bytes(), 0);
        Ok(Arc::new(Self {
            id: ProgramId(NEXT_PROGRAM.fetch_add(1, Ordering::Relaxed)),
            context,
            module,
            hash,
            kernels: Mutex::new(BTreeMap::new()),
        }))
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Content hash of the module text.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Live kernels, by creation order.
    pub fn kernels(&self) -> Vec<(KernelId, String)> {
        self.kernels.lock().iter().map(|(id, name)| (*id, name.clone())).collect()
    }

    pub fn kernel_count(&self) -> usize {
        self.kernels.lock().len()
    }
}

/// A kernel entry point with its current argument bindings.
///
/// Slots cover the declared arguments followed by one pre-set local buffer per
/// automatic local of the kernel.
pub struct Kernel {
    id: KernelId,
    name: String,
    program: Arc<Program>,
    signature: Vec<ArgInfo>,
    automatic_locals: Vec<AutomaticLocal>,
    args: Mutex<Vec<ArgSlot>>,
}

impl Kernel {
    pub fn new(program: &Arc<Program>, name: &str) -> Result<Arc<Self>> {
        let func =
            program.module.function(name).filter(|f| f.is_kernel()).context(KernelNotFoundSnafu { name })?;
        let declared = func.params.len().saturating_sub(func.automatic_locals.len());
        let signature: Vec<ArgInfo> = func.params[..declared].iter().map(ArgInfo::from).collect();
        let automatic_locals = collect_automatic_locals(&program.module, name).context(GenerationSnafu)?;

        let slots = signature
            .iter()
            .map(|info| ArgSlot::unset(info.kind))
            .chain(automatic_locals.iter().map(|local| ArgSlot::local(local.size)))
            .collect();

        let kernel = Arc::new(Self {
            id: KernelId(NEXT_KERNEL.fetch_add(1, Ordering::Relaxed)),
            name: name.to_string(),
            program: Arc::clone(program),
            signature,
            automatic_locals,
            args: Mutex::new(slots),
        });
        program.kernels.lock().insert(kernel.id, kernel.name.clone());
        tracing::debug!(
            kernel = %kernel.name,
            kernel.id = kernel.id.0,
            args = kernel.signature.len(),
            locals = kernel.automatic_locals.len(),
            "created kernel"
        );
        Ok(kernel)
    }

    pub fn id(&self) -> KernelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.program.context
    }

    pub fn signature(&self) -> &[ArgInfo] {
        &self.signature
    }

    pub fn automatic_locals(&self) -> &[AutomaticLocal] {
        &self.automatic_locals
    }

    /// Bind argument `index`.
    ///
    /// `size` is the byte size the caller declares: the byte length for value
    /// arguments, the handle size for buffers, images and samplers, and the
    /// allocation size for local buffers.
    pub fn set_arg(&self, index: usize, size: usize, value: ArgValue<'_>) -> Result<()> {
        let count = self.signature.len();
        let kind = self.signature.get(index).map(|info| info.kind).context(InvalidArgIndexSnafu { index, count })?;

        ensure!(kind != ArgKind::LocalBuffer || size != 0, InvalidArgSizeSnafu { index, size });
        ensure!(!kind.is_handle() || size == HOST_HANDLE_SIZE, InvalidArgSizeSnafu { index, size });
        if let ArgValue::Bytes(bytes) = &value {
            ensure!(bytes.len() == size, InvalidArgSizeSnafu { index, size });
        }

        let payload = ArgPayload::from_value(kind, &value).context(InvalidArgValueSnafu { index, expected: kind })??;

        let mut slots = self.args.lock();
        let slot = &mut slots[index];
        slot.is_set = false;
        slot.size = size;
        slot.payload = payload;
        slot.is_set = true;
        Ok(())
    }

    /// Index of the first argument that has never been set.
    pub fn first_unset_arg(&self) -> Option<usize> {
        self.args.lock().iter().position(|slot| !slot.is_set)
    }

    /// Deep copy of every slot, taken atomically with respect to `set_arg`.
    pub fn snapshot(&self) -> Result<Vec<ArgSlot>> {
        self.args.lock().iter().map(ArgSlot::try_clone).collect()
    }

    /// Non-null buffers and images bound to declared arguments.
    pub fn retained_memory(&self) -> Vec<Arc<MemObject>> {
        args::retained_memory(&self.args.lock(), self.signature.len())
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel").field("id", &self.id).field("name", &self.name).finish_non_exhaustive()
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        self.program.kernels.lock().remove(&self.id);
    }
}
