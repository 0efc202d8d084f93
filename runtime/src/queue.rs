//! In-order command queues.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use snafu::ResultExt;
use tessel_device::{Context, Device};

use crate::command::CommandNode;
use crate::error::{DeviceSnafu, Result};

static NEXT_QUEUE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(pub u64);

/// FIFO of commands for one device. Executors drain it from the front.
#[derive(Debug)]
pub struct CommandQueue {
    id: QueueId,
    context: Arc<Context>,
    device: Arc<Device>,
    pending: Mutex<VecDeque<CommandNode>>,
}

impl CommandQueue {
    pub fn new(context: &Arc<Context>, device: &Arc<Device>) -> Result<Arc<Self>> {
        context.ensure_contains(device).context(DeviceSnafu)?;
        Ok(Arc::new(Self {
            id: QueueId(NEXT_QUEUE.fetch_add(1, Ordering::Relaxed)),
            context: Arc::clone(context),
            device: Arc::clone(device),
            pending: Mutex::new(VecDeque::new()),
        }))
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn enqueue(&self, node: CommandNode) {
        let mut pending = self.pending.lock();
        tracing::debug!(queue.id = self.id.0, command.id = node.id().0, depth = pending.len() + 1, "enqueued command");
        pending.push_back(node);
    }

    /// Oldest command, regardless of its wait list.
    pub fn pop(&self) -> Option<CommandNode> {
        self.pending.lock().pop_front()
    }

    /// Oldest command, only once everything it waits on has completed.
    pub fn pop_ready(&self) -> Option<CommandNode> {
        let mut pending = self.pending.lock();
        if pending.front().is_some_and(CommandNode::is_ready) { pending.pop_front() } else { None }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
