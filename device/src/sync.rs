//! Command completion events.
//!
//! An [`Event`] moves forward through [`CommandStatus`] and never back. Waiters
//! park on a `parking_lot` condvar until the event reaches a terminal state.
//!
//! ```ignore
//! let event = Event::new(context.id());
//!
//! // Executor thread
//! event.set_status(CommandStatus::Complete);
//!
//! // Host thread
//! event.wait()?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::device::ContextId;
use crate::error::{EventFailedSnafu, EventTimeoutSnafu, Result};

static NEXT_EVENT: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Queued,
    Submitted,
    Running,
    Complete,
    Failed(String),
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Queued => f.write_str("queued"),
            CommandStatus::Submitted => f.write_str("submitted"),
            CommandStatus::Running => f.write_str("running"),
            CommandStatus::Complete => f.write_str("complete"),
            CommandStatus::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

impl CommandStatus {
    fn rank(&self) -> u8 {
        match self {
            CommandStatus::Queued => 0,
            CommandStatus::Submitted => 1,
            CommandStatus::Running => 2,
            CommandStatus::Complete | CommandStatus::Failed(_) => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }
}

#[derive(Debug)]
pub struct Event {
    id: EventId,
    context: ContextId,
    status: Mutex<CommandStatus>,
    condvar: Condvar,
}

impl Event {
    pub fn new(context: ContextId) -> Arc<Self> {
        Arc::new(Self {
            id: EventId(NEXT_EVENT.fetch_add(1, Ordering::Relaxed)),
            context,
            status: Mutex::new(CommandStatus::Queued),
            condvar: Condvar::new(),
        })
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn status(&self) -> CommandStatus {
        self.status.lock().clone()
    }

    /// Advance the status. Attempts to move backwards or out of a terminal
    /// state are ignored.
    pub fn set_status(&self, status: CommandStatus) {
        let mut current = self.status.lock();
        if current.is_terminal() || status.rank() < current.rank() {
            tracing::debug!(event.id = self.id.0, from = %current, to = %status, "ignoring status regression");
            return;
        }
        *current = status;
        if current.is_terminal() {
            self.condvar.notify_all();
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status.lock().is_terminal()
    }

    /// Block until the event is terminal.
    pub fn wait(&self) -> Result<()> {
        let mut status = self.status.lock();
        while !status.is_terminal() {
            self.condvar.wait(&mut status);
        }
        self.outcome(&status)
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut status = self.status.lock();
        while !status.is_terminal() {
            if self.condvar.wait_until(&mut status, deadline).timed_out() && !status.is_terminal() {
                return EventTimeoutSnafu { event: self.id.0, waited_ms: timeout.as_millis() as u64 }.fail();
            }
        }
        self.outcome(&status)
    }

    fn outcome(&self, status: &CommandStatus) -> Result<()> {
        match status {
            CommandStatus::Failed(message) => EventFailedSnafu { event: self.id.0, message: message.clone() }.fail(),
            _ => Ok(()),
        }
    }
}
