//! Work-group artifact cache.
//!
//! Artifacts are keyed by program, device, kernel, local size and work-item
//! handler. Generation for one `(program, device)` pair is serialized by a
//! writer lock that the launch path holds from lookup until the command is
//! queued, so concurrent launches of the same kernel generate once and all
//! observe the same path. An artifact is staged in a temporary file next to
//! its final location and renamed into place, so a failed generation never
//! leaves anything at the final path.
//!
//! Resolved paths are memoized in a lock-free map, letting repeated launches
//! skip the filesystem check. Lock and memo entries of a program are pruned
//! once the program has been dropped, so both maps stay bounded by the live
//! programs times the devices they ran on.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Instant;

use itertools::Itertools;
use papaya::HashMap as ConcurrentMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use snafu::ResultExt;
use tessel_device::{Device, DeviceId};
use tessel_schedule::{LocalSize, WorkitemHandler};

use crate::error::{CacheIoSnafu, Result};
use crate::kernel::{Kernel, Program, ProgramId};

/// Where artifacts live on disk.
pub trait PathService: Send + Sync {
    fn path_for(&self, kernel: &Kernel, device: &Device, local: LocalSize, handler: WorkitemHandler) -> PathBuf;

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// `<root>/<program hash>/<device>/<kernel>/<lx>-<ly>-<lz>/<artifact>`
///
/// Device and kernel names are escaped so each stays a single path component.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PathService for CacheLayout {
    fn path_for(&self, kernel: &Kernel, device: &Device, local: LocalSize, handler: WorkitemHandler) -> PathBuf {
        self.root
            .join(format!("{:016x}", kernel.program().hash()))
            .join(path_component(device.name()))
            .join(path_component(kernel.name()))
            .join(local.iter().join("-"))
            .join(handler.artifact_name())
    }
}

/// Proof that the writer lock for one `(program, device)` pair is held.
/// Dropping it releases the lock.
pub struct CacheLock {
    program: ProgramId,
    device: DeviceId,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl CacheLock {
    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }
}

/// Percent-escape everything but ASCII alphanumerics, `_` and `-`, so names
/// such as `..` or `a/b` cannot leave their directory.
pub fn path_component(name: &str) -> String {
    if name.is_empty() {
        return "%".into();
    }
    name.bytes()
        .map(|b| match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' => (b as char).to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}

type CacheKey = (ProgramId, String, DeviceId, LocalSize, WorkitemHandler);

struct LockEntry {
    program: Weak<Program>,
    lock: Arc<Mutex<()>>,
}

pub struct WorkGroupCache {
    paths: Box<dyn PathService>,
    locks: Mutex<HashMap<(ProgramId, DeviceId), LockEntry>>,
    resolved: ConcurrentMap<CacheKey, PathBuf>,
}

impl WorkGroupCache {
    pub fn new(paths: impl PathService + 'static) -> Self {
        Self { paths: Box::new(paths), locks: Mutex::new(HashMap::new()), resolved: ConcurrentMap::new() }
    }

    pub fn paths(&self) -> &dyn PathService {
        self.paths.as_ref()
    }

    /// Block until no other launch is generating for `program` on `device`.
    pub fn acquire_writer_lock(&self, program: &Arc<Program>, device: DeviceId) -> CacheLock {
        let lock = {
            let mut locks = self.locks.lock();
            self.prune_dropped(&mut locks);
            let entry = locks
                .entry((program.id(), device))
                .or_insert_with(|| LockEntry { program: Arc::downgrade(program), lock: Arc::default() });
            Arc::clone(&entry.lock)
        };
        let guard = Mutex::lock_arc(&lock);
        CacheLock { program: program.id(), device, _guard: guard }
    }

    /// Remove lock and memo entries whose program no longer exists.
    fn prune_dropped(&self, locks: &mut HashMap<(ProgramId, DeviceId), LockEntry>) {
        let mut dropped = HashSet::new();
        locks.retain(|&(program, _), entry| {
            let live = entry.program.strong_count() > 0;
            if !live {
                dropped.insert(program);
            }
            live
        });
        if dropped.is_empty() {
            return;
        }
        let guard = self.resolved.guard();
        self.resolved.retain(|key, _| !dropped.contains(&key.0), &guard);
        tracing::debug!(programs = dropped.len(), "pruned work-group cache entries of dropped programs");
    }

    /// Number of `(program, device)` pairs with a writer lock.
    pub fn tracked_pairs(&self) -> usize {
        self.locks.lock().len()
    }

    /// Number of memoized artifact paths.
    pub fn memoized(&self) -> usize {
        self.resolved.len()
    }

    /// Path of the artifact for `kernel` at `local`, running `generate` to
    /// produce it on a miss. `generate` receives the staging file to write.
    pub fn resolve_or_generate<F>(
        &self,
        lock: &CacheLock,
        kernel: &Kernel,
        device: &Device,
        local: LocalSize,
        handler: WorkitemHandler,
        generate: F,
    ) -> Result<PathBuf>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        debug_assert!(
            lock.program == kernel.program().id() && lock.device == device.id(),
            "cache lock held for another program or device"
        );
        let key = (kernel.program().id(), kernel.name().to_string(), device.id(), local, handler);
        let guard = self.resolved.guard();
        if let Some(path) = self.resolved.get(&key, &guard) {
            tracing::debug!(kernel = %kernel.name(), ?local, "work-group cache hit (memoized)");
            return Ok(path.clone());
        }

        let path = self.paths.path_for(kernel, device, local, handler);
        if self.paths.exists(&path) {
            tracing::debug!(kernel = %kernel.name(), path = %path.display(), "work-group cache hit");
        } else {
            tracing::debug!(kernel = %kernel.name(), path = %path.display(), "work-group cache miss");
            stage(&path, generate)?;
        }
        self.resolved.insert(key, path.clone(), &guard);
        Ok(path)
    }

    /// Drop memoized paths; the next lookup consults the filesystem again.
    pub fn clear_memo(&self) {
        let guard = self.resolved.guard();
        self.resolved.clear(&guard);
    }
}

fn stage<F>(path: &Path, generate: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).context(CacheIoSnafu { path: dir })?;
    let staging = tempfile::Builder::new().prefix(".staging-").tempfile_in(dir).context(CacheIoSnafu { path: dir })?;

    let started = Instant::now();
    generate(staging.path())?;
    staging.persist(path).map_err(|e| e.error).context(CacheIoSnafu { path })?;
    tracing::info!(
        path = %path.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "generated work-group artifact"
    );
    Ok(())
}
