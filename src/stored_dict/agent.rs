//! Background sync agent for a stored dictionary.
//!
//! Each `StoredDict` owns one [`Shared`] block. Mutations call
//! [`Shared::schedule_sync`], which pushes the deadline out to `now + delay` and
//! starts the agent thread if none is running for this dictionary. The agent sleeps
//! until the deadline stops moving (or a flush asks it to hurry), writes one full
//! snapshot, and exits.
//!
//! Bookkeeping lives under the `sync` mutex so that "is an agent running?" and
//! "start one" are a single step, and so that the agent's decision to exit cannot
//! miss a mutation that arrived while it was writing.

use super::format;
use crate::error::AppResult;
use parking_lot::{Condvar, Mutex};
use serde_yaml::Mapping;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, debug_span, error};

/// Counter for generating unique sync keys.
static SYNC_KEY_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Longest wait actually scheduled; larger delays are clamped to it.
const MAX_WAIT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + delay`, clamped so that no delay can overflow the clock.
fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay.min(MAX_WAIT))
        .or_else(|| now.checked_add(Duration::from_secs(24 * 60 * 60)))
        .unwrap_or(now)
}

#[derive(Debug)]
pub(crate) struct SyncState {
    /// Write no earlier than this, unless `abort` is set.
    deadline: Instant,
    /// Set by a flush to cut the remaining wait short.
    abort: bool,
    /// Handle of the running agent, `None` when idle.
    agent: Option<JoinHandle<()>>,
    /// Bumped by every mutation.
    generation: u64,
    /// Highest generation known to be on disk.
    flushed: u64,
    /// Completed writes.
    writes: u64,
}

/// State shared between a `StoredDict` handle and its agent thread.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) key: u64,
    pub(crate) path: PathBuf,
    pub(crate) title: String,
    pub(crate) delay: Duration,
    pub(crate) cache: Mutex<Mapping>,
    /// Serializes snapshot-and-write so a newer snapshot is never overwritten by
    /// an older one.
    writer: Mutex<()>,
    sync: Mutex<SyncState>,
    cv: Condvar,
}

impl Shared {
    pub(crate) fn new(path: PathBuf, title: String, delay: Duration, cache: Mapping) -> Self {
        Self {
            key: SYNC_KEY_COUNTER.fetch_add(1, Ordering::SeqCst),
            path,
            title,
            delay,
            cache: Mutex::new(cache),
            writer: Mutex::new(()),
            sync: Mutex::new(SyncState {
                deadline: Instant::now(),
                abort: false,
                agent: None,
                generation: 0,
                flushed: 0,
                writes: 0,
            }),
            cv: Condvar::new(),
        }
    }

    /// Records a mutation and makes sure an agent will write it out.
    pub(crate) fn schedule_sync(self: &Arc<Self>) {
        let mut state = self.sync.lock();
        state.generation += 1;
        state.deadline = deadline_after(Instant::now(), self.delay);
        debug!(
            sync_key = self.key,
            delay_s = self.delay.as_secs_f64(),
            "new sync deadline"
        );

        if state.agent.is_none() {
            let shared = Arc::clone(self);
            // Agent events stay attached to the caller's span.
            let span = debug_span!("sync_agent", sync_key = self.key);
            let spawned = thread::Builder::new()
                .name(format!("sync_agent_{:x}", self.key))
                .spawn(move || span.in_scope(|| shared.run_agent()));
            match spawned {
                Ok(handle) => state.agent = Some(handle),
                Err(e) => error!(
                    sync_key = self.key,
                    error = %e,
                    "could not start sync agent; contents stay in memory until flushed"
                ),
            }
        }
    }

    /// True while an agent thread is alive for this dictionary.
    pub(crate) fn sync_in_progress(&self) -> bool {
        self.sync.lock().agent.is_some()
    }

    /// Number of completed writes, foreground and background.
    pub(crate) fn write_count(&self) -> u64 {
        self.sync.lock().writes
    }

    /// Writes the current contents before returning.
    ///
    /// With an agent running, the agent is told to stop waiting and this call
    /// blocks until a write covering every mutation made so far has landed. If the
    /// agent cannot provide that (its write failed), or no agent is running, the
    /// write happens here and its error is returned.
    pub(crate) fn flush(&self) -> AppResult<()> {
        debug!(sync_key = self.key, "flush()");
        {
            let mut state = self.sync.lock();
            let target = state.generation;
            if state.agent.is_some() {
                state.abort = true;
                self.cv.notify_all();
                while state.agent.is_some() && state.flushed < target {
                    self.cv.wait(&mut state);
                }
                if state.flushed >= target {
                    return Ok(());
                }
            }
        }
        self.write_snapshot().map(|_| ())
    }

    /// Snapshots the cache and writes it, returning the generation written.
    fn write_snapshot(&self) -> AppResult<u64> {
        let _writing = self.writer.lock();
        // Read the generation before copying the cache: the copy is then at least
        // as new as the generation recorded for it.
        let target = self.sync.lock().generation;
        let snapshot = self.cache.lock().clone();
        format::dump(&self.path, &snapshot, Some(&self.title))?;

        let mut state = self.sync.lock();
        state.flushed = state.flushed.max(target);
        state.writes += 1;
        self.cv.notify_all();
        Ok(target)
    }

    fn run_agent(self: Arc<Self>) {
        debug!(sync_key = self.key, "Starting sync agent...");
        loop {
            {
                let mut state = self.sync.lock();
                while !state.abort {
                    let deadline = state.deadline;
                    if Instant::now() >= deadline {
                        break;
                    }
                    self.cv.wait_until(&mut state, deadline);
                }
                state.abort = false;
            }
            debug!(sync_key = self.key, "Sync waiting period ended");

            let result = self.write_snapshot();

            let mut state = self.sync.lock();
            match result {
                Ok(written) if state.generation > written => {
                    // Mutated during the write; their deadline is already set.
                    continue;
                }
                Ok(_) => {}
                Err(e) => error!(
                    sync_key = self.key,
                    file = %self.path.display(),
                    error = %e,
                    "background write failed"
                ),
            }
            state.agent = None;
            state.abort = false;
            self.cv.notify_all();
            debug!(sync_key = self.key, "Sync agent finished");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_never_overflows() {
        let now = Instant::now();
        assert_eq!(
            deadline_after(now, Duration::from_millis(200)),
            now + Duration::from_millis(200)
        );
        assert!(deadline_after(now, Duration::MAX) > now);
        assert!(deadline_after(now, MAX_WAIT * 2) <= now + MAX_WAIT);
    }
}
