// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Bounded job pool: a counting semaphore sized by `-j`/`jobs`, acquired and
//! released in variable-sized batches (a task's `job_count`, not always 1).
//!
//! Ported from the original engine's `asyncio.Condition`-based pool rather
//! than built on `tokio::sync::Semaphore`, because slots are requested in
//! batches and released in batches together, and because release broadcasts
//! to every waiter instead of waking one permit at a time. Under heavy
//! contention this wakes every waiter on every release (documented as
//! O(N^2) in the worst case) — accepted, since job pools are small
//! (single/double digit capacity) in practice.

use std::sync::Mutex;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{HanchoError, Result, TaskError};

struct State {
    capacity: usize,
    in_use: usize,
}

/// A bounded pool of job slots.
pub struct JobPool {
    state: Mutex<State>,
    notify: Notify,
}

impl JobPool {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                capacity: capacity.max(1),
                in_use: 0,
            }),
            notify: Notify::new(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.lock().expect("job pool lock poisoned").capacity
    }

    /// Acquires `count` slots, blocking until they're free.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Unschedulable`] if `count` exceeds the pool's
    /// capacity — such a request could never be satisfied and would
    /// deadlock forever otherwise. Returns [`HanchoError::Cancelled`] if
    /// `cancel` fires before enough slots become free.
    pub async fn acquire(
        &self,
        name: &str,
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<JobGuard<'_>> {
        let wanted = count.max(1);
        let capacity = self.state.lock().expect("job pool lock poisoned").capacity;
        if wanted > capacity {
            return Err(TaskError::Unschedulable {
                name: name.to_string(),
                requested: wanted,
                capacity,
            }
            .into());
        }
        loop {
            {
                let mut state = self.state.lock().expect("job pool lock poisoned");
                if state.capacity - state.in_use >= wanted {
                    state.in_use += wanted;
                    return Ok(JobGuard { pool: self, count: wanted });
                }
            }
            tokio::select! {
                () = self.notify.notified() => {}
                () = cancel.cancelled() => return Err(HanchoError::Cancelled.into()),
            }
        }
    }

    fn release(&self, count: usize) {
        {
            let mut state = self.state.lock().expect("job pool lock poisoned");
            state.in_use = state.in_use.saturating_sub(count);
        }
        // Broadcast: every waiter re-checks, not just one.
        self.notify.notify_waiters();
    }
}

/// RAII guard releasing its job slots (back to the pool, broadcasting to all
/// waiters) on drop.
#[must_use]
pub struct JobGuard<'a> {
    pool: &'a JobPool,
    count: usize,
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.pool.release(self.count);
    }
}
