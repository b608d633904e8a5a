//! High-level lock management. Factory for [`Lock`] guards.
//!
//! Safe against concurrent processes (through [`LockStore`]) and against
//! concurrent threads of one process.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use super::record::LockRecord;
use super::{LockError, LockStore, Mode, Owner};
use crate::console::Console;

/// Timing and staleness policy of a [`LockManager`].
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Give up waiting after this long.
    pub timeout: Duration,
    /// Delay between two looks at the store while waiting.
    pub poll_interval: Duration,
    /// Delay between two progress notices while waiting.
    pub progress_interval: Duration,
    /// Drop holds of dead processes on this host instead of waiting for them.
    pub reclaim_stale: bool,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            progress_interval: Duration::from_secs(10),
            reclaim_stale: true,
        }
    }
}

#[derive(Debug)]
pub struct LockManager {
    store: LockStore,
    owner: Owner,
    options: LockOptions,
    /// Locks handed out and not yet released, oldest first.
    active: Mutex<Vec<(String, Mode)>>,
}

impl LockManager {
    pub fn new(store: LockStore, owner: Owner, options: LockOptions) -> Self {
        Self {
            store,
            owner,
            options,
            active: Mutex::new(Vec::new()),
        }
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn store(&self) -> &LockStore {
        &self.store
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Acquire `mode` on `resource`, waiting for other owners if necessary.
    ///
    /// While blocked, a notice naming the current holder is printed to
    /// `console` every `progress_interval`. Fails with
    /// [`LockError::Timeout`] once `timeout` has passed.
    pub fn acquire(
        &self,
        resource: &str,
        mode: Mode,
        console: &Console,
    ) -> Result<Lock<'_>, LockError> {
        let started = Instant::now();
        let mut last_notice: Option<Instant> = None;

        loop {
            let conflict = match self.try_acquire(resource, mode)? {
                Ok(lock) => return Ok(lock),
                Err(conflict) => conflict,
            };
            let (holder, operation) = describe_blocker(&conflict, &self.owner);
            let waited = started.elapsed();
            if waited >= self.options.timeout {
                return Err(LockError::Timeout {
                    resource: resource.to_string(),
                    mode,
                    holder,
                    operation,
                    waited_secs: waited.as_secs(),
                });
            }
            if last_notice.is_none_or(|t| t.elapsed() >= self.options.progress_interval) {
                console.info(format!(
                    "waiting for {holder} running '{operation}': {}s",
                    waited.as_secs()
                ));
                last_notice = Some(Instant::now());
            }
            thread::sleep(self.options.poll_interval);
        }
    }

    /// Like [`acquire`](Self::acquire) but returns `None` instead of waiting.
    pub fn acquire_opt(
        &self,
        resource: &str,
        mode: Mode,
    ) -> Result<Option<Lock<'_>>, LockError> {
        Ok(self.try_acquire(resource, mode)?.ok())
    }

    /// Release one level. Equivalent to dropping the guard, but reports errors.
    pub fn release(&self, lock: Lock<'_>) -> Result<(), LockError> {
        lock.release()
    }

    /// True iff nobody holds `resource`.
    pub fn empty(&self, resource: &str) -> Result<bool, LockError> {
        Ok(self.store.read()?.record(resource).is_none())
    }

    /// True iff nobody holds anything in this installation.
    pub fn is_idle(&self) -> Result<bool, LockError> {
        Ok(self.store.read()?.is_empty())
    }

    /// True iff any of `resources` is held exclusively by anybody.
    pub fn has_exclusive(&self, resources: &[&str]) -> Result<bool, LockError> {
        let table = self.store.read()?;
        Ok(resources.iter().any(|resource| {
            table
                .record(resource)
                .is_some_and(|record| record.exclusive.is_some())
        }))
    }

    /// Snapshot of the record for `resource`.
    pub fn holders(&self, resource: &str) -> Result<Option<LockRecord>, LockError> {
        Ok(self.store.read()?.record(resource).cloned())
    }

    /// Owners on this host whose process is gone; dropped from the store when
    /// `repair` is set.
    pub fn validate(&self, repair: bool) -> Result<Vec<Owner>, LockError> {
        self.store.update(|table| {
            let stale: Vec<Owner> = table
                .owners()
                .into_iter()
                .filter(Owner::is_stale)
                .collect();
            if repair {
                for owner in &stale {
                    let resources = table.release_all(owner);
                    tracing::warn!(owner = %owner, ?resources, "released locks of stale owner");
                }
            }
            stale
        })
    }

    /// Release every lock this manager still holds.
    ///
    /// Used on interruption, when guards on the stack will never be dropped.
    pub fn release_active(&self) -> Result<usize, LockError> {
        let drained: Vec<(String, Mode)> = std::mem::take(&mut *self.active_list());
        if drained.is_empty() {
            return Ok(0);
        }
        let count = drained.len();
        self.store.update(|table| {
            for (resource, mode) in drained.iter().rev() {
                tracing::info!(resource = %resource, %mode, "shutdown: unlocking");
                table.release(resource, *mode, &self.owner);
            }
        })?;
        Ok(count)
    }

    /// Single compatibility check; reclaims stale holders once if allowed.
    fn try_acquire(
        &self,
        resource: &str,
        mode: Mode,
    ) -> Result<Result<Lock<'_>, LockRecord>, LockError> {
        if mode == Mode::None {
            return Ok(Ok(Lock::new(self, resource, mode)));
        }
        let owner = &self.owner;
        let reclaim = self.options.reclaim_stale;
        let outcome = self.store.update(|table| {
            let conflict = match table.try_lock(resource, mode, owner) {
                Ok(()) => return Ok(()),
                Err(conflict) => conflict,
            };
            if !reclaim {
                return Err(conflict);
            }
            let stale: Vec<Owner> = conflict
                .holders()
                .map(|(_, h)| h.owner.clone())
                .filter(|o| !o.is(owner) && o.is_stale())
                .collect();
            if stale.is_empty() {
                return Err(conflict);
            }
            for dead in &stale {
                let resources = table.release_all(dead);
                tracing::warn!(owner = %dead, ?resources, "reclaimed locks of dead process");
            }
            table.try_lock(resource, mode, owner)
        })?;

        match outcome {
            Ok(()) => {
                tracing::debug!(resource, %mode, owner = %self.owner, "lock acquired");
                self.active_list().push((resource.to_string(), mode));
                Ok(Ok(Lock::new(self, resource, mode)))
            }
            Err(conflict) => Ok(Err(conflict)),
        }
    }

    fn release_level(&self, resource: &str, mode: Mode) -> Result<(), LockError> {
        if mode == Mode::None {
            return Ok(());
        }
        {
            let mut active = self.active_list();
            let Some(idx) = active
                .iter()
                .rposition(|(r, m)| r == resource && *m == mode)
            else {
                return Err(self.not_held(resource, mode));
            };
            active.remove(idx);
        }
        let released = self
            .store
            .update(|table| table.release(resource, mode, &self.owner))?;
        if !released {
            return Err(self.not_held(resource, mode));
        }
        tracing::debug!(resource, %mode, owner = %self.owner, "lock released");
        Ok(())
    }

    fn not_held(&self, resource: &str, mode: Mode) -> LockError {
        LockError::NotHeld {
            resource: resource.to_string(),
            mode,
            owner: self.owner.to_string(),
        }
    }

    fn active_list(&self) -> std::sync::MutexGuard<'_, Vec<(String, Mode)>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn describe_blocker(conflict: &LockRecord, me: &Owner) -> (String, String) {
    match conflict.blocker(me) {
        Some(holder) => (holder.owner.to_string(), holder.owner.operation.clone()),
        None => ("unknown".to_string(), "unknown".to_string()),
    }
}

/// One acquired level of a lock; released on drop.
#[derive(Debug)]
#[must_use = "dropping a Lock releases it immediately"]
pub struct Lock<'a> {
    manager: &'a LockManager,
    resource: String,
    mode: Mode,
    released: bool,
}

impl<'a> Lock<'a> {
    fn new(manager: &'a LockManager, resource: &str, mode: Mode) -> Self {
        Self {
            manager,
            resource: resource.to_string(),
            mode,
            released: false,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Release explicitly, surfacing store errors instead of logging them.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        self.manager.release_level(&self.resource, self.mode)
    }
}

impl Drop for Lock<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.manager.release_level(&self.resource, self.mode) {
            tracing::error!(resource = %self.resource, mode = %self.mode, "failed to release lock: {err}");
        }
    }
}
