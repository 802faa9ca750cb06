use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

use crate::mutex::{Condvar, LockError, Mutex, lock, lock_recover, wait_for};

/// What one execution of the work produced.
pub(crate) type Outcome<T, E> = core::result::Result<T, E>;

/// Used when `arrived + timeout` does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Returns the instant a waiter that arrived at `arrived` gives up.
pub(crate) fn deadline(arrived: Instant, timeout: Duration) -> Instant {
    arrived
        .checked_add(timeout)
        .unwrap_or_else(|| arrived + FAR_FUTURE)
}

/// How a caller entered the current generation of a key.
pub(crate) enum Admission<T, E> {
    /// The caller holds a worker slot and must run the work.
    Worker,
    /// The generation already has a published outcome.
    Ready(Outcome<T, E>),
    /// All worker slots are taken; the caller holds a waiter ticket.
    Waiter(u64),
}

/// The result of checking on a waiter ticket.
pub(crate) enum WaitStatus<T, E> {
    /// A worker published an outcome to this waiter.
    Delivered(Outcome<T, E>),
    /// A worker slot freed up without a publication and this waiter took it.
    Promoted,
    /// Nothing happened yet (or, from a blocking wait, the deadline passed).
    Pending,
}

/// Mutable coordination state for one key.
///
/// `number` identifies the current generation. An outcome is stored once per
/// generation by the first worker to finish and the generation retires when
/// the last worker leaves, so the next caller starts fresh.
///
/// Waiters are kept in ticket order. A publication fills every empty slot;
/// a waiter collects its slot on its next poll.
pub(crate) struct Generation<T, E> {
    number: u64,
    workers: usize,
    outcome: Option<Outcome<T, E>>,
    waiters: BTreeMap<u64, Option<Outcome<T, E>>>,
    next_ticket: u64,
}

impl<T, E> Generation<T, E> {
    fn new() -> Self {
        Self {
            number: 0,
            workers: 0,
            outcome: None,
            waiters: BTreeMap::new(),
            next_ticket: 0,
        }
    }

    /// No workers, no waiters, nothing published.
    pub(crate) fn is_idle(&self) -> bool {
        self.workers == 0 && self.waiters.is_empty() && self.outcome.is_none()
    }

    /// Releases a worker slot and retires the generation if it was the last
    /// worker and an outcome exists. Returns the retired generation number.
    fn release_worker(&mut self) -> Option<u64> {
        debug_assert!(self.workers > 0);
        self.workers = self.workers.saturating_sub(1);
        if self.workers == 0 && self.outcome.is_some() {
            self.outcome = None;
            let retired = self.number;
            self.number = self.number.wrapping_add(1);
            return Some(retired);
        }
        None
    }

    fn leave(&mut self, ticket: u64) {
        self.waiters.remove(&ticket);
    }
}

impl<T: Clone, E: Clone> Generation<T, E> {
    /// Admits a caller: an already published outcome is handed out first,
    /// then free worker slots, then a waiter ticket.
    pub(crate) fn admit(&mut self, threads_per_key: usize) -> Admission<T, E> {
        if let Some(outcome) = &self.outcome {
            return Admission::Ready(outcome.clone());
        }
        if self.workers < threads_per_key {
            self.workers += 1;
            return Admission::Worker;
        }
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.waiters.insert(ticket, None);
        Admission::Waiter(ticket)
    }

    /// Collects a delivered outcome, or promotes the waiter when a worker
    /// slot is free. Free slots go to the oldest undelivered waiters first.
    pub(crate) fn poll(&mut self, ticket: u64, threads_per_key: usize) -> WaitStatus<T, E> {
        if let Some(slot) = self.waiters.get_mut(&ticket) {
            if let Some(outcome) = slot.take() {
                self.waiters.remove(&ticket);
                return WaitStatus::Delivered(outcome);
            }
        }
        if self.outcome.is_some() || self.workers >= threads_per_key {
            return WaitStatus::Pending;
        }
        let free = threads_per_key - self.workers;
        let ahead = self
            .waiters
            .range(..ticket)
            .filter(|(_, slot)| slot.is_none())
            .count();
        if ahead < free {
            self.waiters.remove(&ticket);
            self.workers += 1;
            return WaitStatus::Promoted;
        }
        WaitStatus::Pending
    }

    /// Stores `outcome` as this generation's result and delivers it to every
    /// registered waiter. Only the first call per generation has an effect.
    fn publish(&mut self, outcome: &Outcome<T, E>) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        for slot in self.waiters.values_mut().filter(|slot| slot.is_none()) {
            *slot = Some(outcome.clone());
        }
        self.outcome = Some(outcome.clone());
        true
    }
}

/// Per-key state: the generation behind its own lock, plus a condvar that
/// blocking waiters park on between polls.
pub(crate) struct KeyState<T, E> {
    #[cfg(feature = "cache-padded")]
    generation: crossbeam_utils::CachePadded<Mutex<Generation<T, E>>>,
    #[cfg(not(feature = "cache-padded"))]
    generation: Mutex<Generation<T, E>>,
    published: Condvar,
}

impl<T, E> KeyState<T, E> {
    fn new() -> Self {
        Self {
            #[cfg(feature = "cache-padded")]
            generation: crossbeam_utils::CachePadded::new(Mutex::new(Generation::new())),
            #[cfg(not(feature = "cache-padded"))]
            generation: Mutex::new(Generation::new()),
            published: Condvar::new(),
        }
    }
}

struct Entry<T, E> {
    state: Arc<KeyState<T, E>>,
    users: usize,
}

/// The live set of keys a coordinator is working on.
///
/// The registry lock only guards lookup, insertion and eviction. It is never
/// held while work runs or while a waiter waits, so different keys do not
/// contend beyond that. Lock order is always registry, then key.
pub(crate) struct Registry<T, E> {
    keys: Mutex<HashMap<String, Entry<T, E>>>,
}

impl<T, E> Registry<T, E> {
    pub(crate) fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a caller for `key`, creating its state on first use.
    pub(crate) fn enter<'a>(&'a self, key: &'a str) -> Result<Participant<'a, T, E>, LockError> {
        let mut keys = lock(&self.keys)?;
        let state = match keys.get_mut(key) {
            Some(entry) => {
                entry.users += 1;
                Arc::clone(&entry.state)
            }
            None => {
                let state = Arc::new(KeyState::new());
                keys.insert(
                    key.to_owned(),
                    Entry {
                        state: Arc::clone(&state),
                        users: 1,
                    },
                );
                state
            }
        };
        drop(keys);

        Ok(Participant {
            registry: self,
            key,
            state,
            role: Role::Arriving,
        })
    }

    /// Deregisters a caller and evicts the key once nobody uses it. The idle
    /// check runs again under the registry lock, so a caller entering
    /// concurrently either finds the entry or creates a fresh one.
    fn exit(&self, key: &str) {
        let mut keys = lock_recover(&self.keys);
        let Some(entry) = keys.get_mut(key) else {
            return;
        };
        entry.users = entry.users.saturating_sub(1);
        if entry.users > 0 {
            return;
        }
        if lock_recover(&entry.state.generation).is_idle() {
            keys.remove(key);
            #[cfg(feature = "tracing")]
            trace!(key, "evicted key");
        }
    }

    /// Number of callers currently inside `run` per key.
    pub(crate) fn thread_counts(&self) -> HashMap<String, usize> {
        lock_recover(&self.keys)
            .iter()
            .map(|(key, entry)| (key.clone(), entry.users))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock_recover(&self.keys).len()
    }
}

enum Role {
    Arriving,
    Worker,
    Waiter(u64),
    Done,
}

/// One caller's stay inside a key.
///
/// Dropping a participant that still holds a worker slot (the work panicked,
/// or an async caller was cancelled) releases the slot without publishing,
/// so a waiter can take over. Dropping a waiter removes it from the waiter
/// set. Either way the caller is deregistered from the key.
pub(crate) struct Participant<'a, T, E> {
    registry: &'a Registry<T, E>,
    key: &'a str,
    state: Arc<KeyState<T, E>>,
    role: Role,
}

impl<T: Clone, E: Clone> Participant<'_, T, E> {
    pub(crate) fn admit(&mut self, threads_per_key: usize) -> Result<Admission<T, E>, LockError> {
        let admission = lock(&self.state.generation)?.admit(threads_per_key);
        self.role = match &admission {
            Admission::Worker => {
                #[cfg(feature = "tracing")]
                trace!(key = self.key, "admitted as worker");
                Role::Worker
            }
            Admission::Ready(_) => {
                #[cfg(feature = "tracing")]
                trace!(key = self.key, "joined published generation");
                Role::Done
            }
            Admission::Waiter(ticket) => {
                #[cfg(feature = "tracing")]
                trace!(key = self.key, ticket, "admitted as waiter");
                Role::Waiter(*ticket)
            }
        };
        Ok(admission)
    }

    /// Checks a waiter ticket once without blocking.
    pub(crate) fn poll(
        &mut self,
        ticket: u64,
        threads_per_key: usize,
    ) -> Result<WaitStatus<T, E>, LockError> {
        let status = lock(&self.state.generation)?.poll(ticket, threads_per_key);
        self.settle(&status);
        Ok(status)
    }

    /// Blocks on a waiter ticket, re-checking at least every `minor` until
    /// `deadline`. Returns [`WaitStatus::Pending`] if the deadline passed; the
    /// waiter has then left the waiter set.
    pub(crate) fn wait(
        &mut self,
        ticket: u64,
        threads_per_key: usize,
        minor: Duration,
        deadline: Instant,
    ) -> Result<WaitStatus<T, E>, LockError> {
        let mut generation = lock(&self.state.generation)?;
        loop {
            let status = generation.poll(ticket, threads_per_key);
            if !matches!(status, WaitStatus::Pending) {
                drop(generation);
                self.settle(&status);
                return Ok(status);
            }
            let now = Instant::now();
            if now >= deadline {
                generation.leave(ticket);
                drop(generation);
                self.role = Role::Done;
                return Ok(WaitStatus::Pending);
            }
            generation = wait_for(&self.state.published, generation, minor.min(deadline - now))?;
        }
    }

    /// Leaves the waiter set after the caller stopped waiting.
    pub(crate) fn give_up(&mut self) {
        if let Role::Waiter(ticket) = self.role {
            lock_recover(&self.state.generation).leave(ticket);
            self.state.published.notify_all();
            self.role = Role::Done;
        }
    }

    /// Publishes a worker's outcome and releases its slot. Never fails: a
    /// finished outcome is always handed over, even past a poisoned lock.
    pub(crate) fn complete(&mut self, outcome: &Outcome<T, E>) {
        if !matches!(self.role, Role::Worker) {
            return;
        }
        let mut generation = lock_recover(&self.state.generation);
        let _published = generation.publish(outcome);
        #[cfg(feature = "tracing")]
        if _published {
            debug!(
                key = self.key,
                generation = generation.number,
                waiters = generation.waiters.len(),
                ok = outcome.is_ok(),
                "published outcome"
            );
        }
        let _retired = generation.release_worker();
        #[cfg(feature = "tracing")]
        if let Some(number) = _retired {
            trace!(key = self.key, generation = number, "retired generation");
        }
        drop(generation);
        self.role = Role::Done;
        self.state.published.notify_all();
    }

    fn settle(&mut self, status: &WaitStatus<T, E>) {
        match status {
            WaitStatus::Delivered(_) => self.role = Role::Done,
            WaitStatus::Promoted => {
                #[cfg(feature = "tracing")]
                debug!(key = self.key, "waiter promoted to worker");
                self.role = Role::Worker;
            }
            WaitStatus::Pending => {}
        }
    }
}

impl<T, E> Drop for Participant<'_, T, E> {
    fn drop(&mut self) {
        match self.role {
            Role::Worker => {
                let mut generation = lock_recover(&self.state.generation);
                let _retired = generation.release_worker();
                #[cfg(feature = "tracing")]
                debug!(
                    key = self.key,
                    generation = generation.number,
                    workers = generation.workers,
                    retired = _retired.is_some(),
                    "worker abandoned without an outcome"
                );
                drop(generation);
                self.state.published.notify_all();
            }
            Role::Waiter(ticket) => {
                lock_recover(&self.state.generation).leave(ticket);
                self.state.published.notify_all();
            }
            Role::Arriving | Role::Done => {}
        }
        self.registry.exit(self.key);
    }
}
