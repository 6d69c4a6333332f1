//! # Blocking primitives
//!
//! The fade service has to put tasks to sleep while a fade is in flight, and
//! wake them from the fade-end interrupt. This needs a scheduler, so the
//! driver is generic over a [`Semaphore`] supplied by the RTOS it runs on.
//!
//! Two primitives are built on top of it:
//!
//! - [`Completion`], a binary semaphore that starts out free. Taking it blocks
//!   until it is signalled; signalling a free completion has no effect.
//! - [`OperationLock`], a plain mutex for task context.
//!
//! ## Implementation
//!
//! ```rust, ignore
//! use esp_ledc::sync::{Semaphore, SemaphoreKind};
//!
//! struct RtosSemaphore {
//!     // Semaphore implementation details
//! }
//!
//! impl Semaphore for RtosSemaphore {
//!     fn create(kind: SemaphoreKind) -> Option<Self> {
//!         unimplemented!()
//!     }
//!
//!     fn take(&self, timeout_us: Option<u32>) -> bool {
//!         unimplemented!()
//!     }
//!
//!     fn give(&self) -> bool {
//!         unimplemented!()
//!     }
//!
//!     fn try_give_from_isr(&self, higher_prio_task_waken: Option<&mut bool>) -> bool {
//!         unimplemented!()
//!     }
//!
//!     fn try_take(&self) -> bool {
//!         unimplemented!()
//!     }
//! }
//! ```

/// The type of semaphore or mutex to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SemaphoreKind {
    /// Counting semaphore.
    Counting {
        /// Largest value the counter may reach.
        max: u32,
        /// Counter value after creation.
        initial: u32,
    },

    /// Non-recursive mutex, initially unlocked.
    Mutex,
}

/// A semaphore provided by the RTOS.
pub trait Semaphore: Sized + Send + Sync {
    /// Creates a new semaphore instance.
    ///
    /// Returns `None` if the RTOS ran out of memory.
    fn create(kind: SemaphoreKind) -> Option<Self>;

    /// Decrements the semaphore's counter.
    ///
    /// If a timeout is given, this function blocks until either the semaphore
    /// could be taken, or the timeout has been reached. Without a timeout it
    /// blocks until the operation succeeds.
    ///
    /// Returns `true` if the semaphore was taken, `false` if the timeout was
    /// reached.
    fn take(&self, timeout_us: Option<u32>) -> bool;

    /// Increments the semaphore's counter.
    ///
    /// Returns `false` if the counter is already at its maximum.
    fn give(&self) -> bool;

    /// Increments the semaphore's counter from an ISR.
    ///
    /// If a task waiting on the semaphore was woken up, the implementation
    /// may set `higher_prio_task_waken` to `true` to request a context switch.
    fn try_give_from_isr(&self, higher_prio_task_waken: Option<&mut bool>) -> bool;

    /// Decrements the semaphore's counter without blocking.
    ///
    /// Returns `false` if the counter is zero.
    fn try_take(&self) -> bool;
}

/// Single-slot completion signal.
///
/// Shared between the task that owns a resource and the interrupt handler
/// that finishes using it.
pub struct Completion<S: Semaphore> {
    inner: S,
}

impl<S: Semaphore> Completion<S> {
    /// Create a completion in the signalled (free) state.
    pub fn new() -> Option<Self> {
        let inner = S::create(SemaphoreKind::Counting { max: 1, initial: 1 })?;
        Some(Self { inner })
    }

    /// Block until the completion is signalled, and consume the signal.
    pub fn wait(&self) {
        while !self.inner.take(None) {}
    }

    /// Consume the signal if present.
    pub fn try_wait(&self) -> bool {
        self.inner.try_take()
    }

    /// Signal the completion from task context.
    pub fn signal(&self) {
        self.inner.give();
    }

    /// Signal the completion from interrupt context.
    ///
    /// `woken` is set if a waiting task of higher priority has been woken up.
    pub fn signal_from_isr(&self, woken: &mut bool) {
        self.inner.try_give_from_isr(Some(woken));
    }
}

/// Task-level mutex without data.
pub struct OperationLock<S: Semaphore> {
    inner: S,
}

impl<S: Semaphore> OperationLock<S> {
    /// Create an unlocked mutex.
    pub fn new() -> Option<Self> {
        let inner = S::create(SemaphoreKind::Mutex)?;
        Some(Self { inner })
    }

    /// Block until the mutex is acquired.
    pub fn lock(&self) -> OperationGuard<'_, S> {
        while !self.inner.take(None) {}
        OperationGuard { lock: self }
    }
}

/// Releases an [`OperationLock`] on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct OperationGuard<'a, S: Semaphore> {
    lock: &'a OperationLock<S>,
}

impl<S: Semaphore> Drop for OperationGuard<'_, S> {
    fn drop(&mut self) {
        self.lock.inner.give();
    }
}
