//! Per-channel fade bookkeeping.
//!
//! A [`FadeState`] is created the first time a channel is used through the
//! fade aware API and lives until the fade service is uninstalled. Tasks get
//! exclusive access to a channel's duty registers through two guards:
//!
//! - [`HardwareGuard`], held while the registers are reprogrammed, and handed
//!   off to the interrupt handler while a fade is running.
//! - [`OperationGuard`], held by the thread-safe entry points around a whole
//!   configure-and-start sequence.
//!
//! The fields the interrupt handler reads live in critical section cells.

use alloc::sync::Arc;
use core::cell::{Cell, RefCell};

use critical_section::Mutex;
use portable_atomic::{AtomicBool, Ordering};

use super::{Direction, FadeEndCallback, FadeMode};
use crate::{
    Error,
    SPEED_MODE_COUNT,
    channel::{CHANNEL_COUNT, ChannelId},
    hal::ChannelHw,
    sync::{Completion, OperationGuard, OperationLock, Semaphore},
};

/// Fade parameters shared with the interrupt handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FadeParams {
    pub target: u32,
    pub direction: Direction,
    pub scale: u32,
    pub cycle_count: u32,
    pub mode: FadeMode,
    /// Set while the fade-end interrupt belongs to a running fade.
    pub running: bool,
}

impl FadeParams {
    const IDLE: Self = Self {
        target: 0,
        direction: Direction::Increase,
        scale: 0,
        cycle_count: 0,
        mode: FadeMode::NonBlocking,
        running: false,
    };
}

pub(crate) struct FadeState<S: Semaphore> {
    params: Mutex<Cell<FadeParams>>,
    callback: Mutex<Cell<Option<FadeEndCallback>>>,
    hw_busy: Completion<S>,
    op_lock: OperationLock<S>,
}

impl<S: Semaphore> FadeState<S> {
    /// Returns `None` if a primitive could not be created. Primitives created
    /// up to that point are dropped again.
    fn new() -> Option<Self> {
        let hw_busy = Completion::new()?;
        let op_lock = OperationLock::new()?;

        Some(Self {
            params: Mutex::new(Cell::new(FadeParams::IDLE)),
            callback: Mutex::new(Cell::new(None)),
            hw_busy,
            op_lock,
        })
    }

    pub(crate) fn params(&self) -> FadeParams {
        critical_section::with(|cs| self.params.borrow(cs).get())
    }

    pub(crate) fn set_params(&self, params: FadeParams) {
        critical_section::with(|cs| self.params.borrow(cs).set(params));
    }

    pub(crate) fn callback(&self) -> Option<FadeEndCallback> {
        critical_section::with(|cs| self.callback.borrow(cs).get())
    }

    pub(crate) fn set_callback(&self, callback: Option<FadeEndCallback>) {
        critical_section::with(|cs| self.callback.borrow(cs).set(callback));
    }

    /// Wait until no fade is running on the channel, then take ownership of
    /// its duty registers.
    ///
    /// The channel's fade-end interrupt is disabled while the guard is held.
    pub(crate) fn acquire_hardware<'a, H: ChannelHw>(
        &'a self,
        hw: &H,
        channel: ChannelId,
    ) -> HardwareGuard<'a, S> {
        self.hw_busy.wait();
        critical_section::with(|_| hw.set_fade_end_intr(channel, false));

        HardwareGuard { state: self }
    }

    /// Serialize a whole configure-and-start sequence.
    pub(crate) fn acquire_operation(&self) -> OperationGuard<'_, S> {
        self.op_lock.lock()
    }

    /// Mark the fade as finished, from the interrupt handler.
    ///
    /// Returns `true` if a task waiting for the channel was woken up.
    pub(crate) fn release_from_isr(&self) -> bool {
        let mut woken = false;
        self.hw_busy.signal_from_isr(&mut woken);
        woken
    }
}

/// Exclusive access to the duty registers of a channel. Released on drop.
#[must_use = "the hardware is released as soon as the guard is dropped"]
pub(crate) struct HardwareGuard<'a, S: Semaphore> {
    state: &'a FadeState<S>,
}

impl<S: Semaphore> HardwareGuard<'_, S> {
    /// Keep the hardware busy after the guard goes away. The interrupt
    /// handler releases it when the fade converges.
    pub(crate) fn hand_off(self) {
        core::mem::forget(self);
    }
}

impl<S: Semaphore> Drop for HardwareGuard<'_, S> {
    fn drop(&mut self) {
        self.state.hw_busy.signal();
    }
}

type Slots<S> = [[Option<Arc<FadeState<S>>>; CHANNEL_COUNT]; SPEED_MODE_COUNT];

fn empty_slots<S: Semaphore>() -> Slots<S> {
    core::array::from_fn(|_| core::array::from_fn(|_| None))
}

/// All fade states, indexed by group and channel.
pub(crate) struct FadeRegistry<S: Semaphore> {
    installed: AtomicBool,
    slots: Mutex<RefCell<Slots<S>>>,
}

impl<S: Semaphore> FadeRegistry<S> {
    pub(crate) fn new() -> Self {
        Self {
            installed: AtomicBool::new(false),
            slots: Mutex::new(RefCell::new(empty_slots())),
        }
    }

    pub(crate) fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// Mark the service installed. Fails if it already was.
    pub(crate) fn install(&self) -> Result<(), Error> {
        self.installed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(drop)
            .map_err(|_| Error::AlreadyInstalled)
    }

    /// The fade state of a channel, if it has one.
    pub(crate) fn get(&self, channel: ChannelId) -> Option<Arc<FadeState<S>>> {
        critical_section::with(|cs| {
            self.slots.borrow_ref(cs)[channel.mode as usize][channel.number as usize].clone()
        })
    }

    /// The fade state of a channel, created on first use.
    pub(crate) fn ensure_initialized(&self, channel: ChannelId) -> Result<Arc<FadeState<S>>, Error> {
        if !self.is_installed() {
            error!("Fade service not installed, call install_fade_service first");
            return Err(Error::ServiceNotInstalled);
        }

        if let Some(state) = self.get(channel) {
            return Ok(state);
        }

        let Some(state) = FadeState::new() else {
            error!("Not enough memory for fade state of {:?}", channel);
            return Err(Error::ResourceExhausted);
        };

        // Another task may have won the race. Its state is kept, ours is
        // dropped outside the critical section.
        let mut fresh = Some(Arc::new(state));
        let state = critical_section::with(|cs| {
            let mut slots = self.slots.borrow_ref_mut(cs);
            let slot = &mut slots[channel.mode as usize][channel.number as usize];
            if slot.is_none() {
                *slot = fresh.take();
            }
            slot.clone()
        });
        drop(fresh);

        state.ok_or(Error::ResourceExhausted)
    }

    /// Forget every fade state. Returns `false` if the service was not
    /// installed.
    pub(crate) fn teardown_all(&self) -> bool {
        if !self.installed.swap(false, Ordering::AcqRel) {
            return false;
        }

        let states = critical_section::with(|cs| {
            core::mem::replace(&mut *self.slots.borrow_ref_mut(cs), empty_slots())
        });
        drop(states);

        true
    }
}
