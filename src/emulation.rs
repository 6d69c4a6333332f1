//! # Host emulation
//!
//! A software model of the LEDC peripheral and its clock tree, plus a
//! [`Semaphore`] built on `std`, so the driver runs on a development machine.
//!
//! The model keeps the pieces of the peripheral the driver relies on:
//! the duty register with its fractional bits, fade segments that are
//! latched by the duty start bit (high speed) or the parameter update bit
//! (low speed), and the raw and enabled fade-end interrupt bits. Latched
//! segments run when [`EmulatedLedc::run_pending`] is called, which stands in
//! for the passing of time.
//!
//! [`InterruptThread`] plays the role of the interrupt controller.

use std::{
    sync::{
        Arc,
        Condvar,
        Mutex,
        MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
    vec::Vec,
};

use fugit::{HertzU32, RateExtU32};

use crate::{
    Ledc,
    SPEED_MODE_COUNT,
    SpeedMode,
    channel::{CHANNEL_COUNT, ChannelId},
    fade::Direction,
    hal::{ChannelHw, DUTY_FRACTIONAL_BITS, FadeParam, Instance, TimerHw},
    sync::{Semaphore, SemaphoreKind},
    timer::{self, ClockSource, TimerId},
};

const TIMER_COUNT: usize = 4;
const MAX_DUTY_RESOLUTION: u32 = 20;
const DUTY_REGISTER_BITS: u32 = 25;
const DUTY_INT_LIMIT: i64 = 1 << (DUTY_REGISTER_BITS - DUTY_FRACTIONAL_BITS);

/// A fade segment that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Duty when the segment was latched.
    pub start: u32,
    /// Step parameters.
    pub param: FadeParam,
    /// Duty when the segment ended.
    pub end: u32,
}

#[derive(Debug, Clone, Copy)]
struct ChannelRegs {
    duty_reg: u32,
    duty_int: u32,
    hpoint: u32,
    timer: timer::Number,
    param: FadeParam,
    sig_out_en: bool,
    idle_level: bool,
    duty_start: bool,
    fade_end_intr: bool,
    latched: Option<(u32, FadeParam)>,
}

impl ChannelRegs {
    const RESET: Self = Self {
        duty_reg: 0,
        duty_int: 0,
        hpoint: 0,
        timer: timer::Number::Timer0,
        param: FadeParam::NO_FADE,
        sig_out_en: false,
        idle_level: false,
        duty_start: false,
        fade_end_intr: false,
        latched: None,
    };
}

#[derive(Debug, Clone, Copy)]
struct TimerRegs {
    divider: u32,
    resolution: u32,
    source: ClockSource,
    paused: bool,
    resets: usize,
}

impl TimerRegs {
    const RESET: Self = Self {
        divider: 0,
        resolution: 0,
        source: ClockSource::Apb,
        paused: false,
        resets: 0,
    };
}

#[derive(Debug)]
struct Inner {
    supported: [bool; SPEED_MODE_COUNT],
    channels: [[ChannelRegs; CHANNEL_COUNT]; SPEED_MODE_COUNT],
    timers: [[TimerRegs; TIMER_COUNT]; SPEED_MODE_COUNT],
    raw_status: [u32; SPEED_MODE_COUNT],
    history: [[Vec<Segment>; CHANNEL_COUNT]; SPEED_MODE_COUNT],
    writes: usize,
    overlaps: usize,
    wraps: usize,
    frequency_queries: Vec<ClockSource>,
    rc_fast: Option<HertzU32>,
    rc_fast_calibrations: usize,
    isr_bound: bool,
    fail_isr_bind: bool,
}

impl Inner {
    fn channel(&mut self, channel: ChannelId) -> &mut ChannelRegs {
        self.writes += 1;
        &mut self.channels[channel.mode as usize][channel.number as usize]
    }

    fn timer(&mut self, timer: TimerId) -> &mut TimerRegs {
        self.writes += 1;
        &mut self.timers[timer.mode as usize][timer.number as usize]
    }

    fn latch(&mut self, channel: ChannelId) {
        let regs = self.channel(channel);
        let overlapping = regs.latched.is_some();
        regs.latched = Some((regs.duty_int, regs.param));
        regs.duty_start = false;

        if overlapping {
            self.overlaps += 1;
        }
    }
}

/// Software model of the LEDC peripheral.
///
/// Cloning returns a handle to the same model.
#[derive(Debug, Clone)]
pub struct EmulatedLedc {
    inner: Arc<Mutex<Inner>>,
}

impl Default for EmulatedLedc {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatedLedc {
    /// A peripheral with high and low speed channels, like the ESP32.
    pub fn new() -> Self {
        Self::with_groups([true, true])
    }

    /// A peripheral with low speed channels only.
    pub fn low_speed_only() -> Self {
        Self::with_groups([false, true])
    }

    fn with_groups(supported: [bool; SPEED_MODE_COUNT]) -> Self {
        let inner = Inner {
            supported,
            channels: [[ChannelRegs::RESET; CHANNEL_COUNT]; SPEED_MODE_COUNT],
            timers: [[TimerRegs::RESET; TIMER_COUNT]; SPEED_MODE_COUNT],
            raw_status: [0; SPEED_MODE_COUNT],
            history: Default::default(),
            writes: 0,
            overlaps: 0,
            wraps: 0,
            frequency_queries: Vec::new(),
            rc_fast: Some(8.MHz()),
            rc_fast_calibrations: 0,
            isr_bound: false,
            fail_isr_bind: false,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run every latched fade segment to its end and raise the fade-end
    /// interrupt of its channel.
    ///
    /// Returns `false` if nothing was latched.
    pub fn run_pending(&self) -> bool {
        let mut inner = self.lock();
        let mut ran = false;

        for mode in 0..SPEED_MODE_COUNT {
            for number in 0..CHANNEL_COUNT {
                let Some((start, param)) = inner.channels[mode][number].latched.take() else {
                    continue;
                };

                let change = param.num as i64 * param.scale as i64;
                let end = match param.direction {
                    Direction::Increase => start as i64 + change,
                    Direction::Decrease => start as i64 - change,
                };
                if !(0..DUTY_INT_LIMIT).contains(&end) {
                    inner.wraps += 1;
                }
                let end = end.rem_euclid(DUTY_INT_LIMIT) as u32;

                inner.channels[mode][number].duty_reg = end << DUTY_FRACTIONAL_BITS;
                inner.history[mode][number].push(Segment { start, param, end });
                inner.raw_status[mode] |= 1 << number;
                ran = true;
            }
        }

        ran
    }

    /// Whether the bound fade-end interrupt is asserted.
    pub fn interrupt_pending(&self) -> bool {
        let inner = self.lock();
        inner.isr_bound
            && (0..SPEED_MODE_COUNT).any(|mode| inner.raw_status[mode] & enabled_mask(&inner, mode) != 0)
    }

    /// Every segment that ran on the channel, oldest first.
    pub fn segments(&self, channel: ChannelId) -> Vec<Segment> {
        self.lock().history[channel.mode as usize][channel.number as usize].clone()
    }

    /// Number of register accesses that changed state.
    pub fn register_writes(&self) -> usize {
        self.lock().writes
    }

    /// Number of times a segment was latched while the previous one had not
    /// run yet.
    pub fn overlapping_starts(&self) -> usize {
        self.lock().overlaps
    }

    /// Number of segments that took the duty register out of range.
    pub fn wraps(&self) -> usize {
        self.lock().wraps
    }

    /// Clock sources whose frequency was looked up, oldest first.
    pub fn frequency_queries(&self) -> Vec<ClockSource> {
        self.lock().frequency_queries.clone()
    }

    /// Forget the recorded frequency lookups.
    pub fn clear_frequency_queries(&self) {
        self.lock().frequency_queries.clear();
    }

    /// Result of future RC_FAST calibrations.
    pub fn set_rc_fast_calibration(&self, result: Option<HertzU32>) {
        self.lock().rc_fast = result;
    }

    /// Number of RC_FAST calibrations so far.
    pub fn rc_fast_calibrations(&self) -> usize {
        self.lock().rc_fast_calibrations
    }

    /// Force the output duty of a channel.
    pub fn set_current_duty(&self, channel: ChannelId, duty: u32) {
        self.lock().channel(channel).duty_reg = duty << DUTY_FRACTIONAL_BITS;
    }

    /// Whether the signal output of the channel is enabled.
    pub fn output_enabled(&self, channel: ChannelId) -> bool {
        self.lock().channels[channel.mode as usize][channel.number as usize].sig_out_en
    }

    /// Output level of the channel while its output is disabled.
    pub fn idle_level(&self, channel: ChannelId) -> bool {
        self.lock().channels[channel.mode as usize][channel.number as usize].idle_level
    }

    /// Whether the fade-end interrupt of the channel is enabled.
    pub fn fade_end_intr_enabled(&self, channel: ChannelId) -> bool {
        self.lock().channels[channel.mode as usize][channel.number as usize].fade_end_intr
    }

    /// Whether the timer counter is paused.
    pub fn timer_paused(&self, timer: TimerId) -> bool {
        self.lock().timers[timer.mode as usize][timer.number as usize].paused
    }

    /// Number of timer counter resets.
    pub fn timer_resets(&self, timer: TimerId) -> usize {
        self.lock().timers[timer.mode as usize][timer.number as usize].resets
    }

    /// Whether the fade-end interrupt handler is bound.
    pub fn isr_bound(&self) -> bool {
        self.lock().isr_bound
    }

    /// Make future interrupt allocations fail.
    pub fn fail_interrupt_bind(&self, fail: bool) {
        self.lock().fail_isr_bind = fail;
    }
}

fn enabled_mask(inner: &Inner, mode: usize) -> u32 {
    inner.channels[mode]
        .iter()
        .enumerate()
        .filter(|(_, regs)| regs.fade_end_intr)
        .fold(0, |mask, (number, _)| mask | 1 << number)
}

impl ChannelHw for EmulatedLedc {
    fn supports(&self, mode: SpeedMode) -> bool {
        self.lock().supported[mode as usize]
    }

    fn duty(&self, channel: ChannelId) -> u32 {
        self.lock().channels[channel.mode as usize][channel.number as usize].duty_reg
            >> DUTY_FRACTIONAL_BITS
    }

    fn set_duty_int_part(&self, channel: ChannelId, duty: u32) {
        self.lock().channel(channel).duty_int = duty;
    }

    fn hpoint(&self, channel: ChannelId) -> u32 {
        self.lock().channels[channel.mode as usize][channel.number as usize].hpoint
    }

    fn set_hpoint(&self, channel: ChannelId, hpoint: u32) {
        self.lock().channel(channel).hpoint = hpoint;
    }

    fn channel_timer(&self, channel: ChannelId) -> timer::Number {
        self.lock().channels[channel.mode as usize][channel.number as usize].timer
    }

    fn bind_channel_timer(&self, channel: ChannelId, timer: timer::Number) {
        self.lock().channel(channel).timer = timer;
    }

    fn set_fade_param(&self, channel: ChannelId, param: FadeParam) {
        self.lock().channel(channel).param = param;
    }

    fn set_sig_out_en(&self, channel: ChannelId, enable: bool) {
        self.lock().channel(channel).sig_out_en = enable;
    }

    fn set_idle_level(&self, channel: ChannelId, high: bool) {
        self.lock().channel(channel).idle_level = high;
    }

    fn set_duty_start(&self, channel: ChannelId, start: bool) {
        let mut inner = self.lock();
        inner.channel(channel).duty_start = start;

        // High speed channels pick up new parameters without an update.
        if start && channel.mode == SpeedMode::HighSpeed {
            inner.latch(channel);
        }
    }

    fn channel_update(&self, channel: ChannelId) {
        let mut inner = self.lock();
        if channel.mode == SpeedMode::LowSpeed && inner.channel(channel).duty_start {
            inner.latch(channel);
        }
    }

    fn set_fade_end_intr(&self, channel: ChannelId, enable: bool) {
        self.lock().channel(channel).fade_end_intr = enable;
    }

    fn fade_end_intr_status(&self, mode: SpeedMode) -> u32 {
        let inner = self.lock();
        inner.raw_status[mode as usize] & enabled_mask(&inner, mode as usize)
    }

    fn clear_fade_end_intr_status(&self, mode: SpeedMode, mask: u32) {
        let mut inner = self.lock();
        inner.writes += 1;
        inner.raw_status[mode as usize] &= !mask;
    }
}

impl TimerHw for EmulatedLedc {
    fn max_duty_resolution(&self) -> u32 {
        MAX_DUTY_RESOLUTION
    }

    fn set_clock_divider(&self, timer: TimerId, divider: u32) {
        self.lock().timer(timer).divider = divider;
    }

    fn clock_divider(&self, timer: TimerId) -> u32 {
        self.lock().timers[timer.mode as usize][timer.number as usize].divider
    }

    fn set_duty_resolution(&self, timer: TimerId, bits: u32) {
        self.lock().timer(timer).resolution = bits;
    }

    fn duty_resolution(&self, timer: TimerId) -> u32 {
        self.lock().timers[timer.mode as usize][timer.number as usize].resolution
    }

    fn set_clock_source(&self, timer: TimerId, source: ClockSource) {
        self.lock().timer(timer).source = source;
    }

    fn clock_source(&self, timer: TimerId) -> ClockSource {
        self.lock().timers[timer.mode as usize][timer.number as usize].source
    }

    fn timer_update(&self, timer: TimerId) {
        self.lock().timer(timer);
    }

    fn timer_reset(&self, timer: TimerId) {
        self.lock().timer(timer).resets += 1;
    }

    fn timer_pause(&self, timer: TimerId) {
        self.lock().timer(timer).paused = true;
    }

    fn timer_resume(&self, timer: TimerId) {
        self.lock().timer(timer).paused = false;
    }

    fn source_frequency(&self, source: ClockSource) -> HertzU32 {
        self.lock().frequency_queries.push(source);

        match source {
            ClockSource::Apb => 80.MHz(),
            ClockSource::RefTick => 1.MHz(),
            ClockSource::Xtal => 40.MHz(),
            ClockSource::RcFast => 0.Hz(),
        }
    }

    fn calibrate_rc_fast(&self) -> Option<HertzU32> {
        let mut inner = self.lock();
        inner.rc_fast_calibrations += 1;
        inner.rc_fast
    }
}

impl Instance for EmulatedLedc {
    fn bind_fade_interrupt(&self) -> bool {
        let mut inner = self.lock();
        inner.isr_bound = !inner.fail_isr_bind;
        inner.isr_bound
    }

    fn unbind_fade_interrupt(&self) {
        self.lock().isr_bound = false;
    }
}

/// Counting semaphore built on `std::sync`.
#[derive(Debug)]
pub struct StdSemaphore {
    state: Mutex<SemaphoreState>,
    available: Condvar,
    max: u32,
}

#[derive(Debug)]
struct SemaphoreState {
    count: u32,
    waiters: u32,
}

impl StdSemaphore {
    fn lock(&self) -> MutexGuard<'_, SemaphoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Semaphore for StdSemaphore {
    fn create(kind: SemaphoreKind) -> Option<Self> {
        let (max, initial) = match kind {
            SemaphoreKind::Counting { max, initial } => (max, initial),
            SemaphoreKind::Mutex => (1, 1),
        };

        Some(Self {
            state: Mutex::new(SemaphoreState {
                count: initial,
                waiters: 0,
            }),
            available: Condvar::new(),
            max,
        })
    }

    fn take(&self, timeout_us: Option<u32>) -> bool {
        let deadline = timeout_us.map(|us| Instant::now() + Duration::from_micros(us as u64));
        let mut state = self.lock();

        state.waiters += 1;
        while state.count == 0 {
            state = match deadline {
                None => self
                    .available
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        state.waiters -= 1;
                        return false;
                    }
                    self.available
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
            };
        }
        state.waiters -= 1;
        state.count -= 1;

        true
    }

    fn give(&self) -> bool {
        let mut state = self.lock();
        if state.count >= self.max {
            return false;
        }

        state.count += 1;
        self.available.notify_one();
        true
    }

    fn try_give_from_isr(&self, higher_prio_task_waken: Option<&mut bool>) -> bool {
        let mut state = self.lock();
        if state.count >= self.max {
            return false;
        }

        state.count += 1;
        if state.waiters > 0 {
            self.available.notify_one();
            if let Some(woken) = higher_prio_task_waken {
                *woken = true;
            }
        }
        true
    }

    fn try_take(&self) -> bool {
        let mut state = self.lock();
        if state.count == 0 {
            return false;
        }

        state.count -= 1;
        true
    }
}

/// Background thread standing in for the interrupt controller.
///
/// Runs latched segments and calls [`Ledc::on_interrupt`] while the fade-end
/// interrupt is asserted. Stopped and joined on drop.
pub struct InterruptThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InterruptThread {
    const TICK: Duration = Duration::from_micros(50);

    /// Start serving the interrupts of `ledc`.
    pub fn spawn<S: Semaphore + 'static>(ledc: Arc<Ledc<EmulatedLedc, S>>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));

        let handle = thread::spawn({
            let stop = stop.clone();
            move || {
                while !stop.load(Ordering::Acquire) {
                    ledc.hw.run_pending();
                    if ledc.hw.interrupt_pending() {
                        ledc.on_interrupt();
                    }
                    thread::sleep(Self::TICK);
                }
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for InterruptThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}
