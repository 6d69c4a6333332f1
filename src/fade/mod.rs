//! # Fade service
//!
//! ## Overview
//! A fade moves the duty of a channel from its current value to a target
//! value in hardware steps. The step generator of a channel can only run a
//! limited number of steps at a time; whenever it finishes, the fade-end
//! interrupt fires and [`Ledc::on_interrupt`] programs the next segment, until
//! the target is reached.
//!
//! ## Usage
//! A fade is configured with [`Ledc::start_fade_by_time`] or
//! [`Ledc::start_fade_by_step`], then started with [`Ledc::begin_fade`].
//! Only one fade runs on a channel at a time. Configuring or starting a fade,
//! or setting the duty through [`Ledc::set_duty`], waits for a running fade to
//! finish.
//!
//! The configure and start calls are separate, so two tasks fading the same
//! channel can interleave them. [`Ledc::fade_by_time_and_begin`],
//! [`Ledc::fade_by_step_and_begin`] and
//! [`Ledc::set_duty_and_commit_threadsafe`] do the whole sequence under a
//! per-channel lock.

use fugit::HertzU32;

pub use self::solver::{
    DUTY_CYCLE_MAX,
    DUTY_NUM_MAX,
    DUTY_SCALE_MAX,
    Direction,
    Progress,
    RateClamp,
    StepPlan,
    next_segment,
    solve_by_step,
    solve_by_time,
};
pub(crate) use self::state::FadeRegistry;
use self::state::{FadeParams, FadeState, HardwareGuard};
use crate::{
    Argument,
    Error,
    Ledc,
    channel::ChannelId,
    hal::{FadeParam, Instance},
    sync::Semaphore,
};

mod isr;
pub mod solver;
mod state;

/// Whether [`Ledc::begin_fade`] waits for the fade to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FadeMode {
    /// Return as soon as the fade is started.
    #[default]
    NonBlocking,
    /// Return once the target duty is reached.
    Blocking,
}

/// Passed to the fade-end callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FadeEndEvent {
    /// The channel that finished fading.
    pub channel: ChannelId,
    /// Its duty.
    pub duty: u32,
}

/// Called from the interrupt handler when a fade finishes.
///
/// Return `true` to request a context switch on interrupt exit.
pub type FadeEndCallback = fn(FadeEndEvent) -> bool;

impl<H: Instance, S: Semaphore> Ledc<H, S> {
    /// Install the fade service and bind the fade-end interrupt.
    pub fn install_fade_service(&self) -> Result<(), Error> {
        self.fade.install()?;

        if !self.hw.bind_fade_interrupt() {
            error!("Unable to allocate the LEDC fade-end interrupt");
            self.fade.teardown_all();
            return Err(Error::ResourceExhausted);
        }

        debug!("LEDC fade service installed");
        Ok(())
    }

    /// Unbind the fade-end interrupt and free all fade state.
    ///
    /// Does nothing if the service is not installed.
    pub fn uninstall_fade_service(&self) {
        if !self.fade.is_installed() {
            return;
        }

        self.hw.unbind_fade_interrupt();
        self.fade.teardown_all();
        debug!("LEDC fade service uninstalled");
    }

    /// Configure a fade to `target` in steps of `scale`, one step every
    /// `cycle_count` PWM periods.
    ///
    /// The fade is started by [`Ledc::begin_fade`].
    pub fn start_fade_by_step(
        &self,
        channel: ChannelId,
        target: u32,
        scale: u32,
        cycle_count: u32,
    ) -> Result<(), Error> {
        check_step_args(scale, cycle_count)?;
        let max_duty = self.check_duty(channel, target)?;
        let state = self.fade.ensure_initialized(channel)?;

        let _hw = state.acquire_hardware(&self.hw, channel);
        let plan = solve_by_step(self.hw.duty(channel), max_duty, target, scale, cycle_count);
        self.load_plan(channel, &state, &plan);

        Ok(())
    }

    /// Configure a fade to `target` that takes about `duration_ms`.
    ///
    /// The fade is started by [`Ledc::begin_fade`]. If the duration can not be
    /// met, a warning is logged and the fade runs as close to it as the
    /// hardware allows.
    pub fn start_fade_by_time(
        &self,
        channel: ChannelId,
        target: u32,
        duration_ms: u32,
    ) -> Result<(), Error> {
        let max_duty = self.check_duty(channel, target)?;
        let frequency = self.channel_frequency(channel)?;
        let state = self.fade.ensure_initialized(channel)?;

        let _hw = state.acquire_hardware(&self.hw, channel);
        let plan = solve_by_time(
            self.hw.duty(channel),
            max_duty,
            target,
            frequency.raw(),
            duration_ms,
        );
        self.load_plan(channel, &state, &plan);

        Ok(())
    }

    /// Start the fade configured on a channel.
    ///
    /// Waits for a fade that is still running on the channel. With
    /// [`FadeMode::Blocking`], also waits for the new fade to finish.
    pub fn begin_fade(&self, channel: ChannelId, mode: FadeMode) -> Result<(), Error> {
        self.check_mode(channel.mode)?;
        let Some(state) = self.fade.get(channel) else {
            error!("No fade configured on {:?}, is the fade service installed?", channel);
            return Err(Error::ServiceNotInstalled);
        };

        let hw = state.acquire_hardware(&self.hw, channel);
        self.run_fade(channel, &state, hw, mode);

        Ok(())
    }

    /// [`Ledc::start_fade_by_time`] and [`Ledc::begin_fade`] as one operation.
    pub fn fade_by_time_and_begin(
        &self,
        channel: ChannelId,
        target: u32,
        duration_ms: u32,
        mode: FadeMode,
    ) -> Result<(), Error> {
        let max_duty = self.check_duty(channel, target)?;
        let frequency = self.channel_frequency(channel)?;
        let state = self.fade.ensure_initialized(channel)?;

        let _op = state.acquire_operation();
        let hw = state.acquire_hardware(&self.hw, channel);
        let plan = solve_by_time(
            self.hw.duty(channel),
            max_duty,
            target,
            frequency.raw(),
            duration_ms,
        );
        self.load_plan(channel, &state, &plan);
        self.run_fade(channel, &state, hw, mode);

        Ok(())
    }

    /// [`Ledc::start_fade_by_step`] and [`Ledc::begin_fade`] as one operation.
    pub fn fade_by_step_and_begin(
        &self,
        channel: ChannelId,
        target: u32,
        scale: u32,
        cycle_count: u32,
        mode: FadeMode,
    ) -> Result<(), Error> {
        check_step_args(scale, cycle_count)?;
        let max_duty = self.check_duty(channel, target)?;
        let state = self.fade.ensure_initialized(channel)?;

        let _op = state.acquire_operation();
        let hw = state.acquire_hardware(&self.hw, channel);
        let plan = solve_by_step(self.hw.duty(channel), max_duty, target, scale, cycle_count);
        self.load_plan(channel, &state, &plan);
        self.run_fade(channel, &state, hw, mode);

        Ok(())
    }

    /// Set the duty and apply it at once, waiting for a running fade first.
    pub fn set_duty_and_commit_threadsafe(&self, channel: ChannelId, duty: u32) -> Result<(), Error> {
        self.check_duty(channel, duty)?;
        let state = self.fade.ensure_initialized(channel)?;

        let _op = state.acquire_operation();
        let _hw = state.acquire_hardware(&self.hw, channel);
        critical_section::with(|_| {
            self.hw.set_duty_int_part(channel, duty);
            self.hw.set_fade_param(channel, FadeParam::NO_FADE);
        });
        self.update_duty(channel);

        Ok(())
    }

    /// Set or clear the function called when a fade on `channel` finishes.
    ///
    /// The callback runs in interrupt context.
    pub fn register_fade_callback(
        &self,
        channel: ChannelId,
        callback: Option<FadeEndCallback>,
    ) -> Result<(), Error> {
        self.check_mode(channel.mode)?;
        let state = self.fade.ensure_initialized(channel)?;
        state.set_callback(callback);

        Ok(())
    }

    /// Whether a fade is running on the channel.
    pub fn is_fade_running(&self, channel: ChannelId) -> bool {
        self.fade
            .get(channel)
            .is_some_and(|state| state.params().running)
    }

    fn check_duty(&self, channel: ChannelId, duty: u32) -> Result<u32, Error> {
        let max_duty = self.max_duty(channel)?;
        if duty > max_duty {
            return Err(Error::InvalidArgument(Argument::Duty));
        }

        Ok(max_duty)
    }

    fn channel_frequency(&self, channel: ChannelId) -> Result<HertzU32, Error> {
        self.frequency(self.bound_timer(channel))
            .ok_or(Error::TimerNotConfigured)
    }

    /// Record a plan for the stepper and program its first segment. The
    /// hardware guard must be held.
    fn load_plan(&self, channel: ChannelId, state: &FadeState<S>, plan: &StepPlan) {
        debug!(
            "{:?}: duty {} -> {}, {} steps of {} every {} cycles, {:?}",
            channel,
            plan.start_duty,
            plan.target,
            plan.step_count,
            plan.scale,
            plan.cycle_count,
            plan.direction
        );

        let previous = state.params();
        state.set_params(FadeParams {
            target: plan.target,
            direction: plan.direction,
            scale: plan.scale,
            cycle_count: plan.cycle_count,
            ..previous
        });

        let (duty, param) = plan.first_segment();
        critical_section::with(|_| {
            self.hw.set_duty_int_part(channel, duty);
            self.hw.set_fade_param(channel, param);
        });
    }

    /// Start the loaded fade and hand the hardware over to the interrupt
    /// handler.
    fn run_fade(
        &self,
        channel: ChannelId,
        state: &FadeState<S>,
        hw: HardwareGuard<'_, S>,
        mode: FadeMode,
    ) {
        state.set_params(FadeParams {
            mode,
            running: true,
            ..state.params()
        });

        critical_section::with(|_| {
            self.hw
                .clear_fade_end_intr_status(channel.mode, 1 << channel.number as u32);
            self.hw.set_fade_end_intr(channel, true);
        });
        self.update_duty(channel);
        hw.hand_off();

        if mode == FadeMode::Blocking {
            drop(state.acquire_hardware(&self.hw, channel));
        }
    }
}

fn check_step_args(scale: u32, cycle_count: u32) -> Result<(), Error> {
    if scale == 0 || scale > DUTY_SCALE_MAX {
        return Err(Error::InvalidArgument(Argument::Scale));
    }
    if cycle_count == 0 || cycle_count > DUTY_CYCLE_MAX {
        return Err(Error::InvalidArgument(Argument::CycleCount));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering},
        },
        thread,
        time::Duration,
    };

    use fugit::RateExtU32;

    use super::*;
    use crate::{
        ClockConfig,
        SpeedMode,
        TimerId,
        channel,
        emulation::{EmulatedLedc, InterruptThread, StdSemaphore},
        hal::ChannelHw,
        timer,
    };

    const TIMER0: TimerId = TimerId::new(SpeedMode::LowSpeed, timer::Number::Timer0);
    const CH0: ChannelId = ChannelId::new(SpeedMode::LowSpeed, channel::Number::Channel0);
    const CH1: ChannelId = ChannelId::new(SpeedMode::LowSpeed, channel::Number::Channel1);

    /// 5 kHz, 13 bit timer with the fade service installed.
    fn installed() -> (EmulatedLedc, Ledc<EmulatedLedc, StdSemaphore>) {
        let hw = EmulatedLedc::new();
        let ledc = Ledc::new(hw.clone());
        ledc.configure_clock(TIMER0, 5.kHz(), 13, ClockConfig::Auto)
            .unwrap();
        ledc.install_fade_service().unwrap();
        (hw, ledc)
    }

    #[test]
    fn blocking_fade_by_time_reaches_target() {
        let (hw, ledc) = installed();
        let ledc = Arc::new(ledc);
        let _isr = InterruptThread::spawn(ledc.clone());

        ledc.start_fade_by_time(CH0, 4000, 200).unwrap();
        ledc.begin_fade(CH0, FadeMode::Blocking).unwrap();

        assert_eq!(ledc.duty(CH0), Ok(4000));
        assert!(!ledc.is_fade_running(CH0));

        let segments = hw.segments(CH0);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 0);
        assert_eq!(segments[0].param.scale, 4);
        assert_eq!(segments[0].param.num, 1000);
    }

    #[test]
    fn invalid_step_arguments_touch_nothing() {
        let (hw, ledc) = installed();
        let writes = hw.register_writes();

        assert_eq!(
            ledc.start_fade_by_step(CH0, 100, 0, 1),
            Err(Error::InvalidArgument(Argument::Scale))
        );
        assert_eq!(
            ledc.start_fade_by_step(CH0, 100, 1, DUTY_CYCLE_MAX + 1),
            Err(Error::InvalidArgument(Argument::CycleCount))
        );
        assert_eq!(
            ledc.start_fade_by_step(CH0, 8192, 1, 1),
            Err(Error::InvalidArgument(Argument::Duty))
        );

        assert_eq!(hw.register_writes(), writes);
        assert!(hw.segments(CH0).is_empty());
    }

    #[test]
    fn decreasing_from_max_duty_does_not_wrap() {
        let (hw, ledc) = installed();
        let ledc = Arc::new(ledc);
        hw.set_current_duty(CH0, 8191);
        assert_eq!(ledc.duty(CH0), Ok(8191));

        let _isr = InterruptThread::spawn(ledc.clone());
        ledc.fade_by_step_and_begin(CH0, 0, 1, 1, FadeMode::Blocking)
            .unwrap();

        assert_eq!(ledc.duty(CH0), Ok(0));
        assert_eq!(hw.wraps(), 0);

        let segments = hw.segments(CH0);
        let first = segments[0];
        assert_eq!(first.start, 8190);
        assert_eq!(first.param.direction, Direction::Decrease);
        assert!(
            segments
                .iter()
                .all(|segment| segment.param.direction == Direction::Decrease
                    || segment.param.scale == 0)
        );
    }

    #[test]
    fn threadsafe_fades_run_one_after_the_other() {
        let (hw, ledc) = installed();
        let ledc = Arc::new(ledc);
        let _isr = InterruptThread::spawn(ledc.clone());

        ledc.fade_by_step_and_begin(CH0, 2000, 10, 4, FadeMode::NonBlocking)
            .unwrap();
        let second = {
            let ledc = ledc.clone();
            thread::spawn(move || ledc.fade_by_step_and_begin(CH0, 500, 5, 1, FadeMode::Blocking))
        };
        second.join().unwrap().unwrap();

        assert_eq!(ledc.duty(CH0), Ok(500));
        assert_eq!(hw.overlapping_starts(), 0);

        let segments = hw.segments(CH0);
        let handover = segments
            .iter()
            .position(|segment| segment.param.direction == Direction::Decrease)
            .unwrap();
        assert_eq!(segments[handover - 1].end, 2000);
        assert_eq!(segments[handover].start, 2000);
    }

    #[test]
    fn blocking_begin_fade_from_two_threads() {
        let (hw, ledc) = installed();
        let ledc = Arc::new(ledc);
        let _isr = InterruptThread::spawn(ledc.clone());

        ledc.start_fade_by_step(CH0, 3000, 30, 1).unwrap();
        let workers: Vec<_> = (0..2)
            .map(|_| {
                let ledc = ledc.clone();
                thread::spawn(move || ledc.begin_fade(CH0, FadeMode::Blocking))
            })
            .collect();

        for worker in workers {
            worker.join().unwrap().unwrap();
        }

        assert_eq!(ledc.duty(CH0), Ok(3000));
        assert_eq!(hw.overlapping_starts(), 0);
        assert!(!ledc.is_fade_running(CH0));
    }

    #[test]
    fn threadsafe_blocking_fades_from_two_threads() {
        let (_hw, ledc) = installed();
        let ledc = Arc::new(ledc);
        let _isr = InterruptThread::spawn(ledc.clone());

        let workers: Vec<_> = [1000, 3000]
            .into_iter()
            .map(|target| {
                let ledc = ledc.clone();
                thread::spawn(move || {
                    ledc.fade_by_step_and_begin(CH0, target, 20, 1, FadeMode::Blocking)
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap().unwrap();
        }

        let duty = ledc.duty(CH0).unwrap();
        assert!(duty == 1000 || duty == 3000);
        assert!(!ledc.is_fade_running(CH0));
    }

    #[test]
    fn duty_update_waits_for_running_fade() {
        let (hw, ledc) = installed();

        ledc.start_fade_by_step(CH0, 100, 10, 1).unwrap();
        ledc.begin_fade(CH0, FadeMode::NonBlocking).unwrap();
        assert!(ledc.is_fade_running(CH0));

        thread::scope(|s| {
            let writer = s.spawn(|| ledc.set_duty_and_commit_threadsafe(CH0, 42));

            thread::sleep(Duration::from_millis(20));
            assert!(!writer.is_finished());

            hw.run_pending();
            // Waking the blocked writer asks for a context switch.
            assert!(ledc.on_interrupt());
            writer.join().unwrap().unwrap();
        });

        hw.run_pending();
        assert_eq!(ledc.duty(CH0), Ok(42));
    }

    #[test]
    fn fade_requires_installed_service() {
        let hw = EmulatedLedc::new();
        let ledc = Ledc::<_, StdSemaphore>::new(hw);
        ledc.configure_clock(TIMER0, 5.kHz(), 13, ClockConfig::Auto)
            .unwrap();

        assert_eq!(
            ledc.start_fade_by_step(CH0, 100, 1, 1),
            Err(Error::ServiceNotInstalled)
        );
        assert_eq!(
            ledc.begin_fade(CH0, FadeMode::NonBlocking),
            Err(Error::ServiceNotInstalled)
        );
        assert_eq!(
            ledc.register_fade_callback(CH0, None),
            Err(Error::ServiceNotInstalled)
        );
    }

    #[test]
    fn install_and_uninstall() {
        let (hw, ledc) = installed();
        assert!(hw.isr_bound());
        assert_eq!(ledc.install_fade_service(), Err(Error::AlreadyInstalled));

        ledc.start_fade_by_step(CH0, 100, 1, 1).unwrap();
        ledc.uninstall_fade_service();
        assert!(!hw.isr_bound());
        assert_eq!(
            ledc.begin_fade(CH0, FadeMode::NonBlocking),
            Err(Error::ServiceNotInstalled)
        );

        ledc.uninstall_fade_service();
        ledc.install_fade_service().unwrap();
    }

    #[test]
    fn interrupt_allocation_failure() {
        let hw = EmulatedLedc::new();
        hw.fail_interrupt_bind(true);
        let ledc = Ledc::<_, StdSemaphore>::new(hw.clone());

        assert_eq!(ledc.install_fade_service(), Err(Error::ResourceExhausted));
        assert_eq!(
            ledc.start_fade_by_step(CH0, 0, 1, 1),
            Err(Error::ServiceNotInstalled)
        );

        hw.fail_interrupt_bind(false);
        ledc.install_fade_service().unwrap();
    }

    static LAST_END: AtomicU32 = AtomicU32::new(u32::MAX);

    fn record_end(event: FadeEndEvent) -> bool {
        LAST_END.store(event.duty, Ordering::SeqCst);
        event.channel == CH0
    }

    #[test]
    fn callback_runs_at_fade_end() {
        let (hw, ledc) = installed();
        ledc.register_fade_callback(CH0, Some(record_end)).unwrap();

        ledc.fade_by_step_and_begin(CH0, 100, 10, 1, FadeMode::NonBlocking)
            .unwrap();
        assert!(hw.run_pending());
        assert!(hw.interrupt_pending());

        assert!(ledc.on_interrupt());
        assert_eq!(LAST_END.load(Ordering::SeqCst), 100);
        assert!(!ledc.is_fade_running(CH0));
        assert!(!hw.interrupt_pending());
    }

    #[test]
    fn interrupt_without_fade_state_is_ignored() {
        let (hw, ledc) = installed();
        hw.set_fade_end_intr(CH1, true);
        ledc.set_duty(CH1, 10).unwrap();
        ledc.commit(CH1).unwrap();
        hw.run_pending();

        assert!(!ledc.on_interrupt());
        assert_eq!(ledc.duty(CH1), Ok(10));
        assert_eq!(hw.segments(CH1).len(), 1);
        assert_eq!(hw.fade_end_intr_status(SpeedMode::LowSpeed), 0);
    }

    #[test]
    fn time_fade_needs_configured_timer() {
        let hw = EmulatedLedc::new();
        let ledc = Ledc::<_, StdSemaphore>::new(hw);
        ledc.install_fade_service().unwrap();

        assert_eq!(
            ledc.start_fade_by_time(CH0, 0, 100),
            Err(Error::TimerNotConfigured)
        );
    }

    #[test]
    fn fade_to_current_duty_snaps() {
        let (hw, ledc) = installed();

        ledc.fade_by_time_and_begin(CH0, 0, 100, FadeMode::NonBlocking)
            .unwrap();
        hw.run_pending();
        ledc.on_interrupt();

        assert_eq!(hw.segments(CH0)[0].param, FadeParam::NO_FADE);
        assert!(!ledc.is_fade_running(CH0));
    }
}
