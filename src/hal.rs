//! # Register access
//!
//! ## Overview
//! The driver never touches the LEDC register block directly. Everything it
//! needs from the peripheral, the clock tree and the interrupt allocator goes
//! through the traits in this module, so the same fade engine runs on every
//! chip (and on the host, see the `emulation` feature).
//!
//! Implementations must be callable from both task and interrupt context.
//! The driver serializes multi-register sequences itself, using a global
//! critical section, so single method calls do not have to be atomic with
//! respect to each other.

use fugit::HertzU32;

use crate::{
    SpeedMode,
    channel::ChannelId,
    fade::Direction,
    timer::{self, ClockSource, TimerId},
};

/// Number of fractional bits kept by the duty register.
///
/// [`ChannelHw::set_duty_int_part`] and [`ChannelHw::duty`] work on the
/// integer part only.
pub const DUTY_FRACTIONAL_BITS: u32 = 4;

/// Maximum value of the high point (phase) register.
pub const HPOINT_VAL_MAX: u32 = 0xF_FFFF;

/// One hardware fade segment.
///
/// Starting from the programmed duty, the step generator adds (or subtracts)
/// `scale` every `cycle` PWM periods, `num` times, then raises the fade-end
/// interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FadeParam {
    /// Direction of each step.
    pub direction: Direction,
    /// Number of steps.
    pub num: u32,
    /// PWM periods between two steps.
    pub cycle: u32,
    /// Duty change per step.
    pub scale: u32,
}

impl FadeParam {
    /// A segment that loads the programmed duty and does nothing else.
    pub const NO_FADE: Self = Self {
        direction: Direction::Increase,
        num: 1,
        cycle: 1,
        scale: 0,
    };
}

/// Channel side of the peripheral.
pub trait ChannelHw {
    /// Whether the chip has the given group of channels and timers.
    fn supports(&self, mode: SpeedMode) -> bool;

    /// Current output duty (integer part).
    fn duty(&self, channel: ChannelId) -> u32;

    /// Write the integer part of the duty register.
    fn set_duty_int_part(&self, channel: ChannelId, duty: u32);

    /// Current high point.
    fn hpoint(&self, channel: ChannelId) -> u32;

    /// Write the high point register.
    fn set_hpoint(&self, channel: ChannelId, hpoint: u32);

    /// Timer the channel is bound to.
    fn channel_timer(&self, channel: ChannelId) -> timer::Number;

    /// Bind the channel to a timer of the same group.
    fn bind_channel_timer(&self, channel: ChannelId, timer: timer::Number);

    /// Write the fade parameters of the next segment.
    fn set_fade_param(&self, channel: ChannelId, param: FadeParam);

    /// Enable or disable the signal output.
    fn set_sig_out_en(&self, channel: ChannelId, enable: bool);

    /// Output level while the signal output is disabled.
    fn set_idle_level(&self, channel: ChannelId, high: bool);

    /// Set or clear the duty start bit.
    fn set_duty_start(&self, channel: ChannelId, start: bool);

    /// Latch channel parameters. Only low speed channels need this, high
    /// speed channels take new parameters on the next period.
    fn channel_update(&self, channel: ChannelId);

    /// Enable or disable the fade-end interrupt of a channel.
    fn set_fade_end_intr(&self, channel: ChannelId, enable: bool);

    /// Masked fade-end interrupt status of a group, one bit per channel.
    fn fade_end_intr_status(&self, mode: SpeedMode) -> u32;

    /// Clear the fade-end interrupt status bits in `mask`.
    fn clear_fade_end_intr_status(&self, mode: SpeedMode, mask: u32);
}

/// Timer side of the peripheral and the clock tree feeding it.
pub trait TimerHw {
    /// Widest duty resolution the timers support, in bits.
    fn max_duty_resolution(&self) -> u32;

    /// Write the clock divisor (with [`timer::FRACTIONAL_BITS`] fractional
    /// bits).
    fn set_clock_divider(&self, timer: TimerId, divider: u32);

    /// Current clock divisor, 0 if the timer was never configured.
    fn clock_divider(&self, timer: TimerId) -> u32;

    /// Write the duty resolution.
    fn set_duty_resolution(&self, timer: TimerId, bits: u32);

    /// Current duty resolution.
    fn duty_resolution(&self, timer: TimerId) -> u32;

    /// Route a clock source to the timer.
    fn set_clock_source(&self, timer: TimerId, source: ClockSource);

    /// Clock source currently routed to the timer.
    fn clock_source(&self, timer: TimerId) -> ClockSource;

    /// Latch timer parameters (low speed timers only).
    fn timer_update(&self, timer: TimerId);

    /// Reset the timer counter.
    fn timer_reset(&self, timer: TimerId);

    /// Pause the timer counter.
    fn timer_pause(&self, timer: TimerId);

    /// Resume the timer counter.
    fn timer_resume(&self, timer: TimerId);

    /// Nominal frequency of a fixed clock source, 0 if the chip does not have
    /// it.
    fn source_frequency(&self, source: ClockSource) -> HertzU32;

    /// Measure the RC_FAST oscillator against the reference clock.
    ///
    /// Returns `None` if the oscillator could not be enabled or measured.
    fn calibrate_rc_fast(&self) -> Option<HertzU32>;
}

/// A complete LEDC peripheral.
pub trait Instance: ChannelHw + TimerHw {
    /// Allocate and enable the shared fade-end interrupt.
    ///
    /// The bound handler must call [`crate::Ledc::on_interrupt`]. Returns
    /// `false` if no interrupt could be allocated.
    fn bind_fade_interrupt(&self) -> bool;

    /// Release the interrupt allocated by [`Instance::bind_fade_interrupt`].
    fn unbind_fade_interrupt(&self);
}
