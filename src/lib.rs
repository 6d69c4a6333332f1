//! # LED PWM Controller (LEDC)
//!
//! ## Overview
//!
//! The LEDC peripheral is primarily designed to control the intensity of LEDs,
//! although it can also be used to generate PWM signals for other purposes. It
//! has multiple channels which can generate independent waveforms that can be
//! used, for example, to drive RGB LED devices.
//!
//! Besides plain duty control, this crate provides a fade service: a channel's
//! duty is moved from its current value to a target value by the hardware
//! step generator, re-armed from the fade-end interrupt until the target is
//! reached, without further involvement of the calling task.
//!
//! ## Configuration
//!
//! Timers are configured once with [`Ledc::configure_clock`] (or
//! [`Ledc::configure_timer`]), which picks a clock source and divisor for the
//! requested frequency and duty resolution. Channels are bound to timers with
//! [`Ledc::bind_channel_timer`].
//!
//! The fade service must be installed with [`Ledc::install_fade_service`]
//! before any fade is requested, and the interrupt handler of the chip must
//! call [`Ledc::on_interrupt`].
//!
//! ## Examples
//!
//! ```rust, ignore
//! use esp_ledc::{ChannelId, ClockConfig, FadeMode, Ledc, SpeedMode, TimerId, channel, timer};
//! use fugit::RateExtU32;
//!
//! let ledc = Ledc::<_, RtosSemaphore>::new(peripheral);
//! let timer0 = TimerId::new(SpeedMode::LowSpeed, timer::Number::Timer0);
//! let channel0 = ChannelId::new(SpeedMode::LowSpeed, channel::Number::Channel0);
//!
//! ledc.configure_clock(timer0, 5.kHz(), 13, ClockConfig::Auto)?;
//! ledc.bind_channel_timer(channel0, timer0.number)?;
//! ledc.install_fade_service()?;
//!
//! // Fade to ~50% over 200ms and wait for it.
//! ledc.start_fade_by_time(channel0, 4000, 200)?;
//! ledc.begin_fade(channel0, FadeMode::Blocking)?;
//! ```
//!
//! ## Feature Flags
#![doc = document_features::document_features!(feature_label = r#"<span class="stab portability"><code>{feature}</code></span>"#)]
#![doc(html_logo_url = "https://avatars.githubusercontent.com/u/46717278")]
#![deny(missing_docs, rust_2018_idioms)]
#![cfg_attr(not(any(test, feature = "emulation")), no_std)]

extern crate alloc;

// MUST be the first module
mod fmt;

pub mod channel;
#[cfg(any(test, feature = "emulation"))]
pub mod emulation;
pub mod fade;
pub mod hal;
pub mod sync;
pub mod timer;

pub use self::{
    channel::{Channel, ChannelId},
    fade::{Direction, FadeEndCallback, FadeEndEvent, FadeMode},
    timer::{ClockConfig, ClockSource, TimerId},
};
use self::{hal::Instance, sync::Semaphore};

/// Channel and timer group.
///
/// High speed channels are only available on the ESP32, all other chips only
/// have low speed channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::FromRepr, strum::EnumIter)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SpeedMode {
    /// High speed group.
    HighSpeed = 0,
    /// Low speed group.
    LowSpeed = 1,
}

pub(crate) const SPEED_MODE_COUNT: usize = 2;

impl TryFrom<u8> for SpeedMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_repr(value).ok_or(Error::InvalidArgument(Argument::SpeedMode))
    }
}

/// The argument rejected by [`Error::InvalidArgument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Argument {
    /// Group not present on this chip.
    SpeedMode,
    /// Channel index out of range, or channel in another group.
    Channel,
    /// Timer index out of range, or timer in another group.
    Timer,
    /// Zero frequency.
    Frequency,
    /// Duty resolution zero or wider than the hardware supports.
    Resolution,
    /// Clock source not usable by this timer.
    ClockSource,
    /// Duty above the channel's maximum.
    Duty,
    /// High point above [`hal::HPOINT_VAL_MAX`].
    Hpoint,
    /// Fade scale zero or above [`fade::DUTY_SCALE_MAX`].
    Scale,
    /// Cycle count zero or above [`fade::DUTY_CYCLE_MAX`].
    CycleCount,
    /// Step count above [`fade::DUTY_NUM_MAX`].
    StepCount,
}

/// LEDC errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// An argument was rejected before any register was touched.
    InvalidArgument(Argument),
    /// The fade service is not installed.
    ServiceNotInstalled,
    /// The fade service is already installed.
    AlreadyInstalled,
    /// Per-channel fade state or the interrupt could not be allocated.
    ResourceExhausted,
    /// No clock source can produce the requested frequency at the requested
    /// duty resolution.
    Unachievable,
    /// The timer has never been configured.
    TimerNotConfigured,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidArgument(argument) => write!(f, "{argument:?} argument is invalid"),
            Error::ServiceNotInstalled => write!(f, "LEDC fade service not installed"),
            Error::AlreadyInstalled => write!(f, "LEDC fade service already installed"),
            Error::ResourceExhausted => write!(f, "not enough memory for LEDC fade state"),
            Error::Unachievable => write!(
                f,
                "requested frequency and duty resolution can not be achieved"
            ),
            Error::TimerNotConfigured => write!(f, "LEDC timer not configured"),
        }
    }
}

impl core::error::Error for Error {}

/// LEDC (LED PWM Controller)
///
/// `S` is the semaphore implementation of the RTOS the driver runs on, used
/// to block tasks while a fade is in flight.
pub struct Ledc<H: Instance, S: Semaphore> {
    hw: H,
    clocks: timer::ClockPlanner,
    fade: fade::FadeRegistry<S>,
}

impl<H: Instance, S: Semaphore> Ledc<H, S> {
    /// Return a new LEDC driver.
    ///
    /// The fade service starts out uninstalled.
    pub fn new(hw: H) -> Self {
        Ledc {
            hw,
            clocks: timer::ClockPlanner::new(),
            fade: fade::FadeRegistry::new(),
        }
    }

    fn check_mode(&self, mode: SpeedMode) -> Result<(), Error> {
        if self.hw.supports(mode) {
            Ok(())
        } else {
            Err(Error::InvalidArgument(Argument::SpeedMode))
        }
    }
}
