//! # LEDC channel
//!
//! ## Overview
//! A channel compares the counter of its timer against its duty and high
//! point to produce the PWM output. Channels of one group can only be bound
//! to timers of the same group.
//!
//! ## Duty updates
//! [`Ledc::set_duty`] only writes the duty registers. The new value takes
//! effect once [`Ledc::commit`] is called. While a fade is running on the
//! channel, setting the duty waits for it to finish.

use crate::{
    Argument,
    Error,
    Ledc,
    SpeedMode,
    fade::{DUTY_CYCLE_MAX, DUTY_NUM_MAX, DUTY_SCALE_MAX, Direction},
    hal::{FadeParam, HPOINT_VAL_MAX, Instance},
    sync::Semaphore,
    timer::{self, TimerId},
};

pub(crate) const CHANNEL_COUNT: usize = 8;

/// Channel number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::FromRepr, strum::EnumIter)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Number {
    /// Channel 0
    Channel0 = 0,
    /// Channel 1
    Channel1 = 1,
    /// Channel 2
    Channel2 = 2,
    /// Channel 3
    Channel3 = 3,
    /// Channel 4
    Channel4 = 4,
    /// Channel 5
    Channel5 = 5,
    /// Channel 6
    Channel6 = 6,
    /// Channel 7
    Channel7 = 7,
}

impl TryFrom<u8> for Number {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_repr(value).ok_or(Error::InvalidArgument(Argument::Channel))
    }
}

/// A channel of a specific group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId {
    /// Group the channel belongs to.
    pub mode: SpeedMode,
    /// Index within the group.
    pub number: Number,
}

impl ChannelId {
    /// Identify a channel.
    pub const fn new(mode: SpeedMode, number: Number) -> Self {
        Self { mode, number }
    }
}

impl<H: Instance, S: Semaphore> Ledc<H, S> {
    /// Bind a channel to a timer of its group.
    pub fn bind_channel_timer(&self, channel: ChannelId, timer: timer::Number) -> Result<(), Error> {
        self.check_mode(channel.mode)?;

        critical_section::with(|_| {
            self.hw.bind_channel_timer(channel, timer);
            self.hw.channel_update(channel);
        });

        Ok(())
    }

    /// Largest duty the channel accepts, `2^resolution - 1` of its timer.
    ///
    /// Returns 0 if the timer was never configured.
    pub fn max_duty(&self, channel: ChannelId) -> Result<u32, Error> {
        self.check_mode(channel.mode)?;
        let timer = self.bound_timer(channel);

        Ok(critical_section::with(|_| {
            if self.hw.clock_divider(timer) == 0 {
                0
            } else {
                (1 << self.hw.duty_resolution(timer)) - 1
            }
        }))
    }

    /// Current output duty.
    pub fn duty(&self, channel: ChannelId) -> Result<u32, Error> {
        self.check_mode(channel.mode)?;
        Ok(self.hw.duty(channel))
    }

    /// Current high point.
    pub fn hpoint(&self, channel: ChannelId) -> Result<u32, Error> {
        self.check_mode(channel.mode)?;
        Ok(self.hw.hpoint(channel))
    }

    /// Write a new duty, keeping the high point. Applied by [`Ledc::commit`].
    pub fn set_duty(&self, channel: ChannelId, duty: u32) -> Result<(), Error> {
        self.write_duty(channel, duty, None)
    }

    /// Write a new duty and high point. Applied by [`Ledc::commit`].
    pub fn set_duty_with_start_point(
        &self,
        channel: ChannelId,
        duty: u32,
        hpoint: u32,
    ) -> Result<(), Error> {
        self.write_duty(channel, duty, Some(hpoint))
    }

    /// Apply the duty registers and enable the output.
    pub fn commit(&self, channel: ChannelId) -> Result<(), Error> {
        self.check_mode(channel.mode)?;
        self.update_duty(channel);
        Ok(())
    }

    /// Disable the output, holding it at `idle_high`.
    pub fn stop(&self, channel: ChannelId, idle_high: bool) -> Result<(), Error> {
        self.check_mode(channel.mode)?;

        critical_section::with(|_| {
            self.hw.set_idle_level(channel, idle_high);
            self.hw.set_sig_out_en(channel, false);
            self.hw.set_duty_start(channel, false);
            self.hw.channel_update(channel);
        });

        Ok(())
    }

    /// Program one raw hardware fade segment, starting at `duty`. Applied by
    /// [`Ledc::commit`].
    ///
    /// No fade-end handling happens, the generator stops after `steps` steps.
    pub fn set_fade(
        &self,
        channel: ChannelId,
        duty: u32,
        direction: Direction,
        steps: u32,
        cycles: u32,
        scale: u32,
    ) -> Result<(), Error> {
        if duty > self.max_duty(channel)? {
            return Err(Error::InvalidArgument(Argument::Duty));
        }
        if steps > DUTY_NUM_MAX {
            return Err(Error::InvalidArgument(Argument::StepCount));
        }
        if cycles > DUTY_CYCLE_MAX {
            return Err(Error::InvalidArgument(Argument::CycleCount));
        }
        if scale > DUTY_SCALE_MAX {
            return Err(Error::InvalidArgument(Argument::Scale));
        }

        let state = self.fade.get(channel);
        let _hw = state
            .as_deref()
            .map(|state| state.acquire_hardware(&self.hw, channel));

        critical_section::with(|_| {
            self.hw.set_duty_int_part(channel, duty);
            self.hw.set_fade_param(
                channel,
                FadeParam {
                    direction,
                    num: steps,
                    cycle: cycles,
                    scale,
                },
            );
        });

        Ok(())
    }

    /// A handle to one channel, implementing the `embedded-hal` PWM traits.
    pub fn channel(&self, id: ChannelId) -> Result<Channel<'_, H, S>, Error> {
        self.check_mode(id.mode)?;
        Ok(Channel { ledc: self, id })
    }

    pub(crate) fn bound_timer(&self, channel: ChannelId) -> TimerId {
        TimerId::new(channel.mode, self.hw.channel_timer(channel))
    }

    pub(crate) fn update_duty(&self, channel: ChannelId) {
        critical_section::with(|_| {
            self.hw.set_sig_out_en(channel, true);
            self.hw.set_duty_start(channel, true);
            self.hw.channel_update(channel);
        });
    }

    fn write_duty(&self, channel: ChannelId, duty: u32, hpoint: Option<u32>) -> Result<(), Error> {
        if duty > self.max_duty(channel)? {
            return Err(Error::InvalidArgument(Argument::Duty));
        }
        if hpoint.is_some_and(|hpoint| hpoint > HPOINT_VAL_MAX) {
            return Err(Error::InvalidArgument(Argument::Hpoint));
        }

        // Only channels with fade state can have a fade in flight.
        let state = self.fade.get(channel);
        let _hw = state
            .as_deref()
            .map(|state| state.acquire_hardware(&self.hw, channel));

        critical_section::with(|_| {
            if let Some(hpoint) = hpoint {
                self.hw.set_hpoint(channel, hpoint);
            }
            self.hw.set_duty_int_part(channel, duty);
            self.hw.set_fade_param(channel, FadeParam::NO_FADE);
        });

        Ok(())
    }
}

/// A single LEDC channel.
pub struct Channel<'a, H: Instance, S: Semaphore> {
    ledc: &'a Ledc<H, S>,
    id: ChannelId,
}

impl<H: Instance, S: Semaphore> Channel<'_, H, S> {
    /// The channel this handle drives.
    pub fn id(&self) -> ChannelId {
        self.id
    }
}

mod ehal1 {
    use embedded_hal::pwm::{self, ErrorKind, ErrorType, SetDutyCycle};

    use super::Channel;
    use crate::{Error, hal::Instance, sync::Semaphore};

    impl pwm::Error for Error {
        fn kind(&self) -> pwm::ErrorKind {
            ErrorKind::Other
        }
    }

    impl<H: Instance, S: Semaphore> ErrorType for Channel<'_, H, S> {
        type Error = Error;
    }

    impl<H: Instance, S: Semaphore> SetDutyCycle for Channel<'_, H, S> {
        fn max_duty_cycle(&self) -> u16 {
            let max = self.ledc.max_duty(self.id).unwrap_or(0);
            max.min(u16::MAX as u32) as u16
        }

        fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
            let max = self.ledc.max_duty(self.id)?;

            // Timers wider than 16 bits are scaled so that u16::MAX is fully on.
            let duty = match u16::try_from(max) {
                Ok(_) => u32::from(duty),
                Err(_) => (u64::from(duty) * u64::from(max) / u64::from(u16::MAX)) as u32,
            };

            self.ledc.set_duty(self.id, duty)?;
            self.ledc.commit(self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal::pwm::SetDutyCycle;
    use fugit::RateExtU32;

    use super::*;
    use crate::{
        ClockConfig,
        emulation::{EmulatedLedc, StdSemaphore},
        hal::ChannelHw,
    };

    const TIMER0: TimerId = TimerId::new(SpeedMode::LowSpeed, timer::Number::Timer0);
    const CH0: ChannelId = ChannelId::new(SpeedMode::LowSpeed, Number::Channel0);

    fn configured() -> (EmulatedLedc, Ledc<EmulatedLedc, StdSemaphore>) {
        let hw = EmulatedLedc::new();
        let ledc = Ledc::new(hw.clone());
        ledc.configure_clock(TIMER0, 5.kHz(), 13, ClockConfig::Auto)
            .unwrap();
        ledc.bind_channel_timer(CH0, timer::Number::Timer0).unwrap();
        (hw, ledc)
    }

    #[test]
    fn max_duty_follows_timer_resolution() {
        let hw = EmulatedLedc::new();
        let ledc = Ledc::<_, StdSemaphore>::new(hw);
        assert_eq!(ledc.max_duty(CH0), Ok(0));

        ledc.configure_clock(TIMER0, 5.kHz(), 13, ClockConfig::Auto)
            .unwrap();
        assert_eq!(ledc.max_duty(CH0), Ok(8191));
    }

    #[test]
    fn set_duty_needs_commit() {
        let (hw, ledc) = configured();

        ledc.set_duty(CH0, 4096).unwrap();
        hw.run_pending();
        assert_eq!(ledc.duty(CH0), Ok(0));

        ledc.commit(CH0).unwrap();
        hw.run_pending();
        assert_eq!(ledc.duty(CH0), Ok(4096));
        assert!(hw.output_enabled(CH0));
    }

    #[test]
    fn set_duty_and_commit_is_idempotent() {
        let (hw, ledc) = configured();

        for _ in 0..3 {
            ledc.set_duty(CH0, 1234).unwrap();
            ledc.commit(CH0).unwrap();
            hw.run_pending();
            assert_eq!(ledc.duty(CH0), Ok(1234));
        }
    }

    #[test]
    fn duty_and_hpoint_are_range_checked() {
        let (hw, ledc) = configured();
        let writes = hw.register_writes();

        assert_eq!(
            ledc.set_duty(CH0, 8192),
            Err(Error::InvalidArgument(Argument::Duty))
        );
        assert_eq!(
            ledc.set_duty_with_start_point(CH0, 10, HPOINT_VAL_MAX + 1),
            Err(Error::InvalidArgument(Argument::Hpoint))
        );
        assert_eq!(hw.register_writes(), writes);

        ledc.set_duty_with_start_point(CH0, 10, 300).unwrap();
        assert_eq!(ledc.hpoint(CH0), Ok(300));
        ledc.set_duty(CH0, 20).unwrap();
        assert_eq!(ledc.hpoint(CH0), Ok(300));
    }

    #[test]
    fn stop_disables_output() {
        let (hw, ledc) = configured();
        ledc.set_duty(CH0, 100).unwrap();
        ledc.commit(CH0).unwrap();

        ledc.stop(CH0, true).unwrap();

        assert!(!hw.output_enabled(CH0));
        assert!(hw.idle_level(CH0));
    }

    #[test]
    fn raw_fade_segment() {
        let (hw, ledc) = configured();

        assert_eq!(
            ledc.set_fade(CH0, 0, Direction::Increase, DUTY_NUM_MAX + 1, 1, 1),
            Err(Error::InvalidArgument(Argument::StepCount))
        );
        assert_eq!(
            ledc.set_fade(CH0, 0, Direction::Increase, 1, DUTY_CYCLE_MAX + 1, 1),
            Err(Error::InvalidArgument(Argument::CycleCount))
        );
        assert_eq!(
            ledc.set_fade(CH0, 0, Direction::Increase, 1, 1, DUTY_SCALE_MAX + 1),
            Err(Error::InvalidArgument(Argument::Scale))
        );

        ledc.set_fade(CH0, 100, Direction::Increase, 10, 2, 5).unwrap();
        ledc.commit(CH0).unwrap();
        hw.run_pending();

        assert_eq!(ledc.duty(CH0), Ok(150));
    }

    #[test]
    fn bind_moves_channel_to_timer() {
        let (hw, ledc) = configured();

        ledc.bind_channel_timer(CH0, timer::Number::Timer2).unwrap();

        assert_eq!(hw.channel_timer(CH0), timer::Number::Timer2);
        assert_eq!(ledc.max_duty(CH0), Ok(0));
    }

    #[test]
    fn unsupported_group_and_bad_index() {
        let ledc = Ledc::<_, StdSemaphore>::new(EmulatedLedc::low_speed_only());
        let high = ChannelId::new(SpeedMode::HighSpeed, Number::Channel0);

        assert_eq!(
            ledc.set_duty(high, 0),
            Err(Error::InvalidArgument(Argument::SpeedMode))
        );
        assert_eq!(Number::try_from(8), Err(Error::InvalidArgument(Argument::Channel)));
        assert_eq!(
            SpeedMode::try_from(2),
            Err(Error::InvalidArgument(Argument::SpeedMode))
        );
    }

    #[test]
    fn embedded_hal_channel() {
        let (hw, ledc) = configured();
        let mut channel = ledc.channel(CH0).unwrap();

        assert_eq!(channel.max_duty_cycle(), 8191);
        channel.set_duty_cycle_percent(50).unwrap();
        hw.run_pending();

        assert_eq!(ledc.duty(CH0), Ok(4095));
        assert_eq!(
            channel.set_duty_cycle(8192),
            Err(Error::InvalidArgument(Argument::Duty))
        );
    }

    #[test]
    fn embedded_hal_channel_wider_than_16_bits() {
        let hw = EmulatedLedc::new();
        let ledc = Ledc::<_, StdSemaphore>::new(hw.clone());
        ledc.configure_clock(TIMER0, 100.Hz(), 18, ClockConfig::Auto)
            .unwrap();
        let mut channel = ledc.channel(CH0).unwrap();

        assert_eq!(channel.max_duty_cycle(), u16::MAX);

        channel.set_duty_cycle_fully_on().unwrap();
        hw.run_pending();
        assert_eq!(ledc.duty(CH0), ledc.max_duty(CH0));
        assert_eq!(ledc.duty(CH0), Ok(262_143));

        channel.set_duty_cycle_fully_off().unwrap();
        hw.run_pending();
        assert_eq!(ledc.duty(CH0), Ok(0));
    }
}
