//! # LEDC timer
//!
//! ## Overview
//! Every channel is clocked by one of the four timers of its group. A timer
//! divides its clock source down to `frequency * 2^resolution`, so both the
//! PWM frequency and the duty resolution of all channels bound to it are set
//! here.
//!
//! ## Clock selection
//! The divider is a fixed point number with [`FRACTIONAL_BITS`] fractional
//! bits and must lie within [`DIVIDER_MIN`]`..=`[`DIVIDER_MAX`].
//!
//! With [`ClockConfig::Auto`] the APB clock is tried first. If the divider
//! overflows, the 1 MHz REF_TICK is used instead. A divider that underflows
//! means the frequency is too high for the resolution, and no other clock
//! can help.
//!
//! The RC_FAST oscillator is only available to low speed timers and is
//! calibrated the first time it is requested.

use fugit::HertzU32;
use portable_atomic::{AtomicU32, Ordering};

use crate::{Argument, Error, Ledc, SpeedMode, hal::Instance, sync::Semaphore};

/// Number of fractional bits of the timer clock divider.
pub const FRACTIONAL_BITS: u32 = 8;

/// Smallest legal clock divider (divide by 1).
pub const DIVIDER_MIN: u32 = 1 << FRACTIONAL_BITS;

/// Largest legal clock divider.
pub const DIVIDER_MAX: u32 = 0x3FFFF;

const AUTO_SOURCES: [ClockSource; 2] = [ClockSource::Apb, ClockSource::RefTick];

/// Timer number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::FromRepr, strum::EnumIter)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Number {
    /// Timer 0.
    Timer0 = 0,
    /// Timer 1.
    Timer1 = 1,
    /// Timer 2.
    Timer2 = 2,
    /// Timer 3.
    Timer3 = 3,
}

impl TryFrom<u8> for Number {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_repr(value).ok_or(Error::InvalidArgument(Argument::Timer))
    }
}

/// A timer of a specific group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerId {
    /// Group the timer belongs to.
    pub mode: SpeedMode,
    /// Index within the group.
    pub number: Number,
}

impl TimerId {
    /// Identify a timer.
    pub const fn new(mode: SpeedMode, number: Number) -> Self {
        Self { mode, number }
    }
}

/// Clock source of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSource {
    /// APB clock.
    Apb,
    /// 1 MHz reference tick.
    RefTick,
    /// External crystal.
    Xtal,
    /// Internal RC oscillator, calibrated on first use. Low speed timers
    /// only.
    RcFast,
}

/// How [`Ledc::configure_clock`] picks a clock source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockConfig {
    /// Try APB, fall back to REF_TICK for low frequencies.
    #[default]
    Auto,
    /// Use the given clock source.
    Source(ClockSource),
}

impl ClockConfig {
    /// The external crystal.
    pub const XTAL: Self = Self::Source(ClockSource::Xtal);

    /// The calibrated RC_FAST oscillator.
    pub const RC_FAST: Self = Self::Source(ClockSource::RcFast);
}

/// A clock source together with the frequency it runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockCandidate {
    /// The clock source.
    pub source: ClockSource,
    /// Its frequency.
    pub nominal: HertzU32,
}

/// Result of clock planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockPlan {
    /// Selected clock source.
    pub source: ClockSource,
    /// Clock divider, with [`FRACTIONAL_BITS`] fractional bits.
    pub divider: u32,
}

/// Timer configuration
pub mod config {
    use fugit::{HertzU32, RateExtU32};

    use super::ClockConfig;
    use crate::{Argument, Error};

    /// Number of bits reserved for duty cycle adjustment
    #[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[repr(u32)]
    pub enum Duty {
        /// 1-bit resolution for duty cycle adjustment.
        Duty1Bit = 1,
        /// 2-bit resolution for duty cycle adjustment.
        Duty2Bit,
        /// 3-bit resolution for duty cycle adjustment.
        Duty3Bit,
        /// 4-bit resolution for duty cycle adjustment.
        Duty4Bit,
        /// 5-bit resolution for duty cycle adjustment.
        Duty5Bit,
        /// 6-bit resolution for duty cycle adjustment.
        Duty6Bit,
        /// 7-bit resolution for duty cycle adjustment.
        Duty7Bit,
        /// 8-bit resolution for duty cycle adjustment.
        Duty8Bit,
        /// 9-bit resolution for duty cycle adjustment.
        Duty9Bit,
        /// 10-bit resolution for duty cycle adjustment.
        Duty10Bit,
        /// 11-bit resolution for duty cycle adjustment.
        Duty11Bit,
        /// 12-bit resolution for duty cycle adjustment.
        Duty12Bit,
        /// 13-bit resolution for duty cycle adjustment.
        Duty13Bit,
        /// 14-bit resolution for duty cycle adjustment.
        Duty14Bit,
        /// 15-bit resolution for duty cycle adjustment.
        Duty15Bit,
        /// 16-bit resolution for duty cycle adjustment.
        Duty16Bit,
        /// 17-bit resolution for duty cycle adjustment.
        Duty17Bit,
        /// 18-bit resolution for duty cycle adjustment.
        Duty18Bit,
        /// 19-bit resolution for duty cycle adjustment.
        Duty19Bit,
        /// 20-bit resolution for duty cycle adjustment.
        Duty20Bit,
    }

    impl Duty {
        /// Resolution in bits.
        pub const fn bits(self) -> u32 {
            self as u32
        }
    }

    impl TryFrom<u32> for Duty {
        type Error = Error;

        fn try_from(value: u32) -> Result<Self, Self::Error> {
            Self::from_repr(value).ok_or(Error::InvalidArgument(Argument::Resolution))
        }
    }

    /// Timer configuration
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Config {
        /// The duty cycle resolution.
        pub duty: Duty,
        /// The clock source for the timer.
        pub clock_source: ClockConfig,
        /// The frequency of the PWM signal in Hertz.
        pub frequency: HertzU32,
    }

    impl Default for Config {
        fn default() -> Self {
            Self {
                duty: Duty::Duty13Bit,
                clock_source: ClockConfig::Auto,
                frequency: 5.kHz(),
            }
        }
    }

    impl Config {
        /// Set the duty cycle resolution.
        pub fn with_duty(mut self, duty: Duty) -> Self {
            self.duty = duty;
            self
        }

        /// Set the clock source.
        pub fn with_clock_source(mut self, clock_source: ClockConfig) -> Self {
            self.clock_source = clock_source;
            self
        }

        /// Set the PWM frequency.
        pub fn with_frequency(mut self, frequency: HertzU32) -> Self {
            self.frequency = frequency;
            self
        }
    }
}

/// Rounded clock divider for `src_hz` to produce `freq_hz * precision`.
pub(crate) fn divider(src_hz: u32, freq_hz: u32, precision: u64) -> u64 {
    let denominator = freq_hz as u64 * precision;
    (((src_hz as u64) << FRACTIONAL_BITS) + denominator / 2) / denominator
}

fn divider_valid(divider: u64) -> bool {
    (DIVIDER_MIN as u64..=DIVIDER_MAX as u64).contains(&divider)
}

/// Clock source selection, plus the RC_FAST calibration cache.
pub(crate) struct ClockPlanner {
    rc_fast_hz: AtomicU32,
}

impl ClockPlanner {
    pub(crate) const fn new() -> Self {
        Self {
            rc_fast_hz: AtomicU32::new(0),
        }
    }

    /// Frequency of a clock source, calibrating RC_FAST if necessary.
    fn candidate<H: Instance>(
        &self,
        hw: &H,
        source: ClockSource,
    ) -> Result<ClockCandidate, Error> {
        let nominal = match source {
            ClockSource::RcFast => self.rc_fast(hw)?,
            source => hw.source_frequency(source),
        };

        if nominal.raw() == 0 {
            return Err(Error::InvalidArgument(Argument::ClockSource));
        }

        Ok(ClockCandidate { source, nominal })
    }

    fn rc_fast<H: Instance>(&self, hw: &H) -> Result<HertzU32, Error> {
        let cached = self.rc_fast_hz.load(Ordering::Acquire);
        if cached != 0 {
            return Ok(HertzU32::from_raw(cached));
        }

        match hw.calibrate_rc_fast() {
            Some(freq) if freq.raw() != 0 => {
                debug!("Calibrated RC_FAST: {} Hz", freq.raw());
                self.rc_fast_hz.store(freq.raw(), Ordering::Release);
                Ok(freq)
            }
            _ => {
                error!("RC_FAST calibration failed");
                Err(Error::Unachievable)
            }
        }
    }

    /// Frequency of a source without triggering a calibration.
    pub(crate) fn current_frequency<H: Instance>(
        &self,
        hw: &H,
        source: ClockSource,
    ) -> Option<HertzU32> {
        let freq = match source {
            ClockSource::RcFast => HertzU32::from_raw(self.rc_fast_hz.load(Ordering::Acquire)),
            source => hw.source_frequency(source),
        };

        (freq.raw() != 0).then_some(freq)
    }

    /// Pick a clock source and divider. Nothing is written to the hardware.
    pub(crate) fn plan<H: Instance>(
        &self,
        hw: &H,
        mode: SpeedMode,
        frequency: HertzU32,
        resolution: u32,
        clock: ClockConfig,
    ) -> Result<ClockPlan, Error> {
        let precision = 1u64 << resolution;

        match clock {
            ClockConfig::Auto => {
                for source in AUTO_SOURCES {
                    let Ok(candidate) = self.candidate(hw, source) else {
                        continue;
                    };
                    let divider = divider(candidate.nominal.raw(), frequency.raw(), precision);

                    if divider < DIVIDER_MIN as u64 {
                        break;
                    }
                    if divider_valid(divider) {
                        return Ok(ClockPlan {
                            source,
                            divider: divider as u32,
                        });
                    }

                    debug!("Divider {} out of range for {:?}", divider, source);
                }
            }
            ClockConfig::Source(ClockSource::RcFast) if mode != SpeedMode::LowSpeed => {
                error!("RC_FAST can only clock low speed timers");
                return Err(Error::InvalidArgument(Argument::ClockSource));
            }
            ClockConfig::Source(source) => {
                let candidate = self.candidate(hw, source)?;
                let divider = divider(candidate.nominal.raw(), frequency.raw(), precision);

                if divider_valid(divider) {
                    return Ok(ClockPlan {
                        source,
                        divider: divider as u32,
                    });
                }
            }
        }

        error!(
            "Requested frequency {} Hz and duty resolution {} bits can not be achieved",
            frequency.raw(),
            resolution
        );
        Err(Error::Unachievable)
    }
}

impl<H: Instance, S: Semaphore> Ledc<H, S> {
    /// Configure a timer for `frequency` at `resolution` bits of duty
    /// resolution.
    ///
    /// On success the timer is programmed, resumed and reset. On failure the
    /// timer keeps its previous configuration.
    pub fn configure_clock(
        &self,
        timer: TimerId,
        frequency: HertzU32,
        resolution: u32,
        clock: ClockConfig,
    ) -> Result<(), Error> {
        self.check_mode(timer.mode)?;
        if frequency.raw() == 0 {
            return Err(Error::InvalidArgument(Argument::Frequency));
        }
        if resolution == 0 || resolution > self.hw.max_duty_resolution() {
            return Err(Error::InvalidArgument(Argument::Resolution));
        }

        let plan = self
            .clocks
            .plan(&self.hw, timer.mode, frequency, resolution, clock)?;

        debug!(
            "Using clock source {:?} ({:?}), divider {:#x}",
            plan.source, timer.mode, plan.divider
        );

        critical_section::with(|_| {
            self.hw.set_clock_source(timer, plan.source);
            self.hw.set_clock_divider(timer, plan.divider);
            self.hw.set_duty_resolution(timer, resolution);
            self.hw.timer_update(timer);
            self.hw.timer_resume(timer);
            self.hw.timer_reset(timer);
        });

        Ok(())
    }

    /// Configure a timer from a [`config::Config`].
    pub fn configure_timer(&self, timer: TimerId, config: config::Config) -> Result<(), Error> {
        self.configure_clock(
            timer,
            config.frequency,
            config.duty.bits(),
            config.clock_source,
        )
    }

    /// Change the frequency of a configured timer, keeping its clock source
    /// and duty resolution.
    pub fn set_frequency(&self, timer: TimerId, frequency: HertzU32) -> Result<(), Error> {
        self.check_mode(timer.mode)?;
        if frequency.raw() == 0 {
            return Err(Error::InvalidArgument(Argument::Frequency));
        }
        if self.hw.clock_divider(timer) == 0 {
            return Err(Error::TimerNotConfigured);
        }

        let source = self.hw.clock_source(timer);
        let resolution = self.hw.duty_resolution(timer);
        let plan = self.clocks.plan(
            &self.hw,
            timer.mode,
            frequency,
            resolution,
            ClockConfig::Source(source),
        )?;

        critical_section::with(|_| {
            self.hw.set_clock_divider(timer, plan.divider);
            self.hw.timer_update(timer);
        });

        Ok(())
    }

    /// Return the frequency the timer actually runs at, or `None` if it was
    /// never configured.
    pub fn frequency(&self, timer: TimerId) -> Option<HertzU32> {
        if !self.hw.supports(timer.mode) {
            return None;
        }

        let (divider, resolution, source) = critical_section::with(|_| {
            (
                self.hw.clock_divider(timer),
                self.hw.duty_resolution(timer),
                self.hw.clock_source(timer),
            )
        });

        if divider == 0 {
            warn!("LEDC timer {:?} not configured", timer.number);
            return None;
        }

        let src_hz = self.clocks.current_frequency(&self.hw, source)?.raw() as u64;
        let denominator = (1u64 << resolution) * divider as u64;
        let freq = ((src_hz << FRACTIONAL_BITS) + denominator / 2) / denominator;

        Some(HertzU32::from_raw(freq as u32))
    }

    /// Highest duty resolution at which `source` can be divided down to
    /// `frequency`, or 0 if there is none.
    pub fn find_suitable_duty_resolution(&self, source: HertzU32, frequency: HertzU32) -> u32 {
        let (src_hz, freq_hz) = (source.raw(), frequency.raw());
        if freq_hz == 0 {
            return 0;
        }

        let max_bits = self.hw.max_duty_resolution();
        let fits = |div: u32| -> Option<u32> {
            let bits = div.checked_ilog2()?.min(max_bits);
            divider_valid(divider(src_hz, freq_hz, 1 << bits)).then_some(bits)
        };

        let rounded = ((src_hz as u64 + freq_hz as u64 / 2) / freq_hz as u64) as u32;
        fits(rounded).or_else(|| fits(src_hz / freq_hz)).unwrap_or(0)
    }

    /// Stop the timer counter.
    pub fn pause_timer(&self, timer: TimerId) -> Result<(), Error> {
        self.check_mode(timer.mode)?;
        critical_section::with(|_| self.hw.timer_pause(timer));
        Ok(())
    }

    /// Restart a paused timer counter.
    pub fn resume_timer(&self, timer: TimerId) -> Result<(), Error> {
        self.check_mode(timer.mode)?;
        critical_section::with(|_| self.hw.timer_resume(timer));
        Ok(())
    }

    /// Reset the timer counter.
    pub fn reset_timer(&self, timer: TimerId) -> Result<(), Error> {
        self.check_mode(timer.mode)?;
        critical_section::with(|_| {
            self.hw.timer_reset(timer);
            self.hw.timer_update(timer);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fugit::RateExtU32;

    use super::*;
    use crate::{
        emulation::{EmulatedLedc, StdSemaphore},
        hal::TimerHw,
    };

    const TIMER0: TimerId = TimerId::new(SpeedMode::LowSpeed, Number::Timer0);

    fn ledc() -> (EmulatedLedc, Ledc<EmulatedLedc, StdSemaphore>) {
        let hw = EmulatedLedc::new();
        (hw.clone(), Ledc::new(hw))
    }

    #[test]
    fn apb_divider_for_5khz_13bit() {
        let (hw, ledc) = ledc();

        ledc.configure_clock(TIMER0, 5.kHz(), 13, ClockConfig::Auto)
            .unwrap();

        assert_eq!(hw.clock_source(TIMER0), ClockSource::Apb);
        assert_eq!(hw.clock_divider(TIMER0), 500);
        assert_eq!(hw.duty_resolution(TIMER0), 13);
        assert_eq!(ledc.frequency(TIMER0), Some(5.kHz()));
    }

    #[test]
    fn programmed_frequency_is_within_one_lsb() {
        let (_, ledc) = ledc();

        for (freq, bits) in [(1_000u32, 10u32), (5_000, 13), (12_345, 8), (40, 14), (3, 12)] {
            ledc.configure_clock(TIMER0, freq.Hz(), bits, ClockConfig::Auto)
                .unwrap();

            let actual = ledc.frequency(TIMER0).unwrap().raw();
            assert!(actual.abs_diff(freq) <= 1, "{freq} Hz / {bits} bits: got {actual} Hz");
        }
    }

    #[test]
    fn auto_falls_back_to_ref_tick_on_overflow() {
        let (hw, ledc) = ledc();

        ledc.configure_clock(TIMER0, 2.Hz(), 13, ClockConfig::Auto)
            .unwrap();

        assert_eq!(hw.clock_source(TIMER0), ClockSource::RefTick);
        assert_eq!(hw.clock_divider(TIMER0), 15625);
        assert_eq!(ledc.frequency(TIMER0), Some(2.Hz()));
    }

    #[test]
    fn auto_fails_on_underflow_without_fallback() {
        let (hw, ledc) = ledc();
        ledc.configure_clock(TIMER0, 5.kHz(), 13, ClockConfig::Auto)
            .unwrap();
        let before = (
            hw.clock_source(TIMER0),
            hw.clock_divider(TIMER0),
            hw.duty_resolution(TIMER0),
        );
        hw.clear_frequency_queries();

        assert_eq!(
            ledc.configure_clock(TIMER0, 100.kHz(), 13, ClockConfig::Auto),
            Err(Error::Unachievable)
        );

        assert_eq!(hw.frequency_queries(), [ClockSource::Apb]);
        assert_eq!(
            before,
            (
                hw.clock_source(TIMER0),
                hw.clock_divider(TIMER0),
                hw.duty_resolution(TIMER0),
            )
        );
    }

    #[test]
    fn unachievable_leaves_unconfigured_timer_untouched() {
        let (hw, ledc) = ledc();

        assert_eq!(
            ledc.configure_clock(TIMER0, 10.MHz(), 13, ClockConfig::Auto),
            Err(Error::Unachievable)
        );

        assert_eq!(hw.clock_divider(TIMER0), 0);
        assert_eq!(ledc.frequency(TIMER0), None);
    }

    #[test]
    fn explicit_source_does_not_fall_back() {
        let (hw, ledc) = ledc();

        assert_eq!(
            ledc.configure_clock(TIMER0, 2.Hz(), 13, ClockConfig::Source(ClockSource::Apb)),
            Err(Error::Unachievable)
        );

        ledc.configure_clock(TIMER0, 1.kHz(), 10, ClockConfig::XTAL)
            .unwrap();
        assert_eq!(hw.clock_source(TIMER0), ClockSource::Xtal);
        assert_eq!(hw.clock_divider(TIMER0), 10_000);
    }

    #[test]
    fn rc_fast_is_calibrated_once() {
        let (hw, ledc) = ledc();
        hw.set_rc_fast_calibration(Some(17_500.kHz()));

        ledc.configure_clock(TIMER0, 1.kHz(), 10, ClockConfig::RC_FAST)
            .unwrap();
        ledc.configure_clock(TIMER0, 2.kHz(), 10, ClockConfig::RC_FAST)
            .unwrap();

        assert_eq!(hw.rc_fast_calibrations(), 1);
        assert_eq!(hw.clock_source(TIMER0), ClockSource::RcFast);
        assert_eq!(ledc.frequency(TIMER0), Some(2.kHz()));
    }

    #[test]
    fn rc_fast_zero_measurement_fails() {
        let (hw, ledc) = ledc();
        hw.set_rc_fast_calibration(Some(0.Hz()));

        assert_eq!(
            ledc.configure_clock(TIMER0, 1.kHz(), 10, ClockConfig::RC_FAST),
            Err(Error::Unachievable)
        );
        assert_eq!(hw.clock_divider(TIMER0), 0);

        // A failed measurement is not cached.
        hw.set_rc_fast_calibration(Some(17_500.kHz()));
        ledc.configure_clock(TIMER0, 1.kHz(), 10, ClockConfig::RC_FAST)
            .unwrap();
        assert_eq!(hw.rc_fast_calibrations(), 2);
    }

    #[test]
    fn rc_fast_rejected_for_high_speed_timers() {
        let (hw, ledc) = ledc();
        let timer = TimerId::new(SpeedMode::HighSpeed, Number::Timer1);

        assert_eq!(
            ledc.configure_clock(timer, 1.kHz(), 10, ClockConfig::RC_FAST),
            Err(Error::InvalidArgument(Argument::ClockSource))
        );
        assert_eq!(hw.rc_fast_calibrations(), 0);
    }

    #[test]
    fn arguments_are_checked_first() {
        let (hw, ledc) = ledc();

        assert_eq!(
            ledc.configure_clock(TIMER0, 0.Hz(), 13, ClockConfig::Auto),
            Err(Error::InvalidArgument(Argument::Frequency))
        );
        assert_eq!(
            ledc.configure_clock(TIMER0, 5.kHz(), 0, ClockConfig::Auto),
            Err(Error::InvalidArgument(Argument::Resolution))
        );
        assert_eq!(
            ledc.configure_clock(TIMER0, 5.kHz(), 21, ClockConfig::Auto),
            Err(Error::InvalidArgument(Argument::Resolution))
        );
        assert!(hw.frequency_queries().is_empty());
        assert_eq!(Number::try_from(4), Err(Error::InvalidArgument(Argument::Timer)));
    }

    #[test]
    fn unsupported_group_is_rejected() {
        let hw = EmulatedLedc::low_speed_only();
        let ledc = Ledc::<_, StdSemaphore>::new(hw);

        assert_eq!(
            ledc.configure_clock(
                TimerId::new(SpeedMode::HighSpeed, Number::Timer0),
                5.kHz(),
                13,
                ClockConfig::Auto
            ),
            Err(Error::InvalidArgument(Argument::SpeedMode))
        );
    }

    #[test]
    fn set_frequency_keeps_source_and_resolution() {
        let (hw, ledc) = ledc();

        assert_eq!(
            ledc.set_frequency(TIMER0, 1.kHz()),
            Err(Error::TimerNotConfigured)
        );

        ledc.configure_clock(TIMER0, 2.Hz(), 13, ClockConfig::Auto)
            .unwrap();
        ledc.set_frequency(TIMER0, 4.Hz()).unwrap();

        assert_eq!(hw.clock_source(TIMER0), ClockSource::RefTick);
        assert_eq!(hw.duty_resolution(TIMER0), 13);
        assert_eq!(ledc.frequency(TIMER0), Some(4.Hz()));
    }

    #[test]
    fn configure_timer_uses_duty_enum() {
        let (hw, ledc) = ledc();
        let config = config::Config::default()
            .with_duty(config::Duty::try_from(10).unwrap())
            .with_frequency(24.kHz());

        ledc.configure_timer(TIMER0, config).unwrap();

        assert_eq!(hw.duty_resolution(TIMER0), 10);
        assert_eq!(
            config::Duty::try_from(21),
            Err(Error::InvalidArgument(Argument::Resolution))
        );
    }

    #[test]
    fn suitable_duty_resolution() {
        let (_, ledc) = ledc();

        assert_eq!(ledc.find_suitable_duty_resolution(80.MHz(), 5.kHz()), 13);
        assert_eq!(ledc.find_suitable_duty_resolution(80.MHz(), 1.Hz()), 20);
        assert_eq!(ledc.find_suitable_duty_resolution(80.MHz(), 40.MHz()), 1);
        assert_eq!(ledc.find_suitable_duty_resolution(80.MHz(), 100.MHz()), 0);
        assert_eq!(ledc.find_suitable_duty_resolution(80.MHz(), 0.Hz()), 0);
    }

    #[test]
    fn pause_resume_reset() {
        let (hw, ledc) = ledc();
        ledc.configure_clock(TIMER0, 5.kHz(), 13, ClockConfig::Auto)
            .unwrap();

        ledc.pause_timer(TIMER0).unwrap();
        assert!(hw.timer_paused(TIMER0));
        ledc.resume_timer(TIMER0).unwrap();
        assert!(!hw.timer_paused(TIMER0));

        let resets = hw.timer_resets(TIMER0);
        ledc.reset_timer(TIMER0).unwrap();
        assert_eq!(hw.timer_resets(TIMER0), resets + 1);
    }
}
