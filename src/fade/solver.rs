//! Fade parameter arithmetic.
//!
//! The step generator of a channel adds `scale` to the duty every `cycle`
//! PWM periods, at most [`DUTY_NUM_MAX`] times per segment. The functions in
//! this module turn a requested fade into such segments. They never touch the
//! hardware.

use crate::hal::FadeParam;

/// Maximum number of steps in one hardware fade segment.
pub const DUTY_NUM_MAX: u32 = 0x3FF;

/// Maximum number of PWM periods between two steps.
pub const DUTY_CYCLE_MAX: u32 = 0x3FF;

/// Maximum duty change per step.
pub const DUTY_SCALE_MAX: u32 = 0x3FF;

/// Direction of a fade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Direction {
    /// Duty goes down.
    Decrease = 0,
    /// Duty goes up.
    Increase = 1,
}

/// Reason a time based fade does not take exactly the requested time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RateClamp {
    /// The duty change per period was capped at [`DUTY_SCALE_MAX`], or the
    /// fade is shorter than one PWM period.
    TooFast,
    /// The number of periods per step was capped at [`DUTY_CYCLE_MAX`].
    TooSlow,
}

/// The first segment of a fade, and what the stepper needs to continue it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepPlan {
    /// Duty the first segment starts from.
    pub start_duty: u32,
    /// Final duty.
    pub target: u32,
    /// Direction of every segment.
    pub direction: Direction,
    /// Steps in the first segment.
    pub step_count: u32,
    /// Duty change per step, 0 for a plan that jumps straight to the target.
    pub scale: u32,
    /// PWM periods per step.
    pub cycle_count: u32,
    /// Set if a time based fade could not be honoured exactly.
    pub clamped: Option<RateClamp>,
}

impl StepPlan {
    /// Whether the plan loads the target in one go.
    pub fn is_snap(&self) -> bool {
        self.scale == 0 || self.step_count == 0
    }

    /// Duty to load and the segment to program.
    pub fn first_segment(&self) -> (u32, FadeParam) {
        if self.is_snap() {
            (self.target, FadeParam::NO_FADE)
        } else {
            (
                self.start_duty,
                FadeParam {
                    direction: self.direction,
                    num: self.step_count,
                    cycle: self.cycle_count,
                    scale: self.scale,
                },
            )
        }
    }
}

/// Plan a fade from `current` to `target` in steps of `scale` every
/// `cycle_count` periods.
///
/// A channel sitting at `max_duty` is treated as one below it, so a
/// decreasing fade with a scale of 1 can not wrap the duty register.
pub fn solve_by_step(
    current: u32,
    max_duty: u32,
    target: u32,
    scale: u32,
    cycle_count: u32,
) -> StepPlan {
    let start_duty = if current == max_duty {
        current.saturating_sub(1)
    } else {
        current
    };

    let (direction, delta) = if target > start_duty {
        (Direction::Increase, target - start_duty)
    } else {
        (Direction::Decrease, start_duty - target)
    };

    let step_count = match scale {
        0 => 0,
        scale => (delta / scale).min(DUTY_NUM_MAX),
    };

    StepPlan {
        start_duty,
        target,
        direction,
        step_count,
        scale,
        cycle_count,
        clamped: None,
    }
}

/// Plan a fade from `current` to `target` lasting about `duration_ms` at a
/// PWM frequency of `frequency_hz`.
pub fn solve_by_time(
    current: u32,
    max_duty: u32,
    target: u32,
    frequency_hz: u32,
    duration_ms: u32,
) -> StepPlan {
    let delta = current.abs_diff(target);
    if delta == 0 {
        return solve_by_step(current, max_duty, target, 0, 0);
    }

    let total_cycles = duration_ms as u64 * frequency_hz as u64 / 1000;
    if total_cycles == 0 {
        warn!("Fade too fast: duty change can not be spread over less than one period");
        return StepPlan {
            clamped: Some(RateClamp::TooFast),
            ..solve_by_step(current, max_duty, target, 0, 0)
        };
    }

    let delta = delta as u64;
    let (scale, cycle_count, clamped) = if total_cycles > delta {
        let cycles = (total_cycles / delta).max(1);
        if cycles > DUTY_CYCLE_MAX as u64 {
            warn!("Fade too slow: cycle count clamped to {}", DUTY_CYCLE_MAX);
            (1, DUTY_CYCLE_MAX, Some(RateClamp::TooSlow))
        } else {
            (1, cycles as u32, None)
        }
    } else {
        let scale = (delta / total_cycles).max(1);
        if scale > DUTY_SCALE_MAX as u64 {
            warn!("Fade too fast: scale clamped to {}", DUTY_SCALE_MAX);
            (DUTY_SCALE_MAX, 1, Some(RateClamp::TooFast))
        } else {
            (scale as u32, 1, None)
        }
    };

    StepPlan {
        clamped,
        ..solve_by_step(current, max_duty, target, scale, cycle_count)
    }
}

/// What the stepper does after a segment ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Progress {
    /// The fade is over.
    Converged,
    /// Load `start_duty` and run another segment.
    Continue {
        /// Duty the segment starts from.
        start_duty: u32,
        /// The segment.
        param: FadeParam,
    },
}

/// Decide how to continue a fade that has reached `current`.
///
/// While more than one step of `scale` remains, the fade continues in
/// `direction` from `current`. The remainder is covered by a single jump to
/// `target`, which also catches any overshoot.
pub fn next_segment(
    current: u32,
    target: u32,
    direction: Direction,
    scale: u32,
    cycle_count: u32,
) -> Progress {
    if current == target || scale == 0 {
        return Progress::Converged;
    }

    let remaining = match direction {
        Direction::Increase => target as i64 - current as i64,
        Direction::Decrease => current as i64 - target as i64,
    };

    if remaining > scale as i64 {
        Progress::Continue {
            start_duty: current,
            param: FadeParam {
                direction,
                num: ((remaining as u64 / scale as u64) as u32).min(DUTY_NUM_MAX),
                cycle: cycle_count,
                scale,
            },
        }
    } else {
        Progress::Continue {
            start_duty: target,
            param: FadeParam::NO_FADE,
        }
    }
}
