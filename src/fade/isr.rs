use strum::IntoEnumIterator;

use super::{
    FadeEndEvent,
    Progress,
    next_segment,
    state::{FadeParams, FadeState},
};
use crate::{
    Ledc,
    SpeedMode,
    channel::{self, ChannelId},
    hal::Instance,
    sync::Semaphore,
};

impl<H: Instance, S: Semaphore> Ledc<H, S> {
    /// Fade-end interrupt handler.
    ///
    /// Must be called from the interrupt bound by
    /// [`Instance::bind_fade_interrupt`]. Continues every fade whose segment
    /// ended, and releases the channels that reached their target.
    ///
    /// Returns `true` if a context switch should be requested on interrupt
    /// exit.
    pub fn on_interrupt(&self) -> bool {
        let mut yield_requested = false;

        for mode in SpeedMode::iter() {
            if !self.hw.supports(mode) {
                continue;
            }

            let status = self.hw.fade_end_intr_status(mode);
            let mut pending = status;
            while pending != 0 {
                let bit = pending.trailing_zeros();
                pending &= !(1 << bit);

                let Some(number) = channel::Number::from_repr(bit as u8) else {
                    continue;
                };
                let channel = ChannelId::new(mode, number);

                // Channels never used through the fade API have no state.
                let Some(state) = self.fade.get(channel) else {
                    continue;
                };

                yield_requested |= self.step_fade(channel, &state);
            }

            if status != 0 {
                self.hw.clear_fade_end_intr_status(mode, status);
            }
        }

        yield_requested
    }

    fn step_fade(&self, channel: ChannelId, state: &FadeState<S>) -> bool {
        let params = state.params();
        if !params.running {
            return false;
        }

        let duty = self.hw.duty(channel);
        match next_segment(
            duty,
            params.target,
            params.direction,
            params.scale,
            params.cycle_count,
        ) {
            Progress::Continue { start_duty, param } => {
                critical_section::with(|_| {
                    self.hw.set_duty_int_part(channel, start_duty);
                    self.hw.set_fade_param(channel, param);
                    self.hw.set_duty_start(channel, true);
                    self.hw.channel_update(channel);
                });

                false
            }
            Progress::Converged => {
                trace!("{:?} ({:?}) reached duty {}", channel, params.mode, duty);

                state.set_params(FadeParams {
                    running: false,
                    ..params
                });
                let woken = state.release_from_isr();
                let callback_yield = state
                    .callback()
                    .is_some_and(|callback| callback(FadeEndEvent { channel, duty }));

                woken | callback_yield
            }
        }
    }
}
