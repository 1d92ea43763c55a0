//! Trigger countdown.
//!
//! `TriggerCapture` with a delay counts down one tick at a time on the UI
//! side and fires the trigger request when it reaches zero. The poller is
//! not involved until then.

/// Result of advancing the countdown by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    /// Still counting; seconds left
    Remaining(u32),

    /// Reached zero; issue the trigger
    Fire { num_frames: u32 },
}

/// An active trigger countdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
    num_frames: u32,
}

impl Countdown {
    /// Starts a countdown of `delay_secs` ticks. Returns `None` for a zero
    /// delay, which triggers immediately instead.
    pub fn start(delay_secs: u32, num_frames: u32) -> Option<Self> {
        (delay_secs > 0).then_some(Self {
            remaining: delay_secs,
            num_frames,
        })
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn num_frames(&self) -> u32 {
        self.num_frames
    }

    /// Button label while counting.
    pub fn label(&self) -> String {
        format!("Triggering in {}s", self.remaining)
    }

    pub fn tick(&mut self) -> CountdownTick {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            CountdownTick::Fire {
                num_frames: self.num_frames,
            }
        } else {
            CountdownTick::Remaining(self.remaining)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_delay_has_no_countdown() {
        assert!(Countdown::start(0, 1).is_none());
    }

    #[test]
    fn test_counts_down_then_fires() {
        let mut countdown = Countdown::start(3, 2).unwrap();
        assert_eq!(countdown.label(), "Triggering in 3s");

        assert_eq!(countdown.tick(), CountdownTick::Remaining(2));
        assert_eq!(countdown.tick(), CountdownTick::Remaining(1));
        assert_eq!(countdown.tick(), CountdownTick::Fire { num_frames: 2 });
        assert_eq!(countdown.remaining(), 0);
    }
}
