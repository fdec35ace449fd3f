//! Step transitions and the countdown timer.

use serde::Serialize;

use crate::core::types::Outcome;
use crate::lab::{END, STAY, Step, Timer, TimerMode};

/// Where a step's outcome leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Stay,
    End,
    Goto(String),
}

impl Transition {
    fn parse(target: &str) -> Self {
        match target {
            END => Self::End,
            STAY => Self::Stay,
            id => Self::Goto(id.to_string()),
        }
    }
}

/// `next(step, outcome)`: failure defaults to `#stay`, success to `#end`.
pub fn next(step: &Step, outcome: Outcome) -> Transition {
    let target = match outcome {
        Outcome::Success => step.transitions.on_success.as_deref().unwrap_or(END),
        Outcome::Failure => step.transitions.on_failure.as_deref().unwrap_or(STAY),
    };
    Transition::parse(target)
}

/// Presentational countdown. Expiry is advisory; the host decides what it blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub total: u64,
    pub remaining: u64,
}

impl Countdown {
    pub fn from_timer(timer: &Timer) -> Option<Self> {
        match timer.mode {
            TimerMode::Countdown => Some(Self {
                total: timer.seconds,
                remaining: timer.seconds,
            }),
            TimerMode::None => None,
        }
    }

    /// Advance by `seconds`; returns true only on the tick that expires it.
    pub fn tick(&mut self, seconds: u64) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(seconds);
        self.remaining == 0
    }

    pub fn is_expired(&self) -> bool {
        self.remaining == 0
    }

    pub fn reset(&mut self) {
        self.remaining = self.total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(transitions: serde_json::Value) -> Step {
        serde_json::from_value(json!({
            "id": "s",
            "type": "quiz",
            "choices": [],
            "correct": [],
            "transitions": transitions
        }))
        .expect("step")
    }

    #[test]
    fn defaults_are_end_on_success_and_stay_on_failure() {
        let s = step(json!({}));
        assert_eq!(next(&s, Outcome::Success), Transition::End);
        assert_eq!(next(&s, Outcome::Failure), Transition::Stay);
    }

    #[test]
    fn declared_targets_are_followed() {
        let s = step(json!({"on_success": "b", "on_failure": "remedial"}));
        assert_eq!(next(&s, Outcome::Success), Transition::Goto("b".to_string()));
        assert_eq!(next(&s, Outcome::Failure), Transition::Goto("remedial".to_string()));
    }

    #[test]
    fn countdown_expires_once() {
        let mut countdown = Countdown::from_timer(&Timer {
            mode: TimerMode::Countdown,
            seconds: 3,
        })
        .expect("countdown");
        assert!(!countdown.tick(2));
        assert!(countdown.tick(5));
        assert!(!countdown.tick(1));
        assert!(countdown.is_expired());
        countdown.reset();
        assert_eq!(countdown.remaining, 3);
        assert!(Countdown::from_timer(&Timer::default()).is_none());
    }
}
