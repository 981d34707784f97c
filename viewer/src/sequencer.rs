//! Time-offset presentation triggers for adopted broadcasts.
//!
//! Offsets are read on the broadcast's simulation clock: a snapshot with
//! clock `t` reveals its scores (and game-over banner) at `t`, and plays the
//! shot animation a short while later. The sequencer anchors offset zero at
//! the presentation time the broadcast was adopted, so every trigger fires at
//! `adopted_at + offset`.

use crate::rendering::RenderAdapter;
use shared::{Scores, ShotInfo};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Delay after the scores before the shot animation starts.
pub const SHOT_ANIMATION_DELAY: f64 = 1.5;
/// How long the game-over banner stays up.
pub const GAME_OVER_DISPLAY: f64 = 2.5;

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    UpdateScores(Scores),
    ShowGameOver { winner: Option<String> },
    HideGameOver,
    PlayShotAnimation,
}

impl Trigger {
    pub fn apply<R: RenderAdapter + ?Sized>(&self, render: &mut R) {
        match self {
            Trigger::UpdateScores(scores) => render.show_scores(scores),
            Trigger::ShowGameOver { winner } => render.show_game_over(winner.as_deref()),
            Trigger::HideGameOver => render.hide_game_over(),
            Trigger::PlayShotAnimation => render.play_shot_animation(),
        }
    }
}

/// What to do with triggers of a broadcast that has been superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaleTriggers {
    /// Leave them scheduled; they fire independently of newer broadcasts.
    #[default]
    Keep,
    /// Drop them, except pending banner hides so no banner is left up.
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTrigger {
    /// Offset on the broadcast's simulation clock.
    pub offset: f64,
    /// Presentation time at which the trigger fires.
    pub fire_at: f64,
    /// Which adopted broadcast this belongs to, counting from 1.
    pub broadcast: u64,
    sequence: u64,
    pub trigger: Trigger,
}

impl Eq for ScheduledTrigger {}

impl Ord for ScheduledTrigger {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at
            .total_cmp(&other.fire_at)
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for ScheduledTrigger {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct PresentationSequencer {
    queue: BinaryHeap<Reverse<ScheduledTrigger>>,
    policy: StaleTriggers,
    next_sequence: u64,
    broadcasts: u64,
}

impl PresentationSequencer {
    pub fn new(policy: StaleTriggers) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> StaleTriggers {
        self.policy
    }

    /// Registers the triggers for a freshly adopted broadcast.
    pub fn schedule(&mut self, clock: f64, shot_info: &ShotInfo, scores: Scores, now: f64) {
        self.broadcasts += 1;

        if self.policy == StaleTriggers::Cancel {
            self.queue
                .retain(|Reverse(entry)| entry.trigger == Trigger::HideGameOver);
        }

        self.register(clock, now, Trigger::UpdateScores(scores));
        if shot_info.game_over {
            self.register(
                clock,
                now,
                Trigger::ShowGameOver {
                    winner: shot_info.winner.clone(),
                },
            );
            self.register(clock + GAME_OVER_DISPLAY, now, Trigger::HideGameOver);
        }
        self.register(clock + SHOT_ANIMATION_DELAY, now, Trigger::PlayShotAnimation);
    }

    fn register(&mut self, offset: f64, now: f64, trigger: Trigger) {
        let entry = ScheduledTrigger {
            offset,
            fire_at: now + offset,
            broadcast: self.broadcasts,
            sequence: self.next_sequence,
            trigger,
        };
        self.next_sequence += 1;
        self.queue.push(Reverse(entry));
    }

    /// Removes and returns every trigger due at `now`, earliest first.
    pub fn due(&mut self, now: f64) -> Vec<Trigger> {
        let mut fired = Vec::new();
        while let Some(Reverse(next)) = self.queue.peek() {
            if next.fire_at > now {
                break;
            }
            if let Some(Reverse(entry)) = self.queue.pop() {
                fired.push(entry.trigger);
            }
        }
        fired
    }

    /// Pending triggers in registration order.
    pub fn pending(&self) -> Vec<&ScheduledTrigger> {
        let mut pending: Vec<&ScheduledTrigger> =
            self.queue.iter().map(|Reverse(entry)| entry).collect();
        pending.sort_by_key(|entry| entry.sequence);
        pending
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
