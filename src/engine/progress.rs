//! Played-time accounting for the currently loaded track.
//!
//! Backend progress ticks are noisy: granularity jitters, positions
//! occasionally run backwards after a glitch, and remote renderers
//! report unreliable positions right after a seek. This module keeps a
//! locally tracked position, accumulates forward motion only, and
//! decides exactly once per track when it counts as "played".
//!
//! Two record rules share the decision. A track whose duration leaves
//! no room for the configured threshold is judged by the near-end rule
//! (reach the final window with everything up to there actually
//! listened); anything longer is judged by accumulated played time
//! alone. Short tracks are not penalized, long ones still require
//! substantial listening.

use crate::config::PlaybackConfig;

/// Thresholds governing when a track counts as played.
#[derive(Debug, Clone, Copy)]
pub struct PlayThresholds {
    /// Minimum accumulated playback time (ms)
    pub played_threshold_ms: u64,
    /// Window before track end that counts as reaching the end (ms)
    pub near_end_window_ms: u64,
    /// Ticks moving less than this are noise (ms)
    pub jitter_ms: u64,
}

impl From<&PlaybackConfig> for PlayThresholds {
    fn from(cfg: &PlaybackConfig) -> Self {
        Self {
            played_threshold_ms: cfg.played_threshold_ms,
            near_end_window_ms: cfg.near_end_window_ms,
            jitter_ms: cfg.jitter_threshold_ms,
        }
    }
}

/// Progress accounting scoped to the currently loaded track.
///
/// Fully reset whenever track identity changes; logically retired once
/// `recorded` is true.
#[derive(Debug, Clone, Default)]
pub struct PlaybackProgress {
    position_ms: u64,
    played_ms: u64,
    duration_ms: Option<u64>,
    recorded: bool,
}

impl PlaybackProgress {
    /// Reset all accounting for a new track identity.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn position_ms(&self) -> u64 {
        self.position_ms
    }

    pub fn played_ms(&self) -> u64 {
        self.played_ms
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    pub fn recorded(&self) -> bool {
        self.recorded
    }

    pub fn set_duration(&mut self, duration_ms: u64) {
        if duration_ms > 0 {
            self.duration_ms = Some(duration_ms);
        }
    }

    /// Move the tracked position without crediting played time.
    ///
    /// Used after seek/jump: backend position queries are unreliable
    /// immediately after a seek, so the engine trusts its own target.
    pub fn force_position(&mut self, position_ms: u64) {
        self.position_ms = match self.duration_ms {
            Some(d) => position_ms.min(d),
            None => position_ms,
        };
    }

    /// Account one backend progress tick.
    ///
    /// Returns true exactly once per track, at the tick where the track
    /// first qualifies as played.
    pub fn on_tick(&mut self, new_pos_ms: u64, thresholds: &PlayThresholds) -> bool {
        // Sub-jitter movement is tick-granularity noise.
        if new_pos_ms.abs_diff(self.position_ms) < thresholds.jitter_ms {
            return false;
        }

        if new_pos_ms >= self.position_ms {
            self.played_ms += new_pos_ms - self.position_ms;
        }
        // A backwards jump is a backend glitch: clamp, never subtract.
        self.position_ms = new_pos_ms;

        if self.recorded {
            return false;
        }
        let Some(duration) = self.duration_ms else {
            return false;
        };
        if duration == 0 {
            return false;
        }

        let fired = if duration.saturating_sub(thresholds.near_end_window_ms)
            <= thresholds.played_threshold_ms
        {
            // Near-end rule: the threshold exceeds what this track can
            // offer; require reaching the final window having actually
            // listened up to it.
            self.position_ms + thresholds.near_end_window_ms >= duration
                && self.played_ms >= self.position_ms
        } else {
            self.played_ms >= thresholds.played_threshold_ms
        };

        if fired {
            self.recorded = true;
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> PlayThresholds {
        PlayThresholds {
            played_threshold_ms: 100_000,
            near_end_window_ms: 5_000,
            jitter_ms: 250,
        }
    }

    #[test]
    fn test_normal_rule_fires_once_at_threshold() {
        let mut progress = PlaybackProgress::default();
        progress.set_duration(200_000);
        let t = thresholds();

        assert!(!progress.on_tick(0, &t)); // sub-jitter from 0
        assert!(!progress.on_tick(40_000, &t));
        assert!(!progress.on_tick(90_000, &t));
        assert_eq!(progress.played_ms(), 90_000);

        assert!(progress.on_tick(140_000, &t)); // played reaches 140_000
        assert!(progress.recorded());

        // Never fires twice.
        assert!(!progress.on_tick(180_000, &t));
    }

    #[test]
    fn test_near_end_rule_short_track() {
        // Threshold exceeds duration entirely: near-end rule applies.
        let mut progress = PlaybackProgress::default();
        progress.set_duration(8_000);
        let t = thresholds();

        assert!(progress.on_tick(7_200, &t));
        assert!(progress.recorded());
    }

    #[test]
    fn test_near_end_requires_listening_up_to_position() {
        // Seeking straight to the end must not count as played.
        let mut progress = PlaybackProgress::default();
        progress.set_duration(8_000);
        let t = thresholds();

        progress.force_position(7_000); // seek, no played credit
        assert!(!progress.on_tick(7_600, &t)); // played 600 < position
    }

    #[test]
    fn test_jitter_ticks_ignored() {
        let mut progress = PlaybackProgress::default();
        progress.set_duration(200_000);
        let t = thresholds();

        progress.on_tick(1_000, &t);
        assert!(!progress.on_tick(1_100, &t)); // below 250ms jitter
        assert_eq!(progress.position_ms(), 1_000);
        assert_eq!(progress.played_ms(), 1_000);
    }

    #[test]
    fn test_backwards_glitch_clamps_without_subtracting() {
        let mut progress = PlaybackProgress::default();
        progress.set_duration(200_000);
        let t = thresholds();

        progress.on_tick(50_000, &t);
        assert!(!progress.on_tick(10_000, &t));
        assert_eq!(progress.position_ms(), 10_000);
        assert_eq!(progress.played_ms(), 50_000); // no subtraction

        // Forward motion resumes from the clamped position.
        progress.on_tick(60_000, &t);
        assert_eq!(progress.played_ms(), 100_000);
    }

    #[test]
    fn test_no_record_without_duration() {
        let mut progress = PlaybackProgress::default();
        let t = thresholds();
        assert!(!progress.on_tick(150_000, &t));

        // Duration arriving later enables the decision on the next tick.
        progress.set_duration(200_000);
        assert!(progress.on_tick(151_000, &t));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut progress = PlaybackProgress::default();
        progress.set_duration(8_000);
        progress.on_tick(7_500, &thresholds());
        assert!(progress.recorded());

        progress.reset();
        assert!(!progress.recorded());
        assert_eq!(progress.played_ms(), 0);
        assert_eq!(progress.duration_ms(), None);
    }

    #[test]
    fn test_force_position_clamps_to_duration() {
        let mut progress = PlaybackProgress::default();
        progress.set_duration(10_000);
        progress.force_position(50_000);
        assert_eq!(progress.position_ms(), 10_000);
    }
}
