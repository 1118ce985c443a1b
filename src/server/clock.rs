// ABOUTME: Wall-clock source and playback position reconciliation
// ABOUTME: Position is computed on read from the last write, never ticked by a timer

use crate::server::state::PlaybackState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in unix seconds
pub trait Clock: Send + Sync {
    /// Current time in unix seconds
    fn now(&self) -> f64;
}

/// Clock backed by the system time
///
/// Wall-clock rather than monotonic: the stored `lastUpdateTimestamp` must stay
/// meaningful to every process sharing the store.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Manually driven clock for simulations and tests
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current time as `f64` bits
    bits: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `now`
    pub fn new(now: f64) -> Self {
        Self {
            bits: AtomicU64::new(now.to_bits()),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, now: f64) {
        self.bits.store(now.to_bits(), Ordering::SeqCst);
    }

    /// Move forward by `secs`
    pub fn advance(&self, secs: f64) {
        let _ = self
            .bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                Some((f64::from_bits(bits) + secs).to_bits())
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Authoritative playback position of `state` at `now`
///
/// Paused state reports `base_time`. Playing state adds the time elapsed since the
/// last write; a `now` earlier than the write (clock skew) adds nothing.
pub fn reconcile(state: &PlaybackState, now: f64) -> f64 {
    let base = state.base_time.max(0.0);
    if !state.is_playing {
        return base;
    }
    let elapsed = now - state.last_update_at;
    if elapsed.is_finite() && elapsed > 0.0 {
        base + elapsed
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing(base_time: f64, last_update_at: f64) -> PlaybackState {
        PlaybackState {
            is_playing: true,
            base_time,
            last_update_at,
            ..Default::default()
        }
    }

    #[test]
    fn test_paused_reports_base_time() {
        let state = PlaybackState {
            base_time: 7.25,
            last_update_at: 100.0,
            ..Default::default()
        };
        assert_eq!(reconcile(&state, 100.0), 7.25);
        assert_eq!(reconcile(&state, 500.0), 7.25);
    }

    #[test]
    fn test_playing_adds_elapsed() {
        let state = playing(12.5, 1_000.0);
        assert!((reconcile(&state, 1_003.0) - 15.5).abs() < 1e-9);
    }

    #[test]
    fn test_clock_skew_clamps_to_base() {
        let state = playing(12.5, 1_000.0);
        assert_eq!(reconcile(&state, 990.0), 12.5);
    }

    #[test]
    fn test_never_negative() {
        let state = PlaybackState {
            base_time: -3.0,
            ..Default::default()
        };
        assert_eq!(reconcile(&state, 0.0), 0.0);
    }

    #[test]
    fn test_monotonic_while_playing() {
        let state = playing(4.0, 50.0);
        let mut last = reconcile(&state, 40.0);
        for step in 0..100 {
            let now = 40.0 + step as f64 * 0.37;
            let position = reconcile(&state, now);
            assert!(position >= last, "position went backwards at {}", now);
            last = position;
        }
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(10.0);
        clock.advance(2.5);
        assert_eq!(clock.now(), 12.5);
        clock.set(1.0);
        assert_eq!(clock.now(), 1.0);
    }

    #[test]
    fn test_system_clock_is_unix_time() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now() > 1_577_836_800.0);
    }
}
