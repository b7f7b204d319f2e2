use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;

/// Source of the random delays used for collision avoidance and report
/// spreading. Injected so tests can pin the values.
pub trait JitterSource: Send {
    /// A duration in `[lo, hi]`. Returns `lo` when the range is empty.
    fn draw(&mut self, lo: Duration, hi: Duration) -> Duration;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn draw(&mut self, lo: Duration, hi: Duration) -> Duration {
        if hi <= lo {
            return lo;
        }
        rand::thread_rng().gen_range(lo..=hi)
    }
}

/// Always the same offset, clamped into the requested range.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub Duration);

impl JitterSource for FixedJitter {
    fn draw(&mut self, lo: Duration, hi: Duration) -> Duration {
        self.0.clamp(lo, hi.max(lo))
    }
}

/// Replays a script of offsets (clamped into range); falls back to `lo`
/// once the script runs out.
#[derive(Debug, Clone, Default)]
pub struct ScriptedJitter {
    script: VecDeque<Duration>,
}

impl ScriptedJitter {
    pub fn new(script: impl IntoIterator<Item = Duration>) -> Self {
        Self { script: script.into_iter().collect() }
    }
}

impl JitterSource for ScriptedJitter {
    fn draw(&mut self, lo: Duration, hi: Duration) -> Duration {
        match self.script.pop_front() {
            Some(d) => d.clamp(lo, hi.max(lo)),
            None => lo,
        }
    }
}
