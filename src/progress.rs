//! Progress reporting (spec.md §8): the library core never writes to a
//! terminal directly. Callers that want one supply a [`ProgressSink`]; the
//! Run Controller calls it, not `stdout`, at each tick.

/// Receives placement-progress notifications from the Run Controller.
pub trait ProgressSink {
    /// Called once, before the first profile is processed, with the total
    /// number of profiles about to be placed.
    fn start(&mut self, _total: usize) {}

    /// Called after each profile finishes placement (named or skipped).
    fn tick(&mut self) {}

    /// Called once after the last profile has been processed.
    fn finish(&mut self) {}
}

/// Discards every notification. The default for non-interactive callers
/// (library consumers, tests).
pub struct NullProgress;

impl ProgressSink for NullProgress {}

/// Prints a dot to stdout every `total / 20` profiles, the original CLI's
/// twenty-tick progress bar.
pub struct DotBarProgress {
    total: usize,
    seen: usize,
    next_tick_at: usize,
    tick_size: usize,
}

impl Default for DotBarProgress {
    fn default() -> Self {
        DotBarProgress { total: 0, seen: 0, next_tick_at: 0, tick_size: 0 }
    }
}

impl ProgressSink for DotBarProgress {
    fn start(&mut self, total: usize) {
        self.total = total;
        self.seen = 0;
        self.tick_size = (total / 20).max(1);
        self.next_tick_at = self.tick_size;
        println!("Placing {total} profile(s)...");
    }

    fn tick(&mut self) {
        self.seen += 1;
        if self.seen >= self.next_tick_at {
            print!(".");
            use std::io::Write;
            let _ = std::io::stdout().flush();
            self.next_tick_at += self.tick_size;
        }
    }

    fn finish(&mut self) {
        println!();
    }
}
