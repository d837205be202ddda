//! Protection against debuggees that print faster than the editor can take it.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FloodLimits {
    /// Bytes allowed without a newline
    pub max_line_bytes: usize,
    /// Lines allowed since the process last stopped
    pub max_lines: usize,
    /// Interrupts sent before the next trigger kills the process instead
    pub max_interrupts: usize,
    /// Bytes pulled from stdout or stderr per read
    pub read_chunk: usize,
}

impl Default for FloodLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: 8192,
            max_lines: 2048,
            max_interrupts: 8,
            read_chunk: 256,
        }
    }
}

/// What to do with the process after a chunk of output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodAction {
    PassThrough,
    /// Over the limit, but the process is already stopped
    Halt,
    /// Send the process an interrupt
    Interrupt,
    /// The process ignored its interrupts
    Kill,
}

pub(crate) const INTERRUPT_MESSAGE: &str = "✗Output limits exceeded! Sent SIGSTOP!\n";
pub(crate) const KILL_MESSAGE: &str = "✗SIGSTOP limit exceeded! Sent SIGKILL!\n";

#[derive(Debug)]
pub struct FloodGovernor {
    limits: FloodLimits,
    line_bytes: usize,
    lines: usize,
    interrupts: usize,
}

impl FloodGovernor {
    pub fn new(limits: FloodLimits) -> Self {
        Self {
            limits,
            line_bytes: 0,
            lines: 0,
            interrupts: 0,
        }
    }

    pub fn limits(&self) -> &FloodLimits {
        &self.limits
    }

    /// Account for a chunk of output.
    ///
    /// `line_bytes` is the length of the chunk's trailing partial line and `new_lines` the
    /// number of newlines it contained. `stopped` is whether the process is already stopped.
    pub fn record(&mut self, line_bytes: usize, new_lines: usize, stopped: bool) -> FloodAction {
        if new_lines > 0 {
            self.line_bytes = line_bytes;
        } else {
            self.line_bytes += line_bytes;
        }
        self.lines += new_lines;

        if self.line_bytes <= self.limits.max_line_bytes && self.lines <= self.limits.max_lines {
            return FloodAction::PassThrough;
        }
        if stopped {
            return FloodAction::Halt;
        }
        if self.interrupts >= self.limits.max_interrupts {
            tracing::warn!(interrupts = self.interrupts, "process ignores interrupts");
            FloodAction::Kill
        } else {
            self.interrupts += 1;
            tracing::debug!(
                line_bytes = self.line_bytes,
                lines = self.lines,
                "output limits exceeded"
            );
            FloodAction::Interrupt
        }
    }

    /// The process stopped: output counters start again, escalation history is kept
    pub fn process_stopped(&mut self) {
        self.line_bytes = 0;
        self.lines = 0;
    }

    /// A new process replaced the old one
    pub fn reset(&mut self) {
        self.process_stopped();
        self.interrupts = 0;
    }

    /// Interrupts sent to the current process
    pub fn interrupts(&self) -> usize {
        self.interrupts
    }
}

/// Bytes after the last newline of a chunk
pub(crate) fn trailing_line_len(chunk: &str) -> usize {
    chunk.rsplit_once('\n').map_or(chunk, |(_, tail)| tail).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> FloodLimits {
        FloodLimits {
            max_line_bytes: 10,
            max_lines: 3,
            max_interrupts: 2,
            read_chunk: 4,
        }
    }

    #[test]
    fn pass_through_under_limits() {
        let mut governor = FloodGovernor::new(limits());
        assert_eq!(governor.record(5, 1, false), FloodAction::PassThrough);
        assert_eq!(governor.record(5, 0, false), FloodAction::PassThrough);
        assert_eq!(governor.record(0, 2, false), FloodAction::PassThrough);
    }

    #[test]
    fn escalates_to_kill() {
        let mut governor = FloodGovernor::new(limits());
        assert_eq!(governor.record(0, 4, false), FloodAction::Interrupt);
        assert_eq!(governor.record(0, 1, false), FloodAction::Interrupt);
        assert_eq!(governor.record(0, 1, false), FloodAction::Kill);
        assert_eq!(governor.interrupts(), 2);
        // the kill does not count as an interrupt
        assert_eq!(governor.record(0, 1, false), FloodAction::Kill);
        assert_eq!(governor.interrupts(), 2);
    }

    #[test]
    fn default_limits_interrupt_eight_times_before_killing() {
        let mut governor = FloodGovernor::new(FloodLimits::default());
        let lines = governor.limits().max_lines + 1;
        assert_eq!(governor.record(0, lines, false), FloodAction::Interrupt);
        for _ in 1..8 {
            assert_eq!(governor.record(0, 1, false), FloodAction::Interrupt);
        }
        assert_eq!(governor.interrupts(), 8);
        assert_eq!(governor.record(0, 1, false), FloodAction::Kill);
    }

    #[test]
    fn long_line_triggers() {
        let mut governor = FloodGovernor::new(limits());
        assert_eq!(governor.record(6, 0, false), FloodAction::PassThrough);
        assert_eq!(governor.record(6, 0, false), FloodAction::Interrupt);
        // stopping clears the counters
        governor.process_stopped();
        assert_eq!(governor.record(2, 1, false), FloodAction::PassThrough);
    }

    #[test]
    fn stopped_process_is_left_alone() {
        let mut governor = FloodGovernor::new(limits());
        assert_eq!(governor.record(0, 10, true), FloodAction::Halt);
        assert_eq!(governor.interrupts(), 0);
    }

    #[test]
    fn stop_keeps_interrupt_count_reset_clears_it() {
        let mut governor = FloodGovernor::new(limits());
        governor.record(0, 4, false);
        governor.process_stopped();
        assert_eq!(governor.interrupts(), 1);
        assert_eq!(governor.record(0, 1, false), FloodAction::PassThrough);

        governor.reset();
        assert_eq!(governor.interrupts(), 0);
    }

    #[test]
    fn trailing_line() {
        assert_eq!(trailing_line_len("abc"), 3);
        assert_eq!(trailing_line_len("a\nbc"), 2);
        assert_eq!(trailing_line_len("a\n\n"), 0);
    }
}
