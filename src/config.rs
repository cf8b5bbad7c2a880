use std::time::Duration;

use crate::framer::LINE_CAPACITY;

pub const DEFAULT_SPEED: u32 = 19200;
/// 0 is safest, but some broken firmware can't cope with strict lockstep.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 0;

/// Config holds everything that is fixed for the lifetime of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Serial line speed in baud.
    pub speed: u32,
    /// Maximum number of commands sent without receipt confirmation.
    pub max_in_flight: usize,
    /// Strip whitespace and ';' comments before sending.
    pub compress: bool,
    /// Echo serial traffic.
    pub verbose: bool,
    /// No output unless an error occurs.
    pub quiet: bool,
    /// The command source is a terminal (a human is typing commands).
    pub interactive: bool,
    pub line_capacity: usize,
    /// Give up if an outstanding command isn't confirmed within this duration.
    /// None waits forever.
    pub ack_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            speed: DEFAULT_SPEED,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            compress: false,
            verbose: false,
            quiet: false,
            interactive: false,
            line_capacity: LINE_CAPACITY,
            ack_timeout: None,
        }
    }
}

impl Config {
    /// Device replies are shown whenever someone might be watching them, i.e.
    /// in verbose mode or when typing commands by hand. Quiet wins over both.
    pub fn echo_replies(&self) -> bool {
        !self.quiet && (self.verbose || self.interactive)
    }

    /// Transmitted lines are only echoed for non-interactive input: the
    /// terminal already shows what was typed.
    pub fn echo_commands(&self) -> bool {
        !self.quiet && self.verbose && !self.interactive
    }
}
