use std::io::{self, Write};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::flow::FlowController;
use crate::framer::CommandFramer;
use crate::scanner::{ReplyScanner, Token};

/// Maximum number of reply bytes processed per wakeup.
pub const SERIAL_BUFSIZE: usize = 128;
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Which sources are readable after a call to `Channels::wait`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    pub reply: bool,
    pub command: bool,
}

/// Channels is everything the engine needs from the outside world: the
/// device's reply stream, the command source, and a way to wait on both at
/// once.
pub trait Channels {
    /// Block until the device has sent something, or (if `want_commands` is
    /// set) the command source is readable. Implementations may return early
    /// with nothing ready, e.g. so that cancellation gets noticed.
    fn wait(&mut self, want_commands: bool) -> io::Result<Readiness>;

    fn read_reply(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Returns None once the command source is exhausted.
    fn read_command_byte(&mut self) -> io::Result<Option<u8>>;

    fn write_device(&mut self, bytes: &[u8]) -> io::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// Reading commands (flow control permitting) and replies.
    Streaming,
    /// Input is exhausted, waiting for the remaining confirmations.
    Draining,
    Done,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub lines_sent: usize,
    pub confirmations: usize,
    pub retransmissions: usize,
    /// Confirmations received while nothing was outstanding.
    pub spurious_confirmations: usize,
    /// Device resets observed while nothing was outstanding.
    pub ignored_resets: usize,
}

/// Engine streams commands to the device, pacing them according to the
/// device's confirmations, and replays the last command if the device reboots
/// before confirming it.
///
/// Everything happens on the calling thread: each `step` waits once on the
/// channels and processes whatever became ready. Failure is terminal, once
/// `step` returned an error the engine must not be stepped again.
pub struct Engine<C: Channels> {
    channels: C,
    scanner: ReplyScanner,
    flow: FlowController,
    framer: CommandFramer,
    // The last transmitted line (without terminator), kept for replay.
    pending: Vec<u8>,
    state: EngineState,
    cancel: CancellationToken,
    monitor: Option<Box<dyn Write>>,
    echo_replies: bool,
    echo_commands: bool,
    ack_timeout: Option<Duration>,
    last_progress: Instant,
    summary: Summary,
}

impl<C: Channels> Engine<C> {
    pub fn new(channels: C, config: &Config, cancel: CancellationToken) -> Engine<C> {
        Engine {
            channels,
            scanner: ReplyScanner::new(),
            flow: FlowController::new(config.max_in_flight),
            framer: CommandFramer::new(config.line_capacity, config.compress),
            pending: Vec::with_capacity(config.line_capacity),
            state: EngineState::Streaming,
            cancel,
            monitor: None,
            echo_replies: config.echo_replies(),
            echo_commands: config.echo_commands(),
            ack_timeout: config.ack_timeout,
            last_progress: Instant::now(),
            summary: Summary::default(),
        }
    }

    /// Serial traffic is echoed to `monitor` (subject to the verbosity
    /// settings in the Config).
    pub fn with_monitor(mut self, monitor: impl Write + 'static) -> Engine<C> {
        self.monitor = Some(Box::new(monitor));
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn in_flight(&self) -> usize {
        self.flow.in_flight()
    }

    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn into_channels(self) -> C {
        self.channels
    }

    /// Run until every command has been sent and confirmed.
    pub fn run(&mut self) -> Result<Summary> {
        loop {
            if self.step()? == EngineState::Done {
                info!(
                    "last message confirmed, {} lines sent",
                    self.summary.lines_sent
                );
                return Ok(self.summary.clone());
            }
        }
    }

    /// Wait once, and process whatever became ready.
    pub fn step(&mut self) -> Result<EngineState> {
        if self.state == EngineState::Draining && self.flow.in_flight() == 0 {
            self.state = EngineState::Done;
        }
        if self.state == EngineState::Done {
            return Ok(EngineState::Done);
        }

        let want_commands = self.state == EngineState::Streaming && self.flow.may_poll_commands();
        let ready = match self.channels.wait(want_commands) {
            Ok(ready) => ready,
            Err(e) => {
                self.check_cancelled()?;
                return Err(Error::Wait(e));
            }
        };
        self.check_cancelled()?;

        if ready.reply {
            self.receive()?;
        }
        // Confirmations processed above can only make polling more
        // permissive, so what we asked for when waiting still holds.
        if ready.command && want_commands {
            self.read_command()?;
        }

        self.check_ack_timeout()?;
        if self.state == EngineState::Draining && self.flow.in_flight() == 0 {
            self.state = EngineState::Done;
        }
        Ok(self.state)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn check_ack_timeout(&self) -> Result<()> {
        match self.ack_timeout {
            Some(timeout) if self.flow.in_flight() > 0 && self.last_progress.elapsed() >= timeout => {
                Err(Error::AckTimeout(timeout))
            }
            _ => Ok(()),
        }
    }

    fn receive(&mut self) -> Result<()> {
        let mut buf = [0u8; SERIAL_BUFSIZE];
        let len = match self.channels.read_reply(&mut buf) {
            Ok(0) => {
                // The device was readable but had nothing to give us: it's gone
                // (e.g. a USB adapter was unplugged).
                return Err(Error::ReadDevice(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "serial device disconnected",
                )));
            }
            Ok(len) => len,
            Err(e) => {
                self.check_cancelled()?;
                return Err(Error::ReadDevice(e));
            }
        };

        if self.echo_replies {
            self.echo(&buf[..len], false);
        }

        for &byte in &buf[..len] {
            match self.scanner.feed(byte) {
                Some(Token::Confirm) => self.on_confirm(),
                Some(Token::Reset) => self.on_reset()?,
                None => (),
            }
        }
        Ok(())
    }

    fn on_confirm(&mut self) {
        if !self.flow.on_confirmed() {
            debug!("ignoring confirmation, nothing was outstanding");
            self.summary.spurious_confirmations += 1;
            return;
        }
        debug!("message receipt confirmed");
        self.summary.confirmations += 1;
        self.last_progress = Instant::now();
        if self.flow.in_flight() == 0 {
            self.pending.clear();
        }
    }

    fn on_reset(&mut self) -> Result<()> {
        if self.flow.in_flight() == 0 {
            debug!("device started, nothing to resend");
            self.summary.ignored_resets += 1;
            return Ok(());
        }
        // The device wasn't listening while it rebooted, so the last block
        // never arrived. This is a replay, not a new command: in_flight stays
        // the same.
        warn!(
            "device was reset, resending last block: {}",
            String::from_utf8_lossy(&self.pending)
        );
        write_line(&mut self.channels, &self.pending)?;
        self.summary.retransmissions += 1;
        self.last_progress = Instant::now();
        Ok(())
    }

    fn read_command(&mut self) -> Result<()> {
        let byte = match self.channels.read_command_byte() {
            Ok(byte) => byte,
            Err(e) => {
                self.check_cancelled()?;
                return Err(Error::ReadInput(e));
            }
        };
        match byte {
            Some(byte) => {
                if let Some(line) = self.framer.push(byte)? {
                    self.transmit(line)?;
                }
            }
            None => {
                debug!("got EOF, input complete");
                if let Some(line) = self.framer.finish() {
                    self.transmit(line)?;
                }
                self.state = EngineState::Draining;
            }
        }
        Ok(())
    }

    fn transmit(&mut self, line: Vec<u8>) -> Result<()> {
        write_line(&mut self.channels, &line)?;
        if self.flow.in_flight() == 0 {
            self.last_progress = Instant::now();
        }
        self.flow.on_transmitted();
        self.summary.lines_sent += 1;
        debug!(
            "sent complete block ({} in flight): {}",
            self.flow.in_flight(),
            String::from_utf8_lossy(&line)
        );
        if self.echo_commands {
            self.echo(&line, true);
        }
        self.pending = line;
        Ok(())
    }

    fn echo(&mut self, bytes: &[u8], newline: bool) {
        let Some(monitor) = self.monitor.as_mut() else {
            return;
        };
        let result = echo_to(monitor.as_mut(), bytes, newline);
        // Losing the echo (e.g. stdout was closed) is no reason to abandon the
        // device halfway through a job.
        if let Err(e) = result {
            warn!("failed to echo serial traffic: {e}");
        }
    }
}

fn echo_to(monitor: &mut dyn Write, bytes: &[u8], newline: bool) -> io::Result<()> {
    monitor.write_all(bytes)?;
    if newline {
        monitor.write_all(b"\n")?;
    }
    monitor.flush()
}

fn write_line<C: Channels>(channels: &mut C, line: &[u8]) -> Result<()> {
    channels.write_device(line).map_err(Error::WriteDevice)?;
    channels
        .write_device(LINE_TERMINATOR)
        .map_err(Error::WriteDevice)
}
