use std::fs::File;
use std::io::{self, IsTerminal, Read, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serialport::{SerialPortInfo, SerialPortType, TTYPort};

use crate::engine::{Channels, Readiness};
use crate::error::{Error, Result};

/// How long poll() may block before the engine gets a chance to check for
/// cancellation. This is not a protocol timeout.
pub const POLL_TICK: Duration = Duration::from_millis(100);

/// Writes only block if the device stops draining its receive buffer, which
/// a working device never does for this long.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn open_device(path: &str, speed: u32) -> Result<TTYPort> {
    // Note: baud_rate() is set explicitly because some serialport versions
    // ignore the rate passed to new().
    let port = serialport::new(path, speed)
        .baud_rate(speed)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(WRITE_TIMEOUT)
        .open_native()
        .map_err(|source| Error::OpenDevice {
            path: path.to_string(),
            source,
        })?;
    info!("opened serial device {path} at {speed} baud");
    Ok(port)
}

/// Find the most likely device to talk to. USB serial adapters win (that's
/// what practically every hobbyist machine controller shows up as), otherwise
/// we go by name.
pub fn guess_device() -> Result<String> {
    let ports = serialport::available_ports().map_err(Error::Enumerate)?;
    debug!("found {} serial ports", ports.len());
    choose_device(&ports).ok_or(Error::NoDeviceFound)
}

const USB_NAME_HINTS: [&str; 4] = ["ttyUSB", "ttyACM", "usbserial", "usbmodem"];

fn choose_device(ports: &[SerialPortInfo]) -> Option<String> {
    ports
        .iter()
        .filter(|port| matches!(port.port_type, SerialPortType::UsbPort(_)))
        .last()
        .or_else(|| {
            ports
                .iter()
                .filter(|port| USB_NAME_HINTS.iter().any(|hint| port.port_name.contains(hint)))
                .last()
        })
        .map(|port| port.port_name.clone())
}

/// InputSource is the command source: either a file, or standard input.
///
/// Stdin is accessed through a duplicate of its descriptor rather than
/// io::Stdin, which buffers internally: bytes sitting in that buffer would be
/// invisible to poll() and we'd stall with input available.
#[derive(Debug)]
pub struct InputSource {
    file: File,
    name: PathBuf,
    interactive: bool,
}

impl InputSource {
    /// "-" means standard input.
    pub fn open(path: &Path) -> Result<InputSource> {
        let open_error = |source| Error::OpenInput {
            path: path.to_path_buf(),
            source,
        };
        if path == Path::new("-") {
            let stdin = io::stdin();
            let interactive = stdin.is_terminal();
            let fd = stdin.as_fd().try_clone_to_owned().map_err(open_error)?;
            return Ok(InputSource {
                file: File::from(fd),
                name: path.to_path_buf(),
                interactive,
            });
        }
        let file = File::open(path).map_err(open_error)?;
        Ok(InputSource {
            file,
            name: path.to_path_buf(),
            interactive: false,
        })
    }

    /// Wrap an already open descriptor (e.g. one end of a pipe).
    pub fn from_fd(fd: impl Into<OwnedFd>, name: impl Into<PathBuf>) -> InputSource {
        InputSource {
            file: File::from(fd.into()),
            name: name.into(),
            interactive: false,
        }
    }

    pub fn name(&self) -> &Path {
        &self.name
    }

    pub fn is_stdin(&self) -> bool {
        self.name == Path::new("-")
    }

    /// Whether a human is (probably) typing the commands.
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }
}

/// PollChannels waits on the device and the command source with poll(2).
/// It owns both, so they are closed exactly once, whichever way the run ends.
pub struct PollChannels<P = TTYPort> {
    device: P,
    input: InputSource,
}

impl<P: Read + Write + AsRawFd> PollChannels<P> {
    pub fn new(device: P, input: InputSource) -> PollChannels<P> {
        PollChannels { device, input }
    }
}

impl<P: Read + Write + AsRawFd> Channels for PollChannels<P> {
    fn wait(&mut self, want_commands: bool) -> io::Result<Readiness> {
        let mut fds = [
            libc::pollfd {
                fd: self.device.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: self.input.file.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        let nfds: libc::nfds_t = if want_commands { 2 } else { 1 };
        // SAFETY: fds is a valid array of at least nfds pollfds, and both
        // descriptors stay open for the duration of the call.
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), nfds, POLL_TICK.as_millis() as libc::c_int) };
        if ret < 0 {
            let error = io::Error::last_os_error();
            // Most likely SIGINT: let the caller check whether we're cancelled.
            if error.kind() == io::ErrorKind::Interrupted {
                return Ok(Readiness::default());
            }
            return Err(error);
        }

        for fd in &fds[..nfds as usize] {
            if fd.revents & libc::POLLNVAL != 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("descriptor {} is not open", fd.fd),
                ));
            }
        }
        // Hangups and errors count as readable: the subsequent read reports
        // what actually happened (POLLHUP is also how some stdin EOFs show up).
        let readable = libc::POLLIN | libc::POLLHUP | libc::POLLERR;
        Ok(Readiness {
            reply: fds[0].revents & readable != 0,
            command: want_commands && fds[1].revents & readable != 0,
        })
    }

    fn read_reply(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.device.read(buf)
    }

    fn read_command_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.input.file.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    fn write_device(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.device.write_all(bytes)?;
        self.device.flush()
    }
}
