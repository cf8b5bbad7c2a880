use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("command exceeds the maximum line length of {capacity} bytes")]
    LineTooLong { capacity: usize },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("error opening serial device {path}: {source}")]
    OpenDevice {
        path: String,
        source: serialport::Error,
    },
    #[error("unable to open gcode file \"{}\": {source}", path.display())]
    OpenInput { path: PathBuf, source: io::Error },
    #[error("unable to enumerate serial devices: {0}")]
    Enumerate(serialport::Error),
    #[error("unable to autodetect any USB serial devices; if you are certain the device is available, please manually specify the path")]
    NoDeviceFound,
    #[error("error during poll: {0}")]
    Wait(io::Error),
    #[error("error reading from serial device: {0}")]
    ReadDevice(io::Error),
    #[error("error writing to serial device: {0}")]
    WriteDevice(io::Error),
    #[error("error reading gcode: {0}")]
    ReadInput(io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("caught a fatal signal")]
    Cancelled,
    #[error("no confirmation received within {0:?}")]
    AckTimeout(Duration),
}

pub type Result<T> = std::result::Result<T, Error>;
