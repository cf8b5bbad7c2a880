extern crate libc;
extern crate serialport;

pub mod cancel;
pub mod config;
#[cfg(unix)]
pub mod device;
pub mod engine;
pub mod error;
pub mod flow;
pub mod framer;
pub mod scanner;

pub use cancel::CancellationToken;
pub use config::Config;
#[cfg(unix)]
pub use device::{guess_device, open_device, InputSource, PollChannels};
pub use engine::{Channels, Engine, EngineState, Readiness, Summary};
pub use error::{Error, FrameError, Result};

/// Stream the commands from `input` to the device at `device_path`, returning
/// once every command has been confirmed.
/// The device and input are released before this returns, whatever the
/// outcome.
#[cfg(unix)]
pub fn stream(
    device_path: &str,
    input: InputSource,
    config: &Config,
    cancel: CancellationToken,
    monitor: impl std::io::Write + 'static,
) -> Result<Summary> {
    let port = open_device(device_path, config.speed)?;
    let mut engine = Engine::new(PollChannels::new(port, input), config, cancel).with_monitor(monitor);
    engine.run()
}
