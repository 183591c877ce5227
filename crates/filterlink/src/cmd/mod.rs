use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use filterlink_frame::ProtocolRevision;
use filterlink_proto::ParamFormat;
use filterlink_session::{Session, SessionConfig};
use filterlink_transport::{DeviceConfig, LinkStream, SerialDevice};

use crate::exit::{session_error, transport_error, CliResult};
use crate::output::OutputFormat;

pub mod filters;
pub mod monitor;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every packet the board sends.
    Monitor(MonitorArgs),
    /// Wait for the filter list and print it.
    Filters(FiltersArgs),
    /// Send a single packet to the board.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Monitor(args) => monitor::run(args, format),
        Command::Filters(args) => filters::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum RevisionArg {
    /// 8-bit length field.
    Legacy,
    /// 16-bit length field.
    Current,
}

impl From<RevisionArg> for ProtocolRevision {
    fn from(arg: RevisionArg) -> Self {
        match arg {
            RevisionArg::Legacy => ProtocolRevision::Legacy,
            RevisionArg::Current => ProtocolRevision::Current,
        }
    }
}

/// How to reach the board and how to open the session.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Serial device node, or socket path with --socket.
    #[arg(env = "FILTERLINK_DEVICE")]
    pub device: PathBuf,
    /// Connect to a Unix socket (board simulator) instead of a device node.
    #[arg(long)]
    pub socket: bool,
    /// Wire revision spoken by the board firmware.
    #[arg(long, value_enum, env = "FILTERLINK_REVISION", default_value = "current")]
    pub revision: RevisionArg,
    /// Delay after opening the device before stale input is flushed.
    #[arg(long, value_name = "MS", default_value = "1000")]
    pub settle_ms: u64,
    /// Do not send a probe when the session opens.
    #[arg(long)]
    pub no_probe: bool,
    /// Reset the board before probing.
    #[arg(long)]
    pub reset: bool,
    /// Do not answer probes sent by the board.
    #[arg(long)]
    pub no_reply: bool,
}

impl LinkArgs {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            revision: self.revision.into(),
            send_probe_on_open: !self.no_probe,
            reset_on_open: self.reset,
            reply_to_probe: !self.no_reply,
            ..SessionConfig::default()
        }
    }

    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            settle_delay: Duration::from_millis(self.settle_ms),
            ..DeviceConfig::default()
        }
    }

    pub fn open_stream(&self) -> CliResult<LinkStream> {
        if self.socket {
            return connect_socket(&self.device);
        }
        SerialDevice::open_with_config(&self.device, &self.device_config())
            .map_err(|err| transport_error("open failed", err))
    }

    pub fn open_session(&self) -> CliResult<Session> {
        let stream = self.open_stream()?;
        Session::open(stream, self.session_config())
            .map_err(|err| session_error("session open failed", err))
    }
}

#[cfg(unix)]
fn connect_socket(path: &Path) -> CliResult<LinkStream> {
    LinkStream::connect_unix(path).map_err(|err| transport_error("connect failed", err))
}

#[cfg(not(unix))]
fn connect_socket(_path: &Path) -> CliResult<LinkStream> {
    Err(crate::exit::CliError::new(
        crate::exit::USAGE,
        "--socket requires Unix domain sockets",
    ))
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Exit after printing N packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// Wait for the board's probe before printing anything else.
    #[arg(long)]
    pub wait_probe: bool,
}

#[derive(Args, Debug)]
pub struct FiltersArgs {
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    #[command(subcommand)]
    pub packet: SendPacket,
}

/// Host-to-board packets.
#[derive(Subcommand, Debug, Clone)]
pub enum SendPacket {
    /// Probe the board.
    Probe,
    /// Reboot the board.
    Reset,
    /// Run a console command on the board.
    Command {
        /// Command line, e.g. `chain save live`. Split on whitespace.
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
        words: Vec<String>,
    },
    /// Append a branch to a stage.
    Create {
        #[arg(long)]
        stage: u8,
        /// Index into the board's filter list.
        #[arg(long)]
        filter: u8,
        /// Mix fraction between 0 and 1.
        #[arg(long, default_value = "1.0")]
        mix: f32,
        /// Run the branch fully wet regardless of mix.
        #[arg(long)]
        full_mix: bool,
    },
    /// Remove a branch.
    Delete {
        #[arg(long)]
        stage: u8,
        #[arg(long)]
        branch: u8,
    },
    /// Set or clear one flag bit on a branch.
    Flag {
        #[arg(long)]
        stage: u8,
        #[arg(long)]
        branch: u8,
        #[arg(long)]
        bit: u8,
        /// Clear the bit instead of setting it.
        #[arg(long)]
        clear: bool,
    },
    /// Write one filter parameter.
    Mod {
        #[arg(long)]
        stage: u8,
        #[arg(long)]
        branch: u8,
        /// Byte offset of the parameter in the filter's block.
        #[arg(long)]
        offset: u8,
        /// Format code of the parameter, e.g. `f` or `H`.
        #[arg(id = "param_format", long = "param-format", value_name = "CODE", value_parser = parse_format)]
        format: ParamFormat,
        #[arg(long, allow_hyphen_values = true)]
        value: f64,
    },
    /// Change a branch's mix fraction.
    Mix {
        #[arg(long)]
        stage: u8,
        #[arg(long)]
        branch: u8,
        #[arg(long)]
        mix: f32,
    },
}

fn parse_format(value: &str) -> Result<ParamFormat, String> {
    ParamFormat::parse(value).map_err(|err| err.to_string())
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
