//! Protocol front ends.
//!
//! Each front end translates a client command stream into [`DebugEngine`] calls and
//! engine events into its own wire format. The set of front ends is closed, see
//! [`Protocol`].

mod breakpoints;
pub mod cli;
pub mod dap;
pub mod mi;

use crate::config::{ConfigError, EngineLogging, InterpreterMode};
use crate::engine::{DebugEngine, EngineEvent, OutputEvent};
use std::io::{self, BufRead, BufReader, Write};
use std::string::FromUtf8Error;
use std::sync::{Arc, Mutex};

pub use breakpoints::BreakpointBook;
pub use cli::CliProtocol;
pub use dap::DapProtocol;
pub use mi::MiProtocol;

const LOG_TARGET: &str = "protocol";

/// Receiver of engine events, one per process.
///
/// Implementations serialize concurrent calls, a record is never interleaved with
/// another one.
pub trait ProtocolSink: Send + Sync {
    fn emit_event(&self, event: EngineEvent);

    fn emit_output_event(&self, event: OutputEvent) {
        self.emit_event(EngineEvent::Output(event))
    }
}

/// Protocol output channel shared between the command loop and event emitters.
#[derive(Clone)]
pub struct SharedWriter(Arc<Mutex<Box<dyn Write + Send>>>);

impl SharedWriter {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(writer))))
    }

    /// Write and flush a single record under the writer lock.
    pub fn write_record(&self, record: &[u8]) -> io::Result<()> {
        self.write_record_with(|| Ok(record.to_vec()))
    }

    /// Render a record and write it under the writer lock, so records rendered with
    /// increasing sequence numbers reach the client in that order.
    pub fn write_record_with(&self, render: impl FnOnce() -> io::Result<Vec<u8>>) -> io::Result<()> {
        let mut writer = self.0.lock().unwrap();
        let record = render()?;
        writer.write_all(&record)?;
        writer.flush()
    }

    /// Same as [`SharedWriter::write_record`] for emitters that have nobody to report to.
    pub(crate) fn write_record_or_log(&self, record: &[u8]) {
        if let Err(e) = self.write_record(record) {
            // not through `log`: a redirected engine logger writes into this channel
            eprintln!("protocol output error: {e}");
        }
    }
}

/// Source of client commands.
pub enum CommandInput {
    /// Interactive terminal with line editing and history.
    Terminal,
    Reader(Box<dyn BufRead + Send>),
}

impl CommandInput {
    pub fn reader(reader: impl BufRead + Send + 'static) -> Self {
        CommandInput::Reader(Box::new(reader))
    }

    /// Line reader for non interactive front ends, a terminal is read as plain stdin.
    pub fn into_reader(self) -> Box<dyn BufRead + Send> {
        match self {
            CommandInput::Terminal => Box::new(BufReader::new(io::stdin())),
            CommandInput::Reader(reader) => reader,
        }
    }
}

/// Client side channels of a protocol front end.
pub struct ProtocolIo {
    pub input: CommandInput,
    pub output: SharedWriter,
}

impl ProtocolIo {
    pub fn new(input: CommandInput, output: SharedWriter) -> Self {
        Self { input, output }
    }

    /// Process standard streams, an interactive terminal is used if `interactive` is set.
    pub fn stdio(interactive: bool) -> Self {
        let input = if interactive {
            CommandInput::Terminal
        } else {
            CommandInput::reader(BufReader::new(io::stdin()))
        };
        Self::new(input, SharedWriter::new(io::stdout()))
    }
}

/// Read one line without trailing line separators, `None` at end of input.
/// A line that is not valid UTF-8 is consumed and returned as the inner error.
pub(crate) fn read_line(
    reader: &mut dyn BufRead,
) -> io::Result<Option<Result<String, FromUtf8Error>>> {
    let mut raw = vec![];
    if reader.read_until(b'\n', &mut raw)? == 0 {
        return Ok(None);
    }
    while matches!(raw.last(), Some(b'\n' | b'\r')) {
        raw.pop();
    }
    Ok(Some(String::from_utf8(raw)))
}

/// Protocol front end selected by the interpreter mode.
#[allow(clippy::large_enum_variant)]
pub enum Protocol {
    Mi(MiProtocol),
    Dap(DapProtocol),
    Cli(CliProtocol),
}

impl Protocol {
    pub fn new(mode: InterpreterMode, io: ProtocolIo) -> anyhow::Result<Self> {
        Ok(match mode {
            InterpreterMode::Mi => Protocol::Mi(MiProtocol::new(io)),
            InterpreterMode::Dap => Protocol::Dap(DapProtocol::new(io)),
            InterpreterMode::Cli => Protocol::Cli(CliProtocol::new(io)?),
        })
    }

    pub fn mode(&self) -> InterpreterMode {
        match self {
            Protocol::Mi(_) => InterpreterMode::Mi,
            Protocol::Dap(_) => InterpreterMode::Dap,
            Protocol::Cli(_) => InterpreterMode::Cli,
        }
    }

    /// Event sink to be bound to the engine and the redirect server.
    pub fn sink(&self) -> Arc<dyn ProtocolSink> {
        match self {
            Protocol::Mi(mi) => mi.sink(),
            Protocol::Dap(dap) => dap.sink(),
            Protocol::Cli(cli) => cli.sink(),
        }
    }

    /// Pre-seed a launch command.
    ///
    /// MI and CLI use it as a default, launch related client commands take precedence.
    /// DAP uses it as an override for every client `launch` request.
    pub fn configure_launch(&mut self, program: String, args: Vec<String>) {
        match self {
            Protocol::Mi(mi) => mi.set_launch_command(program, args),
            Protocol::Dap(dap) => dap.override_launch_command(program, args),
            Protocol::Cli(cli) => cli.set_launch_command(program, args),
        }
    }

    /// Redirect engine diagnostics, supported by DAP front end only.
    pub fn enable_engine_logging(&mut self, logging: EngineLogging) -> Result<(), ConfigError> {
        match self {
            Protocol::Dap(dap) => dap.engine_logging(logging),
            _ => Err(ConfigError::EngineLoggingUnsupported(self.mode())),
        }
    }

    /// Serve client commands until the client leaves.
    pub fn run_command_loop(&mut self, engine: &mut dyn DebugEngine) -> anyhow::Result<()> {
        log::info!(target: LOG_TARGET, "{} command loop started", self.mode());
        let result = match self {
            Protocol::Mi(mi) => mi.command_loop(engine),
            Protocol::Dap(dap) => dap.command_loop(engine),
            Protocol::Cli(cli) => cli.command_loop(engine),
        };
        log::info!(target: LOG_TARGET, "{} command loop finished", self.mode());
        result
    }
}
