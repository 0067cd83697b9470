use std::path::PathBuf;
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Port used by the redirect server when none (or zero) is configured.
pub const DEFAULT_SERVER_PORT: u16 = 4711;

/// Wire format of the protocol front end.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, EnumString, Display, IntoStaticStr)]
pub enum InterpreterMode {
    /// Line based GDB/MI style machine interface.
    #[default]
    #[strum(serialize = "mi")]
    Mi,
    /// Content-Length framed JSON messages (Debug Adapter Protocol).
    #[strum(to_string = "vscode", serialize = "dap")]
    Dap,
    /// Interactive command line.
    #[strum(serialize = "cli")]
    Cli,
}

/// Where engine diagnostics go once engine logging is enabled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineLogging {
    /// Log file, `None` means the records are sent to the protocol client.
    pub path: Option<PathBuf>,
}

/// Program that the session launches when the client asks to run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("engine logging is only supported in vscode interpreter mode, current mode is `{0}`")]
    EngineLoggingUnsupported(InterpreterMode),
    #[error("open engine log file {path}: {source}")]
    EngineLogFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Debugging session configuration (built once at startup, read-only after).
#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    pub mode: InterpreterMode,
    pub engine_logging: Option<EngineLogging>,
    /// Redirect server port, `None` or zero resolves to [`DEFAULT_SERVER_PORT`].
    pub server_port: Option<u16>,
    pub launch: Option<LaunchCommand>,
    pub attach_pid: Option<u32>,
}

impl SessionConfig {
    pub fn new(mode: InterpreterMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Check that requested features are supported by the selected interpreter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine_logging.is_some() && self.mode != InterpreterMode::Dap {
            return Err(ConfigError::EngineLoggingUnsupported(self.mode));
        }
        Ok(())
    }

    /// Return true if debugee output should be mirrored by the redirect server.
    pub fn redirect_enabled(&self) -> bool {
        self.mode != InterpreterMode::Cli
    }

    pub fn resolved_server_port(&self) -> u16 {
        match self.server_port {
            None | Some(0) => DEFAULT_SERVER_PORT,
            Some(port) => port,
        }
    }
}
