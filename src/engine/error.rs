#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine is not initialized")]
    NotInitialized,
    #[error("process {0} not found")]
    ProcessNotFound(u32),
    #[error("debugee already run")]
    AlreadyRunning,
    #[error("no debugee process")]
    NoProcess,
    #[error("nothing to launch, program is not set")]
    NoLaunchTarget,
    #[error("operation `{0}` is not supported by this engine")]
    Unsupported(&'static str),
    #[error("spawn `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{0} syscall error: {1}")]
    Signal(&'static str, nix::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Stable symbolic code, reported alongside the error message.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotInitialized => "E_NOT_INITIALIZED",
            EngineError::ProcessNotFound(_) => "E_PROCESS_NOT_FOUND",
            EngineError::AlreadyRunning => "E_ALREADY_RUNNING",
            EngineError::NoProcess => "E_NO_PROCESS",
            EngineError::NoLaunchTarget => "E_NO_LAUNCH_TARGET",
            EngineError::Unsupported(_) => "E_NOT_SUPPORTED",
            EngineError::Spawn { .. } => "E_SPAWN",
            EngineError::Signal(_, _) => "E_SIGNAL",
            EngineError::Io(_) => "E_IO",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
