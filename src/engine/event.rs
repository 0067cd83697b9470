use std::fmt::{Display, Formatter};

/// Standard stream of the debugee.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputChannel {
    StdOut,
    StdErr,
}

/// A chunk of debugee output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputEvent {
    pub channel: OutputChannel,
    pub text: String,
}

impl OutputEvent {
    pub fn new(channel: OutputChannel, text: impl Into<String>) -> Self {
        Self {
            channel,
            text: text.into(),
        }
    }

    pub fn stdout(text: impl Into<String>) -> Self {
        Self::new(OutputChannel::StdOut, text)
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self::new(OutputChannel::StdErr, text)
    }
}

/// Why the debugee stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Entry,
    Breakpoint { id: u32 },
    Step,
    Pause,
    Signal(String),
    Exception(String),
}

impl Display for StopReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Entry => f.write_str("entry point"),
            StopReason::Breakpoint { id } => write!(f, "breakpoint {id}"),
            StopReason::Step => f.write_str("step"),
            StopReason::Pause => f.write_str("pause"),
            StopReason::Signal(name) => write!(f, "signal {name}"),
            StopReason::Exception(text) => write!(f, "exception: {text}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u32,
    pub verified: bool,
    pub file: String,
    pub line: u32,
    /// Explanation for an unverified breakpoint.
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: u32,
    pub name: String,
    pub running: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepKind {
    Over,
    Into,
    Out,
}

/// Asynchronous notification from the engine to the bound protocol sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    ProcessStarted { pid: u32, name: String },
    Stopped {
        reason: StopReason,
        thread_id: Option<u32>,
    },
    Continued { thread_id: Option<u32> },
    BreakpointChanged(Breakpoint),
    Output(OutputEvent),
    Exited { code: i32 },
    Terminated,
}
