//! Debug engine contract.
//!
//! The engine owns the debugee. Protocol front ends drive it through [`DebugEngine`]
//! and receive its notifications through the [`ProtocolSink`] bound with
//! [`DebugEngine::bind_sink`].

pub mod error;
pub mod event;
pub mod process;

use crate::protocol::ProtocolSink;
use crate::redirect::DebugeeStreams;
use std::sync::Arc;

pub use error::{EngineError, EngineResult};
pub use event::{
    Breakpoint, EngineEvent, OutputChannel, OutputEvent, StepKind, StopReason, ThreadInfo,
};
pub use process::ProcessEngine;

pub trait DebugEngine: Send {
    /// Set the sink for engine events. Events emitted before binding are dropped.
    fn bind_sink(&mut self, sink: Arc<dyn ProtocolSink>);

    /// Publish debugee output through the redirect server streams instead of the sink.
    fn redirect_output(&mut self, streams: DebugeeStreams) {
        _ = streams;
    }

    fn initialize(&mut self) -> EngineResult<()>;

    fn attach(&mut self, pid: u32) -> EngineResult<()>;

    /// Finish initial configuration (breakpoints etc.), the debugee proceeds after this call.
    fn configuration_done(&mut self) -> EngineResult<()>;

    /// Prepare a program for start, it runs at [`DebugEngine::configuration_done`].
    fn launch(&mut self, program: &str, args: &[String]) -> EngineResult<()>;

    /// Replace all breakpoints in `file` with breakpoints at `lines`.
    fn set_breakpoints(&mut self, file: &str, lines: &[u32]) -> EngineResult<Vec<Breakpoint>>;

    fn threads(&mut self) -> EngineResult<Vec<ThreadInfo>>;

    fn resume(&mut self) -> EngineResult<()>;

    fn pause(&mut self) -> EngineResult<()>;

    fn step(&mut self, kind: StepKind) -> EngineResult<()>;

    /// End the debug session, kill the debugee if `terminate` is set, detach otherwise.
    fn disconnect(&mut self, terminate: bool) -> EngineResult<()>;

    /// Release all engine resources at session teardown.
    fn release(&mut self) {}
}
