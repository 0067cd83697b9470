//! Debug Adapter Protocol front end (`vscode` interpreter).

mod logger;
pub mod proto;
pub mod transport;

use crate::config::{ConfigError, EngineLogging, LaunchCommand};
use crate::engine::{
    Breakpoint, DebugEngine, EngineEvent, OutputChannel, StepKind, StopReason, ThreadInfo,
};
use crate::protocol::{ProtocolIo, ProtocolSink, SharedWriter, LOG_TARGET};
use anyhow::{anyhow, bail, Context};
use log::{debug, warn};
pub use logger::{DapLogger, FileLogger};
use proto::*;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

fn breakpoint_body(bp: &Breakpoint) -> Value {
    let mut body = json!({
        "id": bp.id,
        "verified": bp.verified,
        "line": bp.line,
        "source": {"path": bp.file},
    });
    if let Some(message) = &bp.message {
        body["message"] = json!(message);
    }
    body
}

fn thread_body(thread: &ThreadInfo) -> Value {
    json!({"id": thread.id, "name": thread.name})
}

/// Event name and body of an engine event.
pub fn event_message(event: &EngineEvent) -> (&'static str, Option<Value>) {
    match event {
        EngineEvent::ProcessStarted { pid, name } => (
            "process",
            Some(json!({
                "name": name,
                "systemProcessId": pid,
                "isLocalProcess": true,
                "startMethod": "launch",
            })),
        ),
        EngineEvent::Stopped { reason, thread_id } => {
            let mut body = match reason {
                StopReason::Entry => json!({"reason": "entry"}),
                StopReason::Breakpoint { id } => {
                    json!({"reason": "breakpoint", "hitBreakpointIds": [id]})
                }
                StopReason::Step => json!({"reason": "step"}),
                StopReason::Pause => json!({"reason": "pause"}),
                StopReason::Signal(_) | StopReason::Exception(_) => {
                    json!({"reason": "exception", "description": reason.to_string()})
                }
            };
            body["allThreadsStopped"] = json!(true);
            if let Some(id) = thread_id {
                body["threadId"] = json!(id);
            }
            ("stopped", Some(body))
        }
        EngineEvent::Continued { thread_id } => (
            "continued",
            Some(json!({
                "threadId": thread_id.unwrap_or_default(),
                "allThreadsContinued": thread_id.is_none(),
            })),
        ),
        EngineEvent::BreakpointChanged(bp) => (
            "breakpoint",
            Some(json!({"reason": "changed", "breakpoint": breakpoint_body(bp)})),
        ),
        EngineEvent::Output(output) => {
            let category = match output.channel {
                OutputChannel::StdOut => "stdout",
                OutputChannel::StdErr => "stderr",
            };
            (
                "output",
                Some(json!({"category": category, "output": output.text})),
            )
        }
        EngineEvent::Exited { code } => ("exited", Some(json!({ "exitCode": code }))),
        EngineEvent::Terminated => ("terminated", None),
    }
}

/// Writer of DAP responses and events.
///
/// Responses and events share one sequence counter, numbers are assigned under
/// the output lock so they are strictly increasing on the wire.
pub struct DapEmitter {
    out: SharedWriter,
    seq: AtomicI64,
}

impl DapEmitter {
    pub fn new(out: SharedWriter) -> Self {
        Self {
            out,
            seq: AtomicI64::new(0),
        }
    }

    fn next_seq(&self) -> i64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn send_event(&self, event: &'static str, body: Option<Value>) -> io::Result<()> {
        self.out.write_record_with(|| {
            transport::encode(&DapEvent {
                seq: self.next_seq(),
                r#type: "event",
                event,
                body,
            })
        })
    }

    pub(crate) fn send_event_or_log(&self, event: &'static str, body: Option<Value>) {
        if let Err(e) = self.send_event(event, body) {
            eprintln!("protocol output error: {e}");
        }
    }

    /// Send a response to request `request_seq`, an `Err` result becomes a failed response.
    pub fn send_response(
        &self,
        request_seq: i64,
        command: &str,
        result: Result<Option<Value>, String>,
    ) -> io::Result<()> {
        let (success, message, body) = match result {
            Ok(body) => (true, None, body),
            Err(message) => (false, Some(message), None),
        };
        self.out.write_record_with(|| {
            transport::encode(&DapResponse {
                seq: self.next_seq(),
                r#type: "response",
                request_seq,
                success,
                command,
                message,
                body,
            })
        })
    }
}

impl ProtocolSink for DapEmitter {
    fn emit_event(&self, event: EngineEvent) {
        let (name, body) = event_message(&event);
        self.send_event_or_log(name, body);
    }
}

enum Flow {
    Continue,
    Initialized,
    Exit,
}

fn arguments<T: DeserializeOwned + Default>(value: &Value) -> anyhow::Result<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value.clone()).context("invalid arguments")
}

pub struct DapProtocol {
    input: Box<dyn BufRead + Send>,
    emitter: Arc<DapEmitter>,
    launch_override: Option<LaunchCommand>,
}

impl DapProtocol {
    pub fn new(io: ProtocolIo) -> Self {
        Self {
            input: io.input.into_reader(),
            emitter: Arc::new(DapEmitter::new(io.output)),
            launch_override: None,
        }
    }

    pub fn sink(&self) -> Arc<dyn ProtocolSink> {
        self.emitter.clone()
    }

    /// Program and arguments used for every `launch` request instead of the client's ones.
    pub fn override_launch_command(&mut self, program: String, args: Vec<String>) {
        self.launch_override = Some(LaunchCommand { program, args });
    }

    /// Route engine diagnostics to the client console or to a file.
    pub fn engine_logging(&mut self, logging: EngineLogging) -> Result<(), ConfigError> {
        match logging.path {
            Some(path) => {
                let logger = FileLogger::new(&path)?;
                crate::log::LOGGER_SWITCHER.route_engine(logger);
                debug!(target: LOG_TARGET, "engine log redirected to {}", path.display());
            }
            None => {
                crate::log::LOGGER_SWITCHER.route_engine(DapLogger::new(self.emitter.clone()));
                debug!(target: LOG_TARGET, "engine log redirected to client console");
            }
        }
        Ok(())
    }

    fn handle(&mut self, engine: &mut dyn DebugEngine, req: &DapRequest) -> anyhow::Result<(Option<Value>, Flow)> {
        let reply = match req.command.as_str() {
            "initialize" => {
                engine.initialize()?;
                let capabilities = json!({
                    "supportsConfigurationDoneRequest": true,
                    "supportsTerminateRequest": true,
                    "supportTerminateDebuggee": true,
                });
                (Some(capabilities), Flow::Initialized)
            }
            "launch" => {
                let args: LaunchArguments = arguments(&req.arguments)?;
                let (program, args) = match &self.launch_override {
                    Some(cmd) => (cmd.program.clone(), cmd.args.clone()),
                    None => (
                        args.program
                            .ok_or_else(|| anyhow!("launch request without `program`"))?,
                        args.args,
                    ),
                };
                engine.launch(&program, &args)?;
                (None, Flow::Continue)
            }
            "attach" => {
                let args: AttachArguments = arguments(&req.arguments)?;
                let pid = args
                    .pid()
                    .ok_or_else(|| anyhow!("attach request without valid `processId`"))?;
                engine.initialize()?;
                engine.attach(pid)?;
                (None, Flow::Continue)
            }
            "setBreakpoints" => {
                let args: SetBreakpointsArguments = arguments(&req.arguments)?;
                let file = args
                    .source
                    .path
                    .clone()
                    .or_else(|| args.source.name.clone())
                    .ok_or_else(|| anyhow!("source without path"))?;
                let bps = engine.set_breakpoints(&file, &args.requested_lines())?;
                let body = json!({"breakpoints": bps.iter().map(breakpoint_body).collect::<Vec<_>>()});
                (Some(body), Flow::Continue)
            }
            "configurationDone" => {
                engine.configuration_done()?;
                (None, Flow::Continue)
            }
            "threads" => {
                let threads = engine.threads()?;
                let body = json!({"threads": threads.iter().map(thread_body).collect::<Vec<_>>()});
                (Some(body), Flow::Continue)
            }
            "continue" => {
                engine.resume()?;
                (Some(json!({"allThreadsContinued": true})), Flow::Continue)
            }
            "next" | "stepIn" | "stepOut" => {
                let kind = match req.command.as_str() {
                    "next" => StepKind::Over,
                    "stepIn" => StepKind::Into,
                    _ => StepKind::Out,
                };
                engine.step(kind)?;
                (None, Flow::Continue)
            }
            "pause" => {
                engine.pause()?;
                (None, Flow::Continue)
            }
            "terminate" => {
                engine.disconnect(true)?;
                (None, Flow::Continue)
            }
            "disconnect" => {
                let args: DisconnectArguments = arguments(&req.arguments)?;
                if let Err(e) = engine.disconnect(args.terminate_debuggee.unwrap_or(true)) {
                    warn!(target: LOG_TARGET, "disconnect: {e}");
                }
                (None, Flow::Exit)
            }
            unknown => bail!("unsupported command `{unknown}`"),
        };
        Ok(reply)
    }

    /// Serve requests until `disconnect` or end of input.
    pub fn command_loop(&mut self, engine: &mut dyn DebugEngine) -> anyhow::Result<()> {
        loop {
            let message = match transport::read_message(self.input.as_mut()) {
                Ok(Some(message)) => message,
                Ok(None) => return Ok(()),
                Err(e) if e.is_recoverable() => {
                    warn!(target: LOG_TARGET, "dap: {e}");
                    self.emitter.send_response(0, "", Err(e.to_string()))?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let request: DapRequest = match serde_json::from_value(message) {
                Ok(request) => request,
                Err(e) => {
                    warn!(target: LOG_TARGET, "dap: invalid request: {e}");
                    self.emitter
                        .send_response(0, "", Err(format!("invalid request: {e}")))?;
                    continue;
                }
            };
            debug!(target: LOG_TARGET, "dap <- {} {}", request.seq, request.command);

            match self.handle(engine, &request) {
                Ok((body, flow)) => {
                    self.emitter
                        .send_response(request.seq, &request.command, Ok(body))?;
                    match flow {
                        Flow::Continue => {}
                        Flow::Initialized => self.emitter.send_event("initialized", None)?,
                        Flow::Exit => return Ok(()),
                    }
                }
                Err(e) => {
                    self.emitter
                        .send_response(request.seq, &request.command, Err(format!("{e:#}")))?;
                }
            }
        }
    }
}
