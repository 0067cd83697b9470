//! Process level debug engine.
//!
//! Launches or attaches to a debugee, captures its output, tracks its lifetime and
//! implements pause/resume with job control signals. Symbolic breakpoints and stepping
//! belong to a runtime specific engine and are reported as unsupported here.

use crate::engine::{
    Breakpoint, DebugEngine, EngineError, EngineEvent, EngineResult, OutputChannel, OutputEvent,
    StepKind, StopReason, ThreadInfo,
};
use crate::protocol::ProtocolSink;
use crate::redirect::{pump_chunks, DebugeeStreams, Utf8Decoder};
use itertools::Itertools;
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const LOG_TARGET: &str = "engine";
const MONITOR_INTERVAL: Duration = Duration::from_millis(100);
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);
const UNVERIFIED_BREAKPOINT_MSG: &str = "source breakpoints are not resolved by the process engine";

#[derive(Default)]
enum Debugee {
    #[default]
    None,
    Pending {
        program: String,
        args: Vec<String>,
    },
    Launched {
        pid: u32,
        exited: Arc<AtomicBool>,
    },
    Attached {
        pid: u32,
        monitor_cancel: Option<Arc<AtomicBool>>,
    },
}

#[derive(Default)]
pub struct ProcessEngine {
    sink: Option<Arc<dyn ProtocolSink>>,
    streams: Option<Arc<DebugeeStreams>>,
    initialized: bool,
    paused: bool,
    debugee: Debugee,
    breakpoints: BTreeMap<String, Vec<Breakpoint>>,
    next_breakpoint_id: u32,
}

impl ProcessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(sink) = &self.sink {
            sink.emit_event(event);
        }
    }

    /// Pid of a live debugee.
    fn live_pid(&self) -> EngineResult<u32> {
        match &self.debugee {
            Debugee::Launched { pid, exited } if !exited.load(Ordering::SeqCst) => Ok(*pid),
            Debugee::Attached { pid, .. } => Ok(*pid),
            _ => Err(EngineError::NoProcess),
        }
    }

    fn signal(pid: u32, signal: Signal) -> EngineResult<()> {
        kill(Pid::from_raw(pid as i32), signal).map_err(|e| EngineError::Signal("kill", e))
    }

    fn spawn(&mut self, program: String, args: Vec<String>) -> EngineResult<()> {
        let mut cmd = Command::new(&program);
        cmd.args(&args).stdin(Stdio::null());

        let (stdout_reader, stdout_writer) = os_pipe::pipe()?;
        let (stderr_reader, stderr_writer) = os_pipe::pipe()?;
        cmd.stdout(stdout_writer).stderr(stderr_writer);

        let mut child = cmd.spawn().map_err(|source| EngineError::Spawn {
            program: program.clone(),
            source,
        })?;
        // close parent copies of the pipe write ends
        drop(cmd);

        let pid = child.id();
        info!(target: LOG_TARGET, "debugee `{program}` started, pid {pid}");

        let name = Path::new(&program)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or(program);
        self.emit(EngineEvent::ProcessStarted { pid, name });
        self.emit(EngineEvent::Continued { thread_id: None });

        // with a redirect server the output is published by it, otherwise by the engine
        let readers: Vec<JoinHandle<()>> = [
            (stdout_reader, OutputChannel::StdOut),
            (stderr_reader, OutputChannel::StdErr),
        ]
        .into_iter()
        .map(|(reader, channel)| {
            let sink = self.sink.clone();
            let streams = self.streams.clone();
            thread::spawn(move || {
                let mut decoder = Utf8Decoder::default();
                pump_chunks(reader, |chunk| match (&streams, &sink) {
                    (Some(streams), _) => {
                        if let Err(e) = streams.write_chunk(channel, chunk) {
                            warn!(target: LOG_TARGET, "redirect debugee output: {e}");
                        }
                    }
                    (None, Some(sink)) => {
                        let text = decoder.decode(chunk);
                        if !text.is_empty() {
                            sink.emit_output_event(OutputEvent::new(channel, text));
                        }
                    }
                    (None, None) => {}
                });
                if let (Some(sink), Some(text)) = (&sink, decoder.finish()) {
                    sink.emit_output_event(OutputEvent::new(channel, text));
                }
            })
        })
        .collect();

        let exited = Arc::new(AtomicBool::new(false));
        thread::spawn({
            let exited = exited.clone();
            let sink = self.sink.clone();
            let streams = self.streams.clone();
            move || {
                let code = match child.wait() {
                    Ok(status) => status
                        .code()
                        .or_else(|| status.signal().map(|signo| 128 + signo))
                        .unwrap_or(-1),
                    Err(e) => {
                        warn!(target: LOG_TARGET, "wait for debugee {pid}: {e}");
                        -1
                    }
                };
                // all output must be delivered before the exit notification
                for reader in readers {
                    _ = reader.join();
                }
                if let Some(streams) = streams {
                    if !streams.wait_delivered(DELIVERY_TIMEOUT) {
                        warn!(target: LOG_TARGET, "debugee {pid} output not delivered in time");
                    }
                }
                exited.store(true, Ordering::SeqCst);
                info!(target: LOG_TARGET, "debugee {pid} exit with code {code}");

                if let Some(sink) = sink {
                    sink.emit_event(EngineEvent::Exited { code });
                    sink.emit_event(EngineEvent::Terminated);
                }
            }
        });

        self.paused = false;
        self.debugee = Debugee::Launched { pid, exited };
        Ok(())
    }

    fn start_monitor(&self, pid: u32) -> Arc<AtomicBool> {
        let cancel = Arc::new(AtomicBool::new(false));
        thread::spawn({
            let cancel = cancel.clone();
            let sink = self.sink.clone();
            move || loop {
                thread::sleep(MONITOR_INTERVAL);
                if cancel.load(Ordering::SeqCst) {
                    return;
                }
                if let Err(Errno::ESRCH) = kill(Pid::from_raw(pid as i32), None) {
                    info!(target: LOG_TARGET, "attached process {pid} is gone");
                    if let Some(sink) = &sink {
                        sink.emit_event(EngineEvent::Terminated);
                    }
                    return;
                }
            }
        });
        cancel
    }
}

impl DebugEngine for ProcessEngine {
    fn bind_sink(&mut self, sink: Arc<dyn ProtocolSink>) {
        self.sink = Some(sink);
    }

    fn redirect_output(&mut self, streams: DebugeeStreams) {
        debug!(target: LOG_TARGET, "debugee output redirected");
        self.streams = Some(Arc::new(streams));
    }

    fn initialize(&mut self) -> EngineResult<()> {
        self.initialized = true;
        Ok(())
    }

    fn attach(&mut self, pid: u32) -> EngineResult<()> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        if self.live_pid().is_ok() {
            return Err(EngineError::AlreadyRunning);
        }
        // pid 0 and negative pids address process groups
        if pid == 0 || pid > i32::MAX as u32 {
            return Err(EngineError::ProcessNotFound(pid));
        }

        match kill(Pid::from_raw(pid as i32), None) {
            Ok(()) | Err(Errno::EPERM) => {}
            Err(Errno::ESRCH) => return Err(EngineError::ProcessNotFound(pid)),
            Err(e) => return Err(EngineError::Signal("kill", e)),
        }

        info!(target: LOG_TARGET, "attached to process {pid}");
        self.paused = false;
        self.debugee = Debugee::Attached {
            pid,
            monitor_cancel: None,
        };
        Ok(())
    }

    fn configuration_done(&mut self) -> EngineResult<()> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }

        match std::mem::take(&mut self.debugee) {
            Debugee::Pending { program, args } => self.spawn(program, args),
            Debugee::Attached {
                pid,
                monitor_cancel: None,
            } => {
                let cancel = self.start_monitor(pid);
                self.debugee = Debugee::Attached {
                    pid,
                    monitor_cancel: Some(cancel),
                };
                Ok(())
            }
            debugee => {
                self.debugee = debugee;
                Ok(())
            }
        }
    }

    fn launch(&mut self, program: &str, args: &[String]) -> EngineResult<()> {
        self.initialized = true;
        if self.live_pid().is_ok() {
            return Err(EngineError::AlreadyRunning);
        }

        let program = if !Path::new(program).exists() {
            which::which(program)
                .map_err(|e| EngineError::Spawn {
                    program: program.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, e),
                })?
                .to_string_lossy()
                .to_string()
        } else {
            program.to_string()
        };

        debug!(target: LOG_TARGET, "launch pending: {program} {}", args.iter().join(" "));
        self.debugee = Debugee::Pending {
            program,
            args: args.to_vec(),
        };
        Ok(())
    }

    fn set_breakpoints(&mut self, file: &str, lines: &[u32]) -> EngineResult<Vec<Breakpoint>> {
        let existing = self.breakpoints.remove(file).unwrap_or_default();

        let mut result = Vec::with_capacity(lines.len());
        for &line in lines.iter().unique() {
            let id = match existing.iter().find(|bp| bp.line == line) {
                Some(bp) => bp.id,
                None => {
                    self.next_breakpoint_id += 1;
                    self.next_breakpoint_id
                }
            };
            result.push(Breakpoint {
                id,
                verified: false,
                file: file.to_string(),
                line,
                message: Some(UNVERIFIED_BREAKPOINT_MSG.to_string()),
            });
        }

        if !result.is_empty() {
            self.breakpoints.insert(file.to_string(), result.clone());
        }
        Ok(result)
    }

    fn threads(&mut self) -> EngineResult<Vec<ThreadInfo>> {
        let Ok(pid) = self.live_pid() else {
            return Ok(vec![]);
        };
        Ok(vec![ThreadInfo {
            id: pid,
            name: "main".to_string(),
            running: !self.paused,
        }])
    }

    fn resume(&mut self) -> EngineResult<()> {
        let pid = self.live_pid()?;
        Self::signal(pid, Signal::SIGCONT)?;
        self.paused = false;
        self.emit(EngineEvent::Continued { thread_id: None });
        Ok(())
    }

    fn pause(&mut self) -> EngineResult<()> {
        let pid = self.live_pid()?;
        Self::signal(pid, Signal::SIGSTOP)?;
        self.paused = true;
        self.emit(EngineEvent::Stopped {
            reason: StopReason::Pause,
            thread_id: Some(pid),
        });
        Ok(())
    }

    fn step(&mut self, _kind: StepKind) -> EngineResult<()> {
        Err(EngineError::Unsupported("step"))
    }

    fn disconnect(&mut self, terminate: bool) -> EngineResult<()> {
        let pid = match self.live_pid() {
            Ok(pid) => pid,
            Err(_) => {
                self.debugee = Debugee::None;
                return Ok(());
            }
        };

        let debugee = std::mem::take(&mut self.debugee);
        if let Debugee::Attached {
            monitor_cancel: Some(cancel),
            ..
        } = &debugee
        {
            cancel.store(true, Ordering::SeqCst);
        }

        if terminate {
            info!(target: LOG_TARGET, "terminate debugee {pid}");
            Self::signal(pid, Signal::SIGKILL)?;
        } else {
            info!(target: LOG_TARGET, "detach from debugee {pid}");
            if self.paused {
                Self::signal(pid, Signal::SIGCONT)?;
            }
        }
        self.paused = false;
        Ok(())
    }

    fn release(&mut self) {
        match std::mem::take(&mut self.debugee) {
            Debugee::Launched { pid, exited } if !exited.load(Ordering::SeqCst) => {
                if let Err(e) = Self::signal(pid, Signal::SIGKILL) {
                    warn!(target: LOG_TARGET, "kill debugee {pid}: {e}");
                }
            }
            Debugee::Attached {
                monitor_cancel: Some(cancel),
                ..
            } => cancel.store(true, Ordering::SeqCst),
            _ => {}
        }
        self.streams = None;
        self.sink = None;
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        self.release();
    }
}
