//! Line based machine interface (GDB/MI style).

pub mod parser;

use crate::config::LaunchCommand;
use crate::engine::{
    Breakpoint, DebugEngine, EngineEvent, OutputChannel, StepKind, StopReason, ThreadInfo,
};
use crate::protocol::{read_line, BreakpointBook, ProtocolIo, ProtocolSink, SharedWriter};
use anyhow::{anyhow, bail, Context};
use itertools::Itertools;
use parser::*;
use std::io::BufRead;
use std::sync::Arc;

pub const MI_PROMPT: &str = "(gdb)";

const THREAD_GROUP: &str = "i1";

fn bkpt_tuple(bp: &Breakpoint) -> String {
    let mut tuple = format!(
        "{{number=\"{}\",type=\"breakpoint\",disp=\"keep\",enabled=\"y\",file={},line=\"{}\",verified=\"{}\"",
        bp.id,
        quote(&bp.file),
        bp.line,
        if bp.verified { "y" } else { "n" },
    );
    if let Some(msg) = &bp.message {
        tuple.push_str(&format!(",warning={}", quote(msg)));
    }
    tuple.push('}');
    tuple
}

fn thread_tuple(thread: &ThreadInfo) -> String {
    format!(
        "{{id=\"{}\",name={},state=\"{}\"}}",
        thread.id,
        quote(&thread.name),
        if thread.running { "running" } else { "stopped" },
    )
}

/// Render an engine event as an MI async or stream record.
pub fn event_record(event: &EngineEvent) -> String {
    match event {
        EngineEvent::ProcessStarted { pid, .. } => {
            format!("=thread-group-started,id=\"{THREAD_GROUP}\",pid=\"{pid}\"")
        }
        EngineEvent::Stopped { reason, thread_id } => {
            let thread = thread_id
                .map(|id| format!(",thread-id=\"{id}\""))
                .unwrap_or_default();
            match reason {
                StopReason::Entry => format!("*stopped,reason=\"entry-point-hit\"{thread}"),
                StopReason::Breakpoint { id } => {
                    format!("*stopped,reason=\"breakpoint-hit\"{thread},bkptno=\"{id}\"")
                }
                StopReason::Step => format!("*stopped,reason=\"end-stepping-range\"{thread}"),
                StopReason::Pause => {
                    format!("*stopped,reason=\"signal-received\",signal-name=\"SIGINT\"{thread}")
                }
                StopReason::Signal(name) => format!(
                    "*stopped,reason=\"signal-received\",signal-name={}{thread}",
                    quote(name)
                ),
                StopReason::Exception(text) => format!(
                    "*stopped,reason=\"exception-received\",exception={}{thread}",
                    quote(text)
                ),
            }
        }
        EngineEvent::Continued { thread_id } => match thread_id {
            Some(id) => format!("*running,thread-id=\"{id}\""),
            None => "*running,thread-id=\"all\"".to_string(),
        },
        EngineEvent::BreakpointChanged(bp) => {
            format!("=breakpoint-modified,bkpt={}", bkpt_tuple(bp))
        }
        EngineEvent::Output(output) => {
            let source = match output.channel {
                OutputChannel::StdOut => "",
                OutputChannel::StdErr => ",source=\"target-stderr\"",
            };
            format!(
                "=message,text={},send-to=\"output-window\"{source}",
                quote(&output.text)
            )
        }
        EngineEvent::Exited { code } => {
            format!("*stopped,reason=\"exited\",exit-code=\"{code}\"")
        }
        EngineEvent::Terminated => format!("=thread-group-exited,id=\"{THREAD_GROUP}\""),
    }
}

/// Engine event sink of the MI front end.
pub struct MiEmitter {
    out: SharedWriter,
}

impl ProtocolSink for MiEmitter {
    fn emit_event(&self, event: EngineEvent) {
        let mut record = event_record(&event);
        record.push('\n');
        self.out.write_record_or_log(record.as_bytes());
    }
}

enum MiResult {
    Done(Option<String>),
    Running,
    Exit,
}

pub struct MiProtocol {
    input: Box<dyn BufRead + Send>,
    out: SharedWriter,
    emitter: Arc<MiEmitter>,
    preset: Option<LaunchCommand>,
    program: Option<String>,
    args: Option<Vec<String>>,
    breakpoints: BreakpointBook,
}

impl MiProtocol {
    pub fn new(io: ProtocolIo) -> Self {
        Self {
            input: io.input.into_reader(),
            emitter: Arc::new(MiEmitter {
                out: io.output.clone(),
            }),
            out: io.output,
            preset: None,
            program: None,
            args: None,
            breakpoints: BreakpointBook::default(),
        }
    }

    pub fn sink(&self) -> Arc<dyn ProtocolSink> {
        self.emitter.clone()
    }

    /// Default launch target, replaced by `-file-exec-and-symbols` and `-exec-arguments`.
    pub fn set_launch_command(&mut self, program: String, args: Vec<String>) {
        self.preset = Some(LaunchCommand { program, args });
    }

    fn launch_target(&self) -> anyhow::Result<(String, Vec<String>)> {
        let program = self
            .program
            .clone()
            .or_else(|| self.preset.as_ref().map(|p| p.program.clone()))
            .ok_or_else(|| anyhow!("No executable specified, use -file-exec-and-symbols"))?;

        let args = match (&self.args, &self.program, &self.preset) {
            (Some(args), _, _) => args.clone(),
            (None, None, Some(preset)) => preset.args.clone(),
            _ => vec![],
        };
        Ok((program, args))
    }

    fn handle(&mut self, engine: &mut dyn DebugEngine, cmd: MiCommand) -> anyhow::Result<MiResult> {
        let result = match cmd.operation.as_str() {
            FILE_EXEC_AND_SYMBOLS_COMMAND => {
                let path = cmd
                    .args
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow!("Missing executable path"))?;
                self.program = Some(path);
                MiResult::Done(None)
            }
            EXEC_ARGUMENTS_COMMAND => {
                self.args = Some(cmd.args);
                MiResult::Done(None)
            }
            EXEC_RUN_COMMAND => {
                let (program, args) = self.launch_target()?;
                engine.launch(&program, &args)?;
                engine.configuration_done()?;
                MiResult::Running
            }
            TARGET_ATTACH_COMMAND => {
                let pid: u32 = cmd
                    .args
                    .first()
                    .ok_or_else(|| anyhow!("Missing process id"))?
                    .parse()
                    .context("Invalid process id")?;
                engine.initialize()?;
                engine.attach(pid)?;
                engine.configuration_done()?;
                MiResult::Done(None)
            }
            EXEC_CONTINUE_COMMAND => {
                engine.resume()?;
                MiResult::Running
            }
            EXEC_INTERRUPT_COMMAND => {
                engine.pause()?;
                MiResult::Done(None)
            }
            EXEC_NEXT_COMMAND | EXEC_STEP_COMMAND | EXEC_FINISH_COMMAND => {
                let kind = match cmd.operation.as_str() {
                    EXEC_NEXT_COMMAND => StepKind::Over,
                    EXEC_STEP_COMMAND => StepKind::Into,
                    _ => StepKind::Out,
                };
                engine.step(kind)?;
                MiResult::Running
            }
            BREAK_INSERT_COMMAND => {
                // options such as `-f` (pending) are accepted and ignored
                let location = cmd
                    .args
                    .iter()
                    .find(|arg| !arg.starts_with('-'))
                    .ok_or_else(|| anyhow!("Missing breakpoint location"))?;
                let (file, line) = location
                    .rsplit_once(':')
                    .and_then(|(file, line)| Some((file, line.parse::<u32>().ok()?)))
                    .ok_or_else(|| anyhow!("Unknown breakpoint location format: {location}"))?;

                let bp = self.breakpoints.insert(engine, file, line)?;
                MiResult::Done(Some(format!("bkpt={}", bkpt_tuple(&bp))))
            }
            BREAK_DELETE_COMMAND => {
                if cmd.args.is_empty() {
                    bail!("Missing breakpoint number");
                }
                for arg in &cmd.args {
                    let id: u32 = arg
                        .parse()
                        .with_context(|| format!("Invalid breakpoint number: {arg}"))?;
                    self.breakpoints.remove(engine, id)?;
                }
                MiResult::Done(None)
            }
            BREAK_LIST_COMMAND => {
                let list = self.breakpoints.list();
                MiResult::Done(Some(format!(
                    "BreakpointTable={{nr_rows=\"{}\",body=[{}]}}",
                    list.len(),
                    list.iter()
                        .map(|bp| format!("bkpt={}", bkpt_tuple(bp)))
                        .join(",")
                )))
            }
            THREAD_INFO_COMMAND => {
                let threads = engine.threads()?;
                MiResult::Done(Some(format!(
                    "threads=[{}]",
                    threads.iter().map(thread_tuple).join(",")
                )))
            }
            GDB_EXIT_COMMAND => {
                engine.disconnect(true)?;
                MiResult::Exit
            }
            unknown => bail!("Unknown command: {unknown}"),
        };
        Ok(result)
    }

    fn write_prompt(&self) -> anyhow::Result<()> {
        self.out.write_record(format!("{MI_PROMPT}\n").as_bytes())?;
        Ok(())
    }

    /// Serve MI commands until `-gdb-exit` or end of input.
    pub fn command_loop(&mut self, engine: &mut dyn DebugEngine) -> anyhow::Result<()> {
        self.write_prompt()?;

        while let Some(line) = read_line(self.input.as_mut())? {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    let lossy = String::from_utf8_lossy(e.as_bytes()).into_owned();
                    let token = token_prefix(&lossy);
                    let msg = quote(&format!("invalid input: {}", e.utf8_error()));
                    self.out
                        .write_record(format!("{token}^error,msg={msg}\n{MI_PROMPT}\n").as_bytes())?;
                    continue;
                }
            };
            if line.trim().is_empty() {
                self.write_prompt()?;
                continue;
            }
            log::debug!(target: "protocol", "mi <- {line}");

            let (token, result) = match MiCommand::parse(&line) {
                Ok(cmd) => (
                    cmd.token.map(|t| t.to_string()).unwrap_or_default(),
                    self.handle(engine, cmd),
                ),
                Err(e) => (token_prefix(&line).to_string(), Err(e)),
            };

            let record = match result {
                Ok(MiResult::Done(None)) => format!("{token}^done\n{MI_PROMPT}\n"),
                Ok(MiResult::Done(Some(results))) => {
                    format!("{token}^done,{results}\n{MI_PROMPT}\n")
                }
                Ok(MiResult::Running) => format!("{token}^running\n{MI_PROMPT}\n"),
                Ok(MiResult::Exit) => {
                    self.out.write_record(format!("{token}^exit\n").as_bytes())?;
                    return Ok(());
                }
                Err(e) => format!(
                    "{token}^error,msg={}\n{MI_PROMPT}\n",
                    quote(&format!("{e:#}"))
                ),
            };
            self.out.write_record(record.as_bytes())?;
        }

        Ok(())
    }
}
