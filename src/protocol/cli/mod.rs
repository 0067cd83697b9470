//! Interactive command line front end.

mod editor;
pub mod parser;

use crate::config::LaunchCommand;
use crate::engine::{Breakpoint, DebugEngine, EngineEvent, StepKind};
use crate::protocol::{
    read_line, BreakpointBook, CommandInput, ProtocolIo, ProtocolSink, SharedWriter,
};
use anyhow::anyhow;
use parser::CliCommand;
use rustyline::error::ReadlineError;
use rustyline::history::MemHistory;
use rustyline::{Editor, ExternalPrinter};
use std::io::{self, BufRead};
use std::sync::{Arc, Mutex};

pub const CLI_PROMPT: &str = "cli> ";

const HELP: &[(&str, &str)] = &[
    ("file", "file <path> [args..]  -- set program to run and its arguments"),
    ("run", "run, r                -- start the program"),
    ("attach", "attach <pid>          -- attach to a running process"),
    ("continue", "continue, c           -- resume execution"),
    ("next", "next, n               -- step over"),
    ("step", "step, s               -- step into"),
    ("finish", "finish                -- step out of the current function"),
    ("interrupt", "interrupt, pause      -- stop the running program"),
    (
        "break",
        "break, b <file>:<line> -- set breakpoint\n\
         break remove <n>      -- remove breakpoint by number\n\
         break info            -- list breakpoints",
    ),
    ("thread", "thread info           -- list threads"),
    ("help", "help, h [command]     -- show help"),
    ("quit", "quit, q               -- end the session"),
];

fn help_text(command: Option<&str>) -> anyhow::Result<String> {
    match command {
        None => Ok(HELP.iter().map(|(_, text)| *text).collect::<Vec<_>>().join("\n")),
        Some(name) => HELP
            .iter()
            .find(|(cmd, _)| *cmd == name)
            .map(|(_, text)| text.to_string())
            .ok_or_else(|| anyhow!("unknown command `{name}`, type help for list of commands")),
    }
}

fn breakpoint_line(bp: &Breakpoint) -> String {
    let mut line = format!("Breakpoint {} at {}:{}", bp.id, bp.file, bp.line);
    if !bp.verified {
        line.push_str(" (pending)");
    }
    line
}

/// Human readable text of an engine event.
pub fn event_text(event: &EngineEvent) -> String {
    match event {
        EngineEvent::ProcessStarted { pid, name } => format!("Process {name} started, pid {pid}\n"),
        EngineEvent::Stopped { reason, thread_id } => match thread_id {
            Some(id) => format!("Stopped at {reason}, thread {id}\n"),
            None => format!("Stopped at {reason}\n"),
        },
        EngineEvent::Continued { .. } => "Running\n".to_string(),
        EngineEvent::BreakpointChanged(bp) => format!("{} changed\n", breakpoint_line(bp)),
        EngineEvent::Output(output) => output.text.clone(),
        EngineEvent::Exited { code } => format!("Process exited with code {code}\n"),
        EngineEvent::Terminated => "Debugee terminated\n".to_string(),
    }
}

enum EventOutput {
    Writer(SharedWriter),
    /// Prints above the line being edited.
    Printer(Mutex<Box<dyn ExternalPrinter + Send>>),
}

pub struct CliEmitter {
    out: EventOutput,
}

impl CliEmitter {
    pub fn new(out: SharedWriter) -> Self {
        Self {
            out: EventOutput::Writer(out),
        }
    }

    /// Emitter for an interactive terminal, events must not break the edited line.
    pub fn with_printer(printer: Box<dyn ExternalPrinter + Send>) -> Self {
        Self {
            out: EventOutput::Printer(Mutex::new(printer)),
        }
    }
}

impl ProtocolSink for CliEmitter {
    fn emit_event(&self, event: EngineEvent) {
        let text = event_text(&event);
        match &self.out {
            EventOutput::Writer(out) => out.write_record_or_log(text.as_bytes()),
            EventOutput::Printer(printer) => {
                if let Err(e) = printer.lock().unwrap().print(text) {
                    eprintln!("protocol output error: {e}");
                }
            }
        }
    }
}

enum LineSource {
    Editor(Box<Editor<editor::CliHelper, MemHistory>>),
    Reader(Box<dyn BufRead + Send>),
}

enum Reply {
    Text(String),
    Silent,
    Quit,
}

pub struct CliProtocol {
    lines: LineSource,
    out: SharedWriter,
    emitter: Arc<CliEmitter>,
    preset: Option<LaunchCommand>,
    launch: Option<LaunchCommand>,
    breakpoints: BreakpointBook,
}

impl CliProtocol {
    pub fn new(io: ProtocolIo) -> anyhow::Result<Self> {
        let (lines, emitter) = match io.input {
            CommandInput::Terminal => {
                let mut editor = editor::create_editor()?;
                let printer = editor.create_external_printer()?;
                (
                    LineSource::Editor(Box::new(editor)),
                    CliEmitter::with_printer(Box::new(printer)),
                )
            }
            CommandInput::Reader(reader) => {
                (LineSource::Reader(reader), CliEmitter::new(io.output.clone()))
            }
        };
        Ok(Self {
            lines,
            emitter: Arc::new(emitter),
            out: io.output,
            preset: None,
            launch: None,
            breakpoints: BreakpointBook::default(),
        })
    }

    pub fn sink(&self) -> Arc<dyn ProtocolSink> {
        self.emitter.clone()
    }

    /// Default program for `run`, replaced by the `file` command.
    pub fn set_launch_command(&mut self, program: String, args: Vec<String>) {
        self.preset = Some(LaunchCommand { program, args });
    }

    /// Next user line, the inner error is a line that can not be decoded.
    fn next_line(&mut self) -> anyhow::Result<Option<anyhow::Result<String>>> {
        match &mut self.lines {
            LineSource::Editor(editor) => match editor.readline(CLI_PROMPT) {
                Ok(line) => {
                    _ = editor.add_history_entry(&line);
                    Ok(Some(Ok(line)))
                }
                Err(ReadlineError::Eof | ReadlineError::Interrupted) => Ok(None),
                Err(ReadlineError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                    Ok(Some(Err(anyhow!("invalid input: {e}"))))
                }
                Err(e) => Err(e.into()),
            },
            LineSource::Reader(reader) => {
                self.out.write_record(CLI_PROMPT.as_bytes())?;
                let line = read_line(reader.as_mut())?;
                Ok(line.map(|line| line.map_err(|e| anyhow!("invalid input: {e}"))))
            }
        }
    }

    fn handle(&mut self, engine: &mut dyn DebugEngine, cmd: CliCommand) -> anyhow::Result<Reply> {
        let reply = match cmd {
            CliCommand::File { program, args } => {
                let text = format!("Program set to {program}");
                self.launch = Some(LaunchCommand { program, args });
                Reply::Text(text)
            }
            CliCommand::Run => {
                let target = self
                    .launch
                    .as_ref()
                    .or(self.preset.as_ref())
                    .ok_or_else(|| anyhow!("no program to run, use `file <path>`"))?;
                engine.launch(&target.program, &target.args)?;
                engine.configuration_done()?;
                Reply::Silent
            }
            CliCommand::Attach(pid) => {
                engine.initialize()?;
                engine.attach(pid)?;
                engine.configuration_done()?;
                Reply::Text(format!("Attached to process {pid}"))
            }
            CliCommand::Continue => {
                engine.resume()?;
                Reply::Silent
            }
            CliCommand::Next => {
                engine.step(StepKind::Over)?;
                Reply::Silent
            }
            CliCommand::Step => {
                engine.step(StepKind::Into)?;
                Reply::Silent
            }
            CliCommand::Finish => {
                engine.step(StepKind::Out)?;
                Reply::Silent
            }
            CliCommand::Interrupt => {
                engine.pause()?;
                Reply::Silent
            }
            CliCommand::BreakAdd { file, line } => {
                let bp = self.breakpoints.insert(engine, &file, line)?;
                Reply::Text(breakpoint_line(&bp))
            }
            CliCommand::BreakRemove(id) => {
                let bp = self.breakpoints.remove(engine, id)?;
                Reply::Text(format!("Removed breakpoint {} at {}:{}", bp.id, bp.file, bp.line))
            }
            CliCommand::BreakInfo => {
                let list = self.breakpoints.list();
                if list.is_empty() {
                    Reply::Text("No breakpoints".to_string())
                } else {
                    Reply::Text(list.iter().map(breakpoint_line).collect::<Vec<_>>().join("\n"))
                }
            }
            CliCommand::ThreadInfo => {
                let threads = engine.threads()?;
                let text = threads
                    .iter()
                    .map(|t| {
                        let state = if t.running { "running" } else { "stopped" };
                        format!("#{} {} [{state}]", t.id, t.name)
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                Reply::Text(text)
            }
            CliCommand::Help(command) => Reply::Text(help_text(command.as_deref())?),
            CliCommand::Quit => {
                engine.disconnect(true)?;
                Reply::Quit
            }
        };
        Ok(reply)
    }

    /// Serve user commands until `quit` or end of input.
    pub fn command_loop(&mut self, engine: &mut dyn DebugEngine) -> anyhow::Result<()> {
        while let Some(line) = self.next_line()? {
            let result = match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    log::debug!(target: "protocol", "cli <- {line}");
                    CliCommand::parse(&line).and_then(|cmd| self.handle(engine, cmd))
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(Reply::Text(text)) => self.out.write_record(format!("{text}\n").as_bytes())?,
                Ok(Reply::Silent) => {}
                Ok(Reply::Quit) => return Ok(()),
                Err(e) => self.out.write_record(format!("Error: {e:#}\n").as_bytes())?,
            }
        }
        Ok(())
    }
}
