use dbgfront::engine::{
    Breakpoint, DebugEngine, EngineError, EngineEvent, EngineResult, OutputChannel, OutputEvent,
    StepKind, StopReason, ThreadInfo,
};
use dbgfront::protocol::{CommandInput, ProtocolIo, ProtocolSink, SharedWriter};
use dbgfront::redirect::DebugeeStreams;
use std::collections::VecDeque;
use std::io::{self, BufReader, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const MOCK_PID: u32 = 42;

/// In-memory protocol output shared with the test.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }

    /// Wait until the output contains `pattern`.
    pub fn wait_for(&self, pattern: &str) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !self.contents().contains(pattern) {
            assert!(
                Instant::now() < deadline,
                "`{pattern}` not found in output:\n{}",
                self.contents()
            );
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub enum Step {
    Send(String),
    SendBytes(Vec<u8>),
    WaitFor(String),
}

/// Client input that can wait for protocol output before sending the next command.
pub struct ScriptedInput {
    steps: VecDeque<Step>,
    pending: Vec<u8>,
    out: SharedBuf,
}

impl Read for ScriptedInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pending.is_empty() {
            match self.steps.pop_front() {
                None => return Ok(0),
                Some(Step::Send(data)) => self.pending = data.into_bytes(),
                Some(Step::SendBytes(data)) => self.pending = data,
                Some(Step::WaitFor(pattern)) => self.out.wait_for(&pattern),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// Protocol channels reading `input` and writing into a shared buffer.
pub fn io_with_input(input: &str) -> (ProtocolIo, SharedBuf) {
    scripted_io(vec![Step::Send(input.to_string())])
}

/// Same as [`io_with_input`] but input may be any bytes.
pub fn io_with_bytes(input: &[u8]) -> (ProtocolIo, SharedBuf) {
    scripted_io(vec![Step::SendBytes(input.to_vec())])
}

pub fn scripted_io(steps: Vec<Step>) -> (ProtocolIo, SharedBuf) {
    let out = SharedBuf::default();
    let input = ScriptedInput {
        steps: steps.into(),
        pending: vec![],
        out: out.clone(),
    };
    let io = ProtocolIo::new(
        CommandInput::reader(BufReader::new(input)),
        SharedWriter::new(out.clone()),
    );
    (io, out)
}

/// Engine double, records every call and can fail a chosen one.
#[derive(Default)]
pub struct MockEngine {
    pub calls: Vec<String>,
    pub fail_on: Option<&'static str>,
    pub launched: Option<(String, Vec<String>)>,
    sink: Option<Arc<dyn ProtocolSink>>,
    streams: Option<DebugeeStreams>,
    breakpoints: Vec<Breakpoint>,
    pending: bool,
}

impl MockEngine {
    pub fn failing_on(call: &'static str) -> Self {
        Self {
            fail_on: Some(call),
            ..Default::default()
        }
    }

    pub fn was_called(&self, call: &str) -> bool {
        self.calls.iter().any(|c| c == call)
    }

    fn call(&mut self, name: &'static str) -> EngineResult<()> {
        self.calls.push(name.to_string());
        if self.fail_on == Some(name) {
            return Err(EngineError::Unsupported(name));
        }
        Ok(())
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(sink) = &self.sink {
            sink.emit_event(event);
        }
    }

    /// Play a short debugee life: start, print `hello`, exit with 0.
    fn run_debugee(&self) {
        let (program, _) = self.launched.clone().unwrap_or_default();
        let name = program.rsplit('/').next().unwrap_or_default().to_string();
        self.emit(EngineEvent::ProcessStarted {
            pid: MOCK_PID,
            name,
        });
        match &self.streams {
            Some(streams) => {
                streams.write_chunk(OutputChannel::StdOut, b"hello").unwrap();
                assert!(streams.wait_delivered(Duration::from_secs(5)));
            }
            None => {
                if let Some(sink) = &self.sink {
                    sink.emit_output_event(OutputEvent::stdout("hello"));
                }
            }
        }
        self.emit(EngineEvent::Exited { code: 0 });
        self.emit(EngineEvent::Terminated);
    }
}

impl DebugEngine for MockEngine {
    fn bind_sink(&mut self, sink: Arc<dyn ProtocolSink>) {
        self.calls.push("bind_sink".to_string());
        self.sink = Some(sink);
    }

    fn redirect_output(&mut self, streams: DebugeeStreams) {
        self.calls.push("redirect_output".to_string());
        self.streams = Some(streams);
    }

    fn initialize(&mut self) -> EngineResult<()> {
        self.call("initialize")
    }

    fn attach(&mut self, pid: u32) -> EngineResult<()> {
        self.calls.push("attach".to_string());
        if self.fail_on == Some("attach") {
            return Err(EngineError::ProcessNotFound(pid));
        }
        Ok(())
    }

    fn configuration_done(&mut self) -> EngineResult<()> {
        self.call("configuration_done")?;
        if std::mem::take(&mut self.pending) {
            self.run_debugee();
        }
        Ok(())
    }

    fn launch(&mut self, program: &str, args: &[String]) -> EngineResult<()> {
        self.call("launch")?;
        self.launched = Some((program.to_string(), args.to_vec()));
        self.pending = true;
        Ok(())
    }

    fn set_breakpoints(&mut self, file: &str, lines: &[u32]) -> EngineResult<Vec<Breakpoint>> {
        self.call("set_breakpoints")?;
        let mut next_id = self.breakpoints.iter().map(|bp| bp.id).max().unwrap_or(0);
        let (old, other): (Vec<_>, Vec<_>) =
            self.breakpoints.drain(..).partition(|bp| bp.file == file);
        self.breakpoints = other;

        let mut result = vec![];
        for &line in lines {
            let id = match old.iter().find(|bp| bp.line == line) {
                Some(bp) => bp.id,
                None => {
                    next_id += 1;
                    next_id
                }
            };
            result.push(Breakpoint {
                id,
                verified: true,
                file: file.to_string(),
                line,
                message: None,
            });
        }
        self.breakpoints.extend(result.clone());
        Ok(result)
    }

    fn threads(&mut self) -> EngineResult<Vec<ThreadInfo>> {
        self.call("threads")?;
        Ok(vec![ThreadInfo {
            id: 1,
            name: "main".to_string(),
            running: false,
        }])
    }

    fn resume(&mut self) -> EngineResult<()> {
        self.call("resume")?;
        self.emit(EngineEvent::Continued { thread_id: None });
        Ok(())
    }

    fn pause(&mut self) -> EngineResult<()> {
        self.call("pause")?;
        self.emit(EngineEvent::Stopped {
            reason: StopReason::Pause,
            thread_id: Some(1),
        });
        Ok(())
    }

    fn step(&mut self, kind: StepKind) -> EngineResult<()> {
        self.call("step")?;
        self.calls.push(format!("{kind:?}"));
        self.emit(EngineEvent::Stopped {
            reason: StopReason::Step,
            thread_id: Some(1),
        });
        Ok(())
    }

    fn disconnect(&mut self, terminate: bool) -> EngineResult<()> {
        self.calls.push(format!("disconnect({terminate})"));
        Ok(())
    }

    fn release(&mut self) {
        self.calls.push("release".to_string());
        self.streams = None;
        self.sink = None;
    }
}
