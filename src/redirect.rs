//! TCP mirror of the debugee standard streams.
//!
//! The server owns two OS pipes. Their write ends are handed to the engine, which copies
//! the debugee stdout and stderr into them. Every chunk read from a pipe is published to
//! the protocol sink as an [`OutputEvent`] and copied as is to the connected TCP client.

use crate::config::DEFAULT_SERVER_PORT;
use crate::engine::{OutputChannel, OutputEvent};
use crate::protocol::ProtocolSink;
use log::{debug, error, info, trace, warn};
use os_pipe::{PipeReader, PipeWriter};
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const LOG_TARGET: &str = "redirect";
const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum RedirectError {
    #[error("bind redirect server on port {port}: {source}")]
    Bind { port: u16, source: io::Error },
    #[error("create capture pipe: {0}")]
    Pipe(io::Error),
    #[error("spawn redirect thread: {0}")]
    Spawn(io::Error),
    #[error("accept redirect client: {0}")]
    Accept(io::Error),
}

#[derive(Default)]
struct Progress {
    written: [u64; 2],
    delivered: [u64; 2],
}

/// Bytes written to and forwarded from the capture pipes.
#[derive(Default)]
struct Delivery {
    progress: Mutex<Progress>,
    changed: Condvar,
}

fn channel_index(channel: OutputChannel) -> usize {
    match channel {
        OutputChannel::StdOut => 0,
        OutputChannel::StdErr => 1,
    }
}

impl Delivery {
    fn delivered(&self, channel: OutputChannel, len: usize) {
        self.progress.lock().unwrap().delivered[channel_index(channel)] += len as u64;
        self.changed.notify_all();
    }
}

/// Write ends of the capture pipes, used for debugee stdout and stderr.
pub struct DebugeeStreams {
    stdout: PipeWriter,
    stderr: PipeWriter,
    delivery: Arc<Delivery>,
}

impl DebugeeStreams {
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            stdout: self.stdout.try_clone()?,
            stderr: self.stderr.try_clone()?,
            delivery: self.delivery.clone(),
        })
    }

    /// Write a chunk of debugee output into the capture pipe of `channel`.
    pub fn write_chunk(&self, channel: OutputChannel, chunk: &[u8]) -> io::Result<()> {
        let mut writer = match channel {
            OutputChannel::StdOut => &self.stdout,
            OutputChannel::StdErr => &self.stderr,
        };
        writer.write_all(chunk)?;
        self.delivery.progress.lock().unwrap().written[channel_index(channel)] +=
            chunk.len() as u64;
        Ok(())
    }

    /// Block until everything written with [`DebugeeStreams::write_chunk`] has been
    /// published, return false on timeout.
    pub fn wait_delivered(&self, timeout: Duration) -> bool {
        let progress = self.delivery.progress.lock().unwrap();
        let (_progress, result) = self
            .delivery
            .changed
            .wait_timeout_while(progress, timeout, |p| {
                p.delivered.iter().zip(p.written).any(|(&d, w)| d < w)
            })
            .unwrap();
        !result.timed_out()
    }
}

/// Read `reader` until EOF, passing every chunk to `on_chunk`.
pub fn pump_chunks(mut reader: impl Read, mut on_chunk: impl FnMut(&[u8])) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => on_chunk(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(target: LOG_TARGET, "stream read: {e}");
                return;
            }
        }
    }
}

/// Decode a byte stream into text without splitting multibyte characters across chunks.
#[derive(Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode every complete character, an incomplete trailing sequence waits for the
    /// next chunk. Invalid sequences become U+FFFD.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut text = String::new();
        let mut rest = self.pending.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        let consumed = self.pending.len() - rest.len();
        self.pending.drain(..consumed);
        text
    }

    /// Flush an incomplete sequence left at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(text)
    }
}

type Client = Arc<Mutex<Option<TcpStream>>>;

fn forward(
    channel: OutputChannel,
    reader: PipeReader,
    sink: Arc<dyn ProtocolSink>,
    client: Client,
    delivery: Arc<Delivery>,
) {
    let mut decoder = Utf8Decoder::default();
    pump_chunks(reader, |chunk| {
        let text = decoder.decode(chunk);
        if !text.is_empty() {
            sink.emit_output_event(OutputEvent::new(channel, text));
        }

        let mut client = client.lock().unwrap();
        if let Some(stream) = client.as_mut() {
            if let Err(e) = stream.write_all(chunk).and_then(|_| stream.flush()) {
                warn!(target: LOG_TARGET, "redirect client dropped: {e}");
                if let Some(stream) = client.take() {
                    _ = stream.shutdown(Shutdown::Both);
                }
            }
        }
        drop(client);
        delivery.delivered(channel, chunk.len());
    });
    if let Some(text) = decoder.finish() {
        sink.emit_output_event(OutputEvent::new(channel, text));
    }
    debug!(target: LOG_TARGET, "{channel:?} capture closed");
}

/// Accept errors caused by a single connection, the listener itself stays usable.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

fn prepare_client(stream: &TcpStream) -> io::Result<TcpStream> {
    let reader = stream.try_clone()?;
    // a stalled client must not block the forwarders for long
    stream.set_write_timeout(Some(CLIENT_WRITE_TIMEOUT))?;
    Ok(reader)
}

/// Serve clients one at a time until shutdown.
fn accept_loop(listener: TcpListener, shutdown: Arc<AtomicBool>, client: Client) -> io::Result<()> {
    for stream in listener.incoming() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) if is_transient(&e) => {
                warn!(target: LOG_TARGET, "accept redirect client: {e}");
                continue;
            }
            Err(e) => {
                error!(target: LOG_TARGET, "redirect server stops accepting clients: {e}");
                return Err(e);
            }
        };
        let peer = stream.peer_addr().ok();
        let mut reader = match prepare_client(&stream) {
            Ok(reader) => reader,
            Err(e) => {
                warn!(target: LOG_TARGET, "drop redirect client {peer:?}: {e}");
                continue;
            }
        };

        {
            // shutdown flag and client slot change together, see `stop`
            let mut current = client.lock().unwrap();
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            *current = Some(stream);
        }
        info!(target: LOG_TARGET, "client connected: {peer:?}");

        // client input is not part of the protocol
        pump_chunks(&mut reader, |chunk| {
            trace!(target: LOG_TARGET, "ignore {} bytes from client", chunk.len());
        });

        client.lock().unwrap().take();
        info!(target: LOG_TARGET, "client disconnected: {peer:?}");
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
    }
    Ok(())
}

pub struct StreamRedirectServer {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    client: Client,
    streams: Option<DebugeeStreams>,
    accept_thread: Option<JoinHandle<io::Result<()>>>,
}

impl StreamRedirectServer {
    /// Bind `0.0.0.0:port` (port 0 means [`DEFAULT_SERVER_PORT`]) and start serving.
    pub fn start(port: u16, sink: Arc<dyn ProtocolSink>) -> Result<Self, RedirectError> {
        let port = if port == 0 { DEFAULT_SERVER_PORT } else { port };
        let bind_err = |source| RedirectError::Bind { port, source };
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let (stdout_reader, stdout) = os_pipe::pipe().map_err(RedirectError::Pipe)?;
        let (stderr_reader, stderr) = os_pipe::pipe().map_err(RedirectError::Pipe)?;

        let client: Client = Arc::default();
        let delivery: Arc<Delivery> = Arc::default();
        let shutdown = Arc::new(AtomicBool::new(false));

        // forwarders end by themselves once every write end is closed
        for (channel, reader) in [
            (OutputChannel::StdOut, stdout_reader),
            (OutputChannel::StdErr, stderr_reader),
        ] {
            let sink = sink.clone();
            let client = client.clone();
            let delivery = delivery.clone();
            thread::Builder::new()
                .name(format!("redirect-{channel:?}").to_lowercase())
                .spawn(move || forward(channel, reader, sink, client, delivery))
                .map_err(RedirectError::Spawn)?;
        }

        let accept_thread = {
            let shutdown = shutdown.clone();
            let client = client.clone();
            thread::Builder::new()
                .name("redirect-accept".to_string())
                .spawn(move || accept_loop(listener, shutdown, client))
                .map_err(RedirectError::Spawn)?
        };

        info!(target: LOG_TARGET, "redirect server listening on {local_addr}");
        Ok(Self {
            local_addr,
            shutdown,
            client,
            streams: Some(DebugeeStreams {
                stdout,
                stderr,
                delivery,
            }),
            accept_thread: Some(accept_thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Hand over the capture pipe write ends, `None` if already taken.
    pub fn take_streams(&mut self) -> Option<DebugeeStreams> {
        self.streams.take()
    }

    pub fn is_client_connected(&self) -> bool {
        self.client.lock().unwrap().is_some()
    }

    /// Stop accepting, drop the current client and close the listener.
    ///
    /// Return an error if the accept loop failed during the session.
    pub fn stop(&mut self) -> Result<(), RedirectError> {
        let Some(accept_thread) = self.accept_thread.take() else {
            return Ok(());
        };
        self.streams = None;

        {
            let client = self.client.lock().unwrap();
            self.shutdown.store(true, Ordering::SeqCst);
            if let Some(stream) = client.as_ref() {
                _ = stream.shutdown(Shutdown::Both);
            }
        }
        // wake up a blocking accept
        _ = TcpStream::connect((Ipv4Addr::LOCALHOST, self.local_addr.port()));

        let result = match accept_thread.join() {
            Ok(result) => result.map_err(RedirectError::Accept),
            Err(_) => Err(RedirectError::Accept(io::Error::other(
                "redirect accept thread panicked",
            ))),
        };
        info!(target: LOG_TARGET, "redirect server on {} stopped", self.local_addr);
        result
    }
}

impl Drop for StreamRedirectServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(target: LOG_TARGET, "{e}");
        }
    }
}
