use crate::common::io_with_input;
use dbgfront::config::InterpreterMode;
use dbgfront::engine::OutputEvent;
use dbgfront::protocol::dap::transport::read_message;
use dbgfront::protocol::Protocol;
use std::io::Cursor;
use std::thread;

const THREADS: usize = 8;
const EVENTS: usize = 100;

fn payload(thread: usize, n: usize) -> String {
    format!("T{thread}-{n} {}", "x".repeat(700))
}

fn emit_concurrently(mode: InterpreterMode) -> Vec<u8> {
    let (io, out) = io_with_input("");
    let protocol = Protocol::new(mode, io).unwrap();
    let sink = protocol.sink();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let sink = sink.clone();
            thread::spawn(move || {
                for n in 0..EVENTS {
                    let text = format!("{}\n", payload(t, n));
                    let event = if n % 2 == 0 {
                        OutputEvent::stdout(text)
                    } else {
                        OutputEvent::stderr(text)
                    };
                    sink.emit_output_event(event);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    out.bytes()
}

fn assert_payload(text: &str) {
    let (id, tail) = text.split_once(' ').unwrap();
    assert!(id.starts_with('T'), "{text}");
    assert_eq!(tail, "x".repeat(700));
}

#[test]
fn test_mi_records_not_interleaved() {
    let output = String::from_utf8(emit_concurrently(InterpreterMode::Mi)).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), THREADS * EVENTS);
    for line in lines {
        let text = line
            .strip_prefix("=message,text=\"")
            .and_then(|rest| rest.split_once("\\n\""))
            .map(|(text, _)| text)
            .unwrap_or_else(|| panic!("broken record: {line}"));
        assert_payload(text);
        assert!(
            line.ends_with("send-to=\"output-window\"")
                || line.ends_with("source=\"target-stderr\"")
        );
    }
}

#[test]
fn test_dap_events_not_interleaved() {
    let mut reader = Cursor::new(emit_concurrently(InterpreterMode::Dap));
    let mut last_seq = 0;
    let mut count = 0;
    while let Some(message) = read_message(&mut reader).unwrap() {
        let seq = message["seq"].as_i64().unwrap();
        assert!(seq > last_seq);
        last_seq = seq;

        assert_eq!(message["event"], "output");
        let text = message["body"]["output"].as_str().unwrap();
        assert_payload(text.trim_end());
        count += 1;
    }
    assert_eq!(count, THREADS * EVENTS);
}

#[test]
fn test_cli_output_not_interleaved() {
    let output = String::from_utf8(emit_concurrently(InterpreterMode::Cli)).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), THREADS * EVENTS);
    for line in lines {
        assert_payload(line);
    }
}
