use crate::common::{io_with_input, MockEngine, SharedBuf};
use dbgfront::config::{ConfigError, EngineLogging, InterpreterMode, SessionConfig};
use dbgfront::engine::DebugEngine;
use dbgfront::protocol::dap::transport::read_message;
use dbgfront::protocol::DapProtocol;
use dbgfront::session::{Session, SessionError, SessionState};
use serde_json::{json, Value};
use serial_test::serial;
use std::io::Cursor;

fn frame(body: &str) -> String {
    format!("Content-Length: {}\r\n\r\n{body}", body.len())
}

fn requests(requests: &[Value]) -> String {
    requests
        .iter()
        .enumerate()
        .map(|(i, req)| {
            let mut req = req.clone();
            req["seq"] = json!(i + 1);
            req["type"] = json!("request");
            frame(&req.to_string())
        })
        .collect()
}

fn messages(out: &SharedBuf) -> Vec<Value> {
    let mut reader = Cursor::new(out.bytes());
    let mut messages = vec![];
    while let Some(message) = read_message(&mut reader).unwrap() {
        messages.push(message);
    }
    messages
}

fn response<'a>(messages: &'a [Value], command: &str) -> &'a Value {
    messages
        .iter()
        .find(|m| m["type"] == "response" && m["command"] == command)
        .unwrap_or_else(|| panic!("no `{command}` response in {messages:?}"))
}

fn event_position(messages: &[Value], event: &str) -> usize {
    messages
        .iter()
        .position(|m| m["type"] == "event" && m["event"] == event)
        .unwrap_or_else(|| panic!("no `{event}` event in {messages:?}"))
}

#[test]
fn test_launch_flow() {
    let input = requests(&[
        json!({"command": "initialize", "arguments": {"adapterID": "dbgfront"}}),
        json!({"command": "setBreakpoints", "arguments": {
            "source": {"path": "/src/main.rs"},
            "breakpoints": [{"line": 4}, {"line": 10}],
        }}),
        json!({"command": "launch", "arguments": {"program": "/bin/app", "args": ["-v"]}}),
        json!({"command": "configurationDone"}),
        json!({"command": "threads"}),
        json!({"command": "disconnect", "arguments": {"terminateDebuggee": false}}),
        json!({"command": "threads"}),
    ]);
    let (io, out) = io_with_input(&input);
    let mut dap = DapProtocol::new(io);
    let mut engine = MockEngine::default();
    engine.bind_sink(dap.sink());
    dap.command_loop(&mut engine).unwrap();

    let messages = messages(&out);

    let seqs: Vec<i64> = messages.iter().map(|m| m["seq"].as_i64().unwrap()).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]), "{seqs:?}");

    let initialize = response(&messages, "initialize");
    assert_eq!(initialize["success"], true);
    assert_eq!(initialize["request_seq"], 1);
    assert_eq!(initialize["body"]["supportsConfigurationDoneRequest"], true);
    assert_eq!(messages[1]["event"], "initialized");

    let bps = &response(&messages, "setBreakpoints")["body"]["breakpoints"];
    assert_eq!(bps[0]["line"], 4);
    assert_eq!(bps[1]["line"], 10);
    assert_eq!(bps[1]["verified"], true);
    assert_eq!(bps[1]["source"]["path"], "/src/main.rs");

    let output = &messages[event_position(&messages, "output")];
    assert_eq!(output["body"], json!({"category": "stdout", "output": "hello"}));
    assert!(event_position(&messages, "process") < event_position(&messages, "output"));
    assert!(event_position(&messages, "output") < event_position(&messages, "exited"));
    assert!(event_position(&messages, "exited") < event_position(&messages, "terminated"));

    let threads = &response(&messages, "threads")["body"]["threads"];
    assert_eq!(threads, &json!([{"id": 1, "name": "main"}]));

    // nothing is served after disconnect
    let last = messages.last().unwrap();
    assert_eq!(last["command"], "disconnect");
    assert_eq!(last["success"], true);
    assert_eq!(
        messages
            .iter()
            .filter(|m| m["command"] == "threads")
            .count(),
        1
    );

    assert_eq!(
        engine.launched,
        Some(("/bin/app".to_string(), vec!["-v".to_string()]))
    );
    assert!(engine.was_called("disconnect(false)"));
}

#[test]
fn test_launch_override() {
    let input = requests(&[
        json!({"command": "launch", "arguments": {"program": "/bin/client", "args": ["c"]}}),
    ]);
    let (io, _) = io_with_input(&input);
    let mut dap = DapProtocol::new(io);
    dap.override_launch_command("/bin/override".to_string(), vec!["x".to_string()]);
    let mut engine = MockEngine::default();
    dap.command_loop(&mut engine).unwrap();

    assert_eq!(
        engine.launched,
        Some(("/bin/override".to_string(), vec!["x".to_string()]))
    );
}

#[test]
fn test_attach_and_disconnect_defaults() {
    let input = requests(&[
        json!({"command": "attach", "arguments": {"processId": "77"}}),
        json!({"command": "next"}),
        json!({"command": "disconnect"}),
    ]);
    let (io, out) = io_with_input(&input);
    let mut dap = DapProtocol::new(io);
    let mut engine = MockEngine::default();
    engine.bind_sink(dap.sink());
    dap.command_loop(&mut engine).unwrap();

    assert_eq!(
        engine.calls,
        [
            "bind_sink",
            "initialize",
            "attach",
            "step",
            "Over",
            "disconnect(true)"
        ]
    );
    let messages = messages(&out);
    let stopped = &messages[event_position(&messages, "stopped")];
    assert_eq!(stopped["body"]["reason"], "step");
    assert_eq!(stopped["body"]["threadId"], 1);
}

#[test]
fn test_errors_are_responses() {
    let mut input = frame("{not json");
    input.push_str(&frame(r#"{"type":"request"}"#));
    input.push_str(&requests(&[
        json!({"command": "evaluate", "arguments": {"expression": "x"}}),
        json!({"command": "launch", "arguments": {}}),
        json!({"command": "threads"}),
    ]));
    let (io, out) = io_with_input(&input);
    let mut dap = DapProtocol::new(io);
    let mut engine = MockEngine::failing_on("threads");
    dap.command_loop(&mut engine).unwrap();

    let messages = messages(&out);
    assert_eq!(messages.len(), 5);
    for message in &messages {
        assert_eq!(message["type"], "response");
        assert_eq!(message["success"], false);
        assert!(message["message"].is_string());
    }
    assert_eq!(messages[0]["request_seq"], 0);
    assert_eq!(messages[1]["request_seq"], 0);
    assert_eq!(messages[2]["command"], "evaluate");
    assert_eq!(messages[2]["message"], "unsupported command `evaluate`");
    assert_eq!(messages[3]["message"], "launch request without `program`");
    assert_eq!(messages[4]["command"], "threads");
}

#[test]
#[serial]
fn test_engine_log_to_console() {
    let input = requests(&[json!({"command": "initialize"})]);
    let (io, out) = io_with_input(&input);
    let mut dap = DapProtocol::new(io);
    dap.engine_logging(EngineLogging::default()).unwrap();

    log::debug!(target: "engine", "engine diagnostics");
    log::debug!(target: "session", "not an engine record");
    dbgfront::log::LOGGER_SWITCHER.reset_engine_route();

    dap.command_loop(&mut MockEngine::default()).unwrap();

    let messages = messages(&out);
    let console: Vec<&str> = messages
        .iter()
        .filter(|m| m["event"] == "output" && m["body"]["category"] == "console")
        .filter_map(|m| m["body"]["output"].as_str())
        .collect();
    assert!(console.iter().any(|text| text.contains("engine diagnostics")));
    assert!(!console.iter().any(|text| text.contains("not an engine record")));
    assert_eq!(response(&messages, "initialize")["success"], true);
}

#[test]
#[serial]
fn test_engine_log_to_file() {
    let path = std::env::temp_dir().join(format!("dbgfront-engine-{}.log", std::process::id()));
    _ = std::fs::remove_file(&path);

    let config = SessionConfig {
        server_port: Some(47342),
        engine_logging: Some(EngineLogging {
            path: Some(path.clone()),
        }),
        ..SessionConfig::new(InterpreterMode::Dap)
    };
    let input = requests(&[json!({"command": "disconnect"})]);
    let (io, _) = io_with_input(&input);
    let mut session = Session::new(config, MockEngine::default());
    session.run(io).unwrap();

    assert!(path.exists());
    assert!(session.history().contains(&SessionState::RedirectActive));
    _ = std::fs::remove_file(&path);
}

#[test]
#[serial]
fn test_engine_log_file_error() {
    let config = SessionConfig {
        server_port: Some(47343),
        engine_logging: Some(EngineLogging {
            path: Some("/nonexistent-dir/engine.log".into()),
        }),
        ..SessionConfig::new(InterpreterMode::Dap)
    };
    let (io, _) = io_with_input("");
    let mut session = Session::new(config, MockEngine::default());

    let err = session.run(io).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Config(ConfigError::EngineLogFile { .. })
    ));
    assert!(!session.history().contains(&SessionState::EngineBound));
    assert!(session.engine().calls.iter().all(|c| c == "release"));
}
