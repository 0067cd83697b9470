use crate::common::{io_with_bytes, io_with_input, scripted_io, MockEngine, Step};
use dbgfront::config::{InterpreterMode, LaunchCommand, SessionConfig};
use dbgfront::engine::{DebugEngine, ProcessEngine};
use dbgfront::protocol::CliProtocol;
use dbgfront::session::Session;

#[test]
fn test_command_session() {
    let input = "\
file /bin/app one two
b main.rs:4
break main.rs:9
break remove 1
break info
thread info
run
bogus
quit
help
";
    let (io, out) = io_with_input(input);
    let mut cli = CliProtocol::new(io).unwrap();
    let mut engine = MockEngine::default();
    engine.bind_sink(cli.sink());
    cli.command_loop(&mut engine).unwrap();

    let output = out.contents();
    let expected = [
        "cli> Program set to /bin/app\n",
        "cli> Breakpoint 1 at main.rs:4\n",
        "cli> Breakpoint 2 at main.rs:9\n",
        "cli> Removed breakpoint 1 at main.rs:4\n",
        "cli> Breakpoint 2 at main.rs:9\n",
        "cli> #1 main [stopped]\n",
        "cli> Process app started, pid 42\nhelloProcess exited with code 0\nDebugee terminated\n",
        "cli> Error: ",
    ];
    let mut from = 0;
    for text in expected {
        let pos = output[from..]
            .find(text)
            .unwrap_or_else(|| panic!("`{text}` not found after {from} in:\n{output}"));
        from += pos + text.len();
    }
    // commands after quit are not read
    assert!(!output.contains("step into"));

    assert_eq!(
        engine.launched,
        Some((
            "/bin/app".to_string(),
            vec!["one".to_string(), "two".to_string()]
        ))
    );
    assert!(engine.was_called("disconnect(true)"));
}

#[test]
fn test_preset_program_and_errors() {
    let (io, out) = io_with_input("run\nattach 77\nhelp jump\nb nowhere\n");
    let mut cli = CliProtocol::new(io).unwrap();
    cli.set_launch_command("/bin/preset".to_string(), vec!["p".to_string()]);
    let mut engine = MockEngine::failing_on("attach");
    cli.command_loop(&mut engine).unwrap();

    assert_eq!(
        engine.launched,
        Some(("/bin/preset".to_string(), vec!["p".to_string()]))
    );

    let output = out.contents();
    assert!(output.contains("Error: process 77 not found\n"));
    assert!(output.contains("Error: unknown command `jump`, type help for list of commands\n"));
    assert_eq!(output.matches("Error: ").count(), 3);
    // input ended without quit
    assert!(!engine.was_called("disconnect(true)"));
    assert!(output.ends_with("cli> "));
}

#[test]
fn test_run_without_program() {
    let (io, out) = io_with_input("r\n");
    let mut cli = CliProtocol::new(io).unwrap();
    let mut engine = MockEngine::default();
    cli.command_loop(&mut engine).unwrap();

    assert!(out
        .contents()
        .contains("Error: no program to run, use `file <path>`\n"));
    assert!(engine.launched.is_none());
}

#[test]
fn test_invalid_utf8_line() {
    let (io, out) = io_with_bytes(b"b main.rs:\xff\xfe\nb main.rs:3\nquit\n");
    let mut cli = CliProtocol::new(io).unwrap();
    let mut engine = MockEngine::default();
    cli.command_loop(&mut engine).unwrap();

    let output = out.contents();
    assert!(output.contains("cli> Error: invalid input: "));
    assert!(output.contains("cli> Breakpoint 1 at main.rs:3\n"));
    assert!(engine.was_called("disconnect(true)"));
}

#[test]
fn test_process_output_split_inside_character() {
    let config = SessionConfig {
        launch: Some(LaunchCommand {
            program: "/bin/sh".to_string(),
            args: vec![
                "-c".to_string(),
                "printf 'caf\\303'; sleep 0.2; printf '\\251'".to_string(),
            ],
        }),
        ..SessionConfig::new(InterpreterMode::Cli)
    };
    let (io, out) = scripted_io(vec![
        Step::Send("run\n".to_string()),
        Step::WaitFor("Process exited with code 0".to_string()),
        Step::Send("quit\n".to_string()),
    ]);
    let mut session = Session::new(config, ProcessEngine::default());
    session.run(io).unwrap();

    let output = out.contents();
    assert!(output.contains("caf"));
    assert!(output.contains('\u{e9}'), "{output}");
    assert!(!output.contains(char::REPLACEMENT_CHARACTER), "{output}");
}
