use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use dbgfront::config::{EngineLogging, InterpreterMode, LaunchCommand, SessionConfig};
use dbgfront::engine::ProcessEngine;
use dbgfront::protocol::ProtocolIo;
use dbgfront::session::Session;
use env_logger::Env;
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Protocol spoken over stdin/stdout: mi, vscode (or dap), cli
    #[clap(long, default_value = "mi")]
    interpreter: InterpreterMode,

    /// Attach to a running process right after startup
    #[clap(long, value_name = "PID")]
    attach: Option<u32>,

    /// Port of the debugee output mirror (default: 4711)
    #[clap(
        long,
        value_name = "PORT",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "0"
    )]
    server: Option<u16>,

    /// Send engine log to the client console, or to PATH if given (vscode interpreter only)
    #[clap(
        long,
        value_name = "PATH",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = ""
    )]
    engine_logging: Option<String>,

    /// Write own log to PATH (default: <tmpdir>/dbgfront.<pid>.log)
    #[clap(
        long,
        value_name = "PATH",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = ""
    )]
    log: Option<String>,

    /// Print build information and exit
    #[clap(long)]
    buildinfo: bool,

    /// Program to launch and its arguments
    #[clap(last = true, value_name = "PROGRAM")]
    program: Vec<String>,
}

/// Optional path argument, given without a value means "default location".
fn non_empty(path: String) -> Option<PathBuf> {
    (!path.is_empty()).then(|| PathBuf::from(path))
}

impl Args {
    fn into_config(self) -> SessionConfig {
        let mut program = self.program.into_iter();
        SessionConfig {
            mode: self.interpreter,
            engine_logging: self.engine_logging.map(|path| EngineLogging {
                path: non_empty(path),
            }),
            server_port: self.server,
            launch: program.next().map(|name| LaunchCommand {
                program: name,
                args: program.collect(),
            }),
            attach_pid: self.attach,
        }
    }
}

fn init_logger(log: Option<String>) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("warn"));
    if let Some(path) = log {
        let path = non_empty(path).unwrap_or_else(|| {
            std::env::temp_dir().join(format!("dbgfront.{}.log", std::process::id()))
        });
        let file =
            File::create(&path).with_context(|| format!("create log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    let logger = builder.build();
    let filter = logger.filter();
    dbgfront::log::LOGGER_SWITCHER.switch(logger, filter);
    Ok(())
}

fn print_build_info() {
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("target: {}", env!("DBGFRONT_BUILD_TARGET"));
    println!("profile: {}", env!("DBGFRONT_BUILD_PROFILE"));
    println!(
        "os: {}, arch: {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

/// Parse command line, a `--` separator must be followed by a program.
fn parse_args() -> Args {
    let args = Args::parse();
    if args.program.is_empty() && std::env::args_os().any(|arg| arg == "--") {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "Missing program argument")
            .exit();
    }
    args
}

fn main() -> ExitCode {
    let args = parse_args();

    if args.buildinfo {
        print_build_info();
        return ExitCode::SUCCESS;
    }

    if let Err(e) = init_logger(args.log.clone()) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    let config = args.into_config();
    let interactive = config.mode == InterpreterMode::Cli && io::stdin().is_terminal();
    let mut session = Session::new(config, ProcessEngine::default());

    match session.run(ProtocolIo::stdio(interactive)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
