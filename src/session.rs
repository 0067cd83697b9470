//! Session bootstrap.
//!
//! A [`Session`] selects the protocol front end, binds the engine to it, starts the
//! redirect server, optionally attaches to a process and then hands control to the
//! front end command loop. Teardown runs on every path once the front end exists.

use crate::config::{ConfigError, SessionConfig};
use crate::engine::{DebugEngine, EngineError};
use crate::protocol::{Protocol, ProtocolIo};
use crate::redirect::{RedirectError, StreamRedirectServer};
use log::{error, info};
use strum_macros::Display;

const LOG_TARGET: &str = "session";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum SessionState {
    Unconfigured,
    VariantSelected,
    EngineBound,
    RedirectActive,
    Attaching,
    CommandLoopRunning,
    Terminated,
}

/// Step of the attach sequence.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum AttachStep {
    #[strum(serialize = "initialize")]
    Initialize,
    #[strum(serialize = "attach to")]
    Attach,
    #[strum(serialize = "configure")]
    ConfigurationDone,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Redirect(#[from] RedirectError),
    #[error("failed to {step} process {pid}: {error} [{}]", .error.code())]
    Attach {
        step: AttachStep,
        pid: u32,
        error: EngineError,
    },
    #[error("{0:#}")]
    Protocol(anyhow::Error),
}

pub struct Session<E: DebugEngine> {
    config: SessionConfig,
    engine: E,
    history: Vec<SessionState>,
}

impl<E: DebugEngine> Session<E> {
    pub fn new(config: SessionConfig, engine: E) -> Self {
        Self {
            config,
            engine,
            history: vec![SessionState::Unconfigured],
        }
    }

    pub fn state(&self) -> SessionState {
        self.history
            .last()
            .copied()
            .unwrap_or(SessionState::Unconfigured)
    }

    /// Every state the session went through, in order.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    fn enter(&mut self, state: SessionState) {
        info!(target: LOG_TARGET, "{} -> {state}", self.state());
        self.history.push(state);
    }

    /// Run the session to the end over the client channels `io`.
    pub fn run(&mut self, io: ProtocolIo) -> Result<(), SessionError> {
        self.config.validate()?;
        let mut protocol = Protocol::new(self.config.mode, io).map_err(SessionError::Protocol)?;
        self.enter(SessionState::VariantSelected);

        let mut redirect = None;
        let result = self.serve(&mut protocol, &mut redirect);

        let stopped = match redirect {
            Some(mut server) => server.stop(),
            None => Ok(()),
        };
        self.engine.release();
        if self.config.engine_logging.is_some() {
            crate::log::LOGGER_SWITCHER.reset_engine_route();
        }
        self.enter(SessionState::Terminated);

        if let Err(e) = &result {
            error!(target: LOG_TARGET, "session failed: {e}");
        }
        result?;
        stopped?;
        Ok(())
    }

    fn serve(
        &mut self,
        protocol: &mut Protocol,
        redirect: &mut Option<StreamRedirectServer>,
    ) -> Result<(), SessionError> {
        if let Some(launch) = &self.config.launch {
            protocol.configure_launch(launch.program.clone(), launch.args.clone());
        }
        if let Some(logging) = self.config.engine_logging.clone() {
            protocol.enable_engine_logging(logging)?;
        }

        self.engine.bind_sink(protocol.sink());
        self.enter(SessionState::EngineBound);

        if self.config.redirect_enabled() {
            let mut server =
                StreamRedirectServer::start(self.config.resolved_server_port(), protocol.sink())?;
            if let Some(streams) = server.take_streams() {
                self.engine.redirect_output(streams);
            }
            *redirect = Some(server);
            self.enter(SessionState::RedirectActive);
        }

        if let Some(pid) = self.config.attach_pid {
            self.enter(SessionState::Attaching);
            self.attach(pid)?;
        }

        self.enter(SessionState::CommandLoopRunning);
        protocol
            .run_command_loop(&mut self.engine)
            .map_err(SessionError::Protocol)
    }

    fn attach(&mut self, pid: u32) -> Result<(), SessionError> {
        let fail = |step| move |error| SessionError::Attach { step, pid, error };

        self.engine
            .initialize()
            .map_err(fail(AttachStep::Initialize))?;
        self.engine.attach(pid).map_err(fail(AttachStep::Attach))?;
        self.engine
            .configuration_done()
            .map_err(fail(AttachStep::ConfigurationDone))?;
        info!(target: LOG_TARGET, "attached to process {pid}");
        Ok(())
    }
}
