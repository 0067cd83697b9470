//! dbgfront - front-end control plane of a remote debugger.
//!
//! A session binds one protocol front end (MI, DAP or interactive CLI) to one
//! debug engine, optionally mirrors the debuggee output over a TCP side channel
//! and then serves client commands until the client leaves.

pub mod config;
pub mod engine;
pub mod log;
pub mod protocol;
pub mod redirect;
pub mod session;
