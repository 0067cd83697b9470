mod cli;
mod common;
mod dap;
mod sink;
