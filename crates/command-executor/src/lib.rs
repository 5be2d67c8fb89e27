//! Runtime-agnostic command execution library
//!
//! This crate provides a small, uniform interface for running external
//! programs to completion with captured output and a hard deadline. It is the
//! substrate the orchestrator gateway drives the `docker` CLI through.

#![warn(missing_docs)]

pub mod command;
pub mod error;
pub mod runner;

pub use command::Command;
pub use error::{Error, Result};
pub use runner::{CommandRunner, ExitResult, LocalRunner};
