//! A program invocation that can be recorded, compared and replayed

use async_process::Command as AsyncCommand;
use std::ffi::{OsStr, OsString};
use std::fmt;

/// A program, its arguments and an optional stdin payload
///
/// Unlike `async_process::Command` this is `Clone` and comparable, so a
/// scripted runner can assert on exactly what it was asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: OsString,
    args: Vec<OsString>,
    stdin: Option<Vec<u8>>,
}

impl Command {
    /// Invocation of `program` with no arguments
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            stdin: None,
        }
    }

    /// Start a chained builder
    pub fn builder<S: AsRef<OsStr>>(program: S) -> CommandBuilder {
        CommandBuilder(Command::new(program))
    }

    /// Append one argument
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// Write `payload` to the child's stdin, then close it
    pub fn stdin_bytes(&mut self, payload: impl Into<Vec<u8>>) -> &mut Self {
        self.stdin = Some(payload.into());
        self
    }

    /// Program to run
    pub fn get_program(&self) -> &OsStr {
        &self.program
    }

    /// Arguments in order
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Stdin payload, if any
    pub fn get_stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    /// Arguments as lossy UTF-8
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// The process-spawning equivalent; stdio is left to the runner
    pub fn prepare(&self) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// By-value builder for [`Command`]
pub struct CommandBuilder(Command);

impl CommandBuilder {
    /// Append one argument
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.0.arg(arg);
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.0.args(args);
        self
    }

    /// Set the stdin payload
    pub fn stdin_bytes(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.0.stdin_bytes(payload);
        self
    }

    /// Finish
    pub fn build(self) -> Command {
        self.0
    }
}
