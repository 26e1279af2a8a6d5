//! Invocation of privileged account-management programs.
//!
//! Everything that mutates the account database goes through [`CommandRunner`]
//! so reconciliation can be exercised against a recording fake instead of the
//! host's real `useradd`/`adduser` family.

use std::process::Command;

use crate::error::{Error, Result};

/// A fully-resolved program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Render as a shell-like line for logs and error messages.
    pub fn display_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Runs a program to completion and reports failure as an error.
///
/// `subject` is the username the invocation acts on; it only feeds error
/// context.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation, subject: &str) -> Result<String>;
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation, subject: &str) -> Result<String> {
        tracing::debug!(command = %invocation.display_line(), user = %subject, "running");

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .output()
            .map_err(|source| Error::CommandSpawn {
                program: invocation.program.clone(),
                username: subject.to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::CommandFailed {
                program: invocation.program.clone(),
                args: invocation.args.join(" "),
                username: subject.to_string(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
