// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reserved command sentinels interpreted by the runner supervisor instead
//! of being executed as shell commands.

pub const STOP: &str = "__STOP__";
pub const HALT: &str = "__HALT__";
pub const ESCAPE: &str = "__ESCAPE__";
pub const INPUT_PREFIX: &str = "__INPUT__:";

/// A parsed sentinel command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sentinel {
    /// Graceful stop: SIGINT, grace period, then SIGKILL.
    Stop,
    /// Immediate SIGKILL.
    Halt,
    /// SIGINT without teardown.
    Escape,
    /// Deliver text to the worker (stdin or a fresh process).
    Input(String),
}

impl Sentinel {
    /// Parse a command string; `None` means it is an ordinary command.
    pub fn parse(command: &str) -> Option<Self> {
        match command {
            STOP => Some(Self::Stop),
            HALT => Some(Self::Halt),
            ESCAPE => Some(Self::Escape),
            _ => command.strip_prefix(INPUT_PREFIX).map(|rest| Self::Input(rest.to_owned())),
        }
    }

    /// The wire form stored in the commands table.
    pub fn as_command(&self) -> String {
        match self {
            Self::Stop => STOP.to_owned(),
            Self::Halt => HALT.to_owned(),
            Self::Escape => ESCAPE.to_owned(),
            Self::Input(text) => format!("{INPUT_PREFIX}{text}"),
        }
    }
}

/// Whether a command string is any reserved sentinel.
pub fn is_sentinel(command: &str) -> bool {
    Sentinel::parse(command).is_some()
}

#[cfg(test)]
#[path = "sentinel_tests.rs"]
mod tests;
