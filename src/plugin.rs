// Plugin module - the check/metric harness shared by every subcommand
//
// This module provides the core trait that all plugins implement, plus the
// verdict type that maps onto the monitoring agent's exit-code convention:
// a single status line on stdout and an exit code of 0, 1, 2 or 3.

use async_trait::async_trait;
use std::fmt;

/// Severity of a verdict, encoded as the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Status {
    /// Exit code understood by the monitoring agent.
    pub fn code(self) -> u8 {
        match self {
            Status::Ok => 0,
            Status::Warning => 1,
            Status::Critical => 2,
            Status::Unknown => 3,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Ok => "OK",
            Status::Warning => "WARNING",
            Status::Critical => "CRITICAL",
            Status::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// Whether a plugin reports a check verdict or a batch of metric lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Check,
    Metric,
}

/// Final outcome of one plugin invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: Status,
    pub message: String,
}

impl Verdict {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Verdict {
            status,
            message: message.into(),
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(Status::Ok, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Status::Warning, message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(Status::Critical, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Status::Unknown, message)
    }

    /// Renders the stdout text for this verdict.
    ///
    /// Checks print `<CheckName> <STATUS>: <message>`. Metric plugins print
    /// their metric lines as-is when everything went fine and fall back to
    /// the check form when they could not produce metrics.
    pub fn render(&self, name: &str, kind: PluginKind) -> String {
        match (kind, self.status) {
            (PluginKind::Metric, Status::Ok) => self.message.clone(),
            _ if self.message.is_empty() => format!("{} {}", name, self.status),
            _ => format!("{} {}: {}", name, self.status, self.message),
        }
    }
}

/// Core trait that every plugin implements.
///
/// A plugin performs a bounded number of network calls, interprets the
/// answers and returns exactly one verdict. Failures are folded into the
/// verdict rather than returned as errors, so the harness only has to
/// print and exit.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name printed in front of the status, e.g. "CheckMarathonApps".
    fn name(&self) -> &str;

    fn kind(&self) -> PluginKind {
        PluginKind::Check
    }

    async fn run(&self) -> Verdict;
}
