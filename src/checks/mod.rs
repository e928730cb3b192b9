// Checks module - the single-call Mesos, Marathon, Chronos and Metronome checks
//
// Each check issues one request per server (plus a leader lookup for the
// Mesos counters), interprets the answer and returns a verdict.

use clap::ValueEnum;

use crate::http::HttpError;

pub mod balance;
pub mod endpoint;
pub mod leader;
pub mod mesos_tasks;

/// Default Mesos master API port
pub const MASTER_DEFAULT_PORT: u16 = 5050;

/// Default Mesos agent API port
pub const SLAVE_DEFAULT_PORT: u16 = 5051;

/// Role of the Mesos process being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MesosMode {
    Master,
    Slave,
}

impl MesosMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MesosMode::Master => "master",
            MesosMode::Slave => "slave",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            MesosMode::Master => MASTER_DEFAULT_PORT,
            MesosMode::Slave => SLAVE_DEFAULT_PORT,
        }
    }

    pub fn health_path(self) -> &'static str {
        match self {
            MesosMode::Master => "/master/health",
            MesosMode::Slave => "/slave(1)/health",
        }
    }
}

/// Operator message for a service that did not answer properly.
pub fn unreachable_message(subject: &str, err: &HttpError) -> String {
    match err {
        HttpError::Timeout { .. } => format!("{} connection timed out", subject),
        _ => format!("{} is not responding", subject),
    }
}

/// Splits a comma separated server list, dropping blanks.
pub fn server_list(servers: &str) -> Vec<&str> {
    servers
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
