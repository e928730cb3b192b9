// Mesos Checks - Sensu plugins for Mesos, Marathon, Chronos and Metronome
//
// One binary, one subcommand per plugin. Each invocation runs a single
// check or metric collection, prints one verdict (or graphite lines) on
// stdout and exits with the Sensu status code.
//
// # Plugins
// - marathon-apps: per-application status and health results pushed to a Sensu client
// - marathon-task: instance count and health of one Marathon app
// - marathon, mesos, chronos, metronome: endpoint liveness probes
// - mesos-leader: leader reachability
// - mesos-running-tasks, mesos-failed-tasks, mesos-lost-tasks: task counters
// - mesos-balance: resource usage spread across agents
// - metrics-marathon, metrics-mesos: graphite metric output
//
// # Usage
// mesos-checks <plugin> [options]
//
// Example:
// mesos-checks marathon-apps --url http://marathon:8080 --sensu-client-url http://localhost:3031

use clap::{Parser, Subcommand};
use std::env;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod checks;
mod config;
mod http;
mod marathon;
mod metrics;
mod plugin;
mod storage;

use checks::balance::{BalanceArgs, BalanceCheck};
use checks::endpoint::{EndpointArgs, EndpointCheck, JobApiArgs, MesosArgs};
use checks::leader::{LeaderArgs, LeaderCheck};
use checks::mesos_tasks::{RunningTasksArgs, TaskCounterCheck, ThresholdArgs};
use marathon::apps::{MarathonAppsArgs, MarathonAppsCheck};
use marathon::task::{MarathonTaskArgs, MarathonTaskCheck};
use metrics::marathon::{MarathonMetrics, MarathonMetricsArgs};
use metrics::mesos::{MesosMetrics, MesosMetricsArgs};
use plugin::{Plugin, Status};

/// Sensu plugins for Mesos clusters and their frameworks
#[derive(Parser, Debug)]
#[command(name = "mesos-checks", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish one status and one health result per Marathon app
    MarathonApps(MarathonAppsArgs),
    /// Check instance count and health of one Marathon app
    MarathonTask(MarathonTaskArgs),
    /// Check that Marathon answers its ping endpoint
    Marathon(EndpointArgs),
    /// Check a Mesos master or agent health endpoint
    Mesos(MesosArgs),
    /// Check that Chronos answers its jobs endpoint
    Chronos(JobApiArgs),
    /// Check that Metronome answers its jobs endpoint
    Metronome(JobApiArgs),
    /// Check that the Mesos leader is reachable
    MesosLeader(LeaderArgs),
    /// Check the number of running tasks
    MesosRunningTasks(RunningTasksArgs),
    /// Check the number of failed tasks
    MesosFailedTasks(ThresholdArgs),
    /// Check the number of lost tasks
    MesosLostTasks(ThresholdArgs),
    /// Check how evenly a resource is used across agents
    MesosBalance(BalanceArgs),
    /// Output Marathon metrics in graphite format
    MetricsMarathon(MarathonMetricsArgs),
    /// Output Mesos metrics in graphite format
    MetricsMesos(MesosMetricsArgs),
}

impl Command {
    fn into_plugin(self) -> Box<dyn Plugin> {
        match self {
            Command::MarathonApps(args) => Box::new(MarathonAppsCheck::new(args)),
            Command::MarathonTask(args) => Box::new(MarathonTaskCheck::new(args)),
            Command::Marathon(args) => Box::new(EndpointCheck::marathon(args)),
            Command::Mesos(args) => Box::new(EndpointCheck::mesos(args)),
            Command::Chronos(args) => Box::new(EndpointCheck::chronos(args)),
            Command::Metronome(args) => Box::new(EndpointCheck::metronome(args)),
            Command::MesosLeader(args) => Box::new(LeaderCheck::new(args)),
            Command::MesosRunningTasks(args) => Box::new(TaskCounterCheck::running(args)),
            Command::MesosFailedTasks(args) => Box::new(TaskCounterCheck::failed(args)),
            Command::MesosLostTasks(args) => Box::new(TaskCounterCheck::lost(args)),
            Command::MesosBalance(args) => Box::new(BalanceCheck::new(args)),
            Command::MetricsMarathon(args) => Box::new(MarathonMetrics::new(args)),
            Command::MetricsMesos(args) => Box::new(MesosMetrics::new(args)),
        }
    }
}

/// Application entry point
///
/// This function:
/// 1. Parses command-line arguments (bad arguments exit UNKNOWN)
/// 2. Initializes logging on stderr
/// 3. Runs the selected plugin once
/// 4. Prints the verdict and exits with its status code
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return ExitCode::from(Status::Unknown.code());
        }
        Err(e) => {
            // --help and --version
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    init_logging();
    debug!("mesos-checks {}", env!("CARGO_PKG_VERSION"));

    let plugin = cli.command.into_plugin();
    let verdict = plugin.run().await;
    debug!("{} finished with {}", plugin.name(), verdict.status);

    println!("{}", verdict.render(plugin.name(), plugin.kind()));
    ExitCode::from(verdict.status.code())
}

/// Initializes the logging subsystem
///
/// Logs always go to stderr: stdout carries the verdict that Sensu parses.
/// Human-readable output in a terminal, JSON when running under systemd.
///
/// # Log Levels
/// Default: WARN
/// Can be overridden with RUST_LOG environment variable
///
/// # Examples
/// ```bash
/// RUST_LOG=debug mesos-checks marathon-apps ...  # Trace every request
/// ```
fn init_logging() {
    // Systemd sets INVOCATION_ID environment variable
    let is_systemd = env::var("INVOCATION_ID").is_ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    if is_systemd {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    }
}
