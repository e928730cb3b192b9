// Mesos task counters - running/failed/lost tasks read from the leader's metrics
//
// The counters come from `/metrics/snapshot` on the current leader, found by
// following `/redirect` on the given server. With `--delta` the value is
// compared with the one stored on the previous run instead.

use async_trait::async_trait;
use clap::{Args, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::{unreachable_message, MASTER_DEFAULT_PORT};
use crate::http::{parse_json, require_key, ApiClient, HttpError};
use crate::plugin::{Plugin, Verdict};
use crate::storage::{MetricStore, DEFAULT_STORE_PATH};

/// Task counter exposed by the Mesos master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCounter {
    Running,
    Failed,
    Lost,
}

impl TaskCounter {
    pub fn metric_key(self) -> &'static str {
        match self {
            TaskCounter::Running => "master/tasks_running",
            TaskCounter::Failed => "master/tasks_failed",
            TaskCounter::Lost => "master/tasks_lost",
        }
    }

    /// Key under which the previous value is remembered
    pub fn store_key(self) -> String {
        format!("task_{}", self.metric_key())
    }

    fn label(self) -> &'static str {
        match self {
            TaskCounter::Running => "RUNNING",
            TaskCounter::Failed => "FAILED",
            TaskCounter::Lost => "LOST",
        }
    }

    fn plugin_name(self) -> &'static str {
        match self {
            TaskCounter::Running => "MesosTasksRunning",
            TaskCounter::Failed => "MesosTasksFailed",
            TaskCounter::Lost => "MesosTasksLost",
        }
    }
}

/// Options shared by the task counter checks
#[derive(Args, Debug, Clone)]
pub struct CounterArgs {
    /// Mesos server used to find the leader
    #[arg(short = 's', long, default_value = "localhost")]
    pub server: String,

    #[arg(short = 'p', long, default_value_t = MASTER_DEFAULT_PORT)]
    pub port: u16,

    /// Metrics endpoint URI
    #[arg(short = 'u', long, default_value = "/metrics/snapshot")]
    pub uri: String,

    /// Timeout in seconds
    #[arg(short = 't', long, default_value_t = 5)]
    pub timeout: u64,

    /// Compare the change since the previous run rather than the raw value
    #[arg(short = 'd', long)]
    pub delta: bool,

    /// File keeping values between runs
    #[arg(long, default_value = DEFAULT_STORE_PATH)]
    pub store_path: PathBuf,
}

/// How the running task count is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompareMode {
    /// Critical when equal to `--value`
    Eq,
    /// Critical when different from `--value`
    Ne,
    /// Critical when lower than `--value`
    Lt,
    /// Critical when greater than `--value`
    Gt,
    /// Critical when outside `--low`..=`--high`
    Rg,
}

/// Options of the `mesos-running-tasks` plugin
#[derive(Args, Debug, Clone)]
pub struct RunningTasksArgs {
    #[command(flatten)]
    pub counter: CounterArgs,

    #[arg(short = 'm', long, value_enum)]
    pub mode: CompareMode,

    #[arg(short = 'v', long, default_value_t = 0, allow_negative_numbers = true)]
    pub value: i64,

    #[arg(short = 'l', long, default_value_t = 0, allow_negative_numbers = true)]
    pub low: i64,

    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub high: i64,
}

/// Options of the `mesos-failed-tasks` and `mesos-lost-tasks` plugins
#[derive(Args, Debug, Clone)]
pub struct ThresholdArgs {
    #[command(flatten)]
    pub counter: CounterArgs,

    /// Maximum acceptable number of tasks
    #[arg(short = 'v', long, default_value_t = 0, allow_negative_numbers = true)]
    pub value: i64,
}

/// Extracts one counter from a metrics snapshot.
pub fn read_counter(payload: &str, key: &str) -> Result<i64, HttpError> {
    let document = parse_json(payload)?;
    let value = require_key(document, key, payload)?;
    value
        .as_f64()
        .map(|v| v.round() as i64)
        .ok_or_else(|| HttpError::MissingKey {
            key: key.to_string(),
            payload: payload.to_string(),
        })
}

/// Judges a running task count: each mode names the condition that is critical.
pub fn judge_running(count: i64, mode: CompareMode, value: i64, low: i64, high: i64) -> Verdict {
    let failure = match mode {
        CompareMode::Eq if count == value => Some(format!(
            "The number of running tasks cluster is equal to {}!",
            value
        )),
        CompareMode::Ne if count != value => Some(format!(
            "The number of running tasks cluster is not equal to {}!",
            value
        )),
        CompareMode::Lt if count < value => Some(format!(
            "The number of running tasks cluster is lower than {}!",
            value
        )),
        CompareMode::Gt if count > value => Some(format!(
            "The number of running tasks cluster is greater than {}!",
            value
        )),
        CompareMode::Rg if count < low || count > high => Some(format!(
            "The number of running tasks in cluster is not in {} - {} value range!",
            low, high
        )),
        _ => None,
    };

    match failure {
        Some(message) => Verdict::critical(message),
        None => Verdict::ok(format!("Found {} tasks running", count)),
    }
}

/// Judges a failed or lost task count against its ceiling.
pub fn judge_ceiling(counter: TaskCounter, count: i64, ceiling: i64) -> Verdict {
    if count > ceiling {
        Verdict::critical(format!(
            "The number of {} tasks [{}] is bigger than provided [{}]!",
            counter.label(),
            count,
            ceiling
        ))
    } else {
        Verdict::ok(format!("Found {} {} tasks", count, counter.label().to_lowercase()))
    }
}

enum Judgement {
    Running {
        mode: CompareMode,
        value: i64,
        low: i64,
        high: i64,
    },
    Ceiling(i64),
}

/// One of the three task counter plugins
pub struct TaskCounterCheck {
    counter: TaskCounter,
    args: CounterArgs,
    judgement: Judgement,
}

impl TaskCounterCheck {
    pub fn running(args: RunningTasksArgs) -> Self {
        TaskCounterCheck {
            counter: TaskCounter::Running,
            args: args.counter,
            judgement: Judgement::Running {
                mode: args.mode,
                value: args.value,
                low: args.low,
                high: args.high,
            },
        }
    }

    pub fn failed(args: ThresholdArgs) -> Self {
        Self::ceiling(TaskCounter::Failed, args)
    }

    pub fn lost(args: ThresholdArgs) -> Self {
        Self::ceiling(TaskCounter::Lost, args)
    }

    fn ceiling(counter: TaskCounter, args: ThresholdArgs) -> Self {
        TaskCounterCheck {
            counter,
            args: args.counter,
            judgement: Judgement::Ceiling(args.value),
        }
    }

    async fn fetch(&self, client: &ApiClient) -> Result<i64, HttpError> {
        let leader = client.resolve_leader(&self.args.server, self.args.port).await?;
        let payload = client.get_text(&format!("{}{}", leader, self.args.uri)).await?;
        read_counter(&payload, self.counter.metric_key())
    }
}

#[async_trait]
impl Plugin for TaskCounterCheck {
    fn name(&self) -> &str {
        self.counter.plugin_name()
    }

    async fn run(&self) -> Verdict {
        if let Judgement::Ceiling(ceiling) = self.judgement {
            if ceiling < 0 {
                return Verdict::unknown("Number of tasks cannot be negative, please set --value to a number greater or equal to 0");
            }
        }

        let client = match ApiClient::new(Duration::from_secs(self.args.timeout), None) {
            Ok(client) => client,
            Err(e) => return Verdict::unknown(e.to_string()),
        };

        let mut count = match self.fetch(&client).await {
            Ok(count) => count,
            Err(e) if e.is_transport() => {
                let subject = format!("Mesos {}", self.args.server);
                return Verdict::unknown(unreachable_message(&subject, &e));
            }
            Err(e) => return Verdict::unknown(e.to_string()),
        };

        if self.args.delta {
            let store = MetricStore::new(&self.args.store_path);
            count = match store.delta(&self.counter.store_key(), count) {
                Ok(delta) => delta,
                Err(e) => return Verdict::unknown(e.to_string()),
            };
            debug!("Using delta {} from {}", count, store.path().display());
        }

        match self.judgement {
            Judgement::Running {
                mode,
                value,
                low,
                high,
            } => judge_running(count, mode, value, low, high),
            Judgement::Ceiling(ceiling) => judge_ceiling(self.counter, count, ceiling),
        }
    }
}
