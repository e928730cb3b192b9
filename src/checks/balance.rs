// Resource balance - spread of one resource's usage across Mesos agents

use async_trait::async_trait;
use clap::{Args, ValueEnum};
use serde_json::Value;
use std::time::Duration;

use super::{unreachable_message, MASTER_DEFAULT_PORT};
use crate::http::{parse_json, require_key, ApiClient, HttpError};
use crate::plugin::{Plugin, Verdict};

/// Agent resource whose usage is compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Resource {
    Mem,
    Cpus,
    Disk,
    Gpus,
}

impl Resource {
    pub fn key(self) -> &'static str {
        match self {
            Resource::Mem => "mem",
            Resource::Cpus => "cpus",
            Resource::Disk => "disk",
            Resource::Gpus => "gpus",
        }
    }
}

/// Options of the `mesos-balance` plugin
#[derive(Args, Debug, Clone)]
pub struct BalanceArgs {
    /// Mesos server used to find the leader
    #[arg(short = 's', long, default_value = "localhost")]
    pub server: String,

    #[arg(short = 'p', long, default_value_t = MASTER_DEFAULT_PORT)]
    pub port: u16,

    /// Agents endpoint URI
    #[arg(short = 'u', long, default_value = "/master/slaves")]
    pub uri: String,

    /// Timeout in seconds
    #[arg(short = 't', long, default_value_t = 5)]
    pub timeout: u64,

    #[arg(short = 'r', long, value_enum, default_value = "cpus")]
    pub resource: Resource,

    /// Critical usage difference, in percentage points
    #[arg(short = 'c', long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub critical: f64,

    /// Warning usage difference, in percentage points
    #[arg(short = 'w', long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub warning: f64,
}

/// Usage percentage of one agent
#[derive(Debug, Clone, PartialEq)]
pub struct AgentUsage {
    pub hostname: String,
    pub percent: f64,
}

/// Usage of `resource` per agent, skipping agents without that capacity.
pub fn agent_usage(agents: &[Value], resource: Resource) -> Vec<AgentUsage> {
    let key = resource.key();
    agents
        .iter()
        .filter_map(|agent| {
            let total = agent.get("resources")?.get(key)?.as_f64()?;
            if total <= 0.0 {
                return None;
            }
            let used = agent
                .get("used_resources")
                .and_then(|used| used.get(key))
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            let hostname = agent
                .get("hostname")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Some(AgentUsage {
                hostname,
                percent: used * 100.0 / total,
            })
        })
        .collect()
}

/// Least and most loaded agents, first one wins on ties.
pub fn extremes(usage: &[AgentUsage]) -> Option<(&AgentUsage, &AgentUsage)> {
    let first = usage.first()?;
    let (mut min, mut max) = (first, first);
    for agent in &usage[1..] {
        if agent.percent < min.percent {
            min = agent;
        }
        if agent.percent > max.percent {
            max = agent;
        }
    }
    Some((min, max))
}

/// The `mesos-balance` plugin
pub struct BalanceCheck {
    args: BalanceArgs,
}

impl BalanceCheck {
    pub fn new(args: BalanceArgs) -> Self {
        BalanceCheck { args }
    }

    async fn fetch_agents(&self, client: &ApiClient) -> Result<Vec<Value>, HttpError> {
        let leader = client.resolve_leader(&self.args.server, self.args.port).await?;
        let url = format!("{}{}", leader, self.args.uri);
        let payload = client.get_text(&url).await?;
        let document = parse_json(&payload)?;
        match require_key(document, "slaves", &payload)? {
            Value::Array(agents) => Ok(agents),
            _ => Err(HttpError::MissingKey {
                key: "slaves".to_string(),
                payload,
            }),
        }
    }

    fn judge(&self, usage: &[AgentUsage]) -> Verdict {
        let Some((min, max)) = extremes(usage) else {
            return Verdict::ok(format!(
                "No agent reports {} capacity",
                self.args.resource.key()
            ));
        };

        let diff = max.percent - min.percent;
        let describe = |threshold: f64| {
            format!(
                "There is a {} usage diff of {} bigger than {} Hostname {} uses {}% and Hostname {} uses {}%",
                self.args.resource.key(),
                diff,
                threshold,
                max.hostname,
                max.percent,
                min.hostname,
                min.percent
            )
        };

        if diff > self.args.critical {
            Verdict::critical(describe(self.args.critical))
        } else if diff > self.args.warning {
            Verdict::warning(describe(self.args.warning))
        } else {
            Verdict::ok(format!(
                "{} usage diff of {} is within limits",
                self.args.resource.key(),
                diff
            ))
        }
    }
}

#[async_trait]
impl Plugin for BalanceCheck {
    fn name(&self) -> &str {
        "MesosBalance"
    }

    async fn run(&self) -> Verdict {
        if self.args.critical < 0.0 || self.args.warning < 0.0 {
            return Verdict::unknown("Thresholds cannot be negative");
        }

        let client = match ApiClient::new(Duration::from_secs(self.args.timeout), None) {
            Ok(client) => client,
            Err(e) => return Verdict::unknown(e.to_string()),
        };

        match self.fetch_agents(&client).await {
            Ok(agents) => self.judge(&agent_usage(&agents, self.args.resource)),
            Err(e) if e.is_transport() => {
                let subject = format!("Mesos {}", self.args.server);
                Verdict::unknown(unreachable_message(&subject, &e))
            }
            Err(e) => Verdict::unknown(e.to_string()),
        }
    }
}
