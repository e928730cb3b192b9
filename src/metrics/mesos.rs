// Mesos metrics - `/metrics/snapshot` keys flattened to graphite lines

use async_trait::async_trait;
use clap::Args;
use serde_json::Value;
use std::time::Duration;

use super::{graphite_line, hostname, now};
use crate::checks::{unreachable_message, MesosMode};
use crate::http::ApiClient;
use crate::plugin::{Plugin, PluginKind, Verdict};

/// Options of the `metrics-mesos` plugin
#[derive(Args, Debug, Clone)]
pub struct MesosMetricsArgs {
    /// Mesos server
    #[arg(short = 's', long, default_value = "localhost")]
    pub server: String,

    /// Port, defaults to 5050 for masters and 5051 for agents
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    #[arg(short = 'm', long, value_enum)]
    pub mode: MesosMode,

    /// Snapshot endpoint URI
    #[arg(short = 'u', long, default_value = "/metrics/snapshot")]
    pub uri: String,

    /// Metric naming scheme, defaults to the host name
    #[arg(long)]
    pub scheme: Option<String>,

    /// Timeout in seconds
    #[arg(short = 't', long, default_value_t = 5)]
    pub timeout: u64,
}

/// Turns a metrics snapshot into graphite lines under `<scheme>.mesos-<mode>`.
pub fn flatten_snapshot(
    document: &Value,
    scheme: &str,
    mode: MesosMode,
    timestamp: i64,
) -> Vec<String> {
    let Some(snapshot) = document.as_object() else {
        return Vec::new();
    };

    snapshot
        .iter()
        .map(|(key, value)| {
            let path = format!("{}.mesos-{}.{}", scheme, mode.as_str(), key.replace('/', "."));
            graphite_line(&path, value, timestamp)
        })
        .collect()
}

/// The `metrics-mesos` plugin
pub struct MesosMetrics {
    args: MesosMetricsArgs,
}

impl MesosMetrics {
    pub fn new(args: MesosMetricsArgs) -> Self {
        MesosMetrics { args }
    }
}

#[async_trait]
impl Plugin for MesosMetrics {
    fn name(&self) -> &str {
        "MesosMetrics"
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Metric
    }

    async fn run(&self) -> Verdict {
        let client = match ApiClient::new(Duration::from_secs(self.args.timeout), None) {
            Ok(client) => client,
            Err(e) => return Verdict::unknown(e.to_string()),
        };

        let mode = self.args.mode;
        let port = self.args.port.unwrap_or(mode.default_port());
        let url = format!("http://{}:{}{}", self.args.server, port, self.args.uri);

        match client.get_json(&url).await {
            Ok(document) => {
                let scheme = self.args.scheme.clone().unwrap_or_else(hostname);
                Verdict::ok(flatten_snapshot(&document, &scheme, mode, now()).join("\n"))
            }
            Err(e) if e.is_transport() => {
                let subject = format!("Mesos {}", mode.as_str());
                Verdict::critical(unreachable_message(&subject, &e))
            }
            Err(e) => Verdict::unknown(e.to_string()),
        }
    }
}
