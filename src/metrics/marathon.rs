// Marathon metrics - `/metrics` groups flattened to graphite lines

use async_trait::async_trait;
use clap::Args;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{graphite_line, hostname, now};
use crate::http::{ApiClient, HttpError};
use crate::plugin::{Plugin, PluginKind, Verdict};

/// Fields of a metric object that carry a number worth reporting
const REPORTED_FIELDS: [&str; 2] = ["count", "value"];

/// Options of the `metrics-marathon` plugin
#[derive(Args, Debug, Clone)]
pub struct MarathonMetricsArgs {
    /// Marathon host
    #[arg(long = "host", default_value = "localhost")]
    pub server: String,

    #[arg(short = 'p', long, default_value_t = 8080)]
    pub port: u16,

    /// Metrics endpoint URI
    #[arg(short = 'u', long, default_value = "/metrics")]
    pub uri: String,

    /// Protocol used to reach Marathon
    #[arg(short = 'P', long, default_value = "http")]
    pub protocol: String,

    /// Metric naming scheme, defaults to `<hostname>.marathon`
    #[arg(long)]
    pub scheme: Option<String>,

    /// Timeout in seconds
    #[arg(short = 't', long, default_value_t = 5)]
    pub timeout: u64,
}

/// Turns a Marathon metrics document into graphite lines.
///
/// Every top-level group except `version` is walked; each metric object
/// contributes its numeric `count` and `value` fields.
pub fn flatten_marathon(document: &Value, scheme: &str, timestamp: i64) -> Vec<String> {
    let Some(groups) = document.as_object() else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    for (group, metrics) in groups {
        if group == "version" {
            continue;
        }
        let Some(metrics) = metrics.as_object() else {
            continue;
        };
        for (metric, fields) in metrics {
            for field in REPORTED_FIELDS {
                if let Some(value) = fields.get(field).filter(|v| v.is_number()) {
                    let path = format!("{}.{}.{}.{}", scheme, group, metric, field);
                    lines.push(graphite_line(&path, value, timestamp));
                }
            }
        }
    }
    lines
}

/// The `metrics-marathon` plugin
pub struct MarathonMetrics {
    args: MarathonMetricsArgs,
}

impl MarathonMetrics {
    pub fn new(args: MarathonMetricsArgs) -> Self {
        MarathonMetrics { args }
    }

    fn scheme(&self) -> String {
        self.args
            .scheme
            .clone()
            .unwrap_or_else(|| format!("{}.marathon", hostname()))
    }
}

#[async_trait]
impl Plugin for MarathonMetrics {
    fn name(&self) -> &str {
        "MarathonMetrics"
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Metric
    }

    async fn run(&self) -> Verdict {
        let client = match ApiClient::new(Duration::from_secs(self.args.timeout), None) {
            Ok(client) => client,
            Err(e) => return Verdict::unknown(e.to_string()),
        };

        let url = format!(
            "{}://{}:{}{}",
            self.args.protocol, self.args.server, self.args.port, self.args.uri
        );
        match client.get_json(&url).await {
            Ok(document) => {
                let lines = flatten_marathon(&document, &self.scheme(), now());
                debug!("Flattened {} Marathon metrics", lines.len());
                Verdict::ok(lines.join("\n"))
            }
            Err(HttpError::Timeout { .. }) => Verdict::unknown("Marathon Connection timed out"),
            Err(e) if e.is_transport() => Verdict::unknown("Marathon is not responding"),
            Err(e) => Verdict::unknown(e.to_string()),
        }
    }
}
