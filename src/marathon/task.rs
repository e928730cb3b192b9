// Marathon task check - verifies one app has enough healthy running tasks
//
// A task is unhealthy when any of its health-check results is not alive,
// meaning its last failure is more recent than its last success.

use async_trait::async_trait;
use clap::Args;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::checks::server_list;
use crate::config::{ConfigError, Credentials};
use crate::http::{parse_json, require_key, ApiClient, HttpError};
use crate::plugin::{Plugin, Verdict};

/// Options of the `marathon-task` plugin
#[derive(Args, Debug, Clone)]
pub struct MarathonTaskArgs {
    /// Marathon servers, comma separated; the first reachable one decides
    #[arg(short = 's', long)]
    pub server: String,

    #[arg(short = 'p', long, default_value_t = 8080)]
    pub port: u16,

    /// App id without the leading slash
    #[arg(short = 't', long)]
    pub task: String,

    /// Expected number of running tasks
    #[arg(short = 'i', long)]
    pub instances: u32,

    #[arg(short = 'P', long, default_value = "http")]
    pub protocol: String,

    #[arg(short = 'u', long)]
    pub username: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    /// Timeout in seconds
    #[arg(short = 'T', long, default_value_t = 5)]
    pub timeout: u64,
}

#[derive(Debug, Deserialize)]
struct Task {
    #[serde(rename = "appId", default)]
    app_id: String,

    #[serde(rename = "healthCheckResults", default)]
    health_check_results: Option<Vec<HealthCheckResult>>,
}

#[derive(Debug, Deserialize)]
struct HealthCheckResult {
    #[serde(default)]
    alive: Option<bool>,

    #[serde(rename = "lastFailureCause", default)]
    last_failure_cause: Option<String>,
}

/// Running tasks of one app and the failure causes of unhealthy ones
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSummary {
    pub running: usize,
    pub unhealthy: Vec<String>,
}

/// Summarizes a `GET /v2/tasks` payload for the app `/<task>`.
pub fn summarize_tasks(payload: &str, task: &str) -> Result<TaskSummary, HttpError> {
    let document = parse_json(payload)?;
    let tasks = require_key(document, "tasks", payload)?;
    let tasks: Vec<Task> = serde_json::from_value(tasks).map_err(|source| HttpError::Parse {
        payload: payload.to_string(),
        source,
    })?;

    let app_id = format!("/{}", task);
    let mut summary = TaskSummary::default();
    for task in tasks.iter().filter(|t| t.app_id == app_id) {
        summary.running += 1;
        for check in task.health_check_results.iter().flatten() {
            if check.alive == Some(true) {
                continue;
            }
            summary.unhealthy.push(
                check
                    .last_failure_cause
                    .clone()
                    .unwrap_or_else(|| "Health check not alive".to_string()),
            );
        }
    }

    Ok(summary)
}

/// The `marathon-task` plugin
pub struct MarathonTaskCheck {
    args: MarathonTaskArgs,
}

impl MarathonTaskCheck {
    pub fn new(args: MarathonTaskArgs) -> Self {
        MarathonTaskCheck { args }
    }

    fn client(&self) -> Result<ApiClient, ConfigError> {
        if self.args.instances == 0 {
            return Err(ConfigError::InvalidSetting(
                "number of instances should be a positive integer".to_string(),
            ));
        }
        let credentials =
            Credentials::from_options(self.args.username.clone(), self.args.password.clone())?;
        ApiClient::new(Duration::from_secs(self.args.timeout), credentials)
            .map_err(|e| ConfigError::InvalidSetting(e.to_string()))
    }

    fn judge(&self, summary: &TaskSummary) -> Verdict {
        let mut message = format!(
            "{}/{} {} tasks running",
            summary.running, self.args.instances, self.args.task
        );
        if !summary.unhealthy.is_empty() {
            message.push_str(":\n");
            message.push_str(&summary.unhealthy.join("\n"));
        }

        if !summary.unhealthy.is_empty() || summary.running < self.args.instances as usize {
            Verdict::critical(message)
        } else {
            Verdict::ok(message)
        }
    }
}

#[async_trait]
impl Plugin for MarathonTaskCheck {
    fn name(&self) -> &str {
        "CheckMarathonTask"
    }

    async fn run(&self) -> Verdict {
        let client = match self.client() {
            Ok(client) => client,
            Err(e) => return Verdict::unknown(e.to_string()),
        };

        let mut failures = Vec::new();
        for server in server_list(&self.args.server) {
            let url = format!(
                "{}://{}:{}/v2/tasks?status=running",
                self.args.protocol, server, self.args.port
            );

            let result = match client.get_text(&url).await {
                Ok(body) => summarize_tasks(&body, &self.args.task),
                Err(e) => Err(e),
            };

            match result {
                Ok(summary) => return self.judge(&summary),
                Err(e) if e.is_transport() => {
                    warn!("Marathon on {} could not be reached: {}", server, e);
                    failures.push(format!("Marathon on {} could not be reached", server));
                }
                Err(e) => {
                    failures.push(format!("error caught trying to reach Marathon on {}: {}", server, e));
                }
            }
        }

        Verdict::unknown(format!(
            "marathon task state could not be retrieved:\n{}",
            failures.join("\n")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Status;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> String {
        json!({
            "tasks": [
                {"appId": "/foo/bar", "healthCheckResults": [{"alive": true}]},
                {"appId": "/broken/app", "healthCheckResults": [
                    {"alive": false, "lastFailureCause": "connection refused"}
                ]},
                {"appId": "/broken/app", "healthCheckResults": [{"alive": false}]},
                {"appId": "/other"}
            ]
        })
        .to_string()
    }

    fn args(server: String, port: u16, task: &str, instances: u32) -> MarathonTaskArgs {
        MarathonTaskArgs {
            server,
            port,
            task: task.to_string(),
            instances,
            protocol: "http".to_string(),
            username: None,
            password: None,
            timeout: 2,
        }
    }

    #[test]
    fn test_single_running_task() {
        let summary = summarize_tasks(&payload(), "foo/bar").unwrap();
        assert_eq!(summary, TaskSummary { running: 1, unhealthy: vec![] });
    }

    #[test]
    fn test_missing_app_counts_zero() {
        let summary = summarize_tasks(&payload(), "non/existing").unwrap();
        assert_eq!(summary.running, 0);
        assert!(summary.unhealthy.is_empty());
    }

    #[test]
    fn test_unhealthy_tasks_are_listed() {
        let summary = summarize_tasks(&payload(), "broken/app").unwrap();
        assert_eq!(summary.running, 2);
        assert_eq!(
            summary.unhealthy,
            vec!["connection refused".to_string(), "Health check not alive".to_string()]
        );
    }

    #[test]
    fn test_bad_payloads() {
        let err = summarize_tasks("{}", "foo").unwrap_err();
        assert!(err.to_string().contains("tasks"));
        let err = summarize_tasks("", "foo").unwrap_err();
        assert!(err.to_string().starts_with("Could not parse JSON"));
    }

    #[tokio::test]
    async fn test_zero_instances_is_unknown() {
        let check = MarathonTaskCheck::new(args("localhost".into(), 8080, "foo", 0));
        assert_eq!(check.run().await.status, Status::Unknown);
    }

    #[tokio::test]
    async fn test_run_against_marathon() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/tasks"))
            .and(query_param("status", "running"))
            .respond_with(ResponseTemplate::new(200).set_body_string(payload()))
            .mount(&server)
            .await;
        let address = server.address();

        let ok = MarathonTaskCheck::new(args(address.ip().to_string(), address.port(), "foo/bar", 1));
        let verdict = ok.run().await;
        assert_eq!(verdict.status, Status::Ok);
        assert_eq!(verdict.message, "1/1 foo/bar tasks running");

        let short = MarathonTaskCheck::new(args(address.ip().to_string(), address.port(), "foo/bar", 3));
        assert_eq!(short.run().await.status, Status::Critical);

        let broken = MarathonTaskCheck::new(args(address.ip().to_string(), address.port(), "broken/app", 2));
        let verdict = broken.run().await;
        assert_eq!(verdict.status, Status::Critical);
        assert!(verdict.message.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_unreachable_servers_are_unknown() {
        let check = MarathonTaskCheck::new(args("127.0.0.1".into(), 9, "foo", 1));
        let verdict = check.run().await;
        assert_eq!(verdict.status, Status::Unknown);
        assert!(verdict.message.contains("Marathon on 127.0.0.1 could not be reached"));
    }
}
