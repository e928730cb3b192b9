// Mesos leader check - the master behind `/redirect` must not answer 503

use async_trait::async_trait;
use clap::Args;
use std::time::Duration;

use super::{unreachable_message, MASTER_DEFAULT_PORT};
use crate::http::ApiClient;
use crate::plugin::{Plugin, Verdict};

/// Options of the `mesos-leader` plugin
#[derive(Args, Debug, Clone)]
pub struct LeaderArgs {
    /// Mesos server
    #[arg(short = 's', long, default_value = "localhost")]
    pub server: String,

    #[arg(short = 'p', long, default_value_t = MASTER_DEFAULT_PORT)]
    pub port: u16,

    /// Endpoint URI
    #[arg(short = 'u', long, default_value = "/redirect")]
    pub uri: String,

    /// Timeout in seconds
    #[arg(short = 't', long, default_value_t = 5)]
    pub timeout: u64,
}

/// The `mesos-leader` plugin
pub struct LeaderCheck {
    args: LeaderArgs,
}

impl LeaderCheck {
    pub fn new(args: LeaderArgs) -> Self {
        LeaderCheck { args }
    }
}

#[async_trait]
impl Plugin for LeaderCheck {
    fn name(&self) -> &str {
        "MesosLeaderNodeStatus"
    }

    async fn run(&self) -> Verdict {
        let client = match ApiClient::new(Duration::from_secs(self.args.timeout), None) {
            Ok(client) => client,
            Err(e) => return Verdict::unknown(e.to_string()),
        };

        let server = &self.args.server;
        let url = format!("http://{}:{}{}", server, self.args.port, self.args.uri);
        match client.get(&url).await {
            Ok(response) if response.status().as_u16() == 503 => {
                Verdict::critical(format!("Master on {} is not responding", server))
            }
            Ok(response) => Verdict::ok(format!("Mesos leader reached at {}", response.url())),
            Err(e) => Verdict::critical(unreachable_message(&format!("Mesos on {}", server), &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Status;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn args(port: u16) -> LeaderArgs {
        LeaderArgs {
            server: "127.0.0.1".to_string(),
            port,
            uri: "/redirect".to_string(),
            timeout: 2,
        }
    }

    #[tokio::test]
    async fn test_leader_answers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redirect"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let verdict = LeaderCheck::new(args(server.address().port())).run().await;
        assert_eq!(verdict.status, Status::Ok);
    }

    #[tokio::test]
    async fn test_unavailable_master_is_critical() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redirect"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let verdict = LeaderCheck::new(args(server.address().port())).run().await;
        assert_eq!(verdict.status, Status::Critical);
        assert_eq!(verdict.message, "Master on 127.0.0.1 is not responding");
    }

    #[tokio::test]
    async fn test_unreachable_is_critical() {
        let verdict = LeaderCheck::new(args(9)).run().await;
        assert_eq!(verdict.status, Status::Critical);
        assert_eq!(verdict.message, "Mesos on 127.0.0.1 is not responding");
    }
}
