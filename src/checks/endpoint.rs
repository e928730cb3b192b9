// Endpoint probes - "does every server answer 200 OK" checks
//
// Used for the Marathon ping, the Mesos master/agent health endpoints and
// the Chronos and Metronome job APIs. All servers are probed; any failure
// makes the check critical and every failure is listed.

use async_trait::async_trait;
use clap::Args;
use std::time::Duration;
use tracing::debug;

use super::{server_list, unreachable_message, MesosMode};
use crate::http::{ApiClient, HttpError};
use crate::plugin::{Plugin, Verdict};

/// Options shared by every endpoint probe
#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
    /// Servers, comma separated
    #[arg(short = 's', long, default_value = "localhost")]
    pub server: String,

    /// Port (defaults to the service's usual port)
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Timeout in seconds
    #[arg(short = 't', long, default_value_t = 5)]
    pub timeout: u64,
}

/// Options of the `chronos` and `metronome` probes
#[derive(Args, Debug, Clone)]
pub struct JobApiArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Endpoint URI
    #[arg(short = 'u', long)]
    pub uri: Option<String>,
}

/// Options of the `mesos` probe
#[derive(Args, Debug, Clone)]
pub struct MesosArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Which Mesos process to probe
    #[arg(short = 'm', long, value_enum)]
    pub mode: MesosMode,
}

/// One service answering on a well-known path
pub struct EndpointCheck {
    name: &'static str,
    service: String,
    path: String,
    port: u16,
    servers: String,
    timeout: Duration,
}

impl EndpointCheck {
    pub fn marathon(args: EndpointArgs) -> Self {
        Self::build("MarathonNodeStatus", "Marathon Service".into(), "/ping", 8080, args)
    }

    pub fn mesos(args: MesosArgs) -> Self {
        let mode = args.mode;
        Self::build(
            "MesosNodeStatus",
            format!("Mesos {}", mode.as_str()),
            mode.health_path(),
            mode.default_port(),
            args.endpoint,
        )
    }

    pub fn chronos(args: JobApiArgs) -> Self {
        let path = args.uri.unwrap_or_else(|| "/scheduler/jobs".to_string());
        Self::build("ChronosNodeStatus", "Chronos".into(), &path, 80, args.endpoint)
    }

    pub fn metronome(args: JobApiArgs) -> Self {
        let path = args.uri.unwrap_or_else(|| "/v1/jobs".to_string());
        Self::build("MetronomeNodeStatus", "Metronome".into(), &path, 9942, args.endpoint)
    }

    fn build(
        name: &'static str,
        service: String,
        path: &str,
        default_port: u16,
        args: EndpointArgs,
    ) -> Self {
        EndpointCheck {
            name,
            service,
            path: path.to_string(),
            port: args.port.unwrap_or(default_port),
            servers: args.server,
            timeout: Duration::from_secs(args.timeout),
        }
    }

    async fn probe(&self, client: &ApiClient, server: &str) -> Result<(), HttpError> {
        let url = format!("http://{}:{}{}", server, self.port, self.path);
        let response = client.get(&url).await?;
        let status = response.status().as_u16();
        debug!("{} answered HTTP {}", url, status);

        if status == 200 {
            Ok(())
        } else {
            Err(HttpError::Status {
                url,
                status,
                body: String::new(),
            })
        }
    }
}

#[async_trait]
impl Plugin for EndpointCheck {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self) -> Verdict {
        let client = match ApiClient::new(self.timeout, None) {
            Ok(client) => client,
            Err(e) => return Verdict::unknown(e.to_string()),
        };

        let servers = server_list(&self.servers);
        if servers.is_empty() {
            return Verdict::unknown("No server to check, please set --server");
        }

        let mut failures = Vec::new();
        for server in servers {
            if let Err(e) = self.probe(&client, server).await {
                let subject = format!("{} on {}", self.service, server);
                failures.push(unreachable_message(&subject, &e));
            }
        }

        if failures.is_empty() {
            Verdict::ok(format!("{} is up on {}", self.service, self.servers))
        } else {
            Verdict::critical(failures.join("\n"))
        }
    }
}
