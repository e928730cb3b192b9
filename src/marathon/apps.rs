// Marathon apps check - publishes a health and a status result per app
//
// # Flow
// 1. Validate options (credentials, patterns, check config)
// 2. Fetch apps and the launch queue
// 3. For each app passing the filters, for each reference:
//    classify, build the result, publish it to the sensu client socket
// 4. Report OK, or CRITICAL with the number of results that failed
//
// Publishing failures never stop the pass: every remaining result is
// still attempted and only the total is reported.

use async_trait::async_trait;
use chrono::Utc;
use clap::Args;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::app::{find_queue_entry, Application, QueueEntry};
use super::classify::{classify, Reference};
use super::overlay::parse_labels;
use super::result::{CheckResult, CheckResultBuilder};
use super::MarathonApi;
use crate::config::{compile_pattern, CheckConfigOptions, ConfigError, Credentials};
use crate::http::{ApiClient, HttpError};
use crate::plugin::{Plugin, Verdict};

/// Metadata keys copied into the `marathon` field of every result
pub const DEFAULT_MARATHON_KEYS: &str =
    "id,version,versionInfo,tasksStaged,tasksRunning,tasksHealthy,tasksUnhealthy,lastTaskFailure";

/// Options of the `marathon-apps` plugin
#[derive(Args, Debug, Clone)]
pub struct MarathonAppsArgs {
    /// Marathon API URL
    #[arg(short = 'u', long, default_value = "http://localhost:8080")]
    pub url: String,

    /// Marathon API username
    #[arg(long)]
    pub username: Option<String>,

    /// Marathon API password
    #[arg(long)]
    pub password: Option<String>,

    /// Only check apps whose id matches this pattern
    #[arg(short = 'm', long)]
    pub match_pattern: Option<String>,

    /// Skip apps whose id matches this pattern, takes precedence over --match-pattern
    #[arg(short = 'x', long)]
    pub exclude_pattern: Option<String>,

    /// Keys of the Marathon app copied into the check results
    #[arg(long, default_value = DEFAULT_MARATHON_KEYS)]
    pub marathon_keys: String,

    /// Default check config as JSON, overridable per app via labels
    #[arg(long)]
    pub default_check_config: Option<String>,

    /// Same as --default-check-config but read from a file; the inline value wins
    #[arg(long)]
    pub default_check_config_file: Option<PathBuf>,

    /// JSON merged field by field on top of the default check config
    #[arg(long, default_value = "{}")]
    pub check_config_overrides: String,

    /// Sensu client HTTP URL
    #[arg(long, default_value = "http://localhost:3031")]
    pub sensu_client_url: String,

    /// Timeout in seconds for every HTTP call
    #[arg(short = 'T', long, default_value_t = 5)]
    pub timeout: u64,
}

/// Destination of check results
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn publish(&self, result: &CheckResult) -> Result<(), HttpError>;
}

/// Posts results to the sensu client HTTP socket (`POST /results`)
pub struct SensuClientSink<'a> {
    client: &'a ApiClient,
    results_url: String,
}

impl<'a> SensuClientSink<'a> {
    pub fn new(client: &'a ApiClient, base_url: &str) -> Self {
        SensuClientSink {
            client,
            results_url: format!("{}/results", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl ResultSink for SensuClientSink<'_> {
    async fn publish(&self, result: &CheckResult) -> Result<(), HttpError> {
        self.client.post_json(&self.results_url, result).await
    }
}

/// Include/exclude filtering on application ids
#[derive(Debug, Clone, Default)]
pub struct AppFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl AppFilter {
    pub fn new(include: Option<Regex>, exclude: Option<Regex>) -> Self {
        AppFilter { include, exclude }
    }

    /// Exclusion wins over inclusion.
    pub fn allows(&self, app_id: &str) -> bool {
        if self.exclude.as_ref().is_some_and(|re| re.is_match(app_id)) {
            return false;
        }
        self.include.as_ref().map_or(true, |re| re.is_match(app_id))
    }
}

/// Outcome of one fan-out pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Applications that passed the filters
    pub apps: usize,

    /// Results built or attempted (two per application)
    pub attempted: usize,

    /// Results that could not be built or were rejected by the sink
    pub failed: usize,
}

impl FanOutReport {
    pub fn verdict(&self) -> Verdict {
        if self.failed > 0 {
            Verdict::critical(format!(
                "{} of {} check results failed to be reported to sensu",
                self.failed, self.attempted
            ))
        } else {
            Verdict::ok("Marathon Apps Status and Health check is running properly")
        }
    }
}

/// Classifies, builds and publishes both results of every allowed app.
pub async fn fan_out(
    apps: &[Application],
    queue: &[QueueEntry],
    filter: &AppFilter,
    builder: &CheckResultBuilder,
    sink: &dyn ResultSink,
) -> FanOutReport {
    let mut report = FanOutReport::default();

    for app in apps.iter().filter(|app| filter.allows(app.id())) {
        report.apps += 1;

        let queue_entry = find_queue_entry(queue, app.id());
        let labels = parse_labels(&app.labels());
        if !labels.is_empty() {
            debug!("App '{}' overrides its check config through labels", app.id());
        }
        let executed = Utc::now().timestamp();

        for reference in Reference::ALL {
            report.attempted += 1;

            let state = classify(reference, app, queue_entry);
            debug!("App '{}' {} is '{}'", app.id(), reference, state);

            let result = match builder.build(app, reference, state, &labels, executed) {
                Ok(result) => result,
                Err(e) => {
                    warn!("Cannot build {} result for app '{}': {}", reference, app.id(), e);
                    report.failed += 1;
                    continue;
                }
            };

            debug!(
                "Publishing {} with status {:?}: {}",
                result.name(),
                result.status(),
                result.output()
            );
            if let Err(e) = sink.publish(&result).await {
                warn!(
                    "Failed to publish check result {}: {}",
                    serde_json::to_string(&result).unwrap_or_default(),
                    e
                );
                report.failed += 1;
            }
        }
    }

    info!(
        "Published {}/{} check result(s) for {} app(s)",
        report.attempted - report.failed,
        report.attempted,
        report.apps
    );

    report
}

/// Validated settings of one run
struct Settings {
    credentials: Option<Credentials>,
    filter: AppFilter,
    builder: CheckResultBuilder,
    timeout: Duration,
}

/// The `marathon-apps` plugin
pub struct MarathonAppsCheck {
    args: MarathonAppsArgs,
}

impl MarathonAppsCheck {
    pub fn new(args: MarathonAppsArgs) -> Self {
        MarathonAppsCheck { args }
    }

    fn settings(&self) -> Result<Settings, ConfigError> {
        let args = &self.args;
        let credentials = Credentials::from_options(args.username.clone(), args.password.clone())?;

        let filter = AppFilter::new(
            compile_pattern(args.match_pattern.as_deref())?,
            compile_pattern(args.exclude_pattern.as_deref())?,
        );

        let check_config = CheckConfigOptions {
            inline: args.default_check_config.clone(),
            file: args.default_check_config_file.clone(),
            overrides: Some(args.check_config_overrides.clone()),
        }
        .load()?;

        let marathon_keys = args
            .marathon_keys
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        Ok(Settings {
            credentials,
            filter,
            builder: CheckResultBuilder::new(check_config, marathon_keys),
            timeout: Duration::from_secs(args.timeout),
        })
    }
}

#[async_trait]
impl Plugin for MarathonAppsCheck {
    fn name(&self) -> &str {
        "CheckMarathonApps"
    }

    async fn run(&self) -> Verdict {
        let settings = match self.settings() {
            Ok(settings) => settings,
            Err(e) => return Verdict::unknown(e.to_string()),
        };

        let client = match ApiClient::new(settings.timeout, settings.credentials) {
            Ok(client) => client,
            Err(e) => return Verdict::unknown(e.to_string()),
        };

        let api = MarathonApi::new(&client, &self.args.url);
        let apps = match api.fetch_apps().await {
            Ok(apps) => apps,
            Err(e) => return Verdict::critical(format!("Error while trying to GET apps: {}", e)),
        };
        let queue = match api.fetch_queue().await {
            Ok(queue) => queue,
            Err(e) => return Verdict::critical(format!("Error while trying to GET queue: {}", e)),
        };

        let sink = SensuClientSink::new(&client, &self.args.sensu_client_url);
        fan_out(&apps, &queue, &settings.filter, &settings.builder, &sink)
            .await
            .verdict()
    }
}
