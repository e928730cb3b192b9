// Marathon module - application status/health checks for the orchestrator
//
// Submodules:
// - app:      permissive accessors over the apps and queue payloads
// - classify: status and health state derivation
// - overlay:  check-config overlays from JSON and app labels
// - result:   check-result building and field coercion
// - apps:     the fan-out driver publishing two results per app
// - task:     the single-app running task count check

use serde_json::Value;
use tracing::debug;

use crate::http::{parse_json, require_key, ApiClient, HttpError};

pub mod app;
pub mod apps;
pub mod classify;
pub mod overlay;
pub mod result;
pub mod task;

use app::{Application, QueueEntry};

/// Resources embedded in `GET /v2/apps` so counts and tasks are present
pub const APPS_EMBED_RESOURCES: [&str; 6] = [
    "apps.tasks",
    "apps.counts",
    "apps.deployments",
    "apps.lastTaskFailure",
    "apps.failures",
    "apps.taskStats",
];

/// Read-only access to one Marathon instance
pub struct MarathonApi<'a> {
    client: &'a ApiClient,
    base_url: String,
}

impl<'a> MarathonApi<'a> {
    pub fn new(client: &'a ApiClient, base_url: &str) -> Self {
        MarathonApi {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetches every application with its embedded resources.
    pub async fn fetch_apps(&self) -> Result<Vec<Application>, HttpError> {
        let query = APPS_EMBED_RESOURCES
            .iter()
            .map(|r| format!("embed={}", r))
            .collect::<Vec<_>>()
            .join("&");
        let apps = self.fetch_list(&format!("/v2/apps?{}", query), "apps").await?;
        debug!("Marathon returned {} app(s)", apps.len());
        Ok(apps)
    }

    /// Fetches the launch queue.
    pub async fn fetch_queue(&self) -> Result<Vec<QueueEntry>, HttpError> {
        self.fetch_list("/v2/queue", "queue").await
    }

    async fn fetch_list<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
    ) -> Result<Vec<T>, HttpError> {
        let url = format!("{}{}", self.base_url, path);
        let body = self.client.get_text(&url).await?;
        let document = parse_json(&body)?;
        let list = require_key(document, key, &body)?;
        decode_list(list, &body)
    }
}

fn decode_list<T: serde::de::DeserializeOwned>(
    list: Value,
    payload: &str,
) -> Result<Vec<T>, HttpError> {
    serde_json::from_value(list).map_err(|source| HttpError::Parse {
        payload: payload.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_apps_and_queue() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/apps"))
            .and(query_param("embed", "apps.tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apps": [{"id": "/a", "instances": 1}, {"id": "/b"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/queue"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "queue": [
                    {"app": null, "delay": {"overdue": false}},
                    {"app": {"id": "/b"}, "delay": {"overdue": true}}
                ]
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(Duration::from_secs(2), None).unwrap();
        let api = MarathonApi::new(&client, &format!("{}/", server.uri()));

        let apps = api.fetch_apps().await.unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].instances(), 1);

        let queue = api.fetch_queue().await.unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(app::find_queue_entry(&queue, "/b").unwrap().overdue(), Some(true));
    }

    #[tokio::test]
    async fn test_fetch_apps_schema_and_parse_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/apps"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"other\": 1}"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/queue"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = ApiClient::new(Duration::from_secs(2), None).unwrap();
        let api = MarathonApi::new(&client, &server.uri());

        assert!(matches!(
            api.fetch_apps().await,
            Err(HttpError::MissingKey { .. })
        ));
        let err = api.fetch_queue().await.unwrap_err();
        assert!(err.to_string().contains("<html>"));
    }
}
