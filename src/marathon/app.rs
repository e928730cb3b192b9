// Application snapshot - permissive accessors over the Marathon app payload
//
// Marathon omits fields freely (no deployments, no health checks, counters
// missing on suspended apps). Every accessor here has a defined default so
// classification never has to care: 0 for counters, empty for lists, absent
// for the queue's tri-state `overdue` flag.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One application as returned by `GET /v2/apps`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Application {
    raw: Map<String, Value>,
}

impl Application {
    /// Hierarchical identifier, e.g. `/team/web`. Empty when absent.
    pub fn id(&self) -> &str {
        self.raw.get("id").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn instances(&self) -> i64 {
        self.count("instances")
    }

    pub fn tasks_running(&self) -> i64 {
        self.count("tasksRunning")
    }

    pub fn tasks_staged(&self) -> i64 {
        self.count("tasksStaged")
    }

    pub fn tasks_healthy(&self) -> i64 {
        self.count("tasksHealthy")
    }

    pub fn tasks_unhealthy(&self) -> i64 {
        self.count("tasksUnhealthy")
    }

    pub fn task_count(&self) -> usize {
        self.list_len("tasks")
    }

    pub fn deployment_count(&self) -> usize {
        self.list_len("deployments")
    }

    pub fn health_check_count(&self) -> usize {
        self.list_len("healthChecks")
    }

    /// Labels as strings; non-string label values are rendered as JSON.
    pub fn labels(&self) -> BTreeMap<String, String> {
        let Some(Value::Object(labels)) = self.raw.get("labels") else {
            return BTreeMap::new();
        };

        labels
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()
    }

    /// Copies the top-level fields named in `keys` that are present.
    pub fn metadata(&self, keys: &[String]) -> Map<String, Value> {
        self.raw
            .iter()
            .filter(|(k, _)| keys.iter().any(|key| key == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Reads a counter as an integer.
    ///
    /// Numbers are truncated, numeric strings are parsed, anything else
    /// (absent, null, garbage) counts as zero.
    pub fn count(&self, key: &str) -> i64 {
        match self.raw.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or_default(),
            Some(Value::String(s)) => leading_integer(s),
            _ => 0,
        }
    }

    fn list_len(&self, key: &str) -> usize {
        match self.raw.get(key) {
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        }
    }
}

/// Parses the leading integer of a string, `"12abc"` is 12 and `"abc"` is 0.
fn leading_integer(s: &str) -> i64 {
    let trimmed = s.trim_start();
    let digits_end = trimmed
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    trimmed[..digits_end].parse().unwrap_or_default()
}

/// Launch-queue entry for one application (`GET /v2/queue`)
///
/// Entries without a string `app.id` never match any application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueEntry {
    raw: Value,
}

impl QueueEntry {
    pub fn app_id(&self) -> Option<&str> {
        self.raw.get("app")?.get("id")?.as_str()
    }

    /// `Some(true)` once the backoff expired, `Some(false)` while it runs,
    /// `None` when the entry carries no boolean delay information.
    pub fn overdue(&self) -> Option<bool> {
        self.raw.get("delay")?.get("overdue")?.as_bool()
    }
}

/// Finds the queue entry for `app_id`; the first exact match wins.
pub fn find_queue_entry<'a>(queue: &'a [QueueEntry], app_id: &str) -> Option<&'a QueueEntry> {
    queue.iter().find(|entry| entry.app_id() == Some(app_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app(value: Value) -> Application {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let a = app(json!({"id": "/x"}));
        assert_eq!(a.id(), "/x");
        assert_eq!(a.instances(), 0);
        assert_eq!(a.tasks_running(), 0);
        assert_eq!(a.task_count(), 0);
        assert_eq!(a.deployment_count(), 0);
        assert_eq!(a.health_check_count(), 0);
        assert!(a.labels().is_empty());
    }

    #[test]
    fn test_permissive_counters() {
        let a = app(json!({
            "instances": "3",
            "tasksRunning": 2.7,
            "tasksStaged": null,
            "tasksHealthy": "abc",
            "tasksUnhealthy": "4 tasks",
            "tasks": "not a list"
        }));
        assert_eq!(a.instances(), 3);
        assert_eq!(a.tasks_running(), 2);
        assert_eq!(a.tasks_staged(), 0);
        assert_eq!(a.tasks_healthy(), 0);
        assert_eq!(a.tasks_unhealthy(), 4);
        assert_eq!(a.task_count(), 0);
    }

    #[test]
    fn test_labels_and_metadata() {
        let a = app(json!({
            "id": "/x",
            "version": "2018-02-20T15:09:43.086Z",
            "cmd": "sleep 100",
            "labels": {"SENSU_MARATHON_TTL": "10", "PORT": 8080}
        }));
        let labels = a.labels();
        assert_eq!(labels["SENSU_MARATHON_TTL"], "10");
        assert_eq!(labels["PORT"], "8080");

        let keys = vec!["id".to_string(), "version".to_string(), "tasksRunning".to_string()];
        let meta = a.metadata(&keys);
        assert_eq!(meta.len(), 2);
        assert!(meta.contains_key("version"));
        assert!(!meta.contains_key("cmd"));
    }

    #[test]
    fn test_queue_entry_overdue_tristate() {
        let entries: Vec<QueueEntry> = serde_json::from_value(json!([
            {"app": {"id": "/late"}, "delay": {"overdue": true}},
            {"app": {"id": "/backoff"}, "delay": {"overdue": false}},
            {"app": {"id": "/nodelay"}},
            {"app": {"id": "/weird"}, "delay": {"overdue": "yes"}},
            {"app": {"id": "/late"}, "delay": {"overdue": false}}
        ]))
        .unwrap();

        assert_eq!(find_queue_entry(&entries, "/late").unwrap().overdue(), Some(true));
        assert_eq!(find_queue_entry(&entries, "/backoff").unwrap().overdue(), Some(false));
        assert_eq!(find_queue_entry(&entries, "/nodelay").unwrap().overdue(), None);
        assert_eq!(find_queue_entry(&entries, "/weird").unwrap().overdue(), None);
        assert!(find_queue_entry(&entries, "/la").is_none());
    }

    #[test]
    fn test_malformed_queue_entries_never_match() {
        let entries: Vec<QueueEntry> = serde_json::from_value(json!([
            {"app": null, "delay": {"overdue": true}},
            {"app": {"id": 7}, "delay": {"overdue": true}},
            {"delay": null},
            null,
            {"app": {"id": "/web"}, "delay": {"overdue": false}}
        ]))
        .unwrap();

        assert_eq!(entries[0].app_id(), None);
        assert_eq!(entries[1].app_id(), None);
        assert_eq!(entries[3].overdue(), None);
        assert_eq!(find_queue_entry(&entries, "/web").unwrap().overdue(), Some(false));
    }
}
