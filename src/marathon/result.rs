// Check-result builder - turns one classified app into a publishable result
//
// A result starts from a fixed scaffold, receives six overlay layers in
// precedence order (check config `_`, `<reference>._`, `<reference>.<state>`,
// then the same three from the app labels), gets its name and output, and is
// finally coerced to the field types the result sink expects.

use serde::Serialize;
use serde_json::{Number, Value};
use thiserror::Error;

use super::app::Application;
use super::classify::Reference;
use super::overlay::{Fields, Overlay};

/// Source reported for every result unless an overlay says otherwise
pub const RESULT_SOURCE: &str = "marathon";

/// Severity used when no overlay sets one
const UNKNOWN_SEVERITY: i64 = 3;

/// Errors that can occur while normalizing result fields
#[derive(Error, Debug, PartialEq)]
pub enum CoercionError {
    #[error("field '{field}' must be an integer, found {value}")]
    NotAnInteger { field: String, value: Value },

    #[error("field '{field}' must be a comma separated list, found {value}")]
    NotAList { field: String, value: Value },
}

/// Target type of a well-known result field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Boolean,
    Integer,
    List,
}

/// Static field-name table; fields not listed pass through untouched.
pub fn field_type(name: &str) -> Option<FieldType> {
    match name {
        "publish" | "standalone" | "auto_resolve" | "force_resolve" | "handle"
        | "truncate_output" => Some(FieldType::Boolean),
        "status" | "interval" | "issued" | "executed" | "timeout" | "ttl" | "ttl_status"
        | "low_flap_threshold" | "high_flap_threshold" | "truncate_output_length" => {
            Some(FieldType::Integer)
        }
        "subscribers" | "handlers" | "aggregates" => Some(FieldType::List),
        _ => None,
    }
}

/// Normalizes every well-known field in place.
pub fn coerce_fields(fields: &mut Fields) -> Result<(), CoercionError> {
    for (name, value) in fields.iter_mut() {
        let Some(kind) = field_type(name) else {
            continue;
        };

        *value = match kind {
            FieldType::Boolean => Value::Bool(to_boolean(value)),
            FieldType::Integer => {
                to_integer(value)
                    .map(Value::from)
                    .ok_or_else(|| CoercionError::NotAnInteger {
                        field: name.clone(),
                        value: value.clone(),
                    })?
            }
            FieldType::List => to_list(value).ok_or_else(|| CoercionError::NotAList {
                field: name.clone(),
                value: value.clone(),
            })?,
        };
    }

    Ok(())
}

/// Only a literal `true` (boolean or string) is true.
fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        _ => false,
    }
}

fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Splits on commas, dropping trailing empty items; lists pass through.
fn to_list(value: &Value) -> Option<Value> {
    match value {
        Value::Array(_) => Some(value.clone()),
        Value::String(s) => {
            let mut items: Vec<&str> = s.split(',').collect();
            while items.last().is_some_and(|item| item.is_empty()) {
                items.pop();
            }
            Some(Value::Array(
                items.into_iter().map(|i| Value::String(i.to_string())).collect(),
            ))
        }
        _ => None,
    }
}

/// A check result ready to be posted to the sink
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CheckResult(Fields);

impl CheckResult {
    pub fn name(&self) -> &str {
        self.0.get("name").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn output(&self) -> &str {
        self.0.get("output").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn status(&self) -> Option<i64> {
        self.0.get("status").and_then(Value::as_i64)
    }
}

#[cfg(test)]
impl CheckResult {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

/// Result name for one app and reference; `/` never appears in it.
pub fn result_name(app_id: &str, reference: Reference) -> String {
    format!(
        "check_marathon_app_{}_{}",
        app_id.trim_start_matches('/').replace('/', "_"),
        reference
    )
}

/// Human-readable output line, e.g. `STATUS Running - tasksRunning(1), ...`.
pub fn result_output(app: &Application, reference: Reference, state: &str) -> String {
    format!(
        "{} {} - tasksRunning({}), tasksStaged({}), tasksHealthy({}), tasksUnhealthy({})",
        reference.as_str().to_uppercase(),
        capitalize(state),
        app.tasks_running(),
        app.tasks_staged(),
        app.tasks_healthy(),
        app.tasks_unhealthy()
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Builds check results from a fixed check config
///
/// The check config (builtin/inline/file default plus overrides) is
/// resolved once per run and owned here; labels vary per application.
#[derive(Debug, Clone)]
pub struct CheckResultBuilder {
    check_config: Overlay,
    marathon_keys: Vec<String>,
}

impl CheckResultBuilder {
    pub fn new(check_config: Overlay, marathon_keys: Vec<String>) -> Self {
        CheckResultBuilder {
            check_config,
            marathon_keys,
        }
    }

    fn scaffold(&self, app: &Application, executed: i64) -> Fields {
        let mut fields = Fields::new();
        fields.insert("name".into(), Value::String(String::new()));
        fields.insert("executed".into(), Value::Number(Number::from(executed)));
        fields.insert("marathon".into(), Value::Object(app.metadata(&self.marathon_keys)));
        fields.insert("source".into(), Value::String(RESULT_SOURCE.to_string()));
        fields.insert("output".into(), Value::String(String::new()));
        fields.insert("status".into(), Value::Number(Number::from(UNKNOWN_SEVERITY)));
        fields
    }

    /// Builds the result for `app` classified as `state` on `reference`.
    pub fn build(
        &self,
        app: &Application,
        reference: Reference,
        state: &str,
        labels: &Overlay,
        executed: i64,
    ) -> Result<CheckResult, CoercionError> {
        let mut fields = self.scaffold(app, executed);

        let layers = self
            .check_config
            .layers(reference, state)
            .into_iter()
            .chain(labels.layers(reference, state))
            .flatten();
        for layer in layers {
            fields.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        fields.insert("name".into(), Value::String(result_name(app.id(), reference)));
        fields.insert(
            "output".into(),
            Value::String(result_output(app, reference, state)),
        );

        coerce_fields(&mut fields)?;
        Ok(CheckResult(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marathon::overlay::parse_labels;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn app(value: Value) -> Application {
        serde_json::from_value(value).unwrap()
    }

    fn keys() -> Vec<String> {
        ["id", "version", "tasksRunning"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_field_table() {
        assert_eq!(field_type("handle"), Some(FieldType::Boolean));
        assert_eq!(field_type("ttl"), Some(FieldType::Integer));
        assert_eq!(field_type("handlers"), Some(FieldType::List));
        assert_eq!(field_type("aggregate"), None);
    }

    #[test]
    fn test_coercion() {
        let mut fields = json!({
            "handle": "false",
            "publish": "true",
            "standalone": 1,
            "subscribers": "a,b",
            "handlers": ["x"],
            "aggregates": "",
            "status": "2",
            "ttl": 70.9,
            "aggregate": "component"
        })
        .as_object()
        .unwrap()
        .clone();

        coerce_fields(&mut fields).unwrap();
        assert_eq!(fields["handle"], json!(false));
        assert_eq!(fields["publish"], json!(true));
        assert_eq!(fields["standalone"], json!(false));
        assert_eq!(fields["subscribers"], json!(["a", "b"]));
        assert_eq!(fields["handlers"], json!(["x"]));
        assert_eq!(fields["aggregates"], json!([]));
        assert_eq!(fields["status"], json!(2));
        assert_eq!(fields["ttl"], json!(70));
        assert_eq!(fields["aggregate"], json!("component"));
    }

    #[test]
    fn test_coercion_errors() {
        let mut fields = json!({"ttl": "ten"}).as_object().unwrap().clone();
        assert!(matches!(
            coerce_fields(&mut fields),
            Err(CoercionError::NotAnInteger { .. })
        ));

        let mut fields = json!({"subscribers": 3}).as_object().unwrap().clone();
        assert!(matches!(coerce_fields(&mut fields), Err(CoercionError::NotAList { .. })));
    }

    #[test]
    fn test_name_and_output() {
        assert_eq!(
            result_name("/team/web", Reference::Health),
            "check_marathon_app_team_web_health"
        );

        let a = app(json!({"tasksRunning": 1, "tasksHealthy": "1"}));
        assert_eq!(
            result_output(&a, Reference::Status, "running"),
            "STATUS Running - tasksRunning(1), tasksStaged(0), tasksHealthy(1), tasksUnhealthy(0)"
        );
        assert_eq!(
            result_output(&a, Reference::Health, ""),
            "HEALTH  - tasksRunning(1), tasksStaged(0), tasksHealthy(1), tasksUnhealthy(0)"
        );
    }

    #[test]
    fn test_merge_precedence() {
        let config = Overlay::from_json(
            r#"{"_": {"ttl": 70}, "status": {"running": {"status": 0}}}"#,
        )
        .unwrap();
        let builder = CheckResultBuilder::new(config, keys());

        let mut labels = BTreeMap::new();
        labels.insert("SENSU_MARATHON_STATUS_RUNNING_STATUS".to_string(), "5".to_string());
        let labels = parse_labels(&labels);

        let a = app(json!({"id": "/web", "instances": 1, "tasksRunning": 1}));
        let result = builder
            .build(&a, Reference::Status, "running", &labels, 1_519_305_736)
            .unwrap();

        assert_eq!(result.status(), Some(5));
        assert_eq!(result.get("ttl"), Some(&json!(70)));
        assert_eq!(result.get("executed"), Some(&json!(1_519_305_736)));
    }

    #[test]
    fn test_layer_order() {
        let config = Overlay::from_json(
            r#"{
                "_": {"aggregate": "global", "source": "cfg"},
                "health": {"_": {"aggregate": "health"}, "unknown": {"status": 0}}
            }"#,
        )
        .unwrap();
        let builder = CheckResultBuilder::new(config, keys());

        let mut raw = BTreeMap::new();
        raw.insert("SENSU_MARATHON_SOURCE".to_string(), "label".to_string());
        raw.insert("SENSU_MARATHON_HEALTH_AGGREGATE".to_string(), "mine".to_string());
        let labels = parse_labels(&raw);

        let a = app(json!({"id": "/x", "tasks": [{}], "instances": 1, "tasksRunning": 1}));
        let health = builder.build(&a, Reference::Health, "unknown", &labels, 0).unwrap();
        assert_eq!(health.get("aggregate"), Some(&json!("mine")));
        assert_eq!(health.get("source"), Some(&json!("label")));
        assert_eq!(health.status(), Some(0));

        let status = builder.build(&a, Reference::Status, "running", &labels, 0).unwrap();
        assert_eq!(status.get("aggregate"), Some(&json!("global")));
        assert_eq!(status.status(), Some(3));
    }

    #[test]
    fn test_scaffold_fields() {
        let builder = CheckResultBuilder::new(Overlay::default(), keys());
        let a = app(json!({"id": "/x", "version": "v1", "cmd": "sleep", "tasksRunning": 2}));
        let result = builder
            .build(&a, Reference::Status, "", &Overlay::default(), 42)
            .unwrap();

        assert_eq!(result.name(), "check_marathon_app_x_status");
        assert_eq!(result.get("source"), Some(&json!(RESULT_SOURCE)));
        assert_eq!(result.status(), Some(3));
        assert_eq!(
            result.get("marathon"),
            Some(&json!({"id": "/x", "version": "v1", "tasksRunning": 2}))
        );
    }
}
