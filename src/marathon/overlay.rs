// Check-config overlays - nested field overrides keyed by reference and state
//
// An overlay has three levels of fields:
//   `_`                      defaults for every check result
//   `<reference>._`          defaults for one reference (health or status)
//   `<reference>.<state>`    fields for one classified state
//
// Overlays come from the default check config JSON, from the overrides JSON
// and from `SENSU_MARATHON_*` application labels.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use super::classify::Reference;
use crate::config::ConfigError;

/// Flat set of check result fields
pub type Fields = Map<String, Value>;

/// Key holding defaults at any level of a check config
const DEFAULTS_KEY: &str = "_";

/// Label prefix selecting check-config labels
const LABEL_PREFIX: &str = "SENSU_MARATHON";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    defaults: Fields,
    references: BTreeMap<Reference, ReferenceOverlay>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ReferenceOverlay {
    defaults: Fields,
    states: BTreeMap<String, Fields>,
}

impl Overlay {
    /// Parses a check config document such as the builtin default.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidCheckConfig {
            message,
            json: json.to_string(),
        };

        let value: Value = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
        Self::from_value(value).map_err(invalid)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        let Value::Object(top) = value else {
            return Err("check config must be a JSON object".to_string());
        };

        let mut overlay = Overlay::default();
        for (key, value) in top {
            if key == DEFAULTS_KEY {
                overlay.defaults = expect_object(value, DEFAULTS_KEY)?;
                continue;
            }

            let Some(reference) = Reference::parse(&key) else {
                debug!("Ignoring unknown check config section '{}'", key);
                continue;
            };

            let section = expect_object(value, &key)?;
            let entry = overlay.references.entry(reference).or_default();
            for (state, fields) in section {
                let fields = expect_object(fields, &format!("{}.{}", key, state))?;
                if state == DEFAULTS_KEY {
                    entry.defaults = fields;
                } else {
                    entry.states.insert(state, fields);
                }
            }
        }

        Ok(overlay)
    }

    /// Builds an overlay from application labels.
    ///
    /// `SENSU_MARATHON_[<REFERENCE>_[<STATE>_]]<FIELD...>`: the constant
    /// segments are dropped, the rest is lower-cased, a leading reference
    /// and (after it) a valid state for that reference are consumed, and
    /// the remaining segments joined by a space name the field.
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Self {
        let mut overlay = Overlay::default();

        for (label, value) in labels {
            let has_prefix = label
                .get(..LABEL_PREFIX.len())
                .is_some_and(|p| p.eq_ignore_ascii_case(LABEL_PREFIX));
            if !has_prefix {
                continue;
            }

            let mut segments: Vec<String> = label
                .split('_')
                .filter(|s| {
                    !s.is_empty()
                        && !s.eq_ignore_ascii_case("SENSU")
                        && !s.eq_ignore_ascii_case("MARATHON")
                })
                .map(str::to_lowercase)
                .collect();

            let reference = segments.first().and_then(|s| Reference::parse(s));
            if reference.is_some() {
                segments.remove(0);
            }

            let has_state = matches!(
                (reference, segments.first()),
                (Some(r), Some(s)) if r.is_state(s)
            );
            let state = has_state.then(|| segments.remove(0));

            let field = segments.join(" ");
            if field.is_empty() {
                debug!("Ignoring label '{}' without a field name", label);
                continue;
            }

            overlay
                .fields_mut(reference, state.as_deref())
                .insert(field, Value::String(value.clone()));
        }

        overlay
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty() && self.references.is_empty()
    }

    /// Global `_` fields.
    pub fn defaults(&self) -> &Fields {
        &self.defaults
    }

    /// `<reference>._` fields.
    pub fn reference_defaults(&self, reference: Reference) -> Option<&Fields> {
        self.references.get(&reference).map(|r| &r.defaults)
    }

    /// `<reference>.<state>` fields.
    pub fn state_fields(&self, reference: Reference, state: &str) -> Option<&Fields> {
        self.references.get(&reference)?.states.get(state)
    }

    /// The three layers relevant to one result, lowest precedence first.
    pub fn layers(&self, reference: Reference, state: &str) -> [Option<&Fields>; 3] {
        [
            Some(self.defaults()),
            self.reference_defaults(reference),
            self.state_fields(reference, state),
        ]
    }

    /// Merges `other` on top of `self`, field by field at every level.
    pub fn merge(&mut self, other: Overlay) {
        self.defaults.extend(other.defaults);
        for (reference, theirs) in other.references {
            let ours = self.references.entry(reference).or_default();
            ours.defaults.extend(theirs.defaults);
            for (state, fields) in theirs.states {
                ours.states.entry(state).or_default().extend(fields);
            }
        }
    }

    fn fields_mut(&mut self, reference: Option<Reference>, state: Option<&str>) -> &mut Fields {
        let Some(reference) = reference else {
            return &mut self.defaults;
        };

        let entry = self.references.entry(reference).or_default();
        match state {
            Some(state) => entry.states.entry(state.to_string()).or_default(),
            None => &mut entry.defaults,
        }
    }
}

/// Parses application labels into an overlay.
pub fn parse_labels(labels: &BTreeMap<String, String>) -> Overlay {
    Overlay::from_labels(labels)
}

fn expect_object(value: Value, path: &str) -> Result<Fields, String> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!("'{}' must be a JSON object, found {}", path, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_labels_give_empty_overlay() {
        assert!(parse_labels(&BTreeMap::new()).is_empty());
        assert!(parse_labels(&labels(&[("HAPROXY_GROUP", "external")])).is_empty());
    }

    #[test]
    fn test_state_label() {
        let overlay = parse_labels(&labels(&[("SENSU_MARATHON_STATUS_RUNNING_TTL", "10")]));
        assert_eq!(
            overlay.state_fields(Reference::Status, "running"),
            Some(&json!({"ttl": "10"}).as_object().unwrap().clone())
        );
        assert!(overlay.defaults().is_empty());
    }

    #[test]
    fn test_label_levels() {
        let overlay = parse_labels(&labels(&[
            ("SENSU_MARATHON_AGGREGATE", "component"),
            ("SENSU_MARATHON_STATUS_HANDLE", "false"),
            ("SENSU_MARATHON_HEALTH_UNKNOWN_STATUS", "3"),
            ("sensu_marathon_health_contact_team", "support"),
        ]));

        assert_eq!(overlay.defaults().get("aggregate"), Some(&json!("component")));
        assert_eq!(
            overlay.reference_defaults(Reference::Status).unwrap().get("handle"),
            Some(&json!("false"))
        );
        assert_eq!(
            overlay.state_fields(Reference::Health, "unknown").unwrap().get("status"),
            Some(&json!("3"))
        );
        assert_eq!(
            overlay.reference_defaults(Reference::Health).unwrap().get("contact team"),
            Some(&json!("support"))
        );
    }

    #[test]
    fn test_state_of_other_reference_is_a_field() {
        // "healthy" is not a status state, so it stays part of the field name.
        let overlay = parse_labels(&labels(&[("SENSU_MARATHON_STATUS_HEALTHY_TTL", "5")]));
        assert_eq!(
            overlay.reference_defaults(Reference::Status).unwrap().get("healthy ttl"),
            Some(&json!("5"))
        );

        // A state without a reference is never consumed.
        let overlay = parse_labels(&labels(&[("SENSU_MARATHON_RUNNING_TTL", "5")]));
        assert_eq!(overlay.defaults().get("running ttl"), Some(&json!("5")));
    }

    #[test]
    fn test_label_without_field_is_ignored() {
        let overlay = parse_labels(&labels(&[("SENSU_MARATHON_STATUS_RUNNING", "x")]));
        assert!(overlay.is_empty());
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(Overlay::from_json("[]").is_err());
        assert!(Overlay::from_json(r#"{"_": 5}"#).is_err());
        assert!(Overlay::from_json(r#"{"status": {"running": "x"}}"#).is_err());

        let overlay = Overlay::from_json(r#"{"other": 1, "status": {"_": {"ttl": 5}}}"#).unwrap();
        assert_eq!(
            overlay.reference_defaults(Reference::Status).unwrap().get("ttl"),
            Some(&json!(5))
        );
    }

    #[test]
    fn test_merge_is_field_level() {
        let mut base = Overlay::from_json(
            r#"{"_": {"ttl": 70, "source": "m"}, "status": {"running": {"status": 0, "ttl": 1}}}"#,
        )
        .unwrap();
        let top = Overlay::from_json(r#"{"_": {"ttl": 80}, "status": {"running": {"ttl": 2}}}"#)
            .unwrap();
        base.merge(top);

        assert_eq!(base.defaults().get("ttl"), Some(&json!(80)));
        assert_eq!(base.defaults().get("source"), Some(&json!("m")));
        let running = base.state_fields(Reference::Status, "running").unwrap();
        assert_eq!(running.get("status"), Some(&json!(0)));
        assert_eq!(running.get("ttl"), Some(&json!(2)));
    }
}
