//! The ordered result map produced by a pipeline run.

use crate::errors::FlowlineError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// The result of executing a pipeline.
///
/// Iteration order always equals the declared task order, regardless of the
/// order in which parallel batch members actually completed.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    run_id: String,
    started_at: DateTime<Utc>,
    duration_ms: f64,
    entries: Vec<(String, serde_json::Value)>,
    index: HashMap<String, usize>,
}

impl ExecutionReport {
    /// Creates an empty report stamped with a fresh run identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            duration_ms: 0.0,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// The unique identifier of this run.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// When the run started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Total execution time in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    pub(crate) fn set_duration_ms(&mut self, duration_ms: f64) {
        self.duration_ms = duration_ms;
    }

    /// Records a task result. A repeated name keeps its original position.
    pub(crate) fn insert(&mut self, name: String, value: serde_json::Value) {
        if let Some(&position) = self.index.get(&name) {
            self.entries[position].1 = value;
        } else {
            self.index.insert(name.clone(), self.entries.len());
            self.entries.push((name, value));
        }
    }

    /// Gets the result recorded under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.index.get(name).map(|&position| &self.entries[position].1)
    }

    /// Deserializes the result recorded under `name`.
    ///
    /// # Errors
    ///
    /// Returns `MissingResult` when no result is recorded under `name` and
    /// `Serialization` when the value does not match `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, FlowlineError> {
        let value = self
            .get(name)
            .ok_or_else(|| FlowlineError::MissingResult(name.to_string()))?;
        serde_json::from_value(value.clone())
            .map_err(|err| FlowlineError::Serialization(err.to_string()))
    }

    /// True when a result is recorded under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Task names in declared order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Name/value pairs in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// The number of recorded results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no results were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an unordered copy of all results.
    ///
    /// Use [`iter`](Self::iter) when declared order matters.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for ExecutionReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[test]
    fn test_insert_preserves_declared_order() {
        let mut report = ExecutionReport::new();
        report.insert("c".to_string(), serde_json::json!(3));
        report.insert("a".to_string(), serde_json::json!(1));
        report.insert("b".to_string(), serde_json::json!(2));

        let keys: Vec<&str> = report.keys().collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_repeated_name_keeps_position() {
        let mut report = ExecutionReport::new();
        report.insert("a".to_string(), serde_json::json!(1));
        report.insert("b".to_string(), serde_json::json!(2));
        report.insert("a".to_string(), serde_json::json!(9));

        let keys: Vec<&str> = report.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(report.get("a"), Some(&serde_json::json!(9)));
    }

    #[test]
    fn test_get_as_deserializes() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Card {
            number: String,
            active: bool,
        }

        let mut report = ExecutionReport::new();
        report.insert(
            "card".to_string(),
            serde_json::json!({"number": "4111", "active": true}),
        );

        let card: Card = report.get_as("card").unwrap();
        assert_eq!(
            card,
            Card {
                number: "4111".to_string(),
                active: true
            }
        );
    }

    #[test]
    fn test_get_as_missing_name() {
        let report = ExecutionReport::new();
        let result: Result<String, _> = report.get_as("absent");
        assert!(matches!(result, Err(FlowlineError::MissingResult(_))));
    }

    #[test]
    fn test_get_as_type_mismatch() {
        let mut report = ExecutionReport::new();
        report.insert("n".to_string(), serde_json::json!("not a number"));

        let result: Result<u32, _> = report.get_as("n");
        assert!(matches!(result, Err(FlowlineError::Serialization(_))));
    }

    #[test]
    fn test_to_dict_copies_everything() {
        let mut report = ExecutionReport::new();
        report.insert("a".to_string(), serde_json::json!(1));
        report.insert("b".to_string(), serde_json::json!(2));

        let dict = report.to_dict();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get("b"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn test_fresh_report_has_identity() {
        let report = ExecutionReport::new();
        assert!(!report.run_id().is_empty());
        assert!(report.is_empty());
        assert_eq!(report.duration_ms(), 0.0);
    }
}
