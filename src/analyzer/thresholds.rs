//! Detection thresholds
//!
//! Every rule reads its limits from here instead of baking in constants, so a
//! caller can tighten or relax detection without touching rule code.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    /// Calls to one method before recursion is flagged
    pub recursion_depth: usize,
    /// Calls to one method before recursion escalates to critical
    pub recursion_critical: usize,
    /// Trigger re-entries tolerated before re-fire is flagged
    pub trigger_reentry: usize,
    /// Governor usage percentage that raises a warning for SOQL and DML
    pub soql_usage_pct: u64,
    pub dml_usage_pct: u64,
    /// Governor usage percentage that raises a warning for CPU and heap
    pub cpu_usage_pct: u64,
    pub heap_usage_pct: u64,
    /// Governor usage percentage at which any limit finding turns critical
    pub critical_usage_pct: u64,
    /// Repeats of one normalized query before a loop is suspected
    pub loop_query_count: usize,
    /// Repeats of one parent-lookup query before N+1 is suspected
    pub n_plus_one_count: usize,
    /// Callouts to one host before chattiness is flagged
    pub callout_count: usize,
    /// Async enqueues that raise a warning, and the critical escalation point
    pub async_warning_count: usize,
    pub async_critical_count: usize,
    /// Validation failures tolerated before the log is flagged
    pub validation_failures: usize,
    /// Debug statements tolerated before log noise is flagged
    pub debug_statements: usize,
    /// Query row counts that flag a large result, info then warning
    pub large_result_rows: u64,
    pub very_large_result_rows: u64,
    /// Call stack depth beyond which the tree is considered pathological
    pub deep_stack: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            recursion_depth: 10,
            recursion_critical: 50,
            trigger_reentry: 3,
            soql_usage_pct: 70,
            dml_usage_pct: 70,
            cpu_usage_pct: 80,
            heap_usage_pct: 80,
            critical_usage_pct: 90,
            loop_query_count: 3,
            n_plus_one_count: 5,
            callout_count: 3,
            async_warning_count: 5,
            async_critical_count: 10,
            validation_failures: 3,
            debug_statements: 20,
            large_result_rows: 200,
            very_large_result_rows: 500,
            deep_stack: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_warning_below_critical() {
        let t = Thresholds::default();
        assert!(t.recursion_depth < t.recursion_critical);
        assert!(t.soql_usage_pct < t.critical_usage_pct);
        assert!(t.cpu_usage_pct < t.critical_usage_pct);
        assert!(t.async_warning_count < t.async_critical_count);
        assert!(t.large_result_rows < t.very_large_result_rows);
    }

    #[test]
    fn deserializes_partial_overrides_over_defaults() {
        let t: Thresholds = serde_json::from_str(r#"{"loopQueryCount": 2}"#).expect("json");
        assert_eq!(t.loop_query_count, 2);
        assert_eq!(t.debug_statements, Thresholds::default().debug_statements);
    }
}
