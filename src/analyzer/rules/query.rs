//! SOQL-focused rules: loop detection, query shape, result sizes

use super::{ID_PREFIXES, PatternRule, RuleContext};
use crate::analyzer::heuristics::{is_sequential, normalize_query};
use crate::models::{Finding, PatternType, QueryRecord, Severity};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static PARENT_ID_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bWHERE\s+(\w*Id)\s*=").unwrap());
static LIMIT_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bLIMIT\b").unwrap());
static WHERE_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bWHERE\b").unwrap());
static SELECT_FIELDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bSELECT\b(.+?)\bFROM\b").unwrap());
static QUOTED_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'([a-zA-Z0-9]{18}|[a-zA-Z0-9]{15})'").unwrap());

fn is_aggregate(query: &str) -> bool {
    let upper = query.to_uppercase();
    ["COUNT(", "SUM(", "AVG(", "MIN(", "MAX("]
        .iter()
        .any(|f| upper.contains(f))
}

/// Group query records by normalized shape
fn group_by_shape<'a>(queries: &'a [QueryRecord]) -> HashMap<String, Vec<&'a QueryRecord>> {
    let mut groups: HashMap<String, Vec<&QueryRecord>> = HashMap::new();
    for record in queries {
        groups
            .entry(normalize_query(&record.query))
            .or_default()
            .push(record);
    }
    groups
}

/// Order grouped findings by first occurrence so output is deterministic
fn sort_groups<'a>(
    groups: HashMap<String, Vec<&'a QueryRecord>>,
) -> Vec<(String, Vec<&'a QueryRecord>)> {
    let mut ordered: Vec<_> = groups.into_iter().collect();
    ordered.sort_by_key(|(_, records)| records.first().map(|r| r.index).unwrap_or(0));
    ordered
}

// ============================================================================
// Repeated query in a loop
// ============================================================================

pub struct SoqlInLoopRule;

impl PatternRule for SoqlInLoopRule {
    fn name(&self) -> &'static str {
        "soql_in_loop"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (shape, records) in sort_groups(group_by_shape(&ctx.log.stats.queries)) {
            if records.len() < ctx.thresholds.loop_query_count {
                continue;
            }
            let indices: Vec<usize> = records.iter().map(|r| r.index).collect();
            if !is_sequential(&indices) {
                continue;
            }
            findings.push(Finding {
                pattern_type: PatternType::SoqlInLoop,
                severity: Severity::Critical,
                title: "SOQL query executed inside a loop".to_string(),
                description: format!(
                    "The same query shape ran {} times in quick succession: {}",
                    records.len(),
                    shape
                ),
                lines: indices,
                occurrences: records.len() as u32,
                example: records.first().map(|r| r.query.clone()),
                suggestion: "Move the query before the loop and collect results into a map keyed by the loop variable.".to_string(),
                impact: "Each iteration consumes one SOQL call against the 100-query governor limit; bulk data will hit the limit and abort the transaction.".to_string(),
            });
        }
        findings
    }
}

// ============================================================================
// N+1 parent lookups
// ============================================================================

pub struct NPlusOneRule;

impl PatternRule for NPlusOneRule {
    fn name(&self) -> &'static str {
        "n_plus_one"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        // only queries filtering on an Id-typed field with equality qualify
        let lookups: Vec<&QueryRecord> = ctx
            .log
            .stats
            .queries
            .iter()
            .filter(|r| PARENT_ID_FILTER.is_match(&r.query))
            .collect();

        let mut groups: HashMap<String, Vec<&QueryRecord>> = HashMap::new();
        for record in lookups {
            groups
                .entry(normalize_query(&record.query))
                .or_default()
                .push(record);
        }

        let mut findings = Vec::new();
        for (shape, records) in sort_groups(groups) {
            if records.len() < ctx.thresholds.n_plus_one_count {
                continue;
            }
            let indices: Vec<usize> = records.iter().map(|r| r.index).collect();
            if !is_sequential(&indices) {
                continue;
            }
            findings.push(Finding {
                pattern_type: PatternType::NPlusOne,
                severity: Severity::Critical,
                title: "N+1 query pattern".to_string(),
                description: format!(
                    "A per-record parent lookup ran {} times with only the id changing: {}",
                    records.len(),
                    shape
                ),
                lines: indices,
                occurrences: records.len() as u32,
                example: records.first().map(|r| r.query.clone()),
                suggestion: "Replace the per-record lookup with one query over the collected ids, or use a parent relationship field on the child query.".to_string(),
                impact: "Query count grows linearly with record count, so the transaction fails on realistic data volumes.".to_string(),
            });
        }
        findings
    }
}

// ============================================================================
// Unbounded queries
// ============================================================================

pub struct UnboundedQueryRule;

impl PatternRule for UnboundedQueryRule {
    fn name(&self) -> &'static str {
        "unbounded_query"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let queries = &ctx.log.stats.queries;

        let without_limit: Vec<&QueryRecord> = queries
            .iter()
            .filter(|r| {
                let upper = r.query.to_uppercase();
                !upper.contains("COUNT(") && !LIMIT_CLAUSE.is_match(&r.query)
            })
            .collect();
        let without_where: Vec<&QueryRecord> = queries
            .iter()
            .filter(|r| !is_aggregate(&r.query) && !WHERE_CLAUSE.is_match(&r.query))
            .collect();

        let mut findings = Vec::new();
        if !without_limit.is_empty() {
            findings.push(Finding {
                pattern_type: PatternType::SoqlWithoutLimit,
                severity: Severity::Warning,
                title: "SOQL without a LIMIT clause".to_string(),
                description: format!(
                    "{} quer{} ran without a LIMIT clause.",
                    without_limit.len(),
                    if without_limit.len() == 1 { "y" } else { "ies" }
                ),
                lines: without_limit.iter().map(|r| r.index).collect(),
                occurrences: without_limit.len() as u32,
                example: without_limit.first().map(|r| r.query.clone()),
                suggestion: "Add an explicit LIMIT sized to what the code actually consumes.".to_string(),
                impact: "Result size is bounded only by the data, risking heap exhaustion and the 50,000-row retrieval limit.".to_string(),
            });
        }
        if !without_where.is_empty() {
            findings.push(Finding {
                pattern_type: PatternType::SoqlWithoutWhere,
                severity: Severity::Warning,
                title: "SOQL without a WHERE clause".to_string(),
                description: format!(
                    "{} quer{} scanned an entire object with no filter.",
                    without_where.len(),
                    if without_where.len() == 1 { "y" } else { "ies" }
                ),
                lines: without_where.iter().map(|r| r.index).collect(),
                occurrences: without_where.len() as u32,
                example: without_where.first().map(|r| r.query.clone()),
                suggestion: "Filter on an indexed field, or justify the full scan with a selective aggregate instead.".to_string(),
                impact: "Full-object scans degrade with data growth and are flagged as non-selective on large objects.".to_string(),
            });
        }
        findings
    }
}

// ============================================================================
// Wide selects
// ============================================================================

pub struct TooManyFieldsRule;

const MAX_SELECT_FIELDS: usize = 15;

impl PatternRule for TooManyFieldsRule {
    fn name(&self) -> &'static str {
        "too_many_fields"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let wide: Vec<&QueryRecord> = ctx
            .log
            .stats
            .queries
            .iter()
            .filter(|r| {
                SELECT_FIELDS
                    .captures(&r.query)
                    .map(|c| c[1].split(',').count() > MAX_SELECT_FIELDS)
                    .unwrap_or(false)
            })
            .collect();
        if wide.is_empty() {
            return Vec::new();
        }
        vec![Finding {
            pattern_type: PatternType::TooManyFields,
            severity: Severity::Info,
            title: "Query selects an unusually wide field list".to_string(),
            description: format!(
                "{} quer{} selected more than {MAX_SELECT_FIELDS} fields.",
                wide.len(),
                if wide.len() == 1 { "y" } else { "ies" }
            ),
            lines: wide.iter().map(|r| r.index).collect(),
            occurrences: wide.len() as u32,
            example: wide.first().map(|r| r.query.clone()),
            suggestion: "Select only the fields the code reads.".to_string(),
            impact: "Wide rows inflate heap usage and serialization cost for every record returned.".to_string(),
        }]
    }
}

// ============================================================================
// Non-selective queries
// ============================================================================

pub struct NonSelectiveQueryRule;

const NON_SELECTIVE_MARKERS: [&str; 3] = ["non-selective", "QUERY_MORE", "full table scan"];

impl PatternRule for NonSelectiveQueryRule {
    fn name(&self) -> &'static str {
        "non_selective_query"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut lines = Vec::new();
        for event in &ctx.log.lines {
            let raw_lower = event.raw.to_lowercase();
            if NON_SELECTIVE_MARKERS
                .iter()
                .any(|m| raw_lower.contains(&m.to_lowercase()))
            {
                lines.push(event.index);
            }
        }
        if lines.is_empty() {
            return Vec::new();
        }
        vec![Finding {
            pattern_type: PatternType::NonSelectiveQuery,
            severity: Severity::Warning,
            title: "Non-selective query detected".to_string(),
            description: format!(
                "The runtime reported non-selective query behavior on {} line{}.",
                lines.len(),
                if lines.len() == 1 { "" } else { "s" }
            ),
            occurrences: lines.len() as u32,
            lines,
            example: None,
            suggestion: "Add a selective filter on an indexed field, or request a custom index for the filtered field.".to_string(),
            impact: "Non-selective queries against large objects throw runtime exceptions once the object passes the selectivity threshold.".to_string(),
        }]
    }
}

// ============================================================================
// Hardcoded record ids
// ============================================================================

pub struct HardcodedIdsRule;

impl PatternRule for HardcodedIdsRule {
    fn name(&self) -> &'static str {
        "hardcoded_ids"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut lines = Vec::new();
        let mut example = None;
        // only id literals inside query text count; an id merely echoed by a
        // debug line is not a coding defect
        for record in &ctx.log.stats.queries {
            for cap in QUOTED_ID.captures_iter(&record.query) {
                let id = &cap[1];
                if ID_PREFIXES.iter().any(|p| id.starts_with(p)) {
                    lines.push(record.index);
                    if example.is_none() {
                        example = Some(id.to_string());
                    }
                    break;
                }
            }
        }
        if lines.is_empty() {
            return Vec::new();
        }
        vec![Finding {
            pattern_type: PatternType::HardcodedIds,
            severity: Severity::Warning,
            title: "Hardcoded record id".to_string(),
            description: format!(
                "Record id literals appear on {} line{}.",
                lines.len(),
                if lines.len() == 1 { "" } else { "s" }
            ),
            occurrences: lines.len() as u32,
            lines,
            example,
            suggestion: "Resolve ids at runtime by querying on a stable key, or store them in custom metadata.".to_string(),
            impact: "Ids differ between orgs and sandboxes, so hardcoded values break on deployment.".to_string(),
        }]
    }
}

// ============================================================================
// Large query results
// ============================================================================

pub struct LargeQueryResultsRule;

impl PatternRule for LargeQueryResultsRule {
    fn name(&self) -> &'static str {
        "large_query_results"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let t = ctx.thresholds;
        let mut very_large: Vec<(&QueryRecord, u64)> = Vec::new();
        let mut large: Vec<(&QueryRecord, u64)> = Vec::new();
        for record in &ctx.log.stats.queries {
            let Some(rows) = record.rows else { continue };
            if rows >= t.very_large_result_rows {
                very_large.push((record, rows));
            } else if rows >= t.large_result_rows {
                large.push((record, rows));
            }
        }

        let mut findings = Vec::new();
        for (bucket, severity, floor) in [
            (&very_large, Severity::Warning, t.very_large_result_rows),
            (&large, Severity::Info, t.large_result_rows),
        ] {
            if bucket.is_empty() {
                continue;
            }
            let max_rows = bucket.iter().map(|(_, rows)| *rows).max().unwrap_or(0);
            findings.push(Finding {
                pattern_type: PatternType::LargeQueryResults,
                severity,
                title: "Large query result set".to_string(),
                description: format!(
                    "{} quer{} returned {floor} rows or more (largest: {max_rows}).",
                    bucket.len(),
                    if bucket.len() == 1 { "y" } else { "ies" }
                ),
                lines: bucket.iter().map(|(r, _)| r.index).collect(),
                occurrences: bucket.len() as u32,
                example: bucket.first().map(|(r, _)| r.query.clone()),
                suggestion: "Page through results with query locators, or narrow the filter to the records actually needed.".to_string(),
                impact: "Large result sets dominate heap usage and slow every downstream loop over them.".to_string(),
            });
        }
        findings
    }
}
