//! Execution-flow rules: recursion, trigger re-fires, stack depth, callouts,
//! async fan-out, validation noise, debug noise

use super::{PatternRule, RuleContext};
use crate::analyzer::heuristics::{extract_host, is_sequential};
use crate::models::{EventType, Finding, PatternType, Severity};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static TRIGGER_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)trigger\s+(\w+)\s+on\s+(\w+)").unwrap());

const ASYNC_MARKERS: [&str; 4] = ["@FUTURE", "FUTURE_METHOD", "QUEUEABLE", "ENQUEUEJOB"];

// ============================================================================
// Method recursion
// ============================================================================

pub struct RecursionRule;

impl PatternRule for RecursionRule {
    fn name(&self) -> &'static str {
        "recursion"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let t = ctx.thresholds;
        let mut findings = Vec::new();
        for stat in &ctx.log.stats.methods {
            if (stat.calls as usize) <= t.recursion_depth {
                continue;
            }
            let severity = if (stat.calls as usize) > t.recursion_critical {
                Severity::Critical
            } else {
                Severity::Warning
            };
            findings.push(Finding {
                pattern_type: PatternType::Recursion,
                severity,
                title: format!("Possible recursion in {}.{}", stat.class, stat.method),
                description: format!(
                    "{}.{} was entered {} times in one transaction.",
                    stat.class, stat.method, stat.calls
                ),
                lines: vec![stat.first_call],
                occurrences: stat.calls,
                example: None,
                suggestion: "Add a static guard flag or restructure the call so each record is processed once.".to_string(),
                impact: "Uncontrolled re-entry multiplies every limit the method consumes and can recurse until the stack or CPU limit trips.".to_string(),
            });
        }
        findings
    }
}

// ============================================================================
// Trigger re-fires
// ============================================================================

pub struct TriggerRecursionRule;

impl PatternRule for TriggerRecursionRule {
    fn name(&self) -> &'static str {
        "trigger_recursion"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut fires: HashMap<(String, String), Vec<usize>> = HashMap::new();
        for event in &ctx.log.lines {
            let token = event.event_type.token();
            if event.event_type != EventType::CodeUnitStarted && !token.contains("TRIGGER") {
                continue;
            }
            if let Some(cap) = TRIGGER_HEADER.captures(&event.content) {
                fires
                    .entry((cap[1].to_lowercase(), cap[2].to_lowercase()))
                    .or_default()
                    .push(event.index);
            }
        }

        let mut ordered: Vec<_> = fires.into_iter().collect();
        ordered.sort_by_key(|(_, indices)| indices.first().copied().unwrap_or(0));

        let mut findings = Vec::new();
        for ((trigger, object), indices) in ordered {
            if indices.len() <= ctx.thresholds.trigger_reentry {
                continue;
            }
            findings.push(Finding {
                pattern_type: PatternType::TriggerRecursion,
                severity: Severity::Critical,
                title: "Trigger fired repeatedly in one transaction".to_string(),
                description: format!(
                    "Trigger {trigger} on {object} started {} times.",
                    indices.len()
                ),
                occurrences: indices.len() as u32,
                lines: indices,
                example: Some(format!("trigger {trigger} on {object}")),
                suggestion: "Guard the trigger with a static recursion flag, and avoid updating the triggering records from their own trigger.".to_string(),
                impact: "Each re-fire replays the full trigger logic, compounding SOQL, DML and CPU consumption.".to_string(),
            });
        }
        findings
    }
}

// ============================================================================
// Pathological stack depth
// ============================================================================

pub struct DeepCallStackRule;

impl PatternRule for DeepCallStackRule {
    fn name(&self) -> &'static str {
        "deep_call_stack"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let Some(tree) = ctx.tree else { return Vec::new() };
        let depth = tree.metadata.deepest_depth;
        if depth <= ctx.thresholds.deep_stack {
            return Vec::new();
        }
        vec![Finding {
            pattern_type: PatternType::DeepCallStack,
            severity: Severity::Warning,
            title: "Unusually deep call stack".to_string(),
            description: format!("The call tree reached a nesting depth of {depth}."),
            lines: Vec::new(),
            occurrences: 1,
            example: None,
            suggestion: "Flatten deeply nested delegation and convert self-recursive processing to iteration.".to_string(),
            impact: "Extreme nesting usually signals runaway recursion and makes stack traces unreadable.".to_string(),
        }]
    }
}

// ============================================================================
// Chatty callouts
// ============================================================================

pub struct MultipleCalloutsRule;

impl PatternRule for MultipleCalloutsRule {
    fn name(&self) -> &'static str {
        "multiple_callouts"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut by_host: HashMap<String, Vec<usize>> = HashMap::new();
        for event in &ctx.log.lines {
            if !event.event_type.token().contains("CALLOUT") {
                continue;
            }
            let host = extract_host(&event.content).unwrap_or_else(|| "unknown".to_string());
            by_host.entry(host).or_default().push(event.index);
        }

        let mut ordered: Vec<_> = by_host.into_iter().collect();
        ordered.sort_by_key(|(_, indices)| indices.first().copied().unwrap_or(0));

        let mut findings = Vec::new();
        for (host, indices) in ordered {
            if indices.len() < ctx.thresholds.callout_count || !is_sequential(&indices) {
                continue;
            }
            findings.push(Finding {
                pattern_type: PatternType::MultipleCallouts,
                severity: Severity::Warning,
                title: "Repeated callouts to one host".to_string(),
                description: format!("{} callouts went to {host} in quick succession.", indices.len()),
                occurrences: indices.len() as u32,
                lines: indices,
                example: Some(host),
                suggestion: "Batch the requests into one composite call, or cache the response when the payload repeats.".to_string(),
                impact: "Every callout adds network latency inside the transaction and counts against the 100-callout limit.".to_string(),
            });
        }
        findings
    }
}

// ============================================================================
// Async fan-out
// ============================================================================

pub struct ExcessiveAsyncRule;

impl PatternRule for ExcessiveAsyncRule {
    fn name(&self) -> &'static str {
        "excessive_async"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut lines = Vec::new();
        for event in &ctx.log.lines {
            let upper = event.raw.to_uppercase();
            if ASYNC_MARKERS.iter().any(|m| upper.contains(m)) {
                lines.push(event.index);
            }
        }
        let t = ctx.thresholds;
        if lines.len() < t.async_warning_count {
            return Vec::new();
        }
        let severity = if lines.len() >= t.async_critical_count {
            Severity::Critical
        } else {
            Severity::Warning
        };
        vec![Finding {
            pattern_type: PatternType::ExcessiveAsync,
            severity,
            title: "Excessive asynchronous enqueueing".to_string(),
            description: format!(
                "{} asynchronous jobs were enqueued in one transaction.",
                lines.len()
            ),
            occurrences: lines.len() as u32,
            lines,
            example: None,
            suggestion: "Collect the work and enqueue one batch or queueable that processes it together.".to_string(),
            impact: "Fan-out past the per-transaction async limit throws, and queue pressure delays every job behind it.".to_string(),
        }]
    }
}

// ============================================================================
// Validation noise
// ============================================================================

pub struct ValidationFailuresRule;

impl PatternRule for ValidationFailuresRule {
    fn name(&self) -> &'static str {
        "validation_failures"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut lines = Vec::new();
        for event in &ctx.log.lines {
            let upper = event.raw.to_uppercase();
            if upper.contains("VALIDATION") && upper.contains("FAIL") {
                lines.push(event.index);
            }
        }
        if lines.len() < ctx.thresholds.validation_failures {
            return Vec::new();
        }
        vec![Finding {
            pattern_type: PatternType::ValidationFailures,
            severity: Severity::Info,
            title: "Repeated validation rule failures".to_string(),
            description: format!("Validation rules failed {} times.", lines.len()),
            occurrences: lines.len() as u32,
            lines,
            example: None,
            suggestion: "Validate input earlier in the flow so records arrive at DML already conforming.".to_string(),
            impact: "Each failed save wastes the work done before it and surfaces as partial-success noise to callers.".to_string(),
        }]
    }
}

// ============================================================================
// Debug noise
// ============================================================================

pub struct ExcessiveDebugRule;

impl PatternRule for ExcessiveDebugRule {
    fn name(&self) -> &'static str {
        "excessive_debug"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let lines: Vec<usize> = ctx
            .log
            .lines
            .iter()
            .filter(|e| e.event_type == EventType::UserDebug)
            .map(|e| e.index)
            .collect();
        if lines.len() <= ctx.thresholds.debug_statements {
            return Vec::new();
        }
        vec![Finding {
            pattern_type: PatternType::ExcessiveDebug,
            severity: Severity::Info,
            title: "Excessive debug statements".to_string(),
            description: format!("{} debug statements appear in this log.", lines.len()),
            occurrences: lines.len() as u32,
            lines,
            example: None,
            suggestion: "Remove leftover System.debug calls or gate them behind a logging level check.".to_string(),
            impact: "Debug output consumes log allowance and adds measurable CPU overhead at high volume.".to_string(),
        }]
    }
}
