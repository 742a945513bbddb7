//! Governor limit consumption rule

use super::{PatternRule, RuleContext, usage_pct};
use crate::models::{Finding, PatternType, Severity};

pub struct GovernorLimitsRule;

struct LimitCheck {
    pattern_type: PatternType,
    label: &'static str,
    used: u64,
    max: u64,
    warn_pct: u64,
    suggestion: &'static str,
}

impl PatternRule for GovernorLimitsRule {
    fn name(&self) -> &'static str {
        "governor_limits"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let limits = &ctx.log.stats.limits;
        let t = ctx.thresholds;

        let checks = [
            LimitCheck {
                pattern_type: PatternType::ExcessiveSoql,
                label: "SOQL queries",
                used: limits.soql_queries,
                max: limits.max_soql_queries,
                warn_pct: t.soql_usage_pct,
                suggestion: "Consolidate queries, cache reusable results, and move per-record lookups out of loops.",
            },
            LimitCheck {
                pattern_type: PatternType::ExcessiveDml,
                label: "DML statements",
                used: limits.dml_statements,
                max: limits.max_dml_statements,
                warn_pct: t.dml_usage_pct,
                suggestion: "Bulk DML over collections instead of writing records one at a time.",
            },
            LimitCheck {
                pattern_type: PatternType::ExcessiveCpu,
                label: "CPU time",
                used: limits.cpu_time_ms,
                max: limits.max_cpu_time_ms,
                warn_pct: t.cpu_usage_pct,
                suggestion: "Profile the slowest methods and move heavy computation to asynchronous jobs.",
            },
            LimitCheck {
                pattern_type: PatternType::ExcessiveHeap,
                label: "heap",
                used: limits.heap_size_bytes,
                max: limits.max_heap_size_bytes,
                warn_pct: t.heap_usage_pct,
                suggestion: "Release large collections early and query only the fields the code reads.",
            },
        ];

        let mut findings = Vec::new();
        for check in checks {
            // unreported limits carry max 0 and are skipped
            let Some(pct) = usage_pct(check.used, check.max) else { continue };
            if pct < check.warn_pct {
                continue;
            }
            let severity = if pct >= t.critical_usage_pct {
                Severity::Critical
            } else {
                Severity::Warning
            };
            findings.push(Finding {
                pattern_type: check.pattern_type,
                severity,
                title: format!("High {} consumption", check.label),
                description: format!(
                    "Transaction used {} of {} {} ({pct}% of the governor limit).",
                    check.used, check.max, check.label
                ),
                lines: Vec::new(),
                occurrences: 1,
                example: None,
                suggestion: check.suggestion.to_string(),
                impact: "Crossing the governor limit aborts the transaction with an uncatchable LimitException.".to_string(),
            });
        }
        findings
    }
}
