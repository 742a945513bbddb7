//! DML-focused rules: loops, mixed setup/data writes, transaction ordering

use super::{PatternRule, RuleContext, SETUP_OBJECTS};
use crate::analyzer::heuristics::is_sequential;
use crate::models::{EventDetails, EventType, Finding, PatternType, Severity};
use std::collections::HashMap;

/// DML occurrences with their line indices, keyed by (operation, object)
fn dml_by_statement(ctx: &RuleContext<'_>) -> HashMap<(String, String), Vec<usize>> {
    let mut groups: HashMap<(String, String), Vec<usize>> = HashMap::new();
    for event in &ctx.log.lines {
        if event.event_type != EventType::DmlBegin {
            continue;
        }
        if let EventDetails::Dml { operation, object_type } = &event.details {
            groups
                .entry((operation.clone(), object_type.clone()))
                .or_default()
                .push(event.index);
        }
    }
    groups
}

// ============================================================================
// DML in a loop
// ============================================================================

pub struct DmlInLoopRule;

impl PatternRule for DmlInLoopRule {
    fn name(&self) -> &'static str {
        "dml_in_loop"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut ordered: Vec<_> = dml_by_statement(ctx).into_iter().collect();
        ordered.sort_by_key(|(_, indices)| indices.first().copied().unwrap_or(0));

        let mut findings = Vec::new();
        for ((operation, object_type), indices) in ordered {
            if indices.len() < ctx.thresholds.loop_query_count || !is_sequential(&indices) {
                continue;
            }
            findings.push(Finding {
                pattern_type: PatternType::DmlInLoop,
                severity: Severity::Critical,
                title: "DML statement executed inside a loop".to_string(),
                description: format!(
                    "{operation} on {object_type} ran {} times in quick succession.",
                    indices.len()
                ),
                occurrences: indices.len() as u32,
                lines: indices,
                example: Some(format!("{operation} {object_type}")),
                suggestion: "Collect records into a list inside the loop and issue one bulk DML statement after it.".to_string(),
                impact: "Each iteration consumes one DML statement against the 150-statement governor limit and adds a round trip to the database.".to_string(),
            });
        }
        findings
    }
}

// ============================================================================
// Mixed setup and data DML
// ============================================================================

pub struct MixedDmlRule;

impl PatternRule for MixedDmlRule {
    fn name(&self) -> &'static str {
        "mixed_dml"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut setup_lines = Vec::new();
        let mut data_lines = Vec::new();
        let mut setup_example = None;
        let mut data_example = None;

        for event in &ctx.log.lines {
            if let EventDetails::Dml { object_type, .. } = &event.details {
                if SETUP_OBJECTS.contains(&object_type.as_str()) {
                    setup_lines.push(event.index);
                    setup_example.get_or_insert_with(|| object_type.clone());
                } else {
                    data_lines.push(event.index);
                    data_example.get_or_insert_with(|| object_type.clone());
                }
            }
        }
        if setup_lines.is_empty() || data_lines.is_empty() {
            return Vec::new();
        }

        let mut lines: Vec<usize> = setup_lines.iter().chain(&data_lines).copied().collect();
        lines.sort_unstable();
        vec![Finding {
            pattern_type: PatternType::MixedDml,
            severity: Severity::Critical,
            title: "Mixed setup and data DML in one transaction".to_string(),
            description: format!(
                "Setup object {} and data object {} were both written in this transaction.",
                setup_example.as_deref().unwrap_or("?"),
                data_example.as_deref().unwrap_or("?"),
            ),
            occurrences: lines.len() as u32,
            lines,
            example: None,
            suggestion: "Move the setup-object write into a separate transaction, typically a future method or queueable.".to_string(),
            impact: "The platform rejects transactions mixing setup and data writes with a MIXED_DML_OPERATION error.".to_string(),
        }]
    }
}

// ============================================================================
// Callout after uncommitted DML
// ============================================================================

pub struct CalloutAfterDmlRule;

impl PatternRule for CalloutAfterDmlRule {
    fn name(&self) -> &'static str {
        "callout_after_dml"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut pending_dml = false;
        let mut lines = Vec::new();
        for event in &ctx.log.lines {
            match &event.event_type {
                EventType::DmlBegin => pending_dml = true,
                // a finished code unit or an explicit commit closes the
                // pending-work window
                EventType::CodeUnitFinished => pending_dml = false,
                other => {
                    if event.raw.contains("COMMIT") {
                        pending_dml = false;
                    } else if pending_dml && other.token().contains("CALLOUT") {
                        lines.push(event.index);
                    }
                }
            }
        }
        if lines.is_empty() {
            return Vec::new();
        }
        vec![Finding {
            pattern_type: PatternType::CalloutAfterDml,
            severity: Severity::Critical,
            title: "Callout after uncommitted DML".to_string(),
            description: format!(
                "{} callout{} happened while DML work was still pending in the transaction.",
                lines.len(),
                if lines.len() == 1 { "" } else { "s" }
            ),
            occurrences: lines.len() as u32,
            lines,
            example: None,
            suggestion: "Perform callouts before any DML, or defer the callout to an asynchronous job after the transaction commits.".to_string(),
            impact: "The runtime throws a CalloutException when an HTTP callout follows pending DML in the same transaction.".to_string(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::thresholds::Thresholds;
    use crate::models::LogMetadata;
    use crate::parser::LogParser;

    fn context<'a>(
        log: &'a crate::models::ParsedLog,
        thresholds: &'a Thresholds,
    ) -> RuleContext<'a> {
        RuleContext { log, tree: None, thresholds }
    }

    #[test]
    fn tight_run_of_one_statement_is_a_loop() {
        let raw = "\
06:31:15.000 (1)|DML_BEGIN|[1]|Op:Insert|Type:Contact|Rows:1
06:31:15.001 (2)|DML_END|[1]
06:31:15.002 (3)|DML_BEGIN|[1]|Op:Insert|Type:Contact|Rows:1
06:31:15.003 (4)|DML_END|[1]
06:31:15.004 (5)|DML_BEGIN|[1]|Op:Insert|Type:Contact|Rows:1
06:31:15.005 (6)|DML_END|[1]";
        let log = LogParser::parse(raw, LogMetadata::default());
        let thresholds = Thresholds::default();

        let findings = DmlInLoopRule.evaluate(&context(&log, &thresholds));
        assert_eq!(findings.len(), 1);
        let f = &findings[0];
        assert_eq!(f.pattern_type, PatternType::DmlInLoop);
        assert_eq!(f.severity, Severity::Critical);
        assert_eq!(f.occurrences, 3);
        assert_eq!(f.lines, vec![0, 2, 4]);
    }

    #[test]
    fn distinct_statements_do_not_pool_into_one_loop() {
        let raw = "\
06:31:15.000 (1)|DML_BEGIN|[1]|Op:Insert|Type:Contact|Rows:1
06:31:15.001 (2)|DML_BEGIN|[1]|Op:Update|Type:Contact|Rows:1
06:31:15.002 (3)|DML_BEGIN|[1]|Op:Insert|Type:Opportunity|Rows:1";
        let log = LogParser::parse(raw, LogMetadata::default());
        let thresholds = Thresholds::default();
        assert!(DmlInLoopRule.evaluate(&context(&log, &thresholds)).is_empty());
    }

    #[test]
    fn mixed_user_and_contact_writes_is_one_critical_finding() {
        let raw = "\
06:31:15.000 (1)|DML_BEGIN|[1]|Op:Update|Type:User|Rows:1
06:31:15.001 (2)|DML_BEGIN|[1]|Op:Insert|Type:Contact|Rows:1";
        let log = LogParser::parse(raw, LogMetadata::default());
        let thresholds = Thresholds::default();

        let findings = MixedDmlRule.evaluate(&context(&log, &thresholds));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].pattern_type, PatternType::MixedDml);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].lines, vec![0, 1]);
    }

    #[test]
    fn data_only_writes_are_fine() {
        let raw = "\
06:31:15.000 (1)|DML_BEGIN|[1]|Op:Insert|Type:Contact|Rows:1
06:31:15.001 (2)|DML_BEGIN|[1]|Op:Insert|Type:Account|Rows:1";
        let log = LogParser::parse(raw, LogMetadata::default());
        let thresholds = Thresholds::default();
        assert!(MixedDmlRule.evaluate(&context(&log, &thresholds)).is_empty());
    }

    #[test]
    fn callout_with_pending_dml_is_flagged() {
        let raw = "\
06:31:15.000 (1)|DML_BEGIN|[1]|Op:Insert|Type:Contact|Rows:1
06:31:15.001 (2)|CALLOUT_REQUEST|[2]|https://api.example.com/v1/sync";
        let log = LogParser::parse(raw, LogMetadata::default());
        let thresholds = Thresholds::default();

        let findings = CalloutAfterDmlRule.evaluate(&context(&log, &thresholds));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].pattern_type, PatternType::CalloutAfterDml);
        assert_eq!(findings[0].lines, vec![1]);
    }

    #[test]
    fn finished_code_unit_clears_the_pending_window() {
        let raw = "\
06:31:15.000 (1)|DML_BEGIN|[1]|Op:Insert|Type:Contact|Rows:1
06:31:15.001 (2)|CODE_UNIT_FINISHED|trigger ContactTrigger
06:31:15.002 (3)|CALLOUT_REQUEST|[2]|https://api.example.com/v1/sync";
        let log = LogParser::parse(raw, LogMetadata::default());
        let thresholds = Thresholds::default();
        assert!(CalloutAfterDmlRule.evaluate(&context(&log, &thresholds)).is_empty());
    }
}
