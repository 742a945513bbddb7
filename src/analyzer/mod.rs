//! Anti-pattern analysis
//!
//! Runs the rule catalogue over a parsed log, orders the findings by
//! severity, and condenses them into a report with a 0-100 health score.

pub mod heuristics;
pub mod rules;
pub mod thresholds;

pub use thresholds::Thresholds;

use crate::models::{AnalysisResult, AnalysisSummary, CallTree, Finding, ParsedLog, Severity};
use rules::{PatternRule, RuleContext, get_all_rules};

const CRITICAL_PENALTY: u32 = 20;
const WARNING_PENALTY: u32 = 10;
const INFO_PENALTY: u32 = 2;

pub struct PatternAnalyzer {
    rules: Vec<Box<dyn PatternRule>>,
    thresholds: Thresholds,
}

impl PatternAnalyzer {
    pub fn new() -> Self {
        Self::with_thresholds(Thresholds::default())
    }

    pub fn with_thresholds(thresholds: Thresholds) -> Self {
        Self { rules: get_all_rules(), thresholds }
    }

    /// Evaluate every rule and assemble the ordered report.
    ///
    /// Pure over its inputs; analyzing the same log twice yields the same
    /// report.
    pub fn analyze(&self, log: &ParsedLog, tree: Option<&CallTree>) -> AnalysisResult {
        let ctx = RuleContext { log, tree, thresholds: &self.thresholds };

        let mut patterns: Vec<Finding> = Vec::new();
        for rule in &self.rules {
            let mut findings = rule.evaluate(&ctx);
            if !findings.is_empty() {
                tracing::debug!(rule = rule.name(), count = findings.len(), "rule matched");
            }
            patterns.append(&mut findings);
        }

        // stable sort keeps catalogue order within one severity band
        patterns.sort_by_key(|f| f.severity.rank());

        let critical = patterns.iter().filter(|f| f.severity == Severity::Critical).count();
        let warnings = patterns.iter().filter(|f| f.severity == Severity::Warning).count();
        let info = patterns.iter().filter(|f| f.severity == Severity::Info).count();

        let mut suggestions: Vec<String> = Vec::new();
        for finding in &patterns {
            if !suggestions.contains(&finding.suggestion) {
                suggestions.push(finding.suggestion.clone());
            }
        }

        let score = score(critical, warnings, info);
        let total = patterns.len();
        AnalysisResult {
            has_critical: critical > 0,
            has_warning: warnings > 0,
            total_count: total,
            summary: AnalysisSummary { critical, warnings, info, total, score },
            patterns,
            suggestions,
        }
    }
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Health score: start from 100, subtract a fixed penalty per finding,
/// clamp at zero
fn score(critical: usize, warnings: usize, info: usize) -> u32 {
    let penalty = CRITICAL_PENALTY * critical as u32
        + WARNING_PENALTY * warnings as u32
        + INFO_PENALTY * info as u32;
    100u32.saturating_sub(penalty)
}
