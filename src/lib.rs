//! apexlens
//!
//! Analysis engine for Salesforce Apex debug logs: parses the raw log text
//! into a structured event sequence, reconstructs the call tree from nested
//! begin/end events, and scans the result for well-known anti-patterns,
//! producing a ranked report with a 0-100 health score.

pub mod analyzer;
pub mod models;
pub mod parser;
pub mod tree;

#[cfg(test)]
mod tests;

pub use analyzer::{PatternAnalyzer, Thresholds};
pub use parser::LogParser;
pub use tree::{CallTreeConfig, CallTreeService, TreeBuilder, TreeError, TreeFilter};

use models::{AnalysisResult, CallTree, LogMetadata, LogSummary, ParsedLog};
use serde::Serialize;

/// One-shot analysis of a raw log: parse, build the tree, run the rules.
///
/// Convenience composition for callers that do not need the caching service;
/// the tree is built inline on the current thread.
pub fn analyze_log(raw_log: &str, metadata: LogMetadata) -> LogAnalysis {
    let parsed = LogParser::parse(raw_log, metadata);
    let tree = TreeBuilder::build(&parsed);
    let result = PatternAnalyzer::new().analyze(&parsed, Some(&tree));
    let summary = parsed.summary();
    LogAnalysis { parsed, summary, tree, result }
}

/// Everything produced by [`analyze_log`] for one log
#[derive(Debug, Clone, Serialize)]
pub struct LogAnalysis {
    pub parsed: ParsedLog,
    pub summary: LogSummary,
    pub tree: CallTree,
    pub result: AnalysisResult,
}
