//! End-to-end tests over captured log fixtures

use crate::models::{LogMetadata, ParsedLog, PatternType, Severity};
use crate::parser::LogParser;
use crate::tree::{CallTreeService, TreeBuilder};
use crate::{PatternAnalyzer, analyze_log};
use std::fs;
use std::path::Path;

fn load_fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/logs")
        .join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("read fixture {}: {e}", path.display()))
}

fn parse_fixture(name: &str) -> ParsedLog {
    LogParser::parse(&load_fixture(name), LogMetadata::default())
}

#[test]
fn checkout_fixture_parses_completely() {
    let log = parse_fixture("checkout.log");

    assert!(log.parsed);
    assert_eq!(log.lines.len(), 22);
    // every input line is represented, dense and in order
    for (i, event) in log.lines.iter().enumerate() {
        assert_eq!(event.index, i);
    }

    // the cumulative section overrides the incrementally counted limits
    let limits = &log.stats.limits;
    assert_eq!((limits.soql_queries, limits.max_soql_queries), (3, 100));
    assert_eq!((limits.dml_statements, limits.max_dml_statements), (1, 150));
    assert_eq!((limits.cpu_time_ms, limits.max_cpu_time_ms), (1200, 10000));
    assert_eq!((limits.heap_size_bytes, limits.max_heap_size_bytes), (40000, 6000000));

    assert_eq!(log.stats.methods.len(), 1);
    assert_eq!(log.stats.methods[0].class, "OrderService");
    assert_eq!(log.stats.methods[0].calls, 1);

    assert_eq!(log.stats.queries.len(), 3);
    assert!(log.stats.queries.iter().all(|q| q.rows == Some(1)));
    assert_eq!(log.stats.dml_operations.len(), 1);
    assert_eq!(log.stats.dml_operations[0].object_type, "OrderLine__c");

    let summary = log.summary();
    assert_eq!(summary.soql_queries, "3/100");
    assert_eq!(summary.total_lines, 22);
    assert!(!summary.has_errors);
}

#[test]
fn checkout_fixture_builds_the_expected_tree() {
    let log = parse_fixture("checkout.log");
    let tree = TreeBuilder::build(&log);

    // root + method + three queries + one dml
    assert_eq!(tree.metadata.total_nodes, 6);
    assert_eq!(tree.metadata.deepest_depth, 2);

    let root = &tree.nodes[tree.root];
    assert_eq!(root.children.len(), 1);
    let method = &tree.nodes[root.children[0]];
    assert_eq!(method.name, "OrderService.checkout()");
    assert_eq!(method.children.len(), 4);
    assert_eq!(method.soql_count, 3);
    assert_eq!(method.dml_count, 1);
    assert_eq!(method.duration, 290);
}

#[tokio::test]
async fn tree_service_serves_the_fixture_from_cache_on_repeat() {
    let log = parse_fixture("checkout.log");
    let service = CallTreeService::new();

    let first = service.build_tree("fixture", &log).await.expect("build");
    let second = service.build_tree("fixture", &log).await.expect("cached");
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(first.metadata.total_nodes, 6);
}

#[test]
fn checkout_fixture_flags_the_query_loop() {
    let analysis = analyze_log(&load_fixture("checkout.log"), LogMetadata::default());

    assert_eq!(analysis.result.patterns.len(), 1);
    let finding = &analysis.result.patterns[0];
    assert_eq!(finding.pattern_type, PatternType::SoqlInLoop);
    assert_eq!(finding.severity, Severity::Critical);
    assert_eq!(finding.lines, vec![3, 5, 7]);
    assert_eq!(finding.occurrences, 3);

    assert_eq!(analysis.result.summary.score, 80);
    assert!(analysis.result.has_critical);
    assert_eq!(analysis.result.suggestions.len(), 1);
}

#[test]
fn clean_fixture_scores_a_perfect_hundred() {
    let analysis = analyze_log(&load_fixture("clean.log"), LogMetadata::default());

    assert!(analysis.result.patterns.is_empty());
    assert_eq!(analysis.result.summary.score, 100);
    assert!(!analysis.result.has_critical);
    assert!(!analysis.result.has_warning);
}

#[test]
fn analysis_of_a_fixture_is_stable_across_runs() {
    let raw = load_fixture("checkout.log");
    let log = LogParser::parse(&raw, LogMetadata::default());
    let analyzer = PatternAnalyzer::new();

    let a = analyzer.analyze(&log, None);
    let b = analyzer.analyze(&log, None);
    assert_eq!(serde_json::to_value(&a).unwrap(), serde_json::to_value(&b).unwrap());
}

#[test]
fn wire_format_uses_the_published_field_names() {
    let analysis = analyze_log(&load_fixture("checkout.log"), LogMetadata::default());
    let value = serde_json::to_value(&analysis).expect("serialize");

    let limits = &value["parsed"]["stats"]["limits"];
    assert_eq!(limits["soqlQueries"], 3);
    assert_eq!(limits["maxSoqlQueries"], 100);

    let event = &value["parsed"]["lines"][2];
    assert_eq!(event["type"], "METHOD_ENTRY");
    assert_eq!(event["timestampMillis"], 9 * 3_600_000 + 12 * 60_000 + 1_000 + 10);
    assert!(event["details"]["class"].is_string());

    let node = &value["tree"]["nodes"][1];
    assert!(node["logLineIndex"].is_number());
    assert_eq!(node["hasError"], false);
    assert_eq!(node["soqlCount"], 3);

    let finding = &value["result"]["patterns"][0];
    assert_eq!(finding["type"], "soql_in_loop");
    assert_eq!(finding["severity"], "critical");
    assert_eq!(value["result"]["hasCritical"], true);
    assert_eq!(value["result"]["totalCount"], 1);
    assert_eq!(value["summary"]["soqlQueries"], "3/100");
}
