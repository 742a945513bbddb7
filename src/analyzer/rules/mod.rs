//! Anti-pattern rule catalogue
//!
//! Each rule is a stateless trait object that inspects one parsed log (and
//! the call tree when one is available) and returns zero or more findings.
//! Rules never see each other's output; ordering and scoring happen in the
//! analyzer.

pub mod dml;
pub mod execution;
pub mod limits;
pub mod query;

use crate::analyzer::thresholds::Thresholds;
use crate::models::{CallTree, Finding, ParsedLog};

/// Objects that may only be written by setup DML; mixing them with ordinary
/// data writes in one transaction fails at runtime
pub const SETUP_OBJECTS: [&str; 9] = [
    "User",
    "Group",
    "GroupMember",
    "QueueSobject",
    "UserRole",
    "UserLicense",
    "PermissionSet",
    "PermissionSetAssignment",
    "ObjectPermissions",
];

/// Key prefixes of record ids commonly hardcoded in Apex: Account, Contact,
/// User, Opportunity, Lead, Case, Document, custom objects and records
pub const ID_PREFIXES: [&str; 9] =
    ["001", "003", "005", "006", "00Q", "500", "701", "800", "a0"];

/// Everything a rule may look at for one evaluation
pub struct RuleContext<'a> {
    pub log: &'a ParsedLog,
    pub tree: Option<&'a CallTree>,
    pub thresholds: &'a Thresholds,
}

pub trait PatternRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Finding>;
}

/// The full catalogue, in report order
pub fn get_all_rules() -> Vec<Box<dyn PatternRule>> {
    vec![
        Box::new(query::SoqlInLoopRule),
        Box::new(dml::DmlInLoopRule),
        Box::new(query::NPlusOneRule),
        Box::new(execution::RecursionRule),
        Box::new(execution::TriggerRecursionRule),
        Box::new(query::UnboundedQueryRule),
        Box::new(query::TooManyFieldsRule),
        Box::new(query::NonSelectiveQueryRule),
        Box::new(limits::GovernorLimitsRule),
        Box::new(execution::DeepCallStackRule),
        Box::new(execution::MultipleCalloutsRule),
        Box::new(execution::ExcessiveAsyncRule),
        Box::new(dml::MixedDmlRule),
        Box::new(query::HardcodedIdsRule),
        Box::new(execution::ValidationFailuresRule),
        Box::new(execution::ExcessiveDebugRule),
        Box::new(dml::CalloutAfterDmlRule),
        Box::new(query::LargeQueryResultsRule),
    ]
}

/// Integer percentage of a governor limit that is in use; `None` when the
/// limit was never reported
pub(crate) fn usage_pct(used: u64, max: u64) -> Option<u64> {
    if max == 0 {
        return None;
    }
    Some(used * 100 / max)
}
