//! Deterministic scoring and finding-merge policy.
//!
//! The weights and penalty constants are preserved verbatim from the
//! scoring model this pipeline shipped with; see DESIGN.md before touching
//! any of them, since every change here alters observable report output.

use crate::core::{
    EngineKind, EngineResult, Finding, SeverityBreakdown, MAX_REPORT_FINDINGS,
};
use std::collections::{BTreeMap, HashSet};

/// Weighted composite of the per-engine scores. An engine that did not run
/// or errored contributes 0 to its term; weights are not renormalized over
/// the engines that did run.
pub fn overall_score(results: &BTreeMap<EngineKind, EngineResult>) -> u8 {
    let weighted: f64 = EngineKind::ALL
        .iter()
        .map(|kind| {
            results
                .get(kind)
                .filter(|result| result.succeeded())
                .map_or(0.0, |result| f64::from(result.score) * kind.weight())
        })
        .sum();

    weighted.round().clamp(0.0, 100.0) as u8
}

/// How much of the pipeline actually executed. Starts at 100, drops by a
/// fixed penalty per missing or errored engine, floors at 0. If nothing at
/// all succeeded there is no basis for trusting the report, so confidence
/// collapses straight to 0.
pub fn confidence(results: &BTreeMap<EngineKind, EngineResult>) -> u8 {
    if !results.values().any(EngineResult::succeeded) {
        return 0;
    }

    let mut value = 100i64;
    for kind in EngineKind::ALL {
        match results.get(&kind) {
            None => value -= i64::from(kind.missing_penalty()),
            Some(result) if !result.succeeded() => value -= i64::from(kind.error_penalty()),
            Some(_) => {}
        }
    }

    value.clamp(0, 100) as u8
}

pub struct MergedFindings {
    pub findings: Vec<Finding>,
    /// True merged count before the report cap, engine truncation included.
    pub total: usize,
    pub by_severity: SeverityBreakdown,
}

/// Merge findings across engines in a fixed engine order (discovery order
/// within an engine is preserved), deduplicate by (engine, type, first
/// location), sort by severity, cap, and assign stable report ids.
pub fn merge_findings(results: &BTreeMap<EngineKind, EngineResult>) -> MergedFindings {
    let mut seen = HashSet::new();
    let mut merged: Vec<Finding> = Vec::new();
    let mut duplicates = 0usize;

    for kind in EngineKind::ALL {
        let Some(result) = results.get(&kind) else {
            continue;
        };
        for finding in &result.findings {
            if seen.insert(finding.dedup_key()) {
                merged.push(finding.clone());
            } else {
                duplicates += 1;
            }
        }
    }

    let total = results
        .values()
        .map(|result| result.total_findings)
        .sum::<usize>()
        .saturating_sub(duplicates);
    let by_severity = SeverityBreakdown::count(&merged);

    // Stable sort: equal severities keep discovery order.
    merged.sort_by_key(|finding| std::cmp::Reverse(finding.severity));
    merged.truncate(MAX_REPORT_FINDINGS);

    for (idx, finding) in merged.iter_mut().enumerate() {
        finding.id = format!("KS-{:03}", idx + 1);
    }

    MergedFindings {
        findings: merged,
        total,
        by_severity,
    }
}
