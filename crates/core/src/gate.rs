//! Gate orchestration: source -> change set -> snapshot -> decision -> report.

use std::path::Path;

use tracing::{info, instrument, warn};

use crate::changeset::build_change_set;
use crate::config::GateConfig;
use crate::decider::ConflictDecider;
use crate::errors::{GateError, SourceError};
use crate::file_filter::RuleFileFilter;
use crate::report::GateReport;
use crate::snapshot::build_snapshot;
use crate::source::{GitRuleSource, RuleSource};

/// Run one check of the working state against the reference point.
///
/// Setup faults (reference unavailable, listings failing) are returned as
/// errors and never turned into a verdict. When the change touches no rule
/// files the reference snapshot is never built.
#[instrument(skip_all, fields(reference = %source.reference_name()))]
pub fn run_gate(source: &mut dyn RuleSource, config: &GateConfig) -> Result<GateReport, SourceError> {
    let filter = RuleFileFilter::from(config);
    let mut report = GateReport::new(
        source.reference_name(),
        config.policy,
        config.strict_reference,
    );

    source.ensure_reference_point_available()?;

    let changes = build_change_set(&*source, &filter, &mut report.diagnostics)?;
    report.changed_rule_files = changes.len();
    if changes.is_empty() {
        info!("change touches no rule files");
        report.short_circuit = true;
        report.finalize();
        return Ok(report);
    }

    let snapshot = build_snapshot(&*source, &filter, &mut report.diagnostics)?;
    report.reference_rule_files = snapshot.file_count();
    report.integrity_faults = snapshot.integrity_faults();

    let decision = ConflictDecider::new(&snapshot, config.policy).decide(&changes);
    report.checked = decision.checked;
    report.verdicts = decision.verdicts;
    report.skipped_after_failure = decision.skipped;
    report.diagnostics.extend(decision.diagnostics);
    report.finalize();

    if report.passed() {
        info!(files = report.changed_rule_files, "no rule id conflicts");
    } else {
        warn!(summary = %report.summary(), "rule id check failed");
    }
    Ok(report)
}

/// Validate `config`, open the repository containing `repo` and run the gate
/// against its configured reference branch.
pub fn check_repository<P: AsRef<Path>>(repo: P, config: &GateConfig) -> Result<GateReport, GateError> {
    config.validate()?;
    let mut source = GitRuleSource::from_config(repo, config)?;
    Ok(run_gate(&mut source, config)?)
}
