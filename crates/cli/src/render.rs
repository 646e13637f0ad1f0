//! Text rendering of a [`GateReport`].

use rulegate_core::decider::{CheckOutcome, FileCheck, Verdict};
use rulegate_core::models::{format_ids, ParseStatus};
use rulegate_core::GateReport;

use crate::style::{self, Tone};

/// Render `report` as the human-readable text report.
///
/// Every line naming rule ids prints them as a sorted bracketed list, so CI
/// logs can be grepped for a specific id. `detailed` adds one line per
/// checked file.
pub fn render_text(report: &GateReport, detailed: bool) -> String {
    let mut out = Vec::new();
    out.push(style::heading(&format!(
        "rulegate: checking rule ids against {}",
        report.reference
    )));

    for diagnostic in &report.diagnostics {
        out.push(style::line(Tone::Notice, &diagnostic.to_string()));
    }

    let fault_tone = if report.strict_reference {
        Tone::Fail
    } else {
        Tone::Notice
    };
    for fault in &report.integrity_faults {
        out.push(style::line(fault_tone, &fault.to_string()));
    }

    if detailed {
        for check in &report.checked {
            out.push(style::muted(&format!("  {}", describe_check(check))));
        }
    }

    for verdict in &report.verdicts {
        render_verdict(verdict, &mut out);
    }

    if report.skipped_after_failure > 0 {
        out.push(style::muted(&format!(
            "{} more changed rule file(s) not checked; rerun with --all to report every conflict",
            report.skipped_after_failure
        )));
    }

    out.push(style::line(Tone::of(report.passed()), &report.summary()));
    out.join("\n")
}

fn render_verdict(verdict: &Verdict, out: &mut Vec<String>) {
    match verdict {
        Verdict::Clean => {}
        Verdict::InternalDuplicate { file, ids } => {
            out.push(style::line(
                Tone::Fail,
                &format!(
                    "{}: rule ids {} are declared more than once in the same file",
                    file,
                    style::id_list(ids)
                ),
            ));
        }
        Verdict::Conflict { file, conflicts } => {
            out.push(style::line(
                Tone::Fail,
                &format!("{}: conflicting rule ids {}", file, style::id_list(&verdict.ids())),
            ));
            for conflict in conflicts {
                out.push(format!("    {}", conflict));
            }
        }
    }
}

fn describe_check(check: &FileCheck) -> String {
    let outcome = match check.outcome {
        CheckOutcome::Clean => "ok",
        CheckOutcome::IdsUnchanged => "ids unchanged",
        CheckOutcome::InternalDuplicate => "internal duplicate",
        CheckOutcome::Conflict => "conflict",
    };
    let origin = match &check.renamed_from {
        Some(old) => format!(" from {}", old),
        None => String::new(),
    };
    let parse = match &check.parse {
        ParseStatus::Ok => String::new(),
        ParseStatus::ParseError(_) => ", unparseable".to_string(),
    };
    format!(
        "{} ({}{}{}): {} id(s), new {} -> {}",
        check.path,
        check.status,
        origin,
        parse,
        check.declared,
        format_ids(&check.new_ids),
        outcome
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulegate_core::config::Policy;
    use rulegate_core::decider::{ClaimSource, IdConflict};
    use rulegate_core::models::{EditStatus, RuleId};
    use rulegate_core::report::{Diagnostic, IntegrityFault, Side};

    fn plain() {
        console::set_colors_enabled(false);
    }

    fn conflict_report() -> GateReport {
        let mut report = GateReport::new("origin/main", Policy::FailFast, false);
        report.changed_rule_files = 2;
        report.verdicts.push(Verdict::Conflict {
            file: "rules/b.xml".into(),
            conflicts: vec![IdConflict {
                id: RuleId(2),
                owners: vec!["rules/a.xml".into()],
                source: ClaimSource::Reference,
            }],
        });
        report.skipped_after_failure = 1;
        report
    }

    #[test]
    fn test_conflict_lines_name_ids_and_owner() {
        plain();
        let text = render_text(&conflict_report(), false);
        assert!(text.contains("✗ rules/b.xml: conflicting rule ids [2]"));
        assert!(text.contains("    rule id 2 already exists in rules/a.xml"));
        assert!(text.contains("1 more changed rule file(s) not checked"));
        assert!(text.ends_with("✗ 1 offending rule file(s); rule ids [2]"));
    }

    #[test]
    fn test_clean_report() {
        plain();
        let mut report = GateReport::new("origin/main", Policy::FailFast, false);
        report.short_circuit = true;
        let text = render_text(&report, false);
        assert!(text.contains("✓ no rule files changed; nothing to check"));
    }

    #[test]
    fn test_diagnostics_and_integrity_faults_are_warnings() {
        plain();
        let mut report = GateReport::new("origin/main", Policy::FailFast, false);
        report.changed_rule_files = 1;
        report.diagnostics.push(Diagnostic::ParseFailure {
            path: "rules/c.xml".into(),
            side: Side::Working,
            detail: "unexpected end of input".into(),
        });
        report.integrity_faults.push(IntegrityFault {
            id: RuleId(5),
            owners: vec!["rules/a.xml".into(), "rules/b.xml".into()],
        });
        let text = render_text(&report, false);
        assert!(text.contains("⚠ skipping rules/c.xml (working version)"));
        assert!(text.contains("⚠ rule id 5 is declared by multiple files"));
        assert!(text.contains("✓ no rule id conflicts"));
    }

    #[test]
    fn test_detailed_lists_checked_files() {
        plain();
        let mut report = conflict_report();
        report.checked.push(FileCheck {
            path: "rules/b.xml".into(),
            status: EditStatus::Added,
            declared: 2,
            new_ids: vec![RuleId(2), RuleId(3)],
            parse: ParseStatus::Ok,
            outcome: CheckOutcome::Conflict,
            renamed_from: None,
        });
        report.checked.push(FileCheck {
            path: "rules/z.xml".into(),
            status: EditStatus::Renamed,
            declared: 3,
            new_ids: vec![],
            parse: ParseStatus::Ok,
            outcome: CheckOutcome::IdsUnchanged,
            renamed_from: Some("rules/a.xml".into()),
        });
        let text = render_text(&report, true);
        assert!(text.contains("rules/b.xml (added): 2 id(s), new [2, 3] -> conflict"));
        assert!(text.contains("rules/z.xml (renamed from rules/a.xml): 3 id(s), new [] -> ids unchanged"));
        assert!(!render_text(&report, false).contains("-> conflict"));
    }
}
