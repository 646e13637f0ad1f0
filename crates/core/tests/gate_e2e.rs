//! End-to-end tests running the gate against real Git repositories.
//!
//! Each test builds a repository in a temp dir, commits the reference state,
//! points `refs/remotes/origin/main` at it, then edits the working tree and
//! runs the full pipeline through `GitRuleSource` with fetching disabled.
//! No network I/O and no `git` binary are needed.

use std::path::Path;

use git2::{Oid, Repository, Signature};
use tempfile::TempDir;

use rulegate_core::config::{GateConfig, Policy};
use rulegate_core::decider::Verdict;
use rulegate_core::models::RuleId;
use rulegate_core::report::Diagnostic;
use rulegate_core::{run_gate, GitRuleSource, SourceError};

// ===========================================================================
// Helpers
// ===========================================================================

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn commit_all(repo: &Repository, message: &str) -> Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.update_all(["*"].iter(), None).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("Rule Author", "rules@example.com").unwrap();
    let parent = repo.head().ok().map(|h| h.peel_to_commit().unwrap());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

/// Repository whose reference point holds `files`.
fn reference_repo(files: &[(&str, &str)]) -> (TempDir, Repository) {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    for (rel, content) in files {
        write(dir.path(), rel, content);
    }
    let oid = commit_all(&repo, "reference state");
    repo.reference("refs/remotes/origin/main", oid, true, "reference point")
        .unwrap();
    (dir, repo)
}

fn config() -> GateConfig {
    GateConfig {
        fetch: false,
        ..GateConfig::default()
    }
}

fn run(dir: &Path, config: &GateConfig) -> Result<rulegate_core::GateReport, SourceError> {
    let mut source = GitRuleSource::from_config(dir, config)?;
    run_gate(&mut source, config)
}

const A_XML: &str = r#"<?xml version="1.0"?>
<group name="base">
  <rule id="1" level="3"><description>first</description></rule>
  <rule id="2" level="5"><description>second</description></rule>
</group>
"#;

// ===========================================================================
// Scenarios
// ===========================================================================

#[test]
fn test_added_file_reusing_id_is_rejected() {
    let (dir, repo) = reference_repo(&[("rules/a.xml", A_XML)]);
    write(
        dir.path(),
        "rules/b.xml",
        r#"<group><rule id="2"/><rule id="3"/></group>"#,
    );
    commit_all(&repo, "add b");

    let report = run(dir.path(), &config()).unwrap();

    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.verdicts.len(), 1);
    let Verdict::Conflict { file, conflicts } = &report.verdicts[0] else {
        panic!("expected a conflict, got {:?}", report.verdicts[0]);
    };
    assert_eq!(file, "rules/b.xml");
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].id, RuleId(2));
    assert_eq!(conflicts[0].owners, vec!["rules/a.xml"]);
}

#[test]
fn test_extending_own_file_passes() {
    let (dir, repo) = reference_repo(&[("rules/a.xml", A_XML)]);
    write(
        dir.path(),
        "rules/a.xml",
        r#"<group name="base"><rule id="1"/><rule id="2"/><rule id="3"/></group>"#,
    );
    commit_all(&repo, "extend a");

    let report = run(dir.path(), &config()).unwrap();

    assert_eq!(report.exit_code(), 0);
    assert!(report.verdicts.is_empty());
    assert_eq!(report.changed_rule_files, 1);
    assert_eq!(report.checked[0].new_ids, vec![RuleId(3)]);
}

#[test]
fn test_uncommitted_new_file_is_checked() {
    let (dir, _repo) = reference_repo(&[("rules/a.xml", A_XML)]);
    write(dir.path(), "rules/extra/c.xml", r#"<rule id="1"/>"#);

    let report = run(dir.path(), &config()).unwrap();

    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.offending_ids(), vec![RuleId(1)]);
}

#[test]
fn test_non_rule_changes_short_circuit() {
    let (dir, repo) = reference_repo(&[("rules/a.xml", A_XML), ("README.md", "docs")]);
    write(dir.path(), "README.md", "more docs");
    write(dir.path(), "src/decoder.xml", r#"<rule id="1"/>"#);
    commit_all(&repo, "docs");

    let report = run(dir.path(), &config()).unwrap();

    assert!(report.short_circuit);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.reference_rule_files, 0);
}

#[test]
fn test_deleted_and_renamed_files_pass() {
    let (dir, repo) = reference_repo(&[
        ("rules/a.xml", A_XML),
        ("rules/b.xml", r#"<group><rule id="10"/></group>"#),
    ]);
    std::fs::remove_file(dir.path().join("rules/a.xml")).unwrap();
    std::fs::rename(dir.path().join("rules/b.xml"), dir.path().join("rules/c.xml")).unwrap();
    commit_all(&repo, "reshuffle");

    let report = run(dir.path(), &config()).unwrap();

    assert!(report.passed());
    assert_eq!(report.changed_rule_files, 1);
    assert_eq!(report.checked[0].path, "rules/c.xml");
    assert_eq!(report.checked[0].renamed_from.as_deref(), Some("rules/b.xml"));
    assert!(report.checked[0].new_ids.is_empty());
}

/// Eight rules, one per line, so an edited copy is still similar enough to
/// be detected as a rename.
fn numbered_rules(extra: &[u32]) -> String {
    let mut xml = String::from("<group name=\"numbered\">\n");
    for id in (1..=8).chain(extra.iter().copied()) {
        xml.push_str(&format!(
            "  <rule id=\"{id}\" level=\"3\"><description>rule number {id}</description></rule>\n"
        ));
    }
    xml.push_str("</group>\n");
    xml
}

#[test]
fn test_renamed_and_edited_file_claiming_owned_id_is_rejected() {
    let (dir, repo) = reference_repo(&[
        ("rules/a.xml", &numbered_rules(&[])),
        ("rules/b.xml", r#"<group><rule id="42"/></group>"#),
    ]);
    std::fs::remove_file(dir.path().join("rules/a.xml")).unwrap();
    write(dir.path(), "rules/z.xml", &numbered_rules(&[42]));
    commit_all(&repo, "rename a to z and take 42");

    let report = run(dir.path(), &config()).unwrap();

    assert!(!report.short_circuit);
    assert_eq!(report.exit_code(), 1);
    let Verdict::Conflict { file, conflicts } = &report.verdicts[0] else {
        panic!("expected a conflict, got {:?}", report.verdicts[0]);
    };
    assert_eq!(file, "rules/z.xml");
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].id, RuleId(42));
    assert_eq!(conflicts[0].owners, vec!["rules/b.xml"]);
}

#[test]
fn test_uncommitted_move_passes() {
    let (dir, _repo) = reference_repo(&[("rules/a.xml", A_XML)]);
    std::fs::rename(dir.path().join("rules/a.xml"), dir.path().join("rules/moved.xml")).unwrap();

    let report = run(dir.path(), &config()).unwrap();

    assert!(report.passed(), "{}", report.summary());
    assert_eq!(report.checked[0].renamed_from.as_deref(), Some("rules/a.xml"));
}

#[test]
fn test_internal_duplicate_in_new_file() {
    let (dir, repo) = reference_repo(&[("rules/a.xml", A_XML)]);
    write(
        dir.path(),
        "rules/b.xml",
        r#"<group><rule id="100"/><rule id="100"/></group>"#,
    );
    commit_all(&repo, "dup");

    let report = run(dir.path(), &config()).unwrap();

    assert_eq!(
        report.verdicts,
        vec![Verdict::InternalDuplicate {
            file: "rules/b.xml".into(),
            ids: vec![RuleId(100)],
        }]
    );
}

#[test]
fn test_collect_all_with_malformed_file() {
    let (dir, repo) = reference_repo(&[("rules/a.xml", A_XML)]);
    write(dir.path(), "rules/b.xml", r#"<rule id="1"/>"#);
    write(dir.path(), "rules/c.xml", r#"<group><rule id="2">"#);
    write(dir.path(), "rules/d.xml", r#"<rule id="2"/><rule id="7"/>"#);
    commit_all(&repo, "several");

    let cfg = GateConfig {
        policy: Policy::CollectAll,
        ..config()
    };
    let report = run(dir.path(), &cfg).unwrap();

    let files: Vec<Option<&str>> = report.verdicts.iter().map(Verdict::file).collect();
    assert_eq!(files, vec![Some("rules/b.xml"), Some("rules/d.xml")]);
    assert_eq!(report.offending_ids(), vec![RuleId(1), RuleId(2)]);
    assert!(report
        .diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::ParseFailure { path, .. } if path == "rules/c.xml")));
}

#[test]
fn test_missing_reference_branch_is_an_error() {
    let (dir, _repo) = reference_repo(&[("rules/a.xml", A_XML)]);
    let cfg = GateConfig {
        reference_branch: "release".into(),
        ..config()
    };

    let err = run(dir.path(), &cfg).unwrap_err();
    assert!(matches!(err, SourceError::ReferenceUnavailable { .. }));
}

#[test]
fn test_excluded_files_are_not_checked() {
    let (dir, repo) = reference_repo(&[("rules/a.xml", A_XML)]);
    write(dir.path(), "rules/vendor/b.xml", r#"<rule id="1"/>"#);
    commit_all(&repo, "vendor");

    let cfg = GateConfig {
        exclude: vec!["rules/vendor/**".into()],
        ..config()
    };
    let report = run(dir.path(), &cfg).unwrap();
    assert!(report.short_circuit);
}
