//! Change set: rule files added or modified relative to the reference point.

use tracing::{debug, info, warn};

use crate::errors::SourceError;
use crate::file_filter::RuleFileFilter;
use crate::models::{ChangedRuleFile, EditStatus, RuleFile};
use crate::report::{Diagnostic, Side};
use crate::source::RuleSource;

/// Rule files the change adds or modifies, in the order the source listed
/// them, plus counts of rule files that were listed but not checked.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub files: Vec<ChangedRuleFile>,
    /// Deleted rule files; they claim no new ids.
    pub ignored: usize,
    /// Changed rule files whose working content could not be read.
    pub unreadable: usize,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

/// Collect the added and modified rule files of the working state.
///
/// Paths outside the rule-definitions directory or without the rule
/// extension never enter the change set. For modified files the reference
/// content of the same path is loaded too, so the decider can diff ids. A
/// renamed file is diffed against its old path; moved in from outside the
/// rule files, it counts as added.
pub fn build_change_set(
    source: &dyn RuleSource,
    filter: &RuleFileFilter,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<ChangeSet, SourceError> {
    info!(reference = %source.reference_name(), "collecting changed rule files");
    let mut set = ChangeSet::default();

    for change in source.list_changed_files()? {
        if !filter.accepts(&change.path) {
            continue;
        }
        if !change.status.is_checked() {
            debug!(path = %change.path, status = %change.status, "ignoring change");
            set.ignored += 1;
            continue;
        }

        let content = match source.read_working_file(&change.path) {
            Ok(content) => content,
            Err(e) if !e.is_fatal() => {
                warn!(path = %change.path, error = %e, "skipping unreadable changed file");
                diagnostics.push(Diagnostic::ReadFailure {
                    path: change.path.clone(),
                    side: Side::Working,
                    detail: e.to_string(),
                });
                set.unreadable += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        let mut status = change.status;
        if status == EditStatus::Renamed && !filter.accepts(change.reference_path()) {
            debug!(
                path = %change.path,
                from = change.reference_path(),
                "moved in from outside the rule files, checking as added"
            );
            status = EditStatus::Added;
        }

        let reference = if matches!(status, EditStatus::Modified | EditStatus::Renamed) {
            let old_path = change.reference_path();
            match source.read_reference_file(old_path) {
                Ok(old) => Some(RuleFile::new(old_path, old)),
                Err(e) if !e.is_fatal() => {
                    warn!(path = %change.path, error = %e, "reference version unavailable");
                    diagnostics.push(Diagnostic::MissingReferenceContent {
                        path: change.path.clone(),
                    });
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        debug!(path = %change.path, status = %status, "changed rule file");
        set.files.push(ChangedRuleFile {
            status,
            working: RuleFile::new(change.path, content),
            reference,
        });
    }

    info!(
        files = set.len(),
        ignored = set.ignored,
        unreadable = set.unreadable,
        "change set collected"
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangedPath;
    use crate::source::MemoryRuleSource;

    fn filter() -> RuleFileFilter {
        RuleFileFilter::new("rules", "xml")
    }

    #[test]
    fn test_restricts_to_rule_files() {
        let source = MemoryRuleSource::new("origin/main")
            .with_reference_file("rules/a.xml", "<rule id=\"1\"/>")
            .with_working_file("rules/a.xml", "<rule id=\"1\"/><rule id=\"2\"/>")
            .with_working_file("rules/notes.txt", "hello")
            .with_working_file("src/b.xml", "<rule id=\"9\"/>")
            .with_working_file("rules/c.xml", "<rule id=\"3\"/>");
        let mut diags = Vec::new();
        let set = build_change_set(&source, &filter(), &mut diags).unwrap();

        let paths: Vec<&str> = set.files.iter().map(|f| f.path()).collect();
        assert_eq!(paths, vec!["rules/a.xml", "rules/c.xml"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_modified_files_carry_reference_content() {
        let source = MemoryRuleSource::new("origin/main")
            .with_reference_file("rules/a.xml", "<rule id=\"1\"/>")
            .with_working_file("rules/a.xml", "<rule id=\"2\"/>")
            .with_working_file("rules/b.xml", "<rule id=\"3\"/>");
        let set = build_change_set(&source, &filter(), &mut Vec::new()).unwrap();

        assert_eq!(set.files[0].status, EditStatus::Modified);
        assert_eq!(
            set.files[0].reference.as_ref().map(|r| r.content.as_str()),
            Some("<rule id=\"1\"/>")
        );
        assert_eq!(set.files[1].status, EditStatus::Added);
        assert!(set.files[1].reference.is_none());
    }

    #[test]
    fn test_deleted_files_are_ignored() {
        let source = MemoryRuleSource::new("origin/main").with_changes(vec![
            ChangedPath::new(EditStatus::Deleted, "rules/gone.xml"),
        ]);
        let set = build_change_set(&source, &filter(), &mut Vec::new()).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.ignored, 1);
    }

    #[test]
    fn test_renamed_files_carry_old_reference_content() {
        let source = MemoryRuleSource::new("origin/main")
            .with_reference_file("rules/a.xml", "<rule id=\"1\"/>")
            .without_working_file("rules/a.xml")
            .with_working_file("rules/z.xml", "<g><rule id=\"1\"/><rule id=\"42\"/></g>")
            .with_changes(vec![ChangedPath::renamed("rules/a.xml", "rules/z.xml")]);
        let set = build_change_set(&source, &filter(), &mut Vec::new()).unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.ignored, 0);
        let file = &set.files[0];
        assert_eq!(file.status, EditStatus::Renamed);
        assert_eq!(file.path(), "rules/z.xml");
        assert_eq!(file.renamed_from(), Some("rules/a.xml"));
        assert_eq!(
            file.reference.as_ref().map(|r| r.content.as_str()),
            Some("<rule id=\"1\"/>")
        );
    }

    #[test]
    fn test_rename_from_outside_rules_counts_as_added() {
        let source = MemoryRuleSource::new("origin/main")
            .with_reference_file("drafts/a.xml", "<rule id=\"1\"/>")
            .without_working_file("drafts/a.xml")
            .with_working_file("rules/a.xml", "<rule id=\"1\"/>")
            .with_changes(vec![ChangedPath::renamed("drafts/a.xml", "rules/a.xml")]);
        let set = build_change_set(&source, &filter(), &mut Vec::new()).unwrap();

        assert_eq!(set.files[0].status, EditStatus::Added);
        assert!(set.files[0].reference.is_none());
    }

    #[test]
    fn test_preserves_listing_order() {
        let source = MemoryRuleSource::new("origin/main")
            .with_working_file("rules/z.xml", "<rule id=\"1\"/>")
            .with_working_file("rules/a.xml", "<rule id=\"2\"/>")
            .with_changes(vec![
                ChangedPath::new(EditStatus::Added, "rules/z.xml"),
                ChangedPath::new(EditStatus::Added, "rules/a.xml"),
            ]);
        let set = build_change_set(&source, &filter(), &mut Vec::new()).unwrap();
        let paths: Vec<&str> = set.files.iter().map(|f| f.path()).collect();
        assert_eq!(paths, vec!["rules/z.xml", "rules/a.xml"]);
    }

    #[test]
    fn test_read_failures_are_recovered() {
        let source = MemoryRuleSource::new("origin/main")
            .with_working_file("rules/a.xml", "<rule id=\"1\"/>")
            .with_working_file("rules/b.xml", "<rule id=\"2\"/>")
            .with_unreadable("rules/a.xml");
        let mut diags = Vec::new();
        let set = build_change_set(&source, &filter(), &mut diags).unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.unreadable, 1);
        assert!(matches!(
            &diags[0],
            Diagnostic::ReadFailure { side: Side::Working, .. }
        ));
    }

    #[test]
    fn test_missing_reference_version_is_reported() {
        let source = MemoryRuleSource::new("origin/main")
            .with_working_file("rules/a.xml", "<rule id=\"1\"/>")
            .with_changes(vec![ChangedPath::new(EditStatus::Modified, "rules/a.xml")]);
        let mut diags = Vec::new();
        let set = build_change_set(&source, &filter(), &mut diags).unwrap();

        assert_eq!(set.len(), 1);
        assert!(set.files[0].reference.is_none());
        assert_eq!(
            diags,
            vec![Diagnostic::MissingReferenceContent {
                path: "rules/a.xml".into()
            }]
        );
    }
}
