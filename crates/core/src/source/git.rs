//! [`RuleSource`] backed by a local Git repository via `git2`.

use std::path::{Path, PathBuf};

use git2::{
    Cred, Delta, DiffFile, DiffFindOptions, DiffOptions, FetchOptions, ObjectType, Oid, RemoteCallbacks,
    Repository, Tree, TreeWalkMode, TreeWalkResult,
};
use tracing::{debug, info, instrument, warn};

use super::RuleSource;
use crate::config::GateConfig;
use crate::errors::SourceError;
use crate::models::{ChangedPath, EditStatus};

/// Compares a repository's working tree against a remote-tracking branch.
pub struct GitRuleSource {
    repo: Repository,
    workdir: PathBuf,
    remote: String,
    branch: String,
    fetch: bool,
    token: Option<String>,
    reference_tree: Option<Oid>,
}

impl GitRuleSource {
    /// Open the repository containing `path`.
    pub fn open<P: AsRef<Path>>(path: P, remote: &str, branch: &str) -> Result<Self, SourceError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening git repository");
        let repo = Repository::discover(path)
            .map_err(|_| SourceError::RepositoryNotFound(path.display().to_string()))?;
        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| SourceError::RepositoryNotFound(format!("{} (bare)", path.display())))?;
        Ok(Self {
            repo,
            workdir,
            remote: remote.to_string(),
            branch: branch.to_string(),
            fetch: true,
            token: None,
            reference_tree: None,
        })
    }

    /// Open the repository at `path` using the remote, branch, fetch flag and
    /// token from `config`.
    pub fn from_config<P: AsRef<Path>>(path: P, config: &GateConfig) -> Result<Self, SourceError> {
        Ok(Self::open(path, &config.remote, &config.reference_branch)?
            .with_fetch(config.fetch)
            .with_token(config.token.clone()))
    }

    pub fn with_fetch(mut self, fetch: bool) -> Self {
        self.fetch = fetch;
        self
    }

    /// Token used as the password for HTTPS fetches.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn tracking_ref(&self) -> String {
        format!("refs/remotes/{}/{}", self.remote, self.branch)
    }

    #[instrument(skip(self), fields(remote = %self.remote, branch = %self.branch))]
    fn fetch_reference(&self) -> Result<(), SourceError> {
        info!("fetching reference branch");
        let mut remote = self
            .repo
            .find_remote(&self.remote)
            .map_err(|e| self.unavailable(e))?;
        let mut callbacks = RemoteCallbacks::new();
        if let Some(ref tok) = self.token {
            let tok = tok.clone();
            callbacks.credentials(move |_url, _username, _allowed| {
                Cred::userpass_plaintext("x-access-token", &tok)
            });
        }
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(callbacks);
        let refspec = format!("+refs/heads/{}:{}", self.branch, self.tracking_ref());
        remote
            .fetch(&[refspec.as_str()], Some(&mut fetch_opts), None)
            .map_err(|e| self.unavailable(e))?;
        debug!("fetch completed");
        Ok(())
    }

    /// Resolve the reference tree: remote-tracking branch first, then a
    /// local branch of the same name.
    fn resolve_reference_tree(&self) -> Result<Oid, SourceError> {
        let candidates = [self.tracking_ref(), format!("refs/heads/{}", self.branch)];
        for name in &candidates {
            match self.repo.find_reference(name).and_then(|r| r.peel_to_tree()) {
                Ok(tree) => {
                    info!(reference = %name, tree = %tree.id(), "resolved reference point");
                    return Ok(tree.id());
                }
                Err(e) => debug!(reference = %name, error = %e, "reference candidate not usable"),
            }
        }
        Err(SourceError::ReferenceUnavailable {
            reference: self.reference_name(),
            detail: format!("none of {} resolve to a commit", candidates.join(", ")),
        })
    }

    fn reference_tree(&self) -> Result<Tree<'_>, SourceError> {
        let oid = self.reference_tree.ok_or_else(|| SourceError::ReferenceUnavailable {
            reference: self.reference_name(),
            detail: "reference point has not been resolved".into(),
        })?;
        Ok(self.repo.find_tree(oid)?)
    }

    fn unavailable(&self, err: git2::Error) -> SourceError {
        SourceError::ReferenceUnavailable {
            reference: self.reference_name(),
            detail: err.message().to_string(),
        }
    }
}

impl RuleSource for GitRuleSource {
    fn reference_name(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    fn ensure_reference_point_available(&mut self) -> Result<(), SourceError> {
        if self.fetch {
            self.fetch_reference()?;
        } else {
            debug!("fetch disabled, using local refs");
        }
        self.reference_tree = Some(self.resolve_reference_tree()?);
        Ok(())
    }

    #[instrument(skip(self))]
    fn list_changed_files(&self) -> Result<Vec<ChangedPath>, SourceError> {
        let tree = self.reference_tree()?;
        let mut opts = DiffOptions::new();
        opts.ignore_submodules(true)
            .include_untracked(true)
            .recurse_untracked_dirs(true);
        let mut diff = self
            .repo
            .diff_tree_to_workdir_with_index(Some(&tree), Some(&mut opts))
            .map_err(|e| SourceError::ListingFailed(e.message().to_string()))?;

        // Without rename detection a moved file reads as delete + add, and the
        // added copy would collide with its own old path. Untracked files must
        // be rename targets too, or an uncommitted move is never paired.
        let mut find_opts = DiffFindOptions::new();
        find_opts.renames(true).for_untracked(true);
        diff.find_similar(Some(&mut find_opts))
            .map_err(|e| SourceError::ListingFailed(e.message().to_string()))?;

        let mut changes = Vec::new();
        for delta in diff.deltas() {
            let status = match delta.status() {
                Delta::Added | Delta::Untracked | Delta::Copied => EditStatus::Added,
                Delta::Modified | Delta::Typechange | Delta::Conflicted | Delta::Unreadable => {
                    EditStatus::Modified
                }
                Delta::Deleted => EditStatus::Deleted,
                Delta::Renamed => EditStatus::Renamed,
                Delta::Unmodified | Delta::Ignored => continue,
            };
            let file = if status == EditStatus::Deleted {
                delta.old_file()
            } else {
                delta.new_file()
            };
            let Some(path) = repo_path(&file) else {
                warn!(?status, "skipping change with a non UTF-8 path");
                continue;
            };
            if status != EditStatus::Renamed {
                changes.push(ChangedPath::new(status, path));
                continue;
            }
            match repo_path(&delta.old_file()) {
                Some(old_path) => changes.push(ChangedPath::renamed(old_path, path)),
                None => {
                    warn!(path = %path, "rename source is not UTF-8, checking as added");
                    changes.push(ChangedPath::new(EditStatus::Added, path));
                }
            }
        }
        debug!(count = changes.len(), "listed changed files");
        Ok(changes)
    }

    fn list_reference_files(&self) -> Result<Vec<String>, SourceError> {
        let tree = self.reference_tree()?;
        let mut files = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    files.push(format!("{}{}", root, name));
                }
            }
            TreeWalkResult::Ok
        })
        .map_err(|e| SourceError::ListingFailed(e.message().to_string()))?;
        debug!(count = files.len(), "listed reference files");
        Ok(files)
    }

    fn read_reference_file(&self, path: &str) -> Result<String, SourceError> {
        let tree = self.reference_tree()?;
        let entry = tree
            .get_path(Path::new(path))
            .map_err(|e| SourceError::read_failed(path, e.message()))?;
        let blob = entry
            .to_object(&self.repo)
            .and_then(|obj| obj.peel_to_blob())
            .map_err(|e| SourceError::read_failed(path, e.message()))?;
        String::from_utf8(blob.content().to_vec())
            .map_err(|_| SourceError::read_failed(path, "content is not valid UTF-8"))
    }

    fn read_working_file(&self, path: &str) -> Result<String, SourceError> {
        std::fs::read_to_string(self.workdir.join(path))
            .map_err(|e| SourceError::read_failed(path, e))
    }
}

/// Forward-slash repository path of one side of a delta.
fn repo_path(file: &DiffFile<'_>) -> Option<String> {
    file.path()
        .and_then(Path::to_str)
        .map(|p| p.replace('\\', "/"))
}
