//! Native git management using the `git2` crate.
//!
//! libgit2 has no partial-clone filters, so this backend clones shallow but
//! unfiltered. Transports that refuse shallow fetches (the local file
//! transport among them) fall back to a full clone.

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{FetchOptions, Oid, RemoteCallbacks, Repository, ResetType, SubmoduleUpdateOptions};
use std::path::Path;

use crate::error::GitError;
use crate::source::{verify_pinned_commit, GitResult, SourceControl};
use crate::system::remove_dir_all_if_exists;

/// Source-control backend backed by libgit2.
pub struct Libgit2Source {
    depth: u32,
}

impl Libgit2Source {
    pub fn new(depth: u32) -> Self {
        Libgit2Source { depth }
    }

    fn open(repo_dir: &Path) -> GitResult<Repository> {
        Repository::open(repo_dir).map_err(|e| {
            GitError::Repository(format!(
                "Failed to open repository at {}: {}",
                repo_dir.display(),
                e
            ))
        })
    }

    fn fetch_options<'a>(&self) -> FetchOptions<'a> {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.transfer_progress(|progress| {
            let total = progress.total_objects();
            if total > 0 && progress.received_objects() == total {
                log::debug!(
                    "[Git] [PROGRESS] {}/{} objects ({} indexed)",
                    progress.received_objects(),
                    total,
                    progress.indexed_objects()
                );
            }
            true
        });

        let mut fetch_options = FetchOptions::new();
        fetch_options.depth(self.depth as i32);
        fetch_options.remote_callbacks(callbacks);
        fetch_options
    }

    /// Performs a shallow clone with the configured depth.
    fn shallow_clone(&self, url: &str, target_path: &Path) -> GitResult<()> {
        let mut builder = RepoBuilder::new();
        builder.fetch_options(self.fetch_options());
        builder.clone(url, target_path).map_err(|e| {
            GitError::Clone(format!("Shallow clone failed for {}: {}", url, e))
        })?;
        Ok(())
    }

    /// Resolve `revision` to a commit already present in the repository.
    fn resolve_local(repo: &Repository, revision: &str) -> Option<Oid> {
        let candidates = [
            revision.to_string(),
            format!("origin/{}", revision),
            format!("refs/tags/{}", revision),
        ];
        candidates.iter().find_map(|spec| {
            repo.revparse_single(spec)
                .and_then(|obj| obj.peel_to_commit())
                .map(|commit| commit.id())
                .ok()
        })
    }

    /// Fetch `revision` from origin at the configured depth and resolve it.
    fn fetch_revision(&self, repo: &Repository, revision: &str) -> GitResult<Oid> {
        let mut remote = repo.find_remote("origin").map_err(|e| {
            GitError::Repository(format!("Failed to find origin remote: {}", e))
        })?;

        let mut options = self.fetch_options();
        remote
            .fetch(&[revision], Some(&mut options), None)
            .map_err(|e| {
                GitError::RefNotFound(format!(
                    "Failed to fetch revision '{}' from origin: {}",
                    revision, e
                ))
            })?;

        repo.revparse_single("FETCH_HEAD")
            .and_then(|obj| obj.peel_to_commit())
            .map(|commit| commit.id())
            .map_err(|e| {
                GitError::RefNotFound(format!(
                    "Revision '{}' not found after fetch: {}",
                    revision, e
                ))
            })
    }

    fn update_submodules_in(repo: &Repository, recursive: bool) -> GitResult<()> {
        for mut submodule in repo.submodules()? {
            let name = submodule.name().unwrap_or("<unnamed>").to_string();
            log::info!("[Git] [SUBMODULE] Updating {}", name);

            let mut options = SubmoduleUpdateOptions::new();
            submodule.update(true, Some(&mut options)).map_err(|e| {
                GitError::Submodule(format!("Failed to update submodule {}: {}", name, e))
            })?;

            if recursive {
                let sub_repo = submodule.open().map_err(|e| {
                    GitError::Submodule(format!("Failed to open submodule {}: {}", name, e))
                })?;
                Self::update_submodules_in(&sub_repo, true)?;
            }
        }
        Ok(())
    }
}

impl SourceControl for Libgit2Source {
    fn name(&self) -> &'static str {
        "libgit2"
    }

    fn clone_shallow(&self, origin: &str, dest: &Path) -> GitResult<()> {
        log::info!(
            "[Git] [CLONE] Shallow clone (depth={}) of {} into {}",
            self.depth,
            origin,
            dest.display()
        );

        if let Err(shallow_err) = self.shallow_clone(origin, dest) {
            log::warn!("[Git] [CLONE] {}; falling back to full clone", shallow_err);
            remove_dir_all_if_exists(dest)?;
            Repository::clone(origin, dest).map_err(|e| {
                GitError::Clone(format!(
                    "Failed to clone {} to {}: {}",
                    origin,
                    dest.display(),
                    e
                ))
            })?;
        }

        log::info!("[Git] [CLONE] Clone completed");
        Ok(())
    }

    fn reset_hard(&self, repo_dir: &Path, revision: &str) -> GitResult<String> {
        let repo = Self::open(repo_dir)?;

        let oid = match Self::resolve_local(&repo, revision) {
            Some(oid) => oid,
            None => {
                log::info!("[Git] [FETCH] {} not in local history, fetching it", revision);
                self.fetch_revision(&repo, revision)?
            }
        };

        let commit = repo.find_commit(oid)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        repo.reset(commit.as_object(), ResetType::Hard, Some(&mut checkout))
            .map_err(|e| GitError::Reset(format!("Failed to reset to {}: {}", oid, e)))?;
        repo.set_head_detached(oid)
            .map_err(|e| GitError::Reset(format!("Failed to set HEAD: {}", e)))?;

        let head = oid.to_string();
        verify_pinned_commit(revision, &head)?;
        log::info!("[Git] [RESET] HEAD is now {}", head);
        Ok(head)
    }

    fn update_submodules(&self, repo_dir: &Path, recursive: bool) -> GitResult<()> {
        let repo = Self::open(repo_dir)?;
        Self::update_submodules_in(&repo, recursive)
    }

    fn head_commit(&self, repo_dir: &Path) -> GitResult<String> {
        let repo = Self::open(repo_dir)?;
        let head = repo
            .head()
            .map_err(|e| GitError::Repository(format!("Failed to read HEAD: {}", e)))?;
        let commit_id = head.target().ok_or_else(|| {
            GitError::Repository("HEAD is not a direct reference".to_string())
        })?;
        Ok(commit_id.to_string())
    }
}
