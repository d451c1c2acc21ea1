//! `git` executable backend.
//!
//! Supports partial clones (`--filter=blob:none`), which libgit2 does not.
//! Each invocation passes its working directory through `current_dir`.

use std::path::Path;
use std::process::Command;

use crate::config::GitSettings;
use crate::error::GitError;
use crate::source::{verify_pinned_commit, GitResult, SourceControl};
use crate::system::tail_lines;

/// Lines of git stderr kept in error reports
const STDERR_TAIL_LINES: usize = 40;

/// Source-control backend that shells out to `git`.
pub struct GitCli {
    settings: GitSettings,
}

impl GitCli {
    pub fn new(settings: GitSettings) -> Self {
        GitCli { settings }
    }

    /// Arguments for the initial shallow clone.
    pub fn clone_args(&self, origin: &str, dest: &Path) -> Vec<String> {
        let mut args = vec![
            "clone".to_string(),
            "--depth".to_string(),
            self.settings.depth.to_string(),
            "--single-branch".to_string(),
            "--no-tags".to_string(),
        ];
        if let Some(filter) = &self.settings.filter {
            args.push(format!("--filter={}", filter));
        }
        args.push("--".to_string());
        args.push(origin.to_string());
        args.push(dest.to_string_lossy().into_owned());
        args
    }

    /// Arguments for a targeted fetch of a revision missing from the clone.
    pub fn fetch_args(&self, revision: &str) -> Vec<String> {
        let mut args = vec![
            "fetch".to_string(),
            "--depth".to_string(),
            self.settings.depth.to_string(),
            "--no-tags".to_string(),
        ];
        if let Some(filter) = &self.settings.filter {
            args.push(format!("--filter={}", filter));
        }
        args.push("origin".to_string());
        args.push(revision.to_string());
        args
    }

    /// Arguments for the recursive submodule update.
    pub fn submodule_args(&self, recursive: bool) -> Vec<String> {
        let mut args = vec![
            "submodule".to_string(),
            "update".to_string(),
            "--init".to_string(),
        ];
        if recursive {
            args.push("--recursive".to_string());
        }
        args.push("--depth".to_string());
        args.push(self.settings.depth.to_string());
        args
    }

    fn render(&self, args: &[String]) -> String {
        let mut rendered = self.settings.program.clone();
        for arg in args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }

    /// Run git in `cwd`, returning trimmed stdout.
    fn git(&self, cwd: &Path, args: &[String]) -> GitResult<String> {
        let rendered = self.render(args);
        log::debug!("[Git] [CLI] {} (in {})", rendered, cwd.display());

        let output = Command::new(&self.settings.program)
            .args(args)
            .current_dir(cwd)
            // fail instead of waiting for credentials on a terminal
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| GitError::Command {
                command: rendered.clone(),
                exit_code: None,
                stderr: format!("failed to spawn {}: {}", self.settings.program, e),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            log::debug!("[Git] [CLI] {}", line);
        }

        if !output.status.success() {
            return Err(GitError::Command {
                command: rendered,
                exit_code: output.status.code(),
                stderr: tail_lines(&stderr, STDERR_TAIL_LINES),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn resolves_locally(&self, repo_dir: &Path, revision: &str) -> bool {
        let args = vec![
            "rev-parse".to_string(),
            "--verify".to_string(),
            "--quiet".to_string(),
            format!("{}^{{commit}}", revision),
        ];
        self.git(repo_dir, &args).is_ok()
    }
}

impl SourceControl for GitCli {
    fn name(&self) -> &'static str {
        "git-cli"
    }

    fn clone_shallow(&self, origin: &str, dest: &Path) -> GitResult<()> {
        let parent = dest.parent().ok_or_else(|| {
            GitError::Clone(format!("clone destination has no parent: {}", dest.display()))
        })?;
        log::info!("[Git] [CLONE] Shallow clone of {} into {}", origin, dest.display());
        self.git(parent, &self.clone_args(origin, dest))?;
        Ok(())
    }

    fn reset_hard(&self, repo_dir: &Path, revision: &str) -> GitResult<String> {
        let target = if self.resolves_locally(repo_dir, revision) {
            revision.to_string()
        } else {
            log::info!("[Git] [FETCH] {} not in shallow history, fetching it", revision);
            self.git(repo_dir, &self.fetch_args(revision))?;
            "FETCH_HEAD".to_string()
        };

        self.git(
            repo_dir,
            &["reset".to_string(), "--hard".to_string(), target],
        )?;

        let head = self.head_commit(repo_dir)?;
        verify_pinned_commit(revision, &head)?;
        log::info!("[Git] [RESET] HEAD is now {}", head);
        Ok(head)
    }

    fn update_submodules(&self, repo_dir: &Path, recursive: bool) -> GitResult<()> {
        if !repo_dir.join(".gitmodules").exists() {
            log::debug!("[Git] [SUBMODULE] No .gitmodules, nothing to update");
            return Ok(());
        }
        self.git(repo_dir, &self.submodule_args(recursive))?;
        Ok(())
    }

    fn head_commit(&self, repo_dir: &Path) -> GitResult<String> {
        self.git(repo_dir, &["rev-parse".to_string(), "HEAD".to_string()])
    }
}
