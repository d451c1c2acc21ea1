//! Shared fixtures for the integration tests: local origin repositories and
//! stand-in configure/package tools.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use dep_provisioner::config::ProvisionConfig;
use dep_provisioner::models::{DependencyDescriptor, SourceBackend};

pub const SPEC_V1: &str = "/* dwg.spec v1 */\nDWG_OBJECT (LINE)\n";
pub const SPEC_V2: &str = "/* dwg.spec v2 */\nDWG_OBJECT (LINE)\nDWG_OBJECT (ARC)\n";

/// Local origin with two commits touching `src/dwg.spec`.
pub struct Origin {
    pub path: PathBuf,
    pub first: String,
    pub second: String,
}

fn commit_file(repo: &git2::Repository, rel: &str, content: &str, message: &str) -> git2::Oid {
    let workdir = repo.workdir().expect("non-bare repo");
    let file = workdir.join(rel);
    fs::create_dir_all(file.parent().expect("file has a parent")).expect("Failed to create dirs");
    fs::write(&file, content).expect("Failed to write file");

    let mut index = repo.index().expect("Failed to get index");
    index.add_path(Path::new(rel)).expect("Failed to add file");
    index.write().expect("Failed to write index");
    commit_index(repo, message)
}

/// Commit whatever is currently staged in the index.
fn commit_index(repo: &git2::Repository, message: &str) -> git2::Oid {
    let mut index = repo.index().expect("Failed to get index");
    let tree_id = index.write_tree().expect("Failed to write tree");
    let tree = repo.find_tree(tree_id).expect("Failed to find tree");
    let sig = git2::Signature::now("Test User", "test@example.com").expect("Failed to create signature");

    let parents = match repo.head() {
        Ok(head) => vec![head.peel_to_commit().expect("HEAD is a commit")],
        Err(_) => vec![],
    };
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
        .expect("Failed to commit")
}

/// Create an origin repository at `path`.
pub fn create_origin(path: &Path) -> Origin {
    let repo = git2::Repository::init(path).expect("Failed to init origin repo");
    {
        let mut config = repo.config().expect("Failed to open repo config");
        config
            .set_bool("uploadpack.allowAnySHA1InWant", true)
            .expect("Failed to set config");
        config
            .set_bool("uploadpack.allowFilter", true)
            .expect("Failed to set config");
    }
    let first = commit_file(&repo, "src/dwg.spec", SPEC_V1, "Initial spec");
    commit_file(&repo, "README", "libredwg test origin\n", "Add readme");
    let second = commit_file(&repo, "src/dwg.spec", SPEC_V2, "Add ARC");
    Origin {
        path: path.to_path_buf(),
        first: first.to_string(),
        second: second.to_string(),
    }
}

/// Path of the submodule inside the superproject origin.
pub const SUBMODULE_PATH: &str = "vendor/sub";

/// Superproject origin whose last commit adds a submodule at
/// [`SUBMODULE_PATH`]; the submodule points at its own local origin.
pub struct SuperOrigin {
    pub origin: Origin,
    pub submodule: Origin,
    /// Commit that adds the submodule
    pub head: String,
}

/// Create `<root>/sub-origin` and `<root>/origin`, with the latter carrying
/// the former as a submodule.
pub fn create_origin_with_submodule(root: &Path) -> SuperOrigin {
    let submodule = create_origin(&root.join("sub-origin"));
    let origin = create_origin(&root.join("origin"));

    let repo = git2::Repository::open(&origin.path).expect("Failed to open origin");
    let url = submodule.path.to_string_lossy().into_owned();
    let mut added = repo
        .submodule(&url, Path::new(SUBMODULE_PATH), true)
        .expect("Failed to add submodule");
    added.clone(None).expect("Failed to clone submodule");
    added.add_finalize().expect("Failed to finalize submodule");
    let head = commit_index(&repo, "Add vendored submodule");

    SuperOrigin {
        origin,
        submodule,
        head: head.to_string(),
    }
}

/// Write an executable shell script.
pub fn write_script(path: &Path, body: &str) -> PathBuf {
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");
    let mut perms = fs::metadata(path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("Failed to chmod script");
    path.to_path_buf()
}

/// Configuration for a run against `origin` inside `root`, using the libgit2
/// backend and scripted configure/package tools that always succeed.
pub fn pipeline_config(root: &Path, origin: &Origin, revision: &str) -> ProvisionConfig {
    let project = root.join("project");
    fs::create_dir_all(&project).expect("Failed to create project dir");
    let tools = root.join("tools");
    fs::create_dir_all(&tools).expect("Failed to create tools dir");

    let configure = write_script(&tools.join("configure.sh"), "echo \"configure $*\"");
    let package = write_script(
        &tools.join("package.sh"),
        "mkdir -p prebuilds/linux-x64 && printf '%s' \"$CC\" > prebuilds/cc.txt && : > prebuilds/linux-x64/dep.napi.node",
    );

    let mut config = ProvisionConfig {
        workspace: root.join("libs"),
        project_dir: project,
        backend: SourceBackend::Libgit2,
        dependency: DependencyDescriptor::new(
            origin.path.to_string_lossy(),
            revision,
            "dep",
        ),
        ..ProvisionConfig::default()
    };
    config.configure.program = configure.to_string_lossy().into_owned();
    config.package.program = package.to_string_lossy().into_owned();
    config.package.args = Vec::new();
    config
}

/// Same as [`pipeline_config`], but fetching through the `git` executable.
///
/// Git refuses local-path submodule URLs by default, so git runs through a
/// wrapper that allows the file transport for this run only.
pub fn cli_pipeline_config(root: &Path, origin: &Origin, revision: &str) -> ProvisionConfig {
    let mut config = pipeline_config(root, origin, revision);
    let git = write_script(
        &root.join("tools/git-local.sh"),
        "exec git -c protocol.file.allow=always \"$@\"",
    );
    config.backend = SourceBackend::Cli;
    config.git.program = git.to_string_lossy().into_owned();
    config
}

/// Whether a `git` executable is available.
pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
