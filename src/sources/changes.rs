// src/sources/changes.rs

use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::process::Command;
use tracing::{debug, info};

use crate::fs::{FileSystem, RealFileSystem};
use crate::sources::BoxFuture;
use crate::types::ModuleId;

const MODULE_MARKER: &str = "terragrunt.hcl";

/// Determines which modules changed relative to a base revision.
pub trait ChangeDetector: Send + Sync {
    fn changed_modules<'a>(
        &'a self,
        repo: &'a Path,
        base: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Vec<ModuleId>>>;
}

/// `git diff --name-only <base> HEAD`, mapped onto module directories.
#[derive(Debug, Clone)]
pub struct GitChangeDetector {
    infra_dir: String,
    fs: Arc<dyn FileSystem>,
}

impl GitChangeDetector {
    pub fn new(infra_dir: impl Into<String>) -> Self {
        Self {
            infra_dir: infra_dir.into(),
            fs: Arc::new(RealFileSystem),
        }
    }

    async fn changed_files(&self, repo: &Path, base: &str) -> anyhow::Result<Vec<String>> {
        let output = Command::new("git")
            .args(["diff", "--name-only", base, "HEAD"])
            .current_dir(repo)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("running git diff in {}", repo.display()))?;

        if !output.status.success() {
            bail!(
                "git diff --name-only {base} HEAD exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl ChangeDetector for GitChangeDetector {
    fn changed_modules<'a>(
        &'a self,
        repo: &'a Path,
        base: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Vec<ModuleId>>> {
        Box::pin(async move {
            let files = self.changed_files(repo, base).await?;
            let modules = modules_for_files(self.fs.as_ref(), repo, &files, &self.infra_dir);
            info!(
                base,
                files = files.len(),
                modules = modules.len(),
                "detected changed modules"
            );
            Ok(modules)
        })
    }
}

/// A fixed change set, e.g. from `--changed`.
#[derive(Debug, Clone, Default)]
pub struct StaticChangeDetector {
    modules: Vec<ModuleId>,
}

impl StaticChangeDetector {
    pub fn new(modules: Vec<ModuleId>) -> Self {
        Self { modules }
    }
}

impl ChangeDetector for StaticChangeDetector {
    fn changed_modules<'a>(
        &'a self,
        _repo: &'a Path,
        _base: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Vec<ModuleId>>> {
        Box::pin(async move { Ok(self.modules.clone()) })
    }
}

/// Map changed file paths (relative to `repo`) to module ids.
///
/// A file belongs to the nearest enclosing directory that holds a
/// `terragrunt.hcl`; the repository root never counts. Module ids under
/// `<infra_dir>/<stack>/` lose that prefix so they match the graph's node
/// names. Ids come back de-duplicated in first-seen order.
pub fn modules_for_files(
    fs: &dyn FileSystem,
    repo: &Path,
    files: &[String],
    infra_dir: &str,
) -> Vec<ModuleId> {
    let mut seen = HashSet::new();
    let mut modules = Vec::new();

    for file in files {
        let Some(dir) = enclosing_module_dir(fs, repo, file) else {
            debug!(file = %file, "changed file belongs to no module");
            continue;
        };

        let id = strip_stack_prefix(&dir, infra_dir);
        if id.is_empty() || id == "." {
            continue;
        }
        if seen.insert(id.clone()) {
            modules.push(id);
        }
    }

    modules
}

fn enclosing_module_dir(fs: &dyn FileSystem, repo: &Path, file: &str) -> Option<String> {
    let segments: Vec<&str> = file
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    // Drop the file name, then try ever shorter prefixes; never the root.
    let dir_len = segments.len().checked_sub(1)?;
    (1..=dir_len).rev().find_map(|len| {
        let dir = segments[..len].join("/");
        fs.is_file(&repo.join(&dir).join(MODULE_MARKER))
            .then_some(dir)
    })
}

fn strip_stack_prefix(dir: &str, infra_dir: &str) -> ModuleId {
    let infra_dir = infra_dir.trim_matches('/');
    dir.strip_prefix(infra_dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|rest| rest.split_once('/'))
        .map(|(_stack, module)| module.to_string())
        .unwrap_or_else(|| dir.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    fn repo_fs() -> MockFileSystem {
        let fs = MockFileSystem::new();
        for dir in [
            "infra/dev/core",
            "infra/dev/networking",
            "infra/dev/databases/postgres",
            "infra/prod/core",
            "infra/prod/monitoring",
            "shared/modules/vpc",
        ] {
            fs.add_file(Path::new("/repo").join(dir).join(MODULE_MARKER), "");
        }
        fs
    }

    fn modules(files: &[&str]) -> Vec<ModuleId> {
        let files: Vec<String> = files.iter().map(|s| s.to_string()).collect();
        modules_for_files(&repo_fs(), Path::new("/repo"), &files, "infra")
    }

    #[test]
    fn files_in_one_module_yield_it_once() {
        assert_eq!(
            modules(&["infra/dev/core/main.tf", "infra/dev/core/variables.tf"]),
            vec!["core"]
        );
    }

    #[test]
    fn nested_files_map_to_nearest_module() {
        assert_eq!(
            modules(&[
                "infra/dev/core/main.tf",
                "infra/dev/networking/vpc.tf",
                "infra/dev/databases/postgres/sql/init.sql",
            ]),
            vec!["core", "networking", "databases/postgres"]
        );
    }

    #[test]
    fn same_module_in_two_stacks_collapses() {
        assert_eq!(
            modules(&[
                "infra/dev/core/main.tf",
                "infra/prod/core/main.tf",
                "infra/prod/monitoring/alerts.tf",
            ]),
            vec!["core", "monitoring"]
        );
    }

    #[test]
    fn modules_outside_infra_keep_their_full_path() {
        assert_eq!(
            modules(&["shared/modules/vpc/main.tf", "docs/README.md"]),
            vec!["shared/modules/vpc"]
        );
    }

    #[test]
    fn files_without_enclosing_module_contribute_nothing() {
        assert!(modules(&["docs/README.md", "shared/modules/security/policy.tf"]).is_empty());
    }

    #[test]
    fn repository_root_never_counts() {
        let fs = MockFileSystem::new().with_file("/repo/terragrunt.hcl", "");
        let files = vec!["root.hcl".to_string(), "docs/a.md".to_string()];

        assert!(modules_for_files(&fs, Path::new("/repo"), &files, "infra").is_empty());
    }

    #[test]
    fn custom_infra_dir_is_stripped() {
        let fs = MockFileSystem::new().with_file("/repo/deploy/stacks/local/db/terragrunt.hcl", "");
        let files = vec!["deploy/stacks/local/db/main.tf".to_string()];

        assert_eq!(
            modules_for_files(&fs, Path::new("/repo"), &files, "deploy/stacks"),
            vec!["db"]
        );
    }

    #[tokio::test]
    async fn static_detector_returns_its_list() {
        let detector = StaticChangeDetector::new(vec!["db".into(), "app".into()]);

        let found = detector
            .changed_modules(Path::new("."), "HEAD~1")
            .await
            .expect("static");
        assert_eq!(found, vec!["db", "app"]);
    }
}
