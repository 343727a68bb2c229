//! Metadata repository checkouts via the `git` CLI

use crate::ImportError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// One study (or system) repository checkout
#[derive(Debug, Clone)]
pub struct GitRepository {
    path: PathBuf,
    url: String,
}

impl GitRepository {
    pub fn new(path: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            url: url.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the `git` executable can be run
    pub async fn available() -> bool {
        Command::new("git")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    pub fn is_cloned(&self) -> bool {
        self.path.join(".git").exists()
    }

    /// Fast-forward an existing checkout, or clone it
    pub async fn pull_or_clone(&self) -> Result<String, ImportError> {
        if self.is_cloned() {
            info!(path = %self.path.display(), "Pulling repository");
            self.git(&["pull", "--ff-only"]).await?;
        } else {
            if self.url.is_empty() {
                return Err(ImportError::Git(format!(
                    "no checkout at {} and no repository url",
                    self.path.display()
                )));
            }
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            info!(url = %self.url, path = %self.path.display(), "Cloning repository");
            run_git(None, &["clone", "--", &self.url, &self.path.to_string_lossy()]).await?;
        }
        self.head_commit().await
    }

    pub async fn head_commit(&self) -> Result<String, ImportError> {
        let output = self.git(&["rev-parse", "HEAD"]).await?;
        Ok(output.trim().to_string())
    }

    /// Files changed between two commits, relative to the repository root
    ///
    /// With `subdir`, only files below it are listed. Without `old`, every
    /// tracked file of `new` counts as changed.
    pub async fn changed_files(
        &self,
        old: Option<&str>,
        new: &str,
        subdir: Option<&str>,
    ) -> Result<Vec<PathBuf>, ImportError> {
        let mut args: Vec<String> = match old {
            Some(old) => vec!["diff".into(), "--name-only".into(), old.into(), new.into()],
            None => vec!["ls-tree".into(), "-r".into(), "--name-only".into(), new.into()],
        };
        if let Some(subdir) = subdir {
            args.push("--".into());
            args.push(subdir.into());
        }

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.git(&args).await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    async fn git(&self, args: &[&str]) -> Result<String, ImportError> {
        run_git(Some(&self.path), args).await
    }
}

async fn run_git(dir: Option<&Path>, args: &[&str]) -> Result<String, ImportError> {
    let mut command = Command::new("git");
    if let Some(dir) = dir {
        command.arg("-C").arg(dir);
    }
    debug!(?args, "Running git");

    let output = command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ImportError::Git(format!("failed to run git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ImportError::Git(format!("git {} failed: {}", args.join(" "), stderr.trim())));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn commit_all(dir: &Path, message: &str) {
        for args in [
            vec!["add", "-A"],
            vec![
                "-c",
                "user.name=ddi",
                "-c",
                "user.email=ddi@localhost",
                "commit",
                "-q",
                "-m",
                message,
            ],
        ] {
            run_git(Some(dir), &args).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_clone_head_and_changed_files() {
        if !GitRepository::available().await {
            eprintln!("git not available, skipping");
            return;
        }

        let temp = tempfile::tempdir().unwrap();
        let origin = temp.path().join("origin");
        std::fs::create_dir_all(origin.join("ddionrails")).unwrap();
        run_git(None, &["init", "-q", &origin.to_string_lossy()]).await.unwrap();
        std::fs::write(origin.join("ddionrails/study.json"), "{}").unwrap();
        std::fs::write(origin.join("README.md"), "x").unwrap();
        commit_all(&origin, "first").await;

        let checkout = GitRepository::new(temp.path().join("checkout"), origin.to_string_lossy());
        let first = checkout.pull_or_clone().await.unwrap();
        assert_eq!(first.len(), 40);

        std::fs::write(origin.join("ddionrails/topics.csv"), "topic\nhealth\n").unwrap();
        std::fs::write(origin.join("README.md"), "y").unwrap();
        commit_all(&origin, "second").await;

        let second = checkout.pull_or_clone().await.unwrap();
        assert_ne!(first, second);

        let changed = checkout
            .changed_files(Some(&first), &second, Some("ddionrails"))
            .await
            .unwrap();
        assert_eq!(changed, vec![PathBuf::from("ddionrails/topics.csv")]);

        let all = checkout.changed_files(None, &second, None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_option_like_url_is_not_passed_as_option() {
        if !GitRepository::available().await {
            eprintln!("git not available, skipping");
            return;
        }

        let temp = tempfile::tempdir().unwrap();
        let marker = temp.path().join("marker");
        let url = format!("--upload-pack=touch {}", marker.display());
        let checkout = GitRepository::new(temp.path().join("checkout"), url);

        assert!(checkout.pull_or_clone().await.is_err());
        assert!(!marker.exists());
        assert!(!checkout.is_cloned());
    }
}
