//! Request context for plan generation: OS, shell, working directory, and
//! git state when inside a repository.

use std::path::Path;
use std::process::Command;

use anyhow::{Context as _, Result};

#[derive(Debug, Clone, Default)]
pub struct Context {
    pub os: String,
    pub shell: String,
    pub cwd: String,
    pub repo_root: String,
    pub git_status: String,
}

pub fn build_context(shell_override: Option<&str>, cwd_override: Option<&str>) -> Result<Context> {
    let shell = shell_override
        .map(str::to_string)
        .or_else(|| std::env::var("SHELL").ok().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "sh".to_string());

    let cwd = match cwd_override {
        Some(cwd) => cwd.to_string(),
        None => std::env::current_dir()
            .context("determine working directory")?
            .to_string_lossy()
            .into_owned(),
    };

    let (repo_root, git_status) = detect_git(Path::new(&cwd));

    Ok(Context {
        os: std::env::consts::OS.to_string(),
        shell,
        cwd,
        repo_root,
        git_status,
    })
}

fn detect_git(cwd: &Path) -> (String, String) {
    let Some(repo_root) = run_git(cwd, &["rev-parse", "--show-toplevel"]) else {
        return (String::new(), String::new());
    };
    if repo_root.is_empty() {
        return (String::new(), String::new());
    }
    let status = run_git(cwd, &["status", "--porcelain", "-b"]).unwrap_or_default();
    (repo_root, status)
}

fn run_git(cwd: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).current_dir(cwd).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_fills_os_and_shell() {
        let ctx = build_context(Some("zsh"), Some("/tmp")).unwrap();
        assert_eq!(ctx.os, std::env::consts::OS);
        assert_eq!(ctx.shell, "zsh");
        assert_eq!(ctx.cwd, "/tmp");
    }

    #[test]
    fn non_repo_dir_has_empty_git_fields() {
        let dir = tempfile::tempdir().unwrap();
        let (root, status) = detect_git(dir.path());
        assert!(root.is_empty());
        assert!(status.is_empty());
    }
}
