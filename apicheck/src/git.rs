// Copyright 2025 Oxide Computer Company

//! Helpers for reading specs stored in git

use camino::Utf8Path;
use std::fmt;
use std::process::Output;
use tokio::process::Command;

/// Newtype String wrapper identifying a Git revision
///
/// This could be a commit, branch name, tag name, etc.  This type does not
/// validate the contents.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct GitRevision(String);

impl GitRevision {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for GitRevision {
    fn from(revision: String) -> Self {
        GitRevision(revision)
    }
}

impl From<&str> for GitRevision {
    fn from(revision: &str) -> Self {
        GitRevision(revision.to_owned())
    }
}

impl fmt::Display for GitRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("invoking {label}")]
    Spawn {
        label: String,
        #[source]
        err: std::io::Error,
    },
    #[error(
        "command failed: {label}: {status}\n\
         stderr:\n\
         -----\n\
         {stderr}\n\
         -----"
    )]
    Failed { label: String, status: std::process::ExitStatus, stderr: String },
}

/// Returns the contents of the file at the given path `path` in Git revision
/// `revision`.
///
/// The `GIT` environment variable, if set, names the git binary to run.
pub async fn git_show_file(
    revision: &GitRevision,
    path: &Utf8Path,
) -> Result<Vec<u8>, GitError> {
    let git = std::env::var("GIT").unwrap_or_else(|_| String::from("git"));
    git_show_file_with(&git, revision, path).await
}

/// Like [`git_show_file`], but runs the git binary at `git`.
pub async fn git_show_file_with(
    git: &str,
    revision: &GitRevision,
    path: &Utf8Path,
) -> Result<Vec<u8>, GitError> {
    let mut cmd = Command::new(git);
    cmd.arg("cat-file").arg("blob").arg(format!("{}:{}", revision, path));
    let output = do_run(&mut cmd).await?;
    Ok(output.stdout)
}

/// Runs an assembled git(1) command, returning its output on success and an
/// error including the exit status and stderr contents on failure.
async fn do_run(cmd: &mut Command) -> Result<Output, GitError> {
    let label = cmd_label(cmd);
    let output = cmd
        .output()
        .await
        .map_err(|err| GitError::Spawn { label: label.clone(), err })?;
    if output.status.success() {
        return Ok(output);
    }

    Err(GitError::Failed {
        label,
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Returns a string describing an assembled command (for debugging and error
/// reporting)
fn cmd_label(cmd: &Command) -> String {
    let cmd = cmd.as_std();
    format!(
        "{:?} {}",
        cmd.get_program(),
        cmd.get_args()
            .map(|a| format!("{:?}", a))
            .collect::<Vec<_>>()
            .join(" ")
    )
}
