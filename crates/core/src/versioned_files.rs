//! Versioned record files with Git-based history.
//!
//! The git-backed store keeps every record as a YAML file inside one local Git repository
//! (`git2`/libgit2). This module owns the Git side of that:
//!
//! - **Atomic multi-file operations**: write and delete several files and commit them as one
//!   commit, restoring every touched file if any step fails.
//! - **Structured commit messages**: `<domain>:<action>: <summary>` with author and location
//!   trailers, so history can be read and filtered without parsing prose.
//!
//! ## Branch policy
//!
//! Repositories standardise on `refs/heads/main`.
//!
//! ## Commit message format
//!
//! ```text
//! certificate:create: issue 3 certificates
//!
//! Author-Name: Jan de Vries
//! Author-Privilege: location_admin
//! Location: Sneek
//! ```

use crate::actor::{Actor, Privilege};
use crate::constants::FALLBACK_COMMIT_EMAIL;
use crate::error::{CoreError, CoreResult};
use nwd_types::NonEmptyText;
use std::fmt;
use std::path::{Component, Path, PathBuf};

const MAIN_REF: &str = "refs/heads/main";

/// Which kind of record a commit touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommitDomain {
    Curriculum,
    Enrollment,
    Request,
    Certificate,
    Qualification,
}

impl CommitDomain {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Curriculum => "curriculum",
            Self::Enrollment => "enrollment",
            Self::Request => "request",
            Self::Certificate => "certificate",
            Self::Qualification => "qualification",
        }
    }
}

impl fmt::Display for CommitDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommitAction {
    Create,
    Update,
    /// Only certificates are ever deleted, and only inside the withdrawal window.
    Delete,
}

impl CommitAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for CommitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a commit is attributed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: NonEmptyText,
    pub email: String,
    pub privilege: Privilege,
}

impl From<&Actor> for CommitAuthor {
    fn from(actor: &Actor) -> Self {
        Self {
            name: actor.name.clone(),
            email: actor
                .email
                .as_ref()
                .map(|e| e.as_str().to_string())
                .unwrap_or_else(|| FALLBACK_COMMIT_EMAIL.to_string()),
            privilege: actor.privilege,
        }
    }
}

/// A structured, predictable commit message.
///
/// Commit messages are labels; they must not carry personal data beyond the acting person.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitMessage {
    domain: CommitDomain,
    action: CommitAction,
    summary: NonEmptyText,
    location: NonEmptyText,
}

impl CommitMessage {
    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] if the summary is empty or spans several lines.
    pub fn new(
        domain: CommitDomain,
        action: CommitAction,
        summary: impl AsRef<str>,
        location: NonEmptyText,
    ) -> CoreResult<Self> {
        let summary = NonEmptyText::new(summary.as_ref()).map_err(|e| {
            CoreError::InvalidInput(format!("commit summary: {e}"))
        })?;
        Ok(Self {
            domain,
            action,
            summary,
            location,
        })
    }

    pub fn domain(&self) -> CommitDomain {
        self.domain
    }

    pub fn action(&self) -> CommitAction {
        self.action
    }

    pub fn summary(&self) -> &str {
        self.summary.as_str()
    }

    /// Renders the subject line followed by the author and location trailers.
    pub fn render_with_author(&self, author: &CommitAuthor) -> String {
        format!(
            "{}:{}: {}\n\nAuthor-Name: {}\nAuthor-Privilege: {}\nLocation: {}",
            self.domain,
            self.action,
            self.summary.as_str(),
            author.name.as_str(),
            author.privilege,
            self.location.as_str(),
        )
    }
}

/// A file to write or delete as part of one commit.
#[derive(Debug, Clone)]
pub struct FileChange {
    /// Path relative to the repository working directory.
    pub relative_path: PathBuf,
    /// New content; `None` deletes the file.
    pub content: Option<String>,
    /// Content before the change, used for rollback. `None` if the file did not exist.
    pub old_content: Option<String>,
}

/// A Git repository holding versioned record files.
pub struct VersionedFileService {
    repo: git2::Repository,
    workdir: PathBuf,
}

impl VersionedFileService {
    /// Create a new Git repository at `workdir`.
    pub fn init(workdir: &Path) -> CoreResult<Self> {
        let repo = git2::Repository::init(workdir).map_err(CoreError::GitInit)?;
        // Use the repository's own workdir so path stripping matches libgit2's view.
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                CoreError::GitInit(git2::Error::from_str("repository has no working directory"))
            })?
            .to_path_buf();
        let service = Self {
            repo,
            workdir: actual_workdir,
        };
        service.ensure_main_head()?;
        Ok(service)
    }

    /// Open an existing repository at exactly `workdir` (no parent search).
    pub fn open(workdir: &Path) -> CoreResult<Self> {
        let repo = git2::Repository::open_ext(
            workdir,
            git2::RepositoryOpenFlags::NO_SEARCH,
            std::iter::empty::<&std::ffi::OsStr>(),
        )
        .map_err(CoreError::GitOpen)?;
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                CoreError::GitOpen(git2::Error::from_str("repository has no working directory"))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir: actual_workdir,
        })
    }

    /// Open the repository at `workdir`, initialising it (and the directory) if needed.
    pub fn open_or_init(workdir: &Path) -> CoreResult<Self> {
        if workdir.join(".git").is_dir() {
            return Self::open(workdir);
        }
        std::fs::create_dir_all(workdir).map_err(CoreError::StorageDirCreation)?;
        Self::init(workdir)
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn ensure_main_head(&self) -> CoreResult<()> {
        self.repo.set_head(MAIN_REF).map_err(CoreError::GitSetHead)
    }

    /// Applies `changes` to the working tree and commits them in a single commit.
    ///
    /// On error every written file is restored to its previous content (or removed if new),
    /// every deleted file is recreated, and directories created by this call are removed.
    pub fn write_and_commit_files(
        &self,
        author: &CommitAuthor,
        message: &CommitMessage,
        changes: &[FileChange],
    ) -> CoreResult<git2::Oid> {
        let mut created_dirs: Vec<PathBuf> = Vec::new();
        let mut touched: Vec<(PathBuf, Option<&str>)> = Vec::new();

        let result: CoreResult<git2::Oid> = (|| {
            for change in changes {
                reject_escaping_path(&change.relative_path)?;
            }

            let mut dirs_needed = std::collections::HashSet::new();
            for change in changes.iter().filter(|c| c.content.is_some()) {
                let full_path = self.workdir.join(&change.relative_path);
                let mut current = full_path.parent();
                while let Some(dir) = current {
                    if dir == self.workdir || dir.exists() {
                        break;
                    }
                    dirs_needed.insert(dir.to_path_buf());
                    current = dir.parent();
                }
            }

            // Shallowest first.
            let mut dirs_to_create: Vec<PathBuf> = dirs_needed.into_iter().collect();
            dirs_to_create.sort_by_key(|p| p.components().count());
            for dir in &dirs_to_create {
                std::fs::create_dir(dir).map_err(CoreError::FileWrite)?;
                created_dirs.push(dir.clone());
            }

            for change in changes {
                let full_path = self.workdir.join(&change.relative_path);
                match &change.content {
                    Some(content) => {
                        std::fs::write(&full_path, content).map_err(CoreError::FileWrite)?;
                    }
                    None => {
                        std::fs::remove_file(&full_path).map_err(CoreError::FileWrite)?;
                    }
                }
                touched.push((full_path, change.old_content.as_deref()));
            }

            self.commit_changes(author, message, changes)
        })();

        if result.is_err() {
            for (full_path, old_content) in touched.iter().rev() {
                match old_content {
                    Some(contents) => {
                        let _ = std::fs::write(full_path, contents);
                    }
                    None => {
                        let _ = std::fs::remove_file(full_path);
                    }
                }
            }
            for dir in created_dirs.iter().rev() {
                let _ = std::fs::remove_dir(dir);
            }
            // Drop anything staged by the failed attempt.
            if let Ok(mut index) = self.repo.index() {
                let _ = index.read(true);
            }
        }

        result
    }

    fn commit_changes(
        &self,
        author: &CommitAuthor,
        message: &CommitMessage,
        changes: &[FileChange],
    ) -> CoreResult<git2::Oid> {
        self.ensure_main_head()?;
        let mut index = self.repo.index().map_err(CoreError::GitIndex)?;

        for change in changes {
            if change.content.is_some() {
                index
                    .add_path(&change.relative_path)
                    .map_err(CoreError::GitAdd)?;
            } else {
                index
                    .remove_path(&change.relative_path)
                    .map_err(CoreError::GitRemove)?;
            }
        }
        let tree_id = index.write_tree().map_err(CoreError::GitWriteTree)?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(CoreError::GitFindTree)?;
        let sig = git2::Signature::now(author.name.as_str(), &author.email)
            .map_err(CoreError::GitSignature)?;

        let parents = self.resolve_head_parents()?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        let rendered = message.render_with_author(author);
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, &rendered, &tree, &parent_refs)
            .map_err(CoreError::GitCommit)?;

        // Persist the index only once the commit exists; rollback re-reads it from disk.
        index.write().map_err(CoreError::GitIndex)?;
        Ok(oid)
    }

    fn resolve_head_parents(&self) -> CoreResult<Vec<git2::Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit().map_err(CoreError::GitPeel)?;
                Ok(vec![commit])
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(vec![]),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(vec![]),
            Err(e) => Err(CoreError::GitHead(e)),
        }
    }

    /// Subject lines of the history, newest first.
    pub fn commit_subjects(&self) -> CoreResult<Vec<String>> {
        let mut walk = self.repo.revwalk().map_err(CoreError::GitHead)?;
        match walk.push_head() {
            Ok(()) => {}
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(vec![]),
            Err(e) => return Err(CoreError::GitHead(e)),
        }
        let mut subjects = Vec::new();
        for oid in walk {
            let oid = oid.map_err(CoreError::GitHead)?;
            let commit = self.repo.find_commit(oid).map_err(CoreError::GitPeel)?;
            subjects.push(commit.summary().unwrap_or_default().to_string());
        }
        Ok(subjects)
    }
}

fn reject_escaping_path(path: &Path) -> CoreResult<()> {
    if path.is_absolute() || path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(CoreError::InvalidInput(
            "record path must be relative and must not contain '..'".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn author() -> CommitAuthor {
        CommitAuthor {
            name: NonEmptyText::new("Jan de Vries").unwrap(),
            email: "jan@example.org".into(),
            privilege: Privilege::LocationAdmin,
        }
    }

    fn message(action: CommitAction) -> CommitMessage {
        CommitMessage::new(
            CommitDomain::Certificate,
            action,
            "issue 1 certificate",
            NonEmptyText::new("Sneek").unwrap(),
        )
        .unwrap()
    }

    fn write(path: &str, content: &str, old: Option<&str>) -> FileChange {
        FileChange {
            relative_path: PathBuf::from(path),
            content: Some(content.into()),
            old_content: old.map(str::to_string),
        }
    }

    #[test]
    fn render_with_author_matches_trailer_format() {
        let rendered = message(CommitAction::Create).render_with_author(&author());
        assert_eq!(
            rendered,
            "certificate:create: issue 1 certificate\n\nAuthor-Name: Jan de Vries\nAuthor-Privilege: location_admin\nLocation: Sneek"
        );
    }

    #[test]
    fn rejects_multiline_summary() {
        let err = CommitMessage::new(
            CommitDomain::Request,
            CommitAction::Update,
            "line one\nline two",
            NonEmptyText::new("Sneek").unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn writes_and_deletes_in_single_commits() {
        let dir = TempDir::new().unwrap();
        let svc = VersionedFileService::open_or_init(dir.path()).unwrap();

        svc.write_and_commit_files(
            &author(),
            &message(CommitAction::Create),
            &[write("a/b/one.yaml", "one: 1\n", None), write("two.yaml", "two: 2\n", None)],
        )
        .unwrap();
        assert!(dir.path().join("a/b/one.yaml").is_file());

        svc.write_and_commit_files(
            &author(),
            &message(CommitAction::Delete),
            &[FileChange {
                relative_path: PathBuf::from("two.yaml"),
                content: None,
                old_content: Some("two: 2\n".into()),
            }],
        )
        .unwrap();
        assert!(!dir.path().join("two.yaml").exists());

        let subjects = svc.commit_subjects().unwrap();
        assert_eq!(
            subjects,
            vec![
                "certificate:delete: issue 1 certificate".to_string(),
                "certificate:create: issue 1 certificate".to_string()
            ]
        );
    }

    #[test]
    fn failed_commit_rolls_back_every_file() {
        let dir = TempDir::new().unwrap();
        let svc = VersionedFileService::open_or_init(dir.path()).unwrap();
        svc.write_and_commit_files(
            &author(),
            &message(CommitAction::Create),
            &[write("kept.yaml", "v: 1\n", None)],
        )
        .unwrap();

        // Deleting a file that does not exist fails after the first write succeeded.
        let err = svc
            .write_and_commit_files(
                &author(),
                &message(CommitAction::Update),
                &[
                    write("kept.yaml", "v: 2\n", Some("v: 1\n")),
                    write("new/fresh.yaml", "v: 1\n", None),
                    FileChange {
                        relative_path: PathBuf::from("missing.yaml"),
                        content: None,
                        old_content: None,
                    },
                ],
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::FileWrite(_)));

        assert_eq!(
            std::fs::read_to_string(dir.path().join("kept.yaml")).unwrap(),
            "v: 1\n"
        );
        assert!(!dir.path().join("new").exists());
        assert_eq!(svc.commit_subjects().unwrap().len(), 1);
    }

    #[test]
    fn rejects_paths_escaping_the_repository() {
        let dir = TempDir::new().unwrap();
        let svc = VersionedFileService::open_or_init(dir.path()).unwrap();
        let err = svc
            .write_and_commit_files(
                &author(),
                &message(CommitAction::Create),
                &[write("../outside.yaml", "x: 1\n", None)],
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }
}
