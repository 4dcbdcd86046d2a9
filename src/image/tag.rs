//! Image tag generation from the current time and the VCS revision.

use crate::config::Config;
use crate::env::{defaults, keys};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use chrono::format::StrftimeItems;
use std::fmt::Write;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Tag generation errors.
#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("Invalid tag format '{0}'")]
    InvalidFormat(String),
}

/// Source of the build timestamp.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Source of the short revision appended to tags.
#[async_trait]
pub trait RevisionSource: Send + Sync {
    /// `None` when no revision is available.
    async fn short_revision(&self) -> Option<String>;
}

/// Reads `git rev-parse --short HEAD`.
#[derive(Debug, Clone, Default)]
pub struct GitRevision {
    dir: Option<PathBuf>,
}

impl GitRevision {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl RevisionSource for GitRevision {
    async fn short_revision(&self) -> Option<String> {
        let mut command = Command::new("git");
        command
            .args(["rev-parse", "--short", "HEAD"])
            .stdin(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }

        let output = command.output().await.ok()?;
        if !output.status.success() {
            return None;
        }

        let revision = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!revision.is_empty()).then_some(revision)
    }
}

/// A fixed revision, or none at all.
#[derive(Debug, Clone, Default)]
pub struct FixedRevision(pub Option<String>);

#[async_trait]
impl RevisionSource for FixedRevision {
    async fn short_revision(&self) -> Option<String> {
        self.0.clone().filter(|revision| !revision.is_empty())
    }
}

/// Builds `<timestamp>[-<revision>]` tags.
pub struct TagGenerator {
    clock: Box<dyn Clock>,
    revision: Box<dyn RevisionSource>,
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new(SystemClock, GitRevision::default())
    }
}

impl TagGenerator {
    pub fn new(clock: impl Clock + 'static, revision: impl RevisionSource + 'static) -> Self {
        Self {
            clock: Box::new(clock),
            revision: Box::new(revision),
        }
    }

    /// System clock plus git, reading the revision from `revision_dir` when set.
    pub fn from_config(config: &Config) -> Self {
        let dir = config.text(keys::REVISION_DIR).map(PathBuf::from);
        Self::new(SystemClock, GitRevision::new(dir))
    }

    /// Format the current time with `format` and append the short revision.
    ///
    /// The revision segment is omitted when no revision is available.
    ///
    /// # Errors
    ///
    /// Returns [`TagError::InvalidFormat`] if `format` is not a valid
    /// strftime pattern for a local timestamp.
    pub async fn create_tag(&self, format: &str) -> Result<String, TagError> {
        let mut tag = String::new();
        write!(
            tag,
            "{}",
            self.clock.now().format_with_items(StrftimeItems::new(format))
        )
        .map_err(|_| TagError::InvalidFormat(format.to_string()))?;

        if let Some(revision) = self.revision.short_revision().await {
            tag.push('-');
            tag.push_str(&revision);
        }
        Ok(tag)
    }

    /// [`create_tag`](Self::create_tag) with the built-in timestamp pattern.
    pub async fn create_default_tag(&self) -> Result<String, TagError> {
        self.create_tag(defaults::TAG_FORMAT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at_2024_01_31() -> FixedClock {
        FixedClock(
            NaiveDate::from_ymd_opt(2024, 1, 31)
                .unwrap()
                .and_hms_opt(0, 17, 0)
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_create_tag_with_revision() {
        let tags = TagGenerator::new(at_2024_01_31(), FixedRevision(Some("abc123".to_string())));
        assert_eq!(
            tags.create_tag("%Y%m%d%H%M%S").await.unwrap(),
            "20240131001700-abc123"
        );
    }

    #[tokio::test]
    async fn test_create_tag_without_revision() {
        let tags = TagGenerator::new(at_2024_01_31(), FixedRevision(None));
        assert_eq!(tags.create_tag("%Y%m%d%H%M%S").await.unwrap(), "20240131001700");

        let tags = TagGenerator::new(at_2024_01_31(), FixedRevision(Some(String::new())));
        assert_eq!(tags.create_tag("%Y%m%d%H%M%S").await.unwrap(), "20240131001700");
    }

    #[tokio::test]
    async fn test_create_tag_literal_format() {
        let tags = TagGenerator::new(at_2024_01_31(), FixedRevision(None));
        assert_eq!(tags.create_tag("test_success").await.unwrap(), "test_success");
        assert_eq!(tags.create_default_tag().await.unwrap(), "20240131001700");
    }

    #[tokio::test]
    async fn test_create_tag_rejects_invalid_format() {
        let tags = TagGenerator::new(at_2024_01_31(), FixedRevision(None));
        assert!(matches!(
            tags.create_tag("%Y%Q").await,
            Err(TagError::InvalidFormat(_))
        ));
        // A naive timestamp has no offset to print
        assert!(tags.create_tag("%Y%z").await.is_err());
    }

    #[tokio::test]
    async fn test_git_revision_outside_repository() {
        let dir = tempfile::TempDir::new().unwrap();
        let revision = GitRevision::new(Some(dir.path().to_path_buf()));
        assert_eq!(revision.short_revision().await, None);
    }

    #[tokio::test]
    async fn test_git_revision_inside_repository() {
        if which::which("git").is_err() {
            eprintln!("Skipping: git not installed");
            return;
        }

        let dir = tempfile::TempDir::new().unwrap();
        let git = |args: &[&str]| {
            std::process::Command::new("git")
                .args(["-c", "user.name=dockhand", "-c", "user.email=dockhand@localhost"])
                .args(args)
                .current_dir(dir.path())
                .output()
                .unwrap()
        };
        git(&["init", "--quiet"]);
        git(&["commit", "--quiet", "--allow-empty", "-m", "initial"]);
        let expected = String::from_utf8(git(&["rev-parse", "--short", "HEAD"]).stdout).unwrap();

        let tags = TagGenerator::new(
            at_2024_01_31(),
            GitRevision::new(Some(dir.path().to_path_buf())),
        );
        assert_eq!(
            tags.create_tag("%Y%m%d").await.unwrap(),
            format!("20240131-{}", expected.trim())
        );
    }
}
