//! Backup candidate parsing
//!
//! Backups land under one directory per site, named
//! `<reserved>_<taskId>_<domain_with_underscores>`. That layout predates
//! this server, so the parsing rule is fixed: the first segment is
//! reserved, the second is the domain's ledger task id, and the remaining
//! segments joined with `.` are the domain name.

use std::path::{Path, PathBuf};

/// Structured identifier decoded from a site directory name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRef {
    /// Ledger task id of the domain this backup belongs to
    pub task_id: String,

    /// Domain name, underscores restored to dots
    pub domain: String,
}

impl SiteRef {
    /// Parse a site directory name. Needs at least three `_` segments.
    pub fn parse(dir_name: &str) -> Option<Self> {
        let mut segments = dir_name.split('_');
        let _reserved = segments.next()?;
        let task_id = segments.next()?;
        let rest: Vec<&str> = segments.collect();
        if task_id.is_empty() || rest.is_empty() || rest.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self {
            task_id: task_id.to_string(),
            domain: rest.join("."),
        })
    }
}

/// A file the watcher has matched as a backup archive
#[derive(Debug, Clone)]
pub struct BackupCandidate {
    /// Full path of the archive
    pub path: PathBuf,

    /// Identity decoded from the parent directory name
    pub site: SiteRef,
}

impl BackupCandidate {
    /// Build a candidate from a created file path, if its parent directory
    /// name carries valid site metadata.
    pub fn from_path(path: &Path) -> Option<Self> {
        let dir_name = path.parent()?.file_name()?.to_str()?;
        let site = SiteRef::parse(dir_name)?;
        Some(Self {
            path: path.to_path_buf(),
            site,
        })
    }

    /// File name of the archive
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("backup")
    }
}

/// Does this file name end in one of the recognized backup extensions?
pub(crate) fn has_backup_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|allowed| allowed == ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_site_ref() {
        let site = SiteRef::parse("backup_task123_example_com").unwrap();
        assert_eq!(site.task_id, "task123");
        assert_eq!(site.domain, "example.com");
    }

    #[test]
    fn test_parse_multi_segment_domain() {
        let site = SiteRef::parse("x_abc_shop_example_co_uk").unwrap();
        assert_eq!(site.task_id, "abc");
        assert_eq!(site.domain, "shop.example.co.uk");
    }

    #[test]
    fn test_parse_rejects_too_few_segments() {
        assert!(SiteRef::parse("task123_example").is_none());
        assert!(SiteRef::parse("justonename").is_none());
        assert!(SiteRef::parse("").is_none());
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(SiteRef::parse("x__example_com").is_none());
        assert!(SiteRef::parse("x_abc__com").is_none());
    }

    #[test]
    fn test_candidate_from_path() {
        let candidate =
            BackupCandidate::from_path(Path::new("/backups/b_t99_example_com/site.zip")).unwrap();
        assert_eq!(candidate.site.task_id, "t99");
        assert_eq!(candidate.site.domain, "example.com");
        assert_eq!(candidate.file_name(), "site.zip");
    }

    #[test]
    fn test_candidate_rejects_malformed_parent() {
        assert!(BackupCandidate::from_path(Path::new("/backups/loose/site.zip")).is_none());
    }

    #[test]
    fn test_backup_extension_match() {
        let exts = vec!["zip".to_string(), "daf".to_string()];
        assert!(has_backup_extension(Path::new("a/site.zip"), &exts));
        assert!(has_backup_extension(Path::new("a/db.daf"), &exts));
        assert!(!has_backup_extension(Path::new("a/site.tar.gz"), &exts));
        assert!(!has_backup_extension(Path::new("a/noext"), &exts));
    }
}
