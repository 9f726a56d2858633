//! Static list of domain names, loaded once at startup.
//!
//! Used for the CAA SERVFAIL exception list: some domains' authoritative
//! infrastructure answers SERVFAIL on the absence of a CAA record instead
//! of an empty answer, and the CA must not be blocked by third-party
//! misconfiguration it cannot fix.

use std::collections::HashSet;
use std::path::Path;
use vantage_core::{Result, VaError};

/// Case-insensitive set of domain names
#[derive(Debug, Clone, Default)]
pub struct HostList {
    names: HashSet<String>,
}

impl HostList {
    /// Load a host list from a file: one name per line, `#` starts a
    /// comment, blank lines are skipped. A malformed list is a fatal
    /// configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VaError::Config(format!("failed to read host list {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Parse host-list content.
    pub fn parse(content: &str) -> Result<Self> {
        let mut names = HashSet::new();
        for (idx, raw) in content.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line.chars().any(char::is_whitespace) {
                return Err(VaError::Config(format!(
                    "host list line {}: {line:?} is not a domain name",
                    idx + 1
                )));
            }
            names.insert(normalize(line));
        }
        Ok(Self { names })
    }

    /// Exact-name membership, case-insensitive, trailing dot ignored
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&normalize(name))
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when the list has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let list = HostList::parse(
            "# exception list\n\
             servfail.example.com\n\
             \n\
             other.example.net  # known-broken authority\n",
        )
        .unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains("servfail.example.com"));
        assert!(list.contains("other.example.net"));
        assert!(!list.contains("example.com"));
    }

    #[test]
    fn test_membership_ignores_case_and_trailing_dot() {
        let list = HostList::parse("ServFail.Example.COM\n").unwrap();
        assert!(list.contains("servfail.example.com."));
        assert!(list.contains("SERVFAIL.EXAMPLE.COM"));
    }

    #[test]
    fn test_embedded_whitespace_is_fatal() {
        let err = HostList::parse("one.example two.example\n").unwrap_err();
        assert!(matches!(err, VaError::Config(_)));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = HostList::load(Path::new("/nonexistent/exceptions.txt")).unwrap_err();
        assert!(matches!(err, VaError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(tmpfile, "servfail.example.com\n").unwrap();
        let list = HostList::load(tmpfile.path()).unwrap();
        assert!(list.contains("servfail.example.com"));
    }
}
