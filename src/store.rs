use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use regex::Regex;

/// The outcome of looking a sender up against a recipient's allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDecision {
    Allow,
    Swallow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Allow,
    Swallow,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Allow => "ALLOW",
            Method::Swallow => "SWALLOW",
        }
    }

    fn to_decision(self) -> ListDecision {
        match self {
            Method::Allow => ListDecision::Allow,
            Method::Swallow => ListDecision::Swallow,
        }
    }
}

/// One `(pattern, method)` line of a recipient's allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub pattern: String,
    pub method: Method,
}

/// The per-recipient on-disk allow-list store.
///
/// Each recipient's list lives at `<config_dir>/<recipient>`, one entry per
/// line as `pattern[\tmethod]`. Reads are plain reads; mutations use
/// `O_APPEND` for single-line adds and write-temp+rename for rewrites, so a
/// failed mutation never leaves a half-written file on disk.
pub struct AllowListStore {
    config_dir: PathBuf,
}

impl AllowListStore {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        AllowListStore {
            config_dir: config_dir.into(),
        }
    }

    fn path_for(&self, recipient: &str) -> PathBuf {
        self.config_dir.join(recipient)
    }

    /// Reads the recipient's list file, creating an empty one on first
    /// touch if it doesn't exist yet.
    fn read_entries(&self, recipient: &str) -> std::io::Result<Vec<Entry>> {
        let path = self.path_for(recipient);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.create_empty(&path)?;
                String::new()
            }
            Err(err) => return Err(err),
        };
        Ok(parse_entries(&text))
    }

    fn create_empty(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode_restricted()
            .open(path)?;
        drop(file);
        Ok(())
    }

    /// Returns the method of the first entry whose pattern is a (regex
    /// escaped, anchored) prefix of any of `candidates`, in file order. No
    /// match means `Deny`.
    fn resolve(&self, recipient: &str, candidates: &[&str]) -> std::io::Result<ListDecision> {
        let entries = self.read_entries(recipient)?;
        for entry in &entries {
            let Ok(re) = Regex::new(&format!("^{}", regex::escape(&entry.pattern))) else {
                continue;
            };
            if candidates.iter().any(|c| re.is_match(c)) {
                return Ok(entry.method.to_decision());
            }
        }
        Ok(ListDecision::Deny)
    }

    /// Looks up `sender_addr`/`sender_domain` against `recipient`'s list.
    pub fn query(
        &self,
        recipient: &str,
        sender_addr: &str,
        sender_domain: &str,
    ) -> std::io::Result<ListDecision> {
        self.resolve(recipient, &[sender_addr, sender_domain])
    }

    /// Appends `pattern\tmethod\n` unless `pattern` already resolves to a
    /// non-`Deny` decision under the same prefix semantics as `query`.
    pub fn add(&self, recipient: &str, pattern: &str, method: Method) -> std::io::Result<()> {
        if self.resolve(recipient, &[pattern])? != ListDecision::Deny {
            return Ok(());
        }
        let path = self.path_for(recipient);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .mode_restricted()
            .open(&path)?;
        writeln!(file, "{}\t{}", pattern, method.as_str())
    }

    /// Rewrites the list with every line whose pattern begins with
    /// `pattern` removed, but only if `pattern` currently resolves to
    /// non-`Deny`.
    pub fn remove(&self, recipient: &str, pattern: &str) -> std::io::Result<()> {
        if self.resolve(recipient, &[pattern])? == ListDecision::Deny {
            return Ok(());
        }
        let entries = self.read_entries(recipient)?;
        let remaining: Vec<Entry> = entries
            .into_iter()
            .filter(|entry| !entry.pattern.starts_with(pattern))
            .collect();
        self.rewrite(recipient, &remaining)
    }

    /// Returns the recipient's list in file order.
    pub fn dump(&self, recipient: &str) -> std::io::Result<Vec<Entry>> {
        self.read_entries(recipient)
    }

    fn rewrite(&self, recipient: &str, entries: &[Entry]) -> std::io::Result<()> {
        let path = self.path_for(recipient);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        {
            let mut tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode_restricted()
                .open(&tmp_path)?;
            for entry in entries {
                writeln!(tmp, "{}\t{}", entry.pattern, entry.method.as_str())?;
            }
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &path)
    }
}

fn parse_entries(text: &str) -> Vec<Entry> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let mut parts = line.splitn(2, '\t');
            let pattern = parts.next()?.to_string();
            let method = match parts.next().map(str::trim) {
                Some("SWALLOW") => Method::Swallow,
                _ => Method::Allow,
            };
            Some(Entry { pattern, method })
        })
        .collect()
}

/// Restrictive file permissions (0640) for files created on first touch, per
/// the ownership/permission model in the shared-resources design.
trait OpenOptionsExt {
    fn mode_restricted(&mut self) -> &mut Self;
}

impl OpenOptionsExt for OpenOptions {
    #[cfg(unix)]
    fn mode_restricted(&mut self) -> &mut Self {
        use std::os::unix::fs::OpenOptionsExt;
        self.mode(0o640)
    }

    #[cfg(not(unix))]
    fn mode_restricted(&mut self) -> &mut Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn first_query_creates_empty_list_and_returns_deny() {
        let dir = tempdir().unwrap();
        let store = AllowListStore::new(dir.path());
        let decision = store.query("hitchhike@dent.tld", "marvin@sirius.tld", "sirius.tld").unwrap();
        assert_eq!(decision, ListDecision::Deny);
        assert!(dir.path().join("hitchhike@dent.tld").exists());
    }

    #[test]
    fn add_is_idempotent_on_existing_pattern() {
        let dir = tempdir().unwrap();
        let store = AllowListStore::new(dir.path());
        store.add("r", "sirius.tld", Method::Allow).unwrap();
        store.add("r", "sirius.tld", Method::Swallow).unwrap();
        let dump = store.dump("r").unwrap();
        assert_eq!(dump, vec![Entry { pattern: "sirius.tld".into(), method: Method::Allow }]);
    }

    #[test]
    fn deny_then_add_changes_method() {
        let dir = tempdir().unwrap();
        let store = AllowListStore::new(dir.path());
        store.add("r", "sirius.tld", Method::Allow).unwrap();
        store.remove("r", "sirius.tld").unwrap();
        store.add("r", "sirius.tld", Method::Swallow).unwrap();
        let decision = store.query("r", "x@sirius.tld", "sirius.tld").unwrap();
        assert_eq!(decision, ListDecision::Swallow);
    }

    #[test]
    fn bare_domain_is_a_wildcard_for_its_addresses() {
        let dir = tempdir().unwrap();
        let store = AllowListStore::new(dir.path());
        store.add("r", "sirius.tld", Method::Allow).unwrap();
        assert_eq!(
            store.query("r", "x@sirius.tld", "sirius.tld").unwrap(),
            ListDecision::Allow
        );
        assert_eq!(
            store.query("r", "y@other.tld", "other.tld").unwrap(),
            ListDecision::Deny
        );
    }

    #[test]
    fn prefix_match_is_liberal_by_design() {
        let dir = tempdir().unwrap();
        let store = AllowListStore::new(dir.path());
        store.add("r", "sirius.tld", Method::Allow).unwrap();
        // sirius.tld is a textual prefix of sirius.tld.attacker.tld; this is
        // the documented, intentional liberal-match behavior.
        assert_eq!(
            store.query("r", "x@sirius.tld.attacker.tld", "sirius.tld.attacker.tld").unwrap(),
            ListDecision::Allow
        );
    }

    #[test]
    fn full_address_entry_does_not_match_other_addresses_at_same_domain() {
        let dir = tempdir().unwrap();
        let store = AllowListStore::new(dir.path());
        store.add("r", "zaphod@heart.tld", Method::Swallow).unwrap();
        assert_eq!(
            store.query("r", "zaphod@heart.tld", "heart.tld").unwrap(),
            ListDecision::Swallow
        );
        assert_eq!(
            store.query("r", "ford@heart.tld", "heart.tld").unwrap(),
            ListDecision::Deny
        );
    }

    #[test]
    fn remove_is_a_no_op_when_pattern_already_absent() {
        let dir = tempdir().unwrap();
        let store = AllowListStore::new(dir.path());
        store.remove("r", "sirius.tld").unwrap();
        assert_eq!(store.dump("r").unwrap(), vec![]);
    }

    #[test]
    fn remove_drops_every_line_the_pattern_is_a_prefix_of() {
        let dir = tempdir().unwrap();
        let store = AllowListStore::new(dir.path());
        // Order matters here: adding the narrower pattern first keeps the
        // broader one from being treated as a no-op add.
        store.add("r", "sirius.tld.sub", Method::Allow).unwrap();
        store.add("r", "sirius.tld", Method::Allow).unwrap();
        store.remove("r", "sirius.tld").unwrap();
        assert_eq!(store.dump("r").unwrap(), vec![]);
    }
}
