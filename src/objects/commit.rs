//! Commit object implementation.

use super::oid::Oid;
use super::store::{ObjectType, RawObject};
use crate::error::{Error, Result};

/// A signature representing an author or committer.
///
/// Contains the name, email, timestamp, and timezone offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// The name of the person.
    name: String,
    /// The email address.
    email: String,
    /// Unix timestamp (seconds since epoch).
    timestamp: i64,
    /// Timezone offset in minutes (e.g., +0200 = 120).
    tz_offset: i32,
}

impl Signature {
    /// Creates a new Signature.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the person.
    /// * `email` - The email address.
    /// * `timestamp` - Unix timestamp (seconds since epoch).
    /// * `tz_offset` - Timezone offset in minutes.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        timestamp: i64,
        tz_offset: i32,
    ) -> Self {
        Signature {
            name: name.into(),
            email: email.into(),
            timestamp,
            tz_offset,
        }
    }

    /// Returns the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the email address.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the Unix timestamp.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Returns the timezone offset in minutes.
    pub fn tz_offset(&self) -> i32 {
        self.tz_offset
    }

    /// Parses a signature from a commit header line.
    ///
    /// Format: `Name <email> timestamp timezone`
    /// Example: `Spaghetti User <noreply@grep.ro> 1234567890 +0200`
    fn parse(s: &str) -> Result<Self> {
        let email_start = s.find('<').ok_or(Error::InvalidUtf8)?;
        let email_end = s.find('>').ok_or(Error::InvalidUtf8)?;

        if email_start >= email_end {
            return Err(Error::InvalidUtf8);
        }

        let name = s[..email_start].trim().to_string();
        let email = s[email_start + 1..email_end].to_string();

        let after_email = s[email_end + 1..].trim();
        let mut parts = after_email.split_whitespace();

        let timestamp: i64 = parts
            .next()
            .ok_or(Error::InvalidUtf8)?
            .parse()
            .map_err(|_| Error::InvalidUtf8)?;

        let tz_str = parts.next().ok_or(Error::InvalidUtf8)?;
        let tz_offset = parse_timezone(tz_str)?;

        Ok(Signature {
            name,
            email,
            timestamp,
            tz_offset,
        })
    }

    /// Formats the signature as a commit header value.
    pub fn serialize(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.timestamp,
            format_timezone(self.tz_offset)
        )
    }
}

/// Parses a timezone string like "+0200" or "-0500" into minutes offset.
fn parse_timezone(s: &str) -> Result<i32> {
    if s.len() != 5 {
        return Err(Error::InvalidUtf8);
    }

    let sign = match s.chars().next() {
        Some('+') => 1,
        Some('-') => -1,
        _ => return Err(Error::InvalidUtf8),
    };

    let hours: i32 = s[1..3].parse().map_err(|_| Error::InvalidUtf8)?;
    let minutes: i32 = s[3..5].parse().map_err(|_| Error::InvalidUtf8)?;

    Ok(sign * (hours * 60 + minutes))
}

/// Formats a minutes offset as "+HHMM" / "-HHMM".
fn format_timezone(offset: i32) -> String {
    let sign = if offset < 0 { '-' } else { '+' };
    let abs = offset.abs();
    format!("{}{:02}{:02}", sign, abs / 60, abs % 60)
}

/// A commit object.
///
/// Contains a snapshot of the filesystem (the root tree), parent commits,
/// author, committer, and message.
#[derive(Debug, Clone)]
pub struct Commit {
    /// The OID (SHA-1 hash) of this commit.
    oid: Oid,
    /// The tree object this commit points to.
    tree: Oid,
    /// Parent commit(s). Empty for root commits.
    parents: Vec<Oid>,
    /// The author of the changes.
    author: Signature,
    /// The person who created this commit.
    committer: Signature,
    /// The commit message.
    message: String,
}

impl Commit {
    /// Parses a Commit from a RawObject with its OID.
    ///
    /// Commit format:
    /// ```text
    /// tree <sha1>
    /// parent <sha1>  (zero or more)
    /// author <signature>
    /// committer <signature>
    ///
    /// <message>
    /// ```
    ///
    /// Unknown headers (`encoding`, `gpgsig`) are skipped.
    ///
    /// # Arguments
    ///
    /// * `oid` - The OID (SHA-1 hash) of this commit.
    /// * `raw` - The raw object data.
    pub fn parse(oid: Oid, raw: RawObject) -> Result<Self> {
        if raw.object_type != ObjectType::Commit {
            return Err(Error::TypeMismatch {
                expected: "commit",
                actual: raw.object_type.as_str(),
            });
        }

        let content = std::str::from_utf8(&raw.content).map_err(|_| Error::InvalidUtf8)?;

        let mut tree: Option<Oid> = None;
        let mut parents = Vec::new();
        let mut author: Option<Signature> = None;
        let mut committer: Option<Signature> = None;
        let mut message = String::new();

        let mut in_message = false;

        for line in content.lines() {
            if in_message {
                if !message.is_empty() {
                    message.push('\n');
                }
                message.push_str(line);
                continue;
            }

            if line.is_empty() {
                in_message = true;
                continue;
            }

            if let Some(value) = line.strip_prefix("tree ") {
                tree = Some(Oid::from_hex(value)?);
            } else if let Some(value) = line.strip_prefix("parent ") {
                parents.push(Oid::from_hex(value)?);
            } else if let Some(value) = line.strip_prefix("author ") {
                author = Some(Signature::parse(value)?);
            } else if let Some(value) = line.strip_prefix("committer ") {
                committer = Some(Signature::parse(value)?);
            }
        }

        let tree = tree.ok_or_else(|| Error::InvalidObject {
            oid: oid.to_hex(),
            reason: "missing tree".to_string(),
        })?;

        let author = author.ok_or_else(|| Error::InvalidObject {
            oid: oid.to_hex(),
            reason: "missing author".to_string(),
        })?;

        let committer = committer.ok_or_else(|| Error::InvalidObject {
            oid: oid.to_hex(),
            reason: "missing committer".to_string(),
        })?;

        Ok(Commit {
            oid,
            tree,
            parents,
            author,
            committer,
            message,
        })
    }

    /// Formats commit content ready for the object store.
    ///
    /// Commits carry an `encoding UTF-8` header so that external git
    /// tooling renders messages correctly.
    ///
    /// # Arguments
    ///
    /// * `tree` - The OID of the root tree.
    /// * `parents` - Parent commit OIDs (empty for the initial commit).
    /// * `author` - The author signature (also used as committer).
    /// * `message` - The commit message.
    pub fn format(tree: &Oid, parents: &[Oid], author: &Signature, message: &str) -> Vec<u8> {
        let mut content = String::new();

        content.push_str(&format!("tree {}\n", tree.to_hex()));
        for parent in parents {
            content.push_str(&format!("parent {}\n", parent.to_hex()));
        }
        let sig = author.serialize();
        content.push_str(&format!("author {}\n", sig));
        content.push_str(&format!("committer {}\n", sig));
        content.push_str("encoding UTF-8\n");
        content.push('\n');
        content.push_str(message);
        if !message.ends_with('\n') {
            content.push('\n');
        }

        content.into_bytes()
    }

    /// Returns the OID (SHA-1 hash) of this commit.
    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    /// Returns the tree object ID.
    pub fn tree(&self) -> &Oid {
        &self.tree
    }

    /// Returns the parent commit IDs.
    pub fn parents(&self) -> &[Oid] {
        &self.parents
    }

    /// Returns the first parent, if any.
    pub fn parent(&self) -> Option<&Oid> {
        self.parents.first()
    }

    /// Returns the author signature.
    pub fn author(&self) -> &Signature {
        &self.author
    }

    /// Returns the committer signature.
    pub fn committer(&self) -> &Signature {
        &self.committer
    }

    /// Returns the full commit message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the first line of the commit message (the summary).
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Returns true if this is a root commit (no parents).
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}
