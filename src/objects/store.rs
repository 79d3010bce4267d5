//! Loose object store implementation.

use std::path::{Path, PathBuf};

use super::oid::Oid;
use crate::error::{Error, Result};
use crate::infra::{compress, decompress, read_file, write_file_atomic, Sha1};

/// The type of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    /// A blob (file content, directory listing, feature manifest).
    Blob,
    /// A tree (named references to blobs and other trees).
    Tree,
    /// A commit.
    Commit,
}

impl ObjectType {
    /// Returns the type name as used in object headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
        }
    }

    /// Parses a type name from an object header.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blob" => Some(ObjectType::Blob),
            "tree" => Some(ObjectType::Tree),
            "commit" => Some(ObjectType::Commit),
            _ => None,
        }
    }
}

/// A raw object with its type and content.
#[derive(Debug, Clone)]
pub struct RawObject {
    /// The type of the object.
    pub object_type: ObjectType,
    /// The raw content of the object (without the header).
    pub content: Vec<u8>,
}

/// A store for reading and writing loose objects.
///
/// Loose objects are stored under `objects/` as individual zlib-compressed
/// files, with the path determined by the object's SHA-1 hash. Objects are
/// immutable and append-only: "deleting" data means publishing a new tree
/// that no longer references it.
#[derive(Debug)]
pub struct LooseObjectStore {
    /// Path to the objects directory.
    objects_dir: PathBuf,
}

impl LooseObjectStore {
    /// Creates a new LooseObjectStore for the given objects directory.
    pub fn new<P: AsRef<Path>>(objects_dir: P) -> Self {
        LooseObjectStore {
            objects_dir: objects_dir.as_ref().to_path_buf(),
        }
    }

    /// Converts an Oid to the path of its loose object file.
    ///
    /// For example, `da39a3ee5e6b4b0d3255bfef95601890afd80709` becomes
    /// `objects/da/39a3ee5e6b4b0d3255bfef95601890afd80709`.
    pub fn oid_to_path(&self, oid: &Oid) -> PathBuf {
        let hex = oid.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    /// Reads the raw compressed data for an object.
    fn read_raw(&self, oid: &Oid) -> Result<Vec<u8>> {
        let path = self.oid_to_path(oid);
        read_file(&path).map_err(|e| {
            if matches!(e, Error::PathNotFound(_)) {
                Error::ObjectNotFound(oid.to_hex())
            } else {
                e
            }
        })
    }

    /// Parses a raw decompressed object into its type and content.
    ///
    /// Objects have the format: `<type> <size>\0<content>`
    fn parse_raw_object(data: &[u8], oid: &Oid) -> Result<RawObject> {
        let null_pos = data
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::InvalidObject {
                oid: oid.to_hex(),
                reason: "missing null byte in header".to_string(),
            })?;

        let header = std::str::from_utf8(&data[..null_pos]).map_err(|_| Error::InvalidObject {
            oid: oid.to_hex(),
            reason: "invalid UTF-8 in header".to_string(),
        })?;

        let mut parts = header.split(' ');
        let type_str = parts.next().ok_or_else(|| Error::InvalidObject {
            oid: oid.to_hex(),
            reason: "missing object type".to_string(),
        })?;

        let size_str = parts.next().ok_or_else(|| Error::InvalidObject {
            oid: oid.to_hex(),
            reason: "missing object size".to_string(),
        })?;

        let object_type = ObjectType::parse(type_str).ok_or_else(|| Error::InvalidObject {
            oid: oid.to_hex(),
            reason: format!("unknown object type: {}", type_str),
        })?;

        let size: usize = size_str.parse().map_err(|_| Error::InvalidObject {
            oid: oid.to_hex(),
            reason: format!("invalid size: {}", size_str),
        })?;

        let content = &data[null_pos + 1..];
        if content.len() != size {
            return Err(Error::InvalidObject {
                oid: oid.to_hex(),
                reason: format!(
                    "size mismatch: header says {} but content is {} bytes",
                    size,
                    content.len()
                ),
            });
        }

        Ok(RawObject {
            object_type,
            content: content.to_vec(),
        })
    }

    /// Reads and parses an object by its Oid.
    ///
    /// # Arguments
    ///
    /// * `oid` - The object ID to read.
    ///
    /// # Returns
    ///
    /// The parsed object on success, or an error if the object cannot be read
    /// or is invalid.
    pub fn read(&self, oid: &Oid) -> Result<RawObject> {
        let compressed = self.read_raw(oid)?;
        let decompressed = decompress(&compressed)?;
        Self::parse_raw_object(&decompressed, oid)
    }

    /// Checks if an object exists in the store.
    pub fn exists(&self, oid: &Oid) -> bool {
        self.oid_to_path(oid).exists()
    }

    /// Writes an object to the store.
    ///
    /// The content is framed as `<type> <size>\0<content>`, hashed with
    /// SHA-1 to determine its Oid, zlib-compressed and stored under the
    /// hash-derived path. Writing an object that already exists is a no-op
    /// that returns the same Oid.
    ///
    /// # Arguments
    ///
    /// * `object_type` - The type of object (blob, tree, commit).
    /// * `content` - The content of the object.
    ///
    /// # Returns
    ///
    /// The Oid of the written object.
    pub fn write(&self, object_type: ObjectType, content: &[u8]) -> Result<Oid> {
        let header = format!("{} {}\0", object_type.as_str(), content.len());

        let mut hasher = Sha1::new();
        hasher.update(header.as_bytes());
        hasher.update(content);
        let oid = Oid::from_bytes(hasher.finalize());

        // Content-addressed writes are idempotent
        let path = self.oid_to_path(&oid);
        if path.exists() {
            return Ok(oid);
        }

        let mut raw = header.into_bytes();
        raw.extend_from_slice(content);
        let compressed = compress(&raw);

        write_file_atomic(&path, &compressed)?;

        Ok(oid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::hash_object;
    use miniz_oxide::deflate::compress_to_vec_zlib;
    use std::fs;
    use tempfile::TempDir;

    /// Helper to create a loose object file without going through write()
    fn create_loose_object(objects_dir: &Path, content: &[u8], object_type: &str) -> Oid {
        let header = format!("{} {}\0", object_type, content.len());
        let mut raw = header.into_bytes();
        raw.extend_from_slice(content);

        let oid = Oid::from_bytes(hash_object(object_type, content));
        let compressed = compress_to_vec_zlib(&raw, 6);

        let hex = oid.to_hex();
        let object_path = objects_dir.join(&hex[..2]).join(&hex[2..]);
        fs::create_dir_all(object_path.parent().unwrap()).unwrap();
        fs::write(&object_path, &compressed).unwrap();

        oid
    }

    fn scratch_store() -> (TempDir, LooseObjectStore) {
        let temp_dir = TempDir::new().unwrap();
        let objects_dir = temp_dir.path().join("objects");
        fs::create_dir(&objects_dir).unwrap();
        let store = LooseObjectStore::new(&objects_dir);
        (temp_dir, store)
    }

    // S-001: oid_to_path generates fan-out path
    #[test]
    fn test_oid_to_path() {
        let store = LooseObjectStore::new("/repo/objects");
        let oid = Oid::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        let path = store.oid_to_path(&oid);

        assert!(path.to_string_lossy().contains("da"));
        assert!(path
            .to_string_lossy()
            .contains("39a3ee5e6b4b0d3255bfef95601890afd80709"));
    }

    // S-002: read() returns object content
    #[test]
    fn test_read_blob() {
        let (temp_dir, store) = scratch_store();
        let objects_dir = temp_dir.path().join("objects");

        let content = b"Hello, World!";
        let oid = create_loose_object(&objects_dir, content, "blob");

        let obj = store.read(&oid).unwrap();
        assert_eq!(obj.object_type, ObjectType::Blob);
        assert_eq!(obj.content, content);
    }

    // S-003: read() returns ObjectNotFound for missing objects
    #[test]
    fn test_read_not_found() {
        let (_temp_dir, store) = scratch_store();
        let oid = Oid::from_hex("0000000000000000000000000000000000000000").unwrap();

        let result = store.read(&oid);
        assert!(matches!(result, Err(Error::ObjectNotFound(_))));
    }

    // S-004: exists() returns correct values
    #[test]
    fn test_exists() {
        let (temp_dir, store) = scratch_store();
        let objects_dir = temp_dir.path().join("objects");

        let oid = create_loose_object(&objects_dir, b"test", "blob");
        assert!(store.exists(&oid));

        let missing = Oid::from_hex("0000000000000000000000000000000000000000").unwrap();
        assert!(!store.exists(&missing));
    }

    // S-005: write() then read() roundtrip
    #[test]
    fn test_write_roundtrip() {
        let (_temp_dir, store) = scratch_store();

        let content = b"Hello, World!";
        let oid = store.write(ObjectType::Blob, content).unwrap();

        assert!(store.exists(&oid));
        let obj = store.read(&oid).unwrap();
        assert_eq!(obj.object_type, ObjectType::Blob);
        assert_eq!(obj.content, content);
    }

    // S-006: write() is idempotent
    #[test]
    fn test_write_idempotent() {
        let (_temp_dir, store) = scratch_store();

        let oid1 = store.write(ObjectType::Blob, b"Test content").unwrap();
        let oid2 = store.write(ObjectType::Blob, b"Test content").unwrap();

        assert_eq!(oid1, oid2);
        assert_eq!(store.read(&oid1).unwrap().content, b"Test content");
    }

    // S-007: write() produces the hashes git would
    #[test]
    fn test_write_correct_hash() {
        let (_temp_dir, store) = scratch_store();

        let oid = store.write(ObjectType::Blob, b"").unwrap();
        assert_eq!(oid.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");

        let oid = store.write(ObjectType::Blob, b"hello\n").unwrap();
        assert_eq!(oid.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    // S-008: write() handles commit and tree types
    #[test]
    fn test_write_different_types() {
        let (_temp_dir, store) = scratch_store();

        let tree_oid = store.write(ObjectType::Tree, b"").unwrap();
        assert_eq!(store.read(&tree_oid).unwrap().object_type, ObjectType::Tree);
        // The well-known empty tree hash
        assert_eq!(tree_oid.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");

        let commit_oid = store.write(ObjectType::Commit, b"commit content").unwrap();
        assert_eq!(
            store.read(&commit_oid).unwrap().object_type,
            ObjectType::Commit
        );
    }

    // S-009: write() survives large content
    #[test]
    fn test_write_large_content() {
        let (_temp_dir, store) = scratch_store();

        let content: Vec<u8> = (0..1024 * 1024).map(|i| (i % 256) as u8).collect();
        let oid = store.write(ObjectType::Blob, &content).unwrap();

        let obj = store.read(&oid).unwrap();
        assert_eq!(obj.content, content);
    }

    // S-010: parse_raw_object handles malformed data
    #[test]
    fn test_parse_malformed() {
        let oid = Oid::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();

        // Missing null byte
        let result = LooseObjectStore::parse_raw_object(b"blob 5", &oid);
        assert!(matches!(result, Err(Error::InvalidObject { .. })));

        // Invalid type
        let result = LooseObjectStore::parse_raw_object(b"invalid 5\0hello", &oid);
        assert!(matches!(result, Err(Error::InvalidObject { .. })));

        // Size mismatch
        let result = LooseObjectStore::parse_raw_object(b"blob 10\0hello", &oid);
        assert!(matches!(result, Err(Error::InvalidObject { .. })));
    }
}
