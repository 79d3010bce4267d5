//! The feature manifest: a JSON blob recording storage format flags.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::staged::StagedBlob;

/// Feature key: the next inode number to allocate.
pub const NEXT_INODE_NUMBER: &str = "next_inode_number";
/// Feature key: how an inode stores its data blocks.
pub const INODE_FORMAT: &str = "inode_format";
/// Feature key: how the inode table is laid out.
pub const INODE_INDEX_FORMAT: &str = "inode_index_format";
/// The only block / index layout this implementation understands.
pub const FORMAT_TREETREE: &str = "treetree";

/// A view over the `features` blob at the top of the commit tree.
///
/// Readers must reject a repository whose required keys are absent or hold
/// values they do not understand; migrations key off these flags.
pub struct FeatureManifest {
    blob: StagedBlob,
}

impl FeatureManifest {
    /// Wraps the given staged blob.
    pub fn new(blob: StagedBlob) -> Self {
        FeatureManifest { blob }
    }

    /// Parses the manifest into a JSON object map.
    pub fn load(&self) -> Result<Map<String, Value>> {
        let data = self.blob.data()?;
        let value: Value = serde_json::from_slice(&data)
            .map_err(|e| Error::InvalidFormat(format!("feature manifest: {}", e)))?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(Error::InvalidFormat(
                "feature manifest is not a JSON object".to_string(),
            )),
        }
    }

    /// Serializes and stores the manifest.
    pub fn save(&self, map: &Map<String, Value>) -> Result<()> {
        let data = serde_json::to_vec(map)
            .map_err(|e| Error::InvalidFormat(format!("feature manifest: {}", e)))?;
        self.blob.set_data(data);
        Ok(())
    }

    /// Returns the value of a feature key, or `None` if absent.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.load()?.get(key).cloned())
    }

    /// Returns a string-valued feature, or `None` if absent.
    ///
    /// Fails with `InvalidFormat` if the key holds a non-string.
    pub fn get_str(&self, key: &str) -> Result<Option<String>> {
        match self.get(key)? {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(Error::InvalidFormat(format!(
                "feature {} is not a string: {}",
                key, other
            ))),
        }
    }

    /// Returns an integer-valued feature, or `None` if absent.
    ///
    /// Fails with `InvalidFormat` if the key holds a non-integer.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key)? {
            None => Ok(None),
            Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
                Error::InvalidFormat(format!("feature {} is not an unsigned integer", key))
            }),
            Some(other) => Err(Error::InvalidFormat(format!(
                "feature {} is not a number: {}",
                key, other
            ))),
        }
    }

    /// Sets a feature key to the given value.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut map = self.load()?;
        map.insert(key.to_string(), value);
        self.save(&map)
    }
}
