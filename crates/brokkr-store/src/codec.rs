//! Binary record codec
//!
//! Every persisted record is a postcard-encoded envelope: a format version,
//! a per-run type table (type name → integer tag), the tag of the root
//! object, and the payload bytes. The table lets heterogeneous record trees
//! name their types explicitly instead of relying on any global schema; a
//! reader that finds an unknown version or an unexpected root type treats
//! the record as absent, never as a hard failure.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use brokkr_core::Result;

/// Bumped whenever the envelope or any record layout changes shape
pub const FORMAT_VERSION: u32 = 2;

/// A type that can be persisted as a store record
pub trait StoreRecord: Serialize + DeserializeOwned {
    /// Stable type name written into the record envelope
    const TYPE_NAME: &'static str;
}

/// Maps type names to the integer tags used inside one encoded record
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TypeTable {
    names: Vec<String>,
}

impl TypeTable {
    /// Tag for a type name, assigning the next free tag on first use
    pub fn tag_for(&mut self, name: &str) -> u32 {
        if let Some(pos) = self.names.iter().position(|n| n == name) {
            return pos as u32;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as u32
    }

    /// Type name for a tag, if the table knows it
    pub fn name_for(&self, tag: u32) -> Option<&str> {
        self.names.get(tag as usize).map(|n| n.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    type_table: TypeTable,
    root_tag: u32,
    payload: Vec<u8>,
}

/// Encode a record into envelope bytes
pub fn encode<T: StoreRecord>(value: &T) -> Result<Vec<u8>> {
    let payload = postcard::to_stdvec(value)
        .map_err(|e| brokkr_core::Error::cache_corruption(format!("encode: {e}")))?;
    let mut type_table = TypeTable::default();
    let root_tag = type_table.tag_for(T::TYPE_NAME);
    let envelope = Envelope {
        format_version: FORMAT_VERSION,
        type_table,
        root_tag,
        payload,
    };
    postcard::to_stdvec(&envelope)
        .map_err(|e| brokkr_core::Error::cache_corruption(format!("encode: {e}")))
}

/// Decode envelope bytes back into a record.
///
/// Returns `None` on any mismatch or corruption; the owning component must
/// treat that as a cache miss and rebuild the record.
pub fn decode<T: StoreRecord>(bytes: &[u8]) -> Option<T> {
    let envelope: Envelope = match postcard::from_bytes(bytes) {
        Ok(env) => env,
        Err(e) => {
            debug!("Discarding undecodable record envelope: {}", e);
            return None;
        }
    };
    if envelope.format_version != FORMAT_VERSION {
        debug!(
            "Discarding record with format version {} (current {})",
            envelope.format_version, FORMAT_VERSION
        );
        return None;
    }
    match envelope.type_table.name_for(envelope.root_tag) {
        Some(name) if name == T::TYPE_NAME => {}
        other => {
            debug!(
                "Discarding record typed {:?}, expected {}",
                other,
                T::TYPE_NAME
            );
            return None;
        }
    }
    match postcard::from_bytes(&envelope.payload) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Discarding corrupt {} record: {}", T::TYPE_NAME, e);
            None
        }
    }
}
