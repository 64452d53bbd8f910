//! Entity codec boundary
//!
//! The store never looks inside an entity. A codec turns entity text into an
//! entity, entities into archive bytes and back, and entities into structural
//! keys. Archive records are framed as `[u32 name_len][name][payload]` so a
//! row's name can be recovered without the input file.

use crate::error::RowError;

pub trait EntityCodec: Send + Sync {
    type Entity: Send + Sync;

    fn decode(&self, text: &str) -> Result<Self::Entity, RowError>;

    fn serialize(&self, entity: &Self::Entity) -> Result<Vec<u8>, RowError>;

    fn deserialize(&self, bytes: &[u8]) -> Result<Self::Entity, RowError>;

    /// Key shared by structurally identical entities
    fn structural_key(&self, entity: &Self::Entity) -> Result<String, RowError>;
}

const NAME_LEN_SIZE: usize = 4;

/// Frame a name and an entity payload into one archive record
pub fn encode_record(name: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(NAME_LEN_SIZE + name.len() + payload.len());
    out.extend_from_slice(&(name.len() as u32).to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(payload);
    out
}

/// Split an archive record into `(name, payload)`; `None` if the frame is bad
pub fn decode_record(record: &[u8]) -> Option<(&str, &[u8])> {
    if record.len() < NAME_LEN_SIZE {
        return None;
    }
    let len = u32::from_le_bytes(record[0..NAME_LEN_SIZE].try_into().unwrap()) as usize;
    let rest = &record[NAME_LEN_SIZE..];
    if rest.len() < len {
        return None;
    }
    let name = std::str::from_utf8(&rest[..len]).ok()?;
    Some((name, &rest[len..]))
}
