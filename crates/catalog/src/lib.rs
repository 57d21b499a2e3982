use std::{
    collections::{hash_map::Entry, HashMap},
    fs, io,
    path::{Path, PathBuf},
};

use codec::{FormatError, ParsedSensation};
use shared::domain::{DeviceSlotIndex, RawSensation};
use thiserror::Error;
use tracing::{info, warn};

pub const BUILTIN_UUID: &str = "test";
pub const BUILTIN_CODE: &str = "0~Dart~12,1,30,0,0,0,Impact|5%10~impact-1~";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("keyword \"{keyword}\" of sensation {uuid} is already registered to slot {existing}")]
    DuplicateKeyword {
        keyword: String,
        uuid: String,
        existing: DeviceSlotIndex,
    },
}

#[derive(Debug, Error)]
pub enum CatalogLoadError {
    #[error("failed to read sensation file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode sensation file '{}': {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct KeywordRegistry {
    slots: HashMap<String, DeviceSlotIndex>,
}

impl KeywordRegistry {
    pub fn get(&self, keyword: &str) -> Option<DeviceSlotIndex> {
        self.slots.get(keyword).copied()
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.slots.contains_key(keyword)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, DeviceSlotIndex)> {
        self.slots.iter().map(|(keyword, index)| (keyword.as_str(), *index))
    }
}

/// A sensation accepted by the codec and registered with the device.
#[derive(Debug, Clone)]
pub struct CatalogSlot {
    pub index: DeviceSlotIndex,
    pub uuid: String,
    pub keyword: String,
    pub raw_code: String,
    pub parsed: ParsedSensation,
}

impl CatalogSlot {
    /// Re-parses the authored code; durations are never cached.
    pub fn reparse(&self) -> Result<ParsedSensation, FormatError> {
        codec::parse(&self.raw_code)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    slots: Vec<CatalogSlot>,
    registry: KeywordRegistry,
    rejected: Vec<String>,
}

impl Catalog {
    pub fn build(records: Vec<RawSensation>) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();

        for record in records {
            let mut parsed = match codec::parse(&record.code) {
                Ok(parsed) => parsed,
                Err(error) => {
                    warn!(uuid = %record.uuid, %error, "catalog: rejected sensation");
                    catalog.rejected.push(record.uuid);
                    continue;
                }
            };

            let index = DeviceSlotIndex(catalog.slots.len());
            let keyword = record.keyword();
            match catalog.registry.slots.entry(keyword.clone()) {
                Entry::Occupied(existing) => {
                    return Err(CatalogError::DuplicateKeyword {
                        keyword,
                        uuid: record.uuid,
                        existing: *existing.get(),
                    });
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(index);
                }
            }

            parsed.index = index.to_string();
            catalog.slots.push(CatalogSlot {
                index,
                uuid: record.uuid,
                keyword,
                raw_code: record.code,
                parsed,
            });
        }

        info!(
            accepted = catalog.slots.len(),
            rejected = catalog.rejected.len(),
            "catalog: built sensation slots"
        );
        Ok(catalog)
    }

    pub fn slots(&self) -> &[CatalogSlot] {
        &self.slots
    }

    pub fn slot(&self, index: DeviceSlotIndex) -> Option<&CatalogSlot> {
        self.slots.get(index.0)
    }

    pub fn registry(&self) -> &KeywordRegistry {
        &self.registry
    }

    /// Uuids of records the codec refused, in catalog order.
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }

    /// Serialized slots in device slot order, as handed to the device.
    pub fn configuration(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|slot| codec::serialize(&slot.parsed))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Registers `keyword` against `slot` without a backing catalog entry.
    #[cfg(any(test, feature = "test-support"))]
    pub fn with_dangling_keyword(mut self, keyword: &str, slot: DeviceSlotIndex) -> Self {
        self.registry.slots.insert(keyword.to_string(), slot);
        self
    }
}

pub fn builtin_sensations() -> Vec<RawSensation> {
    vec![RawSensation {
        uuid: BUILTIN_UUID.to_string(),
        description: "Test sensation".to_string(),
        cost: "10".to_string(),
        prefix: "owo".to_string(),
        code: BUILTIN_CODE.to_string(),
    }]
}

pub fn load_sensation_file(path: &Path) -> Result<Vec<RawSensation>, CatalogLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| CatalogLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }

    let records: Option<Vec<RawSensation>> =
        serde_json::from_str(&contents).map_err(|source| CatalogLoadError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(records.unwrap_or_default())
}

/// Built-in sensations followed by the records of `sensation_file`, if any.
/// A file that cannot be loaded contributes nothing.
pub fn load_records(sensation_file: Option<&Path>) -> Vec<RawSensation> {
    let mut records = builtin_sensations();
    let Some(path) = sensation_file else {
        return records;
    };

    match load_sensation_file(path) {
        Ok(loaded) => {
            info!(path = %path.display(), count = loaded.len(), "catalog: loaded sensation file");
            records.extend(loaded);
        }
        Err(error) => {
            warn!(%error, "catalog: ignoring sensation file");
        }
    }
    records
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
