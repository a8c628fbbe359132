mod atomic_io;
mod digest;

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::grid::WorldPosition;
use crate::record::{RecordError, SerializedZoneRecord};

use atomic_io::{commit_pair, stage_file, CommitError};
use digest::payload_sha256_hex;

pub const STORE_ROOT_ENV_VAR: &str = "ZONE_STORE_ROOT";
pub const ZONE_FORMAT_VERSION: u16 = 1;

const DEFAULT_STORE_DIR: &str = "zones";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub root: PathBuf,
    pub pretty_json: bool,
    pub verify_digest: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_STORE_DIR),
            pretty_json: true,
            verify_digest: true,
        }
    }
}

impl StoreConfig {
    /// Defaults, with the root taken from `ZONE_STORE_ROOT` when it is set and non-empty.
    pub fn from_env() -> Self {
        match env::var_os(STORE_ROOT_ENV_VAR) {
            Some(root) if !root.is_empty() => Self {
                root: PathBuf::from(root),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}

/// Sidecar written next to every zone payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneManifest {
    pub format_version: u16,
    pub payload_sha256_hex: String,
}

#[derive(Debug, Error)]
pub enum ZoneStoreError {
    #[error("i/o error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode zone json for '{path}': {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to parse '{path}' at {json_path}: {message}")]
    Parse {
        path: PathBuf,
        json_path: String,
        message: String,
    },
    #[error("unsupported zone format version {found} in '{path}' (expected {expected})")]
    FormatVersion {
        path: PathBuf,
        found: u16,
        expected: u16,
    },
    #[error("payload digest mismatch for '{path}': manifest has {expected}, file hashes to {actual}")]
    DigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("'{path}' holds zone {found:?}, expected {expected:?}")]
    ZoneIndexMismatch {
        path: PathBuf,
        expected: WorldPosition,
        found: WorldPosition,
    },
    #[error("invalid zone record: {0}")]
    Invalid(#[from] RecordError),
}

impl ZoneStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Directory of saved zones, one JSON payload plus manifest per zone index.
#[derive(Debug, Clone)]
pub struct ZoneStore {
    config: StoreConfig,
}

impl ZoneStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn payload_path(&self, zone: WorldPosition) -> PathBuf {
        self.config.root.join(format!("{}.json", file_stem(zone)))
    }

    pub fn manifest_path(&self, zone: WorldPosition) -> PathBuf {
        self.config
            .root
            .join(format!("{}.manifest.json", file_stem(zone)))
    }

    pub fn exists(&self, zone: WorldPosition) -> bool {
        self.payload_path(zone).is_file()
    }

    /// Writes the record under its own `zone_index`. Records with missing tiles
    /// are refused so that everything on disk can be materialized again.
    pub fn save(&self, record: &SerializedZoneRecord) -> Result<PathBuf, ZoneStoreError> {
        record.validate_completeness()?;
        let zone = record.zone_index;
        let path = self.payload_path(zone);

        let encoded = if self.config.pretty_json {
            serde_json::to_vec_pretty(record)
        } else {
            serde_json::to_vec(record)
        };
        let payload = encoded.map_err(|source| ZoneStoreError::Encode {
            path: path.clone(),
            source,
        })?;

        let manifest = ZoneManifest {
            format_version: ZONE_FORMAT_VERSION,
            payload_sha256_hex: payload_sha256_hex(&payload),
        };
        let manifest_path = self.manifest_path(zone);
        let manifest_bytes =
            serde_json::to_vec(&manifest).map_err(|source| ZoneStoreError::Encode {
                path: manifest_path.clone(),
                source,
            })?;

        // Both files are staged before either is replaced, so a failed save
        // leaves the previous payload and manifest readable together.
        let staged_payload = stage_file(&path, &payload).map_err(|source| ZoneStoreError::Io {
            path: path.clone(),
            source,
        })?;
        let staged_manifest = match stage_file(&manifest_path, &manifest_bytes) {
            Ok(staged) => staged,
            Err(source) => {
                staged_payload.discard();
                return Err(ZoneStoreError::Io {
                    path: manifest_path,
                    source,
                });
            }
        };
        commit_pair(staged_payload, staged_manifest)
            .map_err(|CommitError { path, source }| ZoneStoreError::Io { path, source })?;

        info!(
            zone = ?zone,
            path = %path.display(),
            bytes = payload.len(),
            tiles = record.tile_ids.len(),
            "zone_saved"
        );
        Ok(path)
    }

    pub fn load(&self, zone: WorldPosition) -> Result<SerializedZoneRecord, ZoneStoreError> {
        let path = self.payload_path(zone);
        let payload = read_file(&path)?;

        if self.config.verify_digest {
            self.verify_manifest(zone, &path, &payload)?;
        }

        let record = parse_json::<SerializedZoneRecord>(&path, &payload)?;
        if record.zone_index != zone {
            return Err(ZoneStoreError::ZoneIndexMismatch {
                path,
                expected: zone,
                found: record.zone_index,
            });
        }
        record.validate_completeness()?;

        let stray = record.stray_tiles();
        if let Some(first) = stray.first() {
            warn!(
                zone = ?zone,
                count = stray.len(),
                first_x = first.x,
                first_y = first.y,
                "zone_load_stray_tiles"
            );
        }

        info!(
            zone = ?zone,
            path = %path.display(),
            width = record.width,
            height = record.height,
            tiles = record.expected_tile_count(),
            "zone_loaded"
        );
        Ok(record)
    }

    /// Zone indices with a payload file under the store root, sorted. A missing
    /// root is an empty store.
    pub fn list(&self) -> Result<Vec<WorldPosition>, ZoneStoreError> {
        let root = &self.config.root;
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ZoneStoreError::Io {
                    path: root.clone(),
                    source,
                })
            }
        };

        let mut zones = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ZoneStoreError::Io {
                path: root.clone(),
                source,
            })?;
            let name = entry.file_name();
            match name.to_str().and_then(parse_payload_file_name) {
                Some(zone) => zones.push(zone),
                None => debug!(file = ?name, "zone_store_skipped_file"),
            }
        }
        zones.sort();
        Ok(zones)
    }

    fn verify_manifest(
        &self,
        zone: WorldPosition,
        path: &Path,
        payload: &[u8],
    ) -> Result<(), ZoneStoreError> {
        let manifest_path = self.manifest_path(zone);
        let manifest = parse_json::<ZoneManifest>(&manifest_path, &read_file(&manifest_path)?)?;
        if manifest.format_version != ZONE_FORMAT_VERSION {
            return Err(ZoneStoreError::FormatVersion {
                path: manifest_path,
                found: manifest.format_version,
                expected: ZONE_FORMAT_VERSION,
            });
        }
        let actual = payload_sha256_hex(payload);
        if actual != manifest.payload_sha256_hex {
            return Err(ZoneStoreError::DigestMismatch {
                path: path.to_path_buf(),
                expected: manifest.payload_sha256_hex,
                actual,
            });
        }
        Ok(())
    }
}

fn file_stem(zone: WorldPosition) -> String {
    format!("zone_{}_{}_{}", zone.x, zone.y, zone.z)
}

fn parse_payload_file_name(name: &str) -> Option<WorldPosition> {
    let stem = name.strip_prefix("zone_")?.strip_suffix(".json")?;
    let mut parts = stem.split('_');
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    let z = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(WorldPosition::new(x, y, z))
}

fn read_file(path: &Path) -> Result<Vec<u8>, ZoneStoreError> {
    fs::read(path).map_err(|source| ZoneStoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_json<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T, ZoneStoreError> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize::<_, T>(&mut deserializer).map_err(|error| {
        let json_path = error.path().to_string();
        ZoneStoreError::Parse {
            path: path.to_path_buf(),
            json_path: if json_path.is_empty() {
                ".".to_string()
            } else {
                json_path
            },
            message: error.into_inner().to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::grid::GridCoordinate;
    use crate::record::{
        CollectibleInfo, EntityId, EntityInfo, EntityTypeFlags, ItemId, ItemStack, TileId,
    };

    fn store_in(temp: &TempDir) -> ZoneStore {
        ZoneStore::new(StoreConfig::with_root(temp.path().join("zones")))
    }

    fn sample_record(zone: WorldPosition) -> SerializedZoneRecord {
        let mut record = SerializedZoneRecord::filled(3, 2, zone, TileId(0));
        record.tile_ids.insert(GridCoordinate::new(1, 1), TileId(4));
        record.entity_info.push(EntityInfo {
            entity_id: EntityId(10),
            entity_type: EntityTypeFlags::BREAKABLE,
            pos: WorldPosition::new(2, 0, 0),
        });
        record.collectible_info.push(CollectibleInfo {
            item_stack: ItemStack::new(ItemId(5), 3),
            pos: WorldPosition::new(0, 1, 2),
        });
        record
    }

    #[test]
    fn save_then_load_returns_same_record() {
        let temp = TempDir::new().expect("tempdir");
        let store = store_in(&temp);
        let zone = WorldPosition::new(2, -1, 0);
        let record = sample_record(zone);

        let path = store.save(&record).expect("save");
        assert_eq!(path, temp.path().join("zones").join("zone_2_-1_0.json"));
        assert!(store.exists(zone));
        assert!(store.manifest_path(zone).is_file());

        assert_eq!(store.load(zone).expect("load"), record);
    }

    #[test]
    fn compact_json_round_trips_too() {
        let temp = TempDir::new().expect("tempdir");
        let store = ZoneStore::new(StoreConfig {
            pretty_json: false,
            ..StoreConfig::with_root(temp.path())
        });
        let record = sample_record(WorldPosition::default());

        let path = store.save(&record).expect("save");
        let raw = fs::read_to_string(path).expect("read");
        assert!(!raw.contains('\n'));
        assert_eq!(store.load(WorldPosition::default()).expect("load"), record);
    }

    #[test]
    fn save_refuses_record_with_missing_tiles() {
        let temp = TempDir::new().expect("tempdir");
        let store = store_in(&temp);
        let mut record = sample_record(WorldPosition::default());
        record.tile_ids.remove(&GridCoordinate::new(-1, -1));

        let error = store.save(&record).expect_err("missing tile");
        assert!(matches!(
            error,
            ZoneStoreError::Invalid(RecordError::MissingTiles { count: 1, .. })
        ));
        assert!(!store.exists(WorldPosition::default()));
    }

    #[test]
    fn failed_save_keeps_previous_payload_and_manifest() {
        let temp = TempDir::new().expect("tempdir");
        let store = store_in(&temp);
        let zone = WorldPosition::default();
        let original = sample_record(zone);
        let path = store.save(&original).expect("save");

        let mut blocker = store.manifest_path(zone).into_os_string();
        blocker.push(".partial");
        let blocker = PathBuf::from(blocker);
        fs::create_dir_all(blocker.join("occupied")).expect("block manifest staging");

        let mut updated = original.clone();
        updated.collectible_info[0].item_stack.quantity = 7;
        assert!(matches!(store.save(&updated), Err(ZoneStoreError::Io { .. })));
        assert_eq!(store.load(zone).expect("previous version"), original);
        assert!(!path.with_file_name("zone_0_0_0.json.partial").exists());

        fs::remove_dir_all(&blocker).expect("unblock");
        store.save(&updated).expect("save after unblock");
        assert_eq!(store.load(zone).expect("load"), updated);
    }

    #[test]
    fn edited_payload_fails_digest_check() {
        let temp = TempDir::new().expect("tempdir");
        let store = store_in(&temp);
        let zone = WorldPosition::new(0, 0, 1);
        let path = store.save(&sample_record(zone)).expect("save");

        let edited = fs::read_to_string(&path)
            .expect("read")
            .replace("\"quantity\": 3", "\"quantity\": 99");
        fs::write(&path, edited).expect("tamper");

        let error = store.load(zone).expect_err("digest");
        assert!(matches!(error, ZoneStoreError::DigestMismatch { .. }));

        let unchecked = ZoneStore::new(StoreConfig {
            verify_digest: false,
            ..store.config().clone()
        });
        let record = unchecked.load(zone).expect("load without digest");
        assert_eq!(record.collectible_info[0].item_stack.quantity, 99);
    }

    #[test]
    fn missing_manifest_is_reported_as_not_found() {
        let temp = TempDir::new().expect("tempdir");
        let store = store_in(&temp);
        let zone = WorldPosition::default();
        store.save(&sample_record(zone)).expect("save");
        fs::remove_file(store.manifest_path(zone)).expect("remove manifest");

        let error = store.load(zone).expect_err("manifest");
        assert!(error.is_not_found());
    }

    #[test]
    fn newer_manifest_version_is_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let store = store_in(&temp);
        let zone = WorldPosition::default();
        store.save(&sample_record(zone)).expect("save");
        let manifest_path = store.manifest_path(zone);
        let raw = fs::read_to_string(&manifest_path).expect("read manifest");
        let mut manifest = serde_json::from_str::<ZoneManifest>(&raw).expect("manifest");
        manifest.format_version = ZONE_FORMAT_VERSION + 1;
        fs::write(
            &manifest_path,
            serde_json::to_vec(&manifest).expect("encode"),
        )
        .expect("write manifest");

        let error = store.load(zone).expect_err("version");
        assert!(matches!(
            error,
            ZoneStoreError::FormatVersion { found, .. } if found == ZONE_FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn parse_errors_name_the_offending_field() {
        let temp = TempDir::new().expect("tempdir");
        let store = ZoneStore::new(StoreConfig {
            verify_digest: false,
            ..StoreConfig::with_root(temp.path())
        });
        let zone = WorldPosition::default();
        fs::write(
            store.payload_path(zone),
            r#"{"width": "three", "height": 2, "zone_index": {"x": 0, "y": 0, "z": 0}, "tile_ids": []}"#,
        )
        .expect("write");

        match store.load(zone).expect_err("parse") {
            ZoneStoreError::Parse { json_path, .. } => assert_eq!(json_path, "width"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn stored_record_with_missing_tiles_is_invalid() {
        let temp = TempDir::new().expect("tempdir");
        let store = ZoneStore::new(StoreConfig {
            verify_digest: false,
            ..StoreConfig::with_root(temp.path())
        });
        let zone = WorldPosition::default();
        let mut record = sample_record(zone);
        record.tile_ids.remove(&GridCoordinate::new(3, 2));
        fs::write(
            store.payload_path(zone),
            serde_json::to_vec(&record).expect("encode"),
        )
        .expect("write");

        let error = store.load(zone).expect_err("invalid");
        assert!(matches!(
            error,
            ZoneStoreError::Invalid(RecordError::MissingTiles { .. })
        ));
    }

    #[test]
    fn stray_tiles_load_with_a_warning_only() {
        let temp = TempDir::new().expect("tempdir");
        let store = store_in(&temp);
        let zone = WorldPosition::default();
        let mut record = sample_record(zone);
        record.tile_ids.insert(GridCoordinate::new(9, 9), TileId(1));
        store.save(&record).expect("save");

        assert_eq!(store.load(zone).expect("load"), record);
    }

    #[test]
    fn payload_under_wrong_name_is_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let store = ZoneStore::new(StoreConfig {
            verify_digest: false,
            ..StoreConfig::with_root(temp.path())
        });
        let record = sample_record(WorldPosition::new(1, 0, 0));
        store.save(&record).expect("save");
        fs::rename(
            store.payload_path(record.zone_index),
            store.payload_path(WorldPosition::new(5, 5, 0)),
        )
        .expect("rename");

        let error = store
            .load(WorldPosition::new(5, 5, 0))
            .expect_err("mismatch");
        assert!(matches!(error, ZoneStoreError::ZoneIndexMismatch { .. }));
    }

    #[test]
    fn list_returns_sorted_zone_indices_and_skips_other_files() {
        let temp = TempDir::new().expect("tempdir");
        let store = store_in(&temp);
        assert!(store.list().expect("empty store").is_empty());

        for zone in [
            WorldPosition::new(1, 0, 0),
            WorldPosition::new(-2, 3, 0),
            WorldPosition::new(1, 0, -1),
        ] {
            store.save(&sample_record(zone)).expect("save");
        }
        fs::write(temp.path().join("zones").join("notes.txt"), "x").expect("notes");
        fs::write(temp.path().join("zones").join("zone_a_b_c.json"), "{}").expect("junk");

        assert_eq!(
            store.list().expect("list"),
            vec![
                WorldPosition::new(-2, 3, 0),
                WorldPosition::new(1, 0, -1),
                WorldPosition::new(1, 0, 0),
            ]
        );
    }

    #[test]
    fn load_of_unknown_zone_is_not_found() {
        let temp = TempDir::new().expect("tempdir");
        let store = store_in(&temp);
        let error = store
            .load(WorldPosition::new(7, 7, 7))
            .expect_err("missing");
        assert!(error.is_not_found());
        assert!(!store.exists(WorldPosition::new(7, 7, 7)));
    }

    #[test]
    fn payload_file_names_parse_back_to_indices() {
        assert_eq!(
            parse_payload_file_name("zone_-1_2_0.json"),
            Some(WorldPosition::new(-1, 2, 0))
        );
        assert_eq!(parse_payload_file_name("zone_1_2_0.manifest.json"), None);
        assert_eq!(parse_payload_file_name("zone_1_2.json"), None);
        assert_eq!(parse_payload_file_name("zone_1_2_3_4.json"), None);
    }
}
