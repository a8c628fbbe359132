use std::collections::BTreeMap;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::grid::{border_cell_count, border_cells, in_border, GridCoordinate, WorldPosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(pub i32);

/// Prefab id of a placed entity; many containers can share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i32);

bitflags! {
    /// Entity categories. An entity may carry any combination.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct EntityTypeFlags: u32 {
        const BREAKABLE = 1 << 0;
        const STATIC = 1 << 1;
        const COLLIDABLE = 1 << 2;
        const INTERACTABLE = 1 << 3;
        const PORTAL = 1 << 4;
    }
}

// Raw bits on disk so categories added by newer builds survive a load/save cycle.
impl Serialize for EntityTypeFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for EntityTypeFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(Self::from_bits_retain(bits))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub id: ItemId,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ItemStack {
    pub fn new(id: ItemId, quantity: u32) -> Self {
        Self {
            id,
            quantity,
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub entity_id: EntityId,
    pub entity_type: EntityTypeFlags,
    pub pos: WorldPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalInfo {
    pub entity_info: EntityInfo,
    pub next_zone: WorldPosition,
    pub direction_to_go: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectibleInfo {
    pub item_stack: ItemStack,
    pub pos: WorldPosition,
}

/// Durable form of a zone. `tile_ids` must cover `[-1, width] x [-1, height]` exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedZoneRecord {
    pub width: i32,
    pub height: i32,
    pub zone_index: WorldPosition,
    #[serde(with = "tile_entries")]
    pub tile_ids: BTreeMap<GridCoordinate, TileId>,
    #[serde(default)]
    pub entity_info: Vec<EntityInfo>,
    #[serde(default)]
    pub portal_info: Vec<PortalInfo>,
    #[serde(default)]
    pub collectible_info: Vec<CollectibleInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("zone dimensions must be >= 0, got {width}x{height}")]
    NegativeDimensions { width: i32, height: i32 },
    #[error("tile map is missing {count} cell(s), first at ({}, {})", .first.x, .first.y)]
    MissingTiles { count: usize, first: GridCoordinate },
    #[error("tile map has {count} cell(s) outside the zone border, first at ({}, {})", .first.x, .first.y)]
    StrayTiles { count: usize, first: GridCoordinate },
}

impl SerializedZoneRecord {
    /// Empty zone with every border cell set to `fill`.
    pub fn filled(width: i32, height: i32, zone_index: WorldPosition, fill: TileId) -> Self {
        let tile_ids = border_cells(width, height)
            .map(|coord| (coord, fill))
            .collect::<BTreeMap<_, _>>();
        Self {
            width,
            height,
            zone_index,
            tile_ids,
            entity_info: Vec::new(),
            portal_info: Vec::new(),
            collectible_info: Vec::new(),
        }
    }

    pub fn expected_tile_count(&self) -> usize {
        border_cell_count(self.width, self.height)
    }

    /// Checks dimensions and that no border cell is missing.
    pub fn validate_completeness(&self) -> Result<(), RecordError> {
        if self.width < 0 || self.height < 0 {
            return Err(RecordError::NegativeDimensions {
                width: self.width,
                height: self.height,
            });
        }
        let mut missing = border_cells(self.width, self.height)
            .filter(|coord| !self.tile_ids.contains_key(coord));
        if let Some(first) = missing.next() {
            return Err(RecordError::MissingTiles {
                count: 1 + missing.count(),
                first,
            });
        }
        Ok(())
    }

    /// Full structural check: completeness plus no keys outside the border.
    pub fn validate(&self) -> Result<(), RecordError> {
        self.validate_completeness()?;
        let stray = self.stray_tiles();
        if let Some(first) = stray.first().copied() {
            return Err(RecordError::StrayTiles {
                count: stray.len(),
                first,
            });
        }
        Ok(())
    }

    pub fn stray_tiles(&self) -> Vec<GridCoordinate> {
        self.tile_ids
            .keys()
            .copied()
            .filter(|coord| !in_border(self.width, self.height, *coord))
            .collect()
    }
}

mod tile_entries {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::TileId;
    use crate::grid::GridCoordinate;

    #[derive(Serialize, Deserialize)]
    struct TileEntry {
        x: i32,
        y: i32,
        id: TileId,
    }

    pub(super) fn serialize<S: Serializer>(
        tiles: &BTreeMap<GridCoordinate, TileId>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let entries = tiles
            .iter()
            .map(|(coord, id)| TileEntry {
                x: coord.x,
                y: coord.y,
                id: *id,
            })
            .collect::<Vec<_>>();
        entries.serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<GridCoordinate, TileId>, D::Error> {
        let entries = Vec::<TileEntry>::deserialize(deserializer)?;
        let mut tiles = BTreeMap::new();
        for entry in entries {
            let coord = GridCoordinate::new(entry.x, entry.y);
            if tiles.insert(coord, entry.id).is_some() {
                return Err(D::Error::custom(format!(
                    "duplicate tile entry at ({}, {})",
                    entry.x, entry.y
                )));
            }
        }
        Ok(tiles)
    }
}
