mod error;
mod materialize;

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::entity::{EntityContainer, LiveCollectible};
use crate::grid::{in_border, GridCoordinate, WorldPosition};
use crate::ports::{PresentationPort, SceneContainers, TileLookup, VisualHandle};
use crate::record::{EntityId, EntityTypeFlags, PortalInfo, SerializedZoneRecord, TileId};

pub use error::{MaterializeStage, ZoneLoadError};

/// Veto point for tile edits. Without one installed, every edit is applied.
pub trait TileChangeGuard {
    fn permits(
        &self,
        pos: GridCoordinate,
        new_tile: TileId,
        occupant: Option<&EntityContainer>,
    ) -> bool;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub items_released: usize,
    pub entities_released: usize,
    pub portals_released: usize,
}

/// Live state of the active zone.
///
/// Visual handles point into the presentation layer and are never owned here;
/// the zone only relays break and release calls for them.
pub struct ZoneState {
    width: i32,
    height: i32,
    current_zone: WorldPosition,
    tile_ids: BTreeMap<GridCoordinate, TileId>,
    map_entities: Vec<EntityContainer>,
    map_items: Vec<LiveCollectible>,
    portal_info: Vec<PortalInfo>,
    portal_visuals: Vec<VisualHandle>,
    tile_guard: Option<Box<dyn TileChangeGuard>>,
}

impl fmt::Debug for ZoneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZoneState")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("current_zone", &self.current_zone)
            .field("tiles", &self.tile_ids.len())
            .field("map_entities", &self.map_entities)
            .field("map_items", &self.map_items)
            .field("portal_info", &self.portal_info)
            .field("tile_guard", &self.tile_guard.is_some())
            .finish()
    }
}

impl ZoneState {
    /// Builds the live zone and spawns its tiles, entities, portals and
    /// collectibles, in that order. On failure every visual created for the
    /// zone is released again before the error is returned.
    pub fn materialize(
        record: &SerializedZoneRecord,
        tiles: &dyn TileLookup,
        port: &mut dyn PresentationPort,
        containers: SceneContainers,
    ) -> Result<Self, ZoneLoadError> {
        materialize::materialize(record, tiles, port, containers)
    }

    fn empty(record: &SerializedZoneRecord) -> Self {
        Self {
            width: record.width,
            height: record.height,
            current_zone: record.zone_index,
            tile_ids: record.tile_ids.clone(),
            map_entities: Vec::with_capacity(record.entity_info.len()),
            map_items: Vec::with_capacity(record.collectible_info.len()),
            portal_info: record.portal_info.clone(),
            portal_visuals: Vec::with_capacity(record.portal_info.len()),
            tile_guard: None,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn current_zone(&self) -> WorldPosition {
        self.current_zone
    }

    pub fn tile_ids(&self) -> &BTreeMap<GridCoordinate, TileId> {
        &self.tile_ids
    }

    pub fn tile_at(&self, pos: GridCoordinate) -> Option<TileId> {
        self.tile_ids.get(&pos).copied()
    }

    pub fn entities(&self) -> &[EntityContainer] {
        &self.map_entities
    }

    pub fn items(&self) -> &[LiveCollectible] {
        &self.map_items
    }

    pub fn portals(&self) -> &[PortalInfo] {
        &self.portal_info
    }

    /// First entity registered at `pos`. Placement never checks occupancy, so
    /// later entities on the same cell are shadowed.
    pub fn entity_at(&self, pos: GridCoordinate) -> Option<&EntityContainer> {
        self.map_entities
            .iter()
            .find(|entity| entity.position == pos)
    }

    pub fn add_entity(
        &mut self,
        handle: VisualHandle,
        pos: GridCoordinate,
        kind: EntityTypeFlags,
        id: EntityId,
    ) {
        self.map_entities
            .push(EntityContainer::new(handle, pos, kind, id));
    }

    /// Breaks the first entity at `pos` if it is breakable. Returns whether
    /// anything was destroyed; an empty or unbreakable cell is not an error.
    pub fn destroy_entity(&mut self, pos: GridCoordinate, port: &mut dyn PresentationPort) -> bool {
        let Some(index) = self
            .map_entities
            .iter()
            .position(|entity| entity.position == pos)
        else {
            debug!(x = pos.x, y = pos.y, "zone_destroy_entity_empty_cell");
            return false;
        };
        if !self.map_entities[index].is_breakable() {
            debug!(x = pos.x, y = pos.y, "zone_destroy_entity_not_breakable");
            return false;
        }

        let entity = self.map_entities.remove(index);
        port.break_entity(entity.handle);
        debug!(
            x = pos.x,
            y = pos.y,
            entity_id = entity.id.0,
            "zone_entity_destroyed"
        );
        true
    }

    pub fn add_item(&mut self, item: LiveCollectible) {
        self.map_items.push(item);
    }

    /// Removes the item with this handle. Returns `false` when it is not present.
    pub fn remove_item(&mut self, handle: VisualHandle) -> bool {
        match self.map_items.iter().position(|item| item.handle == handle) {
            Some(index) => {
                self.map_items.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn set_tile_change_guard(&mut self, guard: Box<dyn TileChangeGuard>) {
        self.tile_guard = Some(guard);
    }

    /// Overwrites the tile at `pos`. No bounds or occupancy check is made
    /// unless a [`TileChangeGuard`] is installed; returns whether the edit applied.
    pub fn change_tile(&mut self, new_tile: TileId, pos: GridCoordinate) -> bool {
        if !in_border(self.width, self.height, pos) {
            warn!(
                x = pos.x,
                y = pos.y,
                width = self.width,
                height = self.height,
                "zone_tile_change_outside_border"
            );
        }
        if let Some(guard) = &self.tile_guard {
            if !guard.permits(pos, new_tile, self.entity_at(pos)) {
                debug!(
                    x = pos.x,
                    y = pos.y,
                    tile = new_tile.0,
                    "zone_tile_change_vetoed"
                );
                return false;
            }
        }
        self.tile_ids.insert(pos, new_tile);
        true
    }

    /// Projects the live zone back into its durable form. Entities are stored
    /// on layer 0; items keep their full position.
    pub fn serialize(&self) -> SerializedZoneRecord {
        let entity_info = self.map_entities.iter().map(EntityContainer::info);
        let collectible_info = self.map_items.iter().map(LiveCollectible::info);
        SerializedZoneRecord {
            width: self.width,
            height: self.height,
            zone_index: self.current_zone,
            tile_ids: self.tile_ids.clone(),
            entity_info: entity_info.collect(),
            portal_info: self.portal_info.clone(),
            collectible_info: collectible_info.collect(),
        }
    }

    /// Releases every visual this zone spawned. Consumes the zone; serialize
    /// first if the state should be kept.
    pub fn destroy_zone(self, port: &mut dyn PresentationPort) -> TeardownReport {
        for item in &self.map_items {
            port.release(item.handle);
        }
        for entity in &self.map_entities {
            release_entity_visual(port, entity.handle);
        }
        for handle in &self.portal_visuals {
            release_entity_visual(port, *handle);
        }

        let report = TeardownReport {
            items_released: self.map_items.len(),
            entities_released: self.map_entities.len(),
            portals_released: self.portal_visuals.len(),
        };
        info!(
            zone = ?self.current_zone,
            items = report.items_released,
            entities = report.entities_released,
            portals = report.portals_released,
            "zone_destroyed"
        );
        report
    }
}

/// Entity bodies sit under a generated wrapper; releasing the wrapper takes the body with it.
fn release_entity_visual(port: &mut dyn PresentationPort, handle: VisualHandle) {
    let target = port.parent_of(handle).unwrap_or(handle);
    port.release(target);
}
