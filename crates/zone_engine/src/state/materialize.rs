use tracing::{debug, info, warn};

use crate::entity::LiveCollectible;
use crate::grid::{border_cells, GridCoordinate};
use crate::ports::{PresentationPort, SceneContainers, Surface, TileLookup, VisualHandle};
use crate::record::SerializedZoneRecord;

use super::error::{MaterializeStage, ZoneLoadError};
use super::{release_entity_visual, ZoneState};

/// Everything handed to the presentation layer so far, in creation order.
#[derive(Debug, Default)]
struct PlacementLog {
    tiles: Vec<(GridCoordinate, Surface)>,
    entity_visuals: Vec<VisualHandle>,
    item_visuals: Vec<VisualHandle>,
}

impl PlacementLog {
    fn unwind(self, port: &mut dyn PresentationPort) {
        for handle in self.item_visuals.into_iter().rev() {
            port.release(handle);
        }
        for handle in self.entity_visuals.into_iter().rev() {
            release_entity_visual(port, handle);
        }
        for (coord, surface) in self.tiles.into_iter().rev() {
            port.clear_tile(coord, surface);
        }
    }
}

pub(super) fn materialize(
    record: &SerializedZoneRecord,
    tiles: &dyn TileLookup,
    port: &mut dyn PresentationPort,
    containers: SceneContainers,
) -> Result<ZoneState, ZoneLoadError> {
    if record.width < 0 || record.height < 0 {
        return Err(ZoneLoadError::InvalidDimensions {
            width: record.width,
            height: record.height,
        });
    }

    let mut zone = ZoneState::empty(record);
    let mut log = PlacementLog::default();
    if let Err(error) = populate(&mut zone, record, tiles, port, containers, &mut log) {
        warn!(
            zone = ?record.zone_index,
            error = %error,
            tiles_placed = log.tiles.len(),
            visuals_created = log.entity_visuals.len() + log.item_visuals.len(),
            "zone_materialize_failed"
        );
        log.unwind(port);
        return Err(error);
    }

    info!(
        zone = ?zone.current_zone,
        width = zone.width,
        height = zone.height,
        tiles = log.tiles.len(),
        entities = zone.map_entities.len(),
        portals = zone.portal_visuals.len(),
        items = zone.map_items.len(),
        "zone_materialized"
    );
    Ok(zone)
}

fn populate(
    zone: &mut ZoneState,
    record: &SerializedZoneRecord,
    tiles: &dyn TileLookup,
    port: &mut dyn PresentationPort,
    containers: SceneContainers,
    log: &mut PlacementLog,
) -> Result<(), ZoneLoadError> {
    for coord in border_cells(record.width, record.height) {
        let tile_id = *record
            .tile_ids
            .get(&coord)
            .ok_or(ZoneLoadError::MissingTile { coord })?;
        let data = tiles
            .tile_data(tile_id)
            .ok_or(ZoneLoadError::UnknownTile { coord, tile_id })?;
        let surface = data.surface();
        port.place_tile(coord, &data.asset, surface);
        log.tiles.push((coord, surface));
    }
    debug!(count = log.tiles.len(), "zone_tiles_placed");

    for (index, info) in record.entity_info.iter().enumerate() {
        let handle = port
            .instantiate_entity(info.entity_id, info.pos)
            .map_err(|source| ZoneLoadError::Presentation {
                stage: MaterializeStage::Entities,
                index,
                source,
            })?;
        log.entity_visuals.push(handle);
        port.reparent(handle, containers.entities);
        zone.add_entity(handle, info.pos.to_grid(), info.entity_type, info.entity_id);
    }
    debug!(count = record.entity_info.len(), "zone_entities_spawned");

    for (index, portal) in record.portal_info.iter().enumerate() {
        let stage_error = |source| ZoneLoadError::Presentation {
            stage: MaterializeStage::Portals,
            index,
            source,
        };
        let entity = &portal.entity_info;
        let handle = port
            .instantiate_entity(entity.entity_id, entity.pos)
            .map_err(stage_error)?;
        log.entity_visuals.push(handle);
        port.reparent(handle, containers.entities);
        port.configure_portal(handle, portal.next_zone, portal.direction_to_go)
            .map_err(stage_error)?;
        zone.portal_visuals.push(handle);
    }
    debug!(count = record.portal_info.len(), "zone_portals_spawned");

    for (index, collectible) in record.collectible_info.iter().enumerate() {
        let stack = &collectible.item_stack;
        let handle = port
            .instantiate_item(stack.id, collectible.pos, stack)
            .map_err(|source| ZoneLoadError::Presentation {
                stage: MaterializeStage::Collectibles,
                index,
                source,
            })?;
        log.item_visuals.push(handle);
        port.reparent(handle, containers.items);
        zone.add_item(LiveCollectible::new(handle, stack.clone(), collectible.pos));
    }
    debug!(
        count = record.collectible_info.len(),
        "zone_collectibles_spawned"
    );

    Ok(())
}
