use thiserror::Error;

use crate::grid::{GridCoordinate, WorldPosition};
use crate::record::{Direction, EntityId, ItemId, ItemStack, TileId};

/// Opaque reference to a visual object owned by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisualHandle(pub u64);

/// Grouping node that spawned visuals are parented under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerHandle(pub u64);

/// Parent containers handed to a zone when it is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneContainers {
    pub entities: ContainerHandle,
    pub items: ContainerHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    Base,
    Bounds,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileAsset(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileData {
    pub collidable: bool,
    pub asset: TileAsset,
}

impl TileData {
    pub fn surface(&self) -> Surface {
        if self.collidable {
            Surface::Bounds
        } else {
            Surface::Base
        }
    }
}

pub trait TileLookup {
    fn tile_data(&self, tile_id: TileId) -> Option<TileData>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresentationError {
    #[error("no entity prefab registered for id {0}")]
    UnknownEntity(i32),
    #[error("no item prefab registered for id {0}")]
    UnknownItem(i32),
    #[error("visual {0:?} has no portal behaviour")]
    NotAPortal(VisualHandle),
    #[error("visual {0:?} is not alive")]
    StaleHandle(VisualHandle),
}

/// Scene side of a zone. Implementations own every visual they hand out; the
/// zone only relays identity and lifecycle calls.
///
/// `release` and `clear_tile` must tolerate handles and cells that are already gone.
pub trait PresentationPort {
    fn place_tile(&mut self, coord: GridCoordinate, asset: &TileAsset, surface: Surface);

    fn clear_tile(&mut self, coord: GridCoordinate, surface: Surface);

    /// Spawns the entity prefab and returns its body. The body may sit under a
    /// generated wrapper, reachable through [`PresentationPort::parent_of`].
    fn instantiate_entity(
        &mut self,
        entity_id: EntityId,
        pos: WorldPosition,
    ) -> Result<VisualHandle, PresentationError>;

    fn instantiate_item(
        &mut self,
        item_id: ItemId,
        pos: WorldPosition,
        stack: &ItemStack,
    ) -> Result<VisualHandle, PresentationError>;

    fn configure_portal(
        &mut self,
        handle: VisualHandle,
        next_zone: WorldPosition,
        direction: Direction,
    ) -> Result<(), PresentationError>;

    fn reparent(&mut self, handle: VisualHandle, container: ContainerHandle);

    fn parent_of(&self, handle: VisualHandle) -> Option<VisualHandle>;

    fn break_entity(&mut self, handle: VisualHandle);

    fn release(&mut self, handle: VisualHandle);
}
