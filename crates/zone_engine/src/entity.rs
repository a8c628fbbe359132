use crate::grid::{GridCoordinate, WorldPosition};
use crate::ports::VisualHandle;
use crate::record::{CollectibleInfo, EntityId, EntityInfo, EntityTypeFlags, ItemStack};

/// Live entity placed in a zone. Owned by the zone's entity list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityContainer {
    pub handle: VisualHandle,
    pub position: GridCoordinate,
    pub kind: EntityTypeFlags,
    pub id: EntityId,
}

impl EntityContainer {
    pub fn new(
        handle: VisualHandle,
        position: GridCoordinate,
        kind: EntityTypeFlags,
        id: EntityId,
    ) -> Self {
        Self {
            handle,
            position,
            kind,
            id,
        }
    }

    pub fn is_breakable(&self) -> bool {
        self.kind.contains(EntityTypeFlags::BREAKABLE)
    }

    /// Entities live on layer 0 once placed, so the layer is not kept.
    pub fn info(&self) -> EntityInfo {
        EntityInfo {
            entity_id: self.id,
            entity_type: self.kind,
            pos: self.position.to_world(),
        }
    }
}

/// Live collectible lying in a zone. Identified by its visual handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveCollectible {
    pub handle: VisualHandle,
    pub stack: ItemStack,
    pub pos: WorldPosition,
}

impl LiveCollectible {
    pub fn new(handle: VisualHandle, stack: ItemStack, pos: WorldPosition) -> Self {
        Self { handle, stack, pos }
    }

    pub fn info(&self) -> CollectibleInfo {
        CollectibleInfo {
            item_stack: self.stack.clone(),
            pos: self.pos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ItemId;

    #[test]
    fn container_info_projects_to_layer_zero() {
        let container = EntityContainer::new(
            VisualHandle(3),
            GridCoordinate::new(2, 5),
            EntityTypeFlags::BREAKABLE | EntityTypeFlags::COLLIDABLE,
            EntityId(11),
        );
        let info = container.info();
        assert_eq!(info.entity_id, EntityId(11));
        assert_eq!(info.pos, WorldPosition::new(2, 5, 0));
        assert!(info.entity_type.contains(EntityTypeFlags::COLLIDABLE));
        assert!(container.is_breakable());
    }

    #[test]
    fn collectible_info_keeps_stack_and_layer() {
        let stack = ItemStack::new(ItemId(2), 7);
        let item =
            LiveCollectible::new(VisualHandle(1), stack.clone(), WorldPosition::new(0, 0, 1));
        let info = item.info();
        assert_eq!(info.item_stack, stack);
        assert_eq!(info.pos.z, 1);
    }
}
