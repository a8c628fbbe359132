use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::catalog::ZoneCatalog;
use crate::grid::{GridCoordinate, WorldPosition};
use crate::ports::{
    ContainerHandle, PresentationError, PresentationPort, Surface, TileAsset, VisualHandle,
};
use crate::record::{Direction, EntityId, ItemId, ItemStack};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisualKind {
    Wrapper,
    Entity(EntityId),
    Item(ItemStack),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualNode {
    pub kind: VisualKind,
    pub position: WorldPosition,
    pub parent: Option<VisualHandle>,
    pub container: Option<ContainerHandle>,
    pub portal: Option<(WorldPosition, Direction)>,
}

#[derive(Debug, Default)]
struct HandleAllocator {
    next: u64,
}

impl HandleAllocator {
    fn allocate(&mut self) -> VisualHandle {
        let handle = VisualHandle(self.next);
        self.next = self.next.saturating_add(1);
        handle
    }
}

/// In-memory scene used by tools and tests. Entities spawn as a wrapper with
/// one body child, mirroring prefab instantiation in a real scene graph.
#[derive(Debug, Default)]
pub struct HeadlessPresentation {
    allocator: HandleAllocator,
    base: HashMap<GridCoordinate, TileAsset>,
    bounds: HashMap<GridCoordinate, TileAsset>,
    tile_placements: usize,
    visuals: HashMap<VisualHandle, VisualNode>,
    known_entities: Option<HashSet<EntityId>>,
    portal_entities: Option<HashSet<EntityId>>,
    known_items: Option<HashSet<ItemId>>,
    broken: Vec<VisualHandle>,
    released: Vec<VisualHandle>,
}

impl HeadlessPresentation {
    /// Accepts every entity and item id; every entity can act as a portal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts only the entity and item ids the catalog defines.
    pub fn with_catalog(catalog: &ZoneCatalog) -> Self {
        Self {
            known_entities: Some(catalog.entity_ids().collect()),
            portal_entities: Some(catalog.portal_entity_ids().collect()),
            known_items: Some(catalog.item_ids().collect()),
            ..Self::default()
        }
    }

    pub fn tiles(&self, surface: Surface) -> &HashMap<GridCoordinate, TileAsset> {
        match surface {
            Surface::Base => &self.base,
            Surface::Bounds => &self.bounds,
        }
    }

    pub fn tile_placements(&self) -> usize {
        self.tile_placements
    }

    pub fn visual(&self, handle: VisualHandle) -> Option<&VisualNode> {
        self.visuals.get(&handle)
    }

    pub fn is_alive(&self, handle: VisualHandle) -> bool {
        self.visuals.contains_key(&handle)
    }

    pub fn live_visual_count(&self) -> usize {
        self.visuals.len()
    }

    pub fn broken(&self) -> &[VisualHandle] {
        &self.broken
    }

    pub fn released(&self) -> &[VisualHandle] {
        &self.released
    }

    fn root_of(&self, handle: VisualHandle) -> VisualHandle {
        let mut current = handle;
        while let Some(parent) = self.visuals.get(&current).and_then(|node| node.parent) {
            current = parent;
        }
        current
    }

    fn remove_subtree(&mut self, handle: VisualHandle) -> bool {
        if self.visuals.remove(&handle).is_none() {
            return false;
        }
        let children = self
            .visuals
            .iter()
            .filter(|(_, node)| node.parent == Some(handle))
            .map(|(child, _)| *child)
            .collect::<Vec<_>>();
        for child in children {
            self.remove_subtree(child);
        }
        true
    }

    fn spawn(
        &mut self,
        kind: VisualKind,
        position: WorldPosition,
        parent: Option<VisualHandle>,
    ) -> VisualHandle {
        let handle = self.allocator.allocate();
        self.visuals.insert(
            handle,
            VisualNode {
                kind,
                position,
                parent,
                container: None,
                portal: None,
            },
        );
        handle
    }
}

impl PresentationPort for HeadlessPresentation {
    fn place_tile(&mut self, coord: GridCoordinate, asset: &TileAsset, surface: Surface) {
        self.tile_placements += 1;
        let layer = match surface {
            Surface::Base => &mut self.base,
            Surface::Bounds => &mut self.bounds,
        };
        layer.insert(coord, asset.clone());
    }

    fn clear_tile(&mut self, coord: GridCoordinate, surface: Surface) {
        let layer = match surface {
            Surface::Base => &mut self.base,
            Surface::Bounds => &mut self.bounds,
        };
        layer.remove(&coord);
    }

    fn instantiate_entity(
        &mut self,
        entity_id: EntityId,
        pos: WorldPosition,
    ) -> Result<VisualHandle, PresentationError> {
        if let Some(known) = &self.known_entities {
            if !known.contains(&entity_id) {
                return Err(PresentationError::UnknownEntity(entity_id.0));
            }
        }
        let wrapper = self.spawn(VisualKind::Wrapper, pos, None);
        Ok(self.spawn(VisualKind::Entity(entity_id), pos, Some(wrapper)))
    }

    fn instantiate_item(
        &mut self,
        item_id: ItemId,
        pos: WorldPosition,
        stack: &ItemStack,
    ) -> Result<VisualHandle, PresentationError> {
        if let Some(known) = &self.known_items {
            if !known.contains(&item_id) {
                return Err(PresentationError::UnknownItem(item_id.0));
            }
        }
        Ok(self.spawn(VisualKind::Item(stack.clone()), pos, None))
    }

    fn configure_portal(
        &mut self,
        handle: VisualHandle,
        next_zone: WorldPosition,
        direction: Direction,
    ) -> Result<(), PresentationError> {
        let portal_entities = self.portal_entities.as_ref();
        let node = self
            .visuals
            .get_mut(&handle)
            .ok_or(PresentationError::StaleHandle(handle))?;
        let portal_capable = match node.kind {
            VisualKind::Entity(entity_id) => {
                portal_entities.is_none_or(|portals| portals.contains(&entity_id))
            }
            VisualKind::Wrapper | VisualKind::Item(_) => false,
        };
        if !portal_capable {
            return Err(PresentationError::NotAPortal(handle));
        }
        node.portal = Some((next_zone, direction));
        Ok(())
    }

    fn reparent(&mut self, handle: VisualHandle, container: ContainerHandle) {
        let root = self.root_of(handle);
        if let Some(node) = self.visuals.get_mut(&root) {
            node.container = Some(container);
        }
    }

    fn parent_of(&self, handle: VisualHandle) -> Option<VisualHandle> {
        self.visuals.get(&handle).and_then(|node| node.parent)
    }

    fn break_entity(&mut self, handle: VisualHandle) {
        if !self.is_alive(handle) {
            debug!(handle = handle.0, "headless_break_ignored_stale_handle");
            return;
        }
        self.broken.push(handle);
        let root = self.root_of(handle);
        self.remove_subtree(root);
    }

    fn release(&mut self, handle: VisualHandle) {
        if self.remove_subtree(handle) {
            self.released.push(handle);
        }
    }
}
