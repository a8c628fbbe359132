use serde::{Deserialize, Serialize};

/// Cell key into a zone's tile map.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GridCoordinate {
    pub x: i32,
    pub y: i32,
}

impl GridCoordinate {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn to_world(self) -> WorldPosition {
        self.with_layer(0)
    }

    pub fn with_layer(self, z: i32) -> WorldPosition {
        WorldPosition {
            x: self.x,
            y: self.y,
            z,
        }
    }
}

/// Placement position for entities, portals and collectibles. `z` is the layer.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct WorldPosition {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl WorldPosition {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn to_grid(self) -> GridCoordinate {
        GridCoordinate {
            x: self.x,
            y: self.y,
        }
    }
}

/// Tile grid convention:
/// - logical cells are `[0, width) x [0, height)`.
/// - stored cells are `[-1, width] x [-1, height]`, one wall ring below and at the high edge.
pub fn border_cells(width: i32, height: i32) -> impl Iterator<Item = GridCoordinate> {
    (-1..=width).flat_map(move |x| (-1..=height).map(move |y| GridCoordinate { x, y }))
}

pub fn border_cell_count(width: i32, height: i32) -> usize {
    if width < 0 || height < 0 {
        return 0;
    }
    (width as usize + 2) * (height as usize + 2)
}

pub fn in_border(width: i32, height: i32, coord: GridCoordinate) -> bool {
    (-1..=width).contains(&coord.x) && (-1..=height).contains(&coord.y)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn projection_drops_layer_and_lift_defaults_to_zero() {
        let world = WorldPosition::new(4, -2, 7);
        assert_eq!(world.to_grid(), GridCoordinate::new(4, -2));
        assert_eq!(world.to_grid().to_world(), WorldPosition::new(4, -2, 0));
        assert_eq!(
            GridCoordinate::new(1, 1).with_layer(3),
            WorldPosition::new(1, 1, 3)
        );
    }

    #[test]
    fn border_cells_cover_closed_range_once() {
        let cells = border_cells(3, 2).collect::<Vec<_>>();
        assert_eq!(cells.len(), border_cell_count(3, 2));
        assert_eq!(cells.len(), 5 * 4);

        let unique = cells.iter().copied().collect::<HashSet<_>>();
        assert_eq!(unique.len(), cells.len());
        assert!(unique.contains(&GridCoordinate::new(-1, -1)));
        assert!(unique.contains(&GridCoordinate::new(3, 2)));
        assert!(!unique.contains(&GridCoordinate::new(4, 0)));
        assert!(!unique.contains(&GridCoordinate::new(0, -2)));
    }

    #[test]
    fn empty_zone_still_has_wall_ring() {
        let cells = border_cells(0, 0).collect::<Vec<_>>();
        assert_eq!(cells.len(), 4);
        assert_eq!(border_cell_count(-1, 3), 0);
    }

    #[test]
    fn in_border_matches_iteration_range() {
        assert!(in_border(3, 2, GridCoordinate::new(-1, 2)));
        assert!(in_border(3, 2, GridCoordinate::new(3, -1)));
        assert!(!in_border(3, 2, GridCoordinate::new(3, 3)));
        assert!(!in_border(3, 2, GridCoordinate::new(-2, 0)));
    }
}
