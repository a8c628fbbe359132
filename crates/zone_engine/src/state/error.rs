use thiserror::Error;

use crate::grid::GridCoordinate;
use crate::ports::PresentationError;
use crate::record::TileId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeStage {
    Entities,
    Portals,
    Collectibles,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneLoadError {
    #[error("zone dimensions must be >= 0, got {width}x{height}")]
    InvalidDimensions { width: i32, height: i32 },
    #[error("tile map has no entry for ({}, {})", .coord.x, .coord.y)]
    MissingTile { coord: GridCoordinate },
    #[error("tile id {} at ({}, {}) is not in the tile catalog", .tile_id.0, .coord.x, .coord.y)]
    UnknownTile {
        coord: GridCoordinate,
        tile_id: TileId,
    },
    #[error("failed to instantiate {stage:?} entry {index}: {source}")]
    Presentation {
        stage: MaterializeStage,
        index: usize,
        #[source]
        source: PresentationError,
    },
}
