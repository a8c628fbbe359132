pub mod catalog;
mod entity;
mod grid;
mod headless;
mod ports;
mod record;
mod state;
pub mod store;

pub use catalog::{
    catalog_path_from_env, CatalogError, CatalogErrorCode, EntityDef, ItemDef, SourceLocation,
    TileDef, ZoneCatalog, CATALOG_ENV_VAR,
};
pub use entity::{EntityContainer, LiveCollectible};
pub use grid::{border_cell_count, border_cells, in_border, GridCoordinate, WorldPosition};
pub use headless::{HeadlessPresentation, VisualKind, VisualNode};
pub use ports::{
    ContainerHandle, PresentationError, PresentationPort, SceneContainers, Surface, TileAsset,
    TileData, TileLookup, VisualHandle,
};
pub use record::{
    CollectibleInfo, Direction, EntityId, EntityInfo, EntityTypeFlags, ItemId, ItemStack,
    PortalInfo, RecordError, SerializedZoneRecord, TileId,
};
pub use state::{MaterializeStage, TeardownReport, TileChangeGuard, ZoneLoadError, ZoneState};
pub use store::{
    StoreConfig, ZoneManifest, ZoneStore, ZoneStoreError, STORE_ROOT_ENV_VAR, ZONE_FORMAT_VERSION,
};
