use std::io::Write;

use tracing::{info, warn};
use zone_engine::{
    catalog_path_from_env, ContainerHandle, EntityContainer, GridCoordinate, HeadlessPresentation,
    SceneContainers, SerializedZoneRecord, StoreConfig, Surface, TileAsset, TileChangeGuard,
    TileData, TileId, TileLookup, WorldPosition, ZoneCatalog, ZoneState, ZoneStore,
};

use crate::cli::{Command, InspectOptions};

const CONTAINERS: SceneContainers = SceneContainers {
    entities: ContainerHandle(1),
    items: ContainerHandle(2),
};

/// Resolves every tile id to a walkable placeholder. Used when no catalog is configured.
struct PlaceholderTiles;

impl TileLookup for PlaceholderTiles {
    fn tile_data(&self, tile_id: TileId) -> Option<TileData> {
        Some(TileData {
            collidable: false,
            asset: TileAsset(format!("placeholder/{}", tile_id.0)),
        })
    }
}

/// Vetoes edits to cells that hold an entity.
struct OccupiedTilesLocked;

impl TileChangeGuard for OccupiedTilesLocked {
    fn permits(
        &self,
        _pos: GridCoordinate,
        _new_tile: TileId,
        occupant: Option<&EntityContainer>,
    ) -> bool {
        occupant.is_none()
    }
}

pub(crate) struct Session {
    store: ZoneStore,
    catalog: Option<ZoneCatalog>,
    keep_occupied: bool,
}

impl Session {
    pub(crate) fn new(store: ZoneStore, catalog: Option<ZoneCatalog>) -> Self {
        Self {
            store,
            catalog,
            keep_occupied: false,
        }
    }

    pub(crate) fn keep_occupied(mut self, keep_occupied: bool) -> Self {
        self.keep_occupied = keep_occupied;
        self
    }

    /// Flags win over `ZONE_STORE_ROOT` / `ZONE_CATALOG`.
    pub(crate) fn open(options: &InspectOptions) -> Result<Self, String> {
        let mut config = StoreConfig::from_env();
        if let Some(root) = &options.store {
            config.root = root.clone();
        }

        let catalog = match options.catalog.clone().or_else(catalog_path_from_env) {
            Some(path) => Some(ZoneCatalog::load(&path).map_err(|error| error.to_string())?),
            None => {
                warn!("zone_inspect_no_catalog");
                None
            }
        };

        info!(
            store = %config.root.display(),
            catalog_tiles = catalog.as_ref().map_or(0, ZoneCatalog::tile_count),
            keep_occupied = options.keep_occupied,
            "zone_inspect_session_opened"
        );
        Ok(Self::new(ZoneStore::new(config), catalog).keep_occupied(options.keep_occupied))
    }

    fn tiles(&self) -> &dyn TileLookup {
        match &self.catalog {
            Some(catalog) => catalog,
            None => &PlaceholderTiles,
        }
    }

    fn presentation(&self) -> HeadlessPresentation {
        match &self.catalog {
            Some(catalog) => HeadlessPresentation::with_catalog(catalog),
            None => HeadlessPresentation::new(),
        }
    }

    fn load_zone(
        &self,
        zone: WorldPosition,
    ) -> Result<(SerializedZoneRecord, ZoneState, HeadlessPresentation), String> {
        let record = self.store.load(zone).map_err(|error| error.to_string())?;
        let mut scene = self.presentation();
        let mut state = ZoneState::materialize(&record, self.tiles(), &mut scene, CONTAINERS)
            .map_err(|error| error.to_string())?;
        if self.keep_occupied {
            state.set_tile_change_guard(Box::new(OccupiedTilesLocked));
        }
        Ok((record, state, scene))
    }
}

pub(crate) fn run(command: &Command, session: &Session, out: &mut dyn Write) -> Result<(), String> {
    match command {
        Command::List => list(session, out),
        Command::Check { zone } => check(session, *zone, out),
        Command::SetTile { zone, pos, tile } => {
            if session.tiles().tile_data(*tile).is_none() {
                return Err(format!("tile id {} is not in the catalog", tile.0));
            }
            let (_, mut state, mut scene) = session.load_zone(*zone)?;
            if !state.change_tile(*tile, *pos) {
                state.destroy_zone(&mut scene);
                return Err(format!("tile ({}, {}) is occupied", pos.x, pos.y));
            }
            let updated = state.serialize();
            state.destroy_zone(&mut scene);
            let path = session
                .store
                .save(&updated)
                .map_err(|error| error.to_string())?;
            emit(
                out,
                &format!(
                    "set tile ({}, {}) to {} in {}",
                    pos.x,
                    pos.y,
                    tile.0,
                    path.display()
                ),
            )
        }
    }
}

fn list(session: &Session, out: &mut dyn Write) -> Result<(), String> {
    let zones = session.store.list().map_err(|error| error.to_string())?;
    if zones.is_empty() {
        return emit(
            out,
            &format!("no zones in {}", session.store.config().root.display()),
        );
    }
    for zone in zones {
        emit(out, &format!("{} {} {}", zone.x, zone.y, zone.z))?;
    }
    Ok(())
}

fn check(session: &Session, zone: WorldPosition, out: &mut dyn Write) -> Result<(), String> {
    let (record, state, mut scene) = session.load_zone(zone)?;

    let base = scene.tiles(Surface::Base).len();
    let bounds = scene.tiles(Surface::Bounds).len();
    let breakable = state
        .entities()
        .iter()
        .filter(|entity| entity.is_breakable())
        .count();
    let lines = [
        format!(
            "zone {} {} {}: {}x{}",
            zone.x,
            zone.y,
            zone.z,
            state.width(),
            state.height()
        ),
        format!("tiles: {} (base {base}, bounds {bounds})", base + bounds),
        format!(
            "entities: {} (breakable {breakable})",
            state.entities().len()
        ),
        format!("portals: {}", state.portals().len()),
        format!("items: {}", state.items().len()),
    ];
    for line in &lines {
        emit(out, line)?;
    }

    let round_trip = state.serialize() == record;
    state.destroy_zone(&mut scene);
    if !round_trip {
        emit(out, "round-trip: mismatch")?;
        return Err(format!(
            "zone {} {} {} does not serialize back to its stored record",
            zone.x, zone.y, zone.z
        ));
    }
    emit(out, "round-trip: ok")
}

fn emit(out: &mut dyn Write, line: &str) -> Result<(), String> {
    writeln!(out, "{line}").map_err(|error| format!("failed to write output: {error}"))
}
