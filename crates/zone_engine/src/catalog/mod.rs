mod compiler;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ports::{TileAsset, TileData, TileLookup};
use crate::record::{EntityId, ItemId, TileId};

pub use compiler::{CatalogError, CatalogErrorCode, SourceLocation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileDef {
    pub id: TileId,
    pub asset: TileAsset,
    pub collidable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDef {
    pub id: EntityId,
    pub label: String,
    pub portal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDef {
    pub id: ItemId,
    pub label: String,
}

/// Lookup tables for tile, entity and item ids, compiled from `<Defs>` XML.
#[derive(Debug, Clone, Default)]
pub struct ZoneCatalog {
    tiles: HashMap<TileId, TileDef>,
    entities: BTreeMap<EntityId, EntityDef>,
    items: BTreeMap<ItemId, ItemDef>,
}

impl ZoneCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError {
            code: CatalogErrorCode::ReadFile,
            message: format!("failed to read catalog file: {source}"),
            file_path: path.to_path_buf(),
            location: None,
        })?;
        Self::from_xml_str(&raw, path)
    }

    pub fn from_xml_str(raw: &str, file_path: &Path) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        compiler::compile_into(&mut catalog, raw, file_path)?;
        Ok(catalog)
    }

    pub fn with_tile(mut self, def: TileDef) -> Self {
        self.tiles.insert(def.id, def);
        self
    }

    pub fn with_entity(mut self, def: EntityDef) -> Self {
        self.entities.insert(def.id, def);
        self
    }

    pub fn with_item(mut self, def: ItemDef) -> Self {
        self.items.insert(def.id, def);
        self
    }

    pub fn entity_def(&self, id: EntityId) -> Option<&EntityDef> {
        self.entities.get(&id)
    }

    pub fn item_def(&self, id: ItemId) -> Option<&ItemDef> {
        self.items.get(&id)
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn portal_entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities
            .values()
            .filter(|def| def.portal)
            .map(|def| def.id)
    }

    pub fn item_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items.keys().copied()
    }
}

impl TileLookup for ZoneCatalog {
    fn tile_data(&self, tile_id: TileId) -> Option<TileData> {
        self.tiles.get(&tile_id).map(|def| TileData {
            collidable: def.collidable,
            asset: def.asset.clone(),
        })
    }
}

pub const CATALOG_ENV_VAR: &str = "ZONE_CATALOG";

pub fn catalog_path_from_env() -> Option<PathBuf> {
    std::env::var_os(CATALOG_ENV_VAR)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const DEFS: &str = r#"<Defs>
  <TileDef><id>0</id><asset>tiles/grass</asset></TileDef>
  <TileDef><id>1</id><asset>tiles/wall</asset><collidable>true</collidable></TileDef>
  <EntityDef><id>10</id><label>Crate</label></EntityDef>
  <EntityDef><id>20</id><label>Door</label><portal>true</portal></EntityDef>
  <ItemDef><id>5</id><label>Coin</label></ItemDef>
</Defs>"#;

    #[test]
    fn compiled_catalog_resolves_tiles_and_ids() {
        let catalog = ZoneCatalog::from_xml_str(DEFS, Path::new("defs.xml")).expect("catalog");
        assert_eq!(catalog.tile_count(), 2);

        let wall = catalog.tile_data(TileId(1)).expect("wall");
        assert!(wall.collidable);
        assert_eq!(wall.asset, TileAsset("tiles/wall".to_string()));
        assert!(!catalog.tile_data(TileId(0)).expect("grass").collidable);
        assert!(catalog.tile_data(TileId(99)).is_none());

        assert_eq!(
            catalog.entity_ids().collect::<Vec<_>>(),
            vec![EntityId(10), EntityId(20)]
        );
        assert_eq!(
            catalog.portal_entity_ids().collect::<Vec<_>>(),
            vec![EntityId(20)]
        );
        assert_eq!(catalog.item_def(ItemId(5)).expect("coin").label, "Coin");
    }

    #[test]
    fn load_reads_file_from_disk() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("defs.xml");
        fs::write(&path, DEFS).expect("write defs");
        let catalog = ZoneCatalog::load(&path).expect("load");
        assert!(catalog.entity_def(EntityId(20)).expect("door").portal);
    }

    #[test]
    fn load_missing_file_reports_read_error() {
        let temp = TempDir::new().expect("temp");
        let error = ZoneCatalog::load(&temp.path().join("absent.xml")).expect_err("missing");
        assert_eq!(error.code, CatalogErrorCode::ReadFile);
    }
}
