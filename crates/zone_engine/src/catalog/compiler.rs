use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};

use crate::ports::TileAsset;
use crate::record::{EntityId, ItemId, TileId};

use super::{EntityDef, ItemDef, TileDef, ZoneCatalog};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateId,
}

#[derive(Debug, Clone)]
pub struct CatalogError {
    pub code: CatalogErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for CatalogError {}

struct Ctx<'a, 'input> {
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl Ctx<'_, '_> {
    fn error(&self, code: CatalogErrorCode, message: String, node: Node<'_, '_>) -> CatalogError {
        let pos = self.doc.text_pos_at(node.range().start);
        CatalogError {
            code,
            message,
            file_path: self.file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            }),
        }
    }

    fn required_text(&self, node: Node<'_, '_>, field: &str) -> Result<String, CatalogError> {
        let value = node.text().map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            return Err(self.error(
                CatalogErrorCode::MissingField,
                format!("field <{field}> must not be empty"),
                node,
            ));
        }
        Ok(value)
    }

    fn parse_id(&self, node: Node<'_, '_>) -> Result<i32, CatalogError> {
        let value = self.required_text(node, "id")?;
        value.parse::<i32>().map_err(|_| {
            self.error(
                CatalogErrorCode::InvalidValue,
                format!("id '{value}' is not a valid integer"),
                node,
            )
        })
    }

    fn parse_bool(&self, node: Node<'_, '_>, field: &str) -> Result<bool, CatalogError> {
        let value = self.required_text(node, field)?;
        match value.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(self.error(
                CatalogErrorCode::InvalidValue,
                format!("<{field}> must be 'true' or 'false', got '{value}'"),
                node,
            )),
        }
    }

    fn parse_asset(&self, node: Node<'_, '_>) -> Result<TileAsset, CatalogError> {
        let value = self.required_text(node, "asset")?;
        if let Some(reason) = asset_key_problem(&value) {
            return Err(self.error(
                CatalogErrorCode::InvalidValue,
                format!("invalid asset key '{value}': {reason}"),
                node,
            ));
        }
        Ok(TileAsset(value))
    }

    fn missing(&self, def: &str, field: &str, node: Node<'_, '_>) -> CatalogError {
        self.error(
            CatalogErrorCode::MissingField,
            format!("missing required field <{field}> in <{def}>"),
            node,
        )
    }
}

/// Asset keys are lowercase slash-separated paths relative to the tile atlas root.
fn asset_key_problem(key: &str) -> Option<String> {
    if key.starts_with('/') || key.ends_with('/') {
        return Some("must not start or end with '/'".to_string());
    }
    let bad_segment = |segment: &str| segment.is_empty() || segment == "..";
    if key.split('/').any(bad_segment) {
        return Some("path segments must be non-empty and not '..'".to_string());
    }
    key.chars()
        .find(|ch| {
            !(ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '_' | '-' | '/'))
        })
        .map(|ch| format!("character '{ch}' is not allowed"))
}

pub(super) fn compile_into(
    catalog: &mut ZoneCatalog,
    raw: &str,
    file_path: &Path,
) -> Result<(), CatalogError> {
    let doc = Document::parse(raw).map_err(|error| CatalogError {
        code: CatalogErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;
    let ctx = Ctx {
        file_path,
        doc: &doc,
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(ctx.error(
            CatalogErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            root,
        ));
    }

    for child in root.children().filter(|node| node.is_element()) {
        match child.tag_name().name() {
            "TileDef" => {
                let def = parse_tile_def(&ctx, child)?;
                if catalog.tiles.contains_key(&def.id) {
                    return Err(duplicate_id(&ctx, "TileDef", def.id.0, child));
                }
                catalog.tiles.insert(def.id, def);
            }
            "EntityDef" => {
                let def = parse_entity_def(&ctx, child)?;
                if catalog.entities.contains_key(&def.id) {
                    return Err(duplicate_id(&ctx, "EntityDef", def.id.0, child));
                }
                catalog.entities.insert(def.id, def);
            }
            "ItemDef" => {
                let def = parse_item_def(&ctx, child)?;
                if catalog.items.contains_key(&def.id) {
                    return Err(duplicate_id(&ctx, "ItemDef", def.id.0, child));
                }
                catalog.items.insert(def.id, def);
            }
            other => {
                return Err(ctx.error(
                    CatalogErrorCode::UnknownDefType,
                    format!(
                        "unsupported def type <{other}>; expected TileDef, EntityDef or ItemDef"
                    ),
                    child,
                ))
            }
        }
    }
    Ok(())
}

fn duplicate_id(ctx: &Ctx<'_, '_>, def: &str, id: i32, node: Node<'_, '_>) -> CatalogError {
    ctx.error(
        CatalogErrorCode::DuplicateId,
        format!("duplicate <{def}> id {id}"),
        node,
    )
}

/// Yields each field element once, rejecting repeats and names outside `allowed`.
fn fields<'a, 'input>(
    ctx: &Ctx<'_, '_>,
    def: &str,
    node: Node<'a, 'input>,
    allowed: &[&str],
) -> Result<Vec<(String, Node<'a, 'input>)>, CatalogError> {
    let mut seen = HashSet::<String>::new();
    let mut out = Vec::new();
    for field in node.children().filter(|child| child.is_element()) {
        let name = field.tag_name().name().to_string();
        if !allowed.contains(&name.as_str()) {
            return Err(ctx.error(
                CatalogErrorCode::UnknownField,
                format!("unknown field <{name}> in <{def}>"),
                field,
            ));
        }
        if !seen.insert(name.clone()) {
            return Err(ctx.error(
                CatalogErrorCode::DuplicateField,
                format!("duplicate field <{name}> in <{def}>"),
                field,
            ));
        }
        out.push((name, field));
    }
    Ok(out)
}

fn parse_tile_def(ctx: &Ctx<'_, '_>, node: Node<'_, '_>) -> Result<TileDef, CatalogError> {
    let mut id = None;
    let mut asset = None;
    let mut collidable = false;
    for (name, field) in fields(ctx, "TileDef", node, &["id", "asset", "collidable"])? {
        match name.as_str() {
            "id" => id = Some(TileId(ctx.parse_id(field)?)),
            "asset" => asset = Some(ctx.parse_asset(field)?),
            _ => collidable = ctx.parse_bool(field, "collidable")?,
        }
    }
    let id = id.ok_or_else(|| ctx.missing("TileDef", "id", node))?;
    let asset = asset.ok_or_else(|| ctx.missing("TileDef", "asset", node))?;
    Ok(TileDef {
        id,
        asset,
        collidable,
    })
}

fn parse_entity_def(ctx: &Ctx<'_, '_>, node: Node<'_, '_>) -> Result<EntityDef, CatalogError> {
    let mut id = None;
    let mut label = None;
    let mut portal = false;
    for (name, field) in fields(ctx, "EntityDef", node, &["id", "label", "portal"])? {
        match name.as_str() {
            "id" => id = Some(EntityId(ctx.parse_id(field)?)),
            "label" => label = Some(ctx.required_text(field, "label")?),
            _ => portal = ctx.parse_bool(field, "portal")?,
        }
    }
    let id = id.ok_or_else(|| ctx.missing("EntityDef", "id", node))?;
    let label = label.ok_or_else(|| ctx.missing("EntityDef", "label", node))?;
    Ok(EntityDef { id, label, portal })
}

fn parse_item_def(ctx: &Ctx<'_, '_>, node: Node<'_, '_>) -> Result<ItemDef, CatalogError> {
    let mut id = None;
    let mut label = None;
    for (name, field) in fields(ctx, "ItemDef", node, &["id", "label"])? {
        match name.as_str() {
            "id" => id = Some(ItemId(ctx.parse_id(field)?)),
            _ => label = Some(ctx.required_text(field, "label")?),
        }
    }
    let id = id.ok_or_else(|| ctx.missing("ItemDef", "id", node))?;
    let label = label.ok_or_else(|| ctx.missing("ItemDef", "label", node))?;
    Ok(ItemDef { id, label })
}
