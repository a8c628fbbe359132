use std::path::PathBuf;

use zone_engine::{GridCoordinate, TileId, WorldPosition};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct InspectOptions {
    pub(crate) store: Option<PathBuf>,
    pub(crate) catalog: Option<PathBuf>,
    pub(crate) keep_occupied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Check {
        zone: WorldPosition,
    },
    List,
    SetTile {
        zone: WorldPosition,
        pos: GridCoordinate,
        tile: TileId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Invocation {
    pub(crate) options: InspectOptions,
    pub(crate) command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    Help,
    Run(Invocation),
}

pub(crate) fn usage_text() -> String {
    [
        "usage: zone_inspect [--store <dir>] [--catalog <defs.xml>] [--keep-occupied] <command>",
        "",
        "  --keep-occupied   refuse set-tile on cells that hold an entity",
        "",
        "commands:",
        "  check <x> <y> <z>                                  load, materialize and verify a zone",
        "  list                                               list stored zones",
        "  set-tile <x> <y> <z> <tile_x> <tile_y> <tile_id>   overwrite one tile and save",
        "",
        "environment: ZONE_STORE_ROOT, ZONE_CATALOG, RUST_LOG",
    ]
    .join("\n")
}

pub(crate) fn parse_args(args: &[String]) -> Result<Action, String> {
    let mut options = InspectOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "-h" | "--help" => return Ok(Action::Help),
            "--store" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --store".to_string())?;
                options.store = Some(PathBuf::from(value));
                index += 2;
            }
            "--catalog" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --catalog".to_string())?;
                options.catalog = Some(PathBuf::from(value));
                index += 2;
            }
            "--keep-occupied" => {
                options.keep_occupied = true;
                index += 1;
            }
            _ => break,
        }
    }

    let command = args
        .get(index)
        .ok_or_else(|| "missing command".to_string())?
        .as_str();
    let command_args = &args[(index + 1)..];

    let command = match command {
        "check" => {
            let [x, y, z] = expect_ints::<3>("check", command_args)?;
            Command::Check {
                zone: WorldPosition::new(x, y, z),
            }
        }
        "list" => {
            if !command_args.is_empty() {
                return Err("list takes no arguments".to_string());
            }
            Command::List
        }
        "set-tile" => {
            let [x, y, z, tile_x, tile_y, tile] = expect_ints::<6>("set-tile", command_args)?;
            Command::SetTile {
                zone: WorldPosition::new(x, y, z),
                pos: GridCoordinate::new(tile_x, tile_y),
                tile: TileId(tile),
            }
        }
        other => return Err(format!("unknown command '{other}'")),
    };

    Ok(Action::Run(Invocation { options, command }))
}

fn expect_ints<const N: usize>(command: &str, args: &[String]) -> Result<[i32; N], String> {
    if args.len() != N {
        return Err(format!(
            "{command} expects {N} integer arguments, got {}",
            args.len()
        ));
    }
    let mut values = [0i32; N];
    for (slot, raw) in values.iter_mut().zip(args) {
        *slot = raw
            .parse::<i32>()
            .map_err(|_| format!("invalid {command} argument '{raw}' (expected i32)"))?;
    }
    Ok(values)
}
