use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use engine_core::scene::SceneConfig;
use engine_core::tick::TickConfig;
use engine_core::MoverConfig;
use movement::MoveConfig;
use space::{AoiConfig, Heuristic, PathAlgorithm, PathLimits, SpawnArea, TileTransform};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickSection {
    pub tps: u32,
    pub max_ticks: u64,
}

impl Default for TickSection {
    fn default() -> Self {
        Self {
            tps: 30,
            max_ticks: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SceneSection {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    /// Share of tiles blocked when no map file is given.
    pub obstacle_ratio: f64,
    pub seed: u64,
    /// JSON map data (`width`, `height`, `rows`). Overrides generation.
    pub map_file: Option<String>,
    pub spawn_area: Option<SpawnArea>,
    pub spawn_attempts: u32,
}

impl Default for SceneSection {
    fn default() -> Self {
        Self {
            id: 1,
            width: 1028,
            height: 1028,
            obstacle_ratio: space::walkable::DEFAULT_OBSTACLE_RATIO,
            seed: 0,
            map_file: None,
            spawn_area: None,
            spawn_attempts: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AoiSection {
    pub cell_size: u32,
}

impl Default for AoiSection {
    fn default() -> Self {
        Self {
            cell_size: space::model::DEFAULT_CELL_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MovementSection {
    pub position_tolerance: u32,
    pub distance_tolerance: u32,
    pub min_update_interval_ms: u64,
    pub start_grace_ms: u64,
    pub default_speed_cap: u32,
}

impl Default for MovementSection {
    fn default() -> Self {
        Self {
            position_tolerance: 30,
            distance_tolerance: 50,
            min_update_interval_ms: 50,
            start_grace_ms: 1000,
            default_speed_cap: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathfindingSection {
    pub astar_max_expansions: usize,
    pub straight_max_steps: usize,
    pub heuristic: Heuristic,
    pub patrol_algorithm: PathAlgorithm,
    pub chase_algorithm: PathAlgorithm,
    pub return_algorithm: PathAlgorithm,
}

impl Default for PathfindingSection {
    fn default() -> Self {
        Self {
            astar_max_expansions: 2000,
            straight_max_steps: 500,
            heuristic: Heuristic::Octile,
            patrol_algorithm: PathAlgorithm::Straight,
            chase_algorithm: PathAlgorithm::AStar,
            return_algorithm: PathAlgorithm::AStar,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonsterSection {
    pub count: u32,
    pub move_speed: u32,
    pub patrol_radius: u32,
    pub detect_range: u32,
    pub reset_distance: u32,
    pub replan_threshold: u32,
    /// Born area. Falls back to the whole map.
    pub spawn_area: Option<SpawnArea>,
}

impl Default for MonsterSection {
    fn default() -> Self {
        Self {
            count: 20,
            move_speed: 4,
            patrol_radius: 5,
            detect_range: 8,
            reset_distance: 20,
            replan_threshold: 2,
            spawn_area: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProtocolSection {
    /// Pixels per tile edge on the client side.
    pub tile_size: u32,
}

impl Default for ProtocolSection {
    fn default() -> Self {
        Self { tile_size: 32 }
    }
}

/// Top-level dungeon server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub tick: TickSection,
    pub scene: SceneSection,
    pub aoi: AoiSection,
    pub movement: MovementSection,
    pub pathfinding: PathfindingSection,
    pub monsters: MonsterSection,
    pub protocol: ProtocolSection,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file path.
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = match config_path {
            Some(path) if Path::new(path).exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        Ok(config)
    }

    pub fn to_tick_config(&self) -> TickConfig {
        TickConfig {
            tps: self.tick.tps,
            max_ticks: self.tick.max_ticks,
        }
    }

    pub fn to_move_config(&self) -> MoveConfig {
        MoveConfig {
            position_tolerance: self.movement.position_tolerance,
            distance_tolerance: self.movement.distance_tolerance,
            min_update_interval: Duration::from_millis(self.movement.min_update_interval_ms),
            start_grace: Duration::from_millis(self.movement.start_grace_ms),
            default_speed_cap: self.movement.default_speed_cap,
        }
    }

    pub fn to_path_limits(&self) -> PathLimits {
        PathLimits {
            astar_max_expansions: self.pathfinding.astar_max_expansions,
            straight_max_steps: self.pathfinding.straight_max_steps,
            heuristic: self.pathfinding.heuristic,
        }
    }

    pub fn to_mover_config(&self) -> MoverConfig {
        MoverConfig {
            patrol_radius: self.monsters.patrol_radius,
            detect_range: self.monsters.detect_range,
            reset_distance: self.monsters.reset_distance,
            replan_threshold: self.monsters.replan_threshold,
            patrol_algorithm: self.pathfinding.patrol_algorithm,
            chase_algorithm: self.pathfinding.chase_algorithm,
            return_algorithm: self.pathfinding.return_algorithm,
        }
    }

    pub fn to_scene_config(&self) -> SceneConfig {
        SceneConfig {
            id: self.scene.id,
            aoi: AoiConfig {
                cell_size: self.aoi.cell_size,
            },
            movement: self.to_move_config(),
            path_limits: self.to_path_limits(),
            spawn_attempts: self.scene.spawn_attempts,
            seed: self.scene.seed,
        }
    }

    pub fn to_tile_transform(&self) -> TileTransform {
        TileTransform {
            tile_size: self.protocol.tile_size,
        }
    }
}

/// Command-line overrides applied on top of the TOML file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: Option<String>,
    pub seed: Option<u64>,
    pub max_ticks: Option<u64>,
}

impl CliArgs {
    /// Parse `--config <path>`, `--seed <n>` and `--max-ticks <n>`.
    /// `args` excludes the program name.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut cli = Self::default();
        let mut it = args.iter();
        while let Some(flag) = it.next() {
            let mut value = || {
                it.next()
                    .cloned()
                    .ok_or_else(|| format!("{flag} requires a value"))
            };
            match flag.as_str() {
                "--config" => cli.config_path = Some(value()?),
                "--seed" => cli.seed = Some(parse_number(flag, &value()?)?),
                "--max-ticks" => cli.max_ticks = Some(parse_number(flag, &value()?)?),
                other => return Err(format!("Unknown argument: {other}")),
            }
        }
        Ok(cli)
    }

    /// Load the file named by `--config` (defaults when absent) and apply overrides.
    pub fn into_config(self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let mut config = ServerConfig::load(self.config_path.as_deref())?;
        if let Some(seed) = self.seed {
            config.scene.seed = seed;
        }
        if let Some(max_ticks) = self.max_ticks {
            config.tick.max_ticks = max_ticks;
        }
        Ok(config)
    }
}

fn parse_number(flag: &str, raw: &str) -> Result<u64, String> {
    raw.parse()
        .map_err(|e| format!("{flag}: invalid number {raw:?}: {e}"))
}

/// Parse process arguments and load config. Exits on bad input.
pub fn parse_cli_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match CliArgs::parse(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    match cli.into_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    }
}
