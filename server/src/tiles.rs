//! Tile identity and the enter side-effect chain.
//!
//! A tile's identity (kind, passability, plantability) is immutable and is
//! never changed by decoration. Side effects of stepping onto a tile are an
//! ordered list of effect values composed at construction time; stepping on
//! the tile folds them into a single [`TileEnterResult`]. A third, globally
//! toggleable telemetry layer logs and counts enters without touching either
//! identity answers or gameplay results.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::debug;

use crate::movement::MovementKind;

/// The closed set of tile kinds, keyed by the single-digit ids used in map
/// files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileKind {
    Grass,
    Water,
    Rock,
    Boost,
    Mud,
    Soil,
    Fish,
}

impl TileKind {
    pub fn from_digit(digit: u8) -> Option<TileKind> {
        match digit {
            0 => Some(TileKind::Grass),
            1 => Some(TileKind::Water),
            2 => Some(TileKind::Rock),
            3 => Some(TileKind::Boost),
            4 => Some(TileKind::Mud),
            5 => Some(TileKind::Soil),
            6 => Some(TileKind::Fish),
            _ => None,
        }
    }

    pub fn digit(&self) -> u8 {
        match self {
            TileKind::Grass => 0,
            TileKind::Water => 1,
            TileKind::Rock => 2,
            TileKind::Boost => 3,
            TileKind::Mud => 4,
            TileKind::Soil => 5,
            TileKind::Fish => 6,
        }
    }

    pub fn passable(&self) -> bool {
        !matches!(self, TileKind::Rock)
    }

    pub fn plantable(&self) -> bool {
        matches!(self, TileKind::Soil)
    }

    pub fn water_like(&self) -> bool {
        matches!(self, TileKind::Water | TileKind::Fish)
    }
}

/// Immutable identity of one map cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileData {
    pub x: i32,
    pub y: i32,
    pub kind: TileKind,
}

impl TileData {
    pub fn passable(&self) -> bool {
        self.kind.passable()
    }

    pub fn plantable(&self) -> bool {
        self.kind.plantable()
    }
}

/// The side effects of stepping onto a tile. Composable: the first strategy
/// override set wins, flags only accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileEnterResult {
    strategy_override: Option<MovementKind>,
    pub replace_with_grass: bool,
    pub spawn_clone: bool,
}

impl TileEnterResult {
    pub fn strategy_override(&self) -> Option<MovementKind> {
        self.strategy_override
    }

    /// Sets the strategy override if none was set yet.
    pub fn with_strategy(mut self, strategy: MovementKind) -> Self {
        if self.strategy_override.is_none() {
            self.strategy_override = Some(strategy);
        }
        self
    }

    pub fn with_replacement(mut self) -> Self {
        self.replace_with_grass = true;
        self
    }

    pub fn with_clone(mut self) -> Self {
        self.spawn_clone = true;
        self
    }
}

/// One link of a tile's enter side-effect chain. Effects carry their own
/// consumption state; a replaced tile starts over with a fresh chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileEffect {
    /// Tiles whose ground forces a movement strategy (boost pads, mud,
    /// water).
    ForceStrategy(MovementKind),
    /// One-shot edible tile: on first entry it is consumed, asks the host
    /// to duplicate the entering player and to replace the tile with grass.
    Edible { consumed: bool },
}

impl TileEffect {
    fn apply(&mut self, result: TileEnterResult) -> TileEnterResult {
        match self {
            TileEffect::ForceStrategy(strategy) => result.with_strategy(*strategy),
            TileEffect::Edible { consumed } => {
                if *consumed {
                    result
                } else {
                    *consumed = true;
                    result.with_replacement().with_clone()
                }
            }
        }
    }
}

/// A map cell: immutable identity plus its effect chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    data: TileData,
    effects: Vec<TileEffect>,
}

impl Tile {
    /// Builds a tile with the default effect chain for its kind.
    pub fn new(x: i32, y: i32, kind: TileKind) -> Self {
        let effects = match kind {
            TileKind::Water => vec![TileEffect::ForceStrategy(MovementKind::Swim)],
            TileKind::Fish => vec![
                TileEffect::ForceStrategy(MovementKind::Swim),
                TileEffect::Edible { consumed: false },
            ],
            TileKind::Boost => vec![TileEffect::ForceStrategy(MovementKind::Boost)],
            TileKind::Mud => vec![TileEffect::ForceStrategy(MovementKind::Drag)],
            _ => Vec::new(),
        };

        Tile {
            data: TileData { x, y, kind },
            effects,
        }
    }

    // Identity queries answer from the inner data only, regardless of how
    // the tile is decorated.

    pub fn kind(&self) -> TileKind {
        self.data.kind
    }

    pub fn passable(&self) -> bool {
        self.data.passable()
    }

    pub fn plantable(&self) -> bool {
        self.data.plantable()
    }

    pub fn x(&self) -> i32 {
        self.data.x
    }

    pub fn y(&self) -> i32 {
        self.data.y
    }

    /// Folds the effect chain into the side effects of this entry.
    pub fn on_enter(&mut self) -> TileEnterResult {
        record_enter(&self.data);

        let mut result = TileEnterResult::default();
        for effect in &mut self.effects {
            result = effect.apply(result);
        }
        result
    }
}

// Telemetry axis: global toggle plus an enter counter. Off by default so
// gameplay paths pay a single relaxed load.
static ENTER_LOGGING: AtomicBool = AtomicBool::new(false);
static ENTER_COUNT: AtomicU64 = AtomicU64::new(0);

pub fn set_enter_logging(enabled: bool) {
    ENTER_LOGGING.store(enabled, Ordering::Relaxed);
}

pub fn enter_count() -> u64 {
    ENTER_COUNT.load(Ordering::Relaxed)
}

fn record_enter(data: &TileData) {
    if ENTER_LOGGING.load(Ordering::Relaxed) {
        ENTER_COUNT.fetch_add(1, Ordering::Relaxed);
        debug!(
            "tile enter ({}, {}) kind={:?} passable={}",
            data.x,
            data.y,
            data.kind,
            data.passable()
        );
    }
}
