//! The root composite owning the map and every live entity.
//!
//! The world is the single source of truth: all mutation goes through its
//! accessor methods while the caller holds the world lock, and every
//! enumeration hands out defensive copies so a handler removing a dead
//! enemy mid-broadcast cannot corrupt iteration elsewhere.

use std::collections::HashMap;

use log::info;
use shared::{EnemyKind, EnemySnapshot, PlayerSnapshot};

use crate::entity::{role_for_id, Enemy, Player};
use crate::map::Map;

/// Growth stage at which a plant can be harvested.
pub const PLANT_MATURE_STAGE: u8 = 2;
/// Simulation ticks per growth stage.
pub const GROWTH_TICKS: u32 = 40;

// Enemy ids live in their own range so they never collide with the
// connection-assigned player ids.
const ENEMY_ID_BASE: u32 = 1000;

#[derive(Debug, Clone)]
pub struct Plant {
    pub kind: String,
    pub stage: u8,
    ticks_in_stage: u32,
}

impl Plant {
    pub fn mature(&self) -> bool {
        self.stage >= PLANT_MATURE_STAGE
    }
}

/// A plant that advanced one growth stage during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrowthEvent {
    pub tile_x: i32,
    pub tile_y: i32,
    pub stage: u8,
}

pub struct World {
    map: Map,
    players: HashMap<u32, Player>,
    enemies: HashMap<u32, Enemy>,
    plants: HashMap<(i32, i32), Plant>,
    next_enemy_id: u32,
}

impl World {
    pub fn new(map: Map) -> Self {
        World {
            map,
            players: HashMap::new(),
            enemies: HashMap::new(),
            plants: HashMap::new(),
            next_enemy_id: ENEMY_ID_BASE,
        }
    }

    pub fn map(&self) -> &Map {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut Map {
        &mut self.map
    }

    /// Deterministic spawn point for a joining player: the map's passable
    /// tiles in row-major order, indexed by player id.
    pub fn spawn_point(&self, player_id: u32) -> (i32, i32) {
        let ordinal = player_id.wrapping_sub(1) as usize;
        let (tile_x, tile_y) = self
            .map
            .nth_passable(ordinal)
            .unwrap_or((0, 0));
        Map::tile_center(tile_x, tile_y)
    }

    /// Builds and registers a player for the given id at its spawn tile.
    pub fn spawn_player(&mut self, id: u32) -> Player {
        let role = role_for_id(id);
        let (x, y) = self.spawn_point(id);
        let player = Player::spawn(id, role, x, y);
        info!("player {} joined as {:?} at ({}, {})", id, role, x, y);
        self.players.insert(id, player.clone());
        player
    }

    pub fn add_player(&mut self, player: Player) {
        self.players.insert(player.id, player);
    }

    pub fn remove_player(&mut self, id: u32) -> Option<Player> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            info!("player {} left", id);
        }
        removed
    }

    pub fn player(&self, id: u32) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: u32) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    /// Copies of all live players.
    pub fn players(&self) -> Vec<Player> {
        self.players.values().cloned().collect()
    }

    pub fn spawn_enemy(&mut self, kind: EnemyKind, x: i32, y: i32) -> u32 {
        let id = self.next_enemy_id;
        self.next_enemy_id += 1;
        self.enemies.insert(id, Enemy::spawn(id, kind, x, y));
        id
    }

    /// Copies of all live enemies.
    pub fn enemies(&self) -> Vec<Enemy> {
        self.enemies.values().cloned().collect()
    }

    /// Applies damage to an enemy, removing it at zero health. Returns the
    /// remaining health, or None when the enemy was unknown or died.
    pub fn damage_enemy(&mut self, id: u32, amount: i32) -> Option<i32> {
        let enemy = self.enemies.get_mut(&id)?;
        enemy.health -= amount;
        if enemy.health <= 0 {
            let kind = enemy.kind;
            self.enemies.remove(&id);
            info!("enemy {} ({:?}) destroyed", id, kind);
            return None;
        }
        Some(self.enemies[&id].health)
    }

    pub fn plant_at(&self, tile_x: i32, tile_y: i32) -> Option<&Plant> {
        self.plants.get(&(tile_x, tile_y))
    }

    /// Registers a plant on an eligible tile. Refused (false) when the tile
    /// is out of bounds, not plantable, or already occupied.
    pub fn add_plant(&mut self, tile_x: i32, tile_y: i32, kind: String) -> bool {
        let plantable = self
            .map
            .tile(tile_x, tile_y)
            .map(|tile| tile.plantable())
            .unwrap_or(false);
        if !plantable || self.plants.contains_key(&(tile_x, tile_y)) {
            return false;
        }
        self.plants.insert(
            (tile_x, tile_y),
            Plant {
                kind,
                stage: 0,
                ticks_in_stage: 0,
            },
        );
        true
    }

    pub fn remove_plant(&mut self, tile_x: i32, tile_y: i32) -> Option<Plant> {
        self.plants.remove(&(tile_x, tile_y))
    }

    /// One simulation step: every owned entity updates exactly once, and
    /// plant growth task progress advances. Returns the growth events the
    /// caller should announce.
    pub fn update(&mut self) -> Vec<GrowthEvent> {
        let max_x = self.map.pixel_width();
        for enemy in self.enemies.values_mut() {
            enemy.update(max_x);
        }

        let mut events = Vec::new();
        for ((x, y), plant) in self.plants.iter_mut() {
            if plant.stage >= PLANT_MATURE_STAGE {
                continue;
            }
            plant.ticks_in_stage += 1;
            if plant.ticks_in_stage >= GROWTH_TICKS {
                plant.ticks_in_stage = 0;
                plant.stage += 1;
                events.push(GrowthEvent {
                    tile_x: *x,
                    tile_y: *y,
                    stage: plant.stage,
                });
            }
        }
        events
    }

    /// Wire-ready snapshots of the full entity population.
    pub fn snapshot(&self) -> (Vec<PlayerSnapshot>, Vec<EnemySnapshot>) {
        let mut players: Vec<PlayerSnapshot> =
            self.players.values().map(Player::snapshot).collect();
        players.sort_by_key(|p| p.id);
        let mut enemies: Vec<EnemySnapshot> =
            self.enemies.values().map(Enemy::snapshot).collect();
        enemies.sort_by_key(|e| e.id);
        (players, enemies)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}
