//! The coordination hub: the single serialization point for every
//! externally triggered world mutation.
//!
//! Movement, attacks, planting, harvesting and undo all enter here, run
//! against the world under its lock, and leave as broadcasts. Collision
//! events go out through a registry of dynamically registered observers so
//! the hub never holds a concrete reference to any consumer; a failing
//! observer is logged and never prevents the remaining ones from running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use tokio::sync::RwLock;

use shared::{aabb_overlap, midpoint, Message, ENTITY_SIZE, TILE_SIZE};

use crate::combat::{resolve_attack, CooldownTracker, DamageContext, DamagePipeline};
use crate::entity::{role_spec, Positioned};
use crate::error::ServerError;
use crate::movement::{transition, MovementKind};
use crate::network::Broadcaster;
use crate::tiles::TileKind;
use crate::utils::now_millis;
use crate::world::World;

/// Opaque, restorable capture of a player's position and movement
/// strategy, pushed before every state-changing movement command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveSnapshot {
    x: i32,
    y: i32,
    strategy: MovementKind,
    previous_tile: TileKind,
}

/// Payload delivered to collision observers for one overlapping pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionEvent {
    pub a_id: u32,
    pub a_kind: String,
    pub b_id: u32,
    pub b_kind: String,
    pub mid_x: i32,
    pub mid_y: i32,
}

/// Collision-event consumers register through the hub without either side
/// knowing the other's concrete type.
pub trait CollisionObserver: Send + Sync {
    fn on_collision(&self, event: &CollisionEvent) -> Result<(), ServerError>;
}

#[derive(Default)]
struct ObserverRegistry {
    next_token: u64,
    observers: Vec<(u64, Arc<dyn CollisionObserver>)>,
}

impl ObserverRegistry {
    fn register(&mut self, observer: Arc<dyn CollisionObserver>) -> u64 {
        self.next_token += 1;
        self.observers.push((self.next_token, observer));
        self.next_token
    }

    fn unregister(&mut self, token: u64) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(t, _)| *t != token);
        self.observers.len() != before
    }

    /// Defensive copy taken before iteration, so observers may register or
    /// unregister while a notification round is in flight.
    fn snapshot(&self) -> Vec<Arc<dyn CollisionObserver>> {
        self.observers
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }
}

pub struct Hub {
    world: RwLock<World>,
    histories: RwLock<HashMap<u32, Vec<MoveSnapshot>>>,
    cooldowns: RwLock<CooldownTracker>,
    observers: RwLock<ObserverRegistry>,
    pipeline: Option<DamagePipeline>,
    connections: Broadcaster,
    next_player_id: AtomicU32,
}

impl Hub {
    /// Builds the hub around a fully prepared world. With a pipeline the
    /// attack execution runs every hit through the damage-modifier chain;
    /// without one, the role's flat damage applies unchanged.
    pub fn new(world: World, pipeline: Option<DamagePipeline>, connections: Broadcaster) -> Self {
        Hub {
            world: RwLock::new(world),
            histories: RwLock::new(HashMap::new()),
            cooldowns: RwLock::new(CooldownTracker::new()),
            observers: RwLock::new(ObserverRegistry::default()),
            pipeline,
            connections,
            next_player_id: AtomicU32::new(1),
        }
    }

    /// Allocates the next player id and spawns the player at its
    /// deterministic spawn tile.
    pub async fn register_player(&self) -> u32 {
        let id = self.next_player_id.fetch_add(1, Ordering::SeqCst);
        self.world.write().await.spawn_player(id);
        id
    }

    /// Removes a disconnecting player and tells the survivors.
    pub async fn remove_player(&self, id: u32) {
        self.world.write().await.remove_player(id);
        self.histories.write().await.remove(&id);
        self.cooldowns.write().await.forget(id);
        self.broadcast_state().await;
    }

    pub async fn register_collision_observer(&self, observer: Arc<dyn CollisionObserver>) -> u64 {
        self.observers.write().await.register(observer)
    }

    pub async fn unregister_collision_observer(&self, token: u64) -> bool {
        self.observers.write().await.unregister(token)
    }

    /// Dispatches one inbound message. The acting player is always the
    /// connection's player; ids embedded in the message are client claims
    /// and are not trusted.
    pub async fn handle_message(&self, player_id: u32, message: Message) {
        match message {
            Message::Input { dx, dy } => self.handle_input(player_id, dx, dy).await,
            Message::Attack {
                click_x, click_y, ..
            } => self.handle_attack(player_id, click_x, click_y).await,
            Message::PlantAction {
                tile_x,
                tile_y,
                plant,
                ..
            } => self.handle_plant(player_id, tile_x, tile_y, plant).await,
            Message::HarvestAction { tile_x, tile_y, .. } => {
                self.handle_harvest(player_id, tile_x, tile_y).await
            }
            Message::Undo => self.handle_undo(player_id).await,
            Message::Ping => self.connections.send_to(player_id, &Message::Pong),
            other => {
                warn!(
                    "connection {} sent a server-to-client message: {:?}",
                    player_id, other
                );
                self.connections.send_to(
                    player_id,
                    &Message::Error {
                        code: "unexpected_type".to_string(),
                        detail: "message kind is server-to-client only".to_string(),
                    },
                );
            }
        }
    }

    /// Movement: undo snapshot, destination from the current strategy's
    /// speed, tile-enter protocol, then collision detection. Illegal moves
    /// are refused silently with no state change.
    async fn handle_input(&self, player_id: u32, dx: i32, dy: i32) {
        if !(-1..=1).contains(&dx) || !(-1..=1).contains(&dy) || (dx == 0 && dy == 0) {
            return;
        }

        let mut pending = Vec::new();
        let mut collisions = Vec::new();
        {
            let mut world = self.world.write().await;
            let mut histories = self.histories.write().await;

            let (speed, old_x, old_y, old_tile, old_strategy, old_previous) =
                match world.player(player_id) {
                    Some(player) => (
                        player.strategy.speed(),
                        player.x,
                        player.y,
                        player.tile(),
                        player.strategy,
                        player.previous_tile,
                    ),
                    None => return,
                };

            histories.entry(player_id).or_default().push(MoveSnapshot {
                x: old_x,
                y: old_y,
                strategy: old_strategy,
                previous_tile: old_previous,
            });

            let dest_x = old_x + dx * speed;
            let dest_y = old_y + dy * speed;
            let (dest_tx, dest_ty) = (dest_x / TILE_SIZE, dest_y / TILE_SIZE);

            if dest_x < 0 || dest_y < 0 || !world.map().passable(dest_tx, dest_ty) {
                // Refused: roll the snapshot back so undo history only ever
                // holds moves that happened.
                if let Some(history) = histories.get_mut(&player_id) {
                    history.pop();
                }
                return;
            }

            if let Some(player) = world.player_mut(player_id) {
                player.x = dest_x;
                player.y = dest_y;
            }

            if (dest_tx, dest_ty) != old_tile {
                let left_kind = world
                    .map()
                    .kind_at(old_tile.0, old_tile.1)
                    .unwrap_or(TileKind::Grass);
                let entered_kind = world
                    .map()
                    .kind_at(dest_tx, dest_ty)
                    .unwrap_or(TileKind::Grass);

                let result = match world.map_mut().tile_mut(dest_tx, dest_ty) {
                    Some(tile) => tile.on_enter(),
                    None => return,
                };

                let next_strategy = result
                    .strategy_override()
                    .unwrap_or_else(|| transition(left_kind, entered_kind, old_strategy));
                if let Some(player) = world.player_mut(player_id) {
                    player.strategy = next_strategy;
                    player.previous_tile = left_kind;
                }

                if result.replace_with_grass {
                    world.map_mut().replace(dest_tx, dest_ty, TileKind::Grass);
                    pending.push(Message::TileUpdate {
                        x: dest_tx,
                        y: dest_ty,
                        tile: TileKind::Grass.digit(),
                    });
                }

                if result.spawn_clone {
                    let clone_id = self.next_player_id.fetch_add(1, Ordering::SeqCst);
                    let clone = world.player(player_id).map(|player| {
                        let mut clone = player.clone_of(clone_id);
                        clone.x = old_x;
                        clone.y = old_y;
                        clone
                    });
                    if let Some(clone) = clone {
                        info!("player {} duplicated into player {}", player_id, clone_id);
                        world.add_player(clone);
                        pending.push(Message::CopyMade {
                            source_id: player_id,
                            clone_id,
                        });
                    }
                }
            }

            // Pairwise collision detection over the current player set.
            let players = world.players();
            for i in 0..players.len() {
                for j in (i + 1)..players.len() {
                    let (ax, ay) = players[i].position();
                    let (bx, by) = players[j].position();
                    if aabb_overlap(ax, ay, bx, by, ENTITY_SIZE) {
                        let (mid_x, mid_y) = midpoint(ax, ay, bx, by);
                        collisions.push(CollisionEvent {
                            a_id: players[i].id(),
                            a_kind: "player".to_string(),
                            b_id: players[j].id(),
                            b_kind: "player".to_string(),
                            mid_x,
                            mid_y,
                        });
                    }
                }
            }
        }

        for message in &pending {
            self.connections.broadcast(message);
        }
        if !collisions.is_empty() {
            self.notify_collisions(&collisions).await;
        }
        self.broadcast_state().await;
    }

    /// Attack: cooldown gate, role-strategy resolution, one animation
    /// broadcast regardless of hit count, then a full state broadcast
    /// regardless of hit or miss.
    async fn handle_attack(&self, player_id: u32, click_x: i32, click_y: i32) {
        let (player, enemies) = {
            let world = self.world.read().await;
            match world.player(player_id) {
                Some(player) => (player.clone(), world.enemies()),
                None => return,
            }
        };

        let attack_kind = role_spec(player.role).attack;
        {
            let mut cooldowns = self.cooldowns.write().await;
            if !cooldowns.ready(player_id, attack_kind, Instant::now()) {
                debug!("player {} attack still on cooldown", player_id);
                return;
            }
        }

        let outcome = resolve_attack(&player, &enemies, click_x, click_y);
        self.connections.broadcast(&Message::AttackAnimation {
            player_id,
            impact_x: outcome.impact_x,
            impact_y: outcome.impact_y,
            angle: outcome.angle,
            radius: outcome.radius,
            kind: outcome.kind,
        });

        {
            let mut world = self.world.write().await;
            for enemy_id in &outcome.hits {
                let target = match enemies.iter().find(|enemy| enemy.id == *enemy_id) {
                    Some(enemy) => enemy.kind,
                    None => continue,
                };
                let base = role_spec(player.role).damage;
                let amount = match &self.pipeline {
                    Some(pipeline) => {
                        let mut ctx =
                            DamageContext::new(base, player.role, target, outcome.kind);
                        pipeline.run(&mut ctx);
                        for effect in &ctx.effects {
                            debug!("damage on enemy {}: {}", enemy_id, effect);
                        }
                        ctx.rounded()
                    }
                    None => base,
                };
                world.damage_enemy(*enemy_id, amount);
            }
        }

        self.broadcast_state().await;
    }

    /// Planting: bounds and eligibility are validated before any mutation;
    /// a refused request changes nothing and answers nothing.
    async fn handle_plant(&self, player_id: u32, tile_x: i32, tile_y: i32, plant: String) {
        let planted = self
            .world
            .write()
            .await
            .add_plant(tile_x, tile_y, plant.clone());
        if !planted {
            return;
        }
        info!(
            "player {} planted {} at ({}, {})",
            player_id, plant, tile_x, tile_y
        );
        self.connections.broadcast(&Message::PlantPlanted {
            tile_x,
            tile_y,
            plant,
        });
    }

    /// Harvest: only a mature plant comes out; the tile transitions to
    /// grass. Anything else leaves the world untouched with no broadcast.
    async fn handle_harvest(&self, player_id: u32, tile_x: i32, tile_y: i32) {
        let harvested = {
            let mut world = self.world.write().await;
            let mature = world
                .plant_at(tile_x, tile_y)
                .map(|plant| plant.mature())
                .unwrap_or(false);
            if !mature {
                None
            } else {
                let plant = world.remove_plant(tile_x, tile_y);
                world.map_mut().replace(tile_x, tile_y, TileKind::Grass);
                plant
            }
        };

        let plant = match harvested {
            Some(plant) => plant,
            None => return,
        };
        info!(
            "player {} harvested {} at ({}, {})",
            player_id, plant.kind, tile_x, tile_y
        );
        self.connections.broadcast(&Message::PlantHarvested {
            tile_x,
            tile_y,
            plant: plant.kind,
        });
        self.connections.broadcast(&Message::TileUpdate {
            x: tile_x,
            y: tile_y,
            tile: TileKind::Grass.digit(),
        });
    }

    /// Undo: pop the last snapshot and restore it. An empty history is a
    /// no-op beyond the command result.
    async fn handle_undo(&self, player_id: u32) {
        let snapshot = self
            .histories
            .write()
            .await
            .get_mut(&player_id)
            .and_then(|history| history.pop());

        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                self.connections.send_to(
                    player_id,
                    &Message::CommandResult {
                        ok: false,
                        detail: "nothing to undo".to_string(),
                    },
                );
                return;
            }
        };

        {
            let mut world = self.world.write().await;
            if let Some(player) = world.player_mut(player_id) {
                player.x = snapshot.x;
                player.y = snapshot.y;
                player.strategy = snapshot.strategy;
                player.previous_tile = snapshot.previous_tile;
            }
        }

        self.connections.send_to(
            player_id,
            &Message::CommandResult {
                ok: true,
                detail: "undo applied".to_string(),
            },
        );
        self.broadcast_state().await;
    }

    /// One fixed-period simulation step: every entity updates once, growth
    /// progress is announced, and the full state goes out.
    pub async fn tick(&self) {
        let growth = self.world.write().await.update();
        for event in growth {
            self.connections.broadcast(&Message::PlantUpdate {
                tile_x: event.tile_x,
                tile_y: event.tile_y,
                stage: event.stage,
            });
        }
        self.broadcast_state().await;
    }

    /// Full-state fan-out to every live connection.
    pub async fn broadcast_state(&self) {
        let (players, enemies) = self.world.read().await.snapshot();
        self.connections.broadcast(&Message::State {
            timestamp: now_millis(),
            players,
            enemies,
        });
    }

    async fn notify_collisions(&self, events: &[CollisionEvent]) {
        let observers = self.observers.read().await.snapshot();
        for event in events {
            for observer in &observers {
                if let Err(e) = observer.on_collision(event) {
                    error!("collision observer failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Map;
    use crate::world::{GROWTH_TICKS, PLANT_MATURE_STAGE};
    use shared::{decode, EnemyKind, Role};
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    fn grass_map(width: usize, height: usize) -> Map {
        let mut text = format!("{}\n{}\n", width, height);
        for _ in 0..height {
            text.push_str(&"0".repeat(width));
            text.push('\n');
        }
        Map::parse(&text).unwrap()
    }

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    /// Hub with one registered player and a captured outbound queue.
    async fn hub_with_player(
        world: World,
    ) -> (Hub, u32, mpsc::UnboundedReceiver<String>) {
        let connections = Broadcaster::new();
        let hub = Hub::new(world, None, connections.clone());
        let id = hub.register_player().await;
        let (tx, rx) = mpsc::unbounded_channel();
        connections.register(id, test_addr(), tx);
        (hub, id, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(line) = rx.try_recv() {
            messages.push(decode(&line).unwrap().body);
        }
        messages
    }

    struct CountingObserver(AtomicUsize);

    impl CollisionObserver for CountingObserver {
        fn on_collision(&self, _event: &CollisionEvent) -> Result<(), ServerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingObserver;

    impl CollisionObserver for FailingObserver {
        fn on_collision(&self, _event: &CollisionEvent) -> Result<(), ServerError> {
            Err(ServerError::Observer("deliberate failure".to_string()))
        }
    }

    #[tokio::test]
    async fn test_input_advances_by_strategy_speed() {
        let (hub, id, mut rx) = hub_with_player(World::new(grass_map(8, 8))).await;
        let start = hub.world.read().await.player(id).unwrap().x;

        hub.handle_input(id, 1, 0).await;

        let player = hub.world.read().await.player(id).unwrap().clone();
        assert_eq!(player.x, start + MovementKind::Normal.speed());

        let messages = drain(&mut rx);
        assert!(messages
            .iter()
            .any(|m| matches!(m, Message::State { .. })));
    }

    #[tokio::test]
    async fn test_invalid_input_vector_is_silently_ignored() {
        let (hub, id, mut rx) = hub_with_player(World::new(grass_map(8, 8))).await;
        let start = hub.world.read().await.player(id).unwrap().x;

        hub.handle_input(id, 2, 0).await;
        hub.handle_input(id, 0, 0).await;

        assert_eq!(hub.world.read().await.player(id).unwrap().x, start);
        assert!(drain(&mut rx).is_empty());
        assert!(hub.histories.read().await.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_move_into_rock_is_refused_without_history_entry() {
        // Player spawns on the single grass tile; rock to the right
        let map = Map::parse("2\n1\n02\n").unwrap();
        let (hub, id, mut rx) = hub_with_player(World::new(map)).await;

        // First step stays inside tile 0, second would cross into the rock
        hub.handle_input(id, 1, 0).await;
        let after_first = hub.world.read().await.player(id).unwrap().x;
        drain(&mut rx);

        hub.handle_input(id, 1, 0).await;
        assert_eq!(hub.world.read().await.player(id).unwrap().x, after_first);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(hub.histories.read().await.get(&id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_two_moves_then_undo_restores_previous_position() {
        let (hub, id, mut rx) = hub_with_player(World::new(grass_map(8, 8))).await;

        hub.handle_input(id, 1, 0).await;
        let after_first = hub.world.read().await.player(id).unwrap().x;
        hub.handle_input(id, 1, 0).await;
        drain(&mut rx);

        hub.handle_undo(id).await;

        assert_eq!(hub.world.read().await.player(id).unwrap().x, after_first);
        let messages = drain(&mut rx);
        assert!(messages
            .iter()
            .any(|m| matches!(m, Message::CommandResult { ok: true, .. })));
    }

    #[tokio::test]
    async fn test_undo_with_empty_history_is_a_noop() {
        let (hub, id, mut rx) = hub_with_player(World::new(grass_map(8, 8))).await;
        let start = hub.world.read().await.player(id).unwrap().x;

        hub.handle_undo(id).await;

        assert_eq!(hub.world.read().await.player(id).unwrap().x, start);
        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            messages[0],
            Message::CommandResult { ok: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_entering_water_swaps_to_swim_and_back() {
        // Grass, water, grass in a row
        let map = Map::parse("3\n1\n010\n").unwrap();
        let (hub, id, _rx) = hub_with_player(World::new(map)).await;

        // Walk right until the water tile is entered
        for _ in 0..6 {
            hub.handle_input(id, 1, 0).await;
        }
        let player = hub.world.read().await.player(id).unwrap().clone();
        assert_eq!(player.tile(), (1, 0));
        assert_eq!(player.strategy, MovementKind::Swim);

        // Keep going right onto land again
        for _ in 0..6 {
            hub.handle_input(id, 1, 0).await;
        }
        let player = hub.world.read().await.player(id).unwrap().clone();
        assert_eq!(player.tile(), (2, 0));
        assert_eq!(player.strategy, MovementKind::Normal);
    }

    #[tokio::test]
    async fn test_fish_tile_clones_player_and_becomes_grass() {
        let map = Map::parse("3\n1\n006\n").unwrap();
        let (hub, id, mut rx) = hub_with_player(World::new(map)).await;

        for _ in 0..6 {
            hub.handle_input(id, 1, 0).await;
        }
        let messages = drain(&mut rx);

        assert!(messages
            .iter()
            .any(|m| matches!(m, Message::CopyMade { source_id, .. } if *source_id == id)));
        assert!(messages
            .iter()
            .any(|m| matches!(m, Message::TileUpdate { x: 2, y: 0, tile: 0 })));

        let world = hub.world.read().await;
        assert_eq!(world.player_count(), 2);
        assert_eq!(world.map().kind_at(2, 0), Some(TileKind::Grass));

        // The clone carries baseline role attributes
        let players = world.players();
        let clone = players.iter().find(|p| p.id != id).unwrap();
        assert_eq!(clone.role, Role::Hunter);
        assert_eq!(clone.strategy, MovementKind::Normal);
    }

    #[tokio::test]
    async fn test_consumed_fish_tile_does_not_clone_again() {
        let map = Map::parse("3\n1\n006\n").unwrap();
        let (hub, id, mut rx) = hub_with_player(World::new(map)).await;

        for _ in 0..6 {
            hub.handle_input(id, 1, 0).await;
        }
        drain(&mut rx);
        let count_after_first = hub.world.read().await.player_count();

        // Walk off and back onto the (now grass) tile
        hub.handle_input(id, -1, 0).await;
        for _ in 0..4 {
            hub.handle_input(id, 1, 0).await;
        }

        assert_eq!(hub.world.read().await.player_count(), count_after_first);
        assert!(!drain(&mut rx)
            .iter()
            .any(|m| matches!(m, Message::CopyMade { .. })));
    }

    #[tokio::test]
    async fn test_collision_fires_once_per_overlapping_pair() {
        let (hub, id, _rx) = hub_with_player(World::new(grass_map(8, 8))).await;
        let second = hub.register_player().await;
        let third = hub.register_player().await;

        // Stack everyone on the same spot
        {
            let mut world = hub.world.write().await;
            for pid in [id, second, third] {
                if let Some(player) = world.player_mut(pid) {
                    player.x = 100;
                    player.y = 100;
                }
            }
        }

        let counter = Arc::new(CountingObserver(AtomicUsize::new(0)));
        hub.register_collision_observer(counter.clone()).await;

        hub.handle_input(id, 1, 0).await;

        // C(3,2) pairs, one event each
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failing_observer_does_not_stop_the_rest() {
        let (hub, id, _rx) = hub_with_player(World::new(grass_map(8, 8))).await;
        let second = hub.register_player().await;
        {
            let mut world = hub.world.write().await;
            for pid in [id, second] {
                if let Some(player) = world.player_mut(pid) {
                    player.x = 100;
                    player.y = 100;
                }
            }
        }

        hub.register_collision_observer(Arc::new(FailingObserver)).await;
        let counter = Arc::new(CountingObserver(AtomicUsize::new(0)));
        hub.register_collision_observer(counter.clone()).await;

        hub.handle_input(id, 1, 0).await;

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregistered_observer_stops_receiving() {
        let (hub, id, _rx) = hub_with_player(World::new(grass_map(8, 8))).await;
        let second = hub.register_player().await;
        {
            let mut world = hub.world.write().await;
            for pid in [id, second] {
                if let Some(player) = world.player_mut(pid) {
                    player.x = 100;
                    player.y = 100;
                }
            }
        }

        let counter = Arc::new(CountingObserver(AtomicUsize::new(0)));
        let token = hub.register_collision_observer(counter.clone()).await;
        assert!(hub.unregister_collision_observer(token).await);
        assert!(!hub.unregister_collision_observer(token).await);

        hub.handle_input(id, 1, 0).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_attack_hits_enemy_and_applies_flat_damage() {
        let mut world = World::new(grass_map(8, 8));
        let enemy_id = world.spawn_enemy(EnemyKind::Slime, 64, 16);
        let (hub, id, mut rx) = hub_with_player(world).await;

        // Player 1 is a hunter; fire straight through the slime
        hub.handle_attack(id, 112, 16).await;

        let messages = drain(&mut rx);
        let animations: Vec<_> = messages
            .iter()
            .filter(|m| matches!(m, Message::AttackAnimation { .. }))
            .collect();
        assert_eq!(animations.len(), 1);

        let world = hub.world.read().await;
        let enemy = world.enemies().into_iter().find(|e| e.id == enemy_id).unwrap();
        assert_eq!(enemy.health, 30 - role_spec(Role::Hunter).damage);
    }

    #[tokio::test]
    async fn test_attack_on_cooldown_is_silently_ignored() {
        let mut world = World::new(grass_map(8, 8));
        world.spawn_enemy(EnemyKind::Slime, 64, 16);
        let (hub, id, mut rx) = hub_with_player(world).await;

        hub.handle_attack(id, 112, 16).await;
        hub.handle_attack(id, 112, 16).await;

        let animations = drain(&mut rx)
            .into_iter()
            .filter(|m| matches!(m, Message::AttackAnimation { .. }))
            .count();
        assert_eq!(animations, 1);
    }

    #[tokio::test]
    async fn test_attack_miss_still_broadcasts_state() {
        let (hub, id, mut rx) = hub_with_player(World::new(grass_map(8, 8))).await;

        hub.handle_attack(id, 112, 16).await;

        let messages = drain(&mut rx);
        assert!(messages
            .iter()
            .any(|m| matches!(m, Message::AttackAnimation { .. })));
        assert!(messages
            .iter()
            .any(|m| matches!(m, Message::State { .. })));
    }

    #[tokio::test]
    async fn test_plant_and_harvest_lifecycle() {
        let map = Map::parse("3\n1\n055\n").unwrap();
        let (hub, id, mut rx) = hub_with_player(World::new(map)).await;

        hub.handle_plant(id, 1, 0, "carrot".to_string()).await;
        assert!(drain(&mut rx)
            .iter()
            .any(|m| matches!(m, Message::PlantPlanted { .. })));

        // Not mature yet: harvesting changes nothing and answers nothing
        hub.handle_harvest(id, 1, 0).await;
        assert!(drain(&mut rx).is_empty());
        assert!(hub.world.read().await.plant_at(1, 0).is_some());

        // Let it grow to maturity
        for _ in 0..(GROWTH_TICKS * u32::from(PLANT_MATURE_STAGE)) {
            hub.world.write().await.update();
        }

        hub.handle_harvest(id, 1, 0).await;
        let messages = drain(&mut rx);
        assert!(messages
            .iter()
            .any(|m| matches!(m, Message::PlantHarvested { .. })));
        assert!(messages
            .iter()
            .any(|m| matches!(m, Message::TileUpdate { x: 1, y: 0, tile: 0 })));

        let world = hub.world.read().await;
        assert!(world.plant_at(1, 0).is_none());
        assert_eq!(world.map().kind_at(1, 0), Some(TileKind::Grass));
    }

    #[tokio::test]
    async fn test_plant_on_grass_is_refused() {
        let map = Map::parse("3\n1\n055\n").unwrap();
        let (hub, id, mut rx) = hub_with_player(World::new(map)).await;

        hub.handle_plant(id, 0, 0, "carrot".to_string()).await;
        hub.handle_plant(id, 9, 9, "carrot".to_string()).await;

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_ping_answers_pong() {
        let (hub, id, mut rx) = hub_with_player(World::new(grass_map(8, 8))).await;

        hub.handle_message(id, Message::Ping).await;

        assert_eq!(drain(&mut rx), vec![Message::Pong]);
    }

    #[tokio::test]
    async fn test_client_sending_server_message_gets_an_error() {
        let (hub, id, mut rx) = hub_with_player(World::new(grass_map(8, 8))).await;

        hub.handle_message(id, Message::Welcome { id: 99 }).await;

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], Message::Error { .. }));
    }

    #[tokio::test]
    async fn test_remove_player_cleans_up_and_notifies_survivors() {
        let (hub, id, mut rx) = hub_with_player(World::new(grass_map(8, 8))).await;
        hub.handle_input(id, 1, 0).await;
        drain(&mut rx);

        hub.remove_player(id).await;

        assert_eq!(hub.world.read().await.player_count(), 0);
        assert!(hub.histories.read().await.get(&id).is_none());
        assert!(drain(&mut rx)
            .iter()
            .any(|m| matches!(m, Message::State { .. })));
    }

    #[tokio::test]
    async fn test_tick_announces_growth() {
        let map = Map::parse("3\n1\n055\n").unwrap();
        let (hub, id, mut rx) = hub_with_player(World::new(map)).await;
        hub.handle_plant(id, 1, 0, "carrot".to_string()).await;
        drain(&mut rx);

        for _ in 0..GROWTH_TICKS {
            hub.tick().await;
        }

        let messages = drain(&mut rx);
        assert!(messages
            .iter()
            .any(|m| matches!(m, Message::PlantUpdate { stage: 1, .. })));
    }
}
