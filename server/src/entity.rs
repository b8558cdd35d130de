//! Players, enemies, and the factories that build them.

use shared::{EnemyKind, EnemySnapshot, PlayerSnapshot, Role, TILE_SIZE};

use crate::movement::MovementKind;
use crate::tiles::TileKind;

/// Typed accessor used by collision detection and event payloads instead of
/// reaching into concrete entity fields.
pub trait Positioned {
    fn id(&self) -> u32;
    fn position(&self) -> (i32, i32);
}

/// Role constants: health pool, flat attack damage, and display color.
#[derive(Debug, Clone, Copy)]
pub struct RoleSpec {
    pub health: i32,
    pub damage: i32,
    pub attack: shared::AttackKind,
    pub color: &'static str,
}

pub fn role_spec(role: Role) -> RoleSpec {
    match role {
        Role::Mage => RoleSpec {
            health: 80,
            damage: 12,
            attack: shared::AttackKind::Splash,
            color: "purple",
        },
        Role::Hunter => RoleSpec {
            health: 90,
            damage: 10,
            attack: shared::AttackKind::Arrow,
            color: "green",
        },
        Role::Defender => RoleSpec {
            health: 120,
            damage: 15,
            attack: shared::AttackKind::Slash,
            color: "red",
        },
    }
}

// Roles cycle deterministically with the joining player's id.
pub fn role_for_id(id: u32) -> Role {
    match (id.wrapping_sub(1)) % 3 {
        0 => Role::Hunter,
        1 => Role::Mage,
        _ => Role::Defender,
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub health: i32,
    pub role: Role,
    pub color: String,
    pub strategy: MovementKind,
    pub previous_tile: TileKind,
}

impl Player {
    pub fn spawn(id: u32, role: Role, x: i32, y: i32) -> Self {
        let spec = role_spec(role);
        Player {
            id,
            x,
            y,
            health: spec.health,
            role,
            color: spec.color.to_string(),
            strategy: MovementKind::Normal,
            previous_tile: TileKind::Grass,
        }
    }

    /// Duplicate created by an edible tile: baseline role attributes only,
    /// unspecified state resets to its defaults.
    pub fn clone_of(&self, clone_id: u32) -> Player {
        Player::spawn(clone_id, self.role, self.x, self.y)
    }

    /// Tile coordinates of the player's center.
    pub fn tile(&self) -> (i32, i32) {
        (self.x / TILE_SIZE, self.y / TILE_SIZE)
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            x: self.x,
            y: self.y,
            health: self.health,
            role: self.role,
            color: self.color.clone(),
        }
    }
}

impl Positioned for Player {
    fn id(&self) -> u32 {
        self.id
    }

    fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}

/// Enemy constants: health pool plus roaming amplitude and step, in pixels.
#[derive(Debug, Clone, Copy)]
pub struct EnemySpec {
    pub health: i32,
    pub roam_amplitude: i32,
    pub roam_step: i32,
}

pub fn enemy_spec(kind: EnemyKind) -> EnemySpec {
    match kind {
        EnemyKind::Slime => EnemySpec {
            health: 30,
            roam_amplitude: 2 * TILE_SIZE,
            roam_step: 4,
        },
        EnemyKind::Bat => EnemySpec {
            health: 20,
            roam_amplitude: 3 * TILE_SIZE,
            roam_step: 6,
        },
    }
}

#[derive(Debug, Clone)]
pub struct Enemy {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub health: i32,
    pub kind: EnemyKind,
    origin_x: i32,
    direction: i32,
}

impl Enemy {
    pub fn spawn(id: u32, kind: EnemyKind, x: i32, y: i32) -> Self {
        let spec = enemy_spec(kind);
        Enemy {
            id,
            x,
            y,
            health: spec.health,
            kind,
            origin_x: x,
            direction: 1,
        }
    }

    /// One simulation step of roaming: bounded horizontal oscillation
    /// around the spawn point, clamped to the world's pixel bounds.
    pub fn update(&mut self, max_x: i32) {
        let spec = enemy_spec(self.kind);
        self.x += self.direction * spec.roam_step;

        if (self.x - self.origin_x).abs() >= spec.roam_amplitude {
            self.direction = -self.direction;
        }
        if self.x <= 0 || self.x >= max_x {
            self.x = self.x.clamp(0, max_x);
            self.direction = -self.direction;
        }
    }

    pub fn snapshot(&self) -> EnemySnapshot {
        EnemySnapshot {
            id: self.id,
            x: self.x,
            y: self.y,
            health: self.health,
            kind: self.kind,
        }
    }
}

impl Positioned for Enemy {
    fn id(&self) -> u32 {
        self.id
    }

    fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_cycle_with_id() {
        assert_eq!(role_for_id(1), Role::Hunter);
        assert_eq!(role_for_id(2), Role::Mage);
        assert_eq!(role_for_id(3), Role::Defender);
        assert_eq!(role_for_id(4), Role::Hunter);
    }

    #[test]
    fn test_player_spawn_uses_role_constants() {
        let player = Player::spawn(1, Role::Defender, 48, 48);
        assert_eq!(player.health, role_spec(Role::Defender).health);
        assert_eq!(player.color, "red");
        assert_eq!(player.strategy, MovementKind::Normal);
        assert_eq!(player.tile(), (1, 1));
    }

    #[test]
    fn test_clone_resets_to_baseline() {
        let mut original = Player::spawn(1, Role::Mage, 100, 100);
        original.health = 5;
        original.strategy = MovementKind::Swim;
        original.previous_tile = TileKind::Water;

        let copy = original.clone_of(7);
        assert_eq!(copy.id, 7);
        assert_eq!(copy.role, Role::Mage);
        assert_eq!(copy.health, role_spec(Role::Mage).health);
        assert_eq!(copy.strategy, MovementKind::Normal);
        assert_eq!((copy.x, copy.y), (100, 100));
    }

    #[test]
    fn test_enemy_roams_within_bounds() {
        let mut enemy = Enemy::spawn(1000, EnemyKind::Slime, 200, 200);
        let spec = enemy_spec(EnemyKind::Slime);

        for _ in 0..500 {
            enemy.update(640);
            assert!((enemy.x - 200).abs() <= spec.roam_amplitude + spec.roam_step);
            assert!(enemy.x >= 0 && enemy.x <= 640);
            // Roaming never leaves the row
            assert_eq!(enemy.y, 200);
        }
    }

    #[test]
    fn test_enemy_oscillates_back() {
        let mut enemy = Enemy::spawn(1000, EnemyKind::Bat, 100, 50);
        let mut saw_left = false;
        let mut saw_right = false;
        for _ in 0..200 {
            enemy.update(1000);
            if enemy.x > 100 {
                saw_right = true;
            }
            if enemy.x < 100 {
                saw_left = true;
            }
        }
        assert!(saw_left && saw_right);
    }

    #[test]
    fn test_positioned_accessors() {
        let player = Player::spawn(3, Role::Hunter, 10, 20);
        assert_eq!(Positioned::id(&player), 3);
        assert_eq!(player.position(), (10, 20));

        let enemy = Enemy::spawn(1001, EnemyKind::Bat, 30, 40);
        assert_eq!(Positioned::id(&enemy), 1001);
        assert_eq!(enemy.position(), (30, 40));
    }
}
