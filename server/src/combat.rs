//! Attack resolution and the damage-modifier pipeline.
//!
//! Attack strategies are pure geometry: from the attacker's position and a
//! click point they compute the (possibly clamped) impact point, the facing
//! angle, and the set of enemies hit. The damage pipeline is an ordered
//! chain of stages threaded over a [`DamageContext`]; difficulty presets
//! vary only the configured parameters, never the stage order.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use shared::{
    AttackKind, EnemyKind, Role, ENTITY_SIZE, MELEE_HALF_ANGLE, MELEE_REACH, RANGED_REACH,
    SPLASH_RADIUS,
};

use crate::entity::{role_spec, Enemy, Player};
use crate::error::ServerError;

/// Minimum interval between shots, tracked per player for every ranged
/// attack kind.
pub const ARROW_COOLDOWN: Duration = Duration::from_millis(400);
pub const SPLASH_COOLDOWN: Duration = Duration::from_millis(700);

/// Everything the hub needs after resolving one attack: the animation
/// payload plus the ids of the enemies hit.
#[derive(Debug, Clone, PartialEq)]
pub struct AttackOutcome {
    pub kind: AttackKind,
    pub impact_x: i32,
    pub impact_y: i32,
    pub angle: f32,
    pub radius: i32,
    pub hits: Vec<u32>,
}

/// Resolves the acting player's role strategy against the current enemy
/// population. Pure: no world mutation happens here.
pub fn resolve_attack(player: &Player, enemies: &[Enemy], click_x: i32, click_y: i32) -> AttackOutcome {
    match role_spec(player.role).attack {
        AttackKind::Slash => melee_cone(player, enemies, click_x, click_y),
        AttackKind::Arrow => arrow_line(player, enemies, click_x, click_y),
        AttackKind::Splash => splash_circle(player, enemies, click_x, click_y),
    }
}

/// Melee cone: one tile of reach, hits every enemy whose bearing from the
/// attacker lies within ±45° of the bearing toward the clamped click point.
fn melee_cone(player: &Player, enemies: &[Enemy], click_x: i32, click_y: i32) -> AttackOutcome {
    let (impact_x, impact_y, angle) =
        clamp_to_reach(player.x, player.y, click_x, click_y, MELEE_REACH);

    let hits = enemies
        .iter()
        .filter(|enemy| {
            let dx = (enemy.x - player.x) as f32;
            let dy = (enemy.y - player.y) as f32;
            let distance = (dx * dx + dy * dy).sqrt();
            if distance > MELEE_REACH as f32 {
                return false;
            }
            let bearing = dy.atan2(dx);
            angle_difference(bearing, angle).abs() <= MELEE_HALF_ANGLE
        })
        .map(|enemy| enemy.id)
        .collect();

    AttackOutcome {
        kind: AttackKind::Slash,
        impact_x,
        impact_y,
        angle,
        radius: MELEE_REACH,
        hits,
    }
}

/// Projectile line: the arrow flies three tile lengths along the click
/// direction. An enemy is hit when its projection onto the segment lies in
/// [0, 1] and its perpendicular distance is within its half-width.
fn arrow_line(player: &Player, enemies: &[Enemy], click_x: i32, click_y: i32) -> AttackOutcome {
    let (px, py) = (player.x as f32, player.y as f32);
    let (_, _, angle) = clamp_to_reach(player.x, player.y, click_x, click_y, RANGED_REACH);

    let end_x = px + angle.cos() * RANGED_REACH as f32;
    let end_y = py + angle.sin() * RANGED_REACH as f32;
    let (seg_x, seg_y) = (end_x - px, end_y - py);
    let length_sq = seg_x * seg_x + seg_y * seg_y;
    let half_width = (ENTITY_SIZE / 2) as f32;

    let hits = enemies
        .iter()
        .filter(|enemy| {
            let (wx, wy) = (enemy.x as f32 - px, enemy.y as f32 - py);
            let t = (wx * seg_x + wy * seg_y) / length_sq;
            if !(0.0..=1.0).contains(&t) {
                return false;
            }
            let perpendicular = (wx * seg_y - wy * seg_x).abs() / length_sq.sqrt();
            perpendicular <= half_width
        })
        .map(|enemy| enemy.id)
        .collect();

    AttackOutcome {
        kind: AttackKind::Arrow,
        impact_x: end_x.round() as i32,
        impact_y: end_y.round() as i32,
        angle,
        radius: ENTITY_SIZE / 2,
        hits,
    }
}

/// Area of effect: the impact point is the click clamped to three tile
/// lengths; every enemy inside the fixed splash circle is hit.
fn splash_circle(player: &Player, enemies: &[Enemy], click_x: i32, click_y: i32) -> AttackOutcome {
    let (impact_x, impact_y, angle) =
        clamp_to_reach(player.x, player.y, click_x, click_y, RANGED_REACH);

    let hits = enemies
        .iter()
        .filter(|enemy| {
            let dx = (enemy.x - impact_x) as f32;
            let dy = (enemy.y - impact_y) as f32;
            (dx * dx + dy * dy).sqrt() <= SPLASH_RADIUS as f32
        })
        .map(|enemy| enemy.id)
        .collect();

    AttackOutcome {
        kind: AttackKind::Splash,
        impact_x,
        impact_y,
        angle,
        radius: SPLASH_RADIUS,
        hits,
    }
}

/// Clamps the click point to the attacker's reach and returns the impact
/// point plus the facing angle. A click on the attacker itself faces +x.
fn clamp_to_reach(px: i32, py: i32, click_x: i32, click_y: i32, reach: i32) -> (i32, i32, f32) {
    let dx = (click_x - px) as f32;
    let dy = (click_y - py) as f32;
    let length = (dx * dx + dy * dy).sqrt();
    if length == 0.0 {
        return (px + reach, py, 0.0);
    }
    let clamped = length.min(reach as f32);
    let angle = dy.atan2(dx);
    (
        px + (dx / length * clamped).round() as i32,
        py + (dy / length * clamped).round() as i32,
        angle,
    )
}

/// Signed smallest difference between two angles, in [-π, π].
fn angle_difference(a: f32, b: f32) -> f32 {
    let mut diff = a - b;
    while diff > std::f32::consts::PI {
        diff -= std::f32::consts::TAU;
    }
    while diff < -std::f32::consts::PI {
        diff += std::f32::consts::TAU;
    }
    diff
}

/// Per-player re-fire tracking for ranged attack kinds. Melee has no
/// cooldown.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_fire: HashMap<(u32, AttackKind), Instant>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the player may fire now; records the shot when it is.
    pub fn ready(&mut self, player_id: u32, kind: AttackKind, now: Instant) -> bool {
        let interval = match kind {
            AttackKind::Slash => return true,
            AttackKind::Arrow => ARROW_COOLDOWN,
            AttackKind::Splash => SPLASH_COOLDOWN,
        };

        if let Some(last) = self.last_fire.get(&(player_id, kind)) {
            if now.duration_since(*last) < interval {
                return false;
            }
        }
        self.last_fire.insert((player_id, kind), now);
        true
    }

    /// Drops a disconnecting player's entries.
    pub fn forget(&mut self, player_id: u32) {
        self.last_fire.retain(|(id, _), _| *id != player_id);
    }
}

/// Mutable transfer record threaded through the pipeline stages. Each stage
/// that rewrites the damage appends one human-readable effect entry.
#[derive(Debug, Clone)]
pub struct DamageContext {
    pub damage: f32,
    pub attacker: Role,
    pub target: EnemyKind,
    pub attack: AttackKind,
    pub effects: Vec<String>,
}

impl DamageContext {
    pub fn new(base_damage: i32, attacker: Role, target: EnemyKind, attack: AttackKind) -> Self {
        DamageContext {
            damage: base_damage as f32,
            attacker,
            target,
            attack,
            effects: Vec::new(),
        }
    }

    /// Final damage as applied to the target's health.
    pub fn rounded(&self) -> i32 {
        self.damage.round() as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Crit { chance: f32, multiplier: f32 },
    Synergy,
    Effectiveness,
    Defense { reduction: f32 },
    Floor { minimum: f32 },
}

impl Stage {
    fn apply(&self, ctx: &mut DamageContext, roll: f32) {
        match *self {
            Stage::Crit { chance, multiplier } => {
                if chance > 0.0 && roll < chance {
                    ctx.damage *= multiplier;
                    ctx.effects.push(format!("critical hit x{:.1}", multiplier));
                }
            }
            Stage::Synergy => {
                let bonus = synergy_bonus(ctx.attacker, ctx.attack);
                if bonus > 0.0 && ctx.damage > 0.0 {
                    ctx.damage *= 1.0 + bonus;
                    ctx.effects
                        .push(format!("{} synergy +{:.0}%", attack_name(ctx.attack), bonus * 100.0));
                }
            }
            Stage::Effectiveness => {
                let multiplier = effectiveness(ctx.attacker, ctx.target);
                if (multiplier - 1.0).abs() > f32::EPSILON && ctx.damage > 0.0 {
                    ctx.damage *= multiplier;
                    ctx.effects
                        .push(format!("effective vs {} x{:.2}", target_name(ctx.target), multiplier));
                }
            }
            Stage::Defense { reduction } => {
                if reduction > 0.0 && ctx.damage > 0.0 {
                    ctx.damage *= 1.0 - reduction;
                    ctx.effects.push(format!("defense -{:.0}%", reduction * 100.0));
                }
            }
            Stage::Floor { minimum } => {
                if ctx.damage < minimum {
                    ctx.damage = minimum;
                    ctx.effects.push(format!("floored at {:.0}", minimum));
                }
            }
        }
    }
}

/// Bonus for a role using its signature attack shape.
fn synergy_bonus(role: Role, attack: AttackKind) -> f32 {
    match (role, attack) {
        (Role::Defender, AttackKind::Slash) => 0.25,
        (Role::Hunter, AttackKind::Arrow) => 0.20,
        (Role::Mage, AttackKind::Splash) => 0.30,
        _ => 0.0,
    }
}

/// Attacker-role vs target-kind multiplier.
fn effectiveness(role: Role, target: EnemyKind) -> f32 {
    match (role, target) {
        (Role::Mage, EnemyKind::Slime) => 1.5,
        (Role::Hunter, EnemyKind::Bat) => 1.5,
        (Role::Defender, EnemyKind::Slime) => 1.25,
        _ => 1.0,
    }
}

fn attack_name(kind: AttackKind) -> &'static str {
    match kind {
        AttackKind::Slash => "slash",
        AttackKind::Arrow => "arrow",
        AttackKind::Splash => "splash",
    }
}

fn target_name(kind: EnemyKind) -> &'static str {
    match kind {
        EnemyKind::Slime => "slime",
        EnemyKind::Bat => "bat",
    }
}

/// The ordered stage chain. Built by [`PipelineBuilder`]; stage order is
/// fixed, only parameters vary between difficulty presets.
#[derive(Debug, Clone)]
pub struct DamagePipeline {
    stages: Vec<Stage>,
}

impl DamagePipeline {
    /// Runs every stage in order over the context.
    pub fn run(&self, ctx: &mut DamageContext) {
        let mut rng = rand::thread_rng();
        for stage in &self.stages {
            stage.apply(ctx, rng.gen::<f32>());
        }
    }

    #[cfg(test)]
    fn run_with_roll(&self, ctx: &mut DamageContext, roll: f32) {
        for stage in &self.stages {
            stage.apply(ctx, roll);
        }
    }
}

/// Assembles the pipeline in its fixed order: crit, synergy, effectiveness,
/// defense, floor.
#[derive(Debug, Clone, Copy)]
pub struct PipelineBuilder {
    crit_chance: f32,
    crit_multiplier: f32,
    defense_reduction: f32,
    minimum: f32,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        PipelineBuilder {
            crit_chance: 0.15,
            crit_multiplier: 2.0,
            defense_reduction: 0.10,
            minimum: 1.0,
        }
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn crit(mut self, chance: f32, multiplier: f32) -> Self {
        self.crit_chance = chance;
        self.crit_multiplier = multiplier;
        self
    }

    pub fn defense(mut self, reduction: f32) -> Self {
        self.defense_reduction = reduction;
        self
    }

    pub fn minimum(mut self, minimum: f32) -> Self {
        self.minimum = minimum;
        self
    }

    pub fn build(self) -> DamagePipeline {
        DamagePipeline {
            stages: vec![
                Stage::Crit {
                    chance: self.crit_chance,
                    multiplier: self.crit_multiplier,
                },
                Stage::Synergy,
                Stage::Effectiveness,
                Stage::Defense {
                    reduction: self.defense_reduction,
                },
                Stage::Floor {
                    minimum: self.minimum,
                },
            ],
        }
    }
}

/// Difficulty presets vary only the configured numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
}

impl Difficulty {
    pub fn parse(text: &str) -> Result<Difficulty, ServerError> {
        match text.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "normal" => Ok(Difficulty::Normal),
            "hard" => Ok(Difficulty::Hard),
            other => Err(ServerError::UnknownDifficulty(other.to_string())),
        }
    }

    pub fn pipeline(&self) -> DamagePipeline {
        match self {
            Difficulty::Easy => PipelineBuilder::new()
                .crit(0.25, 2.5)
                .defense(0.05)
                .minimum(2.0)
                .build(),
            Difficulty::Normal => PipelineBuilder::new().build(),
            Difficulty::Hard => PipelineBuilder::new()
                .crit(0.05, 1.5)
                .defense(0.25)
                .minimum(1.0)
                .build(),
        }
    }
}
