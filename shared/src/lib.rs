//! Types shared between the game server and its clients: world constants,
//! the newline-delimited JSON wire protocol, and the pure geometry helpers
//! both sides use for collision checks.

use serde::{Deserialize, Serialize};

/// Version stamped into every wire message.
pub const PROTOCOL_VERSION: u32 = 1;

/// Edge length of one map tile, in pixels.
pub const TILE_SIZE: i32 = 32;
/// Edge length of every entity's axis-aligned bounding box, in pixels.
pub const ENTITY_SIZE: i32 = 24;

/// Melee attacks reach one tile length from the attacker.
pub const MELEE_REACH: i32 = TILE_SIZE;
/// Line and splash attacks reach three tile lengths.
pub const RANGED_REACH: i32 = 3 * TILE_SIZE;
/// Radius of the splash circle around an area-of-effect impact point.
pub const SPLASH_RADIUS: i32 = 40;
/// Half-angle of the melee cone, in radians (±45°).
pub const MELEE_HALF_ANGLE: f32 = std::f32::consts::FRAC_PI_4;

/// Player combat roles. Each role carries its own health pool, flat damage
/// and attack shape on the server side.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Mage,
    Hunter,
    Defender,
}

/// Enemy kinds present in the world.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EnemyKind {
    Slime,
    Bat,
}

/// Impact geometry of an attack. `Slash` is the melee cone, `Arrow` the
/// projectile line, `Splash` the area-of-effect circle.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AttackKind {
    Slash,
    Arrow,
    Splash,
}

/// One player as reported in a `state` broadcast.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub health: i32,
    pub role: Role,
    pub color: String,
}

/// One enemy as reported in a `state` broadcast.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EnemySnapshot {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub health: i32,
    pub kind: EnemyKind,
}

/// Every message kind that can cross the wire, in either direction.
///
/// The `type` field is the discriminator; field names are the wire names.
/// One JSON object per line, UTF-8, newline terminated.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    // Client -> server
    Input {
        dx: i32,
        dy: i32,
    },
    Attack {
        player_id: u32,
        click_x: i32,
        click_y: i32,
        attack: AttackKind,
    },
    PlantAction {
        player_id: u32,
        tile_x: i32,
        tile_y: i32,
        plant: String,
    },
    HarvestAction {
        player_id: u32,
        tile_x: i32,
        tile_y: i32,
    },
    Undo,
    Ping,

    // Server -> client
    Welcome {
        id: u32,
    },
    State {
        timestamp: u64,
        players: Vec<PlayerSnapshot>,
        enemies: Vec<EnemySnapshot>,
    },
    TileUpdate {
        x: i32,
        y: i32,
        tile: u8,
    },
    AttackAnimation {
        player_id: u32,
        impact_x: i32,
        impact_y: i32,
        angle: f32,
        radius: i32,
        kind: AttackKind,
    },
    Collision {
        a_id: u32,
        a_kind: String,
        b_id: u32,
        b_kind: String,
        mid_x: i32,
        mid_y: i32,
    },
    PlantUpdate {
        tile_x: i32,
        tile_y: i32,
        stage: u8,
    },
    PlantPlanted {
        tile_x: i32,
        tile_y: i32,
        plant: String,
    },
    PlantHarvested {
        tile_x: i32,
        tile_y: i32,
        plant: String,
    },
    CommandResult {
        ok: bool,
        detail: String,
    },
    CopyMade {
        source_id: u32,
        clone_id: u32,
    },
    Error {
        code: String,
        detail: String,
    },
    Pong,
}

/// Envelope for a single wire line: protocol version plus the message body
/// flattened next to it, so a line reads `{"v":1,"type":"welcome","id":1}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WireMessage {
    pub v: u32,
    #[serde(flatten)]
    pub body: Message,
}

impl WireMessage {
    pub fn new(body: Message) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            body,
        }
    }
}

/// Serializes a message to one wire line, newline included.
pub fn encode(message: &Message) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(&WireMessage::new(message.clone()))?;
    line.push('\n');
    Ok(line)
}

/// Parses one wire line into an envelope. Fails on malformed JSON and on
/// unknown `type` discriminators alike.
pub fn decode(line: &str) -> Result<WireMessage, serde_json::Error> {
    serde_json::from_str(line.trim_end())
}

/// Strict axis-aligned overlap test for two fixed-size boxes centered on
/// the given points. Boxes that merely touch edge to edge do not overlap.
pub fn aabb_overlap(ax: i32, ay: i32, bx: i32, by: i32, size: i32) -> bool {
    let half = size / 2;
    let (a_left, a_top) = (ax - half, ay - half);
    let (a_right, a_bottom) = (ax + half, ay + half);
    let (b_left, b_top) = (bx - half, by - half);
    let (b_right, b_bottom) = (bx + half, by + half);

    !(a_right <= b_left || b_right <= a_left || a_bottom <= b_top || b_bottom <= a_top)
}

/// Midpoint between two entity centers, used for collision events.
pub fn midpoint(ax: i32, ay: i32, bx: i32, by: i32) -> (i32, i32) {
    ((ax + bx) / 2, (ay + by) / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_welcome_line() {
        let line = encode(&Message::Welcome { id: 1 }).unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"type\":\"welcome\""));
        assert!(line.contains("\"v\":1"));
        assert!(line.contains("\"id\":1"));
    }

    #[test]
    fn test_decode_input_message() {
        let wire = decode("{\"v\":1,\"type\":\"input\",\"dx\":1,\"dy\":0}").unwrap();
        assert_eq!(wire.v, 1);
        assert_eq!(wire.body, Message::Input { dx: 1, dy: 0 });
    }

    #[test]
    fn test_roundtrip_state() {
        let message = Message::State {
            timestamp: 123456,
            players: vec![PlayerSnapshot {
                id: 1,
                x: 48,
                y: 48,
                health: 90,
                role: Role::Hunter,
                color: "green".to_string(),
            }],
            enemies: vec![EnemySnapshot {
                id: 1000,
                x: 200,
                y: 200,
                health: 30,
                kind: EnemyKind::Slime,
            }],
        };

        let line = encode(&message).unwrap();
        let wire = decode(&line).unwrap();
        assert_eq!(wire.body, message);
    }

    #[test]
    fn test_roundtrip_attack_animation() {
        let message = Message::AttackAnimation {
            player_id: 2,
            impact_x: 100,
            impact_y: 60,
            angle: 0.5,
            radius: SPLASH_RADIUS,
            kind: AttackKind::Splash,
        };

        let line = encode(&message).unwrap();
        let wire = decode(&line).unwrap();
        assert_eq!(wire.body, message);
    }

    #[test]
    fn test_attack_kind_wire_names() {
        let line = encode(&Message::Attack {
            player_id: 1,
            click_x: 10,
            click_y: 20,
            attack: AttackKind::Arrow,
        })
        .unwrap();
        assert!(line.contains("\"attack\":\"arrow\""));
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        assert!(decode("{not json").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(decode("{\"v\":1,\"type\":\"teleport\",\"x\":1}").is_err());
    }

    #[test]
    fn test_unit_messages_roundtrip() {
        for message in [Message::Ping, Message::Pong, Message::Undo] {
            let line = encode(&message).unwrap();
            assert_eq!(decode(&line).unwrap().body, message);
        }
    }

    #[test]
    fn test_aabb_overlap_detection() {
        // Clearly overlapping
        assert!(aabb_overlap(100, 100, 110, 110, ENTITY_SIZE));
        // Same center
        assert!(aabb_overlap(50, 50, 50, 50, ENTITY_SIZE));
        // Far apart
        assert!(!aabb_overlap(0, 0, 200, 200, ENTITY_SIZE));
    }

    #[test]
    fn test_aabb_touching_edges_do_not_overlap() {
        // Centers exactly one box width apart: edges touch, no strict overlap
        assert!(!aabb_overlap(100, 100, 100 + ENTITY_SIZE, 100, ENTITY_SIZE));
        assert!(!aabb_overlap(100, 100, 100, 100 + ENTITY_SIZE, ENTITY_SIZE));
    }

    #[test]
    fn test_midpoint() {
        assert_eq!(midpoint(0, 0, 10, 20), (5, 10));
        assert_eq!(midpoint(100, 100, 100, 100), (100, 100));
    }
}
