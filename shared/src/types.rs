//! Core game vocabulary shared by the server engine and the client relay

use crate::codec::{Decode, DecodeError, Encode};
use tokio::io::AsyncRead;

/// Identifier the server assigns to an accepted player. Never reused in a game.
pub type PlayerId = u8;

/// Identifier the server assigns to a placed bomb. Never reused in a game.
pub type BombId = u32;

/// A player's death count; incremented once per respawn.
pub type Score = u32;

/// A board cell. Ordering is lexicographic (x, then y), which fixes the
/// ascending iteration order of `BTreeSet<Position>` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub x: u16,
    pub y: u16,
}

impl Position {
    pub fn to_signed(self) -> SignedPosition {
        SignedPosition {
            x: i32::from(self.x),
            y: i32::from(self.y),
        }
    }
}

/// Candidate position used while validating a move. Never stored and never
/// transmitted, so it has no wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedPosition {
    pub x: i32,
    pub y: i32,
}

impl SignedPosition {
    /// One step along `direction` from this cell.
    pub fn translated(self, direction: Direction) -> SignedPosition {
        let delta = direction.delta();
        SignedPosition {
            x: self.x + delta.x,
            y: self.y + delta.y,
        }
    }

    /// Converts back to an unsigned cell. The caller must have checked the
    /// board bounds first.
    pub fn to_position(self) -> Position {
        Position {
            x: self.x as u16,
            y: self.y as u16,
        }
    }
}

/// Movement direction of a robot. Up is towards growing y.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    /// Unit delta for one step in this direction.
    pub fn delta(self) -> SignedPosition {
        match self {
            Direction::Up => SignedPosition { x: 0, y: 1 },
            Direction::Right => SignedPosition { x: 1, y: 0 },
            Direction::Down => SignedPosition { x: 0, y: -1 },
            Direction::Left => SignedPosition { x: -1, y: 0 },
        }
    }
}

/// Identity a player presents when joining; immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub address: String,
}

/// A ticking bomb on the board. The timer drops by one each turn; the bomb
/// detonates when it reaches zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bomb {
    pub position: Position,
    pub timer: u16,
}

/// One state change within a turn. Append-only; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PlayerMoved {
        id: PlayerId,
        position: Position,
    },
    BlockPlaced {
        position: Position,
    },
    BombPlaced {
        id: BombId,
        position: Position,
    },
    BombExploded {
        id: BombId,
        robots_destroyed: Vec<PlayerId>,
        blocks_destroyed: Vec<Position>,
    },
}

/// The authoritative record of one simulated turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub turn: u16,
    pub events: Vec<Event>,
}

impl Encode for Position {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.x.encode(buf);
        self.y.encode(buf);
    }
}

impl Decode for Position {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(Position {
            x: u16::decode(src).await?,
            y: u16::decode(src).await?,
        })
    }
}

impl Encode for Direction {
    fn encode(&self, buf: &mut Vec<u8>) {
        let discriminant = match self {
            Direction::Up => 0u8,
            Direction::Right => 1,
            Direction::Down => 2,
            Direction::Left => 3,
        };
        buf.push(discriminant);
    }
}

impl Decode for Direction {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match u8::decode(src).await? {
            0 => Ok(Direction::Up),
            1 => Ok(Direction::Right),
            2 => Ok(Direction::Down),
            3 => Ok(Direction::Left),
            other => Err(DecodeError::UnknownVariant("Direction", other)),
        }
    }
}

impl Encode for Player {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.name.encode(buf);
        self.address.encode(buf);
    }
}

impl Decode for Player {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(Player {
            name: String::decode(src).await?,
            address: String::decode(src).await?,
        })
    }
}

impl Encode for Bomb {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.position.encode(buf);
        self.timer.encode(buf);
    }
}

impl Decode for Bomb {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(Bomb {
            position: Position::decode(src).await?,
            timer: u16::decode(src).await?,
        })
    }
}

impl Encode for Event {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Event::PlayerMoved { id, position } => {
                buf.push(0);
                id.encode(buf);
                position.encode(buf);
            }
            Event::BlockPlaced { position } => {
                buf.push(1);
                position.encode(buf);
            }
            Event::BombPlaced { id, position } => {
                buf.push(2);
                id.encode(buf);
                position.encode(buf);
            }
            Event::BombExploded {
                id,
                robots_destroyed,
                blocks_destroyed,
            } => {
                buf.push(3);
                id.encode(buf);
                robots_destroyed.encode(buf);
                blocks_destroyed.encode(buf);
            }
        }
    }
}

impl Decode for Event {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match u8::decode(src).await? {
            0 => Ok(Event::PlayerMoved {
                id: PlayerId::decode(src).await?,
                position: Position::decode(src).await?,
            }),
            1 => Ok(Event::BlockPlaced {
                position: Position::decode(src).await?,
            }),
            2 => Ok(Event::BombPlaced {
                id: BombId::decode(src).await?,
                position: Position::decode(src).await?,
            }),
            3 => Ok(Event::BombExploded {
                id: BombId::decode(src).await?,
                robots_destroyed: Vec::decode(src).await?,
                blocks_destroyed: Vec::decode(src).await?,
            }),
            other => Err(DecodeError::UnknownVariant("Event", other)),
        }
    }
}

impl Encode for Turn {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.turn.encode(buf);
        self.events.encode(buf);
    }
}

impl Decode for Turn {
    async fn decode<R>(src: &mut R) -> Result<Self, DecodeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(Turn {
            turn: u16::decode(src).await?,
            events: Vec::decode(src).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_deltas_match_the_fixed_table() {
        assert_eq!(Direction::Up.delta(), SignedPosition { x: 0, y: 1 });
        assert_eq!(Direction::Right.delta(), SignedPosition { x: 1, y: 0 });
        assert_eq!(Direction::Down.delta(), SignedPosition { x: 0, y: -1 });
        assert_eq!(Direction::Left.delta(), SignedPosition { x: -1, y: 0 });
    }

    #[test]
    fn direction_discriminants_follow_declaration_order() {
        assert_eq!(Direction::Up.to_bytes(), vec![0]);
        assert_eq!(Direction::Right.to_bytes(), vec![1]);
        assert_eq!(Direction::Down.to_bytes(), vec![2]);
        assert_eq!(Direction::Left.to_bytes(), vec![3]);
    }

    #[test]
    fn position_ordering_is_x_then_y() {
        let a = Position { x: 1, y: 9 };
        let b = Position { x: 2, y: 0 };
        let c = Position { x: 2, y: 1 };
        assert!(a < b && b < c);
    }

    #[test]
    fn signed_position_translation() {
        let start = Position { x: 3, y: 4 }.to_signed();
        assert_eq!(
            start.translated(Direction::Left),
            SignedPosition { x: 2, y: 4 }
        );
        let edge = Position { x: 0, y: 0 }.to_signed();
        assert_eq!(
            edge.translated(Direction::Down),
            SignedPosition { x: 0, y: -1 }
        );
    }

    #[test]
    fn position_layout() {
        let position = Position { x: 0x0102, y: 0x0304 };
        assert_eq!(position.to_bytes(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn player_roundtrip() {
        let original = Player {
            name: "SmolSir".to_string(),
            address: "127.0.0.1:10022".to_string(),
        };
        let bytes = original.to_bytes();
        let mut src = bytes.as_slice();
        assert_eq!(Player::decode(&mut src).await.unwrap(), original);
    }

    #[tokio::test]
    async fn every_event_variant_roundtrips() {
        let events = vec![
            Event::PlayerMoved {
                id: 1,
                position: Position { x: 5, y: 5 },
            },
            Event::BlockPlaced {
                position: Position { x: 1, y: 1 },
            },
            Event::BombPlaced {
                id: 7,
                position: Position { x: 2, y: 2 },
            },
            Event::BombExploded {
                id: 7,
                robots_destroyed: vec![0, 2],
                blocks_destroyed: vec![Position { x: 2, y: 3 }],
            },
        ];
        let turn = Turn { turn: 6, events };
        let bytes = turn.to_bytes();
        let mut src = bytes.as_slice();
        assert_eq!(Turn::decode(&mut src).await.unwrap(), turn);
        assert!(src.is_empty());
    }

    #[tokio::test]
    async fn unknown_event_discriminant_is_rejected() {
        let mut src: &[u8] = &[4, 0, 0];
        assert_eq!(
            Event::decode(&mut src).await.unwrap_err(),
            DecodeError::UnknownVariant("Event", 4)
        );
    }
}
