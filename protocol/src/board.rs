//! 棋盘拓扑与角色位置
//!
//! 棋盘是静态图：9 个房间、12 条走廊、6 个起点，外加两条密道。
//! `BoardGraph` 只提供查询，`Tokens` 记录六个角色棋子的当前位置。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::card::{Room, Suspect};
use crate::error::GameError;

/// 走廊（连接两个房间，同一时间只能容纳一个角色）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hallway {
    StudyHall,
    HallLounge,
    LibraryBilliard,
    BilliardDining,
    ConservatoryBallroom,
    BallroomKitchen,
    StudyLibrary,
    HallBilliard,
    LoungeDining,
    LibraryConservatory,
    BilliardBallroom,
    DiningKitchen,
}

impl Hallway {
    pub const ALL: [Hallway; 12] = [
        Hallway::StudyHall,
        Hallway::HallLounge,
        Hallway::LibraryBilliard,
        Hallway::BilliardDining,
        Hallway::ConservatoryBallroom,
        Hallway::BallroomKitchen,
        Hallway::StudyLibrary,
        Hallway::HallBilliard,
        Hallway::LoungeDining,
        Hallway::LibraryConservatory,
        Hallway::BilliardBallroom,
        Hallway::DiningKitchen,
    ];

    /// 走廊两端的房间
    pub fn rooms(&self) -> [Room; 2] {
        match self {
            Hallway::StudyHall => [Room::Study, Room::Hall],
            Hallway::HallLounge => [Room::Hall, Room::Lounge],
            Hallway::LibraryBilliard => [Room::Library, Room::BilliardRoom],
            Hallway::BilliardDining => [Room::BilliardRoom, Room::DiningRoom],
            Hallway::ConservatoryBallroom => [Room::Conservatory, Room::Ballroom],
            Hallway::BallroomKitchen => [Room::Ballroom, Room::Kitchen],
            Hallway::StudyLibrary => [Room::Study, Room::Library],
            Hallway::HallBilliard => [Room::Hall, Room::BilliardRoom],
            Hallway::LoungeDining => [Room::Lounge, Room::DiningRoom],
            Hallway::LibraryConservatory => [Room::Library, Room::Conservatory],
            Hallway::BilliardBallroom => [Room::BilliardRoom, Room::Ballroom],
            Hallway::DiningKitchen => [Room::DiningRoom, Room::Kitchen],
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Hallway::StudyHall => "study_hall",
            Hallway::HallLounge => "hall_lounge",
            Hallway::LibraryBilliard => "library_billiard",
            Hallway::BilliardDining => "billiard_dining",
            Hallway::ConservatoryBallroom => "conservatory_ballroom",
            Hallway::BallroomKitchen => "ballroom_kitchen",
            Hallway::StudyLibrary => "study_library",
            Hallway::HallBilliard => "hall_billiard",
            Hallway::LoungeDining => "lounge_dining",
            Hallway::LibraryConservatory => "library_conservatory",
            Hallway::BilliardBallroom => "billiard_ballroom",
            Hallway::DiningKitchen => "dining_kitchen",
        }
    }

    /// 与房间相连的走廊
    pub fn touching(room: Room) -> impl Iterator<Item = Hallway> {
        Hallway::ALL
            .into_iter()
            .filter(move |h| h.rooms().contains(&room))
    }
}

/// 棋盘上的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Position {
    /// 角色起点
    Start(Suspect),
    /// 走廊
    Hallway(Hallway),
    /// 房间
    Room(Room),
}

impl Position {
    /// 稳定的位置 ID，如 `scarlet_start`、`hall_lounge`、`kitchen`
    pub fn id(&self) -> String {
        match self {
            Position::Start(s) => format!("{}_start", s.short_name()),
            Position::Hallway(h) => h.id().to_string(),
            Position::Room(r) => r.id().to_string(),
        }
    }

    /// 位置类型（与客户端约定的 `position_type`）
    pub fn kind(&self) -> &'static str {
        match self {
            Position::Start(_) => "starter",
            Position::Hallway(_) => "hallway",
            Position::Room(_) => "room",
        }
    }

    pub fn room(&self) -> Option<Room> {
        match self {
            Position::Room(r) => Some(*r),
            _ => None,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

impl FromStr for Position {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();

        if let Some(name) = key.strip_suffix("_start") {
            if let Some(suspect) = Suspect::ALL.into_iter().find(|x| x.short_name() == name) {
                return Ok(Position::Start(suspect));
            }
        }
        if let Some(hallway) = Hallway::ALL.into_iter().find(|h| h.id() == key) {
            return Ok(Position::Hallway(hallway));
        }
        if let Some(room) = Room::ALL.into_iter().find(|r| r.id() == key) {
            return Ok(Position::Room(room));
        }
        // 也接受房间显示名，如 "Dining Room"
        s.parse::<Room>()
            .map(Position::Room)
            .map_err(|_| GameError::UnknownName {
                kind: "position",
                name: s.to_string(),
            })
    }
}

impl From<Position> for String {
    fn from(value: Position) -> Self {
        value.id()
    }
}

impl TryFrom<String> for Position {
    type Error = GameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 静态棋盘图
pub struct BoardGraph;

impl BoardGraph {
    /// 角色起点相邻的走廊
    pub fn start_hallway(suspect: Suspect) -> Hallway {
        match suspect {
            Suspect::Scarlet => Hallway::HallLounge,
            Suspect::Mustard => Hallway::LoungeDining,
            Suspect::White => Hallway::BallroomKitchen,
            Suspect::Green => Hallway::ConservatoryBallroom,
            Suspect::Peacock => Hallway::LibraryConservatory,
            Suspect::Plum => Hallway::StudyLibrary,
        }
    }

    /// 相邻位置（不含密道）
    pub fn positions_adjacent_to(pos: Position) -> Vec<Position> {
        match pos {
            Position::Start(s) => vec![Position::Hallway(Self::start_hallway(s))],
            Position::Hallway(h) => h.rooms().into_iter().map(Position::Room).collect(),
            Position::Room(r) => Hallway::touching(r).map(Position::Hallway).collect(),
        }
    }

    pub fn is_room(pos: Position) -> bool {
        matches!(pos, Position::Room(_))
    }

    /// 从该位置出发的密道终点
    pub fn secret_passages_from(pos: Position) -> Vec<Position> {
        let target = match pos {
            Position::Room(Room::Study) => Some(Room::Kitchen),
            Position::Room(Room::Kitchen) => Some(Room::Study),
            Position::Room(Room::Lounge) => Some(Room::Conservatory),
            Position::Room(Room::Conservatory) => Some(Room::Lounge),
            _ => None,
        };
        target.map(Position::Room).into_iter().collect()
    }

    /// 位置容量，`None` 表示不限
    pub fn occupancy_limit(pos: Position) -> Option<usize> {
        match pos {
            Position::Start(_) | Position::Hallway(_) => Some(1),
            Position::Room(_) => None,
        }
    }
}

/// 六个角色棋子的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    positions: [Position; 6],
}

impl Tokens {
    /// 所有角色位于各自起点
    pub fn initial() -> Self {
        Self {
            positions: Suspect::ALL.map(Position::Start),
        }
    }

    pub fn get(&self, suspect: Suspect) -> Position {
        self.positions[suspect.index()]
    }

    pub fn set(&mut self, suspect: Suspect, pos: Position) {
        self.positions[suspect.index()] = pos;
    }

    /// 位于该位置的角色
    pub fn occupants(&self, pos: Position) -> Vec<Suspect> {
        Suspect::ALL
            .into_iter()
            .filter(|&s| self.get(s) == pos)
            .collect()
    }

    /// 该位置是否还能再进入一个角色
    pub fn has_room_for(&self, pos: Position) -> bool {
        match BoardGraph::occupancy_limit(pos) {
            Some(limit) => self.occupants(pos).len() < limit,
            None => true,
        }
    }

    /// 角色当前可走的位置：相邻且未满的走廊、相邻房间、密道房间，不含当前位置
    pub fn valid_moves(&self, suspect: Suspect) -> Vec<Position> {
        let here = self.get(suspect);
        BoardGraph::positions_adjacent_to(here)
            .into_iter()
            .chain(BoardGraph::secret_passages_from(here))
            .filter(|&to| to != here && self.has_room_for(to))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Suspect, Position)> + '_ {
        Suspect::ALL.into_iter().map(move |s| (s, self.get(s)))
    }
}

impl Default for Tokens {
    fn default() -> Self {
        Self::initial()
    }
}
