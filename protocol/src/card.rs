//! 卡牌定义
//!
//! 嫌疑人、凶器、房间三类卡牌，以及谜底。
//! 所有名称在 JSON 中以显示名出现（如 `"Prof. Plum"`、`"Knife"`），
//! 解析时不区分大小写，并接受简称。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GameError;

/// 规范化名称：只保留字母数字并转为小写
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// 嫌疑人（同时也是可选角色）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Suspect {
    Scarlet,
    Mustard,
    White,
    Green,
    Peacock,
    Plum,
}

impl Suspect {
    /// 按经典座次排列
    pub const ALL: [Suspect; 6] = [
        Suspect::Scarlet,
        Suspect::Mustard,
        Suspect::White,
        Suspect::Green,
        Suspect::Peacock,
        Suspect::Plum,
    ];

    /// 显示名
    pub fn name(&self) -> &'static str {
        match self {
            Suspect::Scarlet => "Miss Scarlet",
            Suspect::Mustard => "Col. Mustard",
            Suspect::White => "Mrs. White",
            Suspect::Green => "Mr. Green",
            Suspect::Peacock => "Mrs. Peacock",
            Suspect::Plum => "Prof. Plum",
        }
    }

    /// 简称（用于起点 ID）
    pub fn short_name(&self) -> &'static str {
        match self {
            Suspect::Scarlet => "scarlet",
            Suspect::Mustard => "mustard",
            Suspect::White => "white",
            Suspect::Green => "green",
            Suspect::Peacock => "peacock",
            Suspect::Plum => "plum",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Suspect::Scarlet => &["scarlet", "missscarlet", "scarlett"],
            Suspect::Mustard => &["mustard", "colmustard", "colonelmustard"],
            Suspect::White => &["white", "mrswhite"],
            Suspect::Green => &["green", "mrgreen", "reverendgreen", "revgreen"],
            Suspect::Peacock => &["peacock", "mrspeacock"],
            Suspect::Plum => &["plum", "profplum", "professorplum"],
        }
    }

    /// 座次序号
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// 凶器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Weapon {
    Candlestick,
    Knife,
    LeadPipe,
    Revolver,
    Rope,
    Wrench,
}

impl Weapon {
    pub const ALL: [Weapon; 6] = [
        Weapon::Candlestick,
        Weapon::Knife,
        Weapon::LeadPipe,
        Weapon::Revolver,
        Weapon::Rope,
        Weapon::Wrench,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Weapon::Candlestick => "Candlestick",
            Weapon::Knife => "Knife",
            Weapon::LeadPipe => "Lead Pipe",
            Weapon::Revolver => "Revolver",
            Weapon::Rope => "Rope",
            Weapon::Wrench => "Wrench",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Weapon::Candlestick => &["candlestick"],
            Weapon::Knife => &["knife", "dagger"],
            Weapon::LeadPipe => &["leadpipe", "pipe"],
            Weapon::Revolver => &["revolver", "pistol"],
            Weapon::Rope => &["rope"],
            Weapon::Wrench => &["wrench", "spanner"],
        }
    }
}

/// 房间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Room {
    Kitchen,
    Ballroom,
    Conservatory,
    DiningRoom,
    Lounge,
    Hall,
    Study,
    Library,
    BilliardRoom,
}

impl Room {
    pub const ALL: [Room; 9] = [
        Room::Kitchen,
        Room::Ballroom,
        Room::Conservatory,
        Room::DiningRoom,
        Room::Lounge,
        Room::Hall,
        Room::Study,
        Room::Library,
        Room::BilliardRoom,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Room::Kitchen => "Kitchen",
            Room::Ballroom => "Ballroom",
            Room::Conservatory => "Conservatory",
            Room::DiningRoom => "Dining Room",
            Room::Lounge => "Lounge",
            Room::Hall => "Hall",
            Room::Study => "Study",
            Room::Library => "Library",
            Room::BilliardRoom => "Billiard Room",
        }
    }

    /// 位置 ID（与走廊 ID 中使用的房间简称不同）
    pub fn id(&self) -> &'static str {
        match self {
            Room::Kitchen => "kitchen",
            Room::Ballroom => "ballroom",
            Room::Conservatory => "conservatory",
            Room::DiningRoom => "dining_room",
            Room::Lounge => "lounge",
            Room::Hall => "hall",
            Room::Study => "study",
            Room::Library => "library",
            Room::BilliardRoom => "billiard_room",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Room::Kitchen => &["kitchen"],
            Room::Ballroom => &["ballroom"],
            Room::Conservatory => &["conservatory"],
            Room::DiningRoom => &["diningroom", "dining"],
            Room::Lounge => &["lounge"],
            Room::Hall => &["hall"],
            Room::Study => &["study"],
            Room::Library => &["library"],
            Room::BilliardRoom => &["billiardroom", "billiard"],
        }
    }
}

macro_rules! impl_name_conversions {
    ($ty:ident, $kind:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $ty {
            type Err = GameError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let key = normalize(s);
                $ty::ALL
                    .iter()
                    .copied()
                    .find(|v| v.aliases().contains(&key.as_str()))
                    .ok_or_else(|| GameError::UnknownName {
                        kind: $kind,
                        name: s.to_string(),
                    })
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.name().to_string()
            }
        }

        impl TryFrom<String> for $ty {
            type Error = GameError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

impl_name_conversions!(Suspect, "suspect");
impl_name_conversions!(Weapon, "weapon");
impl_name_conversions!(Room, "room");

/// 卡牌
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Card {
    Suspect(Suspect),
    Weapon(Weapon),
    Room(Room),
}

impl Card {
    /// 按规范顺序生成整副 21 张牌
    pub fn full_deck() -> Vec<Card> {
        Suspect::ALL
            .iter()
            .map(|&s| Card::Suspect(s))
            .chain(Weapon::ALL.iter().map(|&w| Card::Weapon(w)))
            .chain(Room::ALL.iter().map(|&r| Card::Room(r)))
            .collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Card::Suspect(s) => s.name(),
            Card::Weapon(w) => w.name(),
            Card::Room(r) => r.name(),
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Card {
    type Err = GameError;

    // 三类名称互不重叠，按嫌疑人、凶器、房间依次尝试
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(suspect) = s.parse() {
            return Ok(Card::Suspect(suspect));
        }
        if let Ok(weapon) = s.parse() {
            return Ok(Card::Weapon(weapon));
        }
        if let Ok(room) = s.parse() {
            return Ok(Card::Room(room));
        }
        Err(GameError::UnknownName {
            kind: "card",
            name: s.to_string(),
        })
    }
}

impl From<Card> for String {
    fn from(value: Card) -> Self {
        value.name().to_string()
    }
}

impl TryFrom<String> for Card {
    type Error = GameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Suspect> for Card {
    fn from(value: Suspect) -> Self {
        Card::Suspect(value)
    }
}

impl From<Weapon> for Card {
    fn from(value: Weapon) -> Self {
        Card::Weapon(value)
    }
}

impl From<Room> for Card {
    fn from(value: Room) -> Self {
        Card::Room(value)
    }
}

/// 谜底（嫌疑人、凶器、房间各一）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Solution {
    pub suspect: Suspect,
    pub weapon: Weapon,
    pub room: Room,
}

impl Solution {
    pub fn new(suspect: Suspect, weapon: Weapon, room: Room) -> Self {
        Self { suspect, weapon, room }
    }

    /// 指控是否与谜底完全一致
    pub fn matches(&self, suspect: Suspect, weapon: Weapon, room: Room) -> bool {
        self.suspect == suspect && self.weapon == weapon && self.room == room
    }

    /// 谜底对应的三张牌
    pub fn cards(&self) -> [Card; 3] {
        [
            Card::Suspect(self.suspect),
            Card::Weapon(self.weapon),
            Card::Room(self.room),
        ]
    }
}
