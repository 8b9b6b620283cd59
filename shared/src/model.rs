//! Player, unit and event types exchanged between clients

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named location on the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Territory {
    Americas,
    Europe,
    Africa,
    Asia,
    Antarctica,
    Australia,
}

impl Territory {
    pub const ALL: [Territory; 6] = [
        Territory::Americas,
        Territory::Europe,
        Territory::Africa,
        Territory::Asia,
        Territory::Antarctica,
        Territory::Australia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Territory::Americas => "americas",
            Territory::Europe => "europe",
            Territory::Africa => "africa",
            Territory::Asia => "asia",
            Territory::Antarctica => "antarctica",
            Territory::Australia => "australia",
        }
    }
}

impl fmt::Display for Territory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Territory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Territory::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| format!("unknown territory '{}'", s))
    }
}

/// Combat class of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Infantry,
    Cavalry,
    Artillery,
}

impl Rank {
    pub const ALL: [Rank; 3] = [Rank::Infantry, Rank::Cavalry, Rank::Artillery];

    /// Fixed weight every client uses when scoring a battle
    pub fn strength(&self) -> u32 {
        match self {
            Rank::Infantry => 1,
            Rank::Cavalry => 5,
            Rank::Artillery => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Infantry => "infantry",
            Rank::Cavalry => "cavalry",
            Rank::Artillery => "artillery",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rank {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Rank::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == lowered)
            .ok_or_else(|| format!("unknown rank '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: u32,
    pub rank: Rank,
    pub location: Territory,
}

/// Total combat strength of a set of units
pub fn strength<'a>(units: impl IntoIterator<Item = &'a Unit>) -> u32 {
    units.into_iter().map(|u| u.rank.strength()).sum()
}

/// Unit counts per rank, in `Rank::ALL` order
pub fn rank_counts<'a>(units: impl IntoIterator<Item = &'a Unit>) -> [(Rank, usize); 3] {
    let mut counts = Rank::ALL.map(|r| (r, 0));
    for unit in units {
        if let Some(slot) = counts.iter_mut().find(|(r, _)| *r == unit.rank) {
            slot.1 += 1;
        }
    }
    counts
}

/// Immutable copy of a player's identity and forces taken at publish time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub username: String,
    pub units: Vec<Unit>,
}

impl PlayerSnapshot {
    pub fn units_at(&self, territory: Territory) -> impl Iterator<Item = &Unit> {
        self.units.iter().filter(move |u| u.location == territory)
    }

    pub fn strength_at(&self, territory: Territory) -> u32 {
        strength(self.units_at(territory))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveEvent {
    pub player: PlayerSnapshot,
    pub to: Territory,
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarRecognition {
    pub attacker: PlayerSnapshot,
    pub defender: PlayerSnapshot,
    pub territory: Territory,
}

/// Server-wide pause flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayingState {
    pub is_paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameLogEntry {
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub username: String,
    pub message: String,
}
