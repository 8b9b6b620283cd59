//! Client-side view of the map.
//!
//! Each client keeps its own armies plus the last known position of everyone
//! else's, learned from move events and war outcomes. A territory holds at
//! most one army in this view. The whole state lives behind a single lock
//! shared by the REPL and every subscription handler.

use crate::error::CommandError;
use log::info;
use shared::{MoveEvent, PlayerSnapshot, PlayingState, Rank, Territory, Unit, WarRecognition};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SharedGameState = Arc<RwLock<GameState>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Army {
    pub owner: String,
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone)]
pub struct GameState {
    username: String,
    paused: bool,
    next_unit_id: u32,
    armies: BTreeMap<Territory, Army>,
    /// Last war settled at each territory, to absorb redeliveries
    settled_wars: BTreeMap<Territory, WarRecognition>,
}

impl GameState {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            paused: false,
            next_unit_id: 1,
            armies: BTreeMap::new(),
            settled_wars: BTreeMap::new(),
        }
    }

    pub fn shared(self) -> SharedGameState {
        Arc::new(RwLock::new(self))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn handle_pause(&mut self, state: PlayingState) {
        if state.is_paused {
            info!("==== Pause detected ====");
        } else {
            info!("==== Resume detected ====");
        }
        self.paused = state.is_paused;
    }

    pub fn army_at(&self, territory: Territory) -> Option<&Army> {
        self.armies.get(&territory)
    }

    pub fn armies(&self) -> impl Iterator<Item = (&Territory, &Army)> {
        self.armies.iter()
    }

    /// Units the given player has at a territory in this client's view
    pub fn units_of_at(&self, owner: &str, territory: Territory) -> &[Unit] {
        match self.armies.get(&territory) {
            Some(army) if army.owner == owner => army.units.as_slice(),
            _ => &[],
        }
    }

    pub fn own_units_at(&self, territory: Territory) -> &[Unit] {
        self.units_of_at(&self.username, territory)
    }

    pub fn own_units(&self) -> impl Iterator<Item = &Unit> {
        self.armies
            .values()
            .filter(|army| army.owner == self.username)
            .flat_map(|army| army.units.iter())
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshot_of(&self.username)
    }

    /// Snapshot of any player as this client currently sees them
    fn snapshot_of(&self, username: &str) -> PlayerSnapshot {
        PlayerSnapshot {
            username: username.to_string(),
            units: self
                .armies
                .values()
                .filter(|army| army.owner == username)
                .flat_map(|army| army.units.iter().cloned())
                .collect(),
        }
    }

    pub fn spawn(&mut self, territory: Territory, rank: Rank) -> Result<Unit, CommandError> {
        if self.paused {
            return Err(CommandError::Paused);
        }

        if let Some(army) = self.armies.get(&territory) {
            if army.owner != self.username {
                return Err(CommandError::Occupied {
                    territory,
                    owner: army.owner.clone(),
                });
            }
        }

        let unit = Unit {
            id: self.next_unit_id,
            rank,
            location: territory,
        };
        self.next_unit_id += 1;

        self.armies
            .entry(territory)
            .or_insert_with(|| Army {
                owner: self.username.clone(),
                units: Vec::new(),
            })
            .units
            .push(unit.clone());

        info!("Spawned {} {} in {}", unit.rank, unit.id, territory);
        Ok(unit)
    }

    /// Moves own units and returns the event to broadcast.
    ///
    /// Marching into a territory another player holds replaces their army in
    /// this view; the war recognition raised by that player settles who
    /// actually keeps it.
    pub fn move_units(&mut self, to: Territory, unit_ids: &[u32]) -> Result<MoveEvent, CommandError> {
        if self.paused {
            return Err(CommandError::Paused);
        }
        if unit_ids.is_empty() {
            return Err(CommandError::Usage("move <territory> <unit id> [unit id...]"));
        }

        for id in unit_ids {
            if !self.own_units().any(|u| u.id == *id) {
                return Err(CommandError::UnknownUnit(*id));
            }
        }

        let username = self.username.clone();
        let mut moved = self.take_units(&username, unit_ids);
        for unit in &mut moved {
            unit.location = to;
        }

        let holder = self.armies.get(&to).map(|army| army.owner.clone());
        match holder {
            Some(owner) if owner == username => {
                if let Some(army) = self.armies.get_mut(&to) {
                    army.units.extend(moved.iter().cloned());
                }
            }
            holder => {
                if let Some(owner) = holder {
                    info!("Marching into {} held by {}", to, owner);
                }
                self.armies.insert(
                    to,
                    Army {
                        owner: username,
                        units: moved.clone(),
                    },
                );
            }
        }

        info!("Moved {} units to {}", moved.len(), to);
        Ok(MoveEvent {
            player: self.snapshot(),
            to,
            units: moved,
        })
    }

    /// Replaces whatever this view holds at a territory
    pub(crate) fn record_army(&mut self, territory: Territory, owner: &str, units: Vec<Unit>) {
        if units.is_empty() {
            self.armies.remove(&territory);
            return;
        }
        self.armies.insert(
            territory,
            Army {
                owner: owner.to_string(),
                units,
            },
        );
    }

    pub(crate) fn is_settled(&self, war: &WarRecognition) -> bool {
        self.settled_wars.get(&war.territory) == Some(war)
    }

    pub(crate) fn settle_war(&mut self, war: &WarRecognition) {
        self.settled_wars.insert(war.territory, war.clone());
    }

    pub(crate) fn clear_territory(&mut self, territory: Territory) {
        self.armies.remove(&territory);
    }

    /// Removes the given units of `owner` wherever they are, dropping armies
    /// left empty
    pub(crate) fn take_units(&mut self, owner: &str, unit_ids: &[u32]) -> Vec<Unit> {
        let mut taken = Vec::new();
        for army in self.armies.values_mut().filter(|a| a.owner == owner) {
            let (leaving, staying): (Vec<Unit>, Vec<Unit>) = army
                .units
                .drain(..)
                .partition(|u| unit_ids.contains(&u.id));
            army.units = staying;
            taken.extend(leaving);
        }
        self.armies.retain(|_, army| !army.units.is_empty());
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_assigns_increasing_ids() {
        let mut state = GameState::new("alice");
        let first = state.spawn(Territory::Europe, Rank::Infantry).unwrap();
        let second = state.spawn(Territory::Europe, Rank::Cavalry).unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(state.own_units_at(Territory::Europe).len(), 2);
    }

    #[test]
    fn test_spawn_refused_while_paused() {
        let mut state = GameState::new("alice");
        state.handle_pause(PlayingState { is_paused: true });
        assert!(matches!(
            state.spawn(Territory::Asia, Rank::Infantry),
            Err(CommandError::Paused)
        ));

        state.handle_pause(PlayingState { is_paused: false });
        assert!(state.spawn(Territory::Asia, Rank::Infantry).is_ok());
    }

    #[test]
    fn test_spawn_into_foreign_territory_is_refused() {
        let mut state = GameState::new("alice");
        state.record_army(
            Territory::Asia,
            "bob",
            vec![Unit {
                id: 1,
                rank: Rank::Infantry,
                location: Territory::Asia,
            }],
        );

        let result = state.spawn(Territory::Asia, Rank::Artillery);
        assert!(matches!(result, Err(CommandError::Occupied { .. })));
    }

    #[test]
    fn test_move_relocates_units_and_builds_event() {
        let mut state = GameState::new("alice");
        state.spawn(Territory::Europe, Rank::Infantry).unwrap();
        state.spawn(Territory::Europe, Rank::Cavalry).unwrap();

        let event = state.move_units(Territory::Asia, &[1]).unwrap();

        assert_eq!(event.to, Territory::Asia);
        assert_eq!(event.units.len(), 1);
        assert_eq!(event.units[0].location, Territory::Asia);
        assert_eq!(event.player.username, "alice");
        assert_eq!(event.player.strength_at(Territory::Asia), 1);
        assert_eq!(state.own_units_at(Territory::Europe).len(), 1);
        assert_eq!(state.own_units_at(Territory::Asia).len(), 1);
    }

    #[test]
    fn test_move_empties_source_territory() {
        let mut state = GameState::new("alice");
        state.spawn(Territory::Europe, Rank::Infantry).unwrap();
        state.move_units(Territory::Africa, &[1]).unwrap();

        assert!(state.army_at(Territory::Europe).is_none());
    }

    #[test]
    fn test_move_unknown_unit_fails_without_mutation() {
        let mut state = GameState::new("alice");
        state.spawn(Territory::Europe, Rank::Infantry).unwrap();

        let result = state.move_units(Territory::Asia, &[1, 9]);
        assert!(matches!(result, Err(CommandError::UnknownUnit(9))));
        assert_eq!(state.own_units_at(Territory::Europe).len(), 1);
    }

    #[test]
    fn test_move_into_foreign_territory_replaces_record() {
        let mut state = GameState::new("alice");
        state.spawn(Territory::Europe, Rank::Artillery).unwrap();
        state.record_army(
            Territory::Asia,
            "bob",
            vec![Unit {
                id: 3,
                rank: Rank::Infantry,
                location: Territory::Asia,
            }],
        );

        state.move_units(Territory::Asia, &[1]).unwrap();

        let army = state.army_at(Territory::Asia).unwrap();
        assert_eq!(army.owner, "alice");
        assert_eq!(army.units.len(), 1);
    }

    #[test]
    fn test_snapshot_of_other_player_uses_local_view() {
        let mut state = GameState::new("alice");
        state.record_army(
            Territory::Asia,
            "bob",
            vec![Unit {
                id: 7,
                rank: Rank::Cavalry,
                location: Territory::Asia,
            }],
        );

        let snapshot = state.snapshot_of("bob");
        assert_eq!(snapshot.units.len(), 1);
        assert_eq!(snapshot.strength_at(Territory::Asia), 5);
        assert!(state.snapshot().units.is_empty());
    }
}
