//! Classification of army moves broadcast by other players

use crate::game::GameState;
use log::info;
use shared::{MoveEvent, PlayerSnapshot, Unit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Our own broadcast came back to us
    SamePlayer,
    /// Destination was free or already held by the mover
    SafeMove,
    /// Destination is held by someone other than the mover
    MakeWar { defender: PlayerSnapshot },
}

/// Decides what a move means for this client and records it when peaceful.
///
/// Only the holder of the destination declares war, with a snapshot of its
/// own army. A contested move leaves the holder's view untouched; the
/// territory only changes hands once the resulting war has been resolved.
/// A bystander cannot vouch for a third party's army, so it records the
/// mover as the new holder the way the mover's own view does and leaves the
/// war to the players involved.
pub fn classify_move(state: &mut GameState, event: &MoveEvent) -> MoveOutcome {
    let mover = event.player.username.as_str();

    if mover == state.username() {
        return MoveOutcome::SamePlayer;
    }

    let occupant = state.army_at(event.to).map(|army| army.owner.clone());
    match occupant {
        Some(owner) if owner == state.username() => {
            info!("{} moved into {} which you hold, war!", mover, event.to);
            MoveOutcome::MakeWar {
                defender: state.snapshot(),
            }
        }
        occupant => {
            if let Some(owner) = occupant.filter(|owner| owner != mover) {
                info!(
                    "{} marched into {} held by {}, leaving the war to them",
                    mover, event.to, owner
                );
            }

            let moved_ids: Vec<u32> = event.units.iter().map(|u| u.id).collect();
            let mut arrived = state.take_units(mover, &moved_ids);
            arrived.retain(|u| u.location == event.to);

            let units = arrived_units(event, arrived);
            info!("{} moved {} units to {}", mover, event.units.len(), event.to);
            state.record_army(event.to, mover, units);
            MoveOutcome::SafeMove
        }
    }
}

/// The mover's army at the destination: the snapshot when it has it,
/// otherwise what we already knew there plus the units that just arrived
fn arrived_units(event: &MoveEvent, known: Vec<Unit>) -> Vec<Unit> {
    let from_snapshot: Vec<Unit> = event.player.units_at(event.to).cloned().collect();
    if !from_snapshot.is_empty() {
        return from_snapshot;
    }

    let mut units = known;
    for unit in &event.units {
        if !units.iter().any(|u| u.id == unit.id) {
            let mut unit = unit.clone();
            unit.location = event.to;
            units.push(unit);
        }
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Rank, Territory};

    fn unit(id: u32, rank: Rank, location: Territory) -> Unit {
        Unit { id, rank, location }
    }

    fn move_event(username: &str, to: Territory, units: Vec<Unit>) -> MoveEvent {
        MoveEvent {
            player: PlayerSnapshot {
                username: username.to_string(),
                units: units.clone(),
            },
            to,
            units,
        }
    }

    #[test]
    fn test_own_move_is_same_player_and_changes_nothing() {
        let mut state = GameState::new("alice");
        state.spawn(Territory::Asia, Rank::Infantry).unwrap();
        let before = state.snapshot();

        let event = move_event("alice", Territory::Asia, vec![unit(1, Rank::Infantry, Territory::Asia)]);
        assert_eq!(classify_move(&mut state, &event), MoveOutcome::SamePlayer);
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn test_move_into_empty_territory_is_safe_and_recorded() {
        let mut state = GameState::new("alice");
        let event = move_event("bob", Territory::Africa, vec![unit(1, Rank::Cavalry, Territory::Africa)]);

        assert_eq!(classify_move(&mut state, &event), MoveOutcome::SafeMove);
        assert_eq!(state.units_of_at("bob", Territory::Africa).len(), 1);
    }

    #[test]
    fn test_move_into_movers_own_territory_is_safe() {
        let mut state = GameState::new("alice");
        let first = move_event("bob", Territory::Africa, vec![unit(1, Rank::Cavalry, Territory::Africa)]);
        classify_move(&mut state, &first);

        let mut second = move_event("bob", Territory::Africa, vec![unit(2, Rank::Infantry, Territory::Africa)]);
        second.player.units = vec![
            unit(1, Rank::Cavalry, Territory::Africa),
            unit(2, Rank::Infantry, Territory::Africa),
        ];

        assert_eq!(classify_move(&mut state, &second), MoveOutcome::SafeMove);
        assert_eq!(state.units_of_at("bob", Territory::Africa).len(), 2);
    }

    #[test]
    fn test_safe_move_removes_units_from_previous_territory() {
        let mut state = GameState::new("alice");
        classify_move(
            &mut state,
            &move_event("bob", Territory::Africa, vec![unit(1, Rank::Cavalry, Territory::Africa)]),
        );
        classify_move(
            &mut state,
            &move_event("bob", Territory::Europe, vec![unit(1, Rank::Cavalry, Territory::Europe)]),
        );

        assert!(state.army_at(Territory::Africa).is_none());
        assert_eq!(state.units_of_at("bob", Territory::Europe).len(), 1);
    }

    #[test]
    fn test_move_into_our_territory_makes_war_without_mutation() {
        let mut state = GameState::new("alice");
        state.spawn(Territory::Asia, Rank::Infantry).unwrap();
        state.spawn(Territory::Asia, Rank::Infantry).unwrap();

        let event = move_event("bob", Territory::Asia, vec![unit(1, Rank::Artillery, Territory::Asia)]);
        let outcome = classify_move(&mut state, &event);

        match outcome {
            MoveOutcome::MakeWar { defender } => {
                assert_eq!(defender.username, "alice");
                assert_eq!(defender.strength_at(Territory::Asia), 2);
            }
            other => panic!("expected war, got {:?}", other),
        }
        assert_eq!(state.army_at(Territory::Asia).unwrap().owner, "alice");
        assert_eq!(state.own_units_at(Territory::Asia).len(), 2);
    }

    #[test]
    fn test_bystander_records_mover_without_war() {
        let mut state = GameState::new("alice");
        classify_move(
            &mut state,
            &move_event("carol", Territory::Europe, vec![unit(4, Rank::Cavalry, Territory::Europe)]),
        );

        let event = move_event("bob", Territory::Europe, vec![unit(1, Rank::Infantry, Territory::Europe)]);
        assert_eq!(classify_move(&mut state, &event), MoveOutcome::SafeMove);
        assert_eq!(state.army_at(Territory::Europe).unwrap().owner, "bob");
        assert!(state.units_of_at("carol", Territory::Europe).is_empty());
    }

    #[test]
    fn test_bystander_with_stale_view_never_makes_war() {
        // Carol only saw bob's first move, not the artillery he spawned later
        let mut carol = GameState::new("carol");
        classify_move(
            &mut carol,
            &move_event("bob", Territory::Asia, vec![unit(1, Rank::Infantry, Territory::Asia)]),
        );
        let mut bob = GameState::new("bob");
        bob.spawn(Territory::Asia, Rank::Infantry).unwrap();
        for _ in 0..5 {
            bob.spawn(Territory::Asia, Rank::Artillery).unwrap();
        }

        let attack = move_event(
            "alice",
            Territory::Asia,
            (1..=3).map(|id| unit(id, Rank::Infantry, Territory::Asia)).collect(),
        );

        assert_eq!(classify_move(&mut carol, &attack), MoveOutcome::SafeMove);
        match classify_move(&mut bob, &attack) {
            MoveOutcome::MakeWar { defender } => {
                assert_eq!(defender.username, "bob");
                assert_eq!(defender.strength_at(Territory::Asia), 51);
            }
            other => panic!("expected war, got {:?}", other),
        }
    }
}
