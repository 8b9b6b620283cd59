//! War resolution.
//!
//! Every client that consumes a war recognition runs the same comparison on
//! the same snapshots, so attacker and defender reach the same verdict and
//! the same post-war army at the contested territory no matter which one
//! resolves first. A recognition this client already settled, or one that
//! finds its army there already gone, short-circuits with `NoUnits`, which is
//! what absorbs redelivered recognitions.

use crate::game::GameState;
use log::info;
use shared::{PlayerSnapshot, Territory, WarRecognition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarOutcome {
    NotInvolved,
    NoUnits,
    OpponentWon,
    YouWon,
    Draw,
}

/// Result of a battle independent of who is looking at it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Battle {
    AttackerWins,
    DefenderWins,
    Draw,
}

impl Battle {
    /// Same battle with the roles swapped
    pub fn mirrored(self) -> Self {
        match self {
            Battle::AttackerWins => Battle::DefenderWins,
            Battle::DefenderWins => Battle::AttackerWins,
            Battle::Draw => Battle::Draw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarResolution {
    pub outcome: WarOutcome,
    /// Attacker on a draw, empty when no battle took place
    pub winner: String,
    /// Defender on a draw, empty when no battle took place
    pub loser: String,
}

impl WarResolution {
    fn without_battle(outcome: WarOutcome) -> Self {
        Self {
            outcome,
            winner: String::new(),
            loser: String::new(),
        }
    }
}

/// Compares the strength both sides have at the territory
pub fn score(attacker: &PlayerSnapshot, defender: &PlayerSnapshot, territory: Territory) -> Battle {
    let attack = attacker.strength_at(territory);
    let defence = defender.strength_at(territory);

    if attack > defence {
        Battle::AttackerWins
    } else if defence > attack {
        Battle::DefenderWins
    } else {
        Battle::Draw
    }
}

pub fn resolve_war(state: &mut GameState, event: &WarRecognition) -> WarResolution {
    let territory = event.territory;
    let attacker = &event.attacker;
    let defender = &event.defender;

    info!(
        "==== War declared: {} attacks {} in {} ====",
        attacker.username, defender.username, territory
    );

    let is_attacker = attacker.username == state.username();
    let is_defender = defender.username == state.username();
    if !is_attacker && !is_defender {
        info!("{}, you are not involved in this war", state.username());
        return WarResolution::without_battle(WarOutcome::NotInvolved);
    }

    if state.is_settled(event) {
        info!("{}, the war in {} is already settled", state.username(), territory);
        return WarResolution::without_battle(WarOutcome::NoUnits);
    }

    if state.own_units_at(territory).is_empty() {
        info!("{}, you have no units in {}", state.username(), territory);
        return WarResolution::without_battle(WarOutcome::NoUnits);
    }

    let battle = score(attacker, defender, territory);
    info!(
        "{} brings {} strength, {} brings {}",
        attacker.username,
        attacker.strength_at(territory),
        defender.username,
        defender.strength_at(territory)
    );

    state.settle_war(event);

    let (winner, loser) = match battle {
        Battle::AttackerWins => (attacker, defender),
        Battle::DefenderWins => (defender, attacker),
        Battle::Draw => {
            state.clear_territory(territory);
            info!(
                "The war between {} and {} in {} ended in a draw",
                attacker.username, defender.username, territory
            );
            return WarResolution {
                outcome: WarOutcome::Draw,
                winner: attacker.username.clone(),
                loser: defender.username.clone(),
            };
        }
    };

    let outcome = if winner.username == state.username() {
        // Our army already is the record at the territory
        WarOutcome::YouWon
    } else {
        let units = winner.units_at(territory).cloned().collect();
        state.record_army(territory, &winner.username, units);
        WarOutcome::OpponentWon
    };

    info!(
        "{} won the war in {}, {} lost their units there",
        winner.username, territory, loser.username
    );

    WarResolution {
        outcome,
        winner: winner.username.clone(),
        loser: loser.username.clone(),
    }
}
