//! Text output for the client REPL

use crate::game::GameState;
use shared::model::{rank_counts, strength};
use shared::{Territory, Unit};
use std::fmt::Write;

pub const HELP: &str = "\
Possible commands:
* spawn <territory> <rank>
    territories: americas, europe, africa, asia, antarctica, australia
    ranks: infantry, cavalry, artillery
* move <territory> <unit id> [unit id...]
* status
* spam <count>
* help
* quit";

pub fn render_help() -> &'static str {
    HELP
}

/// Describes the local player's units and every army this client knows about
pub fn render_status(state: &GameState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "You are {}", state.username());
    if state.is_paused() {
        let _ = writeln!(out, "The game is paused");
    }

    let own: Vec<_> = state.own_units().collect();
    if own.is_empty() {
        let _ = writeln!(out, "You have no units");
    } else {
        let _ = writeln!(out, "Your units:");
        for unit in &own {
            let _ = writeln!(out, "  * {}: {} in {}", unit.id, unit.rank, unit.location);
        }
    }

    let _ = writeln!(out, "Known armies:");
    let mut any = false;
    for territory in Territory::ALL {
        if let Some(army) = state.army_at(territory) {
            any = true;
            let _ = writeln!(
                out,
                "  * {}: {} ({})",
                territory,
                army.owner,
                describe_units(&army.units)
            );
        }
    }
    if !any {
        let _ = writeln!(out, "  none");
    }

    out
}

/// Unit counts by rank followed by total strength
pub fn describe_units(units: &[Unit]) -> String {
    let counts: Vec<String> = rank_counts(units)
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(rank, count)| format!("{} {}", count, rank))
        .collect();
    format!("{}, strength {}", counts.join(", "), strength(units))
}
