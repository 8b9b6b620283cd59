//! Maps move and war outcomes onto delivery acknowledgements.
//!
//! | outcome                         | delivery      | follow-up            |
//! |---------------------------------|---------------|----------------------|
//! | move `SamePlayer`               | discard       |                      |
//! | move `SafeMove`                 | ack           |                      |
//! | move `MakeWar`                  | ack / requeue | war recognition      |
//! | war `NotInvolved`               | requeue       |                      |
//! | war `NoUnits`                   | discard       |                      |
//! | war `YouWon`/`OpponentWon`/`Draw` | ack / requeue | game log entry     |
//!
//! Where a follow-up publish fails the delivery is requeued so redelivery
//! produces it again. A war's effect on the game state is only kept once its
//! log entry is out.

use crate::game::{GameState, SharedGameState};
use crate::moves::{classify_move, MoveOutcome};
use crate::war::{resolve_war, WarOutcome};
use log::{error, info};
use shared::pubsub::{publish_game_log, publish_json, subscribe_json};
use shared::routing::{
    user_key, wildcard_key, ARMY_MOVES_PREFIX, EXCHANGE_DIRECT, EXCHANGE_TOPIC, PAUSE_KEY,
    WAR_QUEUE, WAR_RECOGNITIONS_PREFIX,
};
use shared::{
    AckType, MoveEvent, PlayingState, PubSubError, QueueSpec, QueueType, Transport,
    WarRecognition,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub fn handle_pause(state: &mut GameState, playing_state: PlayingState) -> AckType {
    state.handle_pause(playing_state);
    AckType::Ack
}

pub fn handle_move(state: &mut GameState, transport: &dyn Transport, event: MoveEvent) -> AckType {
    match classify_move(state, &event) {
        MoveOutcome::SamePlayer => AckType::NackDiscard,
        MoveOutcome::SafeMove => AckType::Ack,
        MoveOutcome::MakeWar { defender } => {
            let recognition = WarRecognition {
                attacker: event.player,
                defender,
                territory: event.to,
            };
            let routing_key = user_key(WAR_RECOGNITIONS_PREFIX, state.username());

            match publish_json(transport, EXCHANGE_TOPIC, &routing_key, &recognition) {
                Ok(()) => AckType::Ack,
                Err(e) => {
                    error!("Failed to publish war recognition: {}", e);
                    AckType::NackRequeue
                }
            }
        }
    }
}

pub fn handle_war(
    state: &mut GameState,
    transport: &dyn Transport,
    event: WarRecognition,
) -> AckType {
    let mut resolved = state.clone();
    let resolution = resolve_war(&mut resolved, &event);

    let message = match resolution.outcome {
        WarOutcome::NotInvolved => return AckType::NackRequeue,
        WarOutcome::NoUnits => return AckType::NackDiscard,
        WarOutcome::YouWon | WarOutcome::OpponentWon => format!(
            "{} won a war against {}",
            resolution.winner, resolution.loser
        ),
        WarOutcome::Draw => format!(
            "A war between {} and {} resulted in a draw",
            resolution.winner, resolution.loser
        ),
    };

    let ack = publish_game_log(transport, state.username(), &message);
    if ack == AckType::Ack {
        *state = resolved;
    }
    ack
}

/// Starts the pause, move and war subscriptions for one player
pub fn spawn_subscriptions(
    state: SharedGameState,
    transport: Arc<dyn Transport>,
    username: &str,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>, PubSubError> {
    let mut handles = Vec::new();

    let pause_state = Arc::clone(&state);
    handles.push(subscribe_json(
        Arc::clone(&transport),
        QueueSpec::new(
            EXCHANGE_DIRECT,
            user_key(PAUSE_KEY, username),
            PAUSE_KEY,
            QueueType::Transient,
        ),
        shutdown.clone(),
        move |playing_state: PlayingState| {
            let state = Arc::clone(&pause_state);
            async move {
                let mut game = state.write().await;
                handle_pause(&mut game, playing_state)
            }
        },
    )?);

    let move_state = Arc::clone(&state);
    let move_transport = Arc::clone(&transport);
    handles.push(subscribe_json(
        Arc::clone(&transport),
        QueueSpec::new(
            EXCHANGE_TOPIC,
            user_key(ARMY_MOVES_PREFIX, username),
            wildcard_key(ARMY_MOVES_PREFIX),
            QueueType::Transient,
        ),
        shutdown.clone(),
        move |event: MoveEvent| {
            let state = Arc::clone(&move_state);
            let transport = Arc::clone(&move_transport);
            async move {
                let mut game = state.write().await;
                handle_move(&mut game, transport.as_ref(), event)
            }
        },
    )?);

    let war_state = Arc::clone(&state);
    let war_transport = Arc::clone(&transport);
    handles.push(subscribe_json(
        Arc::clone(&transport),
        QueueSpec::new(
            EXCHANGE_TOPIC,
            WAR_QUEUE,
            wildcard_key(WAR_RECOGNITIONS_PREFIX),
            QueueType::Durable,
        ),
        shutdown,
        move |event: WarRecognition| {
            let state = Arc::clone(&war_state);
            let transport = Arc::clone(&war_transport);
            async move {
                let mut game = state.write().await;
                handle_war(&mut game, transport.as_ref(), event)
            }
        },
    )?);

    info!("{} is listening for pauses, moves and wars", username);
    Ok(handles)
}
