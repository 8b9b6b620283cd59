//! Subscriptions the server runs against its own broker

use crate::game_log::GameLogWriter;
use log::{error, info, warn};
use shared::pubsub::{subscribe_binary, subscribe_json};
use shared::routing::{
    wildcard_key, DEAD_LETTER_QUEUE, EXCHANGE_DEAD_LETTER, EXCHANGE_TOPIC, GAME_LOG_QUEUE,
    GAME_LOG_SLUG, WAR_OBSERVER_QUEUE, WAR_RECOGNITIONS_PREFIX,
};
use shared::{
    AckType, GameLogEntry, PubSubError, QueueSpec, QueueType, Transport, WarRecognition,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub fn game_log_spec() -> QueueSpec {
    QueueSpec::new(
        EXCHANGE_TOPIC,
        GAME_LOG_QUEUE,
        wildcard_key(GAME_LOG_SLUG),
        QueueType::Durable,
    )
}

pub fn war_observer_spec() -> QueueSpec {
    QueueSpec::new(
        EXCHANGE_TOPIC,
        WAR_OBSERVER_QUEUE,
        wildcard_key(WAR_RECOGNITIONS_PREFIX),
        QueueType::Transient,
    )
}

pub fn dead_letter_spec() -> QueueSpec {
    QueueSpec::new(EXCHANGE_DEAD_LETTER, DEAD_LETTER_QUEUE, "#", QueueType::Durable)
}

pub fn observe_war(event: &WarRecognition) -> AckType {
    info!(
        "War recognized: {} ({} strength) attacks {} ({} strength) in {}",
        event.attacker.username,
        event.attacker.strength_at(event.territory),
        event.defender.username,
        event.defender.strength_at(event.territory),
        event.territory
    );
    AckType::Ack
}

/// Starts the game-log writer, the war observer and the dead-letter logger
pub fn spawn_observers(
    transport: Arc<dyn Transport>,
    log_writer: Arc<GameLogWriter>,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>, PubSubError> {
    let mut handles = Vec::new();

    handles.push(subscribe_binary(
        Arc::clone(&transport),
        game_log_spec(),
        shutdown.clone(),
        move |entry: GameLogEntry| {
            let writer = Arc::clone(&log_writer);
            async move { writer.handle(entry).await }
        },
    )?);

    handles.push(subscribe_json(
        Arc::clone(&transport),
        war_observer_spec(),
        shutdown.clone(),
        |event: WarRecognition| async move { observe_war(&event) },
    )?);

    handles.push(spawn_dead_letter_logger(transport, shutdown)?);

    Ok(handles)
}

/// Dead letters arrive in whatever encoding they were published with, so
/// they are logged raw instead of going through a typed subscription
fn spawn_dead_letter_logger(
    transport: Arc<dyn Transport>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>, PubSubError> {
    let spec = dead_letter_spec();
    transport.declare_and_bind(&spec)?;
    let mut deliveries = transport.consume(&spec.queue)?;

    Ok(tokio::spawn(async move {
        loop {
            let delivery = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                delivery = deliveries.recv() => match delivery {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            warn!(
                "Dead letter from {} ({} bytes)",
                delivery.routing_key,
                delivery.body.len()
            );
            if let Err(e) = transport.settle(&delivery, AckType::Ack) {
                error!("Failed to settle dead letter: {}", e);
                if e.is_transient() {
                    break;
                }
            }
        }
        info!("Dead-letter logger stopped");
    }))
}
