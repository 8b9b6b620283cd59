//! Integration tests for full Peril game flows
//!
//! These tests run real clients against the server's broker, first in
//! process and then over TCP, and check what ends up in every player's view
//! and in the server's game log.

use client::commands::{execute, Reply};
use client::game::{GameState, SharedGameState};
use client::handlers::spawn_subscriptions;
use client::input::Command;
use client::RemoteChannel;
use rand::rngs::StdRng;
use rand::SeedableRng;
use server::admin::publish_playing_state;
use server::game_log::GameLogWriter;
use server::network::BrokerServer;
use server::observers::spawn_observers;
use shared::routing::WAR_QUEUE;
use shared::{Broker, Rank, Territory, Transport};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

/// Polls `check` for up to two seconds
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

fn temp_log(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("peril-it-{}-{}.log", name, std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

async fn read_log(path: &PathBuf) -> String {
    tokio::fs::read_to_string(path).await.unwrap_or_default()
}

/// A game server running its observers on an in-process broker
struct TestServer {
    broker: Broker,
    log_path: PathBuf,
    admin: Arc<dyn Transport>,
    shutdown: watch::Sender<bool>,
}

impl TestServer {
    fn start(name: &str) -> Self {
        let broker = Broker::with_game_exchanges();
        let log_path = temp_log(name);
        let admin: Arc<dyn Transport> = Arc::new(broker.channel());
        let (shutdown, shutdown_rx) = watch::channel(false);
        spawn_observers(
            Arc::clone(&admin),
            Arc::new(GameLogWriter::new(&log_path)),
            shutdown_rx,
        )
        .unwrap();

        Self {
            broker,
            log_path,
            admin,
            shutdown,
        }
    }

    fn subscriber(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

struct Player {
    state: SharedGameState,
    transport: Arc<dyn Transport>,
}

impl Player {
    fn join(transport: Arc<dyn Transport>, username: &str, shutdown: watch::Receiver<bool>) -> Self {
        let state = GameState::new(username).shared();
        spawn_subscriptions(Arc::clone(&state), Arc::clone(&transport), username, shutdown).unwrap();
        Self { state, transport }
    }

    async fn run(&self, command: Command) -> Reply {
        let mut rng = StdRng::seed_from_u64(0);
        execute(command, &self.state, self.transport.as_ref(), &mut rng)
            .await
            .unwrap()
    }

    async fn spawn_many(&self, territory: Territory, rank: Rank, count: usize) {
        for _ in 0..count {
            self.run(Command::Spawn { territory, rank }).await;
        }
    }

    async fn move_all(&self, from: Territory, to: Territory) {
        let unit_ids: Vec<u32> = self
            .state
            .read()
            .await
            .own_units_at(from)
            .iter()
            .map(|u| u.id)
            .collect();
        self.run(Command::Move { to, unit_ids }).await;
    }

    async fn holder_of(&self, territory: Territory) -> Option<String> {
        self.state
            .read()
            .await
            .army_at(territory)
            .map(|army| army.owner.clone())
    }
}

/// Bob settles in Asia, then alice marches her army in on top of him
async fn invade_asia(alice: &Player, bob: &Player, alice_infantry: usize, bob_infantry: usize) {
    bob.spawn_many(Territory::Europe, Rank::Infantry, bob_infantry).await;
    bob.move_all(Territory::Europe, Territory::Asia).await;
    assert!(eventually(|| async { alice.holder_of(Territory::Asia).await.as_deref() == Some("bob") }).await);

    alice.spawn_many(Territory::Africa, Rank::Infantry, alice_infantry).await;
    alice.move_all(Territory::Africa, Territory::Asia).await;
}

/// IN-PROCESS BROKER FLOWS
mod in_memory_tests {
    use super::*;

    #[tokio::test]
    async fn stronger_attacker_wins_and_is_logged() {
        let server = TestServer::start("win");
        let alice = Player::join(Arc::new(server.broker.channel()), "alice", server.subscriber());
        let bob = Player::join(Arc::new(server.broker.channel()), "bob", server.subscriber());

        invade_asia(&alice, &bob, 3, 2).await;

        let log_path = server.log_path.clone();
        assert!(eventually(|| async { read_log(&log_path).await.contains("alice won a war against bob") }).await);
        assert!(!read_log(&log_path).await.contains("bob won"));

        let broker = server.broker.clone();
        assert!(
            eventually(|| async {
                let stats = broker.queue_stats(WAR_QUEUE).unwrap();
                stats.ready == 0 && stats.unacked == 0
            })
            .await
        );

        // Game log lines carry the name of the client that resolved the war
        assert_eq!(alice.holder_of(Territory::Asia).await.as_deref(), Some("alice"));
        if read_log(&server.log_path).await.contains("bob: alice won a war against bob") {
            assert_eq!(bob.holder_of(Territory::Asia).await.as_deref(), Some("alice"));
            assert!(bob.state.read().await.own_units_at(Territory::Asia).is_empty());
        }
    }

    #[tokio::test]
    async fn equal_armies_draw() {
        let server = TestServer::start("draw");
        let alice = Player::join(Arc::new(server.broker.channel()), "alice", server.subscriber());
        let bob = Player::join(Arc::new(server.broker.channel()), "bob", server.subscriber());

        invade_asia(&alice, &bob, 2, 2).await;

        let log_path = server.log_path.clone();
        assert!(
            eventually(|| async {
                read_log(&log_path)
                    .await
                    .contains("A war between alice and bob resulted in a draw")
            })
            .await
        );
    }

    #[tokio::test]
    async fn uninvolved_player_passes_the_war_on() {
        let server = TestServer::start("third");
        let alice = Player::join(Arc::new(server.broker.channel()), "alice", server.subscriber());
        let bob = Player::join(Arc::new(server.broker.channel()), "bob", server.subscriber());
        let carol = Player::join(Arc::new(server.broker.channel()), "carol", server.subscriber());
        carol.spawn_many(Territory::Australia, Rank::Artillery, 1).await;

        invade_asia(&alice, &bob, 3, 2).await;

        let log_path = server.log_path.clone();
        assert!(eventually(|| async { read_log(&log_path).await.contains("alice won a war against bob") }).await);

        let log = read_log(&server.log_path).await;
        assert!(!log.contains("carol"));
        assert_eq!(carol.state.read().await.own_units_at(Territory::Australia).len(), 1);
    }

    #[tokio::test]
    async fn only_the_defender_declares_war() {
        let server = TestServer::start("bystander");
        let alice = Player::join(Arc::new(server.broker.channel()), "alice", server.subscriber());
        let bob = Player::join(Arc::new(server.broker.channel()), "bob", server.subscriber());
        let carol = Player::join(Arc::new(server.broker.channel()), "carol", server.subscriber());

        bob.spawn_many(Territory::Europe, Rank::Infantry, 1).await;
        bob.move_all(Territory::Europe, Territory::Asia).await;
        assert!(
            eventually(|| async {
                alice.holder_of(Territory::Asia).await.as_deref() == Some("bob")
                    && carol.holder_of(Territory::Asia).await.as_deref() == Some("bob")
            })
            .await
        );

        // Reinforcements nobody else hears about
        bob.spawn_many(Territory::Asia, Rank::Artillery, 5).await;

        alice.spawn_many(Territory::Africa, Rank::Infantry, 3).await;
        alice.move_all(Territory::Africa, Territory::Asia).await;

        let log_path = server.log_path.clone();
        assert!(eventually(|| async { read_log(&log_path).await.contains("bob won a war against alice") }).await);

        let broker = server.broker.clone();
        assert!(
            eventually(|| async {
                let stats = broker.queue_stats(WAR_QUEUE).unwrap();
                stats.ready == 0 && stats.unacked == 0
            })
            .await
        );

        let log = read_log(&server.log_path).await;
        assert!(!log.contains("alice won"));
        assert_eq!(log.lines().filter(|line| line.contains("won a war")).count(), 1);
    }

    #[tokio::test]
    async fn pause_stops_every_player() {
        let server = TestServer::start("pause");
        let alice = Player::join(Arc::new(server.broker.channel()), "alice", server.subscriber());
        let bob = Player::join(Arc::new(server.broker.channel()), "bob", server.subscriber());

        publish_playing_state(server.admin.as_ref(), true).unwrap();
        assert!(eventually(|| async { alice.state.read().await.is_paused() && bob.state.read().await.is_paused() }).await);

        let refused = execute(
            Command::Spawn {
                territory: Territory::Asia,
                rank: Rank::Cavalry,
            },
            &alice.state,
            alice.transport.as_ref(),
            &mut StdRng::seed_from_u64(0),
        )
        .await;
        assert!(refused.is_err());

        publish_playing_state(server.admin.as_ref(), false).unwrap();
        assert!(eventually(|| async { !alice.state.read().await.is_paused() }).await);
        alice.spawn_many(Territory::Asia, Rank::Cavalry, 1).await;
    }

    #[tokio::test]
    async fn spam_lands_in_the_game_log() {
        let server = TestServer::start("spam");
        let mallory = Player::join(Arc::new(server.broker.channel()), "mallory", server.subscriber());

        let reply = mallory.run(Command::Spam(4)).await;
        assert_eq!(reply, Reply::Message("Published 4 malicious logs".to_string()));

        let log_path = server.log_path.clone();
        assert!(
            eventually(|| async {
                read_log(&log_path)
                    .await
                    .lines()
                    .filter(|line| line.contains("mallory:"))
                    .count()
                    == 4
            })
            .await
        );
    }

    #[tokio::test]
    async fn own_move_echo_is_dead_lettered() {
        let server = TestServer::start("echo");
        let alice = Player::join(Arc::new(server.broker.channel()), "alice", server.subscriber());

        alice.spawn_many(Territory::Europe, Rank::Infantry, 1).await;
        alice.move_all(Territory::Europe, Territory::Asia).await;

        let broker = server.broker.clone();
        assert!(
            eventually(|| async {
                let stats = broker.queue_stats("army_moves.alice").unwrap();
                stats.ready == 0 && stats.unacked == 0
            })
            .await
        );
        assert_eq!(alice.holder_of(Territory::Asia).await.as_deref(), Some("alice"));
    }
}

/// TCP BROKER FLOWS
mod tcp_tests {
    use super::*;

    async fn serve(server: &TestServer) -> String {
        let host = BrokerServer::bind("127.0.0.1:0", server.broker.clone(), 8)
            .await
            .unwrap();
        let addr = host.local_addr().unwrap().to_string();
        tokio::spawn(host.run(server.subscriber()));
        addr
    }

    async fn connect(addr: &str, username: &str, server: &TestServer) -> Player {
        let channel = RemoteChannel::connect(addr, Some(username)).await.unwrap();
        Player::join(Arc::new(channel), username, server.subscriber())
    }

    async fn wait_for_consumers(broker: &Broker, queue: &str, consumers: usize) {
        assert!(
            eventually(|| async {
                broker
                    .queue_stats(queue)
                    .map(|stats| stats.consumers == consumers)
                    .unwrap_or(false)
            })
            .await,
            "{} never reached {} consumers",
            queue,
            consumers
        );
    }

    #[tokio::test]
    async fn war_over_tcp_is_logged() {
        let server = TestServer::start("tcp-cavalry");
        let addr = serve(&server).await;

        let alice = connect(&addr, "alice", &server).await;
        let bob = connect(&addr, "bob", &server).await;
        wait_for_consumers(&server.broker, "army_moves.alice", 1).await;
        wait_for_consumers(&server.broker, "army_moves.bob", 1).await;
        wait_for_consumers(&server.broker, WAR_QUEUE, 2).await;

        bob.spawn_many(Territory::Europe, Rank::Infantry, 4).await;
        bob.move_all(Territory::Europe, Territory::Asia).await;
        assert!(eventually(|| async { alice.holder_of(Territory::Asia).await.as_deref() == Some("bob") }).await);

        alice.spawn_many(Territory::Africa, Rank::Cavalry, 1).await;
        alice.move_all(Territory::Africa, Territory::Asia).await;

        let log_path = server.log_path.clone();
        assert!(eventually(|| async { read_log(&log_path).await.contains("alice won a war against bob") }).await);
    }

    #[tokio::test]
    async fn pause_over_tcp() {
        let server = TestServer::start("tcp-pause");
        let addr = serve(&server).await;

        let alice = connect(&addr, "alice", &server).await;
        wait_for_consumers(&server.broker, "pause.alice", 1).await;

        publish_playing_state(server.admin.as_ref(), true).unwrap();
        assert!(eventually(|| async { alice.state.read().await.is_paused() }).await);
    }
}
