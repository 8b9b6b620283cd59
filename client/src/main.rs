use clap::Parser;
use client::commands::{execute, Reply};
use client::game::GameState;
use client::handlers::spawn_subscriptions;
use client::input::InputManager;
use client::rendering::render_help;
use client::RemoteChannel;
use log::{error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::Transport;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Broker address hosted by the server
    #[arg(short = 'b', long, default_value = "127.0.0.1:8080")]
    broker: String,

    /// Player name, asked for interactively when missing
    #[arg(short = 'u', long)]
    username: Option<String>,
}

fn prompt(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let mut input = InputManager::stdin();

    info!("Starting Peril client...");

    let username = match args.username.map(|u| u.trim().to_string()) {
        Some(username) if !username.is_empty() => username,
        _ => loop {
            prompt("Please enter your username: ");
            match input.next_line().await? {
                Some(line) => break line,
                None => return Ok(()),
            }
        },
    };

    let channel = Arc::new(RemoteChannel::connect(&args.broker, Some(&username)).await?);
    let transport: Arc<dyn Transport> = channel.clone();

    let state = GameState::new(username.clone()).shared();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let subscriptions = spawn_subscriptions(
        Arc::clone(&state),
        Arc::clone(&transport),
        &username,
        shutdown_rx,
    )?;

    println!("Welcome, {}!", username);
    println!("{}", render_help());

    let mut rng = StdRng::from_entropy();

    loop {
        prompt("> ");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down client...");
                break;
            }
            command = input.next_command() => match command {
                Ok(Some(Ok(command))) => {
                    match execute(command, &state, transport.as_ref(), &mut rng).await {
                        Ok(Reply::Message(text)) => println!("{}", text),
                        Ok(Reply::Quit) => {
                            println!("Goodbye!");
                            break;
                        }
                        Err(e) => println!("{}", e),
                    }
                }
                Ok(Some(Err(e))) => println!("{}", e),
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    for subscription in subscriptions {
        if let Err(e) = subscription.await {
            error!("Subscription task failed: {}", e);
        }
    }
    channel.close().await;

    info!("Client stopped");
    Ok(())
}
