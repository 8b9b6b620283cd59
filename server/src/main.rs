use clap::Parser;
use log::{error, info, warn};
use server::admin::{describe_clients, parse_command, publish_playing_state, ServerCommand, HELP};
use server::game_log::{GameLogWriter, DEFAULT_LOG_FILE};
use server::network::BrokerServer;
use server::observers::spawn_observers;
use shared::{Broker, Transport};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

/// Main-method of the application.
/// Parses command-line arguments, hosts the broker and runs the admin REPL.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// File game log entries are appended to
        #[clap(short, long, default_value = DEFAULT_LOG_FILE)]
        log_file: String,
        /// Maximum number of concurrent connections
        #[clap(short, long, default_value = "64")]
        max_clients: usize,
    }

    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let broker = Broker::with_game_exchanges();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let local = broker.channel();
    let transport: Arc<dyn Transport> = Arc::new(local.clone());
    let writer = Arc::new(GameLogWriter::new(&args.log_file));
    let observers = spawn_observers(Arc::clone(&transport), writer, shutdown_rx.clone())?;
    info!("Writing game logs to {}", args.log_file);

    let address = format!("{}:{}", args.host, args.port);
    let server = BrokerServer::bind(&address, broker, args.max_clients).await?;
    let clients = server.clients();
    let server_handle = tokio::spawn(server.run(shutdown_rx));

    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read input: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                match parse_command(&line) {
                    Some(ServerCommand::Pause) => {
                        if let Err(e) = publish_playing_state(transport.as_ref(), true) {
                            error!("Could not publish pause: {}", e);
                        }
                    }
                    Some(ServerCommand::Resume) => {
                        if let Err(e) = publish_playing_state(transport.as_ref(), false) {
                            error!("Could not publish resume: {}", e);
                        }
                    }
                    Some(ServerCommand::Status) => {
                        println!("{}", describe_clients(&*clients.read().await));
                    }
                    Some(ServerCommand::Help) => println!("{}", HELP),
                    Some(ServerCommand::Quit) => {
                        println!("Good bye!");
                        break;
                    }
                    None => warn!("Unknown command '{}', type 'help' for a list", line.trim()),
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    for observer in observers {
        if let Err(e) = observer.await {
            error!("Observer task failed: {}", e);
        }
    }
    local.close();
    if let Err(e) = server_handle.await {
        error!("Broker task failed: {}", e);
    }

    info!("Server stopped");
    Ok(())
}
