//! TCP front end of the hosted broker.
//!
//! Each connection gets its own broker channel. Frames read from the socket
//! are applied to that channel in order; deliveries flow back through one
//! pump task per consumed queue into a single writer task, so a connection
//! never has two frames in flight on the socket at once. When the socket
//! closes for any reason the channel is closed too, which requeues every
//! delivery the connection left unsettled.

use crate::client_manager::{Client, ClientManager};
use log::{debug, error, info, warn};
use shared::broker::{Broker, BrokerChannel};
use shared::wire::{read_frame, write_frame, Frame, PROTOCOL_VERSION};
use shared::{PubSubError, QueueSpec, Transport};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;

pub struct BrokerServer {
    listener: TcpListener,
    broker: Broker,
    clients: Arc<RwLock<ClientManager>>,
}

impl BrokerServer {
    pub async fn bind(addr: &str, broker: Broker, max_clients: usize) -> Result<Self, PubSubError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Broker listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            broker,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, PubSubError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn clients(&self) -> Arc<RwLock<ClientManager>> {
        Arc::clone(&self.clients)
    }

    /// Accepts connections until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let broker = self.broker.clone();
                        let clients = Arc::clone(&self.clients);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, broker, clients).await {
                                warn!("Connection from {} ended with error: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }
        info!("Broker stopped accepting connections");
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    broker: Broker,
    clients: Arc<RwLock<ClientManager>>,
) -> Result<(), PubSubError> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    let username = match read_frame(&mut reader).await? {
        Some(Frame::Hello {
            protocol_version,
            username,
        }) if protocol_version == PROTOCOL_VERSION => username,
        Some(Frame::Hello {
            protocol_version, ..
        }) => {
            let reason = format!(
                "unsupported protocol version {}, expected {}",
                protocol_version, PROTOCOL_VERSION
            );
            write_frame(&mut writer, &Frame::Error { reason: reason.clone() }).await?;
            return Err(PubSubError::Handshake { reason });
        }
        Some(other) => {
            let reason = format!("expected hello, got {:?}", other);
            write_frame(&mut writer, &Frame::Error { reason: reason.clone() }).await?;
            return Err(PubSubError::Handshake { reason });
        }
        None => return Ok(()),
    };

    let channel = broker.channel();
    let id = channel.owner();
    let rejection = {
        let mut registry = clients.write().await;
        let taken_by = username
            .as_deref()
            .and_then(|name| registry.find_by_username(name));
        match (taken_by, &username) {
            (Some(other), Some(name)) => {
                Some(format!("username {} is already used by connection {}", name, other))
            }
            _ if !registry.add_client(Client::new(id, addr, username.clone())) => {
                Some("server full".to_string())
            }
            _ => None,
        }
    };
    if let Some(reason) = rejection {
        write_frame(&mut writer, &Frame::Error { reason: reason.clone() }).await?;
        return Err(PubSubError::Handshake { reason });
    }

    write_frame(&mut writer, &Frame::Welcome { connection_id: id }).await?;

    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let writer_handle = tokio::spawn(write_loop(writer, outbound_rx));

    let mut connection = Connection {
        id,
        channel,
        outbound,
        clients: Arc::clone(&clients),
        pumps: Vec::new(),
    };
    let result = connection.read_loop(&mut reader).await;

    connection.close().await;
    if let Err(e) = writer_handle.await {
        error!("Writer task for client {} failed: {}", id, e);
    }
    result
}

/// Per-connection state while frames are being read
struct Connection {
    id: u64,
    channel: BrokerChannel,
    outbound: mpsc::UnboundedSender<Frame>,
    clients: Arc<RwLock<ClientManager>>,
    pumps: Vec<JoinHandle<()>>,
}

impl Connection {
    async fn read_loop(&mut self, reader: &mut OwnedReadHalf) -> Result<(), PubSubError> {
        loop {
            let frame = match read_frame(reader).await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                // The length prefix was consumed, so the stream is still aligned
                Err(PubSubError::Binary(e)) => {
                    error!("Dropping malformed frame from client {}: {}", self.id, e);
                    self.reply_error(format!("malformed frame: {}", e));
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.clients.write().await.record_frame_in(self.id);
            if !self.apply(frame) {
                return Ok(());
            }
        }
    }

    /// Applies one frame to the broker, false once the client said goodbye
    fn apply(&mut self, frame: Frame) -> bool {
        let result = match frame {
            Frame::DeclareAndBind {
                exchange,
                queue,
                binding_key,
                queue_type,
            } => self
                .channel
                .declare_and_bind(&QueueSpec::new(exchange, queue, binding_key, queue_type)),
            Frame::Consume { queue } => self.start_pump(&queue),
            Frame::Publish {
                exchange,
                routing_key,
                body,
            } => self.channel.publish(&exchange, &routing_key, body),
            Frame::Settle {
                queue,
                delivery_tag,
                ack,
            } => self.channel.broker().settle(&queue, delivery_tag, ack),
            Frame::Goodbye => {
                debug!("Client {} said goodbye", self.id);
                return false;
            }
            other => {
                warn!("Unexpected frame from client {}: {:?}", self.id, other);
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("Client {} request failed: {}", self.id, e);
            self.reply_error(e.to_string());
        }
        true
    }

    fn start_pump(&mut self, queue: &str) -> Result<(), PubSubError> {
        let mut deliveries = self.channel.consume(queue)?;
        let outbound = self.outbound.clone();
        let clients = Arc::clone(&self.clients);
        let id = self.id;

        self.pumps.push(tokio::spawn(async move {
            while let Some(delivery) = deliveries.recv().await {
                if outbound.send(Frame::Deliver(delivery)).is_err() {
                    break;
                }
                clients.write().await.record_delivery_out(id);
            }
        }));
        Ok(())
    }

    fn reply_error(&self, reason: String) {
        let _ = self.outbound.send(Frame::Error { reason });
    }

    /// Releases the broker channel and stops the writer once its queue drains
    async fn close(self) {
        self.channel.close();
        for pump in &self.pumps {
            pump.abort();
        }
        self.clients.write().await.remove_client(self.id);
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut outbound: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            debug!("Failed to write frame: {}", e);
            break;
        }
    }
}
