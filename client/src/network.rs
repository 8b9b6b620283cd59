//! Connection to a broker hosted by the server process.
//!
//! One TCP stream carries every queue. Outbound frames go through an mpsc
//! queue drained by a single writer task, so publishes and settlements from
//! concurrent handlers never interleave on the socket. A reader task hands
//! each delivery to the subscription consuming its queue.

use log::{debug, error, info, warn};
use shared::wire::{read_frame, write_frame, Frame, PROTOCOL_VERSION};
use shared::{AckType, Delivery, PubSubError, QueueSpec, Transport};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

type Routes = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Delivery>>>>;

pub struct RemoteChannel {
    connection_id: u64,
    outbound: mpsc::UnboundedSender<Frame>,
    routes: Routes,
}

impl RemoteChannel {
    /// Connects and completes the handshake before returning
    pub async fn connect(addr: &str, username: Option<&str>) -> Result<Self, PubSubError> {
        info!("Connecting to broker at {}...", addr);
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();

        let hello = Frame::Hello {
            protocol_version: PROTOCOL_VERSION,
            username: username.map(str::to_string),
        };
        write_frame(&mut writer, &hello).await?;

        let connection_id = match read_frame(&mut reader).await? {
            Some(Frame::Welcome { connection_id }) => connection_id,
            Some(Frame::Error { reason }) => return Err(PubSubError::Handshake { reason }),
            Some(other) => {
                return Err(PubSubError::Handshake {
                    reason: format!("unexpected frame {:?}", other),
                })
            }
            None => return Err(PubSubError::TransportClosed),
        };
        info!("Connected! Connection ID: {}", connection_id);

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(write_loop(writer, outbound_rx));
        tokio::spawn(read_loop(reader, Arc::clone(&routes)));

        Ok(Self {
            connection_id,
            outbound,
            routes,
        })
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Tells the broker we are leaving and waits for the goodbye to be
    /// written. The broker requeues whatever we left unsettled.
    pub async fn close(&self) {
        let _ = self.outbound.send(Frame::Goodbye);
        self.outbound.closed().await;
    }

    fn send(&self, frame: Frame) -> Result<(), PubSubError> {
        self.outbound
            .send(frame)
            .map_err(|_| PubSubError::TransportClosed)
    }
}

impl Transport for RemoteChannel {
    /// Succeeds once the frame is queued for the writer. A broker that
    /// rejects the publish answers with an error frame the reader logs.
    fn publish(&self, exchange: &str, routing_key: &str, body: Vec<u8>) -> Result<(), PubSubError> {
        self.send(Frame::Publish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body,
        })
    }

    fn declare_and_bind(&self, spec: &QueueSpec) -> Result<(), PubSubError> {
        self.send(Frame::DeclareAndBind {
            exchange: spec.exchange.clone(),
            queue: spec.queue.clone(),
            binding_key: spec.binding_key.clone(),
            queue_type: spec.queue_type,
        })
    }

    fn consume(&self, queue: &str) -> Result<mpsc::UnboundedReceiver<Delivery>, PubSubError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(queue.to_string(), sender);
        self.send(Frame::Consume {
            queue: queue.to_string(),
        })?;
        Ok(receiver)
    }

    fn settle(&self, delivery: &Delivery, ack: AckType) -> Result<(), PubSubError> {
        self.send(Frame::Settle {
            queue: delivery.queue.clone(),
            delivery_tag: delivery.delivery_tag,
            ack,
        })
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut outbound: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = outbound.recv().await {
        let leaving = matches!(frame, Frame::Goodbye);
        if let Err(e) = write_frame(&mut writer, &frame).await {
            error!("Failed to send frame to broker: {}", e);
            break;
        }
        if leaving {
            break;
        }
    }
    debug!("Broker writer stopped");
}

async fn read_loop(mut reader: OwnedReadHalf, routes: Routes) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(Frame::Deliver(delivery))) => {
                let routes = routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                match routes.get(&delivery.queue) {
                    Some(sender) => {
                        if sender.send(delivery).is_err() {
                            debug!("Subscription dropped before delivery arrived");
                        }
                    }
                    None => warn!("Delivery for unconsumed queue {}", delivery.queue),
                }
            }
            Ok(Some(Frame::Error { reason })) => error!("Broker error: {}", reason),
            Ok(Some(other)) => warn!("Unexpected frame from broker: {:?}", other),
            Ok(None) => {
                info!("Broker closed the connection");
                break;
            }
            Err(e) => {
                error!("Failed to read from broker: {}", e);
                break;
            }
        }
    }

    // Ends every subscription loop fed by this connection
    routes
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::{timeout, Duration};

    /// Accepts one connection, welcomes it and echoes publishes back as
    /// deliveries on the queue named by the routing key
    async fn echo_broker() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = stream.into_split();
            let mut tag = 0;
            while let Ok(Some(frame)) = read_frame(&mut reader).await {
                let reply = match frame {
                    Frame::Hello { .. } => Frame::Welcome { connection_id: 42 },
                    Frame::Publish {
                        routing_key, body, ..
                    } => {
                        tag += 1;
                        Frame::Deliver(Delivery {
                            queue: routing_key.clone(),
                            delivery_tag: tag,
                            routing_key,
                            body,
                            redelivered: false,
                        })
                    }
                    Frame::Goodbye => break,
                    _ => continue,
                };
                write_frame(&mut writer, &reply).await.unwrap();
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_handshake_and_delivery_routing() {
        let addr = echo_broker().await;
        let channel = RemoteChannel::connect(&addr, Some("alice")).await.unwrap();
        assert_eq!(channel.connection_id(), 42);

        let mut deliveries = channel.consume("pause.alice").unwrap();
        channel.publish("peril_direct", "pause.alice", vec![1, 2, 3]).unwrap();

        let delivery = timeout(Duration::from_secs(1), deliveries.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.body, vec![1, 2, 3]);
        assert_eq!(delivery.delivery_tag, 1);
    }

    #[tokio::test]
    async fn test_subscriptions_end_when_broker_goes_away() {
        let addr = echo_broker().await;
        let channel = RemoteChannel::connect(&addr, None).await.unwrap();
        let mut deliveries = channel.consume("war").unwrap();

        channel.close().await;
        let ended = timeout(Duration::from_secs(1), deliveries.recv()).await.unwrap();
        assert!(ended.is_none());
    }

    #[tokio::test]
    async fn test_rejected_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_frame(&mut stream).await;
            let reject = Frame::Error {
                reason: "server full".to_string(),
            };
            write_frame(&mut stream, &reject).await.unwrap();
        });

        let result = RemoteChannel::connect(&addr, None).await;
        assert!(matches!(result, Err(PubSubError::Handshake { reason }) if reason == "server full"));
    }
}
