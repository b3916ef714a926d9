//! UDP transport running on its own tokio runtime thread
//!
//! The macroquad frame loop cannot await socket futures, so all socket work
//! happens on a background thread. The two sides exchange decoded
//! [`Message`]s over unbounded channels; the frame loop polls with
//! [`Transport::try_recv`] and never blocks.

use log::{debug, error, info, warn};
use shared::{decode, encode, Message, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::sleep;

pub struct Transport {
    outgoing: mpsc::UnboundedSender<Message>,
    incoming: mpsc::UnboundedReceiver<Message>,
    thread: Option<JoinHandle<()>>,
}

impl Transport {
    /// Starts the network thread and sends the connect request.
    ///
    /// `fake_ping_ms` adds half of the given latency to every outgoing and
    /// every incoming message.
    pub fn connect(server_addr: &str, fake_ping_ms: u64) -> Result<Self, Box<dyn std::error::Error>> {
        let server_addr: SocketAddr = server_addr.parse()?;
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        let thread = std::thread::Builder::new()
            .name("network".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to start network runtime: {}", e);
                        return;
                    }
                };
                let delay = Duration::from_millis(fake_ping_ms / 2);
                runtime.block_on(run_socket(server_addr, delay, outgoing_rx, incoming_tx));
            })?;

        let transport = Self {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
            thread: Some(thread),
        };

        info!("Connecting to server at {}...", server_addr);
        transport.send(Message::Connect {
            client_version: PROTOCOL_VERSION,
        });
        Ok(transport)
    }

    /// Queues a message for sending. Returns false once the thread is gone.
    pub fn send(&self, message: Message) -> bool {
        self.outgoing.send(message).is_ok()
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.incoming.try_recv().ok()
    }

    /// Sends a disconnect and waits for the network thread to finish
    pub fn shutdown(mut self) {
        self.send(Message::Disconnect);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Network thread panicked");
            }
        }
    }
}

async fn send_to(socket: &UdpSocket, message: &Message, addr: SocketAddr) {
    match encode(message) {
        Ok(data) => {
            if let Err(e) = socket.send_to(&data, addr).await {
                error!("Failed to send packet to {}: {}", addr, e);
            }
        }
        Err(e) => error!("Failed to encode packet: {}", e),
    }
}

async fn run_socket(
    server_addr: SocketAddr,
    delay: Duration,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    incoming: mpsc::UnboundedSender<Message>,
) {
    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => Arc::new(socket),
        Err(e) => {
            error!("Failed to bind client socket: {}", e);
            return;
        }
    };

    let mut buffer = [0u8; 8192];

    loop {
        tokio::select! {
            message = outgoing.recv() => {
                let Some(message) = message else {
                    break;
                };
                let disconnect = matches!(message, Message::Disconnect);

                if delay.is_zero() || disconnect {
                    send_to(&socket, &message, server_addr).await;
                } else {
                    let socket = Arc::clone(&socket);
                    tokio::spawn(async move {
                        sleep(delay).await;
                        send_to(&socket, &message, server_addr).await;
                    });
                }

                if disconnect {
                    break;
                }
            },

            result = socket.recv_from(&mut buffer) => {
                match result {
                    Ok((len, addr)) if addr == server_addr => match decode(&buffer[..len]) {
                        Ok(message) => {
                            if delay.is_zero() {
                                if incoming.send(message).is_err() {
                                    break;
                                }
                            } else {
                                let incoming = incoming.clone();
                                tokio::spawn(async move {
                                    sleep(delay).await;
                                    let _ = incoming.send(message);
                                });
                            }
                        }
                        Err(e) => warn!("Dropping packet from server: {}", e),
                    },
                    Ok((_, addr)) => debug!("Ignoring packet from {}", addr),
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        sleep(Duration::from_millis(10)).await;
                    }
                }
            },
        }
    }

    info!("Network thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket as StdUdpSocket;
    use std::time::Instant;

    fn fake_server() -> (StdUdpSocket, String) {
        let socket = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        (socket, addr)
    }

    fn wait_for(transport: &mut Transport) -> Message {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(message) = transport.try_recv() {
                return message;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("no message from transport");
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        assert!(Transport::connect("not an address", 0).is_err());
    }

    #[test]
    fn test_connect_handshake() {
        let (server, addr) = fake_server();
        let mut transport = Transport::connect(&addr, 0).unwrap();

        let mut buffer = [0u8; 2048];
        let (len, client_addr) = server.recv_from(&mut buffer).unwrap();
        assert_eq!(
            decode(&buffer[..len]).unwrap(),
            Message::Connect {
                client_version: PROTOCOL_VERSION
            }
        );

        let reply = encode(&Message::Connected {
            client_id: "client-1".to_string(),
        })
        .unwrap();
        server.send_to(&reply, client_addr).unwrap();

        assert_eq!(
            wait_for(&mut transport),
            Message::Connected {
                client_id: "client-1".to_string()
            }
        );

        transport.shutdown();
        let (len, _) = server.recv_from(&mut buffer).unwrap();
        assert_eq!(decode(&buffer[..len]).unwrap(), Message::Disconnect);
    }

    #[test]
    fn test_fake_ping_delays_delivery() {
        let (server, addr) = fake_server();
        let started = Instant::now();
        let transport = Transport::connect(&addr, 100).unwrap();

        let mut buffer = [0u8; 2048];
        server.recv_from(&mut buffer).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));

        transport.shutdown();
    }
}
