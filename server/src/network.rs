//! Server network layer: UDP transport around the authoritative tick loop

use crate::client_manager::{ClientManager, DEFAULT_CLIENT_TIMEOUT};
use crate::game::{ServerEcs, SessionHandler};
use log::{debug, error, info, warn};
use shared::time::utc_seconds;
use shared::{decode, encode, Message, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { message: Message, addr: SocketAddr },
    ClientTimeout { client_id: String },
    Shutdown,
}

/// Messages sent from the game loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { message: Message, addr: SocketAddr },
}

/// Tunables of the server loop
#[derive(Debug, Clone, Copy)]
pub struct ServerSettings {
    pub tick_duration: Duration,
    pub max_clients: usize,
    pub client_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(50),
            max_clients: 16,
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }
}

/// Main server coordinating networking and the synchronized simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game: ServerEcs,
    sessions: Box<dyn SessionHandler>,
    settings: ServerSettings,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        game: ServerEcs,
        sessions: Box<dyn SessionHandler>,
        settings: ServerSettings,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(settings.max_clients))),
            game,
            sessions,
            settings,
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn game(&self) -> &ServerEcs {
        &self.game
    }

    /// Handle for stopping [`Server::run`] from outside the loop
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 8192];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode(&buffer[..len]) {
                        Ok(message) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { message, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let Some(mut game_rx) = self.game_rx.take() else {
            warn!("Network sender already running");
            return;
        };

        tokio::spawn(async move {
            while let Some(GameMessage::SendPacket { message, addr }) = game_rx.recv().await {
                match encode(&message) {
                    Ok(data) => {
                        if let Err(e) = socket.send_to(&data, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    Err(e) => error!("Failed to encode packet for {}: {}", addr, e),
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.settings.client_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(timeout)
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    fn send_message(&self, message: Message, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { message, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn drop_session(&mut self, client_id: &str) {
        self.clients.write().await.remove_client(client_id);
        self.sessions.on_disconnect(&mut self.game, client_id);
    }

    /// Processes one decoded message from `addr`
    async fn handle_message(&mut self, message: Message, addr: SocketAddr) {
        match message {
            Message::Connect { client_version } => {
                info!("Client connecting from {} (version: {})", addr, client_version);

                if client_version != PROTOCOL_VERSION {
                    let reason = format!(
                        "Protocol version {} not supported, server speaks {}",
                        client_version, PROTOCOL_VERSION
                    );
                    self.send_message(Message::Disconnected { reason }, addr);
                    return;
                }

                // Reconnect from the same address replaces the old session
                let existing = self.clients.read().await.find_client_by_addr(addr);
                if let Some(existing_id) = existing {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.drop_session(&existing_id).await;
                }

                let client_id = self.clients.write().await.add_client(addr);
                let Some(client_id) = client_id else {
                    let reason = "Server full".to_string();
                    self.send_message(Message::Disconnected { reason }, addr);
                    return;
                };

                if let Err(e) = self.sessions.on_connect(&mut self.game, &client_id) {
                    error!("Failed to set up client {}: {}", client_id, e);
                    self.drop_session(&client_id).await;
                    let reason = "Server error".to_string();
                    self.send_message(Message::Disconnected { reason }, addr);
                    return;
                }

                self.send_message(Message::Connected { client_id }, addr);
            }

            Message::Input(packet) => {
                let client_id = {
                    let mut clients = self.clients.write().await;
                    let id = clients.find_client_by_addr(addr);
                    if let Some(id) = &id {
                        clients.touch(id);
                    }
                    id
                };

                match client_id {
                    Some(client_id) => {
                        self.game.on_client_packet(&client_id, &packet);
                    }
                    None => debug!("Input from unconnected address {}", addr),
                }
            }

            Message::Disconnect => {
                let client_id = self.clients.read().await.find_client_by_addr(addr);
                if let Some(client_id) = client_id {
                    self.drop_session(&client_id).await;
                }
            }

            other => {
                warn!("Unexpected message from client at {}: {:?}", addr, other);
            }
        }
    }

    /// Advances the simulation and sends every client its packet
    async fn run_tick(&mut self) {
        self.game.tick(utc_seconds());

        let packets = match self.game.build_packets() {
            Ok(packets) => packets,
            Err(e) => {
                error!("Failed to build state packets: {}", e);
                return;
            }
        };

        let addrs: Vec<(String, SocketAddr)> = self.clients.read().await.get_client_addrs();
        for (client_id, packet) in packets {
            match addrs.iter().find(|(id, _)| *id == client_id) {
                Some((_, addr)) => self.send_message(Message::State(packet), *addr),
                None => debug!("No address for client {}, skipping packet", client_id),
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.settings.tick_duration);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { message, addr }) => {
                            self.handle_message(message, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.sessions.on_disconnect(&mut self.game, &client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.run_tick().await;

                    let tick = self.game.tick_count();
                    if tick % 100 == 0 && self.game.client_count() > 0 {
                        debug!(
                            "Tick {}: {} clients, {} entities, dt avg {:.4}s",
                            tick,
                            self.game.client_count(),
                            self.game.ecs().len(),
                            self.game.time().dt_average()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}
