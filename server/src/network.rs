//! UDP transport and the server's single event loop.
//!
//! All game mutation happens on the loop inside [`Server::run`]: packets
//! arrive through a channel from the receiver task and are dispatched
//! one at a time, so attacks against the shared engine and cooldown
//! registry are serialized by construction. Outbound traffic goes the
//! other way, through a channel drained by the sender task, which also
//! keeps reply/broadcast ordering first-in first-out.

use crate::client_manager::ClientManager;
use crate::session::GameSession;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, DEFEAT_BROADCAST_DELAY_MS};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Messages sent from network tasks to the main event loop.
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: u32,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the event loop to the sender task.
#[derive(Debug)]
pub enum OutboundMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    BroadcastPacket { packet: Packet },
}

/// Current wall-clock time in unix milliseconds; the instant fed into
/// session/engine decisions and logged attack timestamps.
pub fn current_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    millis.min(u64::MAX as u128) as u64
}

fn hp_percent(current_hp: u32, max_hp: u32) -> f64 {
    if max_hp == 0 {
        0.0
    } else {
        current_hp as f64 / max_hp as f64 * 100.0
    }
}

/// The raid server: one combat session, one client registry, one socket.
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    session: GameSession,
    /// Handle of the most recently scheduled defeat broadcast. A reset
    /// racing into the delay window does not cancel it; the announcement
    /// still fires with the state captured at the killing blow.
    pending_defeat: Option<JoinHandle<()>>,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        max_clients: usize,
        session: GameSession,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Raid server listening on {}", addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            session,
            pending_defeat: None,
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx,
        })
    }

    /// Spawns the task that listens for incoming datagrams and feeds
    /// them to the event loop.
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that drains the outbound queue: point-to-point
    /// replies and fan-out over the current client registry.
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut outbound_rx = std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    OutboundMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    OutboundMessage::BroadcastPacket { packet } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns the task that sweeps silent clients out of the registry.
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self
            .outbound_tx
            .send(OutboundMessage::SendPacket { packet, addr })
        {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet) {
        if let Err(e) = self
            .outbound_tx
            .send(OutboundMessage::BroadcastPacket { packet })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Schedules the defeat announcement one delay after the killing
    /// blow, giving clients time to play the kill before the victory
    /// overlay. The payload is captured now; the timer is deliberately
    /// left running across a racing reset.
    fn schedule_defeat_broadcast(&mut self) {
        let packet = Packet::BossDefeated {
            attackers: self.session.engine().attackers(),
            total_attacks: self.session.engine().logged_attacks() as u32,
            boss_name: self.session.engine().boss().name.clone(),
        };
        let outbound_tx = self.outbound_tx.clone();

        self.pending_defeat = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(DEFEAT_BROADCAST_DELAY_MS)).await;
            if let Err(e) = outbound_tx.send(OutboundMessage::BroadcastPacket { packet }) {
                error!("Failed to queue defeat broadcast: {}", e);
            }
        }));
    }

    /// Dispatches one inbound packet. Runs to completion before the next
    /// packet is looked at, so session state never sees interleaving.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                // A reconnect from the same address replaces the stale
                // registration instead of occupying a second slot.
                let existing_client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(existing_id) = existing_client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&existing_id);
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                if let Some(client_id) = client_id {
                    self.send_packet(Packet::Connected { client_id }, addr);
                    // New viewers get the current state right away.
                    self.send_packet(Packet::GameState(self.session.snapshot()), addr);
                } else {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Server full".to_string(),
                        },
                        addr,
                    );
                }
            }

            Packet::Attack { username } => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                let Some(client_id) = client_id else {
                    warn!("Attack from unregistered address {}", addr);
                    return;
                };

                {
                    let mut clients = self.clients.write().await;
                    clients.touch(client_id);
                }

                match self.session.handle_attack(&username, current_millis()) {
                    Ok(outcome) => {
                        debug!(
                            "'{}' hit for {} (combo x{}, boss {}/{})",
                            username,
                            outcome.damage,
                            outcome.combo_count,
                            outcome.boss_hp,
                            outcome.boss_max_hp
                        );

                        let defeated = outcome.boss_defeated;
                        self.broadcast_packet(Packet::AttackResult {
                            username,
                            damage: outcome.damage,
                            boss_hp: outcome.boss_hp,
                            boss_max_hp: outcome.boss_max_hp,
                            combo: outcome.combo_count,
                            combo_multiplier: outcome.combo_multiplier(),
                            boss_defeated: defeated,
                        });

                        if defeated {
                            self.schedule_defeat_broadcast();
                        }
                    }
                    Err(reason) => {
                        self.send_packet(
                            Packet::Error {
                                message: reason.to_string(),
                                remaining_ms: reason.remaining_ms(),
                            },
                            addr,
                        );
                    }
                }
            }

            Packet::ResetBoss => {
                if let Some(handle) = &self.pending_defeat {
                    if !handle.is_finished() {
                        // The announcement still fires after the reset.
                        warn!("Reset during pending defeat broadcast; not cancelling it");
                    }
                }
                self.session.handle_reset();
                // Fresh state first, then the reset notification.
                self.broadcast_packet(Packet::GameState(self.session.snapshot()));
                self.broadcast_packet(Packet::BossReset);
            }

            Packet::StatusRequest => {
                let connected_clients = {
                    let mut clients = self.clients.write().await;
                    if let Some(client_id) = clients.find_client_by_addr(addr) {
                        clients.touch(client_id);
                    }
                    clients.len() as u32
                };

                let boss = self.session.engine().boss();
                let combo = self.session.engine().combo();
                self.send_packet(
                    Packet::Status {
                        boss_name: boss.name.clone(),
                        boss_hp: boss.current_hp,
                        boss_max_hp: boss.max_hp,
                        hp_percent: hp_percent(boss.current_hp, boss.max_hp),
                        boss_alive: boss.is_alive,
                        combo_count: combo.count,
                        combo_multiplier: combo.multiplier(),
                        attackers_logged: self.session.engine().logged_attacks() as u32,
                        connected_clients,
                    },
                    addr,
                );
            }

            Packet::Ping => {
                let mut clients = self.clients.write().await;
                if let Some(client_id) = clients.find_client_by_addr(addr) {
                    clients.touch(client_id);
                }
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Main event loop: dispatch inbound packets and timeout notices
    /// until the inbound channel closes or a shutdown is requested.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        info!(
            "Raid started: boss '{}' with {} HP",
            self.session.engine().boss().name,
            self.session.engine().boss().max_hp
        );

        while let Some(message) = self.server_rx.recv().await {
            match message {
                ServerMessage::PacketReceived { packet, addr } => {
                    self.handle_packet(packet, addr).await;
                }
                ServerMessage::ClientTimeout { client_id } => {
                    warn!("Client {} timed out", client_id);
                }
                ServerMessage::Shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::sync::mpsc;

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080)
    }

    #[test]
    fn test_server_message_creation() {
        let packet = Packet::Attack {
            username: "ember".to_string(),
        };
        let addr = test_addr();

        let msg = ServerMessage::PacketReceived {
            packet: packet.clone(),
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                match p {
                    Packet::Attack { username } => assert_eq!(username, "ember"),
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_outbound_broadcast_message() {
        let packet = Packet::BossReset;
        let msg = OutboundMessage::BroadcastPacket {
            packet: packet.clone(),
        };

        match msg {
            OutboundMessage::BroadcastPacket { packet: p } => match p {
                Packet::BossReset => {}
                _ => panic!("Unexpected packet type"),
            },
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

        tx.send(ServerMessage::ClientTimeout { client_id: 7 })
            .unwrap();

        match rx.try_recv().unwrap() {
            ServerMessage::ClientTimeout { client_id } => assert_eq!(client_id, 7),
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_hp_percent() {
        assert_approx_eq!(hp_percent(10_000, 10_000), 100.0);
        assert_approx_eq!(hp_percent(2_500, 10_000), 25.0);
        assert_approx_eq!(hp_percent(0, 10_000), 0.0);
        assert_approx_eq!(hp_percent(0, 0), 0.0);
    }

    #[test]
    fn test_timestamp_generation() {
        let t1 = current_millis();
        std::thread::sleep(Duration::from_millis(2));
        let t2 = current_millis();
        assert!(t2 > t1);
    }

    #[test]
    fn test_packet_serialization_roundtrip() {
        let test_packets = vec![
            Packet::Connect { client_version: 1 },
            Packet::Attack {
                username: "ember".to_string(),
            },
            Packet::ResetBoss,
            Packet::StatusRequest,
            Packet::Error {
                message: "Cooldown active".to_string(),
                remaining_ms: Some(250),
            },
            Packet::BossReset,
        ];

        for packet in test_packets {
            let serialized = serialize(&packet).unwrap();
            let deserialized: Packet = deserialize(&serialized).unwrap();

            match (&packet, &deserialized) {
                (Packet::Connect { .. }, Packet::Connect { .. }) => {}
                (Packet::Attack { .. }, Packet::Attack { .. }) => {}
                (Packet::ResetBoss, Packet::ResetBoss) => {}
                (Packet::StatusRequest, Packet::StatusRequest) => {}
                (Packet::Error { .. }, Packet::Error { .. }) => {}
                (Packet::BossReset, Packet::BossReset) => {}
                _ => panic!("Packet type mismatch after roundtrip"),
            }
        }
    }
}
