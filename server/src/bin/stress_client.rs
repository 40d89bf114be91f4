//! Headless bot client for manual load and behavior testing.
//!
//! Connects to a running raid server, then spams attacks slightly above
//! the cooldown rate with rng jitter, printing everything it receives.
//! Useful for watching combo buildup, cooldown rejections, and the
//! defeat/reset broadcasts without a real client.

use bincode::{deserialize, serialize};
use clap::Parser;
use rand::Rng;
use shared::{Packet, ATTACK_COOLDOWN_MS};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::time::{sleep, Duration};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address to attack
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: String,
    /// Username to attack as (random suffix appended if absent)
    #[clap(short, long)]
    username: Option<String>,
    /// How many attacks to send before disconnecting
    #[clap(short, long, default_value = "50")]
    attacks: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let server_addr: SocketAddr = args.server.parse()?;

    let username = args
        .username
        .unwrap_or_else(|| format!("bot{}", rand::thread_rng().gen_range(1000..10000)));

    let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
    println!("Bot '{}' bound to {}", username, socket.local_addr()?);

    let connect = serialize(&Packet::Connect { client_version: 1 })?;
    socket.send_to(&connect, server_addr).await?;

    // Print every server packet as it arrives.
    {
        let socket = Arc::clone(&socket);
        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, _)) => match deserialize::<Packet>(&buf[0..len]) {
                        Ok(Packet::Connected { client_id }) => {
                            println!("Connected as client {}", client_id);
                        }
                        Ok(Packet::GameState(view)) => {
                            println!(
                                "State: {} {}/{} HP, combo {} (x{})",
                                view.boss.name,
                                view.boss.current_hp,
                                view.boss.max_hp,
                                view.combo.count,
                                view.combo.multiplier
                            );
                        }
                        Ok(Packet::AttackResult {
                            username,
                            damage,
                            boss_hp,
                            combo,
                            ..
                        }) => {
                            println!(
                                "{} hit for {} (combo {}), boss at {}",
                                username, damage, combo, boss_hp
                            );
                        }
                        Ok(Packet::BossDefeated {
                            total_attacks,
                            boss_name,
                            ..
                        }) => {
                            println!("{} defeated after {} logged attacks!", boss_name, total_attacks);
                        }
                        Ok(Packet::BossReset) => println!("Boss reset"),
                        Ok(Packet::Error {
                            message,
                            remaining_ms,
                        }) => {
                            println!("Rejected: {} (retry in {:?} ms)", message, remaining_ms);
                        }
                        Ok(other) => println!("Received: {:?}", other),
                        Err(e) => eprintln!("Bad packet: {}", e),
                    },
                    Err(e) => {
                        eprintln!("Receive error: {}", e);
                        break;
                    }
                }
            }
        });
    }

    // Slightly above the cooldown so most attacks land, with jitter so
    // some deliberately trip the rate limit.
    for _ in 0..args.attacks {
        let attack = serialize(&Packet::Attack {
            username: username.clone(),
        })?;
        socket.send_to(&attack, server_addr).await?;

        let jitter = rand::thread_rng().gen_range(0..200);
        sleep(Duration::from_millis(ATTACK_COOLDOWN_MS - 100 + jitter)).await;
    }

    // Let the last broadcasts arrive before dropping the socket.
    sleep(Duration::from_secs(1)).await;
    let disconnect = serialize(&Packet::Disconnect)?;
    socket.send_to(&disconnect, server_addr).await?;
    println!("Bot '{}' done", username);

    Ok(())
}
