//! Fire-and-forget result publishing over the shared UDP broadcast channel.
//!
//! No acknowledgments, no retries, no subscriber list: anyone bound to the
//! well-known broadcast port on the local segment can observe round results
//! and the final standings.

use log::{debug, error};
use shared::protocol::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Composes the human-readable round outcome line.
pub fn result_text(room_number: u32, winner: Option<&str>) -> String {
    match winner {
        Some(name) => format!("Player {name} in the room {room_number} won the game!"),
        None => format!("The game in the room {room_number} was a tie!"),
    }
}

pub struct Announcer {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
}

impl Announcer {
    pub fn new(socket: Arc<UdpSocket>, target: SocketAddr) -> Self {
        Self { socket, target }
    }

    /// Publishes one round result, once per judged round.
    pub async fn round_result(&self, text: &str) {
        self.publish(Message::RoundResult(text.to_string())).await;
    }

    /// Publishes the final standings, once per operator command.
    pub async fn final_standings(&self, text: String) {
        self.publish(Message::FinalStandings(text)).await;
    }

    async fn publish(&self, message: Message) {
        let body = message.encode();
        match self.socket.send_to(body.as_bytes(), self.target).await {
            Ok(_) => debug!("broadcast {} to {}", message.opcode(), self.target),
            Err(e) => error!("broadcast of {} failed: {}", message.opcode(), e),
        }
    }
}
