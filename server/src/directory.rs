//! Player directory: display names per connection and cumulative win counts
//! per name.
//!
//! The name of a connection is set exactly once, on its first registration
//! message. Win counts are keyed by name and survive both room cycling and
//! disconnects, so the final standings cover every name ever registered
//! during the process lifetime.

use log::info;
use std::collections::{BTreeMap, HashMap};

use crate::network::ConnId;

#[derive(Debug, Default)]
pub struct PlayerDirectory {
    /// Connection identity -> display name.
    names: HashMap<ConnId, String>,
    /// Display name -> rounds won. Ordered so standings render stably.
    wins: BTreeMap<String, u32>,
}

impl PlayerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a display name for a connection. The first registration
    /// wins; repeats are reported as `false` and ignored. A name that was
    /// seen before keeps its existing win count.
    pub fn register(&mut self, conn: ConnId, name: &str) -> bool {
        if self.names.contains_key(&conn) {
            return false;
        }
        info!("connection {} registered as {:?}", conn, name);
        self.names.insert(conn, name.to_string());
        self.wins.entry(name.to_string()).or_insert(0);
        true
    }

    pub fn name_of(&self, conn: ConnId) -> Option<&str> {
        self.names.get(&conn).map(String::as_str)
    }

    /// Drops the connection -> name association. The win count stays.
    pub fn forget_connection(&mut self, conn: ConnId) {
        self.names.remove(&conn);
    }

    /// Credits one win to a name. Exactly one call per judged round with a
    /// winner; draws credit nobody.
    pub fn record_win(&mut self, name: &str) {
        *self.wins.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn wins(&self, name: &str) -> u32 {
        self.wins.get(name).copied().unwrap_or(0)
    }

    /// Renders `name: count` lines for the final standings broadcast,
    /// covering every registered name.
    pub fn standings_text(&self) -> String {
        let mut text = String::new();
        for (name, count) in &self.wins {
            text.push_str(&format!("{name}: {count}\n"));
        }
        text
    }
}
