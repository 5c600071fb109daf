//! Game server: lobby matchmaking, per-room TCP endpoints, round judging
//! and UDP result broadcasting.

pub mod announcer;
pub mod directory;
pub mod judge;
pub mod network;
pub mod rooms;
