//! Terminal game client: connects to the lobby, follows room redirects and
//! prints round results received over broadcast.

pub mod input;
pub mod network;
