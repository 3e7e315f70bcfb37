//! chatprobe core library — chat wire protocol, WebSocket client, the scripted
//! probe scenario, and an in-process stub chat server used for local runs and tests.

pub mod client;
pub mod config;
pub mod protocol;
pub mod scenario;
pub mod server;
