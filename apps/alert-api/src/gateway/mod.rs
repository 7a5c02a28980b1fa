pub mod events;
pub mod fanout;
pub mod handshake;
pub mod registry;
pub mod server;
pub mod targeting;
