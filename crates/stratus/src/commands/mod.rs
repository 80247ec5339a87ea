pub mod classify;
pub mod dns;
pub mod server;
