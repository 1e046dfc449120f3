pub mod keepalive;
pub mod manager;
pub mod session;
