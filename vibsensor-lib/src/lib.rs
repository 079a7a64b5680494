pub mod firmware;
pub mod port;
pub mod protocol;
pub mod transport;
