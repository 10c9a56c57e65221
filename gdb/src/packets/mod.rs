pub mod hex;
pub mod incoming;
pub mod psm;
pub mod response;

/// Largest payload the receive buffer holds, after unescaping.
pub const PACKET_SIZE: usize = 256;
