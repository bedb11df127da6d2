pub mod generation;
pub mod intake;
pub mod packets;
