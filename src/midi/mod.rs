pub mod channel;
pub mod epn;
pub mod wire;
