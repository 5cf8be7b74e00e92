//! The S7 transport: protocol framing and the sampler-facing client trait.

pub mod client;
pub mod protocol;

pub use client::{FakeS7Client, S7Client, TcpS7Client};
