pub mod codec;
pub mod database_generators;
pub mod engine;
pub mod packer;
pub mod protocol;
pub mod session;
pub mod shares;
pub mod store;
pub mod strip;

pub use engine::DistanceEngine;
pub use packer::StripePacker;
pub use session::JanusSession;
