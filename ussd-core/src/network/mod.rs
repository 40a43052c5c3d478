mod connection;
mod guard;
mod reader;

pub use connection::{Connection, ConnectionInfo};
pub use guard::{ConnectionGuard, FrameSender};
pub use reader::FrameReader;
