pub mod error;
pub mod media;
pub mod net;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod stream;
pub mod streamer;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Result, RtspError};
pub use media::{Frame, Packetizer};
pub use net::{AcceptSource, ClientConnection, ReadOutcome, RtspListener};
pub use scheduler::{ConnectionScheduler, SchedulerConfig, StreamerFactory};
pub use session::{RtspSession, SessionState};
pub use stream::{CodecFamily, StreamId};
pub use streamer::{FrameSource, RtpStreamer, Streamer};
