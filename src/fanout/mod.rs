//! Ring-to-TCP fan-out server ("Program B").

pub mod config;
pub mod listener;
pub mod queue;
pub mod ring;
pub mod subscriber;
pub mod sync;
pub mod supervisor;
pub mod transmit;

pub use config::ServerConfig;
pub use listener::Listener;
pub use ring::{DataHeader, MuxHdr, NullRingSource, RingFlag, RingReader, RingSource};
pub use subscriber::{Subscriber, SubscriberState, SubscriberTable, DEFAULT_MAX_CONNECT_USERS};
pub use supervisor::{NullTermination, Supervisor, SupervisorConfig, TerminationSource};
pub use sync::CancellationToken;
pub use transmit::{SessionInfo, TransmitTask};
