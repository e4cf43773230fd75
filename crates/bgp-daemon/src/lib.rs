//! The RIB pipeline (C4) and peer state machine (C5): the two largest
//! components of the speaker, wired together around a per-peer event loop.

pub mod cancel;
pub mod config;
pub mod connection;
pub mod error;
pub mod peer;
pub mod rib;

pub use cancel::CancelToken;
pub use config::{
    Config,
    Mode,
};
pub use error::PeerError;
pub use peer::{
    Event,
    Peer,
    State,
};
pub use rib::{
    Rib,
    RibEntry,
    RibStatus,
};
