//! Single-layer point-in-polygon worker.
//!
//! A worker holds one administrative layer (country, region, neighbourhood, ...)
//! in memory and answers "which polygon contains this point?" for a parent
//! coordinator that runs one worker per layer.
//!
//! - [`data`] streams polygon features out of a GeoJSON dataset.
//! - [`store`] splits them into an on-disk side table and a reduced in-memory set.
//! - [`index`] builds the R-tree backed [`AdminLookup`].
//! - [`session`] is the load → ready → search state machine.
//! - [`protocol`] defines the newline-delimited JSON messages.

pub mod config;
pub mod data;
pub mod error;
pub mod index;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod store;
pub mod title;
pub mod types;

pub use config::WorkerConfig;
pub use error::{LoadError, ProtocolError};
pub use index::AdminLookup;
pub use protocol::{Request, Response};
pub use session::{Session, Status};
