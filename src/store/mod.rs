//! Store Layer
//!
//! Data access: the local key-value store and the remote document
//! store abstraction with its implementations.

mod http;
mod local;
mod memory;
mod remote;


pub use http::HttpRemoteStore;
pub use local::LocalStore;
pub use memory::MemoryRemoteStore;
pub use remote::{Category, RemoteStore};
