pub mod persistence;
pub mod registry;
pub mod session;

pub use persistence::CrdtPersistence;
pub use registry::{DocumentRegistry, ReplicaHandle};
pub use session::SessionHub;

// vim: ts=4
