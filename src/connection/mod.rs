//! Connection lifecycle.
//!
//! [`Verifier`] turns a provider tag and credential bag into a probed handle.
//! [`ConnectionRegistry`] tracks verified ids and the single active marker.

mod registry;
mod verifier;

pub use registry::{ConnectionRegistry, ConnectionStatus, CreatedConnection};
pub use verifier::Verifier;
