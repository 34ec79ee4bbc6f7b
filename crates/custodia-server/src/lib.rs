pub mod http;
pub mod request;
pub mod service;

pub use request::{Command, DecryptedPayload, Response};
pub use service::Service;
