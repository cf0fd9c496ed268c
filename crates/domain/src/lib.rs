pub mod error;
pub mod guest;
pub mod message;
pub mod ports;
pub mod realtime;
pub mod timeline;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
