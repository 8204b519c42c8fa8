mod channel;
pub mod protocol;
mod source;

#[cfg(test)]
pub(crate) mod mock;

pub use channel::{Channel, ReconnectPolicy, ResultHandler};
pub use source::RemoteSource;
