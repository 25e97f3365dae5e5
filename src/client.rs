mod core;
mod events;
mod pipelines;
mod transport;

pub use self::core::ApiClient;
pub use transport::TransportSettings;
