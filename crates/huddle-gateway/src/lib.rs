pub mod archive;
pub mod connection;
pub mod hub;

pub use archive::ChatArchiver;
pub use connection::{GatewayContext, SessionState, handle_connection};
pub use hub::Hub;
