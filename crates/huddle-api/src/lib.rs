pub mod auth;
pub mod error;
pub mod friends;
pub mod groups;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod users;

pub use routes::router;
pub use state::{AppState, AppStateInner};
