use std::sync::Arc;

use huddle_db::Database;
use huddle_gateway::{ChatArchiver, GatewayContext, Hub};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: Arc<str>,
    pub token_ttl_hours: i64,
    pub hub: Hub,
    pub archiver: ChatArchiver,
    /// Lobby lines replayed to a freshly identified gateway connection
    pub history_limit: u32,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: &str, token_ttl_hours: i64, history_limit: u32) -> Self {
        let db = Arc::new(db);
        Self {
            archiver: ChatArchiver::new(db.clone()),
            db,
            jwt_secret: Arc::from(jwt_secret),
            token_ttl_hours,
            hub: Hub::new(),
            history_limit,
        }
    }

    pub fn gateway_context(&self) -> GatewayContext {
        GatewayContext {
            hub: self.hub.clone(),
            db: self.db.clone(),
            jwt_secret: self.jwt_secret.clone(),
            archiver: self.archiver.clone(),
            history_limit: self.history_limit,
        }
    }
}
