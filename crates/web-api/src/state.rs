use std::sync::Arc;

use application::{ConnectionRegistry, DeliveryRouter, MessageRepository, PresenceRegistry, TokenVerifier};

/// 所有路由共享的应用状态。
#[derive(Clone)]
pub struct AppState {
    pub presence: Arc<PresenceRegistry>,
    pub connections: Arc<ConnectionRegistry>,
    pub router: Arc<DeliveryRouter>,
    pub repository: Arc<dyn MessageRepository>,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    pub fn new(
        presence: Arc<PresenceRegistry>,
        connections: Arc<ConnectionRegistry>,
        router: Arc<DeliveryRouter>,
        repository: Arc<dyn MessageRepository>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            presence,
            connections,
            router,
            repository,
            verifier,
        }
    }
}
