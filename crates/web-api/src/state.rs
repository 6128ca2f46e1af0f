use std::sync::Arc;

use application::{
    ConnectionLifecycleManager, FanoutRouter, LifecycleDependencies, LocalConnectionHub,
    NotificationInbox, OfflineFallbackSink, PresenceQueryService, PresenceRegistry,
};
use config::FanoutConfig;
use domain::{NotificationStore, SocialGraphRepository};

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<PresenceRegistry>,
    pub hub: Arc<LocalConnectionHub>,
    pub router: Arc<FanoutRouter>,
    pub lifecycle: Arc<ConnectionLifecycleManager>,
    pub presence: Arc<PresenceQueryService>,
    pub inbox: Arc<NotificationInbox>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    /// 组装注册表、路由与生命周期管理
    pub fn new(
        fanout: &FanoutConfig,
        jwt_service: Arc<JwtService>,
        social_graph: Arc<dyn SocialGraphRepository>,
        notifications: Arc<dyn NotificationStore>,
    ) -> Self {
        let registry = Arc::new(PresenceRegistry::new());
        let hub = Arc::new(LocalConnectionHub::new(fanout.connection_buffer));
        let fallback = Arc::new(OfflineFallbackSink::new(notifications.clone()));
        let router = Arc::new(FanoutRouter::new(registry.clone(), hub.clone(), fallback));

        let lifecycle = Arc::new(ConnectionLifecycleManager::new(LifecycleDependencies {
            registry: registry.clone(),
            router: router.clone(),
            identity: jwt_service.clone(),
            social_graph,
            announce_online: fanout.announce_online,
        }));

        Self {
            presence: Arc::new(PresenceQueryService::new(registry.clone())),
            inbox: Arc::new(NotificationInbox::new(notifications)),
            registry,
            hub,
            router,
            lifecycle,
            jwt_service,
        }
    }
}
