//! Shared state the kernel hands to modules during the lifecycle stages.
//!
//! Mutation is single-writer: stages run one module at a time, so no lock
//! guards the router or the RPC server.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::routing::{get, MethodRouter};
use axum::Router;

use crate::config::KernelConfig;
use crate::gateway::{self, GatewayMux, TemplateError};
use crate::health::{health_service, healthz, Readiness};
use crate::http::HttpServerHandle;
use crate::kernel::module::ConfigHook;
use crate::lifecycle::shutdown::{Shutdown, ShutdownSignal};
use crate::rpc::{RpcClient, RpcServer, ServiceDefinition};
use crate::stream::SessionOptions;

pub struct RuntimeContext {
    config: Arc<ArcSwap<KernelConfig>>,
    router: Router,
    rpc_server: RpcServer,
    rpc_client: RpcClient,
    gateway: Option<GatewayMux>,
    http_server: Option<HttpServerHandle>,
    root: Shutdown,
    readiness: Readiness,
    config_hooks: Vec<(String, ConfigHook)>,
}

impl RuntimeContext {
    /// Build the context. The loopback client is created here, before
    /// anything listens; it only connects on its first call.
    pub fn new(config: KernelConfig) -> Self {
        let target = config
            .listener
            .bind_address
            .parse::<SocketAddr>()
            .unwrap_or_else(|_| SocketAddr::from((Ipv4Addr::LOCALHOST, 0)));
        let rpc_client = RpcClient::new(target, config.rpc.max_message_bytes);
        let gateway = GatewayMux::new(
            rpc_client.clone(),
            &config.gateway,
            config.http.max_body_bytes,
        );
        let readiness = Readiness::new();

        let mut ctx = Self {
            rpc_server: RpcServer::new(&config.rpc),
            config: Arc::new(ArcSwap::from_pointee(config)),
            router: Router::new(),
            rpc_client,
            gateway: Some(gateway),
            http_server: None,
            root: Shutdown::new(),
            readiness: readiness.clone(),
            config_hooks: Vec::new(),
        };
        ctx.rpc_server.register(&health_service(readiness));
        ctx
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<KernelConfig> {
        self.config.load_full()
    }

    /// The live handle; loads always see the latest reload.
    pub fn live_config(&self) -> Arc<ArcSwap<KernelConfig>> {
        self.config.clone()
    }

    /// Add a route to the primary router.
    pub fn route(&mut self, path: &str, method_router: MethodRouter) {
        let router = std::mem::take(&mut self.router);
        self.router = router.route(path, method_router);
    }

    /// Merge a module's router into the primary router.
    pub fn merge(&mut self, other: Router) {
        let router = std::mem::take(&mut self.router);
        self.router = router.merge(other);
    }

    /// Register an RPC service and its HTTP bindings.
    pub fn register_service(&mut self, service: ServiceDefinition) -> Result<(), TemplateError> {
        match self.gateway.as_mut() {
            Some(gateway) => gateway.add_service(&service)?,
            None => tracing::warn!(
                service = service.name(),
                "Gateway already mounted; HTTP bindings ignored"
            ),
        }
        self.rpc_server.register(&service);
        Ok(())
    }

    pub fn rpc_server(&self) -> &RpcServer {
        &self.rpc_server
    }

    pub fn rpc_client(&self) -> &RpcClient {
        &self.rpc_client
    }

    pub fn root(&self) -> &Shutdown {
        &self.root
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.root.subscribe()
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    /// Session settings from config, bound to the root cancellation.
    pub fn stream_options(&self) -> SessionOptions {
        SessionOptions::from_config(&self.config().streaming).with_cancel(self.shutdown_signal())
    }

    pub(crate) fn add_config_hook(&mut self, module: &str, hook: ConfigHook) {
        self.config_hooks.push((module.to_string(), hook));
    }

    pub(crate) fn config_hooks(&self) -> &[(String, ConfigHook)] {
        &self.config_hooks
    }

    /// Final router: module routes, `/healthz` and the gateway bridge.
    ///
    /// Takes the router; later registrations have no effect.
    pub(crate) fn build_app(&mut self) -> Router {
        let config = self.config();
        let mut router = std::mem::take(&mut self.router)
            .route("/healthz", get(healthz).with_state(self.readiness.clone()));

        if let Some(mux) = self.gateway.take() {
            tracing::debug!(routes = mux.routes().len(), "Gateway routing table ready");
            router = gateway::mount(router, &config.gateway.prefix, Arc::new(mux));
        }
        router
    }

    pub(crate) fn set_http_server(&mut self, server: HttpServerHandle) {
        self.http_server = Some(server);
    }

    pub(crate) fn take_http_server(&mut self) -> Option<HttpServerHandle> {
        self.http_server.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{HttpRule, Status};
    use serde_json::Value;

    fn echo_service() -> ServiceDefinition {
        ServiceDefinition::new("echo.v1.Echo")
            .unary("Echo", |req: tonic::Request<Value>| async move {
                Ok::<_, Status>(tonic::Response::new(req.into_inner()))
            })
            .http(HttpRule::post("/v1/echo").body("*"))
    }

    #[tokio::test]
    async fn health_service_is_registered_up_front() {
        let ctx = RuntimeContext::new(KernelConfig::default());
        assert!(ctx.rpc_server().has_method("/grpc.health.v1.Health/Check"));
    }

    #[tokio::test]
    async fn services_reach_rpc_server_and_gateway() {
        let mut ctx = RuntimeContext::new(KernelConfig::default());
        ctx.register_service(echo_service()).unwrap();

        assert!(ctx.rpc_server().has_method("/echo.v1.Echo/Echo"));
        assert_eq!(ctx.gateway.as_ref().map(|g| g.routes().len()), Some(1));
    }

    #[tokio::test]
    async fn bad_template_is_rejected() {
        let mut ctx = RuntimeContext::new(KernelConfig::default());
        let service = ServiceDefinition::new("bad.v1.Bad")
            .unary("Do", |req: tonic::Request<Value>| async move {
                Ok::<_, Status>(tonic::Response::new(req.into_inner()))
            })
            .http(HttpRule::get("no-slash"));

        assert!(ctx.register_service(service).is_err());
    }

    #[tokio::test]
    async fn unparsable_bind_address_targets_loopback() {
        let mut config = KernelConfig::default();
        config.listener.bind_address = "localhost:9000".into();
        let ctx = RuntimeContext::new(config);
        assert!(ctx.rpc_client().target().ip().is_loopback());
    }
}
