//! The standard health-check RPC service.

use serde::{Deserialize, Serialize};
use tonic::{Request, Response, Status};

use crate::health::readiness::Readiness;
use crate::rpc::service::ServiceDefinition;

pub const HEALTH_SERVICE: &str = "grpc.health.v1.Health";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HealthCheckRequest {
    pub service: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Serving,
    NotServing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: ServingStatus,
}

/// `grpc.health.v1.Health/Check`, answering from the readiness flag.
pub fn health_service(readiness: Readiness) -> ServiceDefinition {
    ServiceDefinition::new(HEALTH_SERVICE).unary(
        "Check",
        move |_req: Request<HealthCheckRequest>| {
            let status = if readiness.is_ready() {
                ServingStatus::Serving
            } else {
                ServingStatus::NotServing
            };
            async move { Ok::<_, Status>(Response::new(HealthCheckResponse { status })) }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RpcConfig;
    use crate::rpc::server::RpcServer;
    use serde_json::json;

    #[tokio::test]
    async fn check_reports_readiness() {
        let readiness = Readiness::new();
        let mut server = RpcServer::new(&RpcConfig::default());
        server.register(&health_service(readiness.clone()));

        let check = || Request::new(json!({}));
        let path = "/grpc.health.v1.Health/Check";

        let reply = server.dispatch(path, check()).await.unwrap();
        assert_eq!(reply.into_inner(), json!({"status": "NOT_SERVING"}));

        readiness.set(true);
        let reply = server.dispatch(path, check()).await.unwrap();
        assert_eq!(reply.into_inner(), json!({"status": "SERVING"}));
    }
}
