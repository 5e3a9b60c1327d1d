use std::future::Future;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::{
    orchestrator::Orchestrator,
    types::{
        Acknowledgment, CODE_SERVER_ERROR, LogsResponse, NetworkRequest, NetworkResponse,
        ServiceRequest,
    },
};
use crate::lib::tasks::{
    maintenance::{CleanupReport, HostMaintenance},
    types::DockerError,
};

impl IntoResponse for Acknowledgment {
    fn into_response(self) -> Response {
        let status = if self.is_ok() {
            StatusCode::OK
        } else if self.code == CODE_SERVER_ERROR {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::BAD_REQUEST
        };
        (status, Json(self)).into_response()
    }
}

fn maintenance_failed(operation: &str, subject: &str, err: DockerError) -> Acknowledgment {
    warn!(operation, subject, error = %err, "maintenance operation failed");
    err.into()
}

pub struct TaskServer {
    pub orchestrator: Orchestrator,
    pub maintenance: HostMaintenance,
    pub address: String,
    pub port: u16,
}

impl TaskServer {
    pub fn new(
        orchestrator: Orchestrator,
        maintenance: HostMaintenance,
        address: &str,
        port: u16,
    ) -> Self {
        Self {
            orchestrator,
            maintenance,
            address: address.to_string(),
            port,
        }
    }

    async fn stream_webhook(
        AxumState(orchestrator): AxumState<Orchestrator>,
        body: Bytes,
    ) -> Acknowledgment {
        orchestrator.handle_notification(&body).await
    }

    async fn health_check() -> &'static str {
        "ok"
    }

    async fn restart_service(
        AxumState(maintenance): AxumState<HostMaintenance>,
        Json(req): Json<ServiceRequest>,
    ) -> Acknowledgment {
        match maintenance.restart_service(&req.service_name).await {
            Ok(()) => Acknowledgment::ok(),
            Err(e) => maintenance_failed("restart", &req.service_name, e),
        }
    }

    async fn remove_service(
        AxumState(maintenance): AxumState<HostMaintenance>,
        Json(req): Json<ServiceRequest>,
    ) -> Acknowledgment {
        match maintenance.remove_service(&req.service_name).await {
            Ok(()) => Acknowledgment::ok(),
            Err(e) => maintenance_failed("remove", &req.service_name, e),
        }
    }

    async fn service_logs(
        AxumState(maintenance): AxumState<HostMaintenance>,
        Query(req): Query<ServiceRequest>,
    ) -> Result<Json<LogsResponse>, Acknowledgment> {
        maintenance
            .service_logs(&req.service_name)
            .await
            .map(|lines| Json(LogsResponse { lines }))
            .map_err(|e| maintenance_failed("logs", &req.service_name, e))
    }

    async fn ensure_network(
        AxumState(maintenance): AxumState<HostMaintenance>,
        Json(req): Json<NetworkRequest>,
    ) -> Result<Json<NetworkResponse>, Acknowledgment> {
        maintenance
            .ensure_network(&req.network_name)
            .await
            .map(|network_id| Json(NetworkResponse { network_id }))
            .map_err(|e| maintenance_failed("ensure network", &req.network_name, e))
    }

    async fn remove_network(
        AxumState(maintenance): AxumState<HostMaintenance>,
        Json(req): Json<NetworkRequest>,
    ) -> Acknowledgment {
        match maintenance.remove_network(&req.network_name).await {
            Ok(()) => Acknowledgment::ok(),
            Err(e) => maintenance_failed("remove network", &req.network_name, e),
        }
    }

    async fn cleanup(
        AxumState(maintenance): AxumState<HostMaintenance>,
    ) -> Result<Json<CleanupReport>, Acknowledgment> {
        let report = maintenance
            .cleanup_images()
            .await
            .map_err(|e| maintenance_failed("cleanup", "images", e))?;
        if !report.failed.is_empty() {
            warn!(failed = ?report.failed, "some images were not removed");
        }
        Ok(Json(report))
    }

    pub fn router(&self) -> Router {
        let maintenance = Router::new()
            .route("/restartService", post(TaskServer::restart_service))
            .route("/removeService", post(TaskServer::remove_service))
            .route("/serviceLogs", get(TaskServer::service_logs))
            .route("/network", post(TaskServer::ensure_network))
            .route("/removeNetwork", post(TaskServer::remove_network))
            .route("/cleanup", post(TaskServer::cleanup))
            .with_state(self.maintenance.clone());

        Router::new()
            .route("/streamWebhook", post(TaskServer::stream_webhook))
            .route("/healthCheck", get(TaskServer::health_check))
            .with_state(self.orchestrator.clone())
            .merge(maintenance)
    }

    pub async fn start_server<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = TcpListener::bind((self.address.as_str(), self.port)).await?;
        info!(address = %self.address, port = self.port, "listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Method, Request, header},
    };
    use http_body_util::BodyExt;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use super::*;
    use crate::lib::{
        control_plane::reporter::StatusReporter,
        tasks::{
            deployer::ContainerDeployer,
            types::{Task, TaskStatus},
        },
        testing::{FakeControlPlane, FakeEngine},
        worker::{types::CODE_CLIENT_ERROR, worker::Worker},
    };

    fn task() -> Task {
        Task {
            id: "t1".to_string(),
            config: json!({
                "serviceName": "api",
                "imageName": "api",
                "imageTag": "3.1",
                "ports": {"8080": "9090"}
            }),
            ..Default::default()
        }
    }

    fn webhook(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/streamWebhook")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn ack(response: Response) -> Acknowledgment {
        body_json(response).await
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn server(orchestrator: Orchestrator, engine: FakeEngine) -> TaskServer {
        TaskServer::new(
            orchestrator,
            HostMaintenance::new(Arc::new(engine)),
            "127.0.0.1",
            0,
        )
    }

    fn maintenance_server(engine: Arc<FakeEngine>) -> TaskServer {
        let (tx, _rx) = mpsc::channel(1);
        TaskServer::new(
            Orchestrator::new(Arc::new(FakeControlPlane::default()), tx),
            HostMaintenance::new(engine),
            "127.0.0.1",
            0,
        )
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_check_is_ok() {
        let (tx, _rx) = mpsc::channel(1);
        let control_plane = Arc::new(FakeControlPlane::default());
        let server = server(Orchestrator::new(control_plane, tx), FakeEngine::default());

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/healthCheck")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_webhook_is_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let control_plane = Arc::new(FakeControlPlane::serving(task()));
        let server = server(Orchestrator::new(control_plane.clone(), tx), FakeEngine::default());

        let response = server.router().oneshot(webhook("{\"payload\": 7}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ack(response).await.code, CODE_CLIENT_ERROR);
        assert_eq!(control_plane.fetch_count(), 0);
    }

    #[tokio::test]
    async fn webhook_acknowledges_and_worker_deploys() {
        let engine = Arc::new(FakeEngine::default());
        let control_plane = Arc::new(FakeControlPlane::serving(task()));
        let (tx, rx) = mpsc::channel(8);
        let worker = Worker::new(
            "test",
            rx,
            Arc::new(ContainerDeployer::new(engine.clone())),
            StatusReporter::new(control_plane.clone()),
        );
        let worker = tokio::spawn(worker.run_tasks());

        let server = TaskServer::new(
            Orchestrator::new(control_plane.clone(), tx),
            HostMaintenance::new(engine.clone()),
            "127.0.0.1",
            0,
        );
        let body = json!({"payload": {"pipelineId": "p1", "taskId": "t1"}}).to_string();
        let response = server.router().oneshot(webhook(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ack(response).await, Acknowledgment::ok());

        // closing the last sender lets the worker finish
        drop(server);
        assert_eq!(worker.await.unwrap(), 1);

        assert_eq!(
            control_plane.updates(),
            vec![
                ("p1".to_string(), "t1".to_string(), TaskStatus::InProgress),
                ("p1".to_string(), "t1".to_string(), TaskStatus::Done),
            ]
        );
        let running = engine.running("api").unwrap();
        assert_eq!(running.spec.image, "api:3.1");
        assert_eq!(running.spec.exposed_ports, vec!["8080/tcp".to_string()]);
    }

    #[tokio::test]
    async fn restart_of_unknown_service_is_a_client_error() {
        let engine = Arc::new(FakeEngine::default());
        let response = maintenance_server(engine.clone())
            .router()
            .oneshot(post_json("/restartService", json!({"serviceName": "api"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ack(response).await.code, CODE_CLIENT_ERROR);
        assert_eq!(engine.restart_count("api"), 0);
    }

    #[tokio::test]
    async fn network_route_returns_existing_id() {
        let engine = Arc::new(FakeEngine::default().with_network("backend", "n-1"));
        let response = maintenance_server(engine)
            .router()
            .oneshot(post_json("/network", json!({"networkName": "backend"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: NetworkResponse = body_json(response).await;
        assert_eq!(body.network_id, "n-1");
    }

    #[tokio::test]
    async fn cleanup_reports_images_it_could_not_remove() {
        let engine =
            Arc::new(FakeEngine::default().with_images(&["sha256:a", "sha256:b"], &["sha256:a"]));
        let response = maintenance_server(engine)
            .router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/cleanup")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let report: CleanupReport = body_json(response).await;
        assert_eq!(report.removed, vec!["sha256:b".to_string()]);
        assert_eq!(report.failed, vec!["sha256:a".to_string()]);
    }

    #[tokio::test]
    async fn failed_cleanup_is_a_server_error() {
        let engine = Arc::new(FakeEngine::default().failing_prune());
        let response = maintenance_server(engine)
            .router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/cleanup")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ack(response).await.code, CODE_SERVER_ERROR);
    }
}
