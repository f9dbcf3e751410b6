//! HTTP surface over a running [`Monitor`].
//!
//! Every handler takes the controller lock for the duration of one
//! operation, so requests interleave with poller ticks but never overlap
//! them. `/ws` streams [`ControllerEvent`]s as JSON text frames.

use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::{mailbox::Mailbox, monitor::Monitor, types::ControllerEvent};

#[derive(Debug, Deserialize)]
struct ReorderBody {
    from: usize,
    to: usize,
}

pub fn api_router<M: Mailbox + 'static>(monitor: Arc<Monitor<M>>) -> axum::Router {
    use axum::{routing, Router};

    Router::new()
        .route("/health", routing::get(api_health))
        .route("/api/status", routing::get(api_status::<M>))
        .route("/api/start", routing::post(api_start::<M>))
        .route("/api/stop", routing::post(api_stop::<M>))
        .route("/api/submit", routing::post(api_submit::<M>))
        .route(
            "/api/queue",
            routing::get(api_queue::<M>)
                .post(api_enqueue::<M>)
                .delete(api_clear_queue::<M>),
        )
        .route("/api/queue/reorder", routing::post(api_reorder::<M>))
        .route("/api/queue/{index}", routing::delete(api_remove::<M>))
        .route("/api/cancel", routing::post(api_cancel::<M>))
        .route("/ws", routing::get(api_ws::<M>))
        .with_state(monitor)
}

fn snapshot<M: Mailbox + 'static>(monitor: &Monitor<M>) -> Value {
    monitor.with(|controller| {
        json!({
            "status": controller.status(),
            "queue": controller.queue(),
        })
    })
}

fn text_field(body: &Value) -> Option<String> {
    body.get("text")
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(String::from)
}

fn missing_text() -> (axum::http::StatusCode, axum::Json<Value>) {
    (
        axum::http::StatusCode::BAD_REQUEST,
        axum::Json(json!({ "success": false, "error": "Missing required field: text" })),
    )
}

async fn api_health() -> axum::Json<Value> {
    axum::Json(json!({
        "status": "ok",
        "service": "turn-mcp",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn api_status<M: Mailbox + 'static>(
    axum::extract::State(monitor): axum::extract::State<Arc<Monitor<M>>>,
) -> axum::Json<Value> {
    axum::Json(snapshot(&monitor))
}

async fn api_start<M: Mailbox + 'static>(
    axum::extract::State(monitor): axum::extract::State<Arc<Monitor<M>>>,
) -> axum::Json<Value> {
    monitor.start();
    axum::Json(snapshot(&monitor))
}

async fn api_stop<M: Mailbox + 'static>(
    axum::extract::State(monitor): axum::extract::State<Arc<Monitor<M>>>,
) -> axum::Json<Value> {
    monitor.stop();
    axum::Json(snapshot(&monitor))
}

async fn api_submit<M: Mailbox + 'static>(
    axum::extract::State(monitor): axum::extract::State<Arc<Monitor<M>>>,
    axum::Json(body): axum::Json<Value>,
) -> (axum::http::StatusCode, axum::Json<Value>) {
    let Some(text) = text_field(&body) else {
        return missing_text();
    };
    let delivery = monitor.with(|controller| controller.submit_input(&text));
    (
        axum::http::StatusCode::OK,
        axum::Json(json!({ "success": true, "delivery": delivery })),
    )
}

async fn api_queue<M: Mailbox + 'static>(
    axum::extract::State(monitor): axum::extract::State<Arc<Monitor<M>>>,
) -> axum::Json<Value> {
    axum::Json(json!({ "queue": monitor.with(|controller| controller.queue()) }))
}

async fn api_enqueue<M: Mailbox + 'static>(
    axum::extract::State(monitor): axum::extract::State<Arc<Monitor<M>>>,
    axum::Json(body): axum::Json<Value>,
) -> (axum::http::StatusCode, axum::Json<Value>) {
    let Some(text) = text_field(&body) else {
        return missing_text();
    };
    let queue = monitor.with(|controller| {
        controller.add_to_queue(&text);
        controller.queue()
    });
    (
        axum::http::StatusCode::OK,
        axum::Json(json!({ "success": true, "queue": queue })),
    )
}

async fn api_clear_queue<M: Mailbox + 'static>(
    axum::extract::State(monitor): axum::extract::State<Arc<Monitor<M>>>,
) -> axum::Json<Value> {
    monitor.with(|controller| controller.clear_queue());
    axum::Json(json!({ "success": true, "queue": [] }))
}

async fn api_remove<M: Mailbox + 'static>(
    axum::extract::State(monitor): axum::extract::State<Arc<Monitor<M>>>,
    axum::extract::Path(index): axum::extract::Path<usize>,
) -> axum::Json<Value> {
    let queue = monitor.with(|controller| {
        controller.remove_from_queue(index);
        controller.queue()
    });
    axum::Json(json!({ "success": true, "queue": queue }))
}

async fn api_reorder<M: Mailbox + 'static>(
    axum::extract::State(monitor): axum::extract::State<Arc<Monitor<M>>>,
    axum::Json(body): axum::Json<ReorderBody>,
) -> axum::Json<Value> {
    let queue = monitor.with(|controller| {
        controller.reorder_queue(body.from, body.to);
        controller.queue()
    });
    axum::Json(json!({ "success": true, "queue": queue }))
}

async fn api_cancel<M: Mailbox + 'static>(
    axum::extract::State(monitor): axum::extract::State<Arc<Monitor<M>>>,
) -> (axum::http::StatusCode, axum::Json<Value>) {
    if monitor.with(|controller| controller.clear_waiting()) {
        (
            axum::http::StatusCode::OK,
            axum::Json(json!({ "success": true })),
        )
    } else {
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({ "success": false, "error": "failed to write cancel record" })),
        )
    }
}

async fn api_ws<M: Mailbox + 'static>(
    ws: axum::extract::WebSocketUpgrade,
    axum::extract::State(monitor): axum::extract::State<Arc<Monitor<M>>>,
) -> impl axum::response::IntoResponse {
    let rx = monitor.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, rx))
}

async fn stream_events(
    mut socket: axum::extract::ws::WebSocket,
    mut rx: broadcast::Receiver<ControllerEvent>,
) {
    tracing::info!(target = "turn_mcp::api", "event stream client connected");
    let mut ping_interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        let Ok(line) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if socket
                            .send(axum::extract::ws::Message::Text(line.into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(target = "turn_mcp::api", skipped = n, "event stream client lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(axum::extract::ws::Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = ping_interval.tick() => {
                if socket
                    .send(axum::extract::ws::Message::Ping(vec![].into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }
    tracing::info!(target = "turn_mcp::api", "event stream client disconnected");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::api_router;
    use crate::{
        controller::Controller,
        mailbox::{Mailbox, MemoryMailbox},
        monitor::Monitor,
        types::StatusRecord,
    };

    fn test_router() -> (
        axum::Router,
        Arc<MemoryMailbox>,
        Arc<Monitor<Arc<MemoryMailbox>>>,
    ) {
        let mailbox = Arc::new(MemoryMailbox::new());
        let monitor = Arc::new(Monitor::new(Controller::new(mailbox.clone())));
        (api_router(monitor.clone()), mailbox, monitor)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("GET")
            .body(Body::empty())
            .expect("request should build")
    }

    fn send_json(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method(method)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build")
    }

    async fn response_json(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body should be readable");
        serde_json::from_slice(&body).expect("response body should be json")
    }

    #[tokio::test]
    async fn health_route_reports_ok() {
        let (router, _, _) = test_router();
        let response = router
            .oneshot(get("/health"))
            .await
            .expect("request should succeed");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn status_reflects_controller() {
        let (router, _, monitor) = test_router();
        monitor.with(|c| c.add_to_queue("pending"));
        let response = router
            .oneshot(get("/api/status"))
            .await
            .expect("request should succeed");
        let body = response_json(response).await;
        assert_eq!(body["status"]["running"], false);
        assert_eq!(body["status"]["waiting"], false);
        assert_eq!(body["queue"], json!(["pending"]));
    }

    #[tokio::test]
    async fn submit_while_idle_is_queued() {
        let (router, mailbox, monitor) = test_router();
        let response = router
            .oneshot(send_json("POST", "/api/submit", json!({ "text": "hello" })))
            .await
            .expect("request should succeed");
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body, json!({ "success": true, "delivery": "queued" }));
        assert_eq!(monitor.with(|c| c.queue()), vec!["hello"]);
        assert_eq!(mailbox.peek_input(), None);
    }

    #[tokio::test]
    async fn submit_while_waiting_is_delivered() {
        let (router, mailbox, monitor) = test_router();
        monitor.with(|c| c.start());
        mailbox
            .write_status(&StatusRecord::waiting("ctx", None))
            .unwrap();
        monitor.with(|c| c.tick());

        let response = router
            .oneshot(send_json("POST", "/api/submit", json!({ "text": "go" })))
            .await
            .expect("request should succeed");
        let body = response_json(response).await;
        assert_eq!(body["delivery"], "delivered");
        assert_eq!(mailbox.peek_input().as_deref(), Some("go"));
        monitor.stop();
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let (router, _, monitor) = test_router();
        let response = router
            .clone()
            .oneshot(send_json("POST", "/api/submit", json!({ "text": "   " })))
            .await
            .expect("request should succeed");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router
            .oneshot(send_json("POST", "/api/queue", json!({})))
            .await
            .expect("request should succeed");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(monitor.with(|c| c.queue()).is_empty());
    }

    #[tokio::test]
    async fn queue_editing_routes() {
        let (router, _, monitor) = test_router();
        for text in ["a", "b", "c"] {
            let response = router
                .clone()
                .oneshot(send_json("POST", "/api/queue", json!({ "text": text })))
                .await
                .expect("request should succeed");
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = router
            .clone()
            .oneshot(send_json(
                "POST",
                "/api/queue/reorder",
                json!({ "from": 2, "to": 0 }),
            ))
            .await
            .expect("request should succeed");
        assert_eq!(response_json(response).await["queue"], json!(["c", "a", "b"]));

        let response = router
            .clone()
            .oneshot(send_json("DELETE", "/api/queue/1", json!({})))
            .await
            .expect("request should succeed");
        assert_eq!(response_json(response).await["queue"], json!(["c", "b"]));

        let response = router
            .clone()
            .oneshot(send_json("DELETE", "/api/queue/9", json!({})))
            .await
            .expect("request should succeed");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await["queue"], json!(["c", "b"]));

        let response = router
            .oneshot(send_json("DELETE", "/api/queue", json!({})))
            .await
            .expect("request should succeed");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(monitor.with(|c| c.queue()).is_empty());
    }

    #[tokio::test]
    async fn cancel_writes_canceled_record() {
        let (router, mailbox, monitor) = test_router();
        monitor.with(|c| c.start());
        mailbox
            .write_status(&StatusRecord::waiting("ctx", None))
            .unwrap();
        monitor.with(|c| c.tick());

        let response = router
            .oneshot(send_json("POST", "/api/cancel", json!({})))
            .await
            .expect("request should succeed");
        assert_eq!(response.status(), StatusCode::OK);
        let record = mailbox.read_status().expect("status record");
        assert!(record.is_canceled());
        assert!(!record.waiting);
        assert!(!monitor.with(|c| c.status().waiting));
    }

    #[tokio::test]
    async fn start_and_stop_toggle_running() {
        let (router, _, monitor) = test_router();
        let response = router
            .clone()
            .oneshot(send_json("POST", "/api/start", json!({})))
            .await
            .expect("request should succeed");
        assert_eq!(response_json(response).await["status"]["running"], true);
        assert!(monitor.is_polling());

        let response = router
            .oneshot(send_json("POST", "/api/stop", json!({})))
            .await
            .expect("request should succeed");
        assert_eq!(response_json(response).await["status"]["running"], false);
        assert!(!monitor.is_polling());
    }
}
