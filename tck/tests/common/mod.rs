// Common test utilities for the HTTP-facing tests
//
// A loopback actix-web server on its own runtime thread. Every request is
// recorded and answered by the handler with a status and JSON body.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{mpsc, Arc};
use std::thread;

use actix_web::dev::ServerHandle;
use actix_web::http::StatusCode;
use actix_web::{rt, web, App, HttpRequest, HttpResponse, HttpServer};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// One request the stub received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    /// Path including the query string
    pub path: String,
    pub body: String,
}

impl Recorded {
    /// Body parsed as JSON (`Null` when empty or invalid).
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

type Handler = Arc<dyn Fn(&Recorded) -> (u16, String) + Send + Sync>;

struct StubState {
    handler: Handler,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

async fn respond(req: HttpRequest, body: web::Bytes, state: web::Data<StubState>) -> HttpResponse {
    let recorded = Recorded {
        method: req.method().to_string(),
        path: req.uri().to_string(),
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    state.requests.lock().push(recorded.clone());

    let (status, body) = (state.handler)(&recorded);
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status)
        .content_type("application/json")
        .body(body)
}

/// Loopback HTTP server answering with a fixed handler.
pub struct StubServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
    handle: ServerHandle,
}

impl StubServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Recorded) -> (u16, String) + Send + Sync + 'static,
    {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = web::Data::new(StubState {
            handler: Arc::new(handler),
            requests: Arc::clone(&requests),
        });

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            rt::System::new().block_on(async move {
                let server = HttpServer::new(move || {
                    App::new()
                        .app_data(state.clone())
                        .default_service(web::to(respond))
                })
                .workers(1)
                .disable_signals()
                .bind(("127.0.0.1", 0))
                .expect("bind stub server");
                let addr = server.addrs()[0];
                let server = server.run();
                tx.send((addr, server.handle())).expect("report stub address");
                server.await
            })
        });
        let (addr, handle) = rx.recv().expect("stub server did not start");

        Self {
            addr,
            requests,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        // The stop command is sent eagerly; the completion future is not needed.
        drop(self.handle.stop(false));
    }
}

/// JSON-RPC success envelope echoing the request id.
pub fn rpc_result(request: &Recorded, result: Value) -> (u16, String) {
    let id = request.json()["id"].clone();
    (200, json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string())
}

/// JSON-RPC error envelope echoing the request id.
pub fn rpc_error(
    request: &Recorded,
    code: i64,
    message: &str,
    data: Option<Value>,
) -> (u16, String) {
    let id = request.json()["id"].clone();
    let mut error = json!({ "code": code, "message": message });
    if let Some(data) = data {
        error["data"] = data;
    }
    (200, json!({ "jsonrpc": "2.0", "id": id, "error": error }).to_string())
}
