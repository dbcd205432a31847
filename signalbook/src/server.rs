//! Persistence endpoints over HTTP/1.1
//!
//! Serves the two routes the editor talks to:
//!
//! - `GET /api/load-content` returns the backup document, 404 when there is
//!   none yet, 500 when it cannot be read.
//! - `POST /api/save-content` (or `PUT`) stores the request body, which must
//!   be JSON, pretty-printed into the backup file.
//!
//! One thread per connection, every response closes the connection.

use crate::store::FileStore;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:9002";
/// Default request body limit (64 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

const MAX_HEADER_BYTES: usize = 16 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Errors that can occur while starting the server
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Server IO error: {0}")]
    Io(#[from] io::Error),
}

/// Settings for [`start_server`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on; port 0 picks a free port
    pub bind: String,
    /// Backup file served and written by the endpoints
    pub backup_path: PathBuf,
    /// Largest accepted request body
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Default limits for the given address and backup file
    pub fn new(bind: impl Into<String>, backup_path: impl Into<PathBuf>) -> Self {
        Self {
            bind: bind.into(),
            backup_path: backup_path.into(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Running server; dropping it stops the accept loop
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http://` URL of the server, suitable for [`crate::remote::HttpStore`]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Block until the accept loop exits
    pub fn wait(mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Backup file shared by all connection threads
struct Backend {
    store: FileStore,
    write_lock: Mutex<()>,
    max_body_bytes: usize,
}

#[derive(Debug)]
struct ParsedRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

#[derive(Debug)]
enum RequestError {
    BadRequest(String),
    TooLarge { limit: usize },
}

impl From<io::Error> for RequestError {
    fn from(e: io::Error) -> Self {
        RequestError::BadRequest(format!("read request: {}", e))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Response {
    status: u16,
    body: Value,
}

impl Response {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
        }
    }
}

/// Bind and start serving in a background thread
pub fn start_server(config: &ServerConfig) -> Result<ServerHandle, ServerError> {
    let listener = TcpListener::bind(&config.bind).map_err(|source| ServerError::Bind {
        addr: config.bind.clone(),
        source,
    })?;
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;

    let backend = Arc::new(Backend {
        store: FileStore::new(&config.backup_path),
        write_lock: Mutex::new(()),
        max_body_bytes: config.max_body_bytes,
    });
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let thread = thread::Builder::new()
        .name("signalbook-server".to_string())
        .spawn(move || loop {
            if shutdown_rx.try_recv().is_ok() {
                log::debug!("Server on {} shutting down", addr);
                break;
            }
            match listener.accept() {
                Ok((mut stream, peer)) => {
                    let backend = Arc::clone(&backend);
                    thread::spawn(move || {
                        let response = match read_request(&mut stream, backend.max_body_bytes) {
                            Ok(request) => {
                                log::debug!("{} {} from {}", request.method, request.path, peer);
                                route_request(&request, &backend)
                            }
                            Err(RequestError::TooLarge { limit }) => Response::error(
                                413,
                                &format!("Request body exceeds {} bytes.", limit),
                            ),
                            Err(RequestError::BadRequest(message)) => {
                                Response::error(400, &message)
                            }
                        };
                        if let Err(e) = write_response(&mut stream, &response) {
                            log::warn!("Failed to answer {}: {}", peer, e);
                        }
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    log::warn!("Accept error: {}", e);
                    thread::sleep(Duration::from_millis(100));
                }
            }
        })?;

    log::info!(
        "Serving {} on http://{}",
        config.backup_path.display(),
        addr
    );

    Ok(ServerHandle {
        addr,
        shutdown_tx,
        thread: Some(thread),
    })
}

fn read_request(
    stream: &mut TcpStream,
    max_body_bytes: usize,
) -> Result<ParsedRequest, RequestError> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    let mut bytes = Vec::new();
    let mut chunk = [0_u8; 8192];

    let header_end = loop {
        if let Some(end) = find_header_end(&bytes) {
            break end;
        }
        if bytes.len() > MAX_HEADER_BYTES {
            return Err(RequestError::BadRequest("request headers too large".to_string()));
        }
        let count = stream.read(&mut chunk)?;
        if count == 0 {
            return Err(RequestError::BadRequest("incomplete request headers".to_string()));
        }
        bytes.extend_from_slice(&chunk[..count]);
    };

    let (method, path, headers) = parse_head(&bytes[..header_end])?;
    let content_length = content_length(&headers)?;
    let mut body = bytes.split_off(header_end + 4);

    if content_length > max_body_bytes {
        // consume what the client is sending so it sees the response, not a reset
        let remaining = content_length.saturating_sub(body.len()) as u64;
        let _ = io::copy(&mut (&mut *stream).take(remaining), &mut io::sink());
        return Err(RequestError::TooLarge {
            limit: max_body_bytes,
        });
    }

    while body.len() < content_length {
        let count = stream.read(&mut chunk)?;
        if count == 0 {
            return Err(RequestError::BadRequest("incomplete request body".to_string()));
        }
        body.extend_from_slice(&chunk[..count]);
    }
    body.truncate(content_length);

    Ok(ParsedRequest { method, path, body })
}

type RequestHead = (String, String, HashMap<String, String>);

fn parse_head(raw: &[u8]) -> Result<RequestHead, RequestError> {
    let bad = |message: &str| RequestError::BadRequest(message.to_string());

    let text = std::str::from_utf8(raw).map_err(|_| bad("request headers must be UTF-8"))?;
    let mut lines = text.lines();
    let request_line = lines.next().ok_or_else(|| bad("missing request line"))?;

    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| bad("missing HTTP method"))?.to_string();
    let target = parts.next().ok_or_else(|| bad("missing request path"))?;
    parts.next().ok_or_else(|| bad("missing HTTP version"))?;

    let path = target.split('?').next().unwrap_or(target).to_string();

    let mut headers = HashMap::new();
    for line in lines.filter(|line| !line.is_empty()) {
        let (key, value) = line.split_once(':').ok_or_else(|| bad("invalid header line"))?;
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    Ok((method, path, headers))
}

fn content_length(headers: &HashMap<String, String>) -> Result<usize, RequestError> {
    match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| RequestError::BadRequest("invalid content-length".to_string())),
        None => Ok(0),
    }
}

fn find_header_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|window| window == b"\r\n\r\n")
}

fn route_request(request: &ParsedRequest, backend: &Backend) -> Response {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/api/load-content") => load_content(backend),
        ("POST" | "PUT", "/api/save-content") => save_content(backend, &request.body),
        _ => {
            log::info!("No route for {} {}", request.method, request.path);
            Response::error(404, "Not found.")
        }
    }
}

fn load_content(backend: &Backend) -> Response {
    match backend.store.read_document::<Value>() {
        Ok(Some(document)) => Response::ok(document),
        Ok(None) => {
            log::info!("No backup at {}", backend.store.path().display());
            Response::error(404, "No backup file found.")
        }
        Err(e) => {
            log::error!("Error reading backup file: {}", e);
            Response::error(500, "Failed to load content.")
        }
    }
}

fn save_content(backend: &Backend, body: &[u8]) -> Response {
    let document: Value = match serde_json::from_slice(body) {
        Ok(document) => document,
        Err(e) => {
            log::error!("Rejected save with invalid JSON: {}", e);
            return Response::error(500, "Failed to save content.");
        }
    };

    let _guard = match backend.write_lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    match backend.store.write_document(&document) {
        Ok(()) => Response::ok(json!({ "message": "Content saved successfully." })),
        Err(e) => {
            log::error!("Error writing backup file: {}", e);
            Response::error(500, "Failed to save content.")
        }
    }
}

fn write_response(stream: &mut TcpStream, response: &Response) -> io::Result<()> {
    let body = serde_json::to_vec(&response.body)?;
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        status_text(response.status),
        body.len()
    );
    stream.write_all(head.as_bytes())?;
    stream.write_all(&body)?;
    stream.flush()
}

fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn backend(path: PathBuf) -> Backend {
        Backend {
            store: FileStore::new(path),
            write_lock: Mutex::new(()),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    fn request(method: &str, path: &str, body: &[u8]) -> ParsedRequest {
        ParsedRequest {
            method: method.to_string(),
            path: path.to_string(),
            body: body.to_vec(),
        }
    }

    #[test]
    fn test_load_without_backup_is_404() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path().join("content-backup.json"));
        let response = route_request(&request("GET", "/api/load-content", b""), &backend);
        assert_eq!(response.status, 404);
        assert!(response.body["error"].is_string());
    }

    #[test]
    fn test_load_unreadable_backup_is_500() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("content-backup.json");
        fs::write(&path, "not json").unwrap();
        let response = route_request(&request("GET", "/api/load-content", b""), &backend(path));
        assert_eq!(response.status, 500);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("content-backup.json");
        let backend = backend(path.clone());

        let body = br#"[{"chapter":"1","title":"Uno","sections":[]}]"#;
        let saved = route_request(&request("POST", "/api/save-content", body), &backend);
        assert_eq!(saved.status, 200);
        assert_eq!(saved.body["message"], "Content saved successfully.");

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("\n  {\n    \"chapter\": \"1\""));

        let loaded = route_request(&request("GET", "/api/load-content", b""), &backend);
        assert_eq!(loaded.status, 200);
        assert_eq!(loaded.body[0]["title"], "Uno");
    }

    #[test]
    fn test_save_accepts_put_and_any_json_shape() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path().join("content-backup.json"));
        let put = request("PUT", "/api/save-content", br#"{"any":1}"#);
        let response = route_request(&put, &backend);
        assert_eq!(response.status, 200);
    }

    #[test]
    fn test_save_invalid_json_is_500() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("content-backup.json");
        let backend = backend(path.clone());
        let response = route_request(&request("POST", "/api/save-content", b"{oops"), &backend);
        assert_eq!(response.status, 500);
        assert!(!path.exists());
    }

    #[test]
    fn test_unknown_route_is_404() {
        let dir = tempdir().unwrap();
        let backend = backend(dir.path().join("content-backup.json"));
        assert_eq!(route_request(&request("GET", "/api/other", b""), &backend).status, 404);
        let delete = request("DELETE", "/api/save-content", b"");
        assert_eq!(route_request(&delete, &backend).status, 404);
    }

    #[test]
    fn test_parse_head_extracts_headers_and_strips_query() {
        let raw = b"POST /api/save-content?x=1 HTTP/1.1\r\nHost: localhost\r\nContent-Length: 13";
        let (method, path, headers) = parse_head(raw).unwrap();
        assert_eq!(method, "POST");
        assert_eq!(path, "/api/save-content");
        assert_eq!(content_length(&headers).unwrap(), 13);
        assert_eq!(headers.get("host").map(String::as_str), Some("localhost"));
    }

    #[test]
    fn test_oversized_body_is_413() {
        let dir = tempdir().unwrap();
        let mut config = ServerConfig::new("127.0.0.1:0", dir.path().join("content-backup.json"));
        config.max_body_bytes = 16;
        let server = start_server(&config).unwrap();

        let body = "[".repeat(64);
        let mut stream = TcpStream::connect(server.local_addr()).unwrap();
        write!(
            stream,
            "POST /api/save-content HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
        .unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        assert!(!config.backup_path.exists());
    }
}
