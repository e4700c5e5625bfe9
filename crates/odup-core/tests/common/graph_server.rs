//! Minimal HTTP/1.1 server imitating the Graph endpoints used by uploads.
//!
//! Handles the token endpoint, `createUploadSession`, session status (GET),
//! chunk PUTs with `Content-Range` and path-addressed item lookups.
//! Every response closes the connection.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    /// Decoded drive path between `root:/` and `:/createUploadSession`.
    pub remote_path: String,
    pub received: Vec<u8>,
    pub total: Option<u64>,
    pub expired: bool,
}

#[derive(Debug, Default)]
pub struct ServerState {
    pub base: String,
    pub token_requests: usize,
    pub auth_headers: Vec<String>,
    pub sessions: Vec<SessionRecord>,
    /// `(session index, first byte, last byte)` of every PUT that was answered.
    pub puts: Vec<(usize, u64, u64)>,
    /// Global PUT numbers (1-based) whose connection is dropped without a response
    /// after the body was stored.
    pub drop_puts: HashSet<usize>,
    pub put_count: usize,
    /// File names for which session creation fails with `nameAlreadyExists`.
    pub conflicts: HashSet<String>,
    /// Answer the final chunk with a bare 202 (no driveItem in the body).
    pub final_without_item: bool,
    /// Drop a session as soon as its last byte arrives, as the real service does.
    pub close_when_complete: bool,
    /// Item lookups always answer 404.
    pub hide_items: bool,
    /// Decoded drive paths of every `GET .../drive/root:/{path}`.
    pub item_lookups: Vec<String>,
}

#[derive(Clone)]
pub struct GraphServer {
    pub base: String,
    pub state: Arc<Mutex<ServerState>>,
}

impl GraphServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let base = format!("http://127.0.0.1:{}/", port);
        let state = Arc::new(Mutex::new(ServerState {
            base: base.clone(),
            ..ServerState::default()
        }));
        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let state = Arc::clone(&shared);
                thread::spawn(move || handle(stream, &state));
            }
        });
        Self { base, state }
    }

    pub fn drop_put(&self, n: usize) {
        self.state.lock().unwrap().drop_puts.insert(n);
    }

    pub fn conflict_on(&self, name: &str) {
        self.state.lock().unwrap().conflicts.insert(name.to_string());
    }

    pub fn expire_session(&self, idx: usize) {
        self.state.lock().unwrap().sessions[idx].expired = true;
    }

    pub fn answer_final_chunk_without_item(&self) {
        self.state.lock().unwrap().final_without_item = true;
    }

    pub fn close_sessions_when_complete(&self) {
        self.state.lock().unwrap().close_when_complete = true;
    }

    pub fn hide_items(&self) {
        self.state.lock().unwrap().hide_items = true;
    }

    pub fn item_lookups(&self) -> Vec<String> {
        self.state.lock().unwrap().item_lookups.clone()
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.state.lock().unwrap().sessions.clone()
    }

    pub fn puts(&self) -> Vec<(usize, u64, u64)> {
        self.state.lock().unwrap().puts.clone()
    }

    pub fn token_requests(&self) -> usize {
        self.state.lock().unwrap().token_requests
    }
}

struct Request {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut data = Vec::new();
    let mut buf = [0u8; 16 * 1024];
    let header_end = loop {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_string();
    let path = first.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);
    Some(Request {
        method,
        path,
        headers,
        body,
    })
}

fn respond(stream: &mut TcpStream, status: u32, reason: &str, body: &str) {
    let resp = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    let _ = stream.write_all(resp.as_bytes());
    let _ = stream.flush();
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(Ok(b)) = s.get(i + 1..i + 3).map(|h| u8::from_str_radix(h, 16)) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}

fn handle(mut stream: TcpStream, state: &Mutex<ServerState>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(req) = read_request(&mut stream) else {
        return;
    };

    if req.method == "POST" && req.path.ends_with("/oauth2/v2.0/token") {
        state.lock().unwrap().token_requests += 1;
        respond(
            &mut stream,
            200,
            "OK",
            r#"{"token_type":"Bearer","expires_in":3600,"access_token":"test-token"}"#,
        );
        return;
    }

    if req.method == "POST" && req.path.ends_with(":/createUploadSession") {
        let decoded = percent_decode(&req.path);
        let remote_path = decoded
            .split_once("root:/")
            .map(|(_, rest)| rest.trim_end_matches(":/createUploadSession").to_string())
            .unwrap_or_default();
        let name = remote_path.rsplit('/').next().unwrap_or_default().to_string();
        let mut st = state.lock().unwrap();
        st.auth_headers
            .push(req.header("Authorization").unwrap_or_default().to_string());
        if st.conflicts.contains(&name) {
            drop(st);
            respond(
                &mut stream,
                409,
                "Conflict",
                r#"{"error":{"code":"nameAlreadyExists","message":"The specified item name already exists."}}"#,
            );
            return;
        }
        st.sessions.push(SessionRecord {
            remote_path,
            ..SessionRecord::default()
        });
        let idx = st.sessions.len() - 1;
        let body = format!(
            r#"{{"uploadUrl":"{}upload/{}","expirationDateTime":"2030-01-01T00:00:00Z","nextExpectedRanges":["0-"]}}"#,
            st.base, idx
        );
        drop(st);
        respond(&mut stream, 200, "OK", &body);
        return;
    }

    if req.method == "GET" && req.path.contains("/drive/root:/") {
        let decoded = percent_decode(&req.path);
        let remote_path = decoded
            .split_once("root:/")
            .map(|(_, rest)| rest.trim_end_matches(':').to_string())
            .unwrap_or_default();
        let mut st = state.lock().unwrap();
        st.item_lookups.push(remote_path.clone());
        let hidden = st.hide_items;
        let finished = st
            .sessions
            .iter()
            .enumerate()
            .find(|(_, s)| s.remote_path == remote_path && s.total == Some(s.received.len() as u64))
            .map(|(idx, s)| (idx, s.received.len()))
            .filter(|_| !hidden);
        drop(st);
        match finished {
            Some((idx, size)) => {
                let name = remote_path.rsplit('/').next().unwrap_or_default();
                let body = format!(
                    r#"{{"id":"item-{}","name":"{}","size":{},"createdDateTime":"2024-01-01T00:00:00Z","file":{{}}}}"#,
                    idx, name, size
                );
                respond(&mut stream, 200, "OK", &body);
            }
            None => respond(
                &mut stream,
                404,
                "Not Found",
                r#"{"error":{"code":"itemNotFound","message":"The resource could not be found."}}"#,
            ),
        }
        return;
    }

    if let Some(idx) = req
        .path
        .strip_prefix("/upload/")
        .and_then(|s| s.parse::<usize>().ok())
    {
        handle_session(stream, state, idx, req);
        return;
    }

    respond(
        &mut stream,
        400,
        "Bad Request",
        r#"{"error":{"code":"invalidRequest","message":"unknown route"}}"#,
    );
}

fn handle_session(mut stream: TcpStream, state: &Mutex<ServerState>, idx: usize, req: Request) {
    let mut st = state.lock().unwrap();
    let gone = st.sessions.get(idx).map(|s| s.expired).unwrap_or(true);
    if gone {
        drop(st);
        respond(
            &mut stream,
            404,
            "Not Found",
            r#"{"error":{"code":"itemNotFound","message":"session not found"}}"#,
        );
        return;
    }

    if req.method == "GET" {
        let received = st.sessions[idx].received.len();
        drop(st);
        let body = format!(
            r#"{{"expirationDateTime":"2030-01-01T00:00:00Z","nextExpectedRanges":["{}-"]}}"#,
            received
        );
        respond(&mut stream, 200, "OK", &body);
        return;
    }

    // PUT: "Content-Range: bytes a-b/total"
    let range = req
        .header("Content-Range")
        .and_then(|v| v.strip_prefix("bytes "))
        .and_then(|v| v.split_once('/'))
        .and_then(|(r, total)| {
            let (a, b) = r.split_once('-')?;
            Some((a.parse::<u64>().ok()?, b.parse::<u64>().ok()?, total.parse::<u64>().ok()?))
        });
    let Some((start, end, total)) = range else {
        drop(st);
        respond(
            &mut stream,
            400,
            "Bad Request",
            r#"{"error":{"code":"invalidRange","message":"bad Content-Range"}}"#,
        );
        return;
    };
    let session = &mut st.sessions[idx];
    if start != session.received.len() as u64 || end + 1 - start != req.body.len() as u64 {
        drop(st);
        respond(
            &mut stream,
            416,
            "Range Not Satisfiable",
            r#"{"error":{"code":"invalidRange","message":"unexpected range"}}"#,
        );
        return;
    }
    session.total = Some(total);
    session.received.extend_from_slice(&req.body);
    let received = session.received.len() as u64;
    let name = session.remote_path.rsplit('/').next().unwrap_or_default().to_string();
    if received == total && st.close_when_complete {
        st.sessions[idx].expired = true;
    }

    st.put_count += 1;
    let n = st.put_count;
    if st.drop_puts.contains(&n) {
        // Bytes were stored but the client never hears about it.
        drop(st);
        let _ = stream.shutdown(std::net::Shutdown::Both);
        return;
    }
    st.puts.push((idx, start, end));
    let final_without_item = st.final_without_item;
    drop(st);

    if received == total && final_without_item {
        respond(
            &mut stream,
            202,
            "Accepted",
            r#"{"expirationDateTime":"2030-01-01T00:00:00Z","nextExpectedRanges":[]}"#,
        );
    } else if received == total {
        let body = format!(
            r#"{{"id":"item-{}","name":"{}","size":{},"createdDateTime":"2024-01-01T00:00:00Z","file":{{}}}}"#,
            idx, name, total
        );
        respond(&mut stream, 201, "Created", &body);
    } else {
        let body = format!(
            r#"{{"expirationDateTime":"2030-01-01T00:00:00Z","nextExpectedRanges":["{}-"]}}"#,
            received
        );
        respond(&mut stream, 202, "Accepted", &body);
    }
}
