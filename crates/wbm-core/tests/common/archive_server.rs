//! Minimal HTTP/1.1 server emulating the archive for integration tests.
//!
//! Serves a canned CDX listing (`/cdx/search/xd?...`) and snapshot bodies
//! (`/web/{timestamp}id_/{original_url}`), and counts snapshot requests so
//! tests can assert resumability (re-runs must fetch nothing).

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Canned site: listing rows plus resource bodies keyed by URL path.
pub struct ArchiveFixture {
    /// (timestamp, original URL) listing rows.
    pub captures: Vec<(&'static str, &'static str)>,
    /// URL path → (content type, body).
    pub resources: HashMap<&'static str, (&'static str, &'static str)>,
}

pub struct StartedServer {
    /// Base endpoint, e.g. `http://127.0.0.1:12345` (no trailing slash).
    pub endpoint: String,
    /// Number of snapshot (`/web/...`) requests served.
    pub snapshot_hits: Arc<AtomicUsize>,
}

/// Starts the server in a background thread. Runs until the process exits.
pub fn start(fixture: ArchiveFixture) -> StartedServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let fixture = Arc::new(fixture);
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let hits = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let fixture = Arc::clone(&fixture);
                let hits = Arc::clone(&hits);
                thread::spawn(move || handle(stream, &fixture, &hits));
            }
        });
    }
    StartedServer {
        endpoint: format!("http://127.0.0.1:{}", port),
        snapshot_hits: hits,
    }
}

fn handle(mut stream: std::net::TcpStream, fixture: &ArchiveFixture, hits: &AtomicUsize) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));

    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                raw.extend_from_slice(&buf[..n]);
                if raw.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            Err(_) => return,
        }
    }
    let request = match std::str::from_utf8(&raw) {
        Ok(s) => s,
        Err(_) => return,
    };
    let Some(path) = request_path(request) else {
        return;
    };

    if path.starts_with("/cdx/") {
        let body = cdx_body(fixture, &path);
        respond(&mut stream, "200 OK", "application/json", body.as_bytes());
    } else if let Some(original) = path.split_once("id_/").map(|(_, rest)| rest) {
        hits.fetch_add(1, Ordering::SeqCst);
        match fixture.resources.get(url_path(original)) {
            Some((content_type, body)) => {
                respond(&mut stream, "200 OK", content_type, body.as_bytes())
            }
            None => respond(&mut stream, "404 Not Found", "text/plain", b"not archived"),
        }
    } else {
        respond(&mut stream, "404 Not Found", "text/plain", b"unknown");
    }
}

fn request_path(request: &str) -> Option<String> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    if !method.eq_ignore_ascii_case("GET") {
        return None;
    }
    Some(parts.next()?.to_string())
}

/// CDX rows for the first page, an empty page otherwise.
fn cdx_body(fixture: &ArchiveFixture, path: &str) -> String {
    if let Some(page) = query_param(path, "page") {
        if page != "0" {
            return "[]".to_string();
        }
    }
    let mut body = String::from("[[\"timestamp\",\"original\"]");
    for (timestamp, url) in &fixture.captures {
        body.push_str(&format!(",[\"{}\",\"{}\"]", timestamp, url));
    }
    body.push(']');
    body
}

fn query_param<'a>(path: &'a str, name: &str) -> Option<&'a str> {
    let (_, query) = path.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix(name)?.strip_prefix('='))
}

/// URL path of an absolute URL string ("https://host/a/b?q" → "/a/b").
fn url_path(original: &str) -> &str {
    let without_scheme = original
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(original);
    let path_start = without_scheme.find('/').map(|i| &without_scheme[i..]);
    let path = path_start.unwrap_or("/");
    path.split_once('?').map(|(p, _)| p).unwrap_or(path)
}

fn respond(stream: &mut std::net::TcpStream, status: &str, content_type: &str, body: &[u8]) {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        content_type,
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}
