//! Scripted transport shared by the fetch-layer unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::transport::{Transport, TransportError, TransportResponse};

pub type ScriptedResult = Result<(u16, BTreeMap<String, String>, Vec<u8>), TransportError>;

/// Transport that pops scripted results in order and records request URLs.
pub struct Scripted {
    responses: Mutex<VecDeque<ScriptedResult>>,
    pub urls: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl Scripted {
    pub fn new(responses: Vec<ScriptedResult>) -> Arc<Self> {
        Arc::new(Scripted {
            responses: Mutex::new(responses.into()),
            urls: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for Scripted {
    fn get(
        &self,
        url: &str,
        _user_agent: &str,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted transport exhausted");
        next.map(|(status, headers, body)| TransportResponse {
            status,
            headers,
            body: Box::new(std::io::Cursor::new(body)),
        })
    }
}

/// Scripted 2xx/4xx response with the given body and no headers.
pub fn response(status: u16, body: &str) -> ScriptedResult {
    Ok((status, BTreeMap::new(), body.as_bytes().to_vec()))
}

/// Scripted response with explicit headers.
pub fn response_with_headers(
    status: u16,
    headers: &[(&str, &str)],
    body: &[u8],
) -> ScriptedResult {
    let headers = headers
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    Ok((status, headers, body.to_vec()))
}

/// Scripted 302 redirect to `location`.
pub fn redirect(location: &str) -> ScriptedResult {
    response_with_headers(302, &[("location", location)], b"")
}
