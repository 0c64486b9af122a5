// Scripted transport shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use huelink::{HueError, Method, Result, Transport};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DISCOVERY: &str = "http://discovery.test/";

#[derive(Debug, Clone)]
enum Reply {
    Json(Value),
    Delayed(Duration, Value),
    Fail,
    NotJson,
}

/// A request seen by the mock
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

/// Answers requests from per-route queues; the last reply of a route repeats
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    requests: Mutex<Vec<Recorded>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, method: Method, url: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, url.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub fn reply(&self, method: Method, url: &str, value: Value) {
        self.push(method, url, Reply::Json(value));
    }

    pub fn reply_after(&self, delay: Duration, method: Method, url: &str, value: Value) {
        self.push(method, url, Reply::Delayed(delay, value));
    }

    pub fn fail(&self, method: Method, url: &str) {
        self.push(method, url, Reply::Fail);
    }

    /// Answer with a body that is not JSON
    pub fn not_json(&self, method: Method, url: &str) {
        self.push(method, url, Reply::NotJson);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }

    pub fn last_body(&self, method: Method, url: &str) -> Option<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.method == method && r.url == url)
            .and_then(|r| r.body.clone())
    }

    fn next(&self, method: &Method, url: &str) -> Option<Reply> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(&(method.clone(), url.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, method: Method, url: &str, body: Option<Value>) -> Result<Value> {
        self.requests.lock().unwrap().push(Recorded {
            method: method.clone(),
            url: url.to_string(),
            body,
        });

        match self.next(&method, url) {
            Some(Reply::Json(value)) => Ok(value),
            Some(Reply::Delayed(delay, value)) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            Some(Reply::NotJson) => Err(HueError::Json(
                serde_json::from_str::<Value>("<html>").unwrap_err(),
            )),
            Some(Reply::Fail) | None => Err(HueError::Connection(format!("{} {} unreachable", method, url))),
        }
    }
}

pub fn pairing_url(ip: &str) -> String {
    format!("http://{}/api", ip)
}

pub fn lights_url(ip: &str, username: &str) -> String {
    format!("http://{}/api/{}/lights", ip, username)
}

pub fn state_url(ip: &str, username: &str, id: &str) -> String {
    format!("http://{}/api/{}/lights/{}/state", ip, username, id)
}

/// Lights payload with one color light per `(id, uniqueid, on)`
pub fn lights_payload(lights: &[(&str, &str, bool)]) -> Value {
    let mut map = serde_json::Map::new();
    for (id, unique_id, on) in lights {
        map.insert(
            id.to_string(),
            serde_json::json!({
                "type": "Extended color light",
                "name": format!("Light {}", id),
                "uniqueid": unique_id,
                "state": {
                    "on": on, "bri": 144, "hue": 7676, "sat": 199,
                    "xy": [0.5, 0.25], "ct": 443, "reachable": true,
                    "effect": "none", "alert": "none", "colormode": "xy"
                }
            }),
        );
    }
    Value::Object(map)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
