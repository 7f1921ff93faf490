#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mattermost_websocket::auth::Token;
use mattermost_websocket::ws::config::{Config, ConnectionOptions, TransportSettings};
use mattermost_websocket::ws::error::BoxError;
use mattermost_websocket::ws::{Connection, Dispatch, Supervisor, Transport, WsError};
use tokio::time::{Instant, sleep, timeout};

pub const TOKEN: &str = "xoxo-test-token";

/// What the next call to `open` does.
#[derive(Debug, Clone)]
pub enum Script {
    /// `open` fails
    Refuse,
    /// `open` succeeds and `recv` plays the steps
    Accept(Vec<Step>),
    /// `open` succeeds but every send fails
    AcceptBroken,
}

#[derive(Debug, Clone)]
pub enum Step {
    Frame(&'static str),
    /// Mid-stream transport failure
    Fail,
    /// Clean close by the server
    Close,
    /// Nothing ever arrives
    Hang,
}

#[derive(Debug, Default)]
pub struct Log {
    /// When each `open` was called
    pub opens: Vec<Instant>,
    /// `(connection id, frame, when)` for every frame sent
    pub sent: Vec<(usize, String, Instant)>,
    /// Ids of connections that were closed
    pub closed: Vec<usize>,
    /// Connections currently open
    pub live: usize,
    /// Highest value `live` ever reached
    pub max_live: usize,
}

/// In-memory [`Transport`] that replays a script, one entry per `open`. Once the script runs
/// out every `open` is refused.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    pub log: Arc<Mutex<Log>>,
}

impl ScriptedTransport {
    pub fn new<I: IntoIterator<Item = Script>>(scripts: I) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into_iter().collect())),
            log: Arc::default(),
        }
    }

    pub fn opens(&self) -> Vec<Instant> {
        self.log.lock().unwrap().opens.clone()
    }

    pub fn sent(&self) -> Vec<(usize, String, Instant)> {
        self.log.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Connection = ScriptedConnection;

    async fn open(
        &self,
        _url: &str,
        _settings: &TransportSettings,
    ) -> Result<ScriptedConnection, WsError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Refuse);

        let mut log = self.log.lock().unwrap();
        log.opens.push(Instant::now());
        let id = log.opens.len();

        let (steps, broken) = match script {
            Script::Refuse => return Err(WsError::connect("connection refused")),
            Script::Accept(steps) => (steps, false),
            Script::AcceptBroken => (Vec::new(), true),
        };

        log.live += 1;
        log.max_live = log.max_live.max(log.live);

        Ok(ScriptedConnection {
            id,
            steps: steps.into(),
            broken,
            closed: false,
            log: Arc::clone(&self.log),
        })
    }
}

pub struct ScriptedConnection {
    id: usize,
    steps: VecDeque<Step>,
    broken: bool,
    closed: bool,
    log: Arc<Mutex<Log>>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send_text(&mut self, text: String) -> Result<(), WsError> {
        if self.broken || self.closed {
            return Err(WsError::ConnectionClosed);
        }
        self.log
            .lock()
            .unwrap()
            .sent
            .push((self.id, text, Instant::now()));
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, WsError>> {
        match self.steps.pop_front() {
            Some(Step::Frame(text)) => Some(Ok(text.to_owned())),
            Some(Step::Fail) => Some(Err(WsError::transport("connection reset by peer"))),
            Some(Step::Close) | None => None,
            Some(Step::Hang) => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut log = self.log.lock().unwrap();
        log.live -= 1;
        log.closed.push(self.id);
    }
}

pub fn options() -> ConnectionOptions {
    ConnectionOptions::builder()
        .host("chat.example.com")
        .port(443)
        .base_path("/api/v4")
        .build()
}

pub fn supervisor(transport: &ScriptedTransport) -> Supervisor<ScriptedTransport> {
    supervisor_with_config(transport, Config::default())
}

pub fn supervisor_with_config(
    transport: &ScriptedTransport,
    config: Config,
) -> Supervisor<ScriptedTransport> {
    Supervisor::with_transport(&options(), Token::new(TOKEN), config, transport.clone()).unwrap()
}

/// Dispatcher that records every message it sees.
pub fn recorder(seen: &Arc<Mutex<Vec<String>>>) -> impl Dispatch + 'static {
    let seen = Arc::clone(seen);
    move |message: String| {
        let seen = Arc::clone(&seen);
        async move {
            seen.lock().unwrap().push(message);
            Ok::<_, BoxError>(())
        }
    }
}

/// Poll `condition` until it holds. Works under paused time.
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) {
    timeout(Duration::from_secs(600), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition was not reached in time");
}

pub fn auth_frame() -> serde_json::Value {
    serde_json::json!({
        "seq": 1,
        "action": "authentication_challenge",
        "data": {"token": TOKEN}
    })
}
