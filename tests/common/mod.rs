//! Common test utilities
//!
//! A scripted gateway on a loopback port: tests push frames to whichever
//! client connected last, drop that connection, and inspect what the client
//! sent.

#![allow(dead_code)]

use creatune_hub::config::{HubConfig, ReconnectConfig};
use creatune_hub::Notification;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Generous upper bound for anything that should happen "soon"
pub const WAIT: Duration = Duration::from_secs(3);

enum Control {
    Text(String),
    Close,
}

pub struct MockGateway {
    addr: SocketAddr,
    accepts: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
    current: Arc<Mutex<Option<mpsc::UnboundedSender<Control>>>>,
    task: JoinHandle<()>,
}

impl MockGateway {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));
        let current = Arc::new(Mutex::new(None));

        let task = {
            let accepts = accepts.clone();
            let received = received.clone();
            let current = current.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let Ok(ws) = accept_async(stream).await else {
                        continue;
                    };
                    let (tx, rx) = mpsc::unbounded_channel();
                    *current.lock() = Some(tx);
                    accepts.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(ws, rx, received.clone()));
                }
            })
        };

        Self {
            addr,
            accepts,
            received,
            current,
            task,
        }
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("ws://{}/", self.addr)).unwrap()
    }

    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    /// Text frames the client has sent, across all connections
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    pub fn push(&self, frame: &str) {
        if let Some(tx) = self.current.lock().as_ref() {
            let _ = tx.send(Control::Text(frame.to_string()));
        }
    }

    /// Close the most recent connection from the gateway side
    pub fn drop_connection(&self) {
        if let Some(tx) = self.current.lock().take() {
            let _ = tx.send(Control::Close);
        }
    }

    pub async fn wait_for_accepts(&self, count: usize) {
        wait_until(|| self.accepts() >= count).await;
    }

    pub async fn wait_for_received(&self, count: usize) {
        wait_until(|| self.received.lock().len() >= count).await;
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    mut control: mpsc::UnboundedReceiver<Control>,
    received: Arc<Mutex<Vec<String>>>,
) {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            command = control.recv() => match command {
                Some(Control::Text(text)) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(Control::Close) | None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => received.lock().push(text),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Poll `condition` until it holds, panicking after [`WAIT`]
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Next notification from a channel subscription, panicking after [`WAIT`]
pub async fn next_notification(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("no notification in time")
        .expect("bus dropped")
}

/// Everything already queued on a channel subscription
pub fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut drained = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        drained.push(notification);
    }
    drained
}

pub fn test_config(gateway_url: Url) -> HubConfig {
    HubConfig {
        gateway_url,
        connect_timeout: Duration::from_secs(2),
        reconnect: ReconnectConfig {
            delay: Duration::from_millis(300),
            max_attempts: None,
        },
        ..HubConfig::default()
    }
}
