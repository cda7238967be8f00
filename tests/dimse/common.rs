#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dimse::codec::ScpCodec;
use dimse::types::{DimseRequest, DimseResponse, DimseStatus};
use dimse::{DimseConfig, DimseScu, RemoteNode};
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

/// What the mock peer does after reading a request
pub enum Step {
    Send(DimseResponse),
    Sleep(Duration),
    /// Raw bytes written past the codec
    Raw(Vec<u8>),
    Close,
}

/// In-process peer answering requests from a script
pub struct MockPeer {
    pub node: RemoteNode,
    pub requests: Arc<Mutex<Vec<DimseRequest>>>,
    pub connections: Arc<Mutex<Vec<SocketAddr>>>,
    /// Responses written, with the time of the write
    pub sent: Arc<Mutex<Vec<(DimseResponse, Instant)>>>,
    task: JoinHandle<()>,
}

impl MockPeer {
    pub async fn start<F>(ae_title: &str, script: F) -> Self
    where
        F: Fn(&DimseRequest) -> Vec<Step> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock peer");
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(Vec::new()));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(script);

        let task = {
            let requests = Arc::clone(&requests);
            let connections = Arc::clone(&connections);
            let sent = Arc::clone(&sent);
            tokio::spawn(async move {
                while let Ok((stream, from)) = listener.accept().await {
                    connections.lock().unwrap().push(from);
                    let requests = Arc::clone(&requests);
                    let script = Arc::clone(&script);
                    let sent = Arc::clone(&sent);
                    tokio::spawn(async move {
                        let mut framed = Framed::new(stream, ScpCodec::new());
                        while let Some(Ok(request)) = framed.next().await {
                            requests.lock().unwrap().push(request.clone());
                            for step in script(&request) {
                                match step {
                                    Step::Send(response) => {
                                        let written = framed.send(response.clone()).await;
                                        sent.lock().unwrap().push((response, Instant::now()));
                                        if written.is_err() {
                                            return;
                                        }
                                    }
                                    Step::Raw(bytes) => {
                                        if framed.get_mut().write_all(&bytes).await.is_err() {
                                            return;
                                        }
                                    }
                                    Step::Sleep(delay) => tokio::time::sleep(delay).await,
                                    Step::Close => return,
                                }
                            }
                        }
                    });
                }
            })
        };

        Self {
            node: RemoteNode::new(ae_title, "127.0.0.1", port),
            requests,
            connections,
            sent,
            task,
        }
    }

    pub fn received(&self) -> Vec<DimseRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockPeer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn scu_with_idle(idle: Duration) -> DimseScu {
    let mut config = DimseConfig::default();
    config.set_idle_timeout(idle);
    DimseScu::new(config)
}

/// A pending C-FIND match carrying one key
pub fn find_match(request: &DimseRequest, key: &str, value: &str) -> Step {
    let mut identifier = BTreeMap::new();
    identifier.insert(key.to_string(), value.to_string());
    Step::Send(DimseResponse::find_match(request.message_id, identifier))
}

/// Final response of the request's kind
pub fn final_status(request: &DimseRequest, status: DimseStatus) -> Step {
    Step::Send(DimseResponse::new(request.message_id, request.command, status))
}

/// Port nothing listens on
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn assert_no_leaked_handlers(scu: &DimseScu) {
    assert_eq!(scu.bus().active(), 0, "handler still registered");
    assert_eq!(
        scu.bus().subscribed_total(),
        scu.bus().unsubscribed_total(),
        "subscribe/unsubscribe mismatch"
    );
}
