//! Leader Discovery
//!
//! Clients ask the rendezvous endpoint, at a fixed address, which node
//! coordinates. The coordinator's address is derived from the rendezvous
//! address by adding the node's offset to the port, and every later call
//! of the session goes straight there. Resolution happens once per
//! session and fails fast: retries belong to the caller.

use std::net::SocketAddr;
use std::time::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};
use crate::api::{ApiResponse, RegisterReply, RegisterRequest, SessionReply, SessionRequest};
use crate::cluster::Abandoned;
use crate::coordinator::ExamCreated;
use crate::error::{CoordError, Result};
use crate::types::{ExamDraft, LeaderInfo, NodeSnapshot, ScheduledExam};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// `rendezvous` with its port shifted by `offset`
pub fn coordinator_addr(rendezvous: SocketAddr, offset: u16) -> Result<SocketAddr> {
    let port = rendezvous.port().checked_add(offset).ok_or_else(|| {
        CoordError::UnknownCoordinator(format!("offset {} overflows port {}", offset, rendezvous.port()))
    })?;
    Ok(SocketAddr::new(rendezvous.ip(), port))
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(CoordError::from)
}

#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    http: reqwest::Client,
    rendezvous: SocketAddr,
}

impl DiscoveryClient {
    pub fn new(rendezvous: SocketAddr) -> Result<Self> {
        Self::with_timeout(rendezvous, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(rendezvous: SocketAddr, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            rendezvous,
        })
    }

    /// Ask the rendezvous who coordinates. Any transport failure is
    /// reported as `UnknownCoordinator`.
    pub async fn resolve_coordinator(&self) -> Result<LeaderInfo> {
        let url = format!("http://{}/leader", self.rendezvous);
        let unknown = |e: &dyn std::fmt::Display| {
            CoordError::UnknownCoordinator(format!("rendezvous {} unreachable: {}", self.rendezvous, e))
        };
        let response = self.http.get(&url).send().await.map_err(|e| unknown(&e))?;
        let body: ApiResponse<LeaderInfo> = response.json().await.map_err(|e| unknown(&e))?;
        let leader = body.into_result().map_err(|e| unknown(&e))?;
        debug!("Rendezvous {} reports coordinator {}", self.rendezvous, leader.node_id);
        Ok(leader)
    }

    /// Resolve the coordinator and bootstrap a session against it
    pub async fn connect(&self, session_code: Option<String>) -> Result<SessionClient> {
        let leader = self.resolve_coordinator().await?;
        let coordinator = coordinator_addr(self.rendezvous, leader.offset)?;
        let mut client = SessionClient {
            http: self.http.clone(),
            coordinator,
            session_code: String::new(),
        };
        let reply: SessionReply = client
            .post("/sessions", &SessionRequest { session_code })
            .await?;
        client.session_code = reply.session_code;
        info!("Session {} bound to {} at {}", client.session_code, leader.node_id, coordinator);
        Ok(client)
    }
}

/// Session pinned to the coordinator resolved at bootstrap
#[derive(Debug, Clone)]
pub struct SessionClient {
    http: reqwest::Client,
    coordinator: SocketAddr,
    session_code: String,
}

impl SessionClient {
    pub fn session_code(&self) -> &str {
        &self.session_code
    }

    pub fn coordinator(&self) -> SocketAddr {
        self.coordinator
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.coordinator, path)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body: ApiResponse<T> = response.json().await?;
        body.into_result()
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Self::decode(self.http.get(self.url(path)).send().await?).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        Self::decode(self.http.post(self.url(path)).json(body).send().await?).await
    }

    pub async fn read_schedule(&self) -> Result<Vec<ScheduledExam>> {
        self.get(&format!("/sessions/{}/schedule", self.session_code)).await
    }

    pub async fn register(&self, exam_id: &str) -> Result<RegisterReply> {
        let request = RegisterRequest { exam_id: exam_id.to_string() };
        self.post(&format!("/sessions/{}/register", self.session_code), &request)
            .await
    }

    pub async fn abandon(&self, exam_id: &str) -> Result<Abandoned> {
        let url = self.url(&format!("/sessions/{}/register/{}", self.session_code, exam_id));
        Self::decode(self.http.delete(url).send().await?).await
    }

    pub async fn cluster_status(&self) -> Result<Vec<NodeSnapshot>> {
        self.get("/cluster").await
    }

    pub async fn create_exam(&self, draft: &ExamDraft) -> Result<ExamCreated> {
        self.post("/exams", draft).await
    }
}
