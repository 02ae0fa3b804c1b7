use std::{
    future::{Future, IntoFuture},
    net::SocketAddr,
    sync::Arc,
};
use tokio::{
    net::TcpListener,
    sync::{watch, RwLock},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};
use crate::api;
use crate::config::ClusterConfig;
use crate::coordinator::CoordinationContext;
use crate::error::CoordError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Addresses actually bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddrs {
    pub rendezvous: SocketAddr,
    pub coordinator: SocketAddr,
}

/// Serves the rendezvous endpoint and the coordinator's session endpoint
#[derive(Debug, Clone)]
pub struct Server {
    ctx: Arc<CoordinationContext>,
    state: Arc<RwLock<ServerState>>,
    bound: Arc<RwLock<Option<BoundAddrs>>>,
}

impl Server {
    pub fn new(ctx: Arc<CoordinationContext>) -> Self {
        Self {
            ctx,
            state: Arc::new(RwLock::new(ServerState::Stopped)),
            bound: Arc::new(RwLock::new(None)),
        }
    }

    pub fn context(&self) -> &Arc<CoordinationContext> {
        &self.ctx
    }

    pub async fn get_state(&self) -> ServerState {
        *self.state.read().await
    }

    pub async fn get_bound_addrs(&self) -> Option<BoundAddrs> {
        *self.bound.read().await
    }

    /// Bind `host:base_port` and `host:base_port + coordinator` and serve
    /// until `shutdown` completes.
    pub async fn run(
        &self,
        cluster: &ClusterConfig,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), CoordError> {
        let offset = self.ctx.resolve_coordinator()?.offset;
        let rendezvous = TcpListener::bind(cluster.rendezvous_addr()?).await?;
        // node 0 coordinates on the rendezvous port itself
        let coordinator = match offset {
            0 => None,
            _ => Some(TcpListener::bind(cluster.node_addr(offset)?).await?),
        };
        self.serve(rendezvous, coordinator, shutdown).await
    }

    /// Serve on already-bound listeners. Without a coordinator listener
    /// both routers share the rendezvous listener.
    pub async fn serve(
        &self,
        rendezvous: TcpListener,
        coordinator: Option<TcpListener>,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), CoordError> {
        let addrs = bound_addrs(&rendezvous, coordinator.as_ref())?;
        *self.state.write().await = ServerState::Starting;

        let trace = TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO));
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
        let coordinator_app = api::coordinator_router(self.ctx.clone());

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown.await;
            let _ = stop_tx.send(true);
        });

        *self.bound.write().await = Some(addrs);
        *self.state.write().await = ServerState::Running;
        info!("Rendezvous listening on {}", addrs.rendezvous);
        info!("Coordinator listening on {}", addrs.coordinator);

        let result = match coordinator {
            Some(listener) => {
                let rendezvous_app = api::rendezvous_router(self.ctx.clone()).layer(trace.clone());
                let coordinator_app = coordinator_app.layer(cors).layer(trace);
                tokio::try_join!(
                    axum::serve(rendezvous, rendezvous_app)
                        .with_graceful_shutdown(stopped(stop_rx.clone()))
                        .into_future(),
                    axum::serve(listener, coordinator_app)
                        .with_graceful_shutdown(stopped(stop_rx))
                        .into_future(),
                )
                .map(|_| ())
            }
            None => {
                let app = api::rendezvous_router(self.ctx.clone())
                    .merge(coordinator_app)
                    .layer(cors)
                    .layer(trace);
                axum::serve(rendezvous, app)
                    .with_graceful_shutdown(stopped(stop_rx))
                    .await
            }
        };

        *self.state.write().await = ServerState::Stopping;
        *self.bound.write().await = None;
        *self.state.write().await = ServerState::Stopped;
        info!("Server stopped");
        result.map_err(CoordError::from)
    }
}

fn bound_addrs(rendezvous: &TcpListener, coordinator: Option<&TcpListener>) -> Result<BoundAddrs, CoordError> {
    let rendezvous = rendezvous.local_addr()?;
    let coordinator = match coordinator {
        Some(listener) => listener.local_addr()?,
        None => rendezvous,
    };
    Ok(BoundAddrs { rendezvous, coordinator })
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    // A dropped sender also means stop
    let _ = rx.wait_for(|stop| *stop).await;
}
