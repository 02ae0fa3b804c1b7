use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use exam_coord::coordinator::{WriteOutcome, REGISTERED};
use exam_coord::discovery::{coordinator_addr, DiscoveryClient};
use exam_coord::error::CoordError;
use exam_coord::server::{Server, ServerState};
use exam_coord::store::{InMemoryRecordStore, RecordStore};
use exam_coord::types::{ExamDraft, NodeId};
use exam_coord::CoordinationContext;
use exam_coord::cluster::NodeSet;
use once_cell::sync::OnceCell;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

static TRACING: OnceCell<()> = OnceCell::new();

fn setup_logging() {
    TRACING.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn context(node_count: u16) -> Arc<CoordinationContext> {
    let store = InMemoryRecordStore::new();
    store.insert(ExamDraft::new("DSGT", vec![])).unwrap();
    Arc::new(CoordinationContext::bootstrap(NodeSet::bootstrap(node_count), Arc::new(store)).unwrap())
}

/// Bind an ephemeral rendezvous port whose `+ offset` neighbour is free too
async fn bind_pair(offset: u16) -> (TcpListener, TcpListener) {
    for _ in 0..50 {
        let rendezvous = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = rendezvous.local_addr().unwrap();
        let Ok(target) = coordinator_addr(addr, offset) else { continue };
        if let Ok(coordinator) = TcpListener::bind(target).await {
            return (rendezvous, coordinator);
        }
    }
    panic!("no free port pair");
}

struct Running {
    server: Server,
    rendezvous: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), CoordError>>,
}

async fn start(ctx: Arc<CoordinationContext>) -> Running {
    let offset = ctx.resolve_coordinator().unwrap().offset;
    let (rendezvous, coordinator) = match offset {
        0 => (TcpListener::bind("127.0.0.1:0").await.unwrap(), None),
        _ => {
            let (r, c) = bind_pair(offset).await;
            (r, Some(c))
        }
    };
    let addr = rendezvous.local_addr().unwrap();
    let server = Server::new(ctx);
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = {
        let server = server.clone();
        tokio::spawn(async move {
            server
                .serve(rendezvous, coordinator, async {
                    let _ = stopped.await;
                })
                .await
        })
    };
    for _ in 0..100 {
        if server.get_state().await == ServerState::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    info!("Test server up, rendezvous {}", addr);
    Running { server, rendezvous: addr, stop, handle }
}

async fn stop(running: Running) {
    running.stop.send(()).unwrap();
    running.handle.await.unwrap().unwrap();
    assert_eq!(running.server.get_state().await, ServerState::Stopped);
}

#[tokio::test]
async fn test_session_goes_through_discovered_coordinator() {
    setup_logging();
    let ctx = context(3);
    let running = start(ctx.clone()).await;
    let bound = running.server.get_bound_addrs().await.unwrap();
    assert_eq!(bound.coordinator.port(), bound.rendezvous.port() + 2);

    let discovery = DiscoveryClient::new(running.rendezvous).unwrap();
    let leader = discovery.resolve_coordinator().await.unwrap();
    assert_eq!(leader.node_id, NodeId(2));

    let client = discovery.connect(Some("student-1".to_string())).await.unwrap();
    assert_eq!(client.session_code(), "student-1");
    assert_eq!(client.coordinator(), bound.coordinator);

    let schedule = client.read_schedule().await.unwrap();
    assert_eq!(schedule.len(), 1);

    let reply = client.register("DSGT").await.unwrap();
    assert_eq!(reply.message, REGISTERED);
    match reply.outcome {
        WriteOutcome::Registered { record, replication } => {
            assert_eq!(record.students_registered, 1);
            assert!(replication.is_complete());
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(ctx.session("student-1").unwrap().coordinator, NodeId(2));

    let status = client.cluster_status().await.unwrap();
    assert!(status[0].replica_keys.contains(&"DSGT".to_string()));

    stop(running).await;
}

#[tokio::test]
async fn test_generated_session_code() {
    setup_logging();
    let running = start(context(3)).await;

    let client = DiscoveryClient::new(running.rendezvous)
        .unwrap()
        .connect(None)
        .await
        .unwrap();
    assert!(uuid::Uuid::parse_str(client.session_code()).is_ok());

    stop(running).await;
}

#[tokio::test]
async fn test_single_node_shares_rendezvous_listener() {
    setup_logging();
    let running = start(context(1)).await;

    let client = DiscoveryClient::new(running.rendezvous)
        .unwrap()
        .connect(Some("solo".to_string()))
        .await
        .unwrap();
    assert_eq!(client.coordinator(), running.rendezvous);
    assert_eq!(client.read_schedule().await.unwrap()[0].name, "DSGT");

    stop(running).await;
}

#[tokio::test]
async fn test_unreachable_rendezvous_fails_fast() {
    setup_logging();
    // Bind and drop to get a port nobody listens on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let discovery = DiscoveryClient::with_timeout(addr, Duration::from_millis(500)).unwrap();

    assert!(matches!(
        discovery.resolve_coordinator().await,
        Err(CoordError::UnknownCoordinator(_))
    ));
    assert!(matches!(
        discovery.connect(None).await,
        Err(CoordError::UnknownCoordinator(_))
    ));
}
