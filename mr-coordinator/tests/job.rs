//! End-to-end scenarios over real loopback TCP connections: word count
//! across real worker daemons, and replica-vote resolution against
//! hand-rolled fake workers that reply with chosen results.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use mr_coordinator::config::JobSection;
use mr_coordinator::foreman;
use mr_coordinator::foreman::connection;
use mr_coordinator::foreman::connection::OutgoingCommand;
use mr_coordinator::foreman::task;
use mr_coordinator::foreman::task::PendingTask;
use mr_coordinator::foreman::ForemanError;
use mr_coordinator::metrics::Metrics;
use mr_coordinator::worker::handler;
use mr_discovery::DiscoveryClient;
use mr_messages::vote;
use mr_messages::DataSource;
use mr_messages::Key;
use mr_messages::MapPayload;
use mr_messages::ProgramDescriptor;
use mr_messages::ReducePayload;
use mr_messages::Val;
use mr_sandbox::ProgramRegistry;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const TASK_KEY: [u8; 16] = *b"shared-test-key!";

fn mock_key_body() -> String {
    format!(r#"{{"key":"{}"}}"#, BASE64.encode(TASK_KEY))
}

#[tokio::test]
async fn word_count_across_real_workers() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", mockito::Matcher::Regex(r"^/tasks/.*$".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(mock_key_body())
        .create_async()
        .await;
    server
        .mock("DELETE", mockito::Matcher::Regex(r"^/tasks/.*$".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(mock_key_body())
        .create_async()
        .await;

    let discovery = DiscoveryClient::new(server.url()).unwrap();

    let registry = Arc::new(ProgramRegistry::with_builtins());
    let discovery_for_workers = Arc::new(DiscoveryClient::new(server.url()).unwrap());
    let worker_metrics = Arc::new(Metrics::new());
    let worker_a = bind_worker(
        registry.clone(),
        discovery_for_workers.clone(),
        worker_metrics.clone(),
    )
    .await;
    let worker_b = bind_worker(
        registry.clone(),
        discovery_for_workers.clone(),
        worker_metrics.clone(),
    )
    .await;

    let data = vec![
        (Key::from(0), Val::from("Humpty Dumpty sat on a wall")),
        (Key::from(1), Val::from("Humpty Dumpty had a great fall")),
        (
            Key::from(2),
            Val::from("All the King's horses and all the King's men"),
        ),
        (Key::from(3), Val::from("Couldn't put Humpty together again")),
    ];
    let data_source = DataSource::new(data);

    let descriptor = ProgramDescriptor {
        program_id: mr_sandbox::builtin::wordcount::PROGRAM_ID.to_owned(),
        allowed_capabilities: vec!["text.split_whitespace".to_owned()],
    };
    let job = JobSection {
        replication: 2,
        chunk_rows: 4,
    };
    let metrics = Metrics::new();

    let result = foreman::run_job(
        data_source,
        descriptor.clone(),
        descriptor,
        vec![worker_a, worker_b],
        &discovery,
        &job,
        &metrics,
    )
    .await
    .unwrap();

    assert_eq!(
        mr_messages::find(&result, &Key::from("Humpty")),
        Some(&Val::from(3))
    );
    assert_eq!(
        mr_messages::find(&result, &Key::from("Dumpty")),
        Some(&Val::from(2))
    );
    assert_eq!(
        mr_messages::find(&result, &Key::from("the")),
        Some(&Val::from(2))
    );
}

async fn bind_worker(
    registry: Arc<ProgramRegistry>,
    discovery: Arc<DiscoveryClient>,
    metrics: Arc<Metrics>,
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let registry = registry.clone();
            let discovery = discovery.clone();
            let metrics = metrics.clone();
            tokio::spawn(async move {
                let _ = handler::handle_connection(stream, registry, discovery, metrics).await;
            });
        }
    });
    addr
}

/// A fake worker that ignores the incoming task's contents and always
/// reports `answer`, encrypted and fingerprinted under the shared test key.
async fn spawn_answering_worker(answer: Vec<(Key, Val)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let canonical = vote::encode_canonical(&answer);
    let fingerprint = vote::fingerprint(&answer);
    let ciphertext = mr_discovery::crypto::encrypt(&TASK_KEY, canonical.as_bytes());

    tokio::spawn(async move {
        use futures_util::SinkExt;
        use mr_messages::frame::decode_payload;
        use mr_messages::Command;
        use mr_messages::Frame;
        use mr_messages::FrameCodec;
        use mr_messages::TaskCompletePayload;
        use tokio_stream::StreamExt;
        use tokio_util::codec::Framed;

        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let mut framed = Framed::new(stream, FrameCodec::default());
        let Some(Ok(frame)) = framed.next().await else {
            return;
        };
        let task_id = match frame.command {
            Command::Map => {
                decode_payload::<MapPayload>(&frame.payload.unwrap()).unwrap().task_id
            },
            Command::Reduce => {
                decode_payload::<ReducePayload>(&frame.payload.unwrap()).unwrap().task_id
            },
            _ => return,
        };
        let reply = TaskCompletePayload {
            task_id,
            ciphertext,
            fingerprint,
        };
        let _ = framed.send(Frame::with_payload(Command::TaskComplete, &reply)).await;
    });

    addr
}

async fn run_single_reduce_task(
    worker_addrs: Vec<String>,
    discovery: &DiscoveryClient,
) -> Result<Vec<(Key, Val)>, ForemanError> {
    let (events_tx, mut events_rx) = mpsc::channel(32);
    let mut workers: HashMap<String, mpsc::Sender<OutgoingCommand>> = HashMap::new();
    let mut idle = VecDeque::new();
    for addr in &worker_addrs {
        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let sender = connection::spawn(addr.clone(), stream, events_tx.clone());
        workers.insert(addr.clone(), sender);
        idle.push_back(addr.clone());
    }
    drop(events_tx);

    let task = PendingTask {
        task_id: "reduce-a".to_owned(),
        command: OutgoingCommand::Reduce(ReducePayload {
            task_id: "reduce-a".to_owned(),
            data: vec![(Key::from("a"), vec![Val::from(1), Val::from(1)])],
        }),
    };
    let metrics = Metrics::new();
    let outcomes = task::run_round(
        vec![task],
        worker_addrs.len(),
        "reduce",
        &mut workers,
        &mut idle,
        &mut events_rx,
        discovery,
        &metrics,
    )
    .await?;

    Ok(outcomes.into_iter().next().unwrap().pairs)
}

#[tokio::test]
async fn replica_disagreement_accepts_the_majority_result() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", mockito::Matcher::Regex(r"^/tasks/.*$".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(mock_key_body())
        .create_async()
        .await;
    server
        .mock("DELETE", mockito::Matcher::Regex(r"^/tasks/.*$".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(mock_key_body())
        .create_async()
        .await;
    let discovery = DiscoveryClient::new(server.url()).unwrap();

    let agree = vec![(Key::from("a"), Val::from(1))];
    let dissent = vec![(Key::from("a"), Val::from(2))];
    let workers = vec![
        spawn_answering_worker(agree.clone()).await,
        spawn_answering_worker(agree.clone()).await,
        spawn_answering_worker(dissent).await,
    ];

    let pairs = run_single_reduce_task(workers, &discovery).await.unwrap();
    assert_eq!(pairs, agree);
}

#[tokio::test]
async fn no_majority_fails_the_task_and_invalidates_it() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", mockito::Matcher::Regex(r"^/tasks/.*$".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(mock_key_body())
        .create_async()
        .await;
    server
        .mock("DELETE", mockito::Matcher::Regex(r"^/tasks/.*$".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"credits":1}"#)
        .create_async()
        .await;
    let discovery = DiscoveryClient::new(server.url()).unwrap();

    let workers = vec![
        spawn_answering_worker(vec![(Key::from("a"), Val::from(1))]).await,
        spawn_answering_worker(vec![(Key::from("a"), Val::from(2))]).await,
        spawn_answering_worker(vec![(Key::from("a"), Val::from(3))]).await,
    ];

    let err = run_single_reduce_task(workers, &discovery).await.unwrap_err();
    assert!(matches!(err, ForemanError::NoMajority { .. }));
}
