//! The foreman's side of one worker connection: a task that owns the TCP
//! socket and exchanges [`ConnectionEvent`]s / [`OutgoingCommand`]s with the
//! scheduler over channels, rather than sharing any mutable state.
//!
//! Grounded on `ec262/foreman.py`'s `WorkerController`, rebuilt over the
//! `mr-messages` framing in the channel-duplex-plus-`tokio::select!` idiom of
//! `lgn-worker/src/grpc/mod.rs::connect`.

use futures_util::SinkExt;
use mr_messages::frame::decode_payload;
use mr_messages::Command;
use mr_messages::Fingerprint;
use mr_messages::Frame;
use mr_messages::FrameCodec;
use mr_messages::MapPayload;
use mr_messages::ProgramDescriptor;
use mr_messages::ReducePayload;
use mr_messages::TaskCompletePayload;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::debug;
use tracing::warn;

#[derive(Debug)]
pub enum ConnectionEvent {
    Ready {
        worker_id: String,
    },
    Complete {
        worker_id: String,
        task_id: String,
        ciphertext: Vec<u8>,
        fingerprint: Fingerprint,
    },
    Disconnected {
        worker_id: String,
    },
}

#[derive(Debug, Clone)]
pub enum OutgoingCommand {
    SetMapFn(ProgramDescriptor),
    SetReduceFn(ProgramDescriptor),
    Map(MapPayload),
    Reduce(ReducePayload),
    Disconnect,
}

impl OutgoingCommand {
    fn into_frame(self) -> Frame {
        match self {
            OutgoingCommand::SetMapFn(d) => Frame::with_payload(Command::MapFn, &d),
            OutgoingCommand::SetReduceFn(d) => Frame::with_payload(Command::ReduceFn, &d),
            OutgoingCommand::Map(p) => Frame::with_payload(Command::Map, &p),
            OutgoingCommand::Reduce(p) => Frame::with_payload(Command::Reduce, &p),
            OutgoingCommand::Disconnect => Frame::bare(Command::Disconnect),
        }
    }
}

/// Spawns the connection task and returns a channel the scheduler uses to
/// send it commands. Events (readiness, task completion, disconnection) flow
/// back over `events_tx`, shared by every connection.
pub fn spawn(
    worker_id: String,
    stream: TcpStream,
    events_tx: mpsc::Sender<ConnectionEvent>,
) -> mpsc::Sender<OutgoingCommand> {
    let (commands_tx, mut commands_rx) = mpsc::channel::<OutgoingCommand>(32);

    tokio::spawn(async move {
        let mut framed = Framed::new(stream, FrameCodec::default());

        loop {
            tokio::select! {
                frame = framed.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            if !handle_inbound(&worker_id, frame, &events_tx).await {
                                break;
                            }
                        },
                        Some(Err(err)) => {
                            warn!(worker_id, %err, "frame decode error, dropping connection");
                            break;
                        },
                        None => break,
                    }
                },
                command = commands_rx.recv() => {
                    match command {
                        Some(command) => {
                            let disconnecting = matches!(command, OutgoingCommand::Disconnect);
                            if let Err(err) = framed.send(command.into_frame()).await {
                                warn!(worker_id, %err, "failed to write frame");
                                break;
                            }
                            if disconnecting {
                                break;
                            }
                        },
                        None => break,
                    }
                },
            }
        }

        debug!(worker_id, "connection closed");
        let _ = events_tx
            .send(ConnectionEvent::Disconnected { worker_id })
            .await;
    });

    commands_tx
}

/// Returns `false` when the connection should close.
async fn handle_inbound(
    worker_id: &str,
    frame: Frame,
    events_tx: &mpsc::Sender<ConnectionEvent>,
) -> bool {
    match frame.command {
        Command::Ready => {
            let _ = events_tx
                .send(ConnectionEvent::Ready {
                    worker_id: worker_id.to_owned(),
                })
                .await;
            true
        },
        Command::TaskComplete => {
            let Some(payload) = frame.payload else {
                warn!(worker_id, "taskcomplete frame carried no payload");
                return false;
            };
            let Ok(payload) = decode_payload::<TaskCompletePayload>(&payload) else {
                warn!(worker_id, "taskcomplete frame payload was not decodable");
                return false;
            };
            let _ = events_tx
                .send(ConnectionEvent::Complete {
                    worker_id: worker_id.to_owned(),
                    task_id: payload.task_id,
                    ciphertext: payload.ciphertext,
                    fingerprint: payload.fingerprint,
                })
                .await;
            true
        },
        Command::Disconnect => false,
        other => {
            warn!(worker_id, ?other, "unexpected command from worker");
            true
        },
    }
}
