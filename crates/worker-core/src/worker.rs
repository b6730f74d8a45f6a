use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tracing::{error, info, warn};
use worker_proto::{
    Decoder, ProtocolVersion, decode_v0, decode_v1, encode_handshake,
    encode_heartbeat, encode_terminate,
};

use crate::config::WorkerConfig;
use crate::dispatcher::{Dispatcher, Event};
use crate::error::WorkerError;
use crate::handler::Handler;
use crate::liveness::{DisownTimer, Watchdog};
use crate::session::SessionManager;

const READ_BUF_SIZE: usize = 64 * 1024;

/// The worker-side session multiplexer and health engine. Owns no state
/// once `run` returns — a lost socket, a disown, or a TERMINATE all end
/// the process; the supervisor is the only recovery actor.
pub struct Worker {
    config: WorkerConfig,
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config, handlers: HashMap::new() }
    }

    /// Registers a handler as callable `(request, response)`. Registration
    /// happens before `run` connects.
    pub fn on(&mut self, event: impl Into<String>, handler: impl Handler + 'static) -> &mut Self {
        self.handlers.insert(event.into(), Arc::new(handler));
        self
    }

    pub async fn run(self) -> Result<(), WorkerError> {
        let protocol = self.config.protocol;

        let stream =
            UnixStream::connect(&self.config.endpoint).await.map_err(|source| {
                WorkerError::Connect { endpoint: self.config.endpoint.clone(), source }
            })?;
        info!(endpoint = %self.config.endpoint, "connected to daemon");

        let (mut read_half, mut write_half) = stream.into_split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let mut sessions = SessionManager::new(protocol, outbound_tx.clone());
        for (event, handler) in self.handlers {
            sessions.register(event, handler);
        }

        outbound_tx
            .send(encode_handshake(protocol, &self.config.uuid)?)
            .ok();
        info!("handshake sent");

        let heartbeat_frame = encode_heartbeat(protocol)?;
        let mut disown_timer = DisownTimer::new(self.config.disown_timeout);

        // First heartbeat is sent immediately at connect time; the
        // periodic timer below only covers the ticks after that.
        do_heartbeat(&outbound_tx, &heartbeat_frame, &mut disown_timer);

        let heartbeat_period = self.config.heartbeat_timeout;
        let mut heartbeat_ticker =
            interval_at(Instant::now() + heartbeat_period, heartbeat_period);

        let watchdog_period = self.config.watchdog_timeout();
        let watchdog = Watchdog::spawn(watchdog_period, || {
            error!("disowned (watchdog): forcing process exit");
            std::process::exit(1);
        });

        let mut dispatcher = Dispatcher::new(protocol);
        let mut decoder = Decoder::new();
        let mut read_buf = vec![0_u8; READ_BUF_SIZE];

        loop {
            tokio::select! {
                _ = heartbeat_ticker.tick() => {
                    do_heartbeat(&outbound_tx, &heartbeat_frame, &mut disown_timer);
                }
                _ = disown_timer.wait() => {
                    error!("disowned: no heartbeat within the configured window");
                    return Err(WorkerError::Disowned);
                }
                Some(frame) = outbound_rx.recv() => {
                    if let Err(err) = write_half.write_all(&frame).await {
                        error!("failed to write frame: error={err}");
                        return Err(WorkerError::Io(err));
                    }
                }
                read_result = read_half.read(&mut read_buf) => {
                    let n = read_result?;
                    if n == 0 {
                        error!("connection lost: EOF from daemon");
                        return Err(WorkerError::Disowned);
                    }

                    decoder.feed(&read_buf[..n]);
                    while let Some(value) = decoder.next_value()? {
                        let raw = match protocol {
                            ProtocolVersion::V0 => decode_v0(&value),
                            ProtocolVersion::V1 => decode_v1(&value),
                        };
                        let raw = match raw {
                            Ok(raw) => raw,
                            Err(err) => {
                                warn!("malformed frame, dropping: error={err}");
                                continue;
                            }
                        };

                        let Some(event) = dispatcher.normalize(raw) else {
                            continue;
                        };

                        match event {
                            Event::Heartbeat => {
                                // Incoming heartbeats always disarm both
                                // disown timers before anything else.
                                watchdog.notify(watchdog_period);
                                disown_timer.disarm();
                            }
                            Event::Terminate { errno, reason } => {
                                info!(errno, %reason, "terminate received");
                                let frame = encode_terminate(protocol, errno, &reason)?;
                                write_half.write_all(&frame).await?;
                                return Ok(());
                            }
                            Event::Invoke { session, event } => {
                                sessions.on_invoke(session, event);
                            }
                            Event::Chunk { session, data } => {
                                sessions.on_chunk(session, data);
                            }
                            Event::Choke { session } => {
                                sessions.on_choke(session);
                            }
                            Event::Error { session, errno, reason } => {
                                sessions.on_error(session, errno, reason);
                            }
                        }
                    }
                }
            }
        }
    }
}

fn do_heartbeat(
    outbound: &mpsc::UnboundedSender<Vec<u8>>,
    heartbeat_frame: &[u8],
    disown_timer: &mut DisownTimer,
) {
    disown_timer.arm();
    outbound.send(heartbeat_frame.to_vec()).ok();
}
