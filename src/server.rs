//! Server (component C7): the four-RPC state machine bridging the wire
//! transport to `ObservationInbox` and `InferenceEngine`.
//!
//! State machine: *Unconfigured* -> *Ready* ->
//! *Unconfigured*/*Terminated*. `SendObservations` and `GetActions` are
//! rejected outside *Ready*; `Ready` resets all transient state and returns
//! the server to *Unconfigured*, awaiting fresh `SendPolicyInstructions`.

use crate::engine::InferenceEngine;
use crate::errors::PolicyServerError;
use crate::fps::FpsTracker;
use crate::inbox::ObservationInbox;
use crate::model::PolicyLoader;
use crate::observation::{wall_clock_now, TimedObservation};
use crate::policy_config::RemotePolicyConfig;
use crate::processors::{IdentityPipeline, Preprocessor, RenamingPreprocessor};
use crate::telemetry::sanitize_for_log;
use crate::transport::{codec, read_chunked_payload, write_frame, MethodTag};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    Unconfigured,
    Ready,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub fps: f64,
    pub inference_latency_s: f64,
    pub obs_queue_timeout: Duration,
    pub actions_per_chunk_cap: usize,
}

impl ServerConfig {
    pub fn environment_dt(&self) -> f64 {
        1.0 / self.fps
    }
}

struct Configured {
    engine: InferenceEngine,
    inbox: ObservationInbox,
    fps_tracker: Mutex<FpsTracker>,
    actions_per_chunk: usize,
}

pub struct Server {
    config: ServerConfig,
    policy_loader: Arc<dyn PolicyLoader>,
    phase: Mutex<ServerPhase>,
    configured: Mutex<Option<Arc<Configured>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    pub fn new(config: ServerConfig, policy_loader: Arc<dyn PolicyLoader>) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            config,
            policy_loader,
            phase: Mutex::new(ServerPhase::Unconfigured),
            configured: Mutex::new(None),
            shutdown_tx,
        })
    }

    pub fn phase(&self) -> ServerPhase {
        *self.phase.lock()
    }

    pub fn shutdown(&self) {
        *self.phase.lock() = ServerPhase::Terminated;
        let _ = self.shutdown_tx.send(true);
    }

    /// `Ready` RPC: reset all transient state and return to *Unconfigured*.
    pub fn handle_ready(&self) {
        if let Some(configured) = self.configured.lock().as_ref() {
            configured.inbox.reset();
            configured.engine.reset();
        }
        *self.phase.lock() = ServerPhase::Unconfigured;
        info!("server reset to unconfigured");
    }

    /// `SendPolicyInstructions` RPC: load the policy, build the engine and
    /// inbox, and transition to *Ready*.
    pub fn handle_send_policy_instructions(
        &self,
        config: RemotePolicyConfig,
    ) -> Result<(), PolicyServerError> {
        config
            .validate()
            .map_err(PolicyServerError::Config)?;

        info!(
            policy_type = %sanitize_for_log(&config.policy_type),
            "loading policy"
        );
        let policy = self.policy_loader.load(&config)?;

        let preprocessor: Arc<dyn Preprocessor> = if config.rename_map.is_empty() {
            Arc::new(IdentityPipeline)
        } else {
            Arc::new(RenamingPreprocessor {
                rename_map: config.rename_map.clone(),
            })
        };

        let engine = InferenceEngine::new(
            policy,
            preprocessor,
            Arc::new(IdentityPipeline),
            config.rtc_config.clone(),
            self.config.environment_dt(),
            self.config.inference_latency_s,
        );
        let inbox = ObservationInbox::new(config.similarity_config);

        *self.configured.lock() = Some(Arc::new(Configured {
            engine,
            inbox,
            fps_tracker: Mutex::new(FpsTracker::new(self.config.fps)),
            actions_per_chunk: config.actions_per_chunk.min(self.config.actions_per_chunk_cap),
        }));
        *self.phase.lock() = ServerPhase::Ready;
        Ok(())
    }

    /// `SendObservations` RPC: admit the observation into the inbox and
    /// record arrival telemetry against its client-assigned timestamp,
    /// regardless of whether the inbox ultimately keeps it.
    pub fn handle_send_observations(
        &self,
        observation: TimedObservation,
    ) -> Result<(), PolicyServerError> {
        self.require_ready()?;
        let configured = self.configured();

        let metrics = configured
            .fps_tracker
            .lock()
            .calculate_fps_metrics(observation.timestamp, wall_clock_now());
        debug!(
            avg_fps = metrics.avg_fps,
            one_way_latency_s = metrics.one_way_latency_s,
            "observation telemetry"
        );

        let accepted = configured.inbox.offer(observation);
        if !accepted {
            info!("observation dropped (stale/duplicate/redundant)");
        }
        Ok(())
    }

    /// `GetActions` RPC: block on the inbox, run inference, enforce the
    /// configured tail-latency floor, and return the leading
    /// `actions_per_chunk` actions.
    pub async fn handle_get_actions(
        &self,
    ) -> Result<Vec<crate::observation::TimedAction>, PolicyServerError> {
        self.require_ready()?;
        let configured = self.configured();

        let observation = configured
            .inbox
            .get(self.config.obs_queue_timeout)
            .await
            .map_err(|_| PolicyServerError::Config("no observation available".into()))?;

        let t0 = observation.timestamp;
        let k0 = observation.timestep;
        let started = Instant::now();
        configured.engine.predict_action_chunk(observation).await?;

        let target = Duration::from_secs_f64(self.config.inference_latency_s.max(0.0));
        let elapsed = started.elapsed();
        if elapsed < target {
            tokio::time::sleep(target - elapsed).await;
        }

        Ok(configured
            .engine
            .pop_actions(configured.actions_per_chunk, t0, k0))
    }

    fn require_ready(&self) -> Result<(), PolicyServerError> {
        if *self.phase.lock() != ServerPhase::Ready {
            return Err(PolicyServerError::Config(
                "server is not in the Ready state".into(),
            ));
        }
        Ok(())
    }

    fn configured(&self) -> Arc<Configured> {
        self.configured
            .lock()
            .as_ref()
            .expect("require_ready guarantees configured state is present")
            .clone()
    }

    /// Bind and serve until `ctrl_c`/`SIGTERM` or an explicit `shutdown()`.
    pub async fn serve(self: Arc<Self>) -> Result<(), PolicyServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| PolicyServerError::Transport(crate::errors::TransportError::Io(e)))?;
        info!(%addr, "listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let termination = wait_for_termination_signal();
        tokio::pin!(termination);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream).await {
                            warn!(%peer, error = %e, "connection ended with error");
                        }
                    });
                }
                _ = shutdown_rx.changed() => {
                    info!("shutdown signal received, no longer accepting connections");
                    break;
                }
                _ = &mut termination => {
                    info!("termination signal received");
                    self.shutdown();
                    break;
                }
            }
        }
        Ok(())
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<(), PolicyServerError> {
        loop {
            let (method, payload) = match read_chunked_payload(&mut stream).await {
                Ok(pair) => pair,
                Err(_) => return Ok(()),
            };
            let started = Instant::now();
            let response = self.dispatch(method, payload).await;
            match response {
                Ok(bytes) => {
                    write_frame(&mut stream, method, false, &bytes).await?;
                }
                Err(e) => {
                    error!(error = %e, elapsed_s = started.elapsed().as_secs_f64(), "rpc failed");
                    write_frame(&mut stream, method, false, e.to_string().as_bytes()).await?;
                }
            }
        }
    }

    async fn dispatch(
        &self,
        method: MethodTag,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, PolicyServerError> {
        match method {
            MethodTag::Ready => {
                self.handle_ready();
                Ok(Vec::new())
            }
            MethodTag::SendPolicyInstructions => {
                let config = codec::decode_policy_config(&payload)?;
                self.handle_send_policy_instructions(config)?;
                Ok(Vec::new())
            }
            MethodTag::SendObservations => {
                let observation: TimedObservation = codec::decode(&payload)?;
                self.handle_send_observations(observation)?;
                Ok(Vec::new())
            }
            MethodTag::GetActions => {
                let actions = self
                    .handle_get_actions()
                    .instrument(info_span!("get_actions"))
                    .await?;
                Ok(codec::encode_actions(&actions))
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
