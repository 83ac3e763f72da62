use crate::callup::CallupSink;
use crate::camera::{CameraRecord, DeviceSession};
use crate::camera_registry::{RegistryDefaults, SharedRegistry};
use crate::error::{CallupError, ConfigurationError, ProtocolError, PtzError};
use crate::onvif_client::OnvifClient;
use crate::onvif_stream_uri::{StreamType, TransportProtocol};
use crate::ptz_session::PtzSession;
use crate::ptz_worker::PtzController;
use crate::soap::SoapTransport;
use async_trait::async_trait;
use mockall::automock;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use strum::EnumString;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// The shell side of the wall. Slots are 0-based.
#[automock]
#[async_trait]
pub trait WallDisplay: Send + Sync + 'static {
    async fn play(&self, slot: usize, uri: &str);
    async fn show_unavailable(&self, slot: usize, reason: &str);
    async fn set_sequencing(&self, slot: usize, enabled: bool);
    async fn report_status(&self, slot: usize, message: &str);
}

/// Where the played stream address comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum UriSource {
    /// Manufacturer URL template.
    #[default]
    Manufacturer,
    /// URI returned by the device's media service.
    Device,
}

#[derive(Debug, Clone)]
pub struct WallOptions {
    pub uri_source: UriSource,
    pub onvif_port: u16,
    pub protocol: TransportProtocol,
    pub stream_type: StreamType,
    /// How often PTZ failures are collected for the shell.
    pub status_interval: Duration,
    /// How long a camera that failed discovery is left alone.
    pub discovery_retry: Duration,
}

impl Default for WallOptions {
    fn default() -> Self {
        Self {
            uri_source: UriSource::Manufacturer,
            onvif_port: 80,
            protocol: TransportProtocol::Rtsp,
            stream_type: StreamType::RtpUnicast,
            status_interval: Duration::from_millis(250),
            discovery_retry: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
enum WallRequest {
    Callup {
        monitor: usize,
        camera: u32,
        preset: u32,
    },
    CallupUri {
        uri: String,
        slot: usize,
    },
    Sequencing {
        monitor: usize,
        enabled: bool,
    },
}

/// Result of a background resolution for one slot.
struct Resolved {
    slot: usize,
    generation: u64,
    camera: u32,
    preset: u32,
    outcome: Outcome,
}

enum Outcome {
    /// Device-resolved stream, not yet playing.
    Play(Result<Resolution, CallupError>),
    /// Template stream already playing; only PTZ remained.
    Ptz(Option<PtzSession>),
}

struct SlotBinding {
    camera: Option<u32>,
    uri: String,
    ptz: Option<PtzController>,
}

type Bindings = Arc<RwLock<HashMap<usize, SlotBinding>>>;

fn read(bindings: &Bindings) -> RwLockReadGuard<'_, HashMap<usize, SlotBinding>> {
    bindings.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(bindings: &Bindings) -> RwLockWriteGuard<'_, HashMap<usize, SlotBinding>> {
    bindings.write().unwrap_or_else(PoisonError::into_inner)
}

fn with_ptz<T>(
    bindings: &Bindings,
    slot: usize,
    action: impl FnOnce(&PtzController) -> Result<T, PtzError>,
) -> Result<T, PtzError> {
    let bindings = read(bindings);
    let controller = bindings
        .get(&slot)
        .and_then(|binding| binding.ptz.as_ref())
        .ok_or_else(|| PtzError::Unavailable(format!("monitor {} has no PTZ camera", slot + 1)))?;
    action(controller)
}

struct Resolution {
    uri: String,
    ptz: Option<PtzSession>,
}

#[derive(Clone)]
struct Resolver {
    registry: SharedRegistry,
    transport: Arc<dyn SoapTransport>,
    options: WallOptions,
}

impl Resolver {
    async fn record(&self, number: u32) -> Result<CameraRecord, CallupError> {
        Ok(self.registry.read().await.resolve(number)?.clone())
    }

    fn client(&self, record: &CameraRecord) -> OnvifClient {
        OnvifClient::new(
            self.transport.clone(),
            record.ip(),
            self.options.onvif_port,
            record.credentials().filter(|c| c.is_complete()).cloned(),
        )
    }

    /// Cached session, or a fresh discovery that is then cached on the record.
    /// A failed discovery is not repeated until `discovery_retry` has passed.
    async fn device_session(&self, number: u32) -> Result<DeviceSession, CallupError> {
        let record = self.record(number).await?;
        if let Some(session) = record.session() {
            return Ok(session.clone());
        }
        if record.discovery_backoff(self.options.discovery_retry) {
            return Err(CallupError::DiscoveryBackoff(number));
        }
        let session = match self.discover(&record).await {
            Ok(session) => session,
            Err(err) => {
                if let Ok(record) = self.registry.write().await.resolve_mut(number) {
                    record.note_discovery_failure();
                }
                return Err(err.into());
            }
        };
        self.registry
            .write()
            .await
            .resolve_mut(number)?
            .set_session(session.clone());
        log::info!(
            "camera {number}: profile {} resolved, PTZ {}",
            session.profile.token,
            if session.ptz_available { "available" } else { "unavailable" }
        );
        Ok(session)
    }

    async fn discover(&self, record: &CameraRecord) -> Result<DeviceSession, ProtocolError> {
        let mut client = self.client(record);
        client.connect().await?;
        let resolved = client
            .resolve_stream(record.stream(), self.options.protocol, self.options.stream_type)
            .await?;
        Ok(client.session(&resolved))
    }

    /// Manufacturer template; needs no network.
    async fn template_uri(&self, number: u32) -> Result<String, CallupError> {
        Ok(self.record(number).await?.stream_uri()?)
    }

    async fn stream_uri(&self, number: u32) -> Result<String, CallupError> {
        match self.options.uri_source {
            UriSource::Manufacturer => self.template_uri(number).await,
            UriSource::Device => {
                let session = self.device_session(number).await?;
                Ok(session.uri_for(self.options.stream_type).to_string())
            }
        }
    }

    async fn resolve_device(&self, number: u32) -> Result<Resolution, CallupError> {
        let session = self.device_session(number).await?;
        let uri = session.uri_for(self.options.stream_type).to_string();
        let ptz = self.ptz_session(number, &session).await;
        Ok(Resolution { uri, ptz })
    }

    async fn discover_ptz(&self, number: u32) -> Option<PtzSession> {
        match self.device_session(number).await {
            Ok(session) => self.ptz_session(number, &session).await,
            Err(err) => {
                log::warn!("camera {number}: PTZ not available: {err}");
                None
            }
        }
    }

    async fn ptz_session(&self, number: u32, session: &DeviceSession) -> Option<PtzSession> {
        if !session.ptz_available {
            return None;
        }
        let record = self.record(number).await.ok()?;
        let client = OnvifClient::from_session(
            self.transport.clone(),
            record.ip(),
            self.options.onvif_port,
            record.credentials().filter(|c| c.is_complete()).cloned(),
            session,
        );
        match PtzSession::new(client, session.profile.clone()) {
            Ok(ptz) => Some(ptz),
            Err(err) => {
                log::warn!("camera {number}: {err}");
                None
            }
        }
    }

    async fn mark_unavailable(&self, number: u32) {
        if let Ok(record) = self.registry.write().await.resolve_mut(number) {
            record.mark_unavailable();
        }
    }
}

pub struct VideoWall;

impl VideoWall {
    /// Starts the dispatcher task. It stops when every handle is dropped.
    pub fn spawn(
        registry: SharedRegistry,
        display: Arc<dyn WallDisplay>,
        transport: Arc<dyn SoapTransport>,
        options: WallOptions,
    ) -> WallHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (resolved_tx, resolved_rx) = mpsc::unbounded_channel();
        let bindings: Bindings = Arc::default();
        let resolver = Resolver {
            registry,
            transport,
            options,
        };
        let worker = WallWorker {
            resolver: resolver.clone(),
            display,
            bindings: bindings.clone(),
            generations: HashMap::new(),
            resolved_tx,
        };
        tokio::spawn(worker.run(rx, resolved_rx));
        WallHandle {
            tx,
            bindings,
            resolver,
        }
    }
}

/// Applies requests in arrival order. Device I/O runs in spawned tasks whose
/// results come back through `resolved_tx`; a result is applied only if no
/// newer request has targeted its slot since.
struct WallWorker {
    resolver: Resolver,
    display: Arc<dyn WallDisplay>,
    bindings: Bindings,
    generations: HashMap<usize, u64>,
    resolved_tx: mpsc::UnboundedSender<Resolved>,
}

impl WallWorker {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<WallRequest>,
        mut resolved_rx: mpsc::UnboundedReceiver<Resolved>,
    ) {
        let mut ticker = tokio::time::interval(self.resolver.options.status_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
                Some(resolved) = resolved_rx.recv() => self.apply(resolved).await,
                _ = ticker.tick() => self.forward_ptz_errors().await,
            }
        }
        log::debug!("video wall dispatcher finished");
    }

    async fn handle(&mut self, request: WallRequest) {
        log::debug!("wall request {request:?}");
        match request {
            WallRequest::Callup {
                monitor,
                camera,
                preset,
            } => self.callup(monitor, camera, preset).await,
            WallRequest::CallupUri { uri, slot } => {
                self.retarget(slot);
                self.display.play(slot, &uri).await;
                self.bind(
                    slot,
                    SlotBinding {
                        camera: None,
                        uri,
                        ptz: None,
                    },
                );
            }
            WallRequest::Sequencing { monitor, enabled } => {
                log::info!(
                    "sequencing {} on monitor {}",
                    if enabled { "on" } else { "off" },
                    monitor + 1
                );
                self.display.set_sequencing(monitor, enabled).await;
            }
        }
    }

    /// Invalidates any resolution still running for `slot`.
    fn retarget(&mut self, slot: usize) -> u64 {
        let generation = self.generations.entry(slot).or_default();
        *generation += 1;
        *generation
    }

    async fn callup(&mut self, monitor: usize, camera: u32, preset: u32) {
        let generation = self.retarget(monitor);
        let resolver = self.resolver.clone();
        let resolved_tx = self.resolved_tx.clone();
        match self.resolver.options.uri_source {
            UriSource::Manufacturer => {
                let uri = match self.resolver.template_uri(camera).await {
                    Ok(uri) => uri,
                    Err(err) => return self.fail(monitor, camera, err).await,
                };
                self.play(monitor, camera, uri).await;
                tokio::spawn(async move {
                    let ptz = resolver.discover_ptz(camera).await;
                    let _ = resolved_tx.send(Resolved {
                        slot: monitor,
                        generation,
                        camera,
                        preset,
                        outcome: Outcome::Ptz(ptz),
                    });
                });
            }
            UriSource::Device => {
                tokio::spawn(async move {
                    let result = resolver.resolve_device(camera).await;
                    let _ = resolved_tx.send(Resolved {
                        slot: monitor,
                        generation,
                        camera,
                        preset,
                        outcome: Outcome::Play(result),
                    });
                });
            }
        }
    }

    async fn apply(&mut self, resolved: Resolved) {
        let Resolved {
            slot,
            generation,
            camera,
            preset,
            outcome,
        } = resolved;
        if self.generations.get(&slot) != Some(&generation) {
            log::debug!("camera {camera}: monitor {} was re-targeted; result dropped", slot + 1);
            return;
        }
        match outcome {
            Outcome::Play(Ok(Resolution { uri, ptz })) => {
                self.play(slot, camera, uri).await;
                self.attach_ptz(slot, camera, ptz, preset).await;
            }
            Outcome::Play(Err(err)) => self.fail(slot, camera, err).await,
            Outcome::Ptz(ptz) => self.attach_ptz(slot, camera, ptz, preset).await,
        }
    }

    async fn play(&self, monitor: usize, camera: u32, uri: String) {
        log::info!("camera {camera} on monitor {}: {}", monitor + 1, redact(&uri));
        self.display.play(monitor, &uri).await;
        self.bind(
            monitor,
            SlotBinding {
                camera: Some(camera),
                uri,
                ptz: None,
            },
        );
    }

    async fn attach_ptz(&self, slot: usize, camera: u32, ptz: Option<PtzSession>, preset: u32) {
        if let Some(session) = ptz {
            let controller = PtzController::spawn(session, format!("camera {camera}"));
            if let Some(binding) = write(&self.bindings).get_mut(&slot) {
                binding.ptz = Some(controller);
            }
        }
        if preset == 0 {
            return;
        }
        let result = with_ptz(&self.bindings, slot, |ptz| ptz.show_preset(preset));
        if let Err(err) = result {
            log::warn!("camera {camera} preset {preset}: {err}");
            self.display.report_status(slot, &err.to_string()).await;
        }
    }

    async fn fail(&self, monitor: usize, camera: u32, err: CallupError) {
        log::error!("camera {camera} to monitor {} failed: {err}", monitor + 1);
        self.resolver.mark_unavailable(camera).await;
        self.unbind(monitor);
        self.display.show_unavailable(monitor, &err.to_string()).await;
    }

    fn bind(&self, slot: usize, binding: SlotBinding) {
        // The replaced controller is dropped here, which aborts its worker.
        write(&self.bindings).insert(slot, binding);
    }

    fn unbind(&self, slot: usize) {
        write(&self.bindings).remove(&slot);
    }

    async fn forward_ptz_errors(&self) {
        let mut messages = Vec::new();
        for (slot, binding) in read(&self.bindings).iter() {
            if let Some(ptz) = &binding.ptz {
                while let Some(message) = ptz.try_recv_error() {
                    messages.push((*slot, message));
                }
            }
        }
        for (slot, message) in messages {
            self.display.report_status(slot, &message).await;
        }
    }
}

fn redact(uri: &str) -> String {
    match url::Url::parse(uri) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => uri.to_string(),
    }
}

/// Cloneable front of the wall: the callup sink plus the shell accessors.
#[derive(Clone)]
pub struct WallHandle {
    tx: mpsc::UnboundedSender<WallRequest>,
    bindings: Bindings,
    resolver: Resolver,
}

impl WallHandle {
    fn enqueue(&self, request: WallRequest) {
        if let Err(err) = self.tx.send(request) {
            log::error!("video wall dispatcher has stopped; dropped {:?}", err.0);
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.resolver.registry
    }

    pub async fn build_stream_uri(&self, camera: u32) -> Result<String, CallupError> {
        self.resolver.stream_uri(camera).await
    }

    /// Camera bound to a slot by number, if any.
    pub fn bound_camera(&self, slot: usize) -> Option<u32> {
        read(&self.bindings).get(&slot).and_then(|binding| binding.camera)
    }

    pub fn bound_uri(&self, slot: usize) -> Option<String> {
        read(&self.bindings).get(&slot).map(|binding| binding.uri.clone())
    }

    pub fn has_ptz(&self, slot: usize) -> bool {
        read(&self.bindings)
            .get(&slot)
            .is_some_and(|binding| binding.ptz.is_some())
    }

    /// Returns false when the gesture was dropped because the camera is busy.
    pub fn pan(&self, slot: usize, velocity: f32) -> Result<bool, PtzError> {
        with_ptz(&self.bindings, slot, |ptz| Ok(ptz.pan(velocity)))
    }

    pub fn tilt(&self, slot: usize, velocity: f32) -> Result<bool, PtzError> {
        with_ptz(&self.bindings, slot, |ptz| Ok(ptz.tilt(velocity)))
    }

    pub fn pan_tilt(&self, slot: usize, pan: f32, tilt: f32) -> Result<bool, PtzError> {
        with_ptz(&self.bindings, slot, |ptz| Ok(ptz.pan_tilt(pan, tilt)))
    }

    pub fn zoom(&self, slot: usize, velocity: f32) -> Result<bool, PtzError> {
        with_ptz(&self.bindings, slot, |ptz| Ok(ptz.zoom(velocity)))
    }

    pub fn stop(&self, slot: usize) -> Result<(), PtzError> {
        with_ptz(&self.bindings, slot, PtzController::stop)
    }

    pub fn show_preset(&self, slot: usize, number: u32) -> Result<(), PtzError> {
        with_ptz(&self.bindings, slot, |ptz| ptz.show_preset(number))
    }

    /// Reloads the camera table. Returns the number of cameras now registered.
    pub async fn reload(
        &self,
        source: &Path,
        schema: &Path,
        defaults: &RegistryDefaults,
    ) -> Result<usize, ConfigurationError> {
        let mut registry = self.resolver.registry.write().await;
        registry.reload(source, schema, defaults)?;
        Ok(registry.len())
    }
}

#[async_trait]
impl CallupSink for WallHandle {
    async fn callup(&self, monitor: usize, camera: u32, preset: u32) {
        self.enqueue(WallRequest::Callup {
            monitor,
            camera,
            preset,
        });
    }

    async fn callup_uri(&self, uri: &str, slot: usize) {
        self.enqueue(WallRequest::CallupUri {
            uri: uri.to_string(),
            slot,
        });
    }

    async fn set_sequencing(&self, monitor: usize, enabled: bool) {
        self.enqueue(WallRequest::Sequencing { monitor, enabled });
    }
}
