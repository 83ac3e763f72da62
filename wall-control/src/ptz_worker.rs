use crate::error::PtzError;
use crate::ptz_session::{Motion, PtzCommand, PtzSession};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const QUEUE_DEPTH: usize = 8;

struct Job {
    command: PtzCommand,
    generation: u64,
}

struct Shared {
    /// Jobs and stops accepted but not yet finished by the worker.
    pending: AtomicUsize,
    stop_generation: AtomicU64,
}

impl Shared {
    fn release(&self, count: usize) {
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                Some(pending.saturating_sub(count))
            });
    }
}

/// Serializes every PTZ request for one camera on its own task.
pub struct PtzController {
    label: String,
    tx: mpsc::Sender<Job>,
    stop_tx: mpsc::UnboundedSender<()>,
    err_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    motion_rx: watch::Receiver<Motion>,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl PtzController {
    /// Must be called inside a tokio runtime.
    pub fn spawn(session: PtzSession, label: impl Into<String>) -> Self {
        let label = label.into();
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        let (motion_tx, motion_rx) = watch::channel(session.motion());
        let shared = Arc::new(Shared {
            pending: AtomicUsize::new(0),
            stop_generation: AtomicU64::new(0),
        });
        let worker = Worker {
            label: label.clone(),
            session,
            shared: shared.clone(),
            err_tx,
            motion_tx,
        };
        let task = tokio::spawn(worker.run(rx, stop_rx));
        Self {
            label,
            tx,
            stop_tx,
            err_rx: Mutex::new(err_rx),
            motion_rx,
            shared,
            task,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Queues a continuous gesture. Returns false when it was dropped
    /// because a request for this camera (move, preset or stop) is still in flight.
    pub fn gesture(&self, command: PtzCommand) -> bool {
        if !command.is_gesture() {
            log::warn!("{}: {:?} is not a continuous gesture", self.label, command);
            return false;
        }
        if self
            .shared
            .pending
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::trace!("{}: gesture {:?} dropped, request in flight", self.label, command);
            return false;
        }
        let job = Job {
            command,
            generation: self.shared.stop_generation.load(Ordering::Acquire),
        };
        if self.tx.try_send(job).is_err() {
            self.shared.release(1);
            return false;
        }
        true
    }

    pub fn pan(&self, velocity: f32) -> bool {
        self.gesture(PtzCommand::Pan(velocity))
    }

    pub fn tilt(&self, velocity: f32) -> bool {
        self.gesture(PtzCommand::Tilt(velocity))
    }

    pub fn pan_tilt(&self, pan: f32, tilt: f32) -> bool {
        self.gesture(PtzCommand::PanTilt(pan, tilt))
    }

    pub fn zoom(&self, velocity: f32) -> bool {
        self.gesture(PtzCommand::Zoom(velocity))
    }

    /// Cancels any in-flight move and skips moves queued before this call.
    pub fn stop(&self) -> Result<(), PtzError> {
        self.shared.stop_generation.fetch_add(1, Ordering::AcqRel);
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.stop_tx.send(()).map_err(|_| {
            self.shared.release(1);
            PtzError::WorkerClosed(self.label.clone())
        })
    }

    pub fn show_preset(&self, number: u32) -> Result<(), PtzError> {
        let job = Job {
            command: PtzCommand::ShowPreset(number),
            generation: self.shared.stop_generation.load(Ordering::Acquire),
        };
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.try_send(job).map_err(|err| {
            self.shared.release(1);
            match err {
                mpsc::error::TrySendError::Full(_) => PtzError::Busy(self.label.clone()),
                mpsc::error::TrySendError::Closed(_) => PtzError::WorkerClosed(self.label.clone()),
            }
        })
    }

    pub fn motion(&self) -> Motion {
        *self.motion_rx.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.shared.pending.load(Ordering::Acquire) > 0
    }

    pub fn try_recv_error(&self) -> Option<String> {
        self.err_rx.lock().ok()?.try_recv().ok()
    }
}

impl Drop for PtzController {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum Outcome {
    Done(Result<(), PtzError>),
    Cancelled,
}

struct Worker {
    label: String,
    session: PtzSession,
    shared: Arc<Shared>,
    err_tx: mpsc::UnboundedSender<String>,
    motion_tx: watch::Sender<Motion>,
}

impl Worker {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<Job>,
        mut stop_rx: mpsc::UnboundedReceiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                signal = stop_rx.recv() => match signal {
                    Some(()) => self.stop(&mut stop_rx).await,
                    None => break,
                },
                job = rx.recv() => match job {
                    Some(job) => self.run_job(job, &mut stop_rx).await,
                    None => break,
                },
            }
        }
        log::debug!("{}: PTZ worker finished", self.label);
    }

    async fn run_job(&mut self, job: Job, stop_rx: &mut mpsc::UnboundedReceiver<()>) {
        if job.generation < self.shared.stop_generation.load(Ordering::Acquire) {
            log::debug!("{}: skipping {:?} queued before stop", self.label, job.command);
            self.shared.release(1);
            return;
        }
        let outcome = tokio::select! {
            biased;
            _ = stop_rx.recv() => Outcome::Cancelled,
            result = self.session.execute(job.command) => Outcome::Done(result),
        };
        self.shared.release(1);
        match outcome {
            Outcome::Done(Ok(())) => {}
            Outcome::Done(Err(err)) => self.report(format!("{:?} failed: {err}", job.command)),
            Outcome::Cancelled => {
                log::debug!("{}: {:?} cancelled by stop", self.label, job.command);
                self.stop(stop_rx).await;
            }
        }
        self.motion_tx.send_replace(self.session.motion());
    }

    /// Called after one stop signal was received; later signals fold into it.
    async fn stop(&mut self, stop_rx: &mut mpsc::UnboundedReceiver<()>) {
        let mut signals = 1;
        while stop_rx.try_recv().is_ok() {
            signals += 1;
        }
        if let Err(err) = self.session.stop().await {
            self.report(format!("Stop failed: {err}"));
        }
        self.shared.release(signals);
        self.motion_tx.send_replace(self.session.motion());
    }

    fn report(&self, message: String) {
        log::warn!("{}: {}", self.label, message);
        let _ = self.err_tx.send(format!("{}: {}", self.label, message));
    }
}

#[cfg(test)]
mod tests {
    mod success {
        use crate::onvif_client::OnvifClient;
        use crate::ptz_session::{Motion, PtzCommand, PtzSession};
        use crate::ptz_worker::PtzController;
        use crate::test_support::FakeCamera;
        use std::sync::Arc;
        use std::time::Duration;

        async fn controller(camera: &Arc<FakeCamera>, label: &str) -> PtzController {
            let mut client = OnvifClient::new(camera.clone(), "10.0.0.5", 80, None);
            client.connect().await.unwrap();
            let session = PtzSession::new(client, FakeCamera::main_profile()).unwrap();
            PtzController::spawn(session, label)
        }

        async fn settle(controller: &PtzController) {
            for _ in 0..200 {
                if !controller.is_busy() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        #[tokio::test]
        async fn gesture_moves_and_stop_idles() {
            let camera = Arc::new(FakeCamera::new());
            let controller = controller(&camera, "cam1").await;
            assert!(!controller.gesture(PtzCommand::Stop));
            assert!(controller.pan(0.5));
            settle(&controller).await;
            assert_eq!(controller.motion(), Motion::Moving);
            controller.stop().unwrap();
            settle(&controller).await;
            assert_eq!(controller.motion(), Motion::Idle);
            assert_eq!(camera.count("Stop"), 1);
        }

        #[tokio::test]
        async fn gestures_dropped_while_in_flight() {
            let camera = Arc::new(FakeCamera::new().with_move_delay(Duration::from_millis(200)));
            let controller = controller(&camera, "cam1").await;
            assert!(controller.pan(0.5));
            assert!(!controller.pan(0.6));
            assert!(!controller.zoom(0.2));
            tokio::time::sleep(Duration::from_millis(400)).await;
            assert_eq!(camera.count("ContinuousMove"), 1);
        }

        #[tokio::test]
        async fn stop_cancels_in_flight_move() {
            let camera = Arc::new(FakeCamera::new().with_move_delay(Duration::from_millis(300)));
            let controller = controller(&camera, "cam1").await;
            assert!(controller.pan(0.5));
            tokio::time::sleep(Duration::from_millis(50)).await;
            controller.stop().unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(camera.count("ContinuousMove"), 0);
            assert_eq!(camera.count("Stop"), 1);
            assert_eq!(controller.motion(), Motion::Idle);
            assert!(!controller.is_busy());
        }

        #[tokio::test]
        async fn gestures_dropped_while_preset_in_flight() {
            let camera = Arc::new(
                FakeCamera::new().with_delay("GotoPreset", Duration::from_millis(300)),
            );
            let controller = controller(&camera, "cam1").await;
            controller.show_preset(1).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(controller.is_busy());
            assert!(!controller.pan(0.5));
            tokio::time::sleep(Duration::from_millis(400)).await;
            assert_eq!(camera.count("GotoPreset"), 1);
            assert_eq!(camera.count("ContinuousMove"), 0);
            assert!(!controller.is_busy());
            assert!(controller.pan(0.5));
        }

        #[tokio::test]
        async fn gestures_dropped_while_stop_in_flight() {
            let camera = Arc::new(FakeCamera::new().with_delay("Stop", Duration::from_millis(200)));
            let controller = controller(&camera, "cam1").await;
            controller.stop().unwrap();
            assert!(!controller.tilt(0.4));
            tokio::time::sleep(Duration::from_millis(300)).await;
            assert_eq!(camera.count("Stop"), 1);
            assert_eq!(camera.count("ContinuousMove"), 0);
            assert!(!controller.is_busy());
        }

        #[tokio::test]
        async fn distinct_cameras_do_not_block_each_other() {
            let slow = Arc::new(FakeCamera::new().with_move_delay(Duration::from_millis(500)));
            let fast = Arc::new(FakeCamera::new());
            let slow_controller = controller(&slow, "slow").await;
            let fast_controller = controller(&fast, "fast").await;
            assert!(slow_controller.pan(0.5));
            assert!(fast_controller.pan(0.5));
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(fast.count("ContinuousMove"), 1);
            assert_eq!(fast_controller.motion(), Motion::Moving);
            assert!(slow_controller.is_busy());
        }

        #[tokio::test]
        async fn preset_is_queued_behind_gesture() {
            let camera = Arc::new(FakeCamera::new());
            let controller = controller(&camera, "cam1").await;
            assert!(controller.tilt(0.3));
            controller.show_preset(2).unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            let calls = camera.calls();
            let moved = calls.iter().position(|c| c == "ContinuousMove").unwrap();
            let preset = calls.iter().position(|c| c == "GotoPreset").unwrap();
            assert!(moved < preset);
        }
    }

    mod failure {
        use crate::onvif_client::OnvifClient;
        use crate::ptz_session::{Motion, PtzSession};
        use crate::ptz_worker::PtzController;
        use crate::test_support::FakeCamera;
        use std::sync::Arc;
        use std::time::Duration;

        #[tokio::test]
        async fn failures_are_forwarded_as_status() {
            let camera = Arc::new(FakeCamera::new());
            let mut client = OnvifClient::new(camera.clone(), "10.0.0.5", 80, None);
            client.connect().await.unwrap();
            let session = PtzSession::new(client, FakeCamera::main_profile()).unwrap();
            let controller = PtzController::spawn(session, "cam9");

            controller.show_preset(7).unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            let message = controller.try_recv_error().unwrap();
            assert!(message.starts_with("cam9:"), "{message}");
            assert!(message.contains("preset number 7"), "{message}");
            assert_eq!(controller.motion(), Motion::Idle);
            assert!(controller.try_recv_error().is_none());
        }
    }
}
