use std::sync::Arc;

use parking_lot::Mutex;

use super::consumer::ConsumerThread;
use super::recycle::RecycleBin;
use crate::error::{RenderError, Result};

/// The one recording context of a frame, owned by the render thread.
pub trait CommandRecorder: Send + 'static {
    /// Resets recording state for a new frame.
    fn begin(&mut self) -> Result<()>;

    /// Closes the frame's recording and hands it to the GPU.
    fn submit(&mut self) -> Result<()>;

    /// Blocks until the last submission has completed on the GPU.
    fn wait_for_fence(&mut self) -> Result<()>;

    fn present(&mut self) {}
}

pub type RenderCmd<R> = Box<dyn FnOnce(&mut R) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderThreadState {
    Idle,
    Recording,
    Draining,
}

/// Main-thread side of the render thread.
///
/// Commands run on the worker strictly in the order they were added. While
/// the previous frame drains, new commands are parked and replayed after the
/// next frame's `begin`.
pub struct RenderThread<R: CommandRecorder> {
    consumer: ConsumerThread<RenderCmd<R>>,
    state: RenderThreadState,
    pending: Vec<RenderCmd<R>>,
    failure: Arc<Mutex<Option<RenderError>>>,
    recycle: Arc<RecycleBin>,
    frame: u64,
}

impl<R: CommandRecorder> RenderThread<R> {
    pub fn spawn(mut recorder: R, recycle: Arc<RecycleBin>) -> Result<Self> {
        let consumer = ConsumerThread::spawn("render-thread", move |cmd: RenderCmd<R>| {
            cmd(&mut recorder)
        })
        .map_err(|err| RenderError::RenderThread(err.to_string()))?;

        let mut thread = Self {
            consumer,
            state: RenderThreadState::Idle,
            pending: Vec::new(),
            failure: Arc::new(Mutex::new(None)),
            recycle,
            frame: 0,
        };
        thread.start_recording();
        Ok(thread)
    }

    pub fn state(&self) -> RenderThreadState {
        self.state
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn recycle_bin(&self) -> &Arc<RecycleBin> {
        &self.recycle
    }

    pub fn add_cmd(&mut self, cmd: impl FnOnce(&mut R) + Send + 'static) {
        match self.state {
            RenderThreadState::Recording => self.consumer.enqueue(Box::new(cmd)),
            RenderThreadState::Draining => self.pending.push(Box::new(cmd)),
            RenderThreadState::Idle => {
                log::warn!("Render command dropped: render thread is idle");
            }
        }
    }

    /// Ends the frame's recording: submit, fence wait, present.
    pub fn execute(&mut self) {
        if self.state != RenderThreadState::Recording {
            log::warn!("execute() called while {:?}", self.state);
            return;
        }

        let failure = Arc::clone(&self.failure);
        let frame = self.frame;
        self.consumer.enqueue(Box::new(move |recorder: &mut R| {
            let result = recorder
                .submit()
                .and_then(|_| recorder.wait_for_fence());
            match result {
                Ok(()) => recorder.present(),
                Err(err) => {
                    log::error!("Frame {} submission failed: {}", frame, err);
                    failure.lock().get_or_insert(err);
                }
            }
        }));
        self.state = RenderThreadState::Draining;
    }

    /// Frame boundary: waits for the worker, reclaims old resources and
    /// starts recording the next frame.
    pub fn wait_for_done(&mut self) -> Result<()> {
        self.consumer.wait();

        if let Some(message) = self.consumer.failure() {
            self.state = RenderThreadState::Idle;
            return Err(RenderError::RenderThread(message));
        }
        if let Some(err) = self.failure.lock().take() {
            self.state = RenderThreadState::Idle;
            return Err(err);
        }

        self.recycle.flush();
        self.start_recording();
        Ok(())
    }

    fn start_recording(&mut self) {
        self.frame += 1;
        self.recycle.set_frame(self.frame);

        let failure = Arc::clone(&self.failure);
        self.consumer.enqueue(Box::new(move |recorder: &mut R| {
            if let Err(err) = recorder.begin() {
                log::error!("Failed to begin recording: {}", err);
                failure.lock().get_or_insert(err);
            }
        }));
        self.state = RenderThreadState::Recording;

        for cmd in self.pending.drain(..) {
            self.consumer.enqueue(cmd);
        }
    }

    /// Stops the worker. A graceful shutdown lets queued commands finish.
    pub fn shutdown(mut self, immediate: bool) {
        self.consumer.stop(immediate);
        self.consumer.join();
        self.state = RenderThreadState::Idle;
        log::info!("Render thread shut down after {} frames", self.frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log {
        events: Vec<String>,
    }

    struct MockRecorder {
        log: Arc<Mutex<Log>>,
        fail_fence: bool,
    }

    impl CommandRecorder for MockRecorder {
        fn begin(&mut self) -> Result<()> {
            self.log.lock().events.push("begin".into());
            Ok(())
        }

        fn submit(&mut self) -> Result<()> {
            self.log.lock().events.push("submit".into());
            Ok(())
        }

        fn wait_for_fence(&mut self) -> Result<()> {
            if self.fail_fence {
                return Err(RenderError::Fence("device lost".into()));
            }
            self.log.lock().events.push("fence".into());
            Ok(())
        }

        fn present(&mut self) {
            self.log.lock().events.push("present".into());
        }
    }

    fn thread(fail_fence: bool) -> (RenderThread<MockRecorder>, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let recorder = MockRecorder {
            log: Arc::clone(&log),
            fail_fence,
        };
        let thread = RenderThread::spawn(recorder, Arc::new(RecycleBin::new())).unwrap();
        (thread, log)
    }

    fn push(name: &'static str) -> impl FnOnce(&mut MockRecorder) + Send + 'static {
        move |rec: &mut MockRecorder| rec.log.lock().events.push(name.into())
    }

    #[test]
    fn frame_runs_passes_in_order_between_begin_and_present() {
        let (mut thread, log) = thread(false);

        thread.add_cmd(push("shadow"));
        thread.add_cmd(push("scene"));
        thread.execute();
        thread.wait_for_done().unwrap();

        // the next frame's begin may or may not have run yet
        assert_eq!(
            log.lock().events[..6],
            ["begin", "shadow", "scene", "submit", "fence", "present"]
        );
        assert_eq!(thread.state(), RenderThreadState::Recording);
        assert_eq!(thread.frame(), 2);
    }

    #[test]
    fn commands_added_while_draining_run_in_the_next_frame() {
        let (mut thread, log) = thread(false);

        thread.execute();
        assert_eq!(thread.state(), RenderThreadState::Draining);
        thread.add_cmd(push("late"));
        thread.wait_for_done().unwrap();
        thread.execute();
        thread.wait_for_done().unwrap();

        let events = log.lock().events.clone();
        let begin_two = events.iter().enumerate().filter(|(_, e)| *e == "begin").nth(1).unwrap().0;
        let late = events.iter().position(|e| e == "late").unwrap();
        assert!(late > begin_two);
    }

    #[test]
    fn fence_failure_surfaces_at_the_frame_boundary() {
        let (mut thread, log) = thread(true);

        thread.execute();
        let err = thread.wait_for_done().unwrap_err();

        assert!(matches!(err, RenderError::Fence(_)));
        assert!(!log.lock().events.contains(&"present".to_string()));
        assert_eq!(thread.state(), RenderThreadState::Idle);
    }

    #[test]
    fn panicking_command_is_reported() {
        let (mut thread, _log) = thread(false);

        thread.add_cmd(|_: &mut MockRecorder| panic!("pass exploded"));
        thread.execute();

        match thread.wait_for_done() {
            Err(RenderError::RenderThread(message)) => assert_eq!(message, "pass exploded"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
