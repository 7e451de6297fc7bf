use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use infraflow::exec::{ApplyBackend, ApplyFailure, ApplyResult, ApplyTask, Heartbeat};
use infraflow::types::{ErrorClass, ModuleId};

/// What one dispatch of a module should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Succeed,
    Fail(ErrorClass),
    /// Keep heartbeating for this long, then succeed.
    Slow(Duration),
    /// Never heartbeat and never return: the worker died.
    Vanish,
}

/// Something the backend observed, in order across all modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Started {
        module: ModuleId,
        attempt: u32,
        dispatch: u32,
        at: Duration,
    },
    Finished {
        module: ModuleId,
        dispatch: u32,
        at: Duration,
    },
}

/// A fake apply backend that:
/// - records every dispatch start and finish
/// - plays back a per-module script of [`Step`]s (default: succeed)
/// - takes `work` time per attempt, heartbeating meanwhile.
pub struct FakeBackend {
    scripts: Mutex<HashMap<ModuleId, VecDeque<Step>>>,
    events: Arc<Mutex<Vec<BackendEvent>>>,
    work: Duration,
    epoch: Instant,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            events: Arc::new(Mutex::new(Vec::new())),
            work: Duration::from_millis(100),
            epoch: Instant::now(),
        }
    }

    /// Steps for successive dispatches of `module`; once exhausted, it
    /// succeeds.
    pub fn script(self, module: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(module.to_string(), steps.into_iter().collect());
        self
    }

    pub fn with_work(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    pub fn events(&self) -> Vec<BackendEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Modules in the order their dispatches started.
    pub fn started(&self) -> Vec<ModuleId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BackendEvent::Started { module, .. } => Some(module),
                _ => None,
            })
            .collect()
    }

    pub fn dispatches_of(&self, module: &str) -> usize {
        self.started().iter().filter(|m| *m == module).count()
    }

    /// `(attempt, dispatch)` for every start of `module`.
    pub fn attempts_of(&self, module: &str) -> Vec<(u32, u32)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BackendEvent::Started {
                    module: m,
                    attempt,
                    dispatch,
                    ..
                } if m == module => Some((attempt, dispatch)),
                _ => None,
            })
            .collect()
    }

    fn next_step(&self, module: &str) -> Step {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(module)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Succeed)
    }

    fn record(&self, event: BackendEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplyBackend for FakeBackend {
    fn apply(
        &self,
        task: ApplyTask,
        heartbeat: Heartbeat,
    ) -> Pin<Box<dyn Future<Output = ApplyResult> + Send + '_>> {
        Box::pin(async move {
            let step = self.next_step(&task.module);
            self.record(BackendEvent::Started {
                module: task.module.clone(),
                attempt: task.attempt,
                dispatch: task.dispatch,
                at: self.now(),
            });

            let work = match &step {
                Step::Vanish => {
                    drop(heartbeat);
                    std::future::pending::<()>().await;
                    unreachable!("pending never resolves");
                }
                Step::Slow(d) => *d,
                _ => self.work,
            };

            let beat_every = task.policy.heartbeat_interval;
            let end = Instant::now() + work;
            while Instant::now() + beat_every < end {
                tokio::time::sleep(beat_every).await;
                heartbeat.record(format!("{} still applying", task.module));
            }
            tokio::time::sleep_until(end).await;

            self.record(BackendEvent::Finished {
                module: task.module.clone(),
                dispatch: task.dispatch,
                at: self.now(),
            });

            match step {
                Step::Fail(class) => Err(ApplyFailure::new(
                    class,
                    format!("scripted {class} failure for {}", task.module),
                )),
                _ => Ok(()),
            }
        })
    }
}
