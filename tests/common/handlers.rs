//! Scripted task handlers for worker pool tests

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use orderflow_core::errors::HandlerError;
use orderflow_core::worker::{HandlerOutcome, HandlerResult, TaskHandler};

/// What one handler invocation does
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(HandlerError),
    Sleep(Duration),
    Panic,
}

/// Order of handler invocations across several handlers
pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

/// Handler that follows a script, then falls back to a default behavior
pub struct ScriptedHandler<P> {
    label: &'static str,
    script: Mutex<VecDeque<Behavior>>,
    fallback: Behavior,
    calls: Mutex<Vec<Instant>>,
    log: CallLog,
    _payload: PhantomData<fn(P)>,
}

impl<P> ScriptedHandler<P> {
    pub fn new(label: &'static str, log: CallLog) -> Self {
        Self {
            label,
            script: Mutex::new(VecDeque::new()),
            fallback: Behavior::Succeed,
            calls: Mutex::new(Vec::new()),
            log,
            _payload: PhantomData,
        }
    }

    pub fn then(self, behavior: Behavior) -> Self {
        self.script.lock().push_back(behavior);
        self
    }

    pub fn always(mut self, behavior: Behavior) -> Self {
        self.fallback = behavior;
        self
    }

    /// Clock readings at the start of each invocation
    pub fn calls(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl<P: Send + 'static> TaskHandler for ScriptedHandler<P> {
    type Payload = P;

    fn name(&self) -> &'static str {
        self.label
    }

    async fn handle(&self, _payload: P) -> HandlerResult {
        self.calls.lock().push(Instant::now());
        self.log.lock().push(self.label);

        let behavior = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match behavior {
            Behavior::Succeed => Ok(HandlerOutcome::Completed),
            Behavior::Fail(error) => Err(error),
            Behavior::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Ok(HandlerOutcome::Completed)
            }
            Behavior::Panic => panic!("scripted handler panic"),
        }
    }
}
