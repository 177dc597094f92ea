#![allow(clippy::unwrap_used, dead_code)]
// Scripted in-memory transport shared by the core integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use hostwatch_api::{CommandOutput, Error, Probe, Transport};
use hostwatch_core::{Hub, MemoryRegistry};

/// What the fake host does on the next probe or command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Online,
    Offline,
    AuthRejected,
}

struct Reply {
    pattern: String,
    stdout: String,
    exit_status: u32,
}

pub struct ScriptedTransport {
    name: String,
    health: Mutex<Health>,
    /// Consumed one per probe before falling back to `health`.
    probe_script: Mutex<VecDeque<Health>>,
    replies: Mutex<Vec<Reply>>,
    /// Commands containing one of these outrun their deadline.
    stalls: Mutex<Vec<String>>,
    latency: Mutex<Duration>,
    executed: Mutex<Vec<String>>,
    probes: AtomicUsize,
    wakes: AtomicUsize,
    can_wake: AtomicBool,
}

impl ScriptedTransport {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            health: Mutex::new(Health::Online),
            probe_script: Mutex::new(VecDeque::new()),
            replies: Mutex::new(Vec::new()),
            stalls: Mutex::new(Vec::new()),
            latency: Mutex::new(Duration::ZERO),
            executed: Mutex::new(Vec::new()),
            probes: AtomicUsize::new(0),
            wakes: AtomicUsize::new(0),
            can_wake: AtomicBool::new(true),
        })
    }

    pub fn set_health(&self, health: Health) {
        *self.health.lock().unwrap() = health;
    }

    pub fn script_probes(&self, outcomes: &[Health]) {
        self.probe_script.lock().unwrap().extend(outcomes);
    }

    pub fn disable_wake(&self) {
        self.can_wake.store(false, Ordering::SeqCst);
    }

    /// Reply to any command containing `pattern`. Later replies win.
    pub fn reply(&self, pattern: &str, stdout: &str, exit_status: u32) {
        self.replies.lock().unwrap().push(Reply {
            pattern: pattern.to_owned(),
            stdout: stdout.to_owned(),
            exit_status,
        });
    }

    /// Any command containing `pattern` times out on a live session.
    pub fn stall(&self, pattern: &str) {
        self.stalls.lock().unwrap().push(pattern.to_owned());
    }

    /// Every later command takes this long before replying.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn wakes(&self) -> usize {
        self.wakes.load(Ordering::SeqCst)
    }

    fn current(&self) -> Health {
        *self.health.lock().unwrap()
    }

    fn failure(&self, health: Health) -> Error {
        match health {
            Health::Offline => Error::Offline {
                host: self.name.clone(),
            },
            _ => Error::Authentication {
                host: self.name.clone(),
                user: "root".into(),
            },
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn target(&self) -> String {
        format!("root@{}:22", self.name)
    }

    async fn probe(&self) -> Result<Probe, Error> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let scripted = self.probe_script.lock().unwrap().pop_front();
        match scripted.unwrap_or_else(|| self.current()) {
            Health::Online => Ok(Probe::connected()),
            other => Err(self.failure(other)),
        }
    }

    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput, Error> {
        match self.current() {
            Health::Online => {}
            other => return Err(self.failure(other)),
        }
        self.executed.lock().unwrap().push(command.to_owned());
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.stalls.lock().unwrap().iter().any(|p| command.contains(p)) {
            return Err(Error::Timeout { timeout });
        }

        let replies = self.replies.lock().unwrap();
        let reply = replies
            .iter()
            .rev()
            .find(|r| command.contains(&r.pattern));
        Ok(CommandOutput {
            command: command.to_owned(),
            stdout: reply.map(|r| r.stdout.clone()).unwrap_or_default(),
            stderr: if reply.is_some_and(|r| r.exit_status != 0) {
                "boom".into()
            } else {
                String::new()
            },
            exit_status: reply.map_or(0, |r| r.exit_status),
        })
    }

    fn can_wake(&self) -> bool {
        self.can_wake.load(Ordering::SeqCst)
    }

    async fn wake(&self) -> Result<(), Error> {
        self.wakes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn hub() -> (Arc<Hub>, Arc<MemoryRegistry>) {
    let registry = Arc::new(MemoryRegistry::new());
    let hub = Hub::new(registry.clone());
    (hub, registry)
}

/// Let spawned loops observe the current instant without moving time.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
