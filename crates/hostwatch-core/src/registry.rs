// ── Entity registry and registration boundary ──
//
// The registry is shared with the host. Every mutation goes through the
// `RegistryBoundary`: a single consumer task that applies queued
// register/remove requests strictly in submission order.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::EntityDescriptor;
use crate::store::collection::KeyedCollection;

/// Host-side store of addressable entities.
pub trait EntityRegistry: Send + Sync {
    fn register_entity(&self, descriptor: EntityDescriptor);

    /// Remove by entity id. Returns the removed descriptor.
    fn remove_entity(&self, id: &str) -> Option<EntityDescriptor>;

    fn find_entity(&self, predicate: &dyn Fn(&EntityDescriptor) -> bool)
    -> Option<EntityDescriptor>;
}

// ── In-memory registry ───────────────────────────────────────────────

/// Reactive in-process registry keyed by entity id.
pub struct MemoryRegistry {
    entities: KeyedCollection<EntityDescriptor>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            entities: KeyedCollection::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<EntityDescriptor> {
        self.entities.get(id).map(|e| EntityDescriptor::clone(&e))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entities sorted by id.
    pub fn snapshot(&self) -> Vec<EntityDescriptor> {
        self.entities
            .snapshot()
            .iter()
            .map(|e| EntityDescriptor::clone(e))
            .collect()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<EntityDescriptor>>>> {
        self.entities.subscribe()
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry for MemoryRegistry {
    fn register_entity(&self, descriptor: EntityDescriptor) {
        self.entities.upsert(descriptor.id.clone(), descriptor);
    }

    fn remove_entity(&self, id: &str) -> Option<EntityDescriptor> {
        self.entities
            .remove(id)
            .map(|e| EntityDescriptor::clone(&e))
    }

    fn find_entity(
        &self,
        predicate: &dyn Fn(&EntityDescriptor) -> bool,
    ) -> Option<EntityDescriptor> {
        self.entities
            .find(predicate)
            .map(|e| EntityDescriptor::clone(&e))
    }
}

// ── Registration boundary ────────────────────────────────────────────

enum RegistryOp {
    Register(EntityDescriptor),
    Remove(String),
    Flush(oneshot::Sender<()>),
}

/// Serialized gateway to an [`EntityRegistry`].
///
/// `schedule_*` never blocks and never touches the registry inline, so it
/// is safe to call while processing command output. Requests are applied
/// in FIFO order, so a removal queued after a registration for the same
/// id always observes that registration.
pub struct RegistryBoundary {
    tx: mpsc::UnboundedSender<RegistryOp>,
    registry: Arc<dyn EntityRegistry>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RegistryBoundary {
    /// Spawn the consumer task. Must be called inside a Tokio runtime.
    pub fn spawn(registry: Arc<dyn EntityRegistry>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(registration_task(Arc::clone(&registry), rx));
        Self {
            tx,
            registry,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Read access for lookups; mutations must use `schedule_*`.
    pub fn registry(&self) -> &Arc<dyn EntityRegistry> {
        &self.registry
    }

    /// Queue a registration. Ignored (with a warning) if the id exists
    /// when the request is applied.
    pub fn schedule_register(&self, descriptor: EntityDescriptor) {
        if self.tx.send(RegistryOp::Register(descriptor)).is_err() {
            warn!("registration boundary closed; dropping register request");
        }
    }

    /// Queue a removal. Ignored (with a warning) if the id is absent.
    pub fn schedule_remove(&self, id: impl Into<String>) {
        if self.tx.send(RegistryOp::Remove(id.into())).is_err() {
            warn!("registration boundary closed; dropping remove request");
        }
    }

    /// Wait until every request queued before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(RegistryOp::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Stop the consumer task. Requests queued afterwards are dropped.
    pub fn close(&self) {
        if let Ok(mut handle) = self.handle.lock() {
            if let Some(handle) = handle.take() {
                handle.abort();
            }
        }
    }
}

async fn registration_task(
    registry: Arc<dyn EntityRegistry>,
    mut rx: mpsc::UnboundedReceiver<RegistryOp>,
) {
    debug!("registration boundary started");
    while let Some(op) = rx.recv().await {
        match op {
            RegistryOp::Register(descriptor) => {
                let id = descriptor.id.clone();
                if registry.find_entity(&|e| e.id == id).is_some() {
                    warn!(entity = %id, "entity already registered; ignoring duplicate");
                } else {
                    debug!(entity = %id, "registering entity");
                    registry.register_entity(descriptor);
                }
            }
            RegistryOp::Remove(id) => {
                if registry.remove_entity(&id).is_some() {
                    debug!(entity = %id, "removed entity");
                } else {
                    warn!(entity = %id, "no entity to remove");
                }
            }
            RegistryOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
