//! Flow documents
//!
//! Arbitrary JSON objects keyed by a millisecond-timestamp id, held in a
//! [`TtlStore`] and mirrored to a JSON file after every change when a file is
//! configured.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{info, warn};

use testdeck_common::{StorePolicy, TtlStore};

pub struct FlowStore {
    store: TtlStore<Value>,
    file: Option<PathBuf>,
    last_id: AtomicI64,
    /// Held across snapshot, write and rename so writers never interleave
    persist_lock: Mutex<()>,
}

impl FlowStore {
    pub fn new(policy: StorePolicy, file: Option<PathBuf>) -> Self {
        Self {
            store: TtlStore::new("flows", policy),
            file,
            last_id: AtomicI64::new(0),
            persist_lock: Mutex::new(()),
        }
    }

    /// Load flows from the configured file, returning how many were read
    pub fn load(&self) -> usize {
        let Some(file) = &self.file else {
            return 0;
        };
        let content = match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!("Failed to read flows from {}: {}", file.display(), e);
                return 0;
            }
        };
        let flows: Map<String, Value> = match serde_json::from_str(&content) {
            Ok(flows) => flows,
            Err(e) => {
                warn!("Ignoring malformed flows file {}: {}", file.display(), e);
                return 0;
            }
        };

        let count = flows.len();
        for (id, flow) in flows {
            if let Ok(n) = id.parse::<i64>() {
                self.last_id.fetch_max(n, Ordering::SeqCst);
            }
            self.store.insert(id, flow);
        }
        info!("Loaded {} flow(s) from {}", count, file.display());
        count
    }

    /// All flows ordered by id
    pub fn list(&self) -> Vec<Value> {
        let mut entries = self.store.entries();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, v)| v).collect()
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        self.store.get(id)
    }

    /// Store a new flow. The body must be a JSON object; `id`, `createdAt`
    /// and `updatedAt` are assigned here.
    pub fn create(&self, body: Map<String, Value>) -> Value {
        let id = self.next_id();
        let now = Value::String(Utc::now().to_rfc3339());
        let mut flow = body;
        flow.insert("id".into(), Value::String(id.clone()));
        flow.insert("createdAt".into(), now.clone());
        flow.insert("updatedAt".into(), now);

        let flow = Value::Object(flow);
        self.store.insert(id, flow.clone());
        self.persist();
        flow
    }

    /// Replace a flow's body, keeping its id and creation time
    pub fn replace(&self, id: &str, body: Map<String, Value>) -> Option<Value> {
        let updated = self.store.update(id, |flow| {
            let created = flow.get("createdAt").cloned();
            let mut next = body;
            next.insert("id".into(), Value::String(id.to_string()));
            if let Some(created) = created {
                next.insert("createdAt".into(), created);
            }
            next.insert("updatedAt".into(), Value::String(Utc::now().to_rfc3339()));
            *flow = Value::Object(next);
        })?;
        self.persist();
        Some(updated)
    }

    pub fn delete(&self, id: &str) -> Option<Value> {
        let removed = self.store.remove(id)?;
        self.persist();
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn next_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut current = self.last_id.load(Ordering::SeqCst);
        loop {
            let next = now.max(current + 1);
            match self
                .last_id
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next.to_string(),
                Err(actual) => current = actual,
            }
        }
    }

    fn persist(&self) {
        let Some(file) = &self.file else {
            return;
        };
        let _guard = self.persist_lock.lock();
        let snapshot: Map<String, Value> = self.store.entries().into_iter().collect();
        if let Err(e) = write_atomic(file, &Value::Object(snapshot)) {
            warn!("Failed to persist flows to {}: {}", file.display(), e);
        }
    }
}

fn write_atomic(path: &Path, value: &Value) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    std::fs::rename(tmp, path)
}
