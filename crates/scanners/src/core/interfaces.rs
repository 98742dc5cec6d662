use crate::core::ScanReport;
use std::collections::HashMap;
use std::sync::Mutex;

/// Report cache keyed by `codeHash`, for hosting services that want to skip
/// re-analysis of artifacts they have already seen. The orchestrator itself
/// never consults one; `analyze` stays a pure computation over its inputs,
/// and the hosting service decides when a cached report is still fresh.
pub trait ScanCache: Send + Sync {
    fn get(&self, code_hash: &str) -> Option<ScanReport>;
    fn set(&self, code_hash: &str, report: ScanReport);
}

/// Unbounded in-memory reference implementation.
#[derive(Default)]
pub struct MemoryScanCache {
    entries: Mutex<HashMap<String, ScanReport>>,
}

impl MemoryScanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScanCache for MemoryScanCache {
    fn get(&self, code_hash: &str) -> Option<ScanReport> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(code_hash).cloned())
    }

    fn set(&self, code_hash: &str, report: ScanReport) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(code_hash.to_string(), report);
        }
    }
}
