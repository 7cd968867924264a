//! System resource detection for cache and pool sizing.
//!
//! Detects available RAM and CPU cores, then derives the defaults used
//! when `StoreConfig` leaves the field cache budget unset. Stateless:
//! each call to `ResourceManager::auto_tune()` re-probes the system.

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

// ── Constants ───────────────────────────────────────────────────────

const MB: usize = 1024 * 1024;
const GB: u64 = 1024 * 1024 * 1024;

/// Field cache floor (64 MB).
const FIELD_CACHE_MIN: usize = 64 * MB;

/// Field cache ceiling (1 GB).
const FIELD_CACHE_MAX: usize = 1024 * MB;

/// Fraction of available memory given to decoded field payloads.
const FIELD_CACHE_FRACTION: f64 = 0.05;

// ── SystemResources ─────────────────────────────────────────────────

/// Snapshot of detected hardware resources.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total physical RAM in bytes.
    pub total_memory_bytes: u64,
    /// Available (re-usable) RAM in bytes.
    pub available_memory_bytes: u64,
    /// Logical CPU count.
    pub cpu_count: usize,
}

impl SystemResources {
    /// Probe the current system for RAM and CPU information.
    pub fn detect() -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        sys.refresh_memory();

        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            total_memory_bytes: sys.total_memory(),
            available_memory_bytes: sys.available_memory(),
            cpu_count,
        }
    }
}

// ── TuningProfile ───────────────────────────────────────────────────

/// Defaults computed from system resources.
#[derive(Debug, Clone)]
pub struct TuningProfile {
    /// Byte budget of the shared field cache.
    pub field_cache_bytes: usize,
    /// Suggested per-shard search pool size.
    pub search_threads: usize,
}

impl TuningProfile {
    /// Heuristics:
    /// - `field_cache_bytes`: `clamp(available * 0.05, 64 MB, 1 GB)`.
    /// - `search_threads`: RAM < 4 GB -> 0 (sequential), else `clamp(cpu / 2, 1, 8)`.
    pub fn from_resources(res: &SystemResources) -> Self {
        let raw = (res.available_memory_bytes as f64 * FIELD_CACHE_FRACTION) as usize;
        let field_cache_bytes = raw.clamp(FIELD_CACHE_MIN, FIELD_CACHE_MAX);

        let search_threads = if res.total_memory_bytes < 4 * GB {
            0
        } else {
            (res.cpu_count / 2).clamp(1, 8)
        };

        Self {
            field_cache_bytes,
            search_threads,
        }
    }
}

impl Default for TuningProfile {
    fn default() -> Self {
        Self {
            field_cache_bytes: FIELD_CACHE_MIN,
            search_threads: 0,
        }
    }
}

// ── ResourceManager ─────────────────────────────────────────────────

/// Stateless utility: detect system resources and compute tuning profile.
pub struct ResourceManager;

impl ResourceManager {
    pub fn auto_tune() -> TuningProfile {
        TuningProfile::from_resources(&SystemResources::detect())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
