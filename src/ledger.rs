// src/ledger.rs

//! Memory and thread budget shared by every task of a run.
//!
//! Memory is accounted internally in whole MiB so that repeated
//! reserve/release cycles never drift the way summed floats would.

use tracing::{trace, warn};

use crate::types::ResourceDemand;

const MIB_PER_GB: f64 = 1024.0;

/// Demands round up, capacities round down: the ledger never admits more
/// than the configured total.
fn demand_mib(gb: f64) -> u64 {
    (gb.max(0.0) * MIB_PER_GB).ceil() as u64
}

fn capacity_mib(gb: f64) -> u64 {
    (gb.max(0.0) * MIB_PER_GB).floor() as u64
}

fn mib_to_gb(mib: u64) -> f64 {
    mib as f64 / MIB_PER_GB
}

/// Tracks total vs. committed memory and threads.
///
/// Invariant: `committed <= total` for both dimensions at all times.
#[derive(Debug, Clone)]
pub struct ResourceLedger {
    total_memory_mib: u64,
    total_threads: u32,
    committed_memory_mib: u64,
    committed_threads: u32,
    /// Number of successful reservations over the ledger's lifetime.
    reservations: u64,
}

impl ResourceLedger {
    pub fn new(max_memory_gb: f64, max_threads: u32) -> Self {
        Self {
            total_memory_mib: capacity_mib(max_memory_gb),
            total_threads: max_threads,
            committed_memory_mib: 0,
            committed_threads: 0,
            reservations: 0,
        }
    }

    /// Reserve `demand` if it fits in both dimensions; all-or-nothing.
    pub fn try_reserve(&mut self, demand: &ResourceDemand) -> bool {
        let mem = demand_mib(demand.memory_gb);
        let fits_memory = self
            .committed_memory_mib
            .checked_add(mem)
            .is_some_and(|sum| sum <= self.total_memory_mib);
        let fits_threads = self
            .committed_threads
            .checked_add(demand.threads)
            .is_some_and(|sum| sum <= self.total_threads);

        if !(fits_memory && fits_threads) {
            trace!(
                memory_gb = demand.memory_gb,
                threads = demand.threads,
                free_memory_gb = self.free_memory_gb(),
                free_threads = self.free_threads(),
                "reservation rejected"
            );
            return false;
        }

        self.committed_memory_mib += mem;
        self.committed_threads += demand.threads;
        self.reservations += 1;
        true
    }

    /// Reverse a reservation made with [`try_reserve`](Self::try_reserve).
    pub fn release(&mut self, demand: &ResourceDemand) {
        let mem = demand_mib(demand.memory_gb);

        if mem > self.committed_memory_mib || demand.threads > self.committed_threads {
            warn!(
                memory_gb = demand.memory_gb,
                threads = demand.threads,
                "release exceeds committed capacity; clamping to zero"
            );
        }

        self.committed_memory_mib = self.committed_memory_mib.saturating_sub(mem);
        self.committed_threads = self.committed_threads.saturating_sub(demand.threads);
    }

    pub fn total_memory_gb(&self) -> f64 {
        mib_to_gb(self.total_memory_mib)
    }

    pub fn total_threads(&self) -> u32 {
        self.total_threads
    }

    pub fn committed_memory_gb(&self) -> f64 {
        mib_to_gb(self.committed_memory_mib)
    }

    pub fn committed_threads(&self) -> u32 {
        self.committed_threads
    }

    pub fn free_memory_gb(&self) -> f64 {
        mib_to_gb(self.total_memory_mib - self.committed_memory_mib)
    }

    pub fn free_threads(&self) -> u32 {
        self.total_threads - self.committed_threads
    }

    pub fn is_idle(&self) -> bool {
        self.committed_memory_mib == 0 && self.committed_threads == 0
    }

    pub fn reservations(&self) -> u64 {
        self.reservations
    }

    /// `committed <= total` in both dimensions.
    pub fn within_capacity(&self) -> bool {
        self.committed_memory_mib <= self.total_memory_mib
            && self.committed_threads <= self.total_threads
    }
}
