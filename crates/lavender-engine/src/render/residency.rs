use std::collections::BTreeSet;

use thiserror::Error;

use crate::device::{AllocationId, DeviceError, GpuDevice};

#[derive(Debug, Error)]
pub enum ResidencyError {
    #[error("failed to make {count} allocations resident")]
    Commit {
        count: usize,
        #[source]
        source: DeviceError,
    },
}

/// Allocations the GPU must be able to reach during command execution.
///
/// Additions and evictions are staged and take effect on [`commit`](Self::commit).
#[derive(Debug, Default)]
pub struct ResidencySet {
    pending: BTreeSet<AllocationId>,
    evicted: BTreeSet<AllocationId>,
    committed: BTreeSet<AllocationId>,
    commits: u64,
}

impl ResidencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_allocation(&mut self, allocation: impl Into<AllocationId>) {
        let id = allocation.into();
        self.evicted.remove(&id);
        if !self.committed.contains(&id) {
            self.pending.insert(id);
        }
    }

    pub fn add_allocations<I>(&mut self, allocations: I)
    where
        I: IntoIterator,
        I::Item: Into<AllocationId>,
    {
        for a in allocations {
            self.add_allocation(a);
        }
    }

    /// Stages removal of an allocation that no command will reference again.
    pub fn evict(&mut self, allocation: impl Into<AllocationId>) {
        let id = allocation.into();
        self.pending.remove(&id);
        if self.committed.contains(&id) {
            self.evicted.insert(id);
        }
    }

    /// True when staged changes are waiting for a commit.
    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty() || !self.evicted.is_empty()
    }

    /// Makes the accumulated set resident on the device.
    pub fn commit(&mut self, device: &dyn GpuDevice) -> Result<(), ResidencyError> {
        if !self.is_dirty() && self.commits > 0 {
            return Ok(());
        }

        let mut next: BTreeSet<AllocationId> = self.committed.union(&self.pending).copied().collect();
        for id in &self.evicted {
            next.remove(id);
        }

        let list: Vec<AllocationId> = next.iter().copied().collect();
        device
            .make_resident(&list)
            .map_err(|source| ResidencyError::Commit {
                count: list.len(),
                source,
            })?;

        log::debug!(
            "residency commit: {} resident (+{} / -{})",
            next.len(),
            self.pending.len(),
            self.evicted.len()
        );

        self.committed = next;
        self.pending.clear();
        self.evicted.clear();
        self.commits += 1;
        Ok(())
    }

    /// Whether `allocation` was resident as of the last commit.
    pub fn is_resident(&self, allocation: impl Into<AllocationId>) -> bool {
        self.committed.contains(&allocation.into())
    }

    pub fn resident(&self) -> impl Iterator<Item = AllocationId> + '_ {
        self.committed.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    pub fn commits(&self) -> u64 {
        self.commits
    }
}
