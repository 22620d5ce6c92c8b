//! Admission planning under the storage budget.
//!
//! Planning is pure: it decides which records would have to go for an item to
//! fit, without touching anything. The ledger only executes a plan once it is
//! known to succeed, so a rejected admission never evicts.

use crate::config::{EvictionPolicy, StorageBudget};
use crate::error::StorageError;
use crate::types::{ContentId, ContentRecord};
use std::collections::HashSet;

/// Records that must be evicted (in order) to admit `size` bytes for `incoming`.
///
/// An existing record for `incoming` is treated as replaced: its bytes do not
/// count as used and it is never an eviction candidate. Pinned records are
/// never candidates either.
pub(crate) fn plan_admission<'a>(
    records: impl IntoIterator<Item = &'a ContentRecord>,
    pinned: &HashSet<ContentId>,
    budget: &StorageBudget,
    incoming: &ContentId,
    size: u64,
) -> Result<Vec<ContentId>, StorageError> {
    let mut used: u64 = 0;
    let mut candidates: Vec<&ContentRecord> = Vec::new();

    for record in records {
        if &record.id == incoming {
            continue;
        }
        used = used.saturating_add(record.byte_size);
        if !pinned.contains(&record.id) {
            candidates.push(record);
        }
    }

    let max = budget.max_storage_bytes;
    if used.saturating_add(size) <= max {
        return Ok(Vec::new());
    }

    let free = max.saturating_sub(used);
    if budget.eviction == EvictionPolicy::Never {
        return Err(StorageError::BudgetExceeded {
            required: size,
            available: free,
            budget: max,
        });
    }

    // Least recently accessed first; ties broken by id for determinism
    candidates.sort_by(|a, b| {
        a.last_accessed_at
            .cmp(&b.last_accessed_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut plan = Vec::new();
    let mut remaining = used;
    for candidate in &candidates {
        if remaining.saturating_add(size) <= max {
            break;
        }
        remaining = remaining.saturating_sub(candidate.byte_size);
        plan.push(candidate.id.clone());
    }

    if remaining.saturating_add(size) > max {
        let evictable: u64 = candidates.iter().map(|c| c.byte_size).sum();
        return Err(StorageError::BudgetExceeded {
            required: size,
            available: free.saturating_add(evictable),
            budget: max,
        });
    }

    Ok(plan)
}
