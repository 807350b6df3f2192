//! Bulk acquisition: one synchronization per owning worker.
//!
//! Acquiring N handles one by one from a foreign thread queues N times.
//! Grouping them by affinity first turns that into one queue wait per
//! distinct owner.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::MutexGuard;

use super::acquirable::Acquirable;
use super::context::{Access, AcquisitionContext};
use crate::thread::Worker;

/// Handles sharing one owner. Key 0 is the unassigned group.
struct OwnerGroup<'h, T> {
    owner: Option<Arc<Worker>>,
    handles: Vec<&'h Acquirable<T>>,
}

fn group_by_owner<'h, T: 'h>(
    handles: impl IntoIterator<Item = &'h Acquirable<T>>,
) -> BTreeMap<u64, OwnerGroup<'h, T>> {
    let mut groups: BTreeMap<u64, OwnerGroup<'h, T>> = BTreeMap::new();
    for handle in handles {
        let key = handle.handler().worker_id().map_or(0, |id| id.get());
        groups
            .entry(key)
            .or_insert_with(|| OwnerGroup {
                owner: handle.handler().worker(),
                handles: Vec::new(),
            })
            .handles
            .push(handle);
    }
    groups
}

/// Runs `consumer` on every handle, synchronizing once per owning worker.
///
/// Objects are visited group by group (owners in id order, unassigned
/// first), in input order within a group. Duplicates are visited twice.
pub fn acquire_for_each<'h, T: 'h>(
    ctx: &AcquisitionContext,
    handles: impl IntoIterator<Item = &'h Acquirable<T>>,
    mut consumer: impl FnMut(&mut T),
) {
    for group in group_by_owner(handles).into_values() {
        let _access = ctx.access_worker(group.owner.as_ref());
        for handle in group.handles {
            consumer(&mut *handle.lock());
        }
    }
}

/// Acquires every handle at once and hands all objects to `collector`.
///
/// Duplicate handles are collapsed; the slice follows first-occurrence
/// order of the input. Object locks are taken in handle id order so two
/// concurrent bulk acquisitions cannot lock against each other.
pub fn acquire_all<'h, T: 'h, R>(
    ctx: &AcquisitionContext,
    handles: impl IntoIterator<Item = &'h Acquirable<T>>,
    collector: impl FnOnce(&mut [&mut T]) -> R,
) -> R {
    let mut unique: Vec<&'h Acquirable<T>> = Vec::new();
    for handle in handles {
        if !unique.iter().any(|seen| seen.id() == handle.id()) {
            unique.push(handle);
        }
    }

    let accesses: Vec<Access<'_>> = group_by_owner(unique.iter().copied())
        .into_values()
        .map(|group| ctx.access_worker(group.owner.as_ref()))
        .collect();

    let mut lock_order: Vec<usize> = (0..unique.len()).collect();
    lock_order.sort_by_key(|&index| unique[index].id());

    let mut slots: Vec<Option<MutexGuard<'h, T>>> = unique.iter().map(|_| None).collect();
    for index in lock_order {
        slots[index] = Some(unique[index].lock());
    }
    let mut guards: Vec<MutexGuard<'h, T>> = slots.into_iter().flatten().collect();

    let result = {
        let mut objects: Vec<&mut T> = guards.iter_mut().map(|guard| &mut **guard).collect();
        collector(&mut objects)
    };

    drop(guards);
    drop(accesses);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::WaitMonitor;
    use crate::thread::{Worker, WorkerState};

    #[test]
    fn test_for_each_visits_every_handle() {
        let handles: Vec<_> = (0..5).map(Acquirable::new).collect();
        let ctx = AcquisitionContext::detached();

        let mut sum = 0;
        acquire_for_each(&ctx, &handles, |v| {
            *v *= 2;
            sum += *v;
        });

        assert_eq!(sum, 20);
        // All unassigned: one group, one synchronization.
        assert_eq!(ctx.stats().synchronized, 1);
    }

    #[test]
    fn test_for_each_counts_one_sync_per_owner() {
        let first = Worker::detached("bulk-a");
        let second = Worker::detached("bulk-b");
        let handles: Vec<_> = (0..6).map(Acquirable::new).collect();
        for (i, handle) in handles.iter().enumerate() {
            let owner = if i % 2 == 0 { &first } else { &second };
            handle.handler().refresh_thread(owner);
        }

        let ctx = AcquisitionContext::detached();
        let mut visited = 0;
        acquire_for_each(&ctx, &handles, |_| visited += 1);

        assert_eq!(visited, 6);
        assert_eq!(ctx.stats().synchronized, 2);
    }

    #[test]
    fn test_owned_group_uses_fast_path() {
        let owner = Worker::detached("bulk-owner");
        owner.set_state(WorkerState::Ticking);
        owner.queue().open();
        let handles: Vec<_> = (0..3).map(Acquirable::new).collect();
        for handle in &handles {
            handle.handler().refresh_thread(&owner);
        }

        let ctx = AcquisitionContext::for_worker(Arc::clone(&owner), Arc::new(WaitMonitor::new(true)));
        acquire_for_each(&ctx, &handles, |v| *v += 1);

        assert_eq!(ctx.stats().fast_path, 1);
        assert_eq!(ctx.stats().synchronized, 0);
        assert_eq!(owner.queue().pending_len(), 0);
    }

    #[test]
    fn test_acquire_all_dedupes_and_keeps_input_order() {
        let a = Acquirable::new(1);
        let b = Acquirable::new(2);
        let c = Acquirable::new(3);
        let ctx = AcquisitionContext::detached();

        let seen = acquire_all(&ctx, [&c, &a, &c, &b], |objects| {
            for object in objects.iter_mut() {
                **object *= 10;
            }
            objects.iter().map(|v| **v).collect::<Vec<_>>()
        });

        assert_eq!(seen, vec![30, 10, 20]);
        assert_eq!(a.into_inner(), 10);
        assert_eq!(c.into_inner(), 30);
    }
}
