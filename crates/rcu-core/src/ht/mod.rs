//! A fixed bucket-count, separately-chained hash table whose read side
//! (`lookup`) never blocks, never spins, and never takes a lock: it is a
//! single RCU read-side critical section walking an immutable snapshot of
//! `AtomicPtr` links.
//!
//! Writers (`add`, `steal`, `delete`, `delete_all`) pay the cost: every
//! mutation is a compare-exchange retry loop, and every unlinked node is
//! hung off [`crate::gp::defer_free`] rather than freed on the spot, so a
//! concurrent reader that is still walking through it sees valid memory
//! until the grace period it started in has ended.
//!
//! `lookup` does not call `read_enter`/`read_exit` on the caller's behalf:
//! the pointer it returns is only valid for the duration of a read-side
//! critical section the caller holds open around the call, exactly as the
//! original library requires `rcu_read_lock`/`rcu_read_unlock` pairs around
//! `ht_lookup`. `add`, `steal`, and `delete_all` open and close their own
//! sections internally since they only need the node pointers transiently
//! to perform a CAS.

use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use thiserror::Error;

use crate::gp::{defer_free, read_enter, read_exit};
use crate::jhash::jhash_word;

const STOLEN: u32 = 1 << 0;

struct Node<D> {
    next: AtomicPtr<Node<D>>,
    key: usize,
    data: D,
    flags: AtomicU32,
}

impl<D> Node<D> {
    fn new(key: usize, data: D) -> *mut Node<D> {
        Box::into_raw(Box::new(Node {
            next: AtomicPtr::new(std::ptr::null_mut()),
            key,
            data,
            flags: AtomicU32::new(0),
        }))
    }
}

/// Reclaims a node unlinked by [`Table::steal`] or [`Table::delete_all`],
/// dropping its payload along with it.
///
/// # Safety
/// `ptr` must be a once-only, currently-unreachable node produced by
/// [`Node::new`], handed to this function exactly once via
/// [`crate::gp::defer_free`].
#[allow(unsafe_code)]
unsafe fn reclaim_node<D>(ptr: *mut Node<D>) {
    // SAFETY: see function contract above; defer_free guarantees the grace
    // period separating unlink from this call has elapsed.
    #[allow(unsafe_code)]
    drop(unsafe { Box::from_raw(ptr) });
}

#[derive(Debug, Error)]
pub enum AddError {
    #[error("key already present")]
    Exists,
}

impl AddError {
    /// The POSIX errno this variant corresponds to.
    #[must_use]
    pub fn as_errno(&self) -> i32 {
        match self {
            AddError::Exists => crate::errno::EEXIST,
        }
    }
}

#[derive(Debug, Error)]
pub enum StealError {
    #[error("no entry for the given key")]
    NotFound,
}

impl StealError {
    /// The POSIX errno this variant corresponds to.
    #[must_use]
    pub fn as_errno(&self) -> i32 {
        match self {
            StealError::NotFound => crate::errno::ENOENT,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeleteError {
    #[error(transparent)]
    Steal(#[from] StealError),
}

impl DeleteError {
    /// The POSIX errno this variant corresponds to.
    #[must_use]
    pub fn as_errno(&self) -> i32 {
        match self {
            DeleteError::Steal(e) => e.as_errno(),
        }
    }
}

/// An RCU-protected, fixed bucket-count hash table.
///
/// `D` must be `Send + 'static` because unlinked nodes are reclaimed on a
/// background thread after a grace period, not on the thread that unlinked
/// them.
pub struct Table<D: Send + 'static> {
    buckets: Vec<AtomicPtr<Node<D>>>,
    hash_seed: u32,
}

impl<D: Send + 'static> Table<D> {
    /// Build a table with a fixed number of buckets. `num_buckets` is not
    /// resized at runtime; chains grow unboundedly under heavy collision,
    /// exactly as the original does (resizing is a Non-goal here, same as
    /// there).
    #[must_use]
    pub fn new(num_buckets: usize, hash_seed: u32) -> Self {
        assert!(num_buckets > 0, "rcu-core: a hash table needs at least one bucket");
        let mut buckets = Vec::with_capacity(num_buckets);
        buckets.resize_with(num_buckets, || AtomicPtr::new(std::ptr::null_mut()));
        Self { buckets, hash_seed }
    }

    fn bucket_index(&self, key: usize) -> usize {
        jhash_word(key, self.hash_seed) as usize % self.buckets.len()
    }

    /// Look up `key`. Must be called from within a read-side critical
    /// section (`read_enter`/`read_exit`); the returned pointer is valid
    /// only until that section ends.
    ///
    /// # Safety
    /// The caller must be inside a read-side critical section for as long
    /// as the returned pointer is dereferenced, and must not retain it past
    /// `read_exit`.
    #[allow(unsafe_code)]
    pub unsafe fn lookup(&self, key: usize) -> Option<*const D> {
        let bucket = &self.buckets[self.bucket_index(key)];
        let mut cur = bucket.load(Ordering::Acquire);
        while !cur.is_null() {
            // SAFETY: `cur` was loaded from a live atomic link inside an
            // active read-side critical section; nodes are only reclaimed
            // a full grace period after being unlinked, so it is valid for
            // reads for the lifetime of this section.
            let node = unsafe { &*cur };
            if node.flags.load(Ordering::Acquire) & STOLEN == 0 && node.key == key {
                return Some(&node.data as *const D);
            }
            cur = node.next.load(Ordering::Acquire);
        }
        None
    }

    /// Insert `data` under `key`, failing if `key` is already present.
    ///
    /// Snapshot-walk-CAS-retry: each attempt re-walks the bucket chain
    /// under one read-side section, checking for a duplicate before racing
    /// a compare-exchange of the bucket head against its own snapshot.
    /// Always inserting at the head means any other successful insert
    /// changes the head and forces this attempt's CAS to fail and
    /// re-validate, so no duplicate can slip in between the duplicate
    /// check and the publish.
    pub fn add(&self, key: usize, data: D) -> Result<(), AddError> {
        let bucket = &self.buckets[self.bucket_index(key)];
        let node = Node::new(key, data);
        loop {
            read_enter();
            let head = bucket.load(Ordering::Acquire);
            let mut cur = head;
            let mut duplicate = false;
            while !cur.is_null() {
                // SAFETY: `cur` was loaded from a live link inside this
                // read-side section; nodes are reclaimed only a full grace
                // period after unlink.
                #[allow(unsafe_code)]
                let existing = unsafe { &*cur };
                if existing.flags.load(Ordering::Acquire) & STOLEN == 0 && existing.key == key {
                    duplicate = true;
                    break;
                }
                cur = existing.next.load(Ordering::Acquire);
            }
            if duplicate {
                read_exit();
                // SAFETY: `node` was allocated by this call and never
                // published to any bucket; freeing it here is sound.
                #[allow(unsafe_code)]
                unsafe {
                    drop(Box::from_raw(node));
                }
                return Err(AddError::Exists);
            }
            // SAFETY: `node` is not yet reachable from any bucket, so
            // writing its `next` field has no concurrent observers.
            #[allow(unsafe_code)]
            unsafe {
                (*node).next.store(head, Ordering::Relaxed);
            }
            let won = bucket
                .compare_exchange(head, node, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();
            read_exit();
            if won {
                return Ok(());
            }
            // Lost the race; re-enter a fresh read section on retry rather
            // than holding this one open indefinitely.
        }
    }

    /// Unlink the first node matching `key` and hand ownership of it back
    /// to the caller as a raw pointer, deferred-reclaimed once the caller
    /// drops it via [`defer_free`]-backed [`Table::delete`], or reclaimable
    /// directly by the caller if they choose not to go through `delete`.
    ///
    /// Once a node is claimed (its `STOLEN` bit set by us), the walk is
    /// retried unconditionally after every attempt to unlink it from its
    /// current `prev`, whether that compare-exchange succeeds or fails.
    /// This is not an optimization: two threads stealing adjacent nodes
    /// (A before B, chain H -> A -> B -> C) can each win their own flags
    /// CAS, after which stealer-of-A unlinking A (H -> B -> C) races
    /// stealer-of-B's unlink of B from its stale `prev = &A.next`. That
    /// second CAS reads as a success (A.next really was B when it ran)
    /// but writes into a `next` field that is no longer reachable from
    /// the bucket head, so B stays fully linked via H despite being
    /// flagged `STOLEN` and handed off for deferred free. Re-walking
    /// from the bucket head after a "successful" unlink is what notices
    /// B is still reachable and unlinks it for real; only once a full
    /// walk fails to find any *live* node matching `key` is the claimed
    /// node (if any) actually gone and safe to report.
    fn steal_raw(&self, key: usize) -> Result<*mut Node<D>, StealError> {
        let mut del_node: *mut Node<D> = std::ptr::null_mut();
        'retry: loop {
            read_enter();
            let bucket = &self.buckets[self.bucket_index(key)];
            let mut prev = bucket;
            let mut cur = prev.load(Ordering::Acquire);
            loop {
                if cur.is_null() {
                    read_exit();
                    if !del_node.is_null() {
                        return Ok(del_node);
                    }
                    return Err(StealError::NotFound);
                }
                // SAFETY: see `lookup`; same read-side section argument.
                #[allow(unsafe_code)]
                let node = unsafe { &*cur };
                if node.key != key {
                    prev = &node.next;
                    cur = node.next.load(Ordering::Acquire);
                    continue;
                }
                if del_node.is_null() {
                    // Not yet claimed by us: first matching node we meet
                    // must be live (not already someone else's steal) or
                    // we defer to whoever holds it.
                    let flags = node.flags.load(Ordering::Acquire);
                    if flags & STOLEN != 0 {
                        read_exit();
                        return Err(StealError::NotFound);
                    }
                    if node
                        .flags
                        .compare_exchange(flags, flags | STOLEN, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                    {
                        // Another racer changed the flags word first; the
                        // list shape may also have changed, so re-walk.
                        read_exit();
                        continue 'retry;
                    }
                    del_node = cur;
                }
                // Found it; pointer to the node is in `prev`. Unlink and
                // retry the whole walk regardless of outcome: on success
                // we must confirm the node is no longer reachable through
                // some other path, on failure the chain shape changed out
                // from under us and needs a fresh read.
                let next = node.next.load(Ordering::Acquire);
                let _ = prev.compare_exchange(cur, next, Ordering::AcqRel, Ordering::Acquire);
                read_exit();
                continue 'retry;
            }
        }
    }

    /// Unlink and free the first node matching `key`.
    pub fn delete(&self, key: usize) -> Result<(), DeleteError> {
        let node = self.steal_raw(key)?;
        // SAFETY: `node` was just exclusively unlinked by `steal_raw`; no
        // other thread holds a new reference to it, and any reader that
        // observed it before the unlink is accounted for by deferring the
        // actual free past the next grace period.
        #[allow(unsafe_code)]
        unsafe {
            defer_free(node, reclaim_node::<D>);
        }
        Ok(())
    }

    /// Atomically detach every node in the table and defer-free them all.
    /// Concurrent `add`s that land after the bucket swap start a fresh
    /// chain and are unaffected; concurrent `steal`/`delete` racing the
    /// per-node detach lose the CAS and correctly report not-found.
    ///
    /// Returns the number of nodes detached.
    pub fn delete_all(&self) -> usize {
        let mut count = 0;
        for bucket in &self.buckets {
            let mut cur = bucket.swap(std::ptr::null_mut(), Ordering::AcqRel);
            while !cur.is_null() {
                // SAFETY: this node was just removed from its bucket by an
                // atomic swap (or `next`-swap below) that only one thread
                // can win; reclamation is deferred past the grace period
                // that makes in-flight reader references safe to drop.
                #[allow(unsafe_code)]
                let next = unsafe { (*cur).next.swap(std::ptr::null_mut(), Ordering::AcqRel) };
                #[allow(unsafe_code)]
                unsafe {
                    defer_free(cur, reclaim_node::<D>);
                }
                count += 1;
                cur = next;
            }
        }
        count
    }

    /// Consume the table, synchronously freeing every remaining node, and
    /// return how many were freed.
    ///
    /// Must only be called once no other thread can reach this table and
    /// any grace periods covering prior unlinks have elapsed — it frees
    /// immediately, without deferring.
    pub fn destroy(self) -> usize {
        let mut count = 0;
        for bucket in &self.buckets {
            let mut cur = bucket.swap(std::ptr::null_mut(), Ordering::AcqRel);
            while !cur.is_null() {
                // SAFETY: `destroy` is documented as requiring exclusive
                // access with no outstanding readers; freeing immediately
                // is sound under that precondition.
                #[allow(unsafe_code)]
                unsafe {
                    let next = (*cur).next.load(Ordering::Acquire);
                    drop(Box::from_raw(cur));
                    cur = next;
                }
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::gp::{register_thread, synchronize, unregister_thread};

    fn with_reader<R>(f: impl FnOnce() -> R) -> R {
        register_thread();
        let r = f();
        unregister_thread();
        r
    }

    #[test]
    fn add_then_lookup_finds_value() {
        with_reader(|| {
            let table: Table<u64> = Table::new(16, 0);
            table.add(7, 42).unwrap();
            read_enter();
            let found = unsafe { table.lookup(7) };
            let value = found.map(|p| unsafe { *p });
            read_exit();
            assert_eq!(value, Some(42));
            table.destroy();
        });
    }

    #[test]
    fn lookup_missing_key_returns_none() {
        with_reader(|| {
            let table: Table<u64> = Table::new(16, 0);
            table.add(1, 1).unwrap();
            read_enter();
            let found = unsafe { table.lookup(999) };
            read_exit();
            assert!(found.is_none());
            table.destroy();
        });
    }

    #[test]
    fn duplicate_add_fails_with_exists() {
        with_reader(|| {
            let table: Table<u64> = Table::new(16, 0);
            assert!(table.add(1, 10).is_ok());
            assert!(matches!(table.add(1, 20), Err(AddError::Exists)));
            read_enter();
            let value = unsafe { table.lookup(1) }.map(|p| unsafe { *p });
            read_exit();
            assert_eq!(value, Some(10));
            table.destroy();
        });
    }

    #[test]
    fn delete_removes_entry_and_is_idempotent_on_missing() {
        with_reader(|| {
            let table: Table<u64> = Table::new(16, 0);
            table.add(5, 55).unwrap();
            assert!(table.delete(5).is_ok());
            synchronize();
            read_enter();
            let found = unsafe { table.lookup(5) };
            read_exit();
            assert!(found.is_none());
            assert!(matches!(
                table.delete(5),
                Err(DeleteError::Steal(StealError::NotFound))
            ));
            table.destroy();
        });
    }

    #[test]
    fn delete_then_readd_succeeds() {
        with_reader(|| {
            let table: Table<u64> = Table::new(4, 0);
            table.add(3, 100).unwrap();
            table.delete(3).unwrap();
            synchronize();
            assert!(table.add(3, 200).is_ok());
            read_enter();
            let value = unsafe { table.lookup(3) }.map(|p| unsafe { *p });
            read_exit();
            assert_eq!(value, Some(200));
            table.destroy();
        });
    }

    #[test]
    fn delete_all_empties_every_bucket_and_counts_them() {
        with_reader(|| {
            let table: Table<u64> = Table::new(8, 0);
            for k in 0..50u64 {
                table.add(k as usize, k).unwrap();
            }
            assert_eq!(table.delete_all(), 50);
            for k in 0..50usize {
                read_enter();
                let found = unsafe { table.lookup(k) };
                read_exit();
                assert!(found.is_none());
            }
            assert_eq!(table.destroy(), 0);
        });
    }

    #[test]
    fn destroy_counts_remaining_nodes() {
        with_reader(|| {
            let table: Table<u64> = Table::new(8, 0);
            for k in 0..10u64 {
                table.add(k as usize, k).unwrap();
            }
            assert_eq!(table.destroy(), 10);
        });
    }
}
