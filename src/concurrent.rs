//! Concurrent Linked Hash Map
//!
//! A bounded map shared by many threads that evicts in approximately
//! least-recently-used order without putting a lock on the read path.
//!
//! # Architecture
//!
//! ```text
//!   get / put / remove / replace
//!          │
//!          ▼
//!   ┌──────────────┐   Arc<Node>   ┌──────────────────────────────────┐
//!   │ backing table│──────────────▶│ task buffers (one per CPU)       │
//!   │  (DashMap)   │               │ [Read][Add][Read]... SegQueue    │
//!   └──────────────┘               └────────────────┬─────────────────┘
//!          ▲                                        │ try_lock
//!          │ remove evicted                         ▼
//!          │                       ┌──────────────────────────────────┐
//!          └───────────────────────│ eviction policy (Mutex)          │
//!                                  │ deque LRU ⇄ MRU, weighted size   │
//!                                  └──────────────────────────────────┘
//! ```
//!
//! - The **backing table** is the source of truth for membership. Every
//!   operation completes against it first and never waits for the policy.
//! - Each operation then leaves a **task** in the calling thread's buffer:
//!   a read, an add with the entry's weight, an update with the change in
//!   weight, or a removal.
//! - Whoever next wins a `try_lock` on the **eviction policy** drains the
//!   buffers, replays the tasks in roughly the order they happened, and
//!   evicts from the LRU end while the weighted size exceeds the capacity.
//!
//! Writes always ask for a drain. Reads only do once their buffer holds
//! more than a handful of tasks, or if a write is waiting to be drained.
//! When a buffer is badly backed up, further reads are dropped: the entry
//! is still returned, its recency is just not recorded.
//!
//! ## Why a Mutex for the policy?
//!
//! Only one thread at a time touches the deque, and it never needs to wait
//! for that privilege: if the lock is taken, the holder will replay the
//! caller's task on the next pass. `parking_lot::Mutex::try_lock` is all
//! the read and write paths ever call. Only
//! [`set_capacity`](ConcurrentLinkedHashMap::set_capacity),
//! [`flush`](ConcurrentLinkedHashMap::flush) and
//! [`clear`](ConcurrentLinkedHashMap::clear) block on it.
//!
//! # Example
//!
//! ```
//! use concurrent_linked_cache::ConcurrentLinkedHashMap;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let map = Arc::new(ConcurrentLinkedHashMap::with_capacity(1_000));
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let map = Arc::clone(&map);
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 map.put(t * 100 + i, i).unwrap();
//!             }
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! assert_eq!(map.len(), 400);
//! ```

mod buffer;
mod drain;
mod map;
mod table;

pub use self::map::ConcurrentLinkedHashMap;
