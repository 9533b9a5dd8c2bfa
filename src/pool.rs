use parking_lot::Mutex;
use std::collections::VecDeque;
use std::mem::MaybeUninit;
use std::sync::Arc;

/// Heap storage collaborator for requests no inline shape can serve.
pub trait SlotPool<T> {
    /// Returns storage of at least `count` slots.
    fn rent(&self, count: usize) -> Vec<MaybeUninit<T>>;

    /// Takes back storage obtained from `rent`.
    fn give_back(&self, storage: Vec<MaybeUninit<T>>);
}

/// Free storage kept by the pool. It never holds initialized values, so moving it
/// between threads moves no `T`.
struct FreeBlock<T>(Vec<MaybeUninit<T>>);

unsafe impl<T> Send for FreeBlock<T> {}

/// Pool counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub rents: u64,
    pub returns: u64,
    /// Rents served from free storage.
    pub hits: u64,
    /// Rents that allocated.
    pub misses: u64,
    /// Returned storage that was not kept.
    pub discarded: u64,
}

/// Settings for `SharedPool`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PoolBuilder {
    max_free_per_bucket: usize,
    min_bucket_slots: usize,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        PoolBuilder::new()
    }
}

impl PoolBuilder {
    pub fn new() -> PoolBuilder {
        PoolBuilder {
            max_free_per_bucket: 4,
            min_bucket_slots: 16,
        }
    }

    /// How many free blocks each size bucket keeps.
    pub fn max_free_per_bucket(mut self, max_free_per_bucket: usize) -> PoolBuilder {
        self.max_free_per_bucket = max_free_per_bucket;
        self
    }

    /// Smallest block handed out; smaller requests are rounded up to it.
    pub fn min_bucket_slots(mut self, min_bucket_slots: usize) -> PoolBuilder {
        self.min_bucket_slots = min_bucket_slots.max(1);
        self
    }

    pub fn build<T>(&self) -> SharedPool<T> {
        SharedPool {
            shared: Arc::new(Mutex::new(PoolInstance {
                buckets: Vec::new(),
                max_free_per_bucket: self.max_free_per_bucket,
                min_bucket_slots: self.min_bucket_slots.next_power_of_two(),
                stats: PoolStats::default(),
            })),
        }
    }
}

struct PoolInstance<T> {
    /// Free blocks by `log2(slots)`.
    buckets: Vec<VecDeque<FreeBlock<T>>>,
    max_free_per_bucket: usize,
    min_bucket_slots: usize,
    stats: PoolStats,
}

impl<T> PoolInstance<T> {
    fn bucket_slots(&self, count: usize) -> Option<usize> {
        count.max(self.min_bucket_slots).checked_next_power_of_two()
    }

    fn rent(&mut self, count: usize) -> Vec<MaybeUninit<T>> {
        self.stats.rents += 1;
        let slots = match self.bucket_slots(count) {
            Some(slots) => slots,
            None => {
                self.stats.misses += 1;
                return allocate(count);
            },
        };
        let bucket = slots.trailing_zeros() as usize;
        if let Some(FreeBlock(block)) = self.buckets.get_mut(bucket).and_then(|free| free.pop_back()) {
            trace!("-- take   block of {} slots", block.len());
            self.stats.hits += 1;
            return block;
        }
        trace!("-- init   block of {} slots", slots);
        self.stats.misses += 1;
        allocate(slots)
    }

    fn give_back(&mut self, block: Vec<MaybeUninit<T>>) {
        self.stats.returns += 1;
        let slots = block.len();
        if !slots.is_power_of_two() || slots < self.min_bucket_slots {
            self.stats.discarded += 1;
            return;
        }
        let bucket = slots.trailing_zeros() as usize;
        if self.buckets.len() <= bucket {
            self.buckets.resize_with(bucket + 1, VecDeque::new);
        }
        let free = &mut self.buckets[bucket];
        if free.len() >= self.max_free_per_bucket {
            self.stats.discarded += 1;
            return;
        }
        trace!("-- return block of {} slots", slots);
        free.push_back(FreeBlock(block));
    }

    /// Returns released slot count
    fn cleanup(&mut self) -> usize {
        let mut released = 0;
        for free in self.buckets.iter_mut() {
            while let Some(FreeBlock(block)) = free.pop_front() {
                trace!("-- clean  block of {} slots", block.len());
                released += block.len();
            }
        }
        released
    }

    fn free_slots(&self) -> usize {
        self.buckets.iter()
            .flat_map(|free| free.iter())
            .map(|FreeBlock(block)| block.len())
            .sum()
    }
}

fn allocate<T>(slots: usize) -> Vec<MaybeUninit<T>> {
    let mut block = Vec::with_capacity(slots);
    block.resize_with(slots, MaybeUninit::uninit);
    block
}

/// Shared, bucketed pool of slot storage.
///
/// Requests are rounded up to a power of two; each bucket keeps a bounded number of free
/// blocks for reuse. Clones share the same free lists.
pub struct SharedPool<T> {
    shared: Arc<Mutex<PoolInstance<T>>>,
}

impl<T> Clone for SharedPool<T> {
    fn clone(&self) -> Self {
        SharedPool {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Default for SharedPool<T> {
    fn default() -> Self {
        PoolBuilder::new().build()
    }
}

impl<T> SharedPool<T> {
    pub fn new() -> SharedPool<T> {
        SharedPool::default()
    }

    /// Drops all free storage. Returns released slot count
    pub fn cleanup(&self) -> usize {
        self.shared.lock().cleanup()
    }

    pub fn free_slots(&self) -> usize {
        self.shared.lock().free_slots()
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.lock().stats
    }
}

impl<T> SlotPool<T> for SharedPool<T> {
    #[inline(always)]
    fn rent(&self, count: usize) -> Vec<MaybeUninit<T>> {
        self.shared.lock().rent(count)
    }

    #[inline(always)]
    fn give_back(&self, storage: Vec<MaybeUninit<T>>) {
        self.shared.lock().give_back(storage)
    }
}
