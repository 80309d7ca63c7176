//! Runtime support: record storage, regions, and cleanup accounting.
//!
//! Records live in one of two regions. Frame records sit inline in their
//! activation and vanish with it; heap records live in an instrumented slab
//! and must be released by exactly one cleanup pass. The slab counts every
//! allocation and release so tests can assert the `allocations == releases`
//! contract and the zero-heap property of non-escaping records.

use eigenscript_engine::{EigenPair, TrackedValue};

use crate::bytecode::{Region, SlotAddr};
use crate::error::{Error, Result};

/// Allocation and release counters, split by storage kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub record_allocations: u64,
    pub record_releases: u64,
    pub list_allocations: u64,
    pub list_releases: u64,
}

impl RuntimeStats {
    /// Every explicit allocation was released exactly once.
    pub fn balanced(&self) -> bool {
        self.record_allocations == self.record_releases
            && self.list_allocations == self.list_releases
    }
}

/// Instrumented heap region for escaping records.
#[derive(Debug, Default)]
pub struct RecordHeap {
    slots: Vec<Option<TrackedValue>>,
    pub allocations: u64,
    pub releases: u64,
}

impl RecordHeap {
    pub fn alloc(&mut self, tv: TrackedValue) -> u32 {
        self.allocations += 1;
        self.slots.push(Some(tv));
        (self.slots.len() - 1) as u32
    }

    pub fn get(&self, id: u32) -> Result<&TrackedValue> {
        match self.slots.get(id as usize) {
            Some(Some(tv)) => Ok(tv),
            Some(None) => Err(Error::UseAfterRelease(id)),
            None => Err(Error::Corrupt("record id out of range")),
        }
    }

    pub fn get_mut(&mut self, id: u32) -> Result<&mut TrackedValue> {
        match self.slots.get_mut(id as usize) {
            Some(Some(tv)) => Ok(tv),
            Some(None) => Err(Error::UseAfterRelease(id)),
            None => Err(Error::Corrupt("record id out of range")),
        }
    }

    pub fn release(&mut self, id: u32) -> Result<()> {
        match self.slots.get_mut(id as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                self.releases += 1;
                Ok(())
            }
            Some(None) => Err(Error::DoubleRelease(id)),
            None => Err(Error::Corrupt("record id out of range")),
        }
    }
}

/// Instrumented storage for list values. Appends grow geometrically
/// through the backing vector.
#[derive(Debug, Default)]
pub struct ListHeap {
    slots: Vec<Option<Vec<f64>>>,
    pub allocations: u64,
    pub releases: u64,
}

impl ListHeap {
    pub fn alloc(&mut self, items: Vec<f64>) -> u32 {
        self.allocations += 1;
        self.slots.push(Some(items));
        (self.slots.len() - 1) as u32
    }

    pub fn get(&self, id: u32) -> Result<&Vec<f64>> {
        match self.slots.get(id as usize) {
            Some(Some(items)) => Ok(items),
            Some(None) => Err(Error::UseAfterRelease(id)),
            None => Err(Error::Corrupt("list id out of range")),
        }
    }

    pub fn get_mut(&mut self, id: u32) -> Result<&mut Vec<f64>> {
        match self.slots.get_mut(id as usize) {
            Some(Some(items)) => Ok(items),
            Some(None) => Err(Error::UseAfterRelease(id)),
            None => Err(Error::Corrupt("list id out of range")),
        }
    }

    pub fn release(&mut self, id: u32) -> Result<()> {
        match self.slots.get_mut(id as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                self.releases += 1;
                Ok(())
            }
            Some(None) => Err(Error::DoubleRelease(id)),
            None => Err(Error::Corrupt("list id out of range")),
        }
    }
}

/// Where one record's storage actually is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loc {
    Frame(u16),
    Heap(u32),
}

/// Pair geometry bound to two record addresses, re-resolved on every
/// query so the pair always reads live values.
#[derive(Debug, Clone, Copy)]
pub struct PairSlot {
    pub a: SlotAddr,
    pub b: SlotAddr,
    pub geometry: EigenPair,
}

/// What one activation slot currently holds.
#[derive(Debug, Clone, Copy, Default)]
pub enum Slot {
    #[default]
    Empty,
    Record(Loc),
    Pair(PairSlot),
    List(u32),
}

/// A value on the operand stack. Records and lists only appear here while
/// crossing an activation boundary on return.
#[derive(Debug, Clone)]
pub enum VmValue {
    Num(f64),
    Text(String),
    Record(u32),
    List(u32),
}

impl VmValue {
    pub fn as_num(&self, heap: &RecordHeap) -> Result<f64> {
        match self {
            VmValue::Num(v) => Ok(*v),
            VmValue::Record(id) => Ok(heap.get(*id)?.value()),
            VmValue::Text(_) | VmValue::List(_) => Err(Error::TypeMismatch { expected: "number" }),
        }
    }
}

/// One activation: slot table, frame-region records, operand stack, and
/// the cleanup lists its teardown must drain.
#[derive(Debug, Default)]
pub struct Frame {
    pub slots: Vec<Slot>,
    pub records: Vec<TrackedValue>,
    pub stack: Vec<VmValue>,
    pub cleanup_records: Vec<u32>,
    pub cleanup_lists: Vec<u32>,
    pub result: Option<VmValue>,
}

impl Frame {
    pub fn new(slot_count: u16) -> Self {
        Self {
            slots: vec![Slot::Empty; slot_count as usize],
            ..Frame::default()
        }
    }

    /// Allocate a record in the requested region, registering heap records
    /// for cleanup.
    pub fn create_record(&mut self, heap: &mut RecordHeap, region: Region, initial: f64) -> Loc {
        match region {
            Region::Frame => {
                self.records.push(TrackedValue::new(initial));
                Loc::Frame((self.records.len() - 1) as u16)
            }
            Region::Heap => {
                let id = heap.alloc(TrackedValue::new(initial));
                self.cleanup_records.push(id);
                Loc::Heap(id)
            }
        }
    }

    /// Drop a heap record's cleanup entry so it can outlive this frame.
    /// The caller that adopts it becomes responsible for its release.
    pub fn disown_record(&mut self, id: u32) {
        self.cleanup_records.retain(|&entry| entry != id);
    }

    pub fn disown_list(&mut self, id: u32) {
        self.cleanup_lists.retain(|&entry| entry != id);
    }

    /// The one cleanup pass run before an activation with a non-empty
    /// cleanup list returns.
    pub fn teardown(&mut self, heap: &mut RecordHeap, lists: &mut ListHeap) -> Result<()> {
        for id in self.cleanup_records.drain(..) {
            heap.release(id)?;
        }
        for id in self.cleanup_lists.drain(..) {
            lists.release(id)?;
        }
        Ok(())
    }

    pub fn pop(&mut self) -> Result<VmValue> {
        self.stack
            .pop()
            .ok_or(Error::Corrupt("operand stack underflow"))
    }

    pub fn pop_num(&mut self, heap: &RecordHeap) -> Result<f64> {
        self.pop()?.as_num(heap)
    }
}

/// Resolve a location to a shared record reference.
pub fn record_ref<'a>(heap: &'a RecordHeap, frame: &'a Frame, loc: Loc) -> Result<&'a TrackedValue> {
    match loc {
        Loc::Frame(i) => frame
            .records
            .get(i as usize)
            .ok_or(Error::Corrupt("frame record out of range")),
        Loc::Heap(id) => heap.get(id),
    }
}

/// Resolve a location to an exclusive record reference.
pub fn record_mut<'a>(
    heap: &'a mut RecordHeap,
    frame: &'a mut Frame,
    loc: Loc,
) -> Result<&'a mut TrackedValue> {
    match loc {
        Loc::Frame(i) => frame
            .records
            .get_mut(i as usize)
            .ok_or(Error::Corrupt("frame record out of range")),
        Loc::Heap(id) => heap.get_mut(id),
    }
}
