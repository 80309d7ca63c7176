//! Bytecode representation.
//!
//! A program compiles to a flat table of chunks: chunk 0 is the entry
//! sequence, every function body is its own chunk, and every
//! self-referential defining expression becomes a body chunk re-run by the
//! `Fixpoint` instruction. Jumps are absolute instruction positions within
//! one chunk, patched after the target is known.

use eigenscript_engine::{Interrogative, PairMetric, PredicateKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Which activation a slot address targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddrSpace {
    /// The executing activation's slot table.
    Local,
    /// The entry activation's slot table.
    Global,
}

/// A resolved binding address: space plus slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAddr {
    pub space: AddrSpace,
    pub index: u16,
}

impl SlotAddr {
    pub fn local(index: u16) -> Self {
        Self {
            space: AddrSpace::Local,
            index,
        }
    }

    pub fn global(index: u16) -> Self {
        Self {
            space: AddrSpace::Global,
            index,
        }
    }
}

/// Where a record's storage lives, decided by escape analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    /// Inline on the activation's own frame; freed by frame teardown.
    Frame,
    /// Heap region with an explicit cleanup-list entry.
    Heap,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Push `constants[i]`.
    Const(u16),
    /// Push `names[i]` as a text value.
    PushName(u16),
    /// Push the current value of the record at the address.
    Read(SlotAddr),
    /// Pop an initial value and create the record in the given region.
    /// An adopted record or list value rebinds the slot instead.
    Create { slot: SlotAddr, region: Region },
    /// Pop a value and update the existing record in place.
    Update(SlotAddr),

    Add,
    Sub,
    Mul,
    Div,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpLe,
    CmpGt,
    CmpGe,
    And,
    Or,
    Neg,
    Not,

    /// Unconditional jump to an absolute position in this chunk.
    Jump(u16),
    /// Pop a value; jump when it is zero.
    JumpIfFalse(u16),

    /// Pop the argument, run the function chunk in a fresh activation,
    /// push its result.
    Call { chunk: u16 },
    /// Pop the result value and terminate this chunk.
    Return,
    /// Terminate this chunk yielding the binding itself; its cleanup entry
    /// transfers to the caller.
    ReturnBinding(SlotAddr),

    /// Re-run the body chunk against the record at `slot` until it settles
    /// or diverges. `name` indexes the names table for diagnostics.
    Fixpoint {
        slot: SlotAddr,
        body: u16,
        name: u16,
    },

    /// Evaluate a predicate on a record; pops the target first when
    /// `has_target` is set.
    Predicate {
        kind: PredicateKind,
        slot: SlotAddr,
        has_target: bool,
    },
    /// Push one projection of a record's state.
    Interrogate { kind: Interrogative, slot: SlotAddr },
    /// Push the process-wide framework strength.
    Strength,

    /// Pair two records and bind the geometry at `slot`.
    CreatePair {
        slot: SlotAddr,
        a: SlotAddr,
        b: SlotAddr,
    },
    /// Re-derive and push one metric of the pair at the address.
    PairMetric { slot: SlotAddr, kind: PairMetric },
    /// Re-derive the pair and push its equilibrium judgment.
    Equilibrium(SlotAddr),

    /// Pop `len` values and bind a fresh list at `slot`.
    CreateList { slot: SlotAddr, len: u16 },
    /// Pop a value and append it to the list at the address.
    Append(SlotAddr),
    /// Pop an index and push the element at it.
    IndexList(SlotAddr),
    /// Push the list's length.
    LenList(SlotAddr),

    /// Pop the statement value into the activation's result register.
    StashResult,
}

/// One compiled instruction sequence with its literal tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chunk {
    pub ops: Vec<Op>,
    pub constants: Vec<f64>,
    pub names: Vec<String>,
    /// Slot-table size for the activation running this chunk. Body chunks
    /// run in their parent's activation and leave this at zero.
    pub slot_count: u16,
}

impl Chunk {
    /// Append an op, returning its position for later patching.
    pub fn emit(&mut self, op: Op) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    /// Intern a constant.
    pub fn constant(&mut self, value: f64) -> u16 {
        if let Some(i) = self.constants.iter().position(|c| c.to_bits() == value.to_bits()) {
            return i as u16;
        }
        self.constants.push(value);
        (self.constants.len() - 1) as u16
    }

    /// Intern a name.
    pub fn name(&mut self, name: &str) -> u16 {
        if let Some(i) = self.names.iter().position(|n| n == name) {
            return i as u16;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as u16
    }

    /// Point the jump at `at` to the current end of the chunk.
    pub fn patch_jump(&mut self, at: usize) {
        let target = self.ops.len() as u16;
        match &mut self.ops[at] {
            Op::Jump(t) | Op::JumpIfFalse(t) => *t = target,
            _ => unreachable!("patch target is not a jump"),
        }
    }
}

/// A fully lowered program: chunk 0 plus function and fixpoint-body chunks,
/// and the entry activation's name layout for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledProgram {
    pub chunks: Vec<Chunk>,
    pub globals: IndexMap<String, u16>,
}

impl CompiledProgram {
    pub fn entry(&self) -> &Chunk {
        &self.chunks[0]
    }
}
