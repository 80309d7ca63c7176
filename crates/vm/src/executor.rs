//! Bytecode executor.
//!
//! A stack machine over activation frames. Frame 0 is the entry activation;
//! `Call` pushes a fresh frame and tears it down (one cleanup pass) after
//! the callee yields. Fixpoint body chunks run inside the activation that
//! owns the binding, so their slot addresses resolve unchanged.

use eigenscript_engine::fixpoint::{FixpointDriver, FixpointStatus};
use eigenscript_engine::{ConvergenceContext, EngineConfig, TrackedValue, predicate};
use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::bytecode::{AddrSpace, Chunk, CompiledProgram, Op, SlotAddr};
use crate::error::{Error, Result};
use crate::runtime::{
    Frame, ListHeap, Loc, PairSlot, RecordHeap, RuntimeStats, Slot, VmValue, record_mut,
};

/// A finished run: the last statement's value, the entry-scope record
/// values as read just before teardown, and the allocation accounting.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub value: Output,
    pub globals: IndexMap<String, f64>,
    pub stats: RuntimeStats,
}

/// Observable result of the entry chunk's last statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Num(f64),
    Text(String),
}

impl Output {
    pub fn as_num(&self) -> Result<f64> {
        match self {
            Output::Num(v) => Ok(*v),
            Output::Text(_) => Err(Error::TypeMismatch { expected: "number" }),
        }
    }
}

/// The virtual machine: engine config, threaded convergence context, and
/// the two instrumented storage regions.
pub struct Vm {
    cfg: EngineConfig,
    ctx: ConvergenceContext,
    heap: RecordHeap,
    lists: ListHeap,
    frames: Vec<Frame>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(cfg: EngineConfig) -> Self {
        let ctx = ConvergenceContext::new(&cfg);
        Self {
            cfg,
            ctx,
            heap: RecordHeap::default(),
            lists: ListHeap::default(),
            frames: Vec::new(),
        }
    }

    /// Execute a compiled program to completion, then run the entry
    /// activation's cleanup pass. After this returns, every explicit
    /// allocation has been released exactly once.
    pub fn run(&mut self, program: &CompiledProgram) -> Result<Outcome> {
        self.frames.push(Frame::new(program.entry().slot_count));
        let returned = self.run_chunk(program, 0)?;

        let mut entry = self.frames.pop().ok_or(Error::Corrupt("no entry frame"))?;
        let raw = returned
            .or(entry.result.take())
            .unwrap_or(VmValue::Num(0.0));
        let value = match raw {
            VmValue::Num(v) => Output::Num(v),
            VmValue::Text(s) => Output::Text(s),
            VmValue::Record(id) => Output::Num(self.heap.get(id)?.value()),
            VmValue::List(_) => return Err(Error::TypeMismatch { expected: "number" }),
        };

        let mut globals = IndexMap::new();
        for (name, &slot) in &program.globals {
            if let Some(Slot::Record(loc)) = entry.slots.get(slot as usize).copied() {
                let v = match loc {
                    Loc::Heap(id) => self.heap.get(id)?.value(),
                    Loc::Frame(i) => entry
                        .records
                        .get(i as usize)
                        .ok_or(Error::Corrupt("frame record out of range"))?
                        .value(),
                };
                globals.insert(name.clone(), v);
            }
        }

        entry.teardown(&mut self.heap, &mut self.lists)?;
        debug!(
            allocations = self.heap.allocations,
            releases = self.heap.releases,
            "entry activation torn down"
        );
        Ok(Outcome {
            value,
            globals,
            stats: self.stats(),
        })
    }

    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            record_allocations: self.heap.allocations,
            record_releases: self.heap.releases,
            list_allocations: self.lists.allocations,
            list_releases: self.lists.releases,
        }
    }

    pub fn framework_strength(&self) -> f64 {
        self.ctx.framework_strength()
    }

    fn run_chunk(&mut self, program: &CompiledProgram, chunk_idx: usize) -> Result<Option<VmValue>> {
        let chunk: &Chunk = program
            .chunks
            .get(chunk_idx)
            .ok_or(Error::Corrupt("chunk index out of range"))?;
        let mut ip = 0usize;
        while ip < chunk.ops.len() {
            let op = chunk.ops[ip];
            ip += 1;
            match op {
                Op::Const(i) => {
                    let v = *chunk
                        .constants
                        .get(i as usize)
                        .ok_or(Error::Corrupt("constant index out of range"))?;
                    self.push(VmValue::Num(v))?;
                }
                Op::PushName(i) => {
                    let name = chunk
                        .names
                        .get(i as usize)
                        .ok_or(Error::Corrupt("name index out of range"))?;
                    self.push(VmValue::Text(name.clone()))?;
                }
                Op::Read(addr) => {
                    let v = self.record_copy(addr)?.value();
                    self.push(VmValue::Num(v))?;
                }
                Op::Create { slot, region } => {
                    let value = self.pop()?;
                    match value {
                        VmValue::Num(v) => {
                            // A create inside a loop body re-executes; the
                            // record it made on the first pass updates in
                            // place like any rebind.
                            if matches!(self.resolve_slot(slot)?, Slot::Record(_)) {
                                self.update_record(slot, v)?;
                            } else {
                                let Vm { heap, frames, .. } = self;
                                let frame = frame_mut(frames, slot.space)?;
                                let loc = frame.create_record(heap, region, v);
                                frame.slots[slot.index as usize] = Slot::Record(loc);
                            }
                        }
                        // An escaped binding is adopted, cleanup entry and
                        // all, instead of being copied.
                        VmValue::Record(id) => {
                            let frame = frame_mut(&mut self.frames, slot.space)?;
                            frame.slots[slot.index as usize] = Slot::Record(Loc::Heap(id));
                            frame.cleanup_records.push(id);
                        }
                        VmValue::List(id) => {
                            let frame = frame_mut(&mut self.frames, slot.space)?;
                            frame.slots[slot.index as usize] = Slot::List(id);
                            frame.cleanup_lists.push(id);
                        }
                        VmValue::Text(_) => {
                            return Err(Error::TypeMismatch { expected: "number" });
                        }
                    }
                }
                Op::Update(addr) => {
                    let value = self.pop()?;
                    match value {
                        VmValue::Num(v) => self.update_record(addr, v)?,
                        VmValue::Record(id) => {
                            let frame = frame_mut(&mut self.frames, addr.space)?;
                            frame.slots[addr.index as usize] = Slot::Record(Loc::Heap(id));
                            frame.cleanup_records.push(id);
                        }
                        VmValue::List(id) => {
                            let frame = frame_mut(&mut self.frames, addr.space)?;
                            frame.slots[addr.index as usize] = Slot::List(id);
                            frame.cleanup_lists.push(id);
                        }
                        VmValue::Text(_) => {
                            return Err(Error::TypeMismatch { expected: "number" });
                        }
                    }
                }

                Op::Add => self.binary(|l, r| l + r)?,
                Op::Sub => self.binary(|l, r| l - r)?,
                Op::Mul => self.binary(|l, r| l * r)?,
                Op::Div => self.binary(|l, r| l / r)?,
                Op::CmpEq => self.binary(|l, r| bool_num(l == r))?,
                Op::CmpNe => self.binary(|l, r| bool_num(l != r))?,
                Op::CmpLt => self.binary(|l, r| bool_num(l < r))?,
                Op::CmpLe => self.binary(|l, r| bool_num(l <= r))?,
                Op::CmpGt => self.binary(|l, r| bool_num(l > r))?,
                Op::CmpGe => self.binary(|l, r| bool_num(l >= r))?,
                Op::And => self.binary(|l, r| bool_num(l != 0.0 && r != 0.0))?,
                Op::Or => self.binary(|l, r| bool_num(l != 0.0 || r != 0.0))?,
                Op::Neg => {
                    let v = self.pop_num()?;
                    self.push(VmValue::Num(-v))?;
                }
                Op::Not => {
                    let v = self.pop_num()?;
                    self.push(VmValue::Num(bool_num(v == 0.0)))?;
                }

                Op::Jump(target) => ip = target as usize,
                Op::JumpIfFalse(target) => {
                    if self.pop_num()? == 0.0 {
                        ip = target as usize;
                    }
                }

                Op::Call { chunk: callee } => {
                    let arg = self.pop()?;
                    let target = program
                        .chunks
                        .get(callee as usize)
                        .ok_or(Error::Corrupt("chunk index out of range"))?;
                    trace!(chunk = callee, depth = self.frames.len(), "call");
                    let mut frame = Frame::new(target.slot_count);
                    frame.stack.push(arg);
                    self.frames.push(frame);
                    let returned = self.run_chunk(program, callee as usize);
                    let mut frame = self
                        .frames
                        .pop()
                        .ok_or(Error::Corrupt("activation stack underflow"))?;
                    let result = returned?
                        .or(frame.result.take())
                        .unwrap_or(VmValue::Num(0.0));
                    frame.teardown(&mut self.heap, &mut self.lists)?;
                    self.push(result)?;
                }
                Op::Return => {
                    let v = self.pop()?;
                    return Ok(Some(v));
                }
                Op::ReturnBinding(addr) => {
                    let slot = self.resolve_slot(addr)?;
                    let frame = frame_mut(&mut self.frames, addr.space)?;
                    return match slot {
                        Slot::Record(Loc::Heap(id)) => {
                            frame.disown_record(id);
                            Ok(Some(VmValue::Record(id)))
                        }
                        Slot::List(id) => {
                            frame.disown_list(id);
                            Ok(Some(VmValue::List(id)))
                        }
                        Slot::Record(Loc::Frame(_)) => {
                            Err(Error::Corrupt("frame record cannot escape"))
                        }
                        Slot::Pair(_) | Slot::Empty => {
                            Err(Error::Corrupt("returned slot holds no escapable binding"))
                        }
                    };
                }

                Op::Fixpoint { slot, body, name } => {
                    let binding = chunk
                        .names
                        .get(name as usize)
                        .ok_or(Error::Corrupt("name index out of range"))?;
                    self.resolve_fixpoint(program, slot, body, binding)?;
                }

                Op::Predicate {
                    kind,
                    slot,
                    has_target,
                } => {
                    let target = if has_target {
                        Some(self.pop_num()?)
                    } else {
                        None
                    };
                    let tv = self.record_copy(slot)?;
                    let holds = kind.evaluate(&tv, &self.cfg, target);
                    self.push(VmValue::Num(bool_num(holds)))?;
                }
                Op::Interrogate { kind, slot } => {
                    let tv = self.record_copy(slot)?;
                    // Who and Where lower to name and depth constants.
                    let v = tv.interrogate(kind).unwrap_or(0.0);
                    self.push(VmValue::Num(v))?;
                }
                Op::Strength => {
                    let v = self.ctx.framework_strength();
                    self.push(VmValue::Num(v))?;
                }

                Op::CreatePair { slot, a, b } => {
                    let av = self.record_copy(a)?.value();
                    let bv = self.record_copy(b)?.value();
                    let pair = PairSlot {
                        a,
                        b,
                        geometry: eigenscript_engine::EigenPair::observe(av, bv),
                    };
                    let frame = frame_mut(&mut self.frames, slot.space)?;
                    frame.slots[slot.index as usize] = Slot::Pair(pair);
                }
                Op::PairMetric { slot, kind } => {
                    let pair = self.refresh_pair(slot)?;
                    self.push(VmValue::Num(pair.geometry.metric(kind)))?;
                }
                Op::Equilibrium(slot) => {
                    let pair = self.refresh_pair(slot)?;
                    let holds = pair.geometry.equilibrium(&self.cfg);
                    self.push(VmValue::Num(bool_num(holds)))?;
                }

                Op::CreateList { slot, len } => {
                    let mut items = vec![0.0; len as usize];
                    for i in (0..len as usize).rev() {
                        items[i] = self.pop_num()?;
                    }
                    let id = self.lists.alloc(items);
                    let frame = frame_mut(&mut self.frames, slot.space)?;
                    frame.cleanup_lists.push(id);
                    frame.slots[slot.index as usize] = Slot::List(id);
                }
                Op::Append(addr) => {
                    let v = self.pop_num()?;
                    let id = self.list_id(addr)?;
                    self.lists.get_mut(id)?.push(v);
                }
                Op::IndexList(addr) => {
                    let index = self.pop_num()? as i64;
                    let id = self.list_id(addr)?;
                    let items = self.lists.get(id)?;
                    if index < 0 || index as usize >= items.len() {
                        return Err(Error::IndexOutOfBounds {
                            index,
                            len: items.len(),
                        });
                    }
                    let v = items[index as usize];
                    self.push(VmValue::Num(v))?;
                }
                Op::LenList(addr) => {
                    let id = self.list_id(addr)?;
                    let len = self.lists.get(id)?.len() as f64;
                    self.push(VmValue::Num(len))?;
                }

                Op::StashResult => {
                    let v = self.pop()?;
                    let frame = self
                        .frames
                        .last_mut()
                        .ok_or(Error::Corrupt("activation stack underflow"))?;
                    frame.result = Some(v);
                }
            }
        }
        Ok(None)
    }

    /// Re-run the body chunk against the binding's record until the
    /// convergence predicate holds or the driver reports divergence.
    fn resolve_fixpoint(
        &mut self,
        program: &CompiledProgram,
        slot: SlotAddr,
        body: u16,
        binding: &str,
    ) -> Result<()> {
        debug!(binding, "resolving self-referential definition");
        let mut driver = FixpointDriver::new(&self.cfg);
        loop {
            let value = self
                .run_chunk(program, body as usize)?
                .ok_or(Error::Corrupt("fixpoint body yielded nothing"))?
                .as_num(&self.heap)?;
            self.update_record(slot, value)?;
            let tv = self.record_copy(slot)?;
            let settled = predicate::converged(&tv, &self.cfg);
            match driver.note_step(binding, settled, &tv, &self.cfg)? {
                FixpointStatus::Settled => {
                    trace!(binding, iterations = driver.iterations(), "fixpoint resolved");
                    return Ok(());
                }
                FixpointStatus::Continue => {}
            }
        }
    }

    fn push(&mut self, value: VmValue) -> Result<()> {
        self.frames
            .last_mut()
            .ok_or(Error::Corrupt("activation stack underflow"))?
            .stack
            .push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<VmValue> {
        self.frames
            .last_mut()
            .ok_or(Error::Corrupt("activation stack underflow"))?
            .pop()
    }

    fn pop_num(&mut self) -> Result<f64> {
        let v = self.pop()?;
        v.as_num(&self.heap)
    }

    fn binary(&mut self, f: impl Fn(f64, f64) -> f64) -> Result<()> {
        let r = self.pop_num()?;
        let l = self.pop_num()?;
        self.push(VmValue::Num(f(l, r)))
    }

    fn frame(&self, space: AddrSpace) -> Result<&Frame> {
        let frame = match space {
            AddrSpace::Global => self.frames.first(),
            AddrSpace::Local => self.frames.last(),
        };
        frame.ok_or(Error::Corrupt("activation stack underflow"))
    }

    fn resolve_slot(&self, addr: SlotAddr) -> Result<Slot> {
        self.frame(addr.space)?
            .slots
            .get(addr.index as usize)
            .copied()
            .ok_or(Error::Corrupt("slot index out of range"))
    }

    fn record_copy(&self, addr: SlotAddr) -> Result<TrackedValue> {
        let loc = match self.resolve_slot(addr)? {
            Slot::Record(loc) => loc,
            Slot::Empty => return Err(Error::UnboundSlot),
            _ => return Err(Error::TypeMismatch { expected: "tracked value" }),
        };
        match loc {
            Loc::Heap(id) => Ok(*self.heap.get(id)?),
            Loc::Frame(i) => self
                .frame(addr.space)?
                .records
                .get(i as usize)
                .copied()
                .ok_or(Error::Corrupt("frame record out of range")),
        }
    }

    fn update_record(&mut self, addr: SlotAddr, value: f64) -> Result<()> {
        let loc = match self.resolve_slot(addr)? {
            Slot::Record(loc) => loc,
            Slot::Empty => return Err(Error::UnboundSlot),
            _ => return Err(Error::TypeMismatch { expected: "tracked value" }),
        };
        let Vm {
            cfg,
            ctx,
            heap,
            frames,
            ..
        } = self;
        let frame = frame_mut(frames, addr.space)?;
        let tv = record_mut(heap, frame, loc)?;
        tv.update(value, cfg, ctx);
        Ok(())
    }

    fn list_id(&self, addr: SlotAddr) -> Result<u32> {
        match self.resolve_slot(addr)? {
            Slot::List(id) => Ok(id),
            Slot::Empty => Err(Error::UnboundSlot),
            _ => Err(Error::TypeMismatch { expected: "list" }),
        }
    }

    /// Re-derive a pair's geometry from its records' live values and write
    /// the refreshed copy back.
    fn refresh_pair(&mut self, addr: SlotAddr) -> Result<PairSlot> {
        let mut pair = match self.resolve_slot(addr)? {
            Slot::Pair(pair) => pair,
            Slot::Empty => return Err(Error::UnboundSlot),
            _ => return Err(Error::TypeMismatch { expected: "pairing" }),
        };
        let av = self.record_copy(pair.a)?.value();
        let bv = self.record_copy(pair.b)?.value();
        pair.geometry.reobserve(av, bv);
        let frame = frame_mut(&mut self.frames, addr.space)?;
        frame.slots[addr.index as usize] = Slot::Pair(pair);
        Ok(pair)
    }
}

fn frame_mut(frames: &mut [Frame], space: AddrSpace) -> Result<&mut Frame> {
    let frame = match space {
        AddrSpace::Global => frames.first_mut(),
        AddrSpace::Local => frames.last_mut(),
    };
    frame.ok_or(Error::Corrupt("activation stack underflow"))
}

fn bool_num(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}
