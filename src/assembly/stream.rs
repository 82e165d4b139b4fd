//! The ordered, doubly-linked instruction sequence of a method body.
//!
//! Instructions live in an arena and are addressed by [`InstructionId`] handles that stay valid
//! until the instruction is removed. Removed slots are recycled; every slot carries a generation
//! that is bumped on release, so a stale handle never resolves to the slot's next occupant. A slot
//! whose generation is exhausted is retired instead of recycled. The stream keeps an ordered list of handles for positional
//! access and `previous`/`next` links on every node. Locating a target handle is a linear scan
//! of the order list; relinking its neighbours afterwards is constant time.
//!
//! Every mutation either succeeds with consistent links or fails leaving the stream unchanged.
//!
//! # Examples
//!
//! ```rust
//! use cilweave::assembly::{Instruction, InstructionStream, OpCode};
//!
//! let mut stream = InstructionStream::new();
//! let add = stream.push(Instruction::new(OpCode::Add)?)?;
//! let ret = stream.push(Instruction::new(OpCode::Ret)?)?;
//! stream.insert_before(add, Instruction::new(OpCode::Dup)?)?;
//!
//! assert_eq!(stream.len(), 3);
//! assert_eq!(stream.next(add), Some(ret));
//! assert!(stream.links_consistent());
//! # Ok::<(), cilweave::Error>(())
//! ```

use std::sync::atomic::{AtomicU32, Ordering};

use crate::{
    assembly::{Instruction, InstructionId},
    Error, Result,
};

static NEXT_STREAM_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone)]
struct Node {
    instruction: Instruction,
    previous: Option<u32>,
    next: Option<u32>,
}

/// An ordered sequence of instructions with stable handles.
#[derive(Debug)]
pub struct InstructionStream {
    id: u32,
    nodes: Vec<Option<Node>>,
    generations: Vec<u32>,
    free: Vec<u32>,
    order: Vec<u32>,
}

impl Default for InstructionStream {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionStream {
    /// Create an empty stream with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        InstructionStream {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            generations: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Identity stamped into every handle of this stream.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if there are no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns `true` if `id` names an instruction of this stream.
    #[must_use]
    pub fn contains(&self, id: InstructionId) -> bool {
        self.node(id).is_some()
    }

    /// The instruction behind `id`.
    #[must_use]
    pub fn get(&self, id: InstructionId) -> Option<&Instruction> {
        self.node(id).map(|node| &node.instruction)
    }

    /// The instruction behind `id`, mutably.
    pub fn get_mut(&mut self, id: InstructionId) -> Option<&mut Instruction> {
        if !self.contains(id) {
            return None;
        }
        self.nodes
            .get_mut(id.index as usize)
            .and_then(Option::as_mut)
            .map(|node| &mut node.instruction)
    }

    /// First instruction.
    #[must_use]
    pub fn first(&self) -> Option<InstructionId> {
        self.order.first().map(|index| self.handle(*index))
    }

    /// Last instruction.
    #[must_use]
    pub fn last(&self) -> Option<InstructionId> {
        self.order.last().map(|index| self.handle(*index))
    }

    /// Handle of the instruction at `position`.
    #[must_use]
    pub fn at(&self, position: usize) -> Option<InstructionId> {
        self.order.get(position).map(|index| self.handle(*index))
    }

    /// Position of `id`, found by a linear scan.
    #[must_use]
    pub fn position(&self, id: InstructionId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        self.order.iter().position(|index| *index == id.index)
    }

    /// The instruction following `id`.
    #[must_use]
    pub fn next(&self, id: InstructionId) -> Option<InstructionId> {
        self.node(id)
            .and_then(|node| node.next)
            .map(|index| self.handle(index))
    }

    /// The instruction preceding `id`.
    #[must_use]
    pub fn previous(&self, id: InstructionId) -> Option<InstructionId> {
        self.node(id)
            .and_then(|node| node.previous)
            .map(|index| self.handle(index))
    }

    /// Handles in stream order.
    pub fn ids(&self) -> impl Iterator<Item = InstructionId> + '_ {
        self.order.iter().map(|index| self.handle(*index))
    }

    /// Instructions in stream order.
    pub fn iter(&self) -> impl Iterator<Item = (InstructionId, &Instruction)> + '_ {
        self.order.iter().filter_map(|index| {
            self.nodes
                .get(*index as usize)
                .and_then(Option::as_ref)
                .map(|node| (self.handle(*index), &node.instruction))
        })
    }

    /// Append at the end.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the arena is exhausted.
    pub fn push(&mut self, instruction: Instruction) -> Result<InstructionId> {
        self.insert_at(self.order.len(), instruction)
    }

    /// Insert before `target`.
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotFound`] if `target` is not part of this stream.
    pub fn insert_before(
        &mut self,
        target: InstructionId,
        instruction: Instruction,
    ) -> Result<InstructionId> {
        let position = self.locate(target)?;
        self.insert_at(position, instruction)
    }

    /// Insert after `target`.
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotFound`] if `target` is not part of this stream.
    pub fn insert_after(
        &mut self,
        target: InstructionId,
        instruction: Instruction,
    ) -> Result<InstructionId> {
        let position = self.locate(target)?;
        self.insert_at(position + 1, instruction)
    }

    /// Replace `target` with `instruction`: insert after `target`, then remove `target`.
    ///
    /// Returns the new handle and the removed instruction.
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotFound`] if `target` is not part of this stream.
    pub fn replace(
        &mut self,
        target: InstructionId,
        instruction: Instruction,
    ) -> Result<(InstructionId, Instruction)> {
        let id = self.insert_after(target, instruction)?;
        let removed = self.remove(target)?;
        Ok((id, removed))
    }

    /// Remove `target` and hand it back with its links cleared.
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotFound`] if `target` is not part of this stream.
    pub fn remove(&mut self, target: InstructionId) -> Result<Instruction> {
        let position = self.locate(target)?;
        let Some(node) = self
            .nodes
            .get_mut(target.index as usize)
            .and_then(Option::take)
        else {
            return Err(Error::InstructionNotFound(target));
        };
        self.release(target.index);
        self.order.remove(position);

        if let Some(previous) = node.previous {
            self.link_next(previous, node.next);
        }
        if let Some(next) = node.next {
            self.link_previous(next, node.previous);
        }

        Ok(node.instruction)
    }

    /// Replace the instruction at `position`. The new node takes over the old node's links.
    ///
    /// Returns the new handle and the removed instruction.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if there is no instruction at `position`.
    pub fn set(
        &mut self,
        position: usize,
        instruction: Instruction,
    ) -> Result<(InstructionId, Instruction)> {
        let Some(old) = self.order.get(position).copied() else {
            return Err(out_of_bounds_error!());
        };
        let Some(node) = self.nodes.get_mut(old as usize).and_then(Option::take) else {
            return Err(out_of_bounds_error!());
        };
        self.release(old);

        let index = self.allocate(Node {
            instruction,
            previous: node.previous,
            next: node.next,
        })?;
        if let Some(previous) = node.previous {
            self.link_next(previous, Some(index));
        }
        if let Some(next) = node.next {
            self.link_previous(next, Some(index));
        }
        self.order[position] = index;

        Ok((self.handle(index), node.instruction))
    }

    /// Assign offsets from the encoded instruction sizes and return the total code size.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the code does not fit into 32-bit offsets; offsets of the
    /// instructions past that point are stale.
    pub fn layout(&mut self) -> Result<u32> {
        let mut offset = 0_u32;
        for index in &self.order {
            if let Some(node) = self.nodes.get_mut(*index as usize).and_then(Option::as_mut) {
                node.instruction.set_offset(offset);
                offset = advance(offset, node.instruction.size())?;
            }
        }

        tracing::trace!(instructions = self.order.len(), code_size = offset, "layout");
        Ok(offset)
    }

    /// Handle of the instruction starting at `offset`, as of the last layout pass.
    #[must_use]
    pub fn at_offset(&self, offset: u32) -> Option<InstructionId> {
        let position = self
            .order
            .binary_search_by_key(&offset, |index| {
                self.nodes
                    .get(*index as usize)
                    .and_then(Option::as_ref)
                    .map_or(u32::MAX, |node| node.instruction.offset())
            })
            .ok()?;
        self.at(position)
    }

    /// Check that the links of every node agree with the stream order.
    #[must_use]
    pub fn links_consistent(&self) -> bool {
        self.order.iter().enumerate().all(|(position, index)| {
            let Some(node) = self.nodes.get(*index as usize).and_then(Option::as_ref) else {
                return false;
            };

            let expected_previous = position.checked_sub(1).map(|p| self.order[p]);
            let expected_next = self.order.get(position + 1).copied();
            node.previous == expected_previous && node.next == expected_next
        }) && self.nodes.iter().flatten().count() == self.order.len()
    }

    fn handle(&self, index: u32) -> InstructionId {
        InstructionId {
            stream: self.id,
            index,
            generation: self.generations.get(index as usize).copied().unwrap_or(0),
        }
    }

    fn node(&self, id: InstructionId) -> Option<&Node> {
        if id.stream != self.id
            || self.generations.get(id.index as usize).copied() != Some(id.generation)
        {
            return None;
        }
        self.nodes.get(id.index as usize).and_then(Option::as_ref)
    }

    fn locate(&self, target: InstructionId) -> Result<usize> {
        self.position(target)
            .ok_or(Error::InstructionNotFound(target))
    }

    /// Store `node` in a recycled slot if one is free, else in a new one.
    fn allocate(&mut self, node: Node) -> Result<u32> {
        if let Some(index) = self.free.pop() {
            if let Some(slot) = self.nodes.get_mut(index as usize) {
                *slot = Some(node);
                return Ok(index);
            }
        }

        let index = u32::try_from(self.nodes.len())
            .map_err(|_| malformed_error!("Instruction arena exhausted"))?;
        self.nodes.push(Some(node));
        self.generations.push(0);
        Ok(index)
    }

    /// Invalidate handles to the emptied slot `index` and queue it for reuse.
    fn release(&mut self, index: u32) {
        let Some(generation) = self.generations.get_mut(index as usize) else {
            return;
        };
        if let Some(bumped) = generation.checked_add(1) {
            *generation = bumped;
            self.free.push(index);
        }
    }

    fn insert_at(&mut self, position: usize, instruction: Instruction) -> Result<InstructionId> {
        let previous = position.checked_sub(1).map(|p| self.order[p]);
        let next = self.order.get(position).copied();

        let index = self.allocate(Node {
            instruction,
            previous,
            next,
        })?;
        if let Some(previous) = previous {
            self.link_next(previous, Some(index));
        }
        if let Some(next) = next {
            self.link_previous(next, Some(index));
        }
        self.order.insert(position, index);

        Ok(self.handle(index))
    }

    fn link_next(&mut self, index: u32, next: Option<u32>) {
        if let Some(node) = self.nodes.get_mut(index as usize).and_then(Option::as_mut) {
            node.next = next;
        }
    }

    fn link_previous(&mut self, index: u32, previous: Option<u32>) {
        if let Some(node) = self.nodes.get_mut(index as usize).and_then(Option::as_mut) {
            node.previous = previous;
        }
    }
}

fn advance(offset: u32, size: u32) -> Result<u32> {
    offset
        .checked_add(size)
        .ok_or_else(|| malformed_error!("Code size exceeds 32-bit offsets at {:#X}", offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{OpCode, Operand};

    fn op(opcode: OpCode) -> Instruction {
        Instruction::new(opcode).unwrap()
    }

    fn opcodes(stream: &InstructionStream) -> Vec<OpCode> {
        stream
            .iter()
            .map(|(_, instruction)| instruction.opcode().unwrap())
            .collect()
    }

    #[test]
    fn append() {
        let mut stream = InstructionStream::new();
        assert!(stream.first().is_none());

        let first = stream.push(op(OpCode::Nop)).unwrap();
        assert_eq!(stream.first(), Some(first));
        assert_eq!(stream.last(), Some(first));
        assert_eq!(stream.previous(first), None);
        assert_eq!(stream.next(first), None);

        let second = stream.push(op(OpCode::Ret)).unwrap();
        assert_eq!(stream.next(first), Some(second));
        assert_eq!(stream.previous(second), Some(first));
        assert_eq!(stream.last(), Some(second));
        assert!(stream.links_consistent());
    }

    #[test]
    fn insert_before_first() {
        let mut stream = InstructionStream::new();
        let one = stream
            .push(Instruction::create(OpCode::LdcI4S, Operand::Int8(1)).unwrap())
            .unwrap();
        stream.push(op(OpCode::Add)).unwrap();
        stream.push(op(OpCode::Ret)).unwrap();

        let zero = stream
            .insert_before(one, Instruction::create(OpCode::LdcI4S, Operand::Int8(0)).unwrap())
            .unwrap();

        assert_eq!(
            opcodes(&stream),
            [OpCode::LdcI4S, OpCode::LdcI4S, OpCode::Add, OpCode::Ret]
        );
        assert_eq!(stream.first(), Some(zero));
        assert_eq!(stream.next(zero), Some(one));
        assert!(stream.links_consistent());

        assert_eq!(stream.layout().unwrap(), 6);
        let offsets: Vec<u32> = stream.iter().map(|(_, i)| i.offset()).collect();
        assert_eq!(offsets, [0, 2, 4, 5]);
        assert_eq!(stream.at_offset(4), stream.at(2));
        assert_eq!(stream.at_offset(3), None);
    }

    #[test]
    fn layout_offset_overflow() {
        assert_eq!(advance(4, 2).unwrap(), 6);
        assert_eq!(advance(u32::MAX - 5, 5).unwrap(), u32::MAX);
        assert!(matches!(
            advance(u32::MAX - 1, 5),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn mutations_keep_links() {
        let mut stream = InstructionStream::new();
        let a = stream.push(op(OpCode::Ldarg0)).unwrap();
        let b = stream.push(op(OpCode::Ldarg1)).unwrap();
        let c = stream.push(op(OpCode::Add)).unwrap();
        let d = stream.push(op(OpCode::Ret)).unwrap();

        let e = stream.insert_after(b, op(OpCode::Dup)).unwrap();
        assert!(stream.links_consistent());

        let removed = stream.remove(a).unwrap();
        assert_eq!(removed.opcode().unwrap(), OpCode::Ldarg0);
        assert_eq!(stream.first(), Some(b));
        assert!(stream.links_consistent());

        let (f, old) = stream.replace(c, op(OpCode::Sub)).unwrap();
        assert_eq!(old.opcode().unwrap(), OpCode::Add);
        assert!(!stream.contains(c));
        assert_eq!(stream.next(e), Some(f));
        assert_eq!(stream.previous(d), Some(f));
        assert!(stream.links_consistent());

        let (g, old) = stream.set(0, op(OpCode::Ldarg2)).unwrap();
        assert_eq!(old.opcode().unwrap(), OpCode::Ldarg1);
        assert_eq!(stream.first(), Some(g));
        assert_eq!(stream.next(g), Some(e));
        assert!(stream.get(b).is_none());
        assert!(stream.links_consistent());

        stream.remove(d).unwrap();
        assert_eq!(stream.last(), Some(f));
        assert!(stream.links_consistent());

        assert_eq!(
            opcodes(&stream),
            [OpCode::Ldarg2, OpCode::Dup, OpCode::Sub]
        );
    }

    #[test]
    fn absent_targets() {
        let mut stream = InstructionStream::new();
        let nop = stream.push(op(OpCode::Nop)).unwrap();
        stream.push(op(OpCode::Ret)).unwrap();
        stream.remove(nop).unwrap();

        assert!(matches!(
            stream.remove(nop),
            Err(Error::InstructionNotFound(id)) if id == nop
        ));
        assert!(stream.insert_before(nop, op(OpCode::Nop)).is_err());
        assert!(stream.replace(nop, op(OpCode::Nop)).is_err());
        assert_eq!(stream.len(), 1);

        let mut other = InstructionStream::new();
        let foreign = other.push(op(OpCode::Nop)).unwrap();
        assert!(stream.remove(foreign).is_err());
        assert!(stream.get(foreign).is_none());
        assert_eq!(stream.len(), 1);
        assert_eq!(other.len(), 1);

        assert!(matches!(
            stream.set(5, op(OpCode::Nop)),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(stream.links_consistent());
    }

    #[test]
    fn recycled_slots() {
        let mut stream = InstructionStream::new();
        let nop = stream.push(op(OpCode::Nop)).unwrap();
        let ret = stream.push(op(OpCode::Ret)).unwrap();
        stream.remove(nop).unwrap();

        let dup = stream.insert_before(ret, op(OpCode::Dup)).unwrap();
        assert_eq!(dup.index, nop.index);
        assert_ne!(dup, nop);
        assert!(!stream.contains(nop));
        assert!(stream.get(nop).is_none());
        assert_eq!(stream.position(nop), None);
        assert!(matches!(
            stream.insert_after(nop, op(OpCode::Nop)),
            Err(Error::InstructionNotFound(id)) if id == nop
        ));
        assert_eq!(stream.get(dup).unwrap().opcode().unwrap(), OpCode::Dup);

        let mut tail = ret;
        for _ in 0..1000 {
            stream.set(0, op(OpCode::Pop)).unwrap();
            let (id, _) = stream.replace(tail, op(OpCode::Ret)).unwrap();
            let removed = stream.remove(id).unwrap();
            tail = stream.push(removed).unwrap();
        }
        assert_eq!(stream.len(), 2);
        assert!(stream.nodes.len() <= 3);
        assert!(stream.links_consistent());
    }
}
