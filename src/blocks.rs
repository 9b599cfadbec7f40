//! Block inference: turn a flat, PC-annotated instruction stream back
//! into a `Kernel` of basic blocks. Two passes: the first collects
//! block start offsets (entry, fall-through after every branching or
//! EOT instruction, every branch target), the second distributes
//! instructions and resolves raw branch offsets to block ids.
//!
//! Running the inference over an already-inferred kernel's flattened
//! stream reproduces the same block boundaries.

use std::collections::{BTreeSet, HashMap};

use crate::diag::{DiagSink, Loc, TooManyErrors};
use crate::ir::{Instruction, InstOpts, Kernel, LabelTarget, Operand};
use crate::ops::{self, Op};

/// Absolute byte offset a branch instruction targets. JIP values are
/// relative to the instruction start, except `calla` which is absolute.
fn target_of(inst: &Instruction) -> Option<i64> {
    let spec = ops::spec(inst.op);
    if !spec.is_branching() {
        return None;
    }
    for src in &inst.srcs {
        if let Operand::Label(LabelTarget::Offset(rel)) = src {
            return Some(if inst.op == Op::Calla {
                *rel as i64
            } else {
                inst.pc as i64 + *rel as i64
            });
        }
    }
    None
}

/// Whether the instruction ends a block.
fn ends_block(inst: &Instruction) -> bool {
    ops::spec(inst.op).is_branching() || inst.opts.contains(InstOpts::EOT)
}

pub fn infer_blocks(
    instrs: Vec<Instruction>,
    total_len: u32,
    sink: &mut DiagSink,
) -> Result<Kernel, TooManyErrors> {
    let mut inst_starts: BTreeSet<u32> = BTreeSet::new();
    for inst in &instrs {
        inst_starts.insert(inst.pc);
    }

    // pass 1: block start offsets
    let mut starts: BTreeSet<u32> = BTreeSet::new();
    starts.insert(0);
    for inst in &instrs {
        if ends_block(inst) {
            starts.insert(inst.pc + inst.encoded_len() as u32);
        }
        if let Some(t) = target_of(inst) {
            if t < 0 || t > total_len as i64 {
                sink.error(
                    Loc::Pc(inst.pc),
                    format!("branch target out of range: {:#x}", t),
                )?;
            } else if t < total_len as i64 && !inst_starts.contains(&(t as u32)) {
                sink.error(
                    Loc::Pc(inst.pc),
                    format!("branch target {:#x} is not an instruction boundary", t),
                )?;
            } else {
                starts.insert(t as u32);
            }
        }
    }
    starts.retain(|&s| s <= total_len);

    // pass 2: build blocks, place instructions, resolve targets
    let mut kernel = Kernel::new();
    let mut by_start: HashMap<u32, crate::ir::BlockId> = HashMap::new();
    for &s in &starts {
        let id = kernel.add_block(None);
        kernel.block_mut(id).offset = s;
        by_start.insert(s, id);
    }
    for mut inst in instrs {
        let &start = starts.range(..=inst.pc).next_back().expect("entry block at 0");
        for src in &mut inst.srcs {
            if let Operand::Label(LabelTarget::Offset(rel)) = *src {
                let abs = if inst.op == Op::Calla {
                    rel as i64
                } else {
                    inst.pc as i64 + rel as i64
                };
                if abs >= 0 {
                    if let Some(&id) = by_start.get(&(abs as u32)) {
                        *src = Operand::Label(LabelTarget::Block(id));
                    }
                }
            }
        }
        inst.id = kernel.next_inst_id();
        let blk = by_start[&start];
        kernel.block_mut(blk).instrs.push(inst);
    }
    Ok(kernel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::DEFAULT_MAX_ERRORS;
    use crate::ir::BlockId;
    use pretty_assertions::assert_eq;

    fn inst(op: Op, pc: u32) -> Instruction {
        let mut i = Instruction::new(op);
        i.pc = pc;
        i
    }

    fn branch(op: Op, pc: u32, rel: i32) -> Instruction {
        let mut i = inst(op, pc);
        i.srcs.push(Operand::Label(LabelTarget::Offset(rel)));
        i
    }

    fn starts_of(k: &Kernel) -> Vec<u32> {
        k.blocks.iter().filter(|b| !b.instrs.is_empty() || b.offset == 0).map(|b| b.offset).collect()
    }

    #[test]
    fn straight_line_is_one_block() {
        let mut sink = DiagSink::new(DEFAULT_MAX_ERRORS);
        let k = infer_blocks(
            vec![inst(Op::Mov, 0), inst(Op::Add, 16), inst(Op::Nop, 32)],
            48,
            &mut sink,
        )
        .unwrap();
        assert!(!sink.has_errors());
        assert_eq!(starts_of(&k), vec![0]);
        assert_eq!(k.block(BlockId(0)).instrs.len(), 3);
    }

    #[test]
    fn branch_splits_and_resolves() {
        // 0: jmpi +32 (targets pc 32); 16: add; 32: nop
        let mut sink = DiagSink::new(DEFAULT_MAX_ERRORS);
        let k = infer_blocks(
            vec![branch(Op::Jmpi, 0, 32), inst(Op::Add, 16), inst(Op::Nop, 32)],
            48,
            &mut sink,
        )
        .unwrap();
        assert!(!sink.has_errors());
        // blocks at 0 (jmpi), 16 (fall-through), 32 (target)
        let offs: Vec<u32> = k.blocks.iter().map(|b| b.offset).collect();
        assert_eq!(offs, vec![0, 16, 32]);
        let Operand::Label(LabelTarget::Block(id)) = k.block(BlockId(0)).instrs[0].srcs[0] else {
            panic!("target not resolved");
        };
        assert_eq!(k.block(id).offset, 32);
    }

    #[test]
    fn calla_is_absolute() {
        let mut sink = DiagSink::new(DEFAULT_MAX_ERRORS);
        let k = infer_blocks(
            vec![inst(Op::Mov, 0), branch(Op::Calla, 16, 48), inst(Op::Nop, 48)],
            64,
            &mut sink,
        )
        .unwrap();
        assert!(!sink.has_errors());
        let calla = &k.blocks.iter().flat_map(|b| &b.instrs).nth(1).unwrap();
        let Operand::Label(LabelTarget::Block(id)) = calla.srcs[0] else {
            panic!("target not resolved");
        };
        assert_eq!(k.block(id).offset, 48);
    }

    #[test]
    fn out_of_range_target_is_reported() {
        let mut sink = DiagSink::new(DEFAULT_MAX_ERRORS);
        let _ = infer_blocks(vec![branch(Op::Jmpi, 0, -64)], 16, &mut sink).unwrap();
        assert!(sink.has_errors());
        assert!(sink.diags()[0].message.contains("out of range"));
    }

    #[test]
    fn misaligned_target_is_reported() {
        let mut sink = DiagSink::new(DEFAULT_MAX_ERRORS);
        let _ = infer_blocks(
            vec![branch(Op::Jmpi, 0, 24), inst(Op::Nop, 16), inst(Op::Nop, 32)],
            48,
            &mut sink,
        )
        .unwrap();
        assert!(sink.has_errors());
        assert!(sink.diags()[0].message.contains("boundary"));
    }

    #[test]
    fn eot_ends_a_block() {
        let mut send = inst(Op::Send, 0);
        send.opts |= InstOpts::EOT;
        let mut sink = DiagSink::new(DEFAULT_MAX_ERRORS);
        let k = infer_blocks(vec![send, inst(Op::Nop, 16)], 32, &mut sink).unwrap();
        let offs: Vec<u32> = k.blocks.iter().map(|b| b.offset).collect();
        assert_eq!(offs, vec![0, 16]);
    }

    #[test]
    fn inference_is_idempotent() {
        let mut sink = DiagSink::new(DEFAULT_MAX_ERRORS);
        let instrs = vec![branch(Op::Jmpi, 0, 32), inst(Op::Add, 16), inst(Op::Nop, 32)];
        let k1 = infer_blocks(instrs, 48, &mut sink).unwrap();
        // flatten with targets lowered back to raw offsets, re-infer
        let mut flat: Vec<Instruction> = k1.blocks.iter().flat_map(|b| b.instrs.clone()).collect();
        for inst in &mut flat {
            for src in &mut inst.srcs {
                if let Operand::Label(LabelTarget::Block(id)) = *src {
                    let rel = k1.block(id).offset as i64 - inst.pc as i64;
                    *src = Operand::Label(LabelTarget::Offset(rel as i32));
                }
            }
        }
        let k2 = infer_blocks(flat, 48, &mut sink).unwrap();
        let o1: Vec<u32> = k1.blocks.iter().map(|b| b.offset).collect();
        let o2: Vec<u32> = k2.blocks.iter().map(|b| b.offset).collect();
        assert_eq!(o1, o2);
        assert!(!sink.has_errors());
    }
}
