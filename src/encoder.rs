//! Two-phase encoder: a serial emit pass packs every instruction into
//! its binary record at a provisional PC and registers a backpatch for
//! each label operand; once all block offsets are settled the patch
//! pass writes the final branch deltas. Compaction is attempted during
//! emit, so later PCs already account for shrunken records.

use tracing::debug;

use crate::compact;
use crate::diag::{DiagSink, Diagnostic, Loc, DEFAULT_MAX_ERRORS};
use crate::ir::{
    HorzStride, Instruction, InstOpts, Kernel, LabelTarget, Operand, Platform, RegClass, Region,
    SendDesc, Type,
};
use crate::layout::{self, Field, MInst, FILE_ARF, FILE_GRF, FILE_IMM};
use crate::ops::{self, Op, OpClass};

#[derive(Debug, Clone)]
pub struct EncodeOpts {
    /// Try to compact every eligible instruction, not only those marked
    /// `{Compacted}`.
    pub auto_compact: bool,
    pub max_errors: usize,
}

impl Default for EncodeOpts {
    fn default() -> Self {
        EncodeOpts { auto_compact: false, max_errors: DEFAULT_MAX_ERRORS }
    }
}

#[derive(Debug)]
pub struct EncodeResult {
    /// Present only when no error was recorded.
    pub bytes: Option<Vec<u8>>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Per-slot regular-form source fields.
struct SrcSlot {
    ty: Field,
    file: Field,
    smod: Field,
    addr_mode: Field,
    reg: Field,
    sub: Field,
    addr_sub: Field,
    addr_off: Field,
    vs: Field,
    w: Field,
    hs: Field,
}

const SRC0_SLOT: SrcSlot = SrcSlot {
    ty: layout::SRC0_TYPE,
    file: layout::SRC0_FILE,
    smod: layout::SRC0_MOD,
    addr_mode: layout::SRC0_ADDR_MODE,
    reg: layout::SRC0_REG,
    sub: layout::SRC0_SUB,
    addr_sub: layout::SRC0_ADDR_SUB,
    addr_off: layout::SRC0_ADDR_OFF,
    vs: layout::SRC0_VS,
    w: layout::SRC0_W,
    hs: layout::SRC0_HS,
};

const SRC1_SLOT: SrcSlot = SrcSlot {
    ty: layout::SRC1_TYPE,
    file: layout::SRC1_FILE,
    smod: layout::SRC1_MOD,
    addr_mode: layout::SRC1_ADDR_MODE,
    reg: layout::SRC1_REG,
    sub: layout::SRC1_SUB,
    addr_sub: layout::SRC1_ADDR_SUB,
    addr_off: layout::SRC1_ADDR_OFF,
    vs: layout::SRC1_VS,
    w: layout::SRC1_W,
    hs: layout::SRC1_HS,
};

struct Record {
    mi: MInst,
    len: usize,
    pc: u32,
    /// Branch backpatch: target block, plus whether the delta is
    /// absolute (`calla`).
    patch: Option<(crate::ir::BlockId, bool)>,
}

pub fn encode_kernel(kernel: &mut Kernel, platform: Platform, opts: &EncodeOpts) -> EncodeResult {
    let mut sink = DiagSink::new(opts.max_errors);
    let mut records: Vec<Record> = Vec::with_capacity(kernel.instruction_count());
    let mut pc: u32 = 0;
    let mut aborted = false;

    'emit: for bi in 0..kernel.blocks.len() {
        kernel.blocks[bi].offset = pc;
        for ii in 0..kernel.blocks[bi].instrs.len() {
            let inst = &mut kernel.blocks[bi].instrs[ii];
            inst.pc = pc;
            let enc = Encoder { platform, pc };
            let (mut mi, patch, encoded) = match enc.encode(inst, &mut sink) {
                Ok((mi, patch)) => (mi, patch, true),
                Err(Stop::Recorded) => {
                    // keep sizing stable so later PCs stay meaningful
                    (MInst::new(), None, false)
                }
                Err(Stop::TooMany) => {
                    aborted = true;
                    break 'emit;
                }
            };
            let mut len = 16;
            let mandated = inst.opts.contains(InstOpts::COMPACTED);
            let wanted = mandated || opts.auto_compact;
            if encoded && wanted && !inst.opts.contains(InstOpts::NO_COMPACT) {
                match compact_eligibility(inst) {
                    Ok(()) => match compact::try_compact(&mi) {
                        Ok(cm) => {
                            mi = cm;
                            len = 8;
                            inst.opts |= InstOpts::COMPACTED;
                        }
                        Err(miss) if mandated => {
                            if sink.error(Loc::Pc(pc), miss.to_string()).is_err() {
                                aborted = true;
                                break 'emit;
                            }
                        }
                        Err(_) => {}
                    },
                    Err(why) if mandated => {
                        if sink
                            .error(Loc::Pc(pc), format!("cannot compact: {}", why))
                            .is_err()
                        {
                            aborted = true;
                            break 'emit;
                        }
                    }
                    Err(_) => {}
                }
            }
            records.push(Record { mi, len, pc, patch });
            pc += len as u32;
        }
    }
    debug!(bytes = pc, instructions = records.len(), "emit pass done");

    // patch pass: all block offsets are final now
    for rec in &mut records {
        if let Some((target, absolute)) = rec.patch {
            let dest = kernel.block(target).offset;
            let jip = if absolute {
                dest as i64
            } else {
                dest as i64 - rec.pc as i64
            };
            rec.mi.set(layout::JIP, (jip as i32) as u32 as u64);
        }
    }

    if sink.has_errors() || aborted {
        return EncodeResult { bytes: None, diagnostics: sink.into_vec() };
    }
    let mut bytes = Vec::with_capacity(pc as usize);
    for rec in &records {
        bytes.extend_from_slice(&rec.mi.bytes[..rec.len]);
    }
    EncodeResult { bytes: Some(bytes), diagnostics: sink.into_vec() }
}

/// Categorical compaction preconditions, checked on the IR before the
/// table lookups run.
fn compact_eligibility(inst: &Instruction) -> Result<(), &'static str> {
    let spec = ops::spec(inst.op);
    if spec.is_branching() {
        return Err("branch instructions have no compact form");
    }
    if spec.is_send() {
        return Err("send instructions have no compact form");
    }
    if spec.class == OpClass::Ternary {
        return Err("ternary instructions have no compact form");
    }
    for op in inst.dst.iter().chain(inst.srcs.iter()) {
        match op {
            Operand::Imm(_) => return Err("immediate operands cannot be compacted"),
            Operand::Indirect { .. } => return Err("indirect operands cannot be compacted"),
            Operand::Macro { .. } => return Err("macro operands cannot be compacted"),
            _ => {}
        }
    }
    Ok(())
}

enum Stop {
    /// A diagnostic was recorded; the caller substitutes a blank record.
    Recorded,
    TooMany,
}

struct Encoder {
    platform: Platform,
    pc: u32,
}

impl Encoder {
    fn err(&self, sink: &mut DiagSink, msg: impl Into<String>) -> Stop {
        match sink.error(Loc::Pc(self.pc), msg) {
            Ok(()) => Stop::Recorded,
            Err(_) => Stop::TooMany,
        }
    }

    fn encode(
        &self,
        inst: &Instruction,
        sink: &mut DiagSink,
    ) -> Result<(MInst, Option<(crate::ir::BlockId, bool)>), Stop> {
        let spec = ops::spec(inst.op);
        let mut mi = MInst::new();

        // DW0 control word
        mi.set(layout::OPCODE, spec.code as u64);
        mi.set(layout::BRANCH_CTRL, inst.branch_ctrl as u64);
        mi.set(layout::MASK_CTRL, inst.mask_ctrl as u64);
        if let Some(p) = inst.pred {
            mi.set(layout::PRED_CTRL, p.ctrl.code() as u64);
            mi.set(layout::PRED_INV, p.inverted as u64);
        }
        mi.set(layout::FLAG_REG, inst.flag.reg as u64);
        mi.set(layout::FLAG_SUB, inst.flag.sub as u64);
        if spec.is_send() {
            mi.set(layout::SEND_EOT, inst.opts.contains(InstOpts::EOT) as u64);
        } else if let Some(f) = inst.math_fn {
            // math stores its subfunction in the CondMod slot
            mi.set(layout::COND_MOD, f.code() as u64);
        } else {
            mi.set(layout::COND_MOD, inst.cond_mod.code() as u64);
        }
        mi.set(layout::EXEC_SIZE, exec_log2(inst.exec_size));
        mi.set(layout::CHAN_OFF, (inst.chan_off / 4) as u64);
        mi.set(layout::SATURATE, inst.saturate as u64);
        mi.set(layout::ATOMIC, inst.opts.contains(InstOpts::ATOMIC) as u64);
        mi.set(layout::SWITCH, inst.opts.contains(InstOpts::SWITCH) as u64);

        let patch = match spec.class {
            OpClass::Branch => self.encode_branch(inst, &mut mi, sink)?,
            OpClass::Send => {
                self.encode_send(inst, &mut mi, sink)?;
                None
            }
            OpClass::Ternary => {
                self.encode_ternary(inst, &mut mi, sink)?;
                None
            }
            _ => {
                self.encode_regular(inst, &mut mi, sink)?;
                None
            }
        };
        Ok((mi, patch))
    }

    fn encode_regular(
        &self,
        inst: &Instruction,
        mi: &mut MInst,
        sink: &mut DiagSink,
    ) -> Result<(), Stop> {
        if let Some(dst) = &inst.dst {
            self.encode_dst(dst, mi, sink)?;
        }
        // immediates are position-restricted by the overlay they use
        let n = inst.srcs.len();
        for (i, src) in inst.srcs.iter().enumerate() {
            let slot = if i == 0 { &SRC0_SLOT } else { &SRC1_SLOT };
            match src {
                Operand::Imm(imm) => {
                    if imm.is_wide() {
                        if i != 0 || n != 1 {
                            return Err(self.err(
                                sink,
                                "64-bit immediates fit only the sole source of a unary operation",
                            ));
                        }
                        mi.set(slot.ty, imm.ty().code() as u64);
                        mi.set(slot.file, FILE_IMM);
                        mi.set(layout::IMM64_LO, imm.bits() & 0xFFFF_FFFF);
                        mi.set(layout::IMM64_HI, imm.bits() >> 32);
                    } else {
                        let ok_slot = (i == 0 && n == 1) || (i == 1 && n == 2);
                        if !ok_slot {
                            return Err(self.err(
                                sink,
                                "an immediate must be the last source operand",
                            ));
                        }
                        mi.set(slot.ty, imm.ty().code() as u64);
                        mi.set(slot.file, FILE_IMM);
                        mi.set(layout::IMM32, imm.bits() & 0xFFFF_FFFF);
                    }
                }
                _ => self.encode_src(src, slot, mi, sink)?,
            }
        }
        Ok(())
    }

    fn encode_dst(&self, dst: &Operand, mi: &mut MInst, sink: &mut DiagSink) -> Result<(), Stop> {
        mi.set(layout::DST_TYPE, dst.ty().code() as u64);
        mi.set(layout::DST_HS, hs_code(dst.region()));
        match dst {
            Operand::Direct { class, reg, sub, .. } => {
                mi.set(layout::DST_FILE, file_of(*class));
                mi.set(layout::DST_REG, reg_byte(*class, *reg));
                mi.set(layout::DST_SUB, *sub as u64);
            }
            Operand::Macro { class, reg, acc, .. } => {
                mi.set(layout::DST_FILE, file_of(*class));
                mi.set(layout::DST_REG, reg_byte(*class, *reg));
                mi.set(layout::DST_SUB, acc.code() as u64);
            }
            Operand::Indirect { addr_sub, offset, .. } => {
                mi.set(layout::DST_FILE, FILE_GRF);
                mi.set(layout::DST_ADDR_MODE, 1);
                mi.set(layout::DST_ADDR_SUB, *addr_sub as u64);
                mi.set(layout::DST_ADDR_OFF, (*offset as u16 & 0x1FF) as u64);
            }
            Operand::Imm(_) | Operand::Label(_) => {
                return Err(self.err(sink, "destination must be a register"));
            }
        }
        Ok(())
    }

    fn encode_src(
        &self,
        src: &Operand,
        slot: &SrcSlot,
        mi: &mut MInst,
        sink: &mut DiagSink,
    ) -> Result<(), Stop> {
        mi.set(slot.ty, src.ty().code() as u64);
        mi.set(slot.smod, src.src_mod().code() as u64);
        let r = src.region();
        mi.set(slot.vs, vs_code(r));
        mi.set(slot.w, w_code(r));
        mi.set(slot.hs, hs_code(r));
        match src {
            Operand::Direct { class, reg, sub, .. } => {
                mi.set(slot.file, file_of(*class));
                mi.set(slot.reg, reg_byte(*class, *reg));
                mi.set(slot.sub, *sub as u64);
            }
            Operand::Macro { class, reg, acc, .. } => {
                mi.set(slot.file, file_of(*class));
                mi.set(slot.reg, reg_byte(*class, *reg));
                mi.set(slot.sub, acc.code() as u64);
            }
            Operand::Indirect { addr_sub, offset, .. } => {
                mi.set(slot.file, FILE_GRF);
                mi.set(slot.addr_mode, 1);
                mi.set(slot.addr_sub, *addr_sub as u64);
                mi.set(slot.addr_off, (*offset as u16 & 0x1FF) as u64);
            }
            Operand::Label(_) => {
                return Err(self.err(sink, "label operand outside a branch instruction"));
            }
            Operand::Imm(_) => unreachable!("immediates handled by the caller"),
        }
        Ok(())
    }

    fn encode_branch(
        &self,
        inst: &Instruction,
        mi: &mut MInst,
        sink: &mut DiagSink,
    ) -> Result<Option<(crate::ir::BlockId, bool)>, Stop> {
        let absolute = inst.op == Op::Calla;
        mi.set(layout::SRC0_TYPE, Type::D.code() as u64);
        match inst.srcs.first() {
            Some(Operand::Label(LabelTarget::Block(id))) => Ok(Some((*id, absolute))),
            Some(Operand::Label(LabelTarget::Offset(off))) => {
                mi.set(layout::JIP, (*off as u32) as u64);
                Ok(None)
            }
            _ => Err(self.err(sink, "branch instruction requires a label operand")),
        }
    }

    fn encode_send(
        &self,
        inst: &Instruction,
        mi: &mut MInst,
        sink: &mut DiagSink,
    ) -> Result<(), Stop> {
        if let Some(dst) = &inst.dst {
            self.encode_dst(dst, mi, sink)?;
        }
        match inst.srcs.first() {
            Some(src @ (Operand::Direct { .. } | Operand::Macro { .. })) => {
                self.encode_src(src, &SRC0_SLOT, mi, sink)?;
            }
            _ => return Err(self.err(sink, "send payload must be a direct register")),
        }
        match inst.ex_desc {
            Some(SendDesc::Imm(ex)) => {
                mi.set(layout::SEND_SFID, (ex & 0xF) as u64);
            }
            Some(SendDesc::Reg { .. }) => {
                return Err(self.err(sink, "register extended descriptors are not encodable"));
            }
            None => return Err(self.err(sink, "send requires an extended descriptor")),
        }
        match inst.desc {
            Some(SendDesc::Imm(d)) => mi.set(layout::SEND_DESC, d as u64),
            Some(SendDesc::Reg { .. }) => {
                return Err(self.err(sink, "register message descriptors are not encodable"));
            }
            None => return Err(self.err(sink, "send requires a message descriptor")),
        }
        Ok(())
    }

    fn encode_ternary(
        &self,
        inst: &Instruction,
        mi: &mut MInst,
        sink: &mut DiagSink,
    ) -> Result<(), Stop> {
        if let Some(dst) = &inst.dst {
            self.encode_dst(dst, mi, sink)?;
        }
        // one shared source type
        let shared = inst.srcs.first().map(|s| s.ty());
        if inst.srcs.iter().any(|s| Some(s.ty()) != shared) {
            return Err(self.err(sink, "ternary sources must share one type"));
        }
        mi.set(layout::SRC0_TYPE, shared.unwrap_or(Type::Invalid).code() as u64);
        for (i, src) in inst.srcs.iter().enumerate() {
            let (reg_f, sub_f, mod_f) = match i {
                0 => (layout::SRC0_REG, layout::SRC0_SUB, layout::SRC0_MOD),
                1 => (layout::SRC1_REG, layout::SRC1_SUB, layout::TERN_SRC1_MOD),
                _ => (layout::TERN_SRC2_REG, layout::TERN_SRC2_SUB, layout::TERN_SRC2_MOD),
            };
            let (class, reg, subv) = match src {
                Operand::Direct { class, reg, sub, .. } => (*class, *reg, *sub as u64),
                Operand::Macro { class, reg, acc, .. } => (*class, *reg, acc.code() as u64),
                _ => {
                    return Err(self.err(
                        sink,
                        "ternary sources must be direct registers",
                    ));
                }
            };
            if class != RegClass::Grf && class != RegClass::Acc {
                return Err(self.err(sink, "ternary sources must be GRF or accumulator"));
            }
            mi.set(reg_f, reg_byte(class, reg));
            mi.set(sub_f, subv);
            mi.set(mod_f, src.src_mod().code() as u64);
            let r = src.region();
            match i {
                0 => {
                    mi.set(layout::SRC0_VS, vs_code(r));
                    mi.set(layout::SRC0_HS, hs_code(r));
                }
                1 => {
                    mi.set(layout::SRC1_VS, vs_code(r));
                    mi.set(layout::TERN_SRC1_HS, hs_code(r));
                }
                _ => mi.set(layout::TERN_SRC2_HS, hs_code(r)),
            }
        }
        let _ = self.platform;
        Ok(())
    }
}

fn exec_log2(exec: u8) -> u64 {
    (exec.max(1) as u64).trailing_zeros() as u64
}

fn file_of(class: RegClass) -> u64 {
    if class == RegClass::Grf {
        FILE_GRF
    } else {
        FILE_ARF
    }
}

/// ARF registers encode their class in the high nibble of the register
/// byte; GRF numbers pass through.
pub fn reg_byte(class: RegClass, reg: u8) -> u64 {
    if class == RegClass::Grf {
        reg as u64
    } else {
        ((class.arf_nibble() << 4) | (reg as u32 & 0xF)) as u64
    }
}

fn vs_code(r: Region) -> u64 {
    r.vs.code() as u64
}

fn w_code(r: Region) -> u64 {
    r.w.code() as u64
}

fn hs_code(r: Region) -> u64 {
    // the sentinel region writes a zero stride
    if r.hs == HorzStride::Invalid {
        0
    } else {
        r.hs.code() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_kernel, ParseOpts};
    use pretty_assertions::assert_eq;

    fn encode(src: &str) -> Vec<u8> {
        let mut k = parse_kernel(src, Platform::Gen9, &ParseOpts::default())
            .kernel
            .expect("parse");
        let r = encode_kernel(&mut k, Platform::Gen9, &EncodeOpts::default());
        assert!(r.diagnostics.is_empty(), "diags: {:?}", r.diagnostics);
        r.bytes.expect("encode")
    }

    fn first_record(bytes: &[u8]) -> MInst {
        let mut b = [0u8; 16];
        b[..bytes.len().min(16)].copy_from_slice(&bytes[..bytes.len().min(16)]);
        MInst::from_bytes(b)
    }

    #[test]
    fn mov_fields_land() {
        let bytes = encode("mov (8|M0) r1.0<1>:f r2.0<8;8,1>:f\n");
        assert_eq!(bytes.len(), 16);
        let mi = first_record(&bytes);
        assert_eq!(mi.get(layout::OPCODE), 0x01);
        assert_eq!(mi.get(layout::EXEC_SIZE), 3);
        assert_eq!(mi.get(layout::DST_REG), 1);
        assert_eq!(mi.get(layout::DST_HS), 1);
        assert_eq!(mi.get(layout::SRC0_REG), 2);
        assert_eq!(mi.get(layout::SRC0_VS), 4);
        assert_eq!(mi.get(layout::SRC0_W), 3);
        assert!(!mi.is_compact());
    }

    #[test]
    fn imm32_occupies_last_word() {
        let bytes = encode("add (8|M0) r1.0:d r2.0:d 7:d\n");
        let mi = first_record(&bytes);
        assert_eq!(mi.get(layout::SRC1_FILE), FILE_IMM);
        assert_eq!(mi.get(layout::IMM32), 7);
    }

    #[test]
    fn imm64_spans_two_words() {
        let bytes = encode("mov (1|M0) r1.0:df 0x123456789ABCDEF0:df\n");
        let mi = first_record(&bytes);
        assert_eq!(mi.get(layout::SRC0_FILE), FILE_IMM);
        assert_eq!(mi.get(layout::IMM64_LO), 0x9ABC_DEF0);
        assert_eq!(mi.get(layout::IMM64_HI), 0x1234_5678);
    }

    #[test]
    fn wide_imm_rejected_on_binary() {
        let mut k = parse_kernel(
            "add (1|M0) r1.0:q r2.0:q 0x123456789:q\n",
            Platform::Gen9,
            &ParseOpts::default(),
        )
        .kernel
        .expect("parse");
        let r = encode_kernel(&mut k, Platform::Gen9, &EncodeOpts::default());
        assert!(r.bytes.is_none());
        assert!(r.diagnostics.iter().any(|d| d.message.contains("64-bit imm")));
    }

    #[test]
    fn forward_branch_backpatched() {
        let bytes = encode("jmpi (1|M0) SKIP\nadd (8|M0) r1.0:f r2.0:f r3.0:f\nSKIP:\nnop\n");
        assert_eq!(bytes.len(), 48);
        let mi = first_record(&bytes);
        // jmpi at 0, target at 32, relative delta
        assert_eq!(mi.get(layout::JIP) as u32, 32);
    }

    #[test]
    fn backward_branch_is_negative() {
        let bytes = encode("TOP:\nadd (8|M0) r1.0:f r2.0:f r3.0:f\nwhile (8|M0) TOP\n");
        let w = MInst::from_bytes(bytes[16..32].try_into().unwrap());
        assert_eq!(mi_jip(&w), -16);
    }

    fn mi_jip(mi: &MInst) -> i32 {
        mi.get(layout::JIP) as u32 as i32
    }

    #[test]
    fn calla_encodes_absolute() {
        let bytes = encode("nop\ncalla (1|M0) TGT\nTGT:\nnop\n");
        let c = MInst::from_bytes(bytes[16..32].try_into().unwrap());
        assert_eq!(mi_jip(&c), 32);
    }

    #[test]
    fn send_descriptor_fields() {
        let bytes = encode("send (8|M0) r5 r10 0x5 0x140B5000 {EOT}\n");
        let mi = first_record(&bytes);
        assert_eq!(mi.get(layout::SEND_SFID), 0x5);
        assert_eq!(mi.get(layout::SEND_DESC), 0x140B_5000);
        assert_eq!(mi.get(layout::SEND_EOT), 1);
    }

    #[test]
    fn register_descriptor_is_fatal() {
        let mut k = parse_kernel(
            "send (8|M0) r5 r10 0x5 a0.0\n",
            Platform::Gen9,
            &ParseOpts::default(),
        )
        .kernel
        .expect("parse");
        let r = encode_kernel(&mut k, Platform::Gen9, &EncodeOpts::default());
        assert!(r.bytes.is_none());
        assert!(r.diagnostics.iter().any(|d| d.message.contains("not encodable")));
    }

    #[test]
    fn auto_compaction_shrinks_and_marks() {
        let src = "add (8|M0) r1.0<1>:f r2.0<8;8,1>:f r3.0<8;8,1>:f\n";
        let mut k = parse_kernel(src, Platform::Gen9, &ParseOpts::default()).kernel.unwrap();
        let r = encode_kernel(
            &mut k,
            Platform::Gen9,
            &EncodeOpts { auto_compact: true, ..Default::default() },
        );
        let bytes = r.bytes.expect("encode");
        assert_eq!(bytes.len(), 8);
        let inst = k.instructions().next().unwrap();
        assert!(inst.opts.contains(InstOpts::COMPACTED));
    }

    #[test]
    fn mandated_compaction_miss_is_fatal() {
        // a flag modifier has no control-table entry
        let src = "add (8|M0) (lt)f0.0 r1.0<1>:f r2.0<8;8,1>:f r3.0<8;8,1>:f {Compacted}\n";
        let mut k = parse_kernel(src, Platform::Gen9, &ParseOpts::default()).kernel.unwrap();
        let r = encode_kernel(&mut k, Platform::Gen9, &EncodeOpts::default());
        assert!(r.bytes.is_none());
        let msg = &r.diagnostics[0].message;
        assert!(msg.contains("control group"), "got: {}", msg);
        assert!(msg.contains("nearest"));
    }

    #[test]
    fn compaction_keeps_branch_deltas_right() {
        // the add compacts to 8 bytes, so the forward branch target
        // tightens accordingly
        let src = "jmpi (1|M0) END\nadd (8|M0) r1.0<1>:f r2.0<8;8,1>:f r3.0<8;8,1>:f {Compacted}\nEND:\nnop\n";
        let mut k = parse_kernel(src, Platform::Gen9, &ParseOpts::default()).kernel.unwrap();
        let r = encode_kernel(&mut k, Platform::Gen9, &EncodeOpts::default());
        let bytes = r.bytes.expect("encode");
        assert_eq!(bytes.len(), 16 + 8 + 16);
        let j = first_record(&bytes);
        assert_eq!(j.get(layout::JIP), 24);
    }

    #[test]
    fn arf_register_byte() {
        assert_eq!(reg_byte(RegClass::Grf, 42), 42);
        assert_eq!(reg_byte(RegClass::Acc, 1), 0x21);
        assert_eq!(reg_byte(RegClass::Null, 0), 0x00);
        assert_eq!(reg_byte(RegClass::Ip, 0), 0x70);
    }

    #[test]
    fn math_subfunction_in_condmod_slot() {
        let bytes = encode("math.sqt (8|M0) r1.0 r2.0\n");
        let mi = first_record(&bytes);
        assert_eq!(mi.get(layout::OPCODE), 0x38);
        assert_eq!(mi.get(layout::COND_MOD), crate::ir::MathFn::Sqt.code() as u64);
    }

    #[test]
    fn nop_is_compactable() {
        let mut k = parse_kernel("nop {Compacted}\n", Platform::Gen9, &ParseOpts::default())
            .kernel
            .unwrap();
        let r = encode_kernel(&mut k, Platform::Gen9, &EncodeOpts::default());
        assert_eq!(r.bytes.expect("encode").len(), 8);
    }
}
