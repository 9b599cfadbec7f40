//! Binary → IR decode, the raw field extractor, and the field-level
//! binary diff. Decode is best-effort: anomalies (unknown opcodes, bad
//! codes, short tails) are warnings and the decoder keeps going, so a
//! partially corrupt kernel still lists and diffs.

use tracing::debug;

use crate::blocks;
use crate::compact;
use crate::diag::{DiagSink, Diagnostic, Loc, DEFAULT_MAX_ERRORS};
use crate::ir::{
    CondMod, FlagRef, HorzStride, ImmVal, Instruction, InstOpts, Kernel, LabelTarget, MacroAcc,
    MathFn, Operand, Platform, Pred, PredCtrl, RegClass, Region, SendDesc, SrcMod, Type,
    VertStride, Width,
};
use crate::layout::{self, MInst, FILE_ARF, FILE_IMM};
use crate::ops::{self, OpClass};

#[derive(Debug)]
pub struct DecodeResult {
    pub kernel: Option<Kernel>,
    pub diagnostics: Vec<Diagnostic>,
}

/// One raw record plus its position, as sliced out of the byte stream.
struct RawRecord {
    pc: u32,
    len: usize,
    mi: MInst,
}

/// Slice the stream into 8/16-byte records by the per-record size flag.
/// A short tail is reported and dropped.
fn split_records(bytes: &[u8], sink: &mut DiagSink) -> Vec<RawRecord> {
    let mut out = Vec::new();
    let mut pc = 0usize;
    while pc < bytes.len() {
        if bytes.len() - pc < 4 {
            sink.warn(
                Loc::Pc(pc as u32),
                format!("{} trailing bytes are not an instruction", bytes.len() - pc),
            );
            break;
        }
        let dw0 = u32::from_le_bytes(bytes[pc..pc + 4].try_into().expect("4 bytes"));
        let len = if dw0 & (1 << 29) != 0 { 8 } else { 16 };
        if bytes.len() - pc < len {
            sink.warn(
                Loc::Pc(pc as u32),
                format!("{} trailing bytes are not an instruction", bytes.len() - pc),
            );
            break;
        }
        let mut b = [0u8; 16];
        b[..len].copy_from_slice(&bytes[pc..pc + len]);
        out.push(RawRecord { pc: pc as u32, len, mi: MInst::from_bytes(b) });
        pc += len;
    }
    out
}

pub fn decode_kernel(bytes: &[u8], platform: Platform) -> DecodeResult {
    let mut sink = DiagSink::new(DEFAULT_MAX_ERRORS);
    let records = split_records(bytes, &mut sink);
    debug!(records = records.len(), "split {} bytes", bytes.len());
    let mut instrs = Vec::with_capacity(records.len());
    for rec in &records {
        let compacted = rec.len == 8;
        let mi = if compacted {
            match compact::expand(&rec.mi) {
                Ok(mi) => mi,
                Err(e) => {
                    sink.warn(Loc::Pc(rec.pc), e.to_string());
                    continue;
                }
            }
        } else {
            rec.mi
        };
        let dec = Decoder { platform, pc: rec.pc, sink: &mut sink };
        match dec.decode(&mi) {
            Some(mut inst) => {
                inst.pc = rec.pc;
                if compacted {
                    inst.opts |= InstOpts::COMPACTED;
                }
                instrs.push(inst);
            }
            None => continue,
        }
    }
    let kernel = match blocks::infer_blocks(instrs, bytes.len() as u32, &mut sink) {
        Ok(k) => Some(k),
        Err(_) => None,
    };
    DecodeResult { kernel, diagnostics: sink.into_vec() }
}

struct Decoder<'a> {
    platform: Platform,
    pc: u32,
    sink: &'a mut DiagSink,
}

impl Decoder<'_> {
    fn warn(&mut self, msg: impl Into<String>) {
        self.sink.warn(Loc::Pc(self.pc), msg);
    }

    fn decode(mut self, mi: &MInst) -> Option<Instruction> {
        let Some(spec) = ops::by_code(mi.opcode()) else {
            self.warn(format!("unknown opcode {:#04x}", mi.opcode()));
            return None;
        };
        let mut inst = Instruction::new(spec.op);
        inst.branch_ctrl = mi.get(layout::BRANCH_CTRL) != 0;
        inst.mask_ctrl = mi.get(layout::MASK_CTRL) != 0;
        match PredCtrl::from_code(mi.get(layout::PRED_CTRL) as u32) {
            Some(PredCtrl::None) => {}
            Some(ctrl) => {
                inst.pred = Some(Pred { ctrl, inverted: mi.get(layout::PRED_INV) != 0 });
            }
            None => self.warn(format!("bad predication code {}", mi.get(layout::PRED_CTRL))),
        }
        inst.flag = FlagRef {
            reg: mi.get(layout::FLAG_REG) as u8,
            sub: mi.get(layout::FLAG_SUB) as u8,
        };
        if spec.is_send() {
            if mi.get(layout::SEND_EOT) != 0 {
                inst.opts |= InstOpts::EOT;
            }
        } else if spec.class == OpClass::Math {
            match MathFn::from_code(mi.get(layout::COND_MOD) as u32) {
                Some(f) => inst.math_fn = Some(f),
                None => {
                    self.warn(format!("bad math subfunction {}", mi.get(layout::COND_MOD)));
                    return None;
                }
            }
        } else {
            match CondMod::from_code(mi.get(layout::COND_MOD) as u32) {
                Some(c) => inst.cond_mod = c,
                None => self.warn(format!("bad condition modifier {}", mi.get(layout::COND_MOD))),
            }
        }
        inst.exec_size = 1u8 << mi.get(layout::EXEC_SIZE).min(5);
        inst.chan_off = (mi.get(layout::CHAN_OFF) as u8) * 4;
        inst.saturate = mi.get(layout::SATURATE) != 0;
        if mi.get(layout::ATOMIC) != 0 {
            inst.opts |= InstOpts::ATOMIC;
        }
        if mi.get(layout::SWITCH) != 0 {
            inst.opts |= InstOpts::SWITCH;
        }

        let is_macro = spec.attrs.contains(ops::OpAttrs::MACRO)
            || inst.math_fn.map(|f| f.is_macro()).unwrap_or(false);
        match spec.class {
            OpClass::Branch => {
                let jip = mi.get(layout::JIP) as u32 as i32;
                inst.srcs.push(Operand::Label(LabelTarget::Offset(jip)));
            }
            OpClass::Send => {
                inst.dst = Some(self.decode_dst(mi, false));
                inst.srcs.push(self.decode_src(mi, 0, false));
                inst.ex_desc = Some(SendDesc::Imm(mi.get(layout::SEND_SFID) as u32));
                inst.desc = Some(SendDesc::Imm(mi.get(layout::SEND_DESC) as u32));
            }
            OpClass::Ternary => {
                inst.dst = Some(self.decode_dst(mi, is_macro));
                self.decode_ternary_srcs(mi, &mut inst, is_macro);
            }
            _ => {
                if spec.has_dst() {
                    inst.dst = Some(self.decode_dst(mi, is_macro));
                }
                for i in 0..spec.num_srcs(inst.math_fn) {
                    inst.srcs.push(self.decode_src(mi, i, is_macro));
                }
            }
        }
        let _ = self.platform;
        Some(inst)
    }

    fn reg_class(&mut self, file: u64, byte: u64) -> (RegClass, u8) {
        if file == FILE_ARF {
            match RegClass::from_arf_nibble((byte >> 4) as u32) {
                Some(c) => (c, (byte & 0xF) as u8),
                None => {
                    self.warn(format!("bad ARF register byte {:#04x}", byte));
                    (RegClass::Null, 0)
                }
            }
        } else {
            (RegClass::Grf, byte as u8)
        }
    }

    fn region_from_codes(&mut self, vs: u64, w: u64, hs: u64) -> Region {
        let vs = match VertStride::from_code(vs as u32) {
            Some(v) => v,
            None => {
                self.warn(format!("bad vertical stride code {}", vs));
                VertStride::Invalid
            }
        };
        let w = match Width::from_code(w as u32) {
            Some(w) => w,
            None => {
                self.warn(format!("bad width code {}", w));
                Width::Invalid
            }
        };
        Region { vs, w, hs: HorzStride::from_code(hs as u32) }
    }

    fn ty_of(&mut self, code: u64) -> Type {
        match Type::from_code(code as u32) {
            Some(t) => t,
            None => {
                self.warn(format!("bad type code {}", code));
                Type::Invalid
            }
        }
    }

    fn decode_dst(&mut self, mi: &MInst, is_macro: bool) -> Operand {
        let ty = self.ty_of(mi.get(layout::DST_TYPE));
        let region = Region {
            vs: VertStride::Invalid,
            w: Width::Invalid,
            hs: HorzStride::from_code(mi.get(layout::DST_HS) as u32),
        };
        if mi.get(layout::DST_ADDR_MODE) != 0 {
            return Operand::Indirect {
                addr_sub: mi.get(layout::DST_ADDR_SUB) as u8,
                offset: sext9(mi.get(layout::DST_ADDR_OFF)),
                region,
                ty,
                src_mod: SrcMod::None,
            };
        }
        let (class, reg) = self.reg_class(mi.get(layout::DST_FILE), mi.get(layout::DST_REG));
        let sub = mi.get(layout::DST_SUB);
        if is_macro {
            return Operand::Macro {
                class,
                reg,
                acc: MacroAcc::from_code(sub as u32).unwrap_or(MacroAcc::NoAcc),
                region,
                ty,
                src_mod: SrcMod::None,
            };
        }
        Operand::Direct { class, reg, sub: sub as u8, region, ty, src_mod: SrcMod::None }
    }

    fn decode_src(&mut self, mi: &MInst, idx: usize, is_macro: bool) -> Operand {
        let (ty_f, file_f, mod_f, am_f, reg_f, sub_f, as_f, ao_f, vs_f, w_f, hs_f) = if idx == 0 {
            (
                layout::SRC0_TYPE,
                layout::SRC0_FILE,
                layout::SRC0_MOD,
                layout::SRC0_ADDR_MODE,
                layout::SRC0_REG,
                layout::SRC0_SUB,
                layout::SRC0_ADDR_SUB,
                layout::SRC0_ADDR_OFF,
                layout::SRC0_VS,
                layout::SRC0_W,
                layout::SRC0_HS,
            )
        } else {
            (
                layout::SRC1_TYPE,
                layout::SRC1_FILE,
                layout::SRC1_MOD,
                layout::SRC1_ADDR_MODE,
                layout::SRC1_REG,
                layout::SRC1_SUB,
                layout::SRC1_ADDR_SUB,
                layout::SRC1_ADDR_OFF,
                layout::SRC1_VS,
                layout::SRC1_W,
                layout::SRC1_HS,
            )
        };
        let ty = self.ty_of(mi.get(ty_f));
        if mi.get(file_f) == FILE_IMM {
            let bits = if ty.size() == 8 {
                mi.get(layout::IMM64_LO) | mi.get(layout::IMM64_HI) << 32
            } else {
                mi.get(layout::IMM32)
            };
            return match ImmVal::from_bits(ty, bits) {
                Some(imm) => Operand::Imm(imm),
                None => {
                    self.warn("immediate with invalid type");
                    Operand::Imm(ImmVal::U32(bits as u32))
                }
            };
        }
        let src_mod = SrcMod::from_code(mi.get(mod_f) as u32);
        let region = self.region_from_codes(mi.get(vs_f), mi.get(w_f), mi.get(hs_f));
        if mi.get(am_f) != 0 {
            return Operand::Indirect {
                addr_sub: mi.get(as_f) as u8,
                offset: sext9(mi.get(ao_f)),
                region,
                ty,
                src_mod,
            };
        }
        let (class, reg) = self.reg_class(mi.get(file_f), mi.get(reg_f));
        let sub = mi.get(sub_f);
        if is_macro {
            return Operand::Macro {
                class,
                reg,
                acc: MacroAcc::from_code(sub as u32).unwrap_or(MacroAcc::NoAcc),
                region,
                ty,
                src_mod,
            };
        }
        Operand::Direct { class, reg, sub: sub as u8, region, ty, src_mod }
    }

    fn decode_ternary_srcs(&mut self, mi: &MInst, inst: &mut Instruction, is_macro: bool) {
        let ty = self.ty_of(mi.get(layout::SRC0_TYPE));
        let parts = [
            (
                layout::SRC0_REG,
                layout::SRC0_SUB,
                layout::SRC0_MOD,
                Some(layout::SRC0_VS),
                layout::SRC0_HS,
            ),
            (
                layout::SRC1_REG,
                layout::SRC1_SUB,
                layout::TERN_SRC1_MOD,
                Some(layout::SRC1_VS),
                layout::TERN_SRC1_HS,
            ),
            (
                layout::TERN_SRC2_REG,
                layout::TERN_SRC2_SUB,
                layout::TERN_SRC2_MOD,
                None,
                layout::TERN_SRC2_HS,
            ),
        ];
        for (reg_f, sub_f, mod_f, vs_f, hs_f) in parts {
            let vs = match vs_f {
                Some(f) => match VertStride::from_code(mi.get(f) as u32) {
                    Some(v) => v,
                    None => {
                        self.warn(format!("bad vertical stride code {}", mi.get(f)));
                        VertStride::Invalid
                    }
                },
                None => VertStride::Invalid,
            };
            let region = Region {
                vs,
                w: Width::Invalid,
                hs: HorzStride::from_code(mi.get(hs_f) as u32),
            };
            let (class, reg) = self.reg_class(0, mi.get(reg_f));
            let sub = mi.get(sub_f);
            let src_mod = SrcMod::from_code(mi.get(mod_f) as u32);
            inst.srcs.push(if is_macro {
                Operand::Macro {
                    class,
                    reg,
                    acc: MacroAcc::from_code(sub as u32).unwrap_or(MacroAcc::NoAcc),
                    region,
                    ty,
                    src_mod,
                }
            } else {
                Operand::Direct { class, reg, sub: sub as u8, region, ty, src_mod }
            });
        }
    }
}

fn sext9(v: u64) -> i16 {
    ((v as i16) << 7) >> 7
}

// ---- field extraction and diff ----

/// One named field slice of one record, with its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    pub pc: u32,
    pub name: &'static str,
    /// Bit offset within the record.
    pub off: u32,
    pub len: u32,
    pub value: u64,
}

pub const UNMAPPED: &str = "<UNMAPPED>";

/// List every field of every record, in (pc, offset) order. Any bit the
/// form table fails to claim shows up as an `<UNMAPPED>` entry, so the
/// listing always accounts for every bit of every record.
pub fn list_fields(bytes: &[u8], _platform: Platform) -> Vec<FieldValue> {
    let mut sink = DiagSink::new(usize::MAX);
    let records = split_records(bytes, &mut sink);
    let mut out = Vec::new();
    for rec in &records {
        let total = rec.len as u32 * 8;
        let mut fields = layout::fields_of(&rec.mi);
        fields.sort_by_key(|f| f.off);
        let mut next = 0u32;
        for f in fields {
            if f.off > next {
                out.push(FieldValue {
                    pc: rec.pc,
                    name: UNMAPPED,
                    off: next,
                    len: f.off - next,
                    value: get_bits(&rec.mi, next, f.off - next),
                });
            }
            out.push(FieldValue {
                pc: rec.pc,
                name: f.name,
                off: f.off,
                len: f.len,
                value: rec.mi.get(f),
            });
            next = next.max(f.off + f.len);
        }
        if next < total {
            out.push(FieldValue {
                pc: rec.pc,
                name: UNMAPPED,
                off: next,
                len: total - next,
                value: get_bits(&rec.mi, next, total - next),
            });
        }
    }
    out
}

fn get_bits(mi: &MInst, off: u32, len: u32) -> u64 {
    let w = u128::from_le_bytes(mi.bytes);
    let mask = if len >= 64 { u64::MAX as u128 } else { (1u128 << len) - 1 };
    ((w >> off) & mask) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffStatus {
    Unchanged,
    Changed { old: u64, new: u64 },
    /// Present only in the second binary.
    Added { new: u64 },
    /// Present only in the first binary.
    Removed { old: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub pc: u32,
    pub name: &'static str,
    pub off: u32,
    pub len: u32,
    pub status: DiffStatus,
}

/// Field-level comparison of two binaries. Fields pair up by position
/// (pc, bit offset, length, name); a field whose slot exists in only one
/// side is added/removed, which happens when the two records take
/// different forms.
pub fn diff_fields(a: &[u8], b: &[u8], platform: Platform) -> Vec<FieldDiff> {
    let fa = list_fields(a, platform);
    let fb = list_fields(b, platform);
    let key = |f: &FieldValue| (f.pc, f.off, f.len, f.name);
    let removed = |f: &FieldValue| FieldDiff {
        pc: f.pc,
        name: f.name,
        off: f.off,
        len: f.len,
        status: DiffStatus::Removed { old: f.value },
    };
    let added = |f: &FieldValue| FieldDiff {
        pc: f.pc,
        name: f.name,
        off: f.off,
        len: f.len,
        status: DiffStatus::Added { new: f.value },
    };
    let mut out = Vec::new();
    let mut ai = 0;
    let mut bi = 0;
    while ai < fa.len() || bi < fb.len() {
        match (fa.get(ai), fb.get(bi)) {
            (Some(x), Some(y)) if key(x) == key(y) => {
                out.push(FieldDiff {
                    pc: x.pc,
                    name: x.name,
                    off: x.off,
                    len: x.len,
                    status: if x.value == y.value {
                        DiffStatus::Unchanged
                    } else {
                        DiffStatus::Changed { old: x.value, new: y.value }
                    },
                });
                ai += 1;
                bi += 1;
            }
            (Some(x), Some(y)) => {
                if (x.pc, x.off, x.len) <= (y.pc, y.off, y.len) {
                    out.push(removed(x));
                    ai += 1;
                } else {
                    out.push(added(y));
                    bi += 1;
                }
            }
            (Some(x), None) => {
                out.push(removed(x));
                ai += 1;
            }
            (None, Some(y)) => {
                out.push(added(y));
                bi += 1;
            }
            (None, None) => break,
        }
    }
    out
}
