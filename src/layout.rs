//! Binary record layout: the 16-byte instruction word, its named
//! bitfields, and the per-form field tables the encoder, decoder, and
//! field extractor share. Callers never hard-code offsets; they go
//! through these tables.

use crate::ir::Type;
use crate::ops::{by_code, OpClass};

/// A named bit range within the 128-bit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub off: u32,
    pub len: u32,
}

impl Field {
    pub const fn new(name: &'static str, off: u32, len: u32) -> Field {
        Field { name, off, len }
    }
}

/// Fixed 16-byte binary record, interpreted little-endian. The logical
/// instruction occupies all 16 bytes, or only the first 8 when the
/// compact flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MInst {
    pub bytes: [u8; 16],
}

impl MInst {
    pub fn new() -> MInst {
        MInst::default()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> MInst {
        MInst { bytes }
    }

    fn word(&self) -> u128 {
        u128::from_le_bytes(self.bytes)
    }

    fn set_word(&mut self, w: u128) {
        self.bytes = w.to_le_bytes();
    }

    pub fn get(&self, f: Field) -> u64 {
        debug_assert!(f.len <= 64 && f.off + f.len <= 128);
        let mask = if f.len == 64 { u64::MAX as u128 } else { (1u128 << f.len) - 1 };
        ((self.word() >> f.off) & mask) as u64
    }

    pub fn set(&mut self, f: Field, val: u64) {
        debug_assert!(f.len <= 64 && f.off + f.len <= 128);
        let mask = if f.len == 64 { u64::MAX as u128 } else { (1u128 << f.len) - 1 };
        debug_assert!((val as u128) <= mask, "value {:#x} overflows {}", val, f.name);
        let w = (self.word() & !(mask << f.off)) | (((val as u128) & mask) << f.off);
        self.set_word(w);
    }

    pub fn is_compact(&self) -> bool {
        self.get(CMPT_CTRL) != 0
    }

    pub fn opcode(&self) -> u8 {
        self.get(OPCODE) as u8
    }
}

// ---- DW0: shared control word ----
pub const OPCODE: Field = Field::new("Opcode", 0, 7);
pub const BRANCH_CTRL: Field = Field::new("BranchCtrl", 7, 1);
pub const MASK_CTRL: Field = Field::new("MaskCtrl", 8, 1);
pub const PRED_CTRL: Field = Field::new("PredCtrl", 9, 4);
pub const PRED_INV: Field = Field::new("PredInv", 13, 1);
pub const FLAG_REG: Field = Field::new("FlagReg", 14, 2);
pub const FLAG_SUB: Field = Field::new("FlagSubReg", 16, 2);
pub const COND_MOD: Field = Field::new("CondMod", 18, 4);
/// Send-class overlay of the CondMod slot.
pub const SEND_EOT: Field = Field::new("EOT", 18, 1);
pub const SEND_RSVD_19: Field = Field::new("Reserved[21:19]", 19, 3);
pub const EXEC_SIZE: Field = Field::new("ExecSize", 22, 3);
pub const CHAN_OFF: Field = Field::new("ChanOff", 25, 3);
pub const SATURATE: Field = Field::new("Saturate", 28, 1);
/// The single size flag: same position in the 8- and 16-byte forms.
pub const CMPT_CTRL: Field = Field::new("CmptCtrl", 29, 1);
pub const ATOMIC: Field = Field::new("Atomic", 30, 1);
pub const SWITCH: Field = Field::new("Switch", 31, 1);

// ---- DW1: destination + src0 metadata ----
pub const DST_TYPE: Field = Field::new("DstType", 32, 4);
pub const DST_FILE: Field = Field::new("DstRegFile", 36, 2);
pub const DST_ADDR_MODE: Field = Field::new("DstAddrMode", 38, 1);
pub const DST_HS: Field = Field::new("DstHStride", 39, 2);
pub const DST_REG: Field = Field::new("DstReg", 41, 8);
pub const DST_SUB: Field = Field::new("DstSubReg", 49, 5);
/// Indirect overlay of DstReg/DstSubReg.
pub const DST_ADDR_SUB: Field = Field::new("DstAddrSubReg", 41, 4);
pub const DST_ADDR_OFF: Field = Field::new("DstAddrImm", 45, 9);
pub const SRC0_TYPE: Field = Field::new("Src0Type", 54, 4);
pub const SRC0_FILE: Field = Field::new("Src0RegFile", 58, 2);
pub const SRC0_MOD: Field = Field::new("Src0SrcMod", 60, 2);
pub const SRC0_ADDR_MODE: Field = Field::new("Src0AddrMode", 62, 1);
pub const RSVD_63: Field = Field::new("Reserved[63]", 63, 1);

// ---- DW2: src1 metadata + src0 placement ----
pub const SRC1_TYPE: Field = Field::new("Src1Type", 64, 4);
pub const SRC1_FILE: Field = Field::new("Src1RegFile", 68, 2);
pub const SRC1_MOD: Field = Field::new("Src1SrcMod", 70, 2);
pub const SRC1_ADDR_MODE: Field = Field::new("Src1AddrMode", 72, 1);
pub const SRC0_REG: Field = Field::new("Src0Reg", 73, 8);
pub const SRC0_SUB: Field = Field::new("Src0SubReg", 81, 5);
pub const SRC0_ADDR_SUB: Field = Field::new("Src0AddrSubReg", 73, 4);
pub const SRC0_ADDR_OFF: Field = Field::new("Src0AddrImm", 77, 9);
pub const SRC0_VS: Field = Field::new("Src0VertStride", 86, 4);
pub const SRC0_W: Field = Field::new("Src0Width", 90, 3);
pub const SRC0_HS: Field = Field::new("Src0HStride", 93, 2);
pub const RSVD_95: Field = Field::new("Reserved[95]", 95, 1);

// ---- DW3: src1 placement (register form) ----
pub const SRC1_REG: Field = Field::new("Src1Reg", 96, 8);
pub const SRC1_SUB: Field = Field::new("Src1SubReg", 104, 5);
pub const SRC1_ADDR_SUB: Field = Field::new("Src1AddrSubReg", 96, 4);
pub const SRC1_ADDR_OFF: Field = Field::new("Src1AddrImm", 100, 9);
pub const SRC1_VS: Field = Field::new("Src1VertStride", 109, 4);
pub const SRC1_W: Field = Field::new("Src1Width", 113, 3);
pub const SRC1_HS: Field = Field::new("Src1HStride", 116, 2);
pub const RSVD_118: Field = Field::new("Reserved[127:118]", 118, 10);

// ---- Immediate overlays ----
pub const IMM32: Field = Field::new("Imm32", 96, 32);
pub const IMM64_LO: Field = Field::new("Imm64Lo", 64, 32);
pub const IMM64_HI: Field = Field::new("Imm64Hi", 96, 32);

// ---- Ternary overlay (DW2/DW3 reshaped; shared source type) ----
pub const TERN_SRC2_REG: Field = Field::new("Src2Reg", 64, 8);
pub const TERN_RSVD_72: Field = Field::new("Reserved[72]", 72, 1);
pub const TERN_SRC2_MOD: Field = Field::new("Src2SrcMod", 90, 2);
pub const TERN_RSVD_92: Field = Field::new("Reserved[92]", 92, 1);
pub const TERN_SRC2_SUB: Field = Field::new("Src2SubReg", 113, 5);
pub const TERN_SRC1_HS: Field = Field::new("Src1HStride", 118, 2);
pub const TERN_SRC2_HS: Field = Field::new("Src2HStride", 120, 2);
pub const TERN_SRC1_MOD: Field = Field::new("Src1SrcMod", 122, 2);
pub const TERN_RSVD_124: Field = Field::new("Reserved[127:124]", 124, 4);

// ---- Branch overlay ----
pub const JIP: Field = Field::new("JIP", 96, 32);
pub const BR_RSVD_32: Field = Field::new("Reserved[53:32]", 32, 22);

// ---- Send overlay ----
pub const SEND_SFID: Field = Field::new("SFID", 86, 4);
pub const SEND_RSVD_90: Field = Field::new("Reserved[92:90]", 90, 3);
pub const SEND_RSVD_93: Field = Field::new("Reserved[94:93]", 93, 2);
pub const SEND_DESC: Field = Field::new("Desc", 96, 32);

// ---- Compact (8-byte) form ----
pub const C_RSVD_7: Field = Field::new("Reserved[7]", 7, 1);
pub const C_CTRL_IDX: Field = Field::new("ControlIndex", 8, 5);
pub const C_DT_IDX: Field = Field::new("DataTypeIndex", 13, 5);
pub const C_SUBREG_IDX: Field = Field::new("SubRegIndex", 18, 3);
pub const C_SRC0_IDX: Field = Field::new("Src0Index", 21, 4);
pub const C_SRC1_IDX: Field = Field::new("Src1Index", 25, 4);
pub const C_DST_REG: Field = Field::new("DstReg", 30, 8);
pub const C_SRC0_REG: Field = Field::new("Src0Reg", 38, 8);
pub const C_SRC1_REG: Field = Field::new("Src1Reg", 46, 8);
pub const C_RSVD_54: Field = Field::new("Reserved[63:54]", 54, 10);

/// Register-file field codes.
pub const FILE_GRF: u64 = 0;
pub const FILE_ARF: u64 = 1;
pub const FILE_IMM: u64 = 2;

/// Which overall shape a record takes; decides the field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    Regular,
    RegularImm32,
    RegularImm64,
    Ternary,
    Branch,
    Send,
    Compact,
}

const DW0_FIELDS: &[Field] = &[
    OPCODE, BRANCH_CTRL, MASK_CTRL, PRED_CTRL, PRED_INV, FLAG_REG, FLAG_SUB, COND_MOD,
    EXEC_SIZE, CHAN_OFF, SATURATE, CMPT_CTRL, ATOMIC, SWITCH,
];

const DW0_SEND_FIELDS: &[Field] = &[
    OPCODE, BRANCH_CTRL, MASK_CTRL, PRED_CTRL, PRED_INV, FLAG_REG, FLAG_SUB, SEND_EOT,
    SEND_RSVD_19, EXEC_SIZE, CHAN_OFF, SATURATE, CMPT_CTRL, ATOMIC, SWITCH,
];

const DST_DIRECT: &[Field] = &[DST_TYPE, DST_FILE, DST_ADDR_MODE, DST_HS, DST_REG, DST_SUB];
const DST_INDIRECT: &[Field] =
    &[DST_TYPE, DST_FILE, DST_ADDR_MODE, DST_HS, DST_ADDR_SUB, DST_ADDR_OFF];
const SRC0_META: &[Field] = &[SRC0_TYPE, SRC0_FILE, SRC0_MOD, SRC0_ADDR_MODE, RSVD_63];
const SRC1_META: &[Field] = &[SRC1_TYPE, SRC1_FILE, SRC1_MOD, SRC1_ADDR_MODE];

/// Complete, ordered field table for a form. Each table tiles its record
/// exactly: 128 bits (64 for the compact form), no gaps, no overlaps.
/// `dst_ind`/`s0_ind`/`s1_ind` select the indirect overlays.
pub fn form_fields(form: Form, dst_ind: bool, s0_ind: bool, s1_ind: bool) -> Vec<Field> {
    let mut out: Vec<Field> = Vec::with_capacity(40);
    let dst = if dst_ind { DST_INDIRECT } else { DST_DIRECT };
    let s0place: &[Field] = if s0_ind {
        &[SRC0_ADDR_SUB, SRC0_ADDR_OFF]
    } else {
        &[SRC0_REG, SRC0_SUB]
    };
    let s1place: &[Field] = if s1_ind {
        &[SRC1_ADDR_SUB, SRC1_ADDR_OFF]
    } else {
        &[SRC1_REG, SRC1_SUB]
    };
    match form {
        Form::Regular | Form::RegularImm32 => {
            out.extend_from_slice(DW0_FIELDS);
            out.extend_from_slice(dst);
            out.extend_from_slice(SRC0_META);
            out.extend_from_slice(SRC1_META);
            out.extend_from_slice(s0place);
            out.extend_from_slice(&[SRC0_VS, SRC0_W, SRC0_HS, RSVD_95]);
            if form == Form::RegularImm32 {
                out.push(IMM32);
            } else {
                out.extend_from_slice(s1place);
                out.extend_from_slice(&[SRC1_VS, SRC1_W, SRC1_HS, RSVD_118]);
            }
        }
        Form::RegularImm64 => {
            out.extend_from_slice(DW0_FIELDS);
            out.extend_from_slice(dst);
            out.extend_from_slice(SRC0_META);
            out.extend_from_slice(&[IMM64_LO, IMM64_HI]);
        }
        Form::Ternary => {
            out.extend_from_slice(DW0_FIELDS);
            out.extend_from_slice(DST_DIRECT);
            out.extend_from_slice(SRC0_META);
            out.extend_from_slice(&[
                TERN_SRC2_REG,
                TERN_RSVD_72,
                SRC0_REG,
                SRC0_SUB,
                SRC0_VS,
                TERN_SRC2_MOD,
                TERN_RSVD_92,
                SRC0_HS,
                RSVD_95,
                SRC1_REG,
                SRC1_SUB,
                SRC1_VS,
                TERN_SRC2_SUB,
                TERN_SRC1_HS,
                TERN_SRC2_HS,
                TERN_SRC1_MOD,
                TERN_RSVD_124,
            ]);
        }
        Form::Branch => {
            out.extend_from_slice(DW0_FIELDS);
            out.extend_from_slice(&[BR_RSVD_32]);
            out.extend_from_slice(SRC0_META);
            out.extend_from_slice(SRC1_META);
            out.extend_from_slice(s0place);
            out.extend_from_slice(&[SRC0_VS, SRC0_W, SRC0_HS, RSVD_95, JIP]);
        }
        Form::Send => {
            out.extend_from_slice(DW0_SEND_FIELDS);
            out.extend_from_slice(dst);
            out.extend_from_slice(SRC0_META);
            out.extend_from_slice(SRC1_META);
            out.extend_from_slice(s0place);
            out.extend_from_slice(&[SEND_SFID, SEND_RSVD_90, SEND_RSVD_93, RSVD_95, SEND_DESC]);
        }
        Form::Compact => {
            out.extend_from_slice(&[
                OPCODE,
                C_RSVD_7,
                C_CTRL_IDX,
                C_DT_IDX,
                C_SUBREG_IDX,
                C_SRC0_IDX,
                C_SRC1_IDX,
                CMPT_CTRL,
                C_DST_REG,
                C_SRC0_REG,
                C_SRC1_REG,
                C_RSVD_54,
            ]);
        }
    }
    out
}

/// Classify a raw record into a form by its opcode and file/type fields.
/// Unknown opcodes fall back to the regular form so the extractor can
/// still list something.
pub fn classify(mi: &MInst) -> Form {
    if mi.is_compact() {
        return Form::Compact;
    }
    let class = by_code(mi.opcode()).map(|s| s.class);
    match class {
        Some(OpClass::Branch) => Form::Branch,
        Some(OpClass::Send) => Form::Send,
        Some(OpClass::Ternary) => Form::Ternary,
        _ => {
            let s0_imm = mi.get(SRC0_FILE) == FILE_IMM;
            let s1_imm = mi.get(SRC1_FILE) == FILE_IMM;
            if s0_imm {
                let wide = Type::from_code(mi.get(SRC0_TYPE) as u32)
                    .map(|t| t.size() == 8)
                    .unwrap_or(false);
                if wide {
                    Form::RegularImm64
                } else {
                    Form::RegularImm32
                }
            } else if s1_imm {
                Form::RegularImm32
            } else {
                Form::Regular
            }
        }
    }
}

/// Field table for a raw record, addressing-mode overlays included.
pub fn fields_of(mi: &MInst) -> Vec<Field> {
    let form = classify(mi);
    let (d, s0, s1) = match form {
        Form::Compact => (false, false, false),
        _ => (
            mi.get(DST_ADDR_MODE) != 0,
            mi.get(SRC0_ADDR_MODE) != 0,
            mi.get(SRC1_ADDR_MODE) != 0,
        ),
    };
    // immediate forms and branches never use the overlays they replaced
    match form {
        Form::RegularImm64 => form_fields(form, d, false, false),
        Form::Branch => form_fields(form, false, s0, false),
        Form::Send => form_fields(form, d, s0, false),
        _ => form_fields(form, d, s0, s1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_tiles(fields: &[Field], total: u32) {
        let mut claimed = vec![0u8; total as usize];
        for f in fields {
            for b in f.off..f.off + f.len {
                assert!(b < total, "{} out of range", f.name);
                claimed[b as usize] += 1;
            }
        }
        for (i, c) in claimed.iter().enumerate() {
            assert_eq!(*c, 1, "bit {} claimed {} times", i, c);
        }
    }

    #[test]
    fn all_forms_tile_exactly() {
        for dst_ind in [false, true] {
            for s0 in [false, true] {
                for s1 in [false, true] {
                    assert_tiles(&form_fields(Form::Regular, dst_ind, s0, s1), 128);
                    assert_tiles(&form_fields(Form::RegularImm32, dst_ind, s0, false), 128);
                }
            }
        }
        assert_tiles(&form_fields(Form::RegularImm64, false, false, false), 128);
        assert_tiles(&form_fields(Form::Ternary, false, false, false), 128);
        assert_tiles(&form_fields(Form::Branch, false, false, false), 128);
        assert_tiles(&form_fields(Form::Branch, false, true, false), 128);
        assert_tiles(&form_fields(Form::Send, false, false, false), 128);
        assert_tiles(&form_fields(Form::Compact, false, false, false), 64);
    }

    #[test]
    fn get_set_roundtrip() {
        let mut mi = MInst::new();
        mi.set(OPCODE, 0x40);
        mi.set(EXEC_SIZE, 3);
        mi.set(SRC1_REG, 0xAB);
        mi.set(IMM64_HI, 0xDEAD_BEEF);
        assert_eq!(mi.get(OPCODE), 0x40);
        assert_eq!(mi.get(EXEC_SIZE), 3);
        assert_eq!(mi.get(IMM64_HI), 0xDEAD_BEEF);
        mi.set(CMPT_CTRL, 1);
        assert!(mi.is_compact());
        // the flag sits in byte 3 bit 5
        assert_eq!(mi.bytes[3] & 0x20, 0x20);
    }

    #[test]
    fn classify_by_file_fields() {
        let mut mi = MInst::new();
        mi.set(OPCODE, 0x01); // mov
        assert_eq!(classify(&mi), Form::Regular);
        mi.set(SRC0_FILE, FILE_IMM);
        mi.set(SRC0_TYPE, Type::F.code() as u64);
        assert_eq!(classify(&mi), Form::RegularImm32);
        mi.set(SRC0_TYPE, Type::DF.code() as u64);
        assert_eq!(classify(&mi), Form::RegularImm64);
        mi.set(OPCODE, 0x31); // send
        assert_eq!(classify(&mi), Form::Send);
    }
}
