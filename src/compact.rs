//! Compacted-instruction support: the static pattern tables and the
//! pack/unpack mapping between the 16-byte regular record and the
//! 8-byte compact record.
//!
//! A compact record stores the opcode and the three register-number
//! bytes verbatim; everything else is recovered through five table
//! indices. Packing succeeds only when every field group's exact bit
//! pattern appears in its table. A miss reports the offending groups
//! with their nearest table entries by Hamming distance so the author
//! can see how far off the instruction is.

use thiserror::Error;

use crate::layout::{
    Field, MInst, ATOMIC, BRANCH_CTRL, CHAN_OFF, CMPT_CTRL, COND_MOD, C_CTRL_IDX, C_DST_REG,
    C_DT_IDX, C_SRC0_IDX, C_SRC0_REG, C_SRC1_IDX, C_SRC1_REG, C_SUBREG_IDX, DST_ADDR_MODE,
    DST_FILE, DST_HS, DST_REG, DST_SUB, DST_TYPE, EXEC_SIZE, FLAG_REG, FLAG_SUB, MASK_CTRL,
    OPCODE, PRED_CTRL, PRED_INV, SATURATE, SRC0_ADDR_MODE, SRC0_FILE, SRC0_HS, SRC0_MOD,
    SRC0_REG, SRC0_SUB, SRC0_TYPE, SRC0_VS, SRC0_W, SRC1_ADDR_MODE, SRC1_FILE, SRC1_HS,
    SRC1_MOD, SRC1_REG, SRC1_SUB, SRC1_TYPE, SRC1_VS, SRC1_W, SWITCH,
};

/// One compactable field group: a name, the regular-form fields it
/// covers (concatenated low-to-high in listed order), the index field
/// in the compact form, and its pattern table.
pub struct Group {
    pub name: &'static str,
    pub fields: &'static [Field],
    pub index_field: Field,
    pub table: &'static [u64],
}

const CTRL_FIELDS: &[Field] = &[
    BRANCH_CTRL, MASK_CTRL, PRED_CTRL, PRED_INV, FLAG_REG, FLAG_SUB, COND_MOD, EXEC_SIZE,
    CHAN_OFF, SATURATE, ATOMIC, SWITCH,
];

const DT_FIELDS: &[Field] =
    &[DST_TYPE, DST_FILE, DST_ADDR_MODE, DST_HS, SRC0_TYPE, SRC0_FILE, SRC1_TYPE, SRC1_FILE];

const SUBREG_FIELDS: &[Field] = &[DST_SUB, SRC0_SUB, SRC1_SUB];

const SRC0_FIELDS: &[Field] = &[SRC0_MOD, SRC0_ADDR_MODE, SRC0_VS, SRC0_W, SRC0_HS];
const SRC1_FIELDS: &[Field] = &[SRC1_MOD, SRC1_ADDR_MODE, SRC1_VS, SRC1_W, SRC1_HS];

// Control-group value layout (24 bits): BranchCtrl@0, MaskCtrl@1,
// PredCtrl@2, PredInv@6, FlagReg@7, FlagSub@9, CondMod@11, ExecSize@15,
// ChanOff@18, Saturate@21, Atomic@22, Switch@23.
const fn ctrl(mask: u64, exec_log2: u64, chan4: u64, sat: u64) -> u64 {
    mask << 1 | exec_log2 << 15 | chan4 << 18 | sat << 21
}

/// The most common control words: every execution size in the plain and
/// WrEn variants, plus the frequent saturating and offset-channel
/// combinations.
pub static CONTROL_TABLE: &[u64] = &[
    ctrl(0, 0, 0, 0), // (1|M0)
    ctrl(0, 1, 0, 0), // (2|M0)
    ctrl(0, 2, 0, 0), // (4|M0)
    ctrl(0, 3, 0, 0), // (8|M0)
    ctrl(0, 4, 0, 0), // (16|M0)
    ctrl(0, 5, 0, 0), // (32|M0)
    ctrl(1, 0, 0, 0), // (W) (1|M0)
    ctrl(1, 1, 0, 0),
    ctrl(1, 2, 0, 0),
    ctrl(1, 3, 0, 0),
    ctrl(1, 4, 0, 0),
    ctrl(1, 5, 0, 0),
    ctrl(0, 3, 0, 1), // (sat) (8|M0)
    ctrl(0, 4, 0, 1),
    ctrl(0, 3, 2, 0), // (8|M8)
    ctrl(0, 3, 4, 0), // (8|M16)
    ctrl(0, 3, 6, 0), // (8|M24)
    ctrl(0, 4, 4, 0), // (16|M16)
    ctrl(1, 0, 0, 1),
    ctrl(1, 3, 0, 1),
];

// Datatype-group value layout (21 bits): DstType@0, DstRegFile@4,
// DstAddrMode@6, DstHStride@7, Src0Type@9, Src0RegFile@13,
// Src1Type@15, Src1RegFile@19. All-GRF entries only; type codes per the
// element-type table (b=1, w=3, d=5, f=9, ...).
const fn dt(dst_ty: u64, hs: u64, s0_ty: u64, s1_ty: u64) -> u64 {
    dst_ty | hs << 7 | s0_ty << 9 | s1_ty << 15
}

pub static DATATYPE_TABLE: &[u64] = &[
    dt(9, 1, 9, 9),  // f = f op f
    dt(9, 1, 9, 0),  // f = f (unary)
    dt(5, 1, 5, 5),  // d = d op d
    dt(5, 1, 5, 0),
    dt(4, 1, 4, 4),  // ud
    dt(4, 1, 4, 0),
    dt(3, 1, 3, 3),  // w
    dt(3, 1, 3, 0),
    dt(2, 1, 2, 2),  // uw
    dt(2, 1, 2, 0),
    dt(8, 1, 8, 8),  // hf
    dt(8, 1, 8, 0),
    dt(9, 1, 5, 0),  // f = d (conversion mov)
    dt(5, 1, 9, 0),  // d = f
    dt(9, 1, 8, 0),  // f = hf
    dt(8, 1, 9, 0),  // hf = f
    dt(5, 1, 3, 3),  // d = w op w
    dt(4, 1, 2, 2),  // ud = uw op uw
    dt(9, 2, 9, 9),  // strided f dst
    dt(3, 2, 3, 3),  // strided w dst
    dt(4, 2, 2, 2),
    dt(5, 1, 5, 9),
];

// SubReg-group value layout (15 bits): DstSubReg@0, Src0SubReg@5,
// Src1SubReg@10.
pub static SUBREG_TABLE: &[u64] = &[
    0,
    1,
    2,
    4,
    8,
    1 << 5,       // src0 subreg 1
    4 << 5,       // src0 subreg 4
    4 | 4 << 5 | 4 << 10,
];

// Source-group value layout (12 bits): SrcMod@0, AddrMode@2, VStride@3,
// Width@7, HStride@10. Stride fields hold codes, not element counts.
const fn srcrg(mod_: u64, vs: u64, w: u64, hs: u64) -> u64 {
    mod_ | vs << 3 | w << 7 | hs << 10
}

pub static SRC_TABLE: &[u64] = &[
    srcrg(0, 0, 0, 0), // <0;1,0> scalar
    srcrg(0, 4, 3, 1), // <8;8,1>
    srcrg(0, 3, 2, 1), // <4;4,1>
    srcrg(0, 2, 1, 1), // <2;2,1>
    srcrg(0, 5, 4, 1), // <16;16,1>
    srcrg(0, 1, 0, 0), // <1;1,0>
    srcrg(0, 5, 3, 2), // <16;8,2>
    srcrg(0, 4, 2, 2), // <8;4,2>
    srcrg(1, 0, 0, 0), // -scalar
    srcrg(1, 4, 3, 1), // -<8;8,1>
    srcrg(2, 0, 0, 0), // (abs) scalar
    srcrg(2, 4, 3, 1), // (abs)<8;8,1>
];

pub static GROUPS: &[Group] = &[
    Group { name: "control", fields: CTRL_FIELDS, index_field: C_CTRL_IDX, table: CONTROL_TABLE },
    Group { name: "datatype", fields: DT_FIELDS, index_field: C_DT_IDX, table: DATATYPE_TABLE },
    Group { name: "subreg", fields: SUBREG_FIELDS, index_field: C_SUBREG_IDX, table: SUBREG_TABLE },
    Group { name: "src0", fields: SRC0_FIELDS, index_field: C_SRC0_IDX, table: SRC_TABLE },
    Group { name: "src1", fields: SRC1_FIELDS, index_field: C_SRC1_IDX, table: SRC_TABLE },
];

fn group_value(mi: &MInst, fields: &[Field]) -> u64 {
    let mut v = 0u64;
    let mut shift = 0u32;
    for f in fields {
        v |= mi.get(*f) << shift;
        shift += f.len;
    }
    v
}

fn scatter_group(mi: &mut MInst, fields: &[Field], mut v: u64) {
    for f in fields {
        mi.set(*f, v & ((1u64 << f.len) - 1));
        v >>= f.len;
    }
}

/// Nearest table entries by Hamming distance, closest first.
fn nearest(table: &[u64], value: u64, n: usize) -> Vec<(usize, u64, u32)> {
    let mut ranked: Vec<(usize, u64, u32)> = table
        .iter()
        .enumerate()
        .map(|(i, &e)| (i, e, (e ^ value).count_ones()))
        .collect();
    ranked.sort_by_key(|&(i, _, d)| (d, i));
    ranked.truncate(n);
    ranked
}

/// One field group the instruction missed in the pattern tables.
#[derive(Debug)]
pub struct GroupMiss {
    pub group: &'static str,
    pub value: u64,
    /// `(index, entry, hamming distance)`, closest first.
    pub nearest: Vec<(usize, u64, u32)>,
}

#[derive(Debug, Error)]
#[error("{}", self.render())]
pub struct CompactMiss {
    pub groups: Vec<GroupMiss>,
}

impl CompactMiss {
    fn render(&self) -> String {
        let mut s = String::from("no compact encoding:");
        for g in &self.groups {
            s.push_str(&format!(" {} group {:#x} missed (nearest:", g.group, g.value));
            for (i, e, d) in &g.nearest {
                s.push_str(&format!(" [{}]={:#x} dist {}", i, e, d));
            }
            s.push(')');
        }
        s
    }
}

#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("{group} index {index} exceeds table ({len} entries)")]
    BadIndex { group: &'static str, index: u64, len: usize },
}

/// Pack a regular record into the compact form. The caller has already
/// ruled out the categorically ineligible shapes (branch, send,
/// immediates, indirect operands).
pub fn try_compact(mi: &MInst) -> Result<MInst, CompactMiss> {
    let mut misses = Vec::new();
    let mut indices = [0u64; 5];
    for (slot, g) in GROUPS.iter().enumerate() {
        let v = group_value(mi, g.fields);
        match g.table.iter().position(|&e| e == v) {
            Some(i) => indices[slot] = i as u64,
            None => misses.push(GroupMiss { group: g.name, value: v, nearest: nearest(g.table, v, 2) }),
        }
    }
    if !misses.is_empty() {
        return Err(CompactMiss { groups: misses });
    }
    let mut cm = MInst::new();
    cm.set(OPCODE, mi.get(OPCODE));
    for (slot, g) in GROUPS.iter().enumerate() {
        cm.set(g.index_field, indices[slot]);
    }
    cm.set(CMPT_CTRL, 1);
    cm.set(C_DST_REG, mi.get(DST_REG));
    cm.set(C_SRC0_REG, mi.get(SRC0_REG));
    cm.set(C_SRC1_REG, mi.get(SRC1_REG));
    Ok(cm)
}

/// Expand a compact record back to the regular 16-byte form.
pub fn expand(cm: &MInst) -> Result<MInst, ExpandError> {
    let mut mi = MInst::new();
    mi.set(OPCODE, cm.get(OPCODE));
    for g in GROUPS {
        let idx = cm.get(g.index_field);
        let Some(&v) = g.table.get(idx as usize) else {
            return Err(ExpandError::BadIndex { group: g.name, index: idx, len: g.table.len() });
        };
        scatter_group(&mut mi, g.fields, v);
    }
    mi.set(DST_REG, cm.get(C_DST_REG));
    mi.set(SRC0_REG, cm.get(C_SRC0_REG));
    mi.set(SRC1_REG, cm.get(C_SRC1_REG));
    Ok(mi)
}
