//! Static per-opcode metadata. Built once as const data, read-only
//! thereafter; parser, encoder, and formatter all share it.

use bitflags::bitflags;

use crate::ir::{MathFn, Platform, Region, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Illegal,
    Nop,
    Mov,
    Sel,
    Not,
    And,
    Or,
    Xor,
    Shr,
    Shl,
    Asr,
    Cmp,
    Add,
    Addc,
    Mul,
    Avg,
    Rndu,
    Rndd,
    Rnde,
    Rndz,
    Lzd,
    Cbit,
    Mad,
    Lrp,
    Madm,
    Math,
    Send,
    Sendc,
    Jmpi,
    If,
    Else,
    Endif,
    While,
    Break,
    Cont,
    Call,
    Calla,
    Ret,
    Goto,
    Join,
}

/// Syntax class: how many explicit operands the op takes and which
/// grammar shape applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Nullary,
    Unary,
    Binary,
    Ternary,
    /// Binary-shaped family with a mandatory `.subfunction`; unary
    /// subfunctions drop one source.
    Math,
    Send,
    Branch,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpAttrs: u16 {
        const PREDICATION = 1 << 0;
        const FLAG_MODIFIER = 1 << 1;
        const SATURATION = 1 << 2;
        const SRC_MODS = 1 << 3;
        const BRANCH_CTRL = 1 << 4;
        /// Uses macro operands (implicit-accumulator selectors).
        const MACRO = 1 << 5;
    }
}

/// Platform availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Avail {
    All,
    PreXe,
}

#[derive(Debug)]
pub struct OpSpec {
    pub op: Op,
    /// 7-bit opcode field value.
    pub code: u8,
    pub mnemonic: &'static str,
    pub class: OpClass,
    pub attrs: OpAttrs,
    pub avail: Avail,
}

const ALU_ATTRS: OpAttrs = OpAttrs::PREDICATION
    .union(OpAttrs::FLAG_MODIFIER)
    .union(OpAttrs::SATURATION)
    .union(OpAttrs::SRC_MODS);

const BR_ATTRS: OpAttrs = OpAttrs::PREDICATION.union(OpAttrs::BRANCH_CTRL);

pub const TABLE: &[OpSpec] = &[
    OpSpec { op: Op::Illegal, code: 0x00, mnemonic: "illegal", class: OpClass::Nullary, attrs: OpAttrs::empty(), avail: Avail::All },
    OpSpec { op: Op::Mov, code: 0x01, mnemonic: "mov", class: OpClass::Unary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Sel, code: 0x02, mnemonic: "sel", class: OpClass::Binary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Not, code: 0x04, mnemonic: "not", class: OpClass::Unary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::And, code: 0x05, mnemonic: "and", class: OpClass::Binary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Or, code: 0x06, mnemonic: "or", class: OpClass::Binary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Xor, code: 0x07, mnemonic: "xor", class: OpClass::Binary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Shr, code: 0x08, mnemonic: "shr", class: OpClass::Binary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Shl, code: 0x09, mnemonic: "shl", class: OpClass::Binary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Asr, code: 0x0C, mnemonic: "asr", class: OpClass::Binary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Cmp, code: 0x10, mnemonic: "cmp", class: OpClass::Binary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Jmpi, code: 0x20, mnemonic: "jmpi", class: OpClass::Branch, attrs: BR_ATTRS, avail: Avail::All },
    OpSpec { op: Op::If, code: 0x22, mnemonic: "if", class: OpClass::Branch, attrs: BR_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Else, code: 0x24, mnemonic: "else", class: OpClass::Branch, attrs: OpAttrs::BRANCH_CTRL, avail: Avail::All },
    OpSpec { op: Op::Endif, code: 0x25, mnemonic: "endif", class: OpClass::Branch, attrs: OpAttrs::empty(), avail: Avail::All },
    OpSpec { op: Op::While, code: 0x27, mnemonic: "while", class: OpClass::Branch, attrs: BR_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Break, code: 0x28, mnemonic: "break", class: OpClass::Branch, attrs: BR_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Cont, code: 0x29, mnemonic: "cont", class: OpClass::Branch, attrs: BR_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Calla, code: 0x2B, mnemonic: "calla", class: OpClass::Branch, attrs: BR_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Call, code: 0x2C, mnemonic: "call", class: OpClass::Branch, attrs: BR_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Ret, code: 0x2D, mnemonic: "ret", class: OpClass::Branch, attrs: BR_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Goto, code: 0x2E, mnemonic: "goto", class: OpClass::Branch, attrs: BR_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Join, code: 0x2F, mnemonic: "join", class: OpClass::Branch, attrs: OpAttrs::empty(), avail: Avail::All },
    OpSpec { op: Op::Send, code: 0x31, mnemonic: "send", class: OpClass::Send, attrs: OpAttrs::PREDICATION, avail: Avail::All },
    OpSpec { op: Op::Sendc, code: 0x32, mnemonic: "sendc", class: OpClass::Send, attrs: OpAttrs::PREDICATION, avail: Avail::All },
    OpSpec { op: Op::Math, code: 0x38, mnemonic: "math", class: OpClass::Math, attrs: OpAttrs::PREDICATION.union(OpAttrs::SATURATION).union(OpAttrs::SRC_MODS).union(OpAttrs::MACRO), avail: Avail::All },
    OpSpec { op: Op::Add, code: 0x40, mnemonic: "add", class: OpClass::Binary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Mul, code: 0x41, mnemonic: "mul", class: OpClass::Binary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Avg, code: 0x42, mnemonic: "avg", class: OpClass::Binary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Rndu, code: 0x43, mnemonic: "rndu", class: OpClass::Unary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Rndd, code: 0x44, mnemonic: "rndd", class: OpClass::Unary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Rnde, code: 0x45, mnemonic: "rnde", class: OpClass::Unary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Addc, code: 0x46, mnemonic: "addc", class: OpClass::Binary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Rndz, code: 0x47, mnemonic: "rndz", class: OpClass::Unary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Lzd, code: 0x4A, mnemonic: "lzd", class: OpClass::Unary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Cbit, code: 0x4D, mnemonic: "cbit", class: OpClass::Unary, attrs: ALU_ATTRS, avail: Avail::All },
    OpSpec { op: Op::Mad, code: 0x5A, mnemonic: "mad", class: OpClass::Ternary, attrs: OpAttrs::PREDICATION.union(OpAttrs::SATURATION).union(OpAttrs::SRC_MODS), avail: Avail::All },
    OpSpec { op: Op::Lrp, code: 0x5B, mnemonic: "lrp", class: OpClass::Ternary, attrs: OpAttrs::PREDICATION.union(OpAttrs::SATURATION).union(OpAttrs::SRC_MODS), avail: Avail::PreXe },
    OpSpec { op: Op::Madm, code: 0x5D, mnemonic: "madm", class: OpClass::Ternary, attrs: OpAttrs::PREDICATION.union(OpAttrs::SRC_MODS).union(OpAttrs::MACRO), avail: Avail::All },
    OpSpec { op: Op::Nop, code: 0x7E, mnemonic: "nop", class: OpClass::Nullary, attrs: OpAttrs::empty(), avail: Avail::All },
];

impl OpSpec {
    pub fn supports(&self, platform: Platform) -> bool {
        match self.avail {
            Avail::All => true,
            Avail::PreXe => !matches!(platform, Platform::XeLp),
        }
    }

    pub fn has_dst(&self) -> bool {
        match self.class {
            OpClass::Nullary | OpClass::Branch => false,
            _ => true,
        }
    }

    /// How many source operands this op takes; the math family varies by
    /// subfunction.
    pub fn num_srcs(&self, math_fn: Option<MathFn>) -> usize {
        match self.class {
            OpClass::Nullary => 0,
            OpClass::Unary => 1,
            OpClass::Binary => 2,
            OpClass::Ternary => 3,
            OpClass::Math => math_fn.map(MathFn::num_srcs).unwrap_or(2),
            OpClass::Send => 1,
            // one label, except ret which takes its return-address register
            OpClass::Branch => 1,
        }
    }

    pub fn is_branching(&self) -> bool {
        self.class == OpClass::Branch
    }

    pub fn is_send(&self) -> bool {
        self.class == OpClass::Send
    }

    /// Fully-qualified mnemonic for a sub-operation, e.g. `math.inv`.
    pub fn qualified(&self, math_fn: Option<MathFn>) -> String {
        match math_fn {
            Some(f) if self.class == OpClass::Math => format!("{}.{}", self.mnemonic, f.name()),
            _ => self.mnemonic.to_string(),
        }
    }

    /// Platform-implicit region for source `idx`, if this op declares
    /// one. A written region must then agree with it.
    pub fn implicit_src_region(&self, platform: Platform, _idx: usize) -> Option<Region> {
        match self.class {
            OpClass::Branch => Some(Region::INVALID),
            OpClass::Send => Some(Region::INVALID),
            OpClass::Math => Some(match platform {
                Platform::Gen9 | Platform::Gen11 => {
                    Region { vs: crate::ir::VertStride::V8, w: crate::ir::Width::W8, hs: crate::ir::HorzStride::H1 }
                }
                Platform::XeLp => Region::SCALAR,
            }),
            _ => None,
        }
    }

    /// Platform-implicit element type for the destination.
    pub fn implicit_dst_type(&self, _platform: Platform) -> Option<Type> {
        match self.class {
            OpClass::Send => Some(Type::UD),
            OpClass::Math => Some(Type::F),
            _ => None,
        }
    }

    /// Platform-implicit element type for source `idx`.
    pub fn implicit_src_type(&self, _platform: Platform, _idx: usize) -> Option<Type> {
        match (self.op, self.class) {
            (Op::Jmpi | Op::Call | Op::Calla | Op::Ret, _) => Some(Type::D),
            (_, OpClass::Branch) => Some(Type::D),
            (_, OpClass::Send) => Some(Type::UD),
            (_, OpClass::Math) => Some(Type::F),
            _ => None,
        }
    }
}

/// Default source region substituted when the text omits one and the op
/// has no implicit region: full rows up to 8 wide, scalar for SIMD1.
pub fn default_src_region(exec_size: u8) -> Region {
    match exec_size {
        0 | 1 => Region::SCALAR,
        2 => Region::new(2, 2, 1).unwrap(),
        4 => Region::new(4, 4, 1).unwrap(),
        _ => Region::new(8, 8, 1).unwrap(),
    }
}

pub fn spec(op: Op) -> &'static OpSpec {
    TABLE.iter().find(|s| s.op == op).expect("op present in TABLE")
}

pub fn by_code(code: u8) -> Option<&'static OpSpec> {
    TABLE.iter().find(|s| s.code == code)
}

pub fn by_mnemonic(name: &str) -> Option<&'static OpSpec> {
    TABLE.iter().find(|s| s.mnemonic == name)
}

/// Resolve a qualified sub-operation, e.g. ("math", "rsqt").
pub fn by_qualified(family: &str, sub: &str) -> Option<(&'static OpSpec, MathFn)> {
    let spec = by_mnemonic(family)?;
    if spec.class != OpClass::Math {
        return None;
    }
    Some((spec, MathFn::from_name(sub)?))
}

/// Short sub-operation aliases: accepted only when the bare name is not a
/// top-level mnemonic and names exactly one sub-operation.
pub fn by_alias(name: &str) -> Option<(&'static OpSpec, MathFn)> {
    if by_mnemonic(name).is_some() {
        return None;
    }
    let f = MathFn::from_name(name)?;
    Some((by_mnemonic("math").expect("math in TABLE"), f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        for (i, a) in TABLE.iter().enumerate() {
            for b in &TABLE[i + 1..] {
                assert_ne!(a.code, b.code, "{} vs {}", a.mnemonic, b.mnemonic);
                assert_ne!(a.mnemonic, b.mnemonic);
            }
        }
    }

    #[test]
    fn lookup_paths() {
        assert_eq!(by_mnemonic("mov").unwrap().op, Op::Mov);
        assert_eq!(by_code(0x7E).unwrap().op, Op::Nop);
        let (s, f) = by_qualified("math", "sin").unwrap();
        assert_eq!(s.op, Op::Math);
        assert_eq!(f, MathFn::Sin);
        // alias accepted because `inv` is not a top-level mnemonic
        let (s, f) = by_alias("inv").unwrap();
        assert_eq!(s.op, Op::Math);
        assert_eq!(f, MathFn::Inv);
        assert!(by_alias("mov").is_none());
        assert!(by_qualified("add", "inv").is_none());
    }

    #[test]
    fn lrp_gated_off_xe() {
        let lrp = spec(Op::Lrp);
        assert!(lrp.supports(Platform::Gen9));
        assert!(!lrp.supports(Platform::XeLp));
    }

    #[test]
    fn src_counts() {
        assert_eq!(spec(Op::Mov).num_srcs(None), 1);
        assert_eq!(spec(Op::Mad).num_srcs(None), 3);
        assert_eq!(spec(Op::Math).num_srcs(Some(MathFn::Cos)), 1);
        assert_eq!(spec(Op::Math).num_srcs(Some(MathFn::Idiv)), 2);
        assert!(!spec(Op::If).has_dst());
        assert!(spec(Op::Send).has_dst());
    }
}
