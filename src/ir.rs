//! In-memory data model: kernels, blocks, instructions, operands, regions.
//!
//! Overlapping storage in the source format becomes proper sum types here
//! (`Operand`, `ImmVal`, `LabelTarget`, `SendDesc`), so "which member is
//! active" is carried by the type system.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::ops::{Op, OpSpec};

/// Hardware generations this assembler targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Gen9,
    Gen11,
    XeLp,
}

impl Platform {
    pub fn name(self) -> &'static str {
        match self {
            Platform::Gen9 => "gen9",
            Platform::Gen11 => "gen11",
            Platform::XeLp => "xelp",
        }
    }
}

/// Element types. The numeric value is the 4-bit encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Type {
    UB = 0,
    B = 1,
    UW = 2,
    W = 3,
    UD = 4,
    D = 5,
    UQ = 6,
    Q = 7,
    HF = 8,
    F = 9,
    DF = 10,
    Invalid = 15,
}

impl Type {
    pub fn from_code(code: u32) -> Option<Type> {
        Some(match code {
            0 => Type::UB,
            1 => Type::B,
            2 => Type::UW,
            3 => Type::W,
            4 => Type::UD,
            5 => Type::D,
            6 => Type::UQ,
            7 => Type::Q,
            8 => Type::HF,
            9 => Type::F,
            10 => Type::DF,
            15 => Type::Invalid,
            _ => return None,
        })
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Element size in bytes; Invalid reports 0.
    pub fn size(self) -> u32 {
        match self {
            Type::UB | Type::B => 1,
            Type::UW | Type::W | Type::HF => 2,
            Type::UD | Type::D | Type::F => 4,
            Type::UQ | Type::Q | Type::DF => 8,
            Type::Invalid => 0,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Type::HF | Type::F | Type::DF)
    }

    pub fn is_signed_int(self) -> bool {
        matches!(self, Type::B | Type::W | Type::D | Type::Q)
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::UB => "ub",
            Type::B => "b",
            Type::UW => "uw",
            Type::W => "w",
            Type::UD => "ud",
            Type::D => "d",
            Type::UQ => "uq",
            Type::Q => "q",
            Type::HF => "hf",
            Type::F => "f",
            Type::DF => "df",
            Type::Invalid => "?",
        }
    }

    pub fn from_name(s: &str) -> Option<Type> {
        Some(match s {
            "ub" => Type::UB,
            "b" => Type::B,
            "uw" => Type::UW,
            "w" => Type::W,
            "ud" => Type::UD,
            "d" => Type::D,
            "uq" => Type::UQ,
            "q" => Type::Q,
            "hf" => Type::HF,
            "f" => Type::F,
            "df" => Type::DF,
            _ => return None,
        })
    }
}

/// Register classes. GRF is `r#`; the rest live in the architectural file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegClass {
    Grf,
    Null,
    Addr,
    Acc,
    Flag,
    Sp,
    Ip,
}

impl RegClass {
    pub fn is_arf(self) -> bool {
        !matches!(self, RegClass::Grf)
    }

    /// ARF registers encode the class in the high nibble of the register
    /// number field.
    pub fn arf_nibble(self) -> u32 {
        match self {
            RegClass::Grf => 0, // unused
            RegClass::Null => 0x0,
            RegClass::Addr => 0x1,
            RegClass::Acc => 0x2,
            RegClass::Flag => 0x3,
            RegClass::Sp => 0x6,
            RegClass::Ip => 0x7,
        }
    }

    pub fn from_arf_nibble(n: u32) -> Option<RegClass> {
        Some(match n {
            0x0 => RegClass::Null,
            0x1 => RegClass::Addr,
            0x2 => RegClass::Acc,
            0x3 => RegClass::Flag,
            0x6 => RegClass::Sp,
            0x7 => RegClass::Ip,
            _ => return None,
        })
    }

    pub fn prefix(self) -> &'static str {
        match self {
            RegClass::Grf => "r",
            RegClass::Null => "null",
            RegClass::Addr => "a",
            RegClass::Acc => "acc",
            RegClass::Flag => "f",
            RegClass::Sp => "sp",
            RegClass::Ip => "ip",
        }
    }
}

/// The 32-byte GRF register size; subregister numbers are element indices
/// within one register.
pub const REG_BYTES: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SrcMod {
    None,
    Abs,
    Neg,
    NegAbs,
}

impl SrcMod {
    pub fn code(self) -> u32 {
        match self {
            SrcMod::None => 0,
            SrcMod::Abs => 1,
            SrcMod::Neg => 2,
            SrcMod::NegAbs => 3,
        }
    }

    pub fn from_code(c: u32) -> SrcMod {
        match c & 3 {
            1 => SrcMod::Abs,
            2 => SrcMod::Neg,
            3 => SrcMod::NegAbs,
            _ => SrcMod::None,
        }
    }
}

/// Vertical stride: elements between rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VertStride {
    V0,
    V1,
    V2,
    V4,
    V8,
    V16,
    V32,
    Invalid,
}

/// Row width in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Width {
    W1,
    W2,
    W4,
    W8,
    W16,
    Invalid,
}

/// Horizontal stride: elements between columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HorzStride {
    H0,
    H1,
    H2,
    H4,
    Invalid,
}

impl VertStride {
    pub fn value(self) -> Option<u32> {
        Some(match self {
            VertStride::V0 => 0,
            VertStride::V1 => 1,
            VertStride::V2 => 2,
            VertStride::V4 => 4,
            VertStride::V8 => 8,
            VertStride::V16 => 16,
            VertStride::V32 => 32,
            VertStride::Invalid => return None,
        })
    }

    pub fn from_value(v: u32) -> Option<VertStride> {
        Some(match v {
            0 => VertStride::V0,
            1 => VertStride::V1,
            2 => VertStride::V2,
            4 => VertStride::V4,
            8 => VertStride::V8,
            16 => VertStride::V16,
            32 => VertStride::V32,
            _ => return None,
        })
    }

    /// 4-bit field code: 0 is V0, otherwise log2(v)+1.
    pub fn code(self) -> u32 {
        match self {
            VertStride::V0 => 0,
            VertStride::V1 => 1,
            VertStride::V2 => 2,
            VertStride::V4 => 3,
            VertStride::V8 => 4,
            VertStride::V16 => 5,
            VertStride::V32 => 6,
            VertStride::Invalid => 15,
        }
    }

    pub fn from_code(c: u32) -> Option<VertStride> {
        Some(match c {
            0 => VertStride::V0,
            1 => VertStride::V1,
            2 => VertStride::V2,
            3 => VertStride::V4,
            4 => VertStride::V8,
            5 => VertStride::V16,
            6 => VertStride::V32,
            15 => VertStride::Invalid,
            _ => return None,
        })
    }
}

impl Width {
    pub fn value(self) -> Option<u32> {
        Some(match self {
            Width::W1 => 1,
            Width::W2 => 2,
            Width::W4 => 4,
            Width::W8 => 8,
            Width::W16 => 16,
            Width::Invalid => return None,
        })
    }

    pub fn from_value(v: u32) -> Option<Width> {
        Some(match v {
            1 => Width::W1,
            2 => Width::W2,
            4 => Width::W4,
            8 => Width::W8,
            16 => Width::W16,
            _ => return None,
        })
    }

    /// 3-bit field code: log2(w); 7 is the invalid sentinel.
    pub fn code(self) -> u32 {
        match self {
            Width::W1 => 0,
            Width::W2 => 1,
            Width::W4 => 2,
            Width::W8 => 3,
            Width::W16 => 4,
            Width::Invalid => 7,
        }
    }

    pub fn from_code(c: u32) -> Option<Width> {
        Some(match c {
            0 => Width::W1,
            1 => Width::W2,
            2 => Width::W4,
            3 => Width::W8,
            4 => Width::W16,
            7 => Width::Invalid,
            _ => return None,
        })
    }
}

impl HorzStride {
    pub fn value(self) -> Option<u32> {
        Some(match self {
            HorzStride::H0 => 0,
            HorzStride::H1 => 1,
            HorzStride::H2 => 2,
            HorzStride::H4 => 4,
            HorzStride::Invalid => return None,
        })
    }

    pub fn from_value(v: u32) -> Option<HorzStride> {
        Some(match v {
            0 => HorzStride::H0,
            1 => HorzStride::H1,
            2 => HorzStride::H2,
            4 => HorzStride::H4,
            _ => return None,
        })
    }

    /// 2-bit field code: 0,1,2 map through; 3 is H4. No invalid code; the
    /// sentinel never reaches the binary.
    pub fn code(self) -> u32 {
        match self {
            HorzStride::H0 => 0,
            HorzStride::H1 => 1,
            HorzStride::H2 => 2,
            HorzStride::H4 | HorzStride::Invalid => 3,
        }
    }

    pub fn from_code(c: u32) -> HorzStride {
        match c & 3 {
            0 => HorzStride::H0,
            1 => HorzStride::H1,
            2 => HorzStride::H2,
            _ => HorzStride::H4,
        }
    }
}

/// A strided access pattern `<vs;w,h>`. `Region::INVALID` is the legal
/// "omitted / not applicable" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub vs: VertStride,
    pub w: Width,
    pub hs: HorzStride,
}

impl Region {
    pub const INVALID: Region =
        Region { vs: VertStride::Invalid, w: Width::Invalid, hs: HorzStride::Invalid };

    /// Destination regions carry only a horizontal stride.
    pub const DST1: Region = Region { vs: VertStride::Invalid, w: Width::Invalid, hs: HorzStride::H1 };

    pub const SCALAR: Region = Region { vs: VertStride::V0, w: Width::W1, hs: HorzStride::H0 };

    pub fn new(vs: u32, w: u32, hs: u32) -> Option<Region> {
        Some(Region {
            vs: VertStride::from_value(vs)?,
            w: Width::from_value(w)?,
            hs: HorzStride::from_value(hs)?,
        })
    }

    pub fn is_invalid(self) -> bool {
        self == Region::INVALID
    }
}

/// SIMD predication control function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredCtrl {
    None,
    /// Per-channel sequential predication (the default when a predicate
    /// is written without a function suffix).
    Seq,
    AnyV,
    AllV,
    Any2H,
    All2H,
    Any4H,
    All4H,
    Any8H,
    All8H,
    Any16H,
    All16H,
}

impl PredCtrl {
    pub fn code(self) -> u32 {
        match self {
            PredCtrl::None => 0,
            PredCtrl::Seq => 1,
            PredCtrl::AnyV => 2,
            PredCtrl::AllV => 3,
            PredCtrl::Any2H => 4,
            PredCtrl::All2H => 5,
            PredCtrl::Any4H => 6,
            PredCtrl::All4H => 7,
            PredCtrl::Any8H => 8,
            PredCtrl::All8H => 9,
            PredCtrl::Any16H => 10,
            PredCtrl::All16H => 11,
        }
    }

    pub fn from_code(c: u32) -> Option<PredCtrl> {
        Some(match c {
            0 => PredCtrl::None,
            1 => PredCtrl::Seq,
            2 => PredCtrl::AnyV,
            3 => PredCtrl::AllV,
            4 => PredCtrl::Any2H,
            5 => PredCtrl::All2H,
            6 => PredCtrl::Any4H,
            7 => PredCtrl::All4H,
            8 => PredCtrl::Any8H,
            9 => PredCtrl::All8H,
            10 => PredCtrl::Any16H,
            11 => PredCtrl::All16H,
            _ => return None,
        })
    }

    pub fn suffix(self) -> &'static str {
        match self {
            PredCtrl::None | PredCtrl::Seq => "",
            PredCtrl::AnyV => "anyv",
            PredCtrl::AllV => "allv",
            PredCtrl::Any2H => "any2h",
            PredCtrl::All2H => "all2h",
            PredCtrl::Any4H => "any4h",
            PredCtrl::All4H => "all4h",
            PredCtrl::Any8H => "any8h",
            PredCtrl::All8H => "all8h",
            PredCtrl::Any16H => "any16h",
            PredCtrl::All16H => "all16h",
        }
    }

    pub fn from_suffix(s: &str) -> Option<PredCtrl> {
        Some(match s {
            "anyv" => PredCtrl::AnyV,
            "allv" => PredCtrl::AllV,
            "any2h" => PredCtrl::Any2H,
            "all2h" => PredCtrl::All2H,
            "any4h" => PredCtrl::Any4H,
            "all4h" => PredCtrl::All4H,
            "any8h" => PredCtrl::Any8H,
            "all8h" => PredCtrl::All8H,
            "any16h" => PredCtrl::Any16H,
            "all16h" => PredCtrl::All16H,
            _ => return None,
        })
    }
}

/// Flag-modifier condition code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CondMod {
    None,
    Ze,
    Nz,
    Gt,
    Ge,
    Lt,
    Le,
    Ov,
    Un,
}

impl CondMod {
    pub fn code(self) -> u32 {
        match self {
            CondMod::None => 0,
            CondMod::Ze => 1,
            CondMod::Nz => 2,
            CondMod::Gt => 3,
            CondMod::Ge => 4,
            CondMod::Lt => 5,
            CondMod::Le => 6,
            CondMod::Ov => 7,
            CondMod::Un => 8,
        }
    }

    pub fn from_code(c: u32) -> Option<CondMod> {
        Some(match c {
            0 => CondMod::None,
            1 => CondMod::Ze,
            2 => CondMod::Nz,
            3 => CondMod::Gt,
            4 => CondMod::Ge,
            5 => CondMod::Lt,
            6 => CondMod::Le,
            7 => CondMod::Ov,
            8 => CondMod::Un,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            CondMod::None => "",
            CondMod::Ze => "ze",
            CondMod::Nz => "nz",
            CondMod::Gt => "gt",
            CondMod::Ge => "ge",
            CondMod::Lt => "lt",
            CondMod::Le => "le",
            CondMod::Ov => "ov",
            CondMod::Un => "un",
        }
    }

    pub fn from_name(s: &str) -> Option<CondMod> {
        Some(match s {
            "ze" | "eq" => CondMod::Ze,
            "nz" | "ne" => CondMod::Nz,
            "gt" => CondMod::Gt,
            "ge" => CondMod::Ge,
            "lt" => CondMod::Lt,
            "le" => CondMod::Le,
            "ov" => CondMod::Ov,
            "un" => CondMod::Un,
            _ => return None,
        })
    }
}

/// A flag register reference `f0.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlagRef {
    pub reg: u8,
    pub sub: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pred {
    pub ctrl: PredCtrl,
    pub inverted: bool,
}

/// Implicit-accumulator selector on macro operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacroAcc {
    Mme(u8), // 0..=7
    NoAcc,
}

impl MacroAcc {
    pub fn code(self) -> u32 {
        match self {
            MacroAcc::Mme(n) => n as u32,
            MacroAcc::NoAcc => 8,
        }
    }

    pub fn from_code(c: u32) -> Option<MacroAcc> {
        match c {
            0..=7 => Some(MacroAcc::Mme(c as u8)),
            8 => Some(MacroAcc::NoAcc),
            _ => None,
        }
    }

    pub fn name(self) -> String {
        match self {
            MacroAcc::Mme(n) => format!("mme{}", n),
            MacroAcc::NoAcc => "noacc".to_string(),
        }
    }
}

/// Immediate value with its exact storage. Floats keep raw bits so NaN
/// payloads survive untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImmVal {
    U8(u8),
    S8(i8),
    U16(u16),
    S16(i16),
    U32(u32),
    S32(i32),
    U64(u64),
    S64(i64),
    F16(u16),
    F32(u32),
    F64(u64),
}

impl ImmVal {
    pub fn ty(self) -> Type {
        match self {
            ImmVal::U8(_) => Type::UB,
            ImmVal::S8(_) => Type::B,
            ImmVal::U16(_) => Type::UW,
            ImmVal::S16(_) => Type::W,
            ImmVal::U32(_) => Type::UD,
            ImmVal::S32(_) => Type::D,
            ImmVal::U64(_) => Type::UQ,
            ImmVal::S64(_) => Type::Q,
            ImmVal::F16(_) => Type::HF,
            ImmVal::F32(_) => Type::F,
            ImmVal::F64(_) => Type::DF,
        }
    }

    /// Raw bits, zero-extended to 64; what the encoder stores.
    pub fn bits(self) -> u64 {
        match self {
            ImmVal::U8(v) => v as u64,
            ImmVal::S8(v) => v as u8 as u64,
            ImmVal::U16(v) => v as u64,
            ImmVal::S16(v) => v as u16 as u64,
            ImmVal::U32(v) => v as u64,
            ImmVal::S32(v) => v as u32 as u64,
            ImmVal::U64(v) => v,
            ImmVal::S64(v) => v as u64,
            ImmVal::F16(b) => b as u64,
            ImmVal::F32(b) => b as u64,
            ImmVal::F64(b) => b,
        }
    }

    pub fn from_bits(ty: Type, bits: u64) -> Option<ImmVal> {
        Some(match ty {
            Type::UB => ImmVal::U8(bits as u8),
            Type::B => ImmVal::S8(bits as u8 as i8),
            Type::UW => ImmVal::U16(bits as u16),
            Type::W => ImmVal::S16(bits as u16 as i16),
            Type::UD => ImmVal::U32(bits as u32),
            Type::D => ImmVal::S32(bits as u32 as i32),
            Type::UQ => ImmVal::U64(bits),
            Type::Q => ImmVal::S64(bits as i64),
            Type::HF => ImmVal::F16(bits as u16),
            Type::F => ImmVal::F32(bits as u32),
            Type::DF => ImmVal::F64(bits),
            Type::Invalid => return None,
        })
    }

    /// True when the encoded value needs the 64-bit immediate slot.
    pub fn is_wide(self) -> bool {
        matches!(self, ImmVal::U64(_) | ImmVal::S64(_) | ImmVal::F64(_))
    }
}

/// Identifies a block within its kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub usize);

/// A branch target: resolved to a block, or still a raw signed byte
/// offset (decode path, before block inference). The transition from
/// `Offset` to `Block` happens exactly once and never reverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelTarget {
    Block(BlockId),
    Offset(i32),
}

/// Send message-descriptor argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendDesc {
    Imm(u32),
    /// `a0.#` indirect descriptor; parsed but not encodable.
    Reg { sub: u8 },
}

/// Operand sum type: exactly one variant's fields are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Direct {
        class: RegClass,
        reg: u8,
        sub: u8,
        region: Region,
        ty: Type,
        src_mod: SrcMod,
    },
    Indirect {
        /// a0 subregister supplying the address.
        addr_sub: u8,
        /// Signed byte offset added to the address register.
        offset: i16,
        region: Region,
        ty: Type,
        src_mod: SrcMod,
    },
    Imm(ImmVal),
    Label(LabelTarget),
    Macro {
        class: RegClass,
        reg: u8,
        acc: MacroAcc,
        region: Region,
        ty: Type,
        src_mod: SrcMod,
    },
}

impl Operand {
    pub fn null() -> Operand {
        Operand::Direct {
            class: RegClass::Null,
            reg: 0,
            sub: 0,
            region: Region::INVALID,
            ty: Type::Invalid,
            src_mod: SrcMod::None,
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            Operand::Direct { ty, .. }
            | Operand::Indirect { ty, .. }
            | Operand::Macro { ty, .. } => *ty,
            Operand::Imm(v) => v.ty(),
            Operand::Label(_) => Type::Invalid,
        }
    }

    pub fn region(&self) -> Region {
        match self {
            Operand::Direct { region, .. }
            | Operand::Indirect { region, .. }
            | Operand::Macro { region, .. } => *region,
            _ => Region::INVALID,
        }
    }

    pub fn src_mod(&self) -> SrcMod {
        match self {
            Operand::Direct { src_mod, .. }
            | Operand::Indirect { src_mod, .. }
            | Operand::Macro { src_mod, .. } => *src_mod,
            _ => SrcMod::None,
        }
    }

    pub fn is_imm(&self) -> bool {
        matches!(self, Operand::Imm(_))
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Operand::Label(_))
    }
}

bitflags! {
    /// Brace-list instruction options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct InstOpts: u32 {
        /// Mandate compaction; a table miss is then fatal.
        const COMPACTED = 1 << 0;
        /// Forbid the compaction attempt entirely.
        const NO_COMPACT = 1 << 1;
        const EOT = 1 << 2;
        const ATOMIC = 1 << 3;
        const SWITCH = 1 << 4;
    }
}

impl InstOpts {
    pub fn names(self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.contains(InstOpts::COMPACTED) {
            out.push("Compacted");
        }
        if self.contains(InstOpts::NO_COMPACT) {
            out.push("NoCompact");
        }
        if self.contains(InstOpts::ATOMIC) {
            out.push("Atomic");
        }
        if self.contains(InstOpts::SWITCH) {
            out.push("Switch");
        }
        if self.contains(InstOpts::EOT) {
            out.push("EOT");
        }
        out
    }

    pub fn from_opt_name(s: &str) -> Option<InstOpts> {
        Some(match s {
            "Compacted" => InstOpts::COMPACTED,
            "NoCompact" => InstOpts::NO_COMPACT,
            "Atomic" => InstOpts::ATOMIC,
            "Switch" => InstOpts::SWITCH,
            "EOT" => InstOpts::EOT,
            _ => return None,
        })
    }
}

/// Math-family subfunction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MathFn {
    Inv,
    Log,
    Exp,
    Sqt,
    Rsqt,
    Sin,
    Cos,
    Fdiv,
    Pow,
    Idiv,
    Iqot,
    Irem,
    Invm,
    Rsqtm,
}

impl MathFn {
    pub const ALL: [MathFn; 14] = [
        MathFn::Inv,
        MathFn::Log,
        MathFn::Exp,
        MathFn::Sqt,
        MathFn::Rsqt,
        MathFn::Sin,
        MathFn::Cos,
        MathFn::Fdiv,
        MathFn::Pow,
        MathFn::Idiv,
        MathFn::Iqot,
        MathFn::Irem,
        MathFn::Invm,
        MathFn::Rsqtm,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MathFn::Inv => "inv",
            MathFn::Log => "log",
            MathFn::Exp => "exp",
            MathFn::Sqt => "sqt",
            MathFn::Rsqt => "rsqt",
            MathFn::Sin => "sin",
            MathFn::Cos => "cos",
            MathFn::Fdiv => "fdiv",
            MathFn::Pow => "pow",
            MathFn::Idiv => "idiv",
            MathFn::Iqot => "iqot",
            MathFn::Irem => "irem",
            MathFn::Invm => "invm",
            MathFn::Rsqtm => "rsqtm",
        }
    }

    pub fn from_name(s: &str) -> Option<MathFn> {
        MathFn::ALL.iter().copied().find(|f| f.name() == s)
    }

    /// Stored in the CondMod field slot; math never takes a flag
    /// modifier.
    pub fn code(self) -> u32 {
        match self {
            MathFn::Inv => 1,
            MathFn::Log => 2,
            MathFn::Exp => 3,
            MathFn::Sqt => 4,
            MathFn::Rsqt => 5,
            MathFn::Sin => 6,
            MathFn::Cos => 7,
            MathFn::Fdiv => 8,
            MathFn::Pow => 9,
            MathFn::Idiv => 10,
            MathFn::Iqot => 11,
            MathFn::Irem => 12,
            MathFn::Invm => 13,
            MathFn::Rsqtm => 14,
        }
    }

    pub fn from_code(c: u32) -> Option<MathFn> {
        MathFn::ALL.iter().copied().find(|f| f.code() == c)
    }

    /// Unary subfunctions take one source; the family is otherwise
    /// binary-shaped. This is the documented source-count exception.
    pub fn num_srcs(self) -> usize {
        match self {
            MathFn::Inv
            | MathFn::Log
            | MathFn::Exp
            | MathFn::Sqt
            | MathFn::Rsqt
            | MathFn::Sin
            | MathFn::Cos => 1,
            MathFn::Fdiv
            | MathFn::Pow
            | MathFn::Idiv
            | MathFn::Iqot
            | MathFn::Irem
            | MathFn::Invm
            | MathFn::Rsqtm => 2,
        }
    }

    pub fn is_macro(self) -> bool {
        matches!(self, MathFn::Invm | MathFn::Rsqtm)
    }
}

/// The central unit: one fully-specified instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub math_fn: Option<MathFn>,
    pub exec_size: u8,
    /// Channel offset in lanes (0, 4, 8, ..., 28).
    pub chan_off: u8,
    /// Write-enable / NoMask (`(W)`).
    pub mask_ctrl: bool,
    pub pred: Option<Pred>,
    pub flag: FlagRef,
    pub cond_mod: CondMod,
    pub branch_ctrl: bool,
    /// Destination saturation (`(sat)` prefix).
    pub saturate: bool,
    pub dst: Option<Operand>,
    pub srcs: Vec<Operand>,
    pub desc: Option<SendDesc>,
    pub ex_desc: Option<SendDesc>,
    pub opts: InstOpts,
    /// Byte offset once placed; provisional during emit, final after
    /// compaction.
    pub pc: u32,
    pub id: u32,
    pub comment: Option<String>,
}

impl Instruction {
    pub fn new(op: Op) -> Instruction {
        Instruction {
            op,
            math_fn: None,
            exec_size: 1,
            chan_off: 0,
            mask_ctrl: false,
            pred: None,
            flag: FlagRef::default(),
            cond_mod: CondMod::None,
            branch_ctrl: false,
            saturate: false,
            dst: None,
            srcs: Vec::new(),
            desc: None,
            ex_desc: None,
            opts: InstOpts::empty(),
            pc: 0,
            id: 0,
            comment: None,
        }
    }

    pub fn spec(&self) -> &'static OpSpec {
        crate::ops::spec(self.op)
    }

    /// Final encoded length in bytes (valid after encoding).
    pub fn encoded_len(&self) -> u32 {
        if self.opts.contains(InstOpts::COMPACTED) {
            8
        } else {
            16
        }
    }
}

/// A maximal straight-line run of instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub name: Option<String>,
    /// Byte offset of the block within the final binary.
    pub offset: u32,
    pub instrs: Vec<Instruction>,
}

/// Owns the ordered blocks of one compilation unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Kernel {
    pub blocks: Vec<Block>,
    next_id: u32,
}

impl Kernel {
    pub fn new() -> Kernel {
        Kernel::default()
    }

    pub fn add_block(&mut self, name: Option<String>) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(Block { id, name, offset: 0, instrs: Vec::new() });
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0]
    }

    /// Fresh per-kernel instruction sequence id.
    pub fn next_inst_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.instrs.iter())
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instrs.len()).sum()
    }
}
