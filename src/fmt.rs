//! Canonical text formatter. Output is deterministic and reparses to
//! the same IR: regions and types are elided exactly where the parser
//! would reinstate the identical value, and never anywhere else.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::float;
use crate::ir::{
    BlockId, CondMod, ImmVal, Instruction, Kernel, LabelTarget, Operand, Platform, PredCtrl,
    RegClass, Region, SendDesc,
};
use crate::ops::{self, OpClass, OpSpec};
use crate::parser;
use crate::send::{describe_desc, DescriptorCodec, Sfid};

pub struct FmtOpts<'a> {
    /// Vendor descriptor codec for send comments; the built-in fallback
    /// fills in when absent or declining.
    pub codec: Option<&'a dyn DescriptorCodec>,
    /// Prefix every instruction with its `pc` as a comment column.
    pub pc_comments: bool,
}

impl Default for FmtOpts<'_> {
    fn default() -> Self {
        FmtOpts { codec: None, pc_comments: false }
    }
}

fn label_name(k: &Kernel, id: BlockId) -> String {
    match &k.block(id).name {
        Some(n) => n.clone(),
        None => format!("L{:04X}", k.block(id).offset),
    }
}

/// Blocks that need a label line: named ones and branch targets.
fn referenced_blocks(k: &Kernel) -> HashSet<BlockId> {
    let mut set = HashSet::new();
    for inst in k.instructions() {
        for src in &inst.srcs {
            if let Operand::Label(LabelTarget::Block(id)) = src {
                set.insert(*id);
            }
        }
    }
    set
}

pub fn format_kernel(k: &Kernel, platform: Platform, opts: &FmtOpts) -> String {
    let refs = referenced_blocks(k);
    let mut out = String::new();
    for block in &k.blocks {
        let labeled = block.name.is_some() || refs.contains(&block.id);
        if block.instrs.is_empty() && !labeled {
            continue;
        }
        if labeled {
            let _ = writeln!(out, "{}:", label_name(k, block.id));
        }
        for inst in &block.instrs {
            if opts.pc_comments {
                let _ = write!(out, "/* {:#06x} */ ", inst.pc);
            }
            out.push_str(&format_instruction(k, inst, platform, opts));
            out.push('\n');
        }
    }
    out
}

pub fn format_instruction(
    k: &Kernel,
    inst: &Instruction,
    platform: Platform,
    opts: &FmtOpts,
) -> String {
    let spec = ops::spec(inst.op);
    let mut s = String::new();

    // predication prefix
    if inst.mask_ctrl || inst.pred.is_some() {
        s.push('(');
        if inst.mask_ctrl {
            s.push('W');
            if inst.pred.is_some() {
                s.push('&');
            }
        }
        if let Some(p) = inst.pred {
            if p.inverted {
                s.push('~');
            }
            let _ = write!(s, "f{}.{}", inst.flag.reg, inst.flag.sub);
            if !matches!(p.ctrl, PredCtrl::None | PredCtrl::Seq) {
                let _ = write!(s, ".{}", p.ctrl.suffix());
            }
        }
        s.push_str(") ");
    }

    s.push_str(&spec.qualified(inst.math_fn));
    let _ = write!(s, " ({}|M{})", inst.exec_size, inst.chan_off);

    if inst.cond_mod != CondMod::None {
        let _ = write!(s, " ({})f{}.{}", inst.cond_mod.name(), inst.flag.reg, inst.flag.sub);
    }

    if let Some(dst) = &inst.dst {
        s.push(' ');
        if inst.saturate {
            s.push_str("(sat)");
        }
        s.push_str(&fmt_dst(spec, dst, platform));
    }
    for (i, src) in inst.srcs.iter().enumerate() {
        s.push(' ');
        s.push_str(&fmt_src(k, spec, inst, i, src, platform));
    }
    if spec.is_send() {
        if let Some(d) = &inst.ex_desc {
            s.push(' ');
            s.push_str(&fmt_desc(d));
        }
        if let Some(d) = &inst.desc {
            s.push(' ');
            s.push_str(&fmt_desc(d));
        }
    }

    let optnames = inst.opts.names();
    if !optnames.is_empty() {
        let _ = write!(s, " {{{}}}", optnames.join(", "));
    }

    if spec.is_send() {
        if let Some(c) = send_comment(inst, platform, opts) {
            s.push_str("  // ");
            s.push_str(&c);
        }
    }
    s
}

fn fmt_desc(d: &SendDesc) -> String {
    match d {
        SendDesc::Imm(v) => format!("{:#x}", v),
        SendDesc::Reg { sub } => format!("a0.{}", sub),
    }
}

fn send_comment(inst: &Instruction, platform: Platform, opts: &FmtOpts) -> Option<String> {
    let (Some(SendDesc::Imm(ex)), Some(SendDesc::Imm(desc))) = (&inst.ex_desc, &inst.desc) else {
        return None;
    };
    let sfid = Sfid::from_code(ex & 0xF)?;
    let sum = describe_desc(opts.codec, platform, sfid, *desc);
    let mut c = format!(
        "{}: msg={} rsp={}{}",
        sum.sfid.name(),
        sum.msg_len,
        sum.resp_len,
        if sum.header_present { " hdr" } else { "" },
    );
    match &sum.msg_type_name {
        Some(n) => {
            let _ = write!(c, " {}", n);
        }
        None => {
            let _ = write!(c, " type={}", sum.msg_type);
        }
    }
    Some(c)
}

fn reg_base(class: RegClass, reg: u8) -> String {
    match class {
        RegClass::Null | RegClass::Sp | RegClass::Ip => class.prefix().to_string(),
        _ => format!("{}{}", class.prefix(), reg),
    }
}

fn fmt_dst(spec: &'static OpSpec, dst: &Operand, platform: Platform) -> String {
    let mut s = String::new();
    match dst {
        Operand::Direct { class, reg, sub, .. } => {
            s.push_str(&reg_base(*class, *reg));
            if !matches!(class, RegClass::Null | RegClass::Sp | RegClass::Ip) {
                let _ = write!(s, ".{}", sub);
            }
        }
        Operand::Macro { class, reg, acc, .. } => {
            s.push_str(&reg_base(*class, *reg));
            let _ = write!(s, ".{}", acc.name());
        }
        Operand::Indirect { addr_sub, offset, .. } => {
            let _ = write!(s, "r[a0.{},{}]", addr_sub, offset);
        }
        Operand::Imm(_) | Operand::Label(_) => s.push_str("<bad-dst>"),
    }
    let default = if spec.is_send() { Region::INVALID } else { Region::DST1 };
    let region = dst.region();
    if region != default {
        let _ = write!(s, "<{}>", region.hs.value().unwrap_or(0));
    }
    if spec.implicit_dst_type(platform) != Some(dst.ty()) {
        let _ = write!(s, ":{}", dst.ty().name());
    }
    s
}

fn fmt_src(
    k: &Kernel,
    spec: &'static OpSpec,
    inst: &Instruction,
    idx: usize,
    src: &Operand,
    platform: Platform,
) -> String {
    match src {
        Operand::Label(LabelTarget::Block(id)) => return label_name(k, *id),
        Operand::Label(LabelTarget::Offset(off)) => return format!("{}", off),
        Operand::Imm(imm) => return fmt_imm(*imm),
        _ => {}
    }
    let mut s = String::new();
    s.push_str(match src.src_mod() {
        crate::ir::SrcMod::None => "",
        crate::ir::SrcMod::Abs => "(abs)",
        crate::ir::SrcMod::Neg => "-",
        crate::ir::SrcMod::NegAbs => "-(abs)",
    });
    match src {
        Operand::Direct { class, reg, sub, .. } => {
            s.push_str(&reg_base(*class, *reg));
            if !matches!(class, RegClass::Null | RegClass::Sp | RegClass::Ip) {
                let _ = write!(s, ".{}", sub);
            }
        }
        Operand::Macro { class, reg, acc, .. } => {
            s.push_str(&reg_base(*class, *reg));
            let _ = write!(s, ".{}", acc.name());
        }
        Operand::Indirect { addr_sub, offset, .. } => {
            let _ = write!(s, "r[a0.{},{}]", addr_sub, offset);
        }
        _ => unreachable!("imm and label handled above"),
    }
    s.push_str(&fmt_src_region(spec, inst, idx, src.region(), platform));
    if spec.implicit_src_type(platform, idx) != Some(src.ty()) {
        let _ = write!(s, ":{}", src.ty().name());
    }
    s
}

/// Region text for one source, or empty when the parser would restore
/// the identical region on its own.
fn fmt_src_region(
    spec: &'static OpSpec,
    inst: &Instruction,
    idx: usize,
    region: Region,
    platform: Platform,
) -> String {
    if let Some(implied) = spec.implicit_src_region(platform, idx) {
        if implied == region {
            return String::new();
        }
    }
    if spec.class == OpClass::Ternary {
        if region == parser::default_ternary_region(inst.exec_size, idx) {
            return String::new();
        }
        return if idx == 2 {
            format!("<{}>", region.hs.value().unwrap_or(0))
        } else {
            format!(
                "<{};{}>",
                region.vs.value().unwrap_or(0),
                region.hs.value().unwrap_or(0)
            )
        };
    }
    if spec.implicit_src_region(platform, idx).is_none()
        && region == ops::default_src_region(inst.exec_size)
    {
        return String::new();
    }
    format!(
        "<{};{},{}>",
        region.vs.value().unwrap_or(0),
        region.w.value().unwrap_or(0),
        region.hs.value().unwrap_or(0)
    )
}

fn fmt_imm(imm: ImmVal) -> String {
    let body = match imm {
        ImmVal::U8(v) => v.to_string(),
        ImmVal::S8(v) => v.to_string(),
        ImmVal::U16(v) => v.to_string(),
        ImmVal::S16(v) => v.to_string(),
        ImmVal::U32(v) => v.to_string(),
        ImmVal::S32(v) => v.to_string(),
        ImmVal::U64(v) => v.to_string(),
        ImmVal::S64(v) => v.to_string(),
        ImmVal::F16(b) => float::fmt_f16_bits(b),
        ImmVal::F32(b) => float::fmt_f32_bits(b),
        ImmVal::F64(b) => float::fmt_f64_bits(b),
    };
    format!("{}:{}", body, imm.ty().name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_kernel, ParseOpts};
    use crate::send::SendSummary;
    use pretty_assertions::assert_eq;

    fn roundtrip(src: &str) -> String {
        let k = parse_kernel(src, Platform::Gen9, &ParseOpts::default())
            .kernel
            .expect("parse");
        format_kernel(&k, Platform::Gen9, &FmtOpts::default())
    }

    /// format ∘ parse reaches a fixpoint in one step.
    fn assert_fixpoint(src: &str) {
        let once = roundtrip(src);
        let twice = roundtrip(&once);
        assert_eq!(once, twice, "source: {:?}", src);
    }

    #[test]
    fn canonical_mov() {
        let text = roundtrip("mov (8|M0) r1.0<1>:f r2.0<8;8,1>:f\n");
        assert_eq!(text, "mov (8|M0) r1.0:f r2.0:f\n");
    }

    #[test]
    fn non_default_regions_kept() {
        let text = roundtrip("mov (8|M0) r1.0<2>:f r2.0<16;8,2>:f\n");
        assert_eq!(text, "mov (8|M0) r1.0<2>:f r2.0<16;8,2>:f\n");
    }

    #[test]
    fn predication_and_flagmod_print() {
        let text = roundtrip("(W&~f0.1.any4h) sel (8|M8) r1.0:f r2.0:f r3.0:f\n");
        assert_eq!(text, "(W&~f0.1.any4h) sel (8|M8) r1.0:f r2.0:f r3.0:f\n");
        let text = roundtrip("cmp (8|M0) (le)f0.1 null:f r2.0:f r3.0:f\n");
        assert_eq!(text, "cmp (8|M0) (le)f0.1 null:f r2.0:f r3.0:f\n");
    }

    #[test]
    fn math_implicit_bits_elide() {
        // implicit :f and the gen9 implicit region both vanish
        let text = roundtrip("math.sin (8|M0) r1.0<1>:f r2.0<8;8,1>:f\n");
        assert_eq!(text, "math.sin (8|M0) r1.0 r2.0\n");
    }

    #[test]
    fn labels_print_and_resolve() {
        let text = roundtrip("if (16|M0) LBL\nadd (8|M0) r1.0:f r2.0:f r3.0:f\nLBL:\nnop\n");
        assert_eq!(text, "if (16|M0) LBL\nadd (8|M0) r1.0:f r2.0:f r3.0:f\nLBL:\nnop (1|M0)\n");
        assert_fixpoint("if (16|M0) LBL\nadd (8|M0) r1.0:f r2.0:f r3.0:f\nLBL:\nnop\n");
    }

    #[test]
    fn imm_floats_roundtrip() {
        assert_fixpoint("mov (1|M0) r1.0:f 1.5:f\n");
        assert_fixpoint("mov (1|M0) r1.0:f 0x7F800000:f\n");
        assert_fixpoint("mov (1|M0) r1.0:f qnan(0x1B):f\n");
        assert_fixpoint("mov (1|M0) r1.0:hf 0.5:hf\n");
        assert_fixpoint("mov (1|M0) r1.0:df 3.141592653589793:df\n");
    }

    #[test]
    fn imm_ints_roundtrip() {
        assert_fixpoint("mov (1|M0) r1.0:d -5:d\n");
        assert_fixpoint("mov (1|M0) r1.0:uw 65535:uw\n");
        assert_fixpoint("mov (1|M0) r1.0:uq 18446744073709551615:uq\n");
    }

    #[test]
    fn modifiers_and_indirect() {
        assert_fixpoint("add (8|M0) r1.0:f -r2.0:f -(abs)r3.0:f\n");
        assert_fixpoint("mov (8|M0) r1.0<1>:f r[a0.2,16]<8;8,1>:f\n");
        let text = roundtrip("mov (8|M0) r1.0<1>:f r4[a0.0,-8]<8;8,1>:f\n");
        // the pre-scaled spelling canonicalizes
        assert_eq!(text, "mov (8|M0) r1.0:f r[a0.0,120]:f\n");
    }

    #[test]
    fn ternary_and_macro() {
        assert_fixpoint("mad (8|M0) r1.0<1>:f r2.0<8;1>:f r3.0<8;1>:f r4.0<1>:f\n");
        assert_fixpoint("madm (8|M0) r1.mme0:f r2.mme1:f r3.mme2:f r4.noacc:f\n");
        // defaults elide
        let text = roundtrip("mad (8|M0) r1.0<1>:f r2.0<8;1>:f r3.0<8;1>:f r4.0<1>:f\n");
        assert_eq!(text, "mad (8|M0) r1.0:f r2.0:f r3.0:f r4.0:f\n");
    }

    #[test]
    fn send_gets_descriptor_comment() {
        let text = roundtrip("send (8|M0) r5 r10 0x5 0x140B5000 {EOT}\n");
        assert!(text.starts_with("send (8|M0) r5.0 r10.0 0x5 0x140b5000 {EOT}  // "), "{}", text);
        assert!(text.contains("rc:"), "{}", text);
        assert!(text.contains("msg="), "{}", text);
    }

    #[test]
    fn custom_codec_takes_priority() {
        struct Named;
        impl DescriptorCodec for Named {
            fn describe(&self, _p: Platform, sfid: Sfid, _d: u32) -> Option<SendSummary> {
                Some(SendSummary {
                    sfid,
                    msg_len: 1,
                    resp_len: 2,
                    header_present: false,
                    msg_type: 3,
                    msg_type_name: Some("vendor_op".into()),
                })
            }
        }
        let k = parse_kernel(
            "send (8|M0) r5 r10 0x5 0x140B5000\n",
            Platform::Gen9,
            &ParseOpts::default(),
        )
        .kernel
        .unwrap();
        let text = format_kernel(
            &k,
            Platform::Gen9,
            &FmtOpts { codec: Some(&Named), pc_comments: false },
        );
        assert!(text.contains("vendor_op"), "{}", text);
    }

    #[test]
    fn saturate_and_options_print() {
        assert_fixpoint("add (8|M0) (sat) r1.0:f r2.0:f r3.0:f {Atomic}\n");
    }

    #[test]
    fn pc_comments_column() {
        let k = parse_kernel("nop\nnop\n", Platform::Gen9, &ParseOpts::default())
            .kernel
            .unwrap();
        let text = format_kernel(&k, Platform::Gen9, &FmtOpts { pc_comments: true, ..Default::default() });
        assert!(text.starts_with("/* 0x0000 */ nop"), "{}", text);
    }
}
