//! Recursive-descent parser: source text plus a target platform in, a
//! `Kernel` plus accumulated diagnostics out. One token of true
//! lookahead, with limited multi-token peeking where the grammar is
//! ambiguous (flag-modifier shorthand vs. operands, labels vs.
//! mnemonics). On a syntax error the parser records the diagnostic and
//! skips to the next statement boundary, bounded by the hard-error cap.

use std::collections::HashMap;

use crate::diag::{DiagSink, Diagnostic, Loc, DEFAULT_MAX_ERRORS};
use crate::float;
use crate::ir::{
    BlockId, CondMod, FlagRef, HorzStride, ImmVal, Instruction, InstOpts, Kernel, LabelTarget,
    MacroAcc, MathFn, Operand, Platform, Pred, PredCtrl, RegClass, Region, SendDesc, SrcMod, Type,
    VertStride, Width, REG_BYTES,
};
use crate::lexer::{lex, Tok, Token};
use crate::ops::{self, OpClass, OpSpec};

#[derive(Debug, Clone)]
pub struct ParseOpts {
    pub max_errors: usize,
    /// Escalate implicit-region mismatches from warnings to errors.
    pub strict_regions: bool,
}

impl Default for ParseOpts {
    fn default() -> Self {
        ParseOpts { max_errors: DEFAULT_MAX_ERRORS, strict_regions: false }
    }
}

#[derive(Debug)]
pub struct ParseResult {
    /// Present only when no hard errors were recorded.
    pub kernel: Option<Kernel>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn parse_kernel(src: &str, platform: Platform, opts: &ParseOpts) -> ParseResult {
    let mut sink = DiagSink::new(opts.max_errors);
    let toks = lex(src, &mut sink);
    let mut p = Parser {
        toks,
        pos: 0,
        platform,
        strict_regions: opts.strict_regions,
        sink,
        kernel: Kernel::new(),
        labels: HashMap::new(),
        cur_block: BlockId(0),
        default_exec: None,
        default_type: None,
        seen_code: false,
    };
    p.kernel.add_block(None);
    p.prescan_labels();
    let aborted = p.program();
    let Parser { sink, kernel, .. } = p;
    let has_errors = sink.has_errors() || aborted;
    ParseResult {
        kernel: if has_errors { None } else { Some(kernel) },
        diagnostics: sink.into_vec(),
    }
}

/// Statement-aborting conditions: a syntax error (recovered by the
/// caller) or the error cap.
enum Abort {
    Syntax(Loc, String),
    TooMany,
}

type PResult<T> = Result<T, Abort>;

/// Operand position being parsed; decides region shapes and defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Dst,
    Src(usize),
}

#[derive(Debug, Clone, Copy)]
enum RegionShape {
    Full(u64, u64, u64),
    VH(u64, u64),
    H(u64),
}

/// Constant-expression value: 64-bit integer (kept in i128 so the full
/// unsigned range and negatives coexist) or double.
#[derive(Debug, Clone, Copy)]
enum EVal {
    Int(i128),
    Float(f64),
}

struct Parser {
    toks: Vec<Token>,
    pos: usize,
    platform: Platform,
    strict_regions: bool,
    sink: DiagSink,
    kernel: Kernel,
    labels: HashMap<String, BlockId>,
    cur_block: BlockId,
    default_exec: Option<u8>,
    default_type: Option<Type>,
    seen_code: bool,
}

impl Parser {
    // ---- token plumbing ----

    fn cur(&self) -> &Token {
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn tok(&self) -> &Tok {
        &self.cur().tok
    }

    fn nth(&self, n: usize) -> &Tok {
        &self.toks[(self.pos + n).min(self.toks.len() - 1)].tok
    }

    fn loc(&self) -> Loc {
        self.cur().loc
    }

    fn bump(&mut self) -> Token {
        let t = self.cur().clone();
        if self.pos < self.toks.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, t: &Tok) -> bool {
        if self.tok() == t {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, t: Tok, what: &str) -> PResult<()> {
        if self.eat(&t) {
            Ok(())
        } else {
            Err(self.syntax(format!("expected {}", what)))
        }
    }

    fn syntax(&self, msg: String) -> Abort {
        Abort::Syntax(self.loc(), msg)
    }

    /// Record a non-aborting semantic error.
    fn soft_err(&mut self, loc: Loc, msg: impl Into<String>) -> PResult<()> {
        self.sink.error(loc, msg).map_err(|_| Abort::TooMany)
    }

    fn at_stmt_end(&self) -> bool {
        matches!(self.tok(), Tok::Newline | Tok::Semi | Tok::Eof)
    }

    fn skip_stmt_seps(&mut self) {
        while matches!(self.tok(), Tok::Newline | Tok::Semi) {
            self.bump();
        }
    }

    /// Error recovery: skip to the next statement boundary.
    fn recover(&mut self) {
        while !self.at_stmt_end() {
            self.bump();
        }
    }

    // ---- program structure ----

    /// Pre-pass: register every `ident:` label at a statement start, in
    /// textual order, so forward references resolve to blocks laid out
    /// in program order.
    fn prescan_labels(&mut self) {
        let mut at_start = true;
        let mut i = 0;
        while i < self.toks.len() {
            match &self.toks[i].tok {
                Tok::Newline | Tok::Semi => at_start = true,
                Tok::Ident(name) if at_start => {
                    if matches!(self.toks.get(i + 1).map(|t| &t.tok), Some(Tok::Colon)) {
                        if !self.labels.contains_key(name) {
                            let id = self.kernel.add_block(Some(name.clone()));
                            self.labels.insert(name.clone(), id);
                        }
                        i += 1; // past the colon; stay "at start" for same-line code
                    } else {
                        at_start = false;
                    }
                }
                Tok::Eof => break,
                _ => at_start = false,
            }
            i += 1;
        }
    }

    /// Returns true when parsing aborted on the error cap.
    fn program(&mut self) -> bool {
        loop {
            self.skip_stmt_seps();
            if matches!(self.tok(), Tok::Eof) {
                return false;
            }
            match self.statement() {
                Ok(()) => {}
                Err(Abort::TooMany) => return true,
                Err(Abort::Syntax(loc, msg)) => {
                    if self.sink.error(loc, msg).is_err() {
                        return true;
                    }
                    self.recover();
                }
            }
        }
    }

    fn statement(&mut self) -> PResult<()> {
        if matches!(self.tok(), Tok::Dot) {
            return self.directive();
        }
        // label definition?
        if let Tok::Ident(name) = self.tok() {
            if matches!(self.nth(1), Tok::Colon) {
                let name = name.clone();
                self.bump();
                self.bump();
                let id = self.labels[&name];
                if self.kernel.block(id).instrs.is_empty() && self.cur_block != id {
                    self.cur_block = id;
                } else if self.cur_block != id {
                    self.soft_err(self.loc(), format!("label redefined: {}", name))?;
                }
                self.seen_code = true;
                if self.at_stmt_end() {
                    return Ok(());
                }
                // fall through: instruction on the same line as its label
            }
        }
        self.instruction()
    }

    /// Legacy prologue directives, only before the first instruction.
    fn directive(&mut self) -> PResult<()> {
        let loc = self.loc();
        self.bump(); // '.'
        let name = match self.bump().tok {
            Tok::Ident(n) => n,
            _ => return Err(self.syntax("expected directive name".into())),
        };
        if self.seen_code {
            self.soft_err(loc, format!(".{} must precede all instructions", name))?;
        }
        match name.as_str() {
            "default_execution_size" => {
                self.expect(Tok::LParen, "'('")?;
                let n = match self.bump().tok {
                    Tok::Int(n) => n,
                    _ => return Err(self.syntax("expected execution size".into())),
                };
                self.expect(Tok::RParen, "')'")?;
                if ![1u64, 2, 4, 8, 16, 32].contains(&n) {
                    self.soft_err(loc, format!("bad default execution size: {}", n))?;
                } else {
                    self.default_exec = Some(n as u8);
                }
            }
            "default_register_type" => {
                let t = match self.bump().tok {
                    Tok::Ident(t) => t,
                    _ => return Err(self.syntax("expected type name".into())),
                };
                match Type::from_name(&t) {
                    Some(ty) => self.default_type = Some(ty),
                    None => self.soft_err(loc, format!("unknown type: {}", t))?,
                }
            }
            other => {
                return Err(Abort::Syntax(loc, format!("unknown directive: .{}", other)));
            }
        }
        if !self.at_stmt_end() {
            return Err(self.syntax("expected end of statement".into()));
        }
        Ok(())
    }

    // ---- instruction ----

    fn instruction(&mut self) -> PResult<()> {
        self.seen_code = true;
        let loc = self.loc();
        let mut inst = Instruction::new(ops::TABLE[0].op);
        self.pred_prefix(&mut inst)?;
        let (spec, math_fn) = self.mnemonic()?;
        inst.op = spec.op;
        inst.math_fn = math_fn;
        if !spec.supports(self.platform) {
            self.soft_err(
                loc,
                format!("{} not supported on {}", spec.mnemonic, self.platform.name()),
            )?;
        }
        if inst.pred.is_some() && !spec.attrs.contains(ops::OpAttrs::PREDICATION) {
            self.soft_err(loc, format!("{} does not support predication", spec.mnemonic))?;
        }

        self.exec_info(&mut inst)?;
        self.flag_modifier(spec, &mut inst)?;
        self.operands(spec, &mut inst)?;
        self.options(spec, &mut inst)?;

        if !self.at_stmt_end() {
            return Err(self.syntax("expected end of statement".into()));
        }
        inst.id = self.kernel.next_inst_id();
        let blk = self.cur_block;
        self.kernel.block_mut(blk).instrs.push(inst);
        Ok(())
    }

    /// `(W)`, `(f0.0)`, `(~f0.1.any4h)`, `(W&~f0.0)` groups before the
    /// mnemonic.
    fn pred_prefix(&mut self, inst: &mut Instruction) -> PResult<()> {
        while matches!(self.tok(), Tok::LParen) && self.looks_like_pred() {
            self.bump(); // '('
            loop {
                match self.tok().clone() {
                    Tok::Ident(w) if w == "W" => {
                        self.bump();
                        inst.mask_ctrl = true;
                    }
                    Tok::Tilde => {
                        self.bump();
                        self.pred_body(inst, true)?;
                    }
                    Tok::Ident(_) => {
                        self.pred_body(inst, false)?;
                    }
                    _ => return Err(self.syntax("expected predication".into())),
                }
                if !self.eat(&Tok::Amp) {
                    break;
                }
            }
            self.expect(Tok::RParen, "')'")?;
        }
        Ok(())
    }

    fn looks_like_pred(&self) -> bool {
        match self.nth(1) {
            Tok::Tilde => true,
            Tok::Ident(s) => {
                s == "W" && matches!(self.nth(2), Tok::RParen | Tok::Amp)
                    || parse_flag_reg_name(s).is_some()
            }
            _ => false,
        }
    }

    fn pred_body(&mut self, inst: &mut Instruction, inverted: bool) -> PResult<()> {
        let loc = self.loc();
        let name = match self.bump().tok {
            Tok::Ident(n) => n,
            _ => return Err(Abort::Syntax(loc, "expected flag register".into())),
        };
        let Some(reg) = parse_flag_reg_name(&name) else {
            return Err(Abort::Syntax(loc, format!("bad flag register: {}", name)));
        };
        self.expect(Tok::Dot, "'.'")?;
        let sub = match self.bump().tok {
            Tok::Int(n) if n < 4 => n as u8,
            _ => return Err(self.syntax("expected flag subregister".into())),
        };
        let mut ctrl = PredCtrl::Seq;
        if matches!(self.tok(), Tok::Dot) {
            self.bump();
            let f = match self.bump().tok {
                Tok::Ident(f) => f,
                _ => return Err(self.syntax("expected predication function".into())),
            };
            match PredCtrl::from_suffix(&f) {
                Some(c) => ctrl = c,
                None => {
                    self.soft_err(loc, format!("unknown predication function: {}", f))?;
                }
            }
        }
        inst.pred = Some(Pred { ctrl, inverted });
        inst.flag = FlagRef { reg, sub };
        Ok(())
    }

    fn mnemonic(&mut self) -> PResult<(&'static OpSpec, Option<MathFn>)> {
        let loc = self.loc();
        let name = match self.bump().tok {
            Tok::Ident(n) => n,
            _ => return Err(Abort::Syntax(loc, "expected mnemonic".into())),
        };
        if matches!(self.tok(), Tok::Dot) && matches!(self.nth(1), Tok::Ident(_)) {
            self.bump();
            let sub = match self.bump().tok {
                Tok::Ident(s) => s,
                _ => unreachable!("peeked ident"),
            };
            return match ops::by_qualified(&name, &sub) {
                Some((spec, f)) => Ok((spec, Some(f))),
                None => Err(Abort::Syntax(loc, format!("unknown operation: {}.{}", name, sub))),
            };
        }
        if let Some(spec) = ops::by_mnemonic(&name) {
            if spec.class == OpClass::Math {
                return Err(Abort::Syntax(loc, "math requires a .subfunction".into()));
            }
            return Ok((spec, None));
        }
        if let Some((spec, f)) = ops::by_alias(&name) {
            return Ok((spec, Some(f)));
        }
        Err(Abort::Syntax(loc, format!("unknown mnemonic: {}", name)))
    }

    /// `(16|M4)` — execution size and channel offset.
    fn exec_info(&mut self, inst: &mut Instruction) -> PResult<()> {
        if matches!(self.tok(), Tok::LParen) && matches!(self.nth(1), Tok::Int(_)) {
            let loc = self.loc();
            self.bump();
            let n = match self.bump().tok {
                Tok::Int(n) => n,
                _ => unreachable!("peeked int"),
            };
            if ![1u64, 2, 4, 8, 16, 32].contains(&n) {
                self.soft_err(loc, format!("bad execution size: {}", n))?;
            } else {
                inst.exec_size = n as u8;
            }
            if self.eat(&Tok::Pipe) {
                let loc = self.loc();
                let m = match self.bump().tok {
                    Tok::Ident(m) => m,
                    _ => return Err(self.syntax("expected channel offset (M#)".into())),
                };
                match parse_chan_off(&m) {
                    Some(off) => inst.chan_off = off,
                    None => self.soft_err(loc, format!("bad channel offset: {}", m))?,
                }
            }
            self.expect(Tok::RParen, "')'")?;
        } else {
            inst.exec_size = self.default_exec.unwrap_or(1);
        }
        Ok(())
    }

    /// `(le)f0.1` or `[le]f0.1` after the exec info.
    fn flag_modifier(&mut self, spec: &OpSpec, inst: &mut Instruction) -> PResult<()> {
        let (open, close) = match self.tok() {
            Tok::LParen => (Tok::LParen, Tok::RParen),
            Tok::LBrack => (Tok::LBrack, Tok::RBrack),
            _ => return Ok(()),
        };
        let Tok::Ident(name) = self.nth(1) else { return Ok(()) };
        let Some(cond) = CondMod::from_name(name) else { return Ok(()) };
        if !matches!(self.nth(2), tok if *tok == close) {
            return Ok(());
        }
        let loc = self.loc();
        self.bump();
        self.bump();
        self.bump();
        let _ = open;
        if !spec.attrs.contains(ops::OpAttrs::FLAG_MODIFIER) {
            self.soft_err(loc, format!("{} does not take a flag modifier", spec.mnemonic))?;
        }
        inst.cond_mod = cond;
        // flag register operand after the shorthand
        if let Tok::Ident(n) = self.tok().clone() {
            if let Some(reg) = parse_flag_reg_name(&n) {
                self.bump();
                self.expect(Tok::Dot, "'.'")?;
                let sub = match self.bump().tok {
                    Tok::Int(s) if s < 4 => s as u8,
                    _ => return Err(self.syntax("expected flag subregister".into())),
                };
                inst.flag = FlagRef { reg, sub };
                return Ok(());
            }
        }
        Err(self.syntax("expected flag register after modifier".into()))
    }

    fn operands(&mut self, spec: &'static OpSpec, inst: &mut Instruction) -> PResult<()> {
        if spec.has_dst() {
            // (sat) destination prefix
            if matches!(self.tok(), Tok::LParen)
                && matches!(self.nth(1), Tok::Ident(s) if s == "sat")
                && matches!(self.nth(2), Tok::RParen)
            {
                let loc = self.loc();
                self.bump();
                self.bump();
                self.bump();
                if !spec.attrs.contains(ops::OpAttrs::SATURATION) {
                    self.soft_err(loc, format!("{} does not support saturation", spec.mnemonic))?;
                }
                inst.saturate = true;
            }
            let dst = self.operand(spec, inst, Slot::Dst)?;
            inst.dst = Some(dst);
        }
        let nsrc = spec.num_srcs(inst.math_fn);
        for i in 0..nsrc {
            self.eat(&Tok::Comma);
            let src = self.operand(spec, inst, Slot::Src(i))?;
            inst.srcs.push(src);
        }
        if spec.is_send() {
            self.eat(&Tok::Comma);
            inst.ex_desc = Some(self.send_desc()?);
            self.eat(&Tok::Comma);
            inst.desc = Some(self.send_desc()?);
        }
        Ok(())
    }

    fn send_desc(&mut self) -> PResult<SendDesc> {
        let loc = self.loc();
        if let Tok::Ident(n) = self.tok().clone() {
            if let Some((RegClass::Addr, 0)) = parse_reg_name(&n) {
                self.bump();
                self.expect(Tok::Dot, "'.'")?;
                let sub = match self.bump().tok {
                    Tok::Int(s) if s < 16 => s as u8,
                    _ => return Err(self.syntax("expected a0 subregister".into())),
                };
                return Ok(SendDesc::Reg { sub });
            }
        }
        match self.expr()? {
            EVal::Int(v) if (0..=u32::MAX as i128).contains(&v) => Ok(SendDesc::Imm(v as u32)),
            EVal::Int(v) => {
                self.soft_err(loc, format!("descriptor out of 32-bit range: {:#x}", v))?;
                Ok(SendDesc::Imm(0))
            }
            EVal::Float(_) => {
                self.soft_err(loc, "descriptor must be integral")?;
                Ok(SendDesc::Imm(0))
            }
        }
    }

    fn options(&mut self, spec: &OpSpec, inst: &mut Instruction) -> PResult<()> {
        if !self.eat(&Tok::LBrace) {
            return Ok(());
        }
        loop {
            let loc = self.loc();
            let name = match self.bump().tok {
                Tok::Ident(n) => n,
                Tok::RBrace => break,
                _ => return Err(Abort::Syntax(loc, "expected instruction option".into())),
            };
            match InstOpts::from_opt_name(&name) {
                Some(o) => {
                    if o == InstOpts::EOT && !spec.is_send() {
                        self.soft_err(loc, "EOT is only valid on send instructions")?;
                    }
                    inst.opts |= o;
                }
                None => self.soft_err(loc, format!("unknown instruction option: {}", name))?,
            }
            if !self.eat(&Tok::Comma) {
                self.expect(Tok::RBrace, "'}'")?;
                break;
            }
        }
        if inst.opts.contains(InstOpts::COMPACTED | InstOpts::NO_COMPACT) {
            self.soft_err(self.loc(), "Compacted conflicts with NoCompact")?;
        }
        Ok(())
    }

    // ---- operands ----

    fn operand(
        &mut self,
        spec: &'static OpSpec,
        inst: &Instruction,
        slot: Slot,
    ) -> PResult<Operand> {
        let loc = self.loc();
        let is_src = matches!(slot, Slot::Src(_));
        let mut src_mod = SrcMod::None;
        if is_src {
            src_mod = self.src_mod_prefix();
        }
        if src_mod != SrcMod::None && !spec.attrs.contains(ops::OpAttrs::SRC_MODS) {
            self.soft_err(loc, format!("{} does not support source modifiers", spec.mnemonic))?;
        }

        // register-shaped?
        if let Tok::Ident(name) = self.tok().clone() {
            if name == "r" && matches!(self.nth(1), Tok::LBrack) {
                self.bump();
                return self.indirect_operand(spec, inst, slot, src_mod, 0);
            }
            if let Some((class, reg)) = parse_reg_name(&name) {
                self.bump();
                if matches!(self.tok(), Tok::LBrack) {
                    // pre-scaled indirect: regNum[a0.#, off]
                    if class != RegClass::Grf {
                        self.soft_err(loc, "indirect base must be a GRF")?;
                    }
                    return self.indirect_operand(
                        spec,
                        inst,
                        slot,
                        src_mod,
                        reg as i32 * REG_BYTES as i32,
                    );
                }
                return self.direct_operand(spec, inst, slot, src_mod, class, reg);
            }
            if name == "qnan" || name == "snan" {
                self.bump();
                return self.nan_literal(loc, &name);
            }
            // bare identifier: a label, but only on branch operands
            if spec.is_branching() && is_src {
                self.bump();
                return match self.labels.get(&name) {
                    Some(&id) => Ok(Operand::Label(LabelTarget::Block(id))),
                    None => {
                        self.soft_err(loc, format!("undefined label: {}", name))?;
                        Ok(Operand::Label(LabelTarget::Offset(0)))
                    }
                };
            }
            return Err(Abort::Syntax(loc, format!("unexpected identifier: {}", name)));
        }

        if src_mod != SrcMod::None {
            return Err(self.syntax("source modifier requires a register operand".into()));
        }

        // branch targets may be raw numeric offsets
        if spec.is_branching() && is_src {
            let v = self.expr()?;
            return match v {
                EVal::Int(v) if (i32::MIN as i128..=i32::MAX as i128).contains(&v) => {
                    Ok(Operand::Label(LabelTarget::Offset(v as i32)))
                }
                _ => {
                    self.soft_err(loc, "branch target out of 32-bit range")?;
                    Ok(Operand::Label(LabelTarget::Offset(0)))
                }
            };
        }

        // constant expression immediate
        let v = self.expr()?;
        self.expect(Tok::Colon, "':' and a type on the immediate")?;
        let ty = self.type_name()?;
        self.imm_operand(loc, v, ty)
    }

    fn src_mod_prefix(&mut self) -> SrcMod {
        let mut neg = false;
        let mut abs = false;
        // `-` only counts as a modifier when a register follows;
        // otherwise it belongs to the expression
        if matches!(self.tok(), Tok::Minus) {
            let reg_next = match self.nth(1) {
                Tok::Ident(n) => parse_reg_name(n).is_some() || n == "r",
                Tok::LParen => matches!(self.nth(2), Tok::Ident(a) if a == "abs"),
                _ => false,
            };
            if reg_next {
                self.bump();
                neg = true;
            }
        }
        if matches!(self.tok(), Tok::LParen)
            && matches!(self.nth(1), Tok::Ident(a) if a == "abs")
            && matches!(self.nth(2), Tok::RParen)
        {
            self.bump();
            self.bump();
            self.bump();
            abs = true;
        }
        match (neg, abs) {
            (false, false) => SrcMod::None,
            (false, true) => SrcMod::Abs,
            (true, false) => SrcMod::Neg,
            (true, true) => SrcMod::NegAbs,
        }
    }

    fn direct_operand(
        &mut self,
        spec: &'static OpSpec,
        inst: &Instruction,
        slot: Slot,
        src_mod: SrcMod,
        class: RegClass,
        reg: u8,
    ) -> PResult<Operand> {
        let loc = self.loc();
        let mut sub = 0u8;
        let mut acc = None;
        if matches!(self.tok(), Tok::Dot) {
            self.bump();
            match self.bump().tok {
                Tok::Int(n) => {
                    if n >= 32 {
                        self.soft_err(loc, format!("subregister out of range: {}", n))?;
                    } else {
                        sub = n as u8;
                    }
                }
                Tok::Ident(sel) => match parse_macro_acc(&sel) {
                    Some(a) => acc = Some(a),
                    None => {
                        return Err(Abort::Syntax(loc, format!("bad subregister: .{}", sel)));
                    }
                },
                _ => return Err(self.syntax("expected subregister".into())),
            }
        }
        if acc.is_some() && !spec.attrs.contains(ops::OpAttrs::MACRO) {
            self.soft_err(loc, format!("{} does not take macro operands", spec.mnemonic))?;
        }
        let region = self.region_suffix(spec, inst, slot)?;
        let ty = self.type_suffix(spec, slot)?;
        if let Some(acc) = acc {
            return Ok(Operand::Macro { class, reg, acc, region, ty, src_mod });
        }
        Ok(Operand::Direct { class, reg, sub, region, ty, src_mod })
    }

    /// `r[a0.#, off]` with `base_off` already scaled for the pre-scaled
    /// `r12[...]` spelling.
    fn indirect_operand(
        &mut self,
        spec: &'static OpSpec,
        inst: &Instruction,
        slot: Slot,
        src_mod: SrcMod,
        base_off: i32,
    ) -> PResult<Operand> {
        let loc = self.loc();
        self.expect(Tok::LBrack, "'['")?;
        let name = match self.bump().tok {
            Tok::Ident(n) => n,
            _ => return Err(self.syntax("expected address register".into())),
        };
        if parse_reg_name(&name) != Some((RegClass::Addr, 0)) {
            self.soft_err(loc, format!("address register must be a0: {}", name))?;
        }
        self.expect(Tok::Dot, "'.'")?;
        let addr_sub = match self.bump().tok {
            Tok::Int(n) if n < 16 => n as u8,
            _ => return Err(self.syntax("expected address subregister".into())),
        };
        let mut off: i32 = 0;
        if self.eat(&Tok::Comma) {
            let neg = self.eat(&Tok::Minus);
            if !neg {
                self.eat(&Tok::Plus);
            }
            let n = match self.bump().tok {
                Tok::Int(n) if n <= i32::MAX as u64 => n as i32,
                _ => return Err(self.syntax("expected indirect offset".into())),
            };
            off = if neg { -n } else { n };
        }
        self.expect(Tok::RBrack, "']'")?;
        let total = base_off + off;
        if !(-256..=255).contains(&total) {
            self.soft_err(loc, format!("indirect offset out of range: {}", total))?;
        }
        let region = self.region_suffix(spec, inst, slot)?;
        let ty = self.type_suffix(spec, slot)?;
        Ok(Operand::Indirect { addr_sub, offset: total as i16, region, ty, src_mod })
    }

    fn nan_literal(&mut self, loc: Loc, kind: &str) -> PResult<Operand> {
        self.expect(Tok::LParen, "'('")?;
        let payload = match self.expr()? {
            EVal::Int(v) if v >= 0 => v as u64,
            _ => {
                self.soft_err(loc, "NaN payload must be a non-negative integer")?;
                1
            }
        };
        self.expect(Tok::RParen, "')'")?;
        self.expect(Tok::Colon, "':' and a float type")?;
        let ty = self.type_name()?;
        let quiet = kind == "qnan";
        if payload == 0 {
            self.soft_err(loc, format!("{} payload must be non-zero", kind))?;
        }
        let (mnt_bits, imm) = match ty {
            Type::F => (23u32, ImmVal::F32(0)),
            Type::HF => (10, ImmVal::F16(0)),
            Type::DF => (52, ImmVal::F64(0)),
            _ => {
                self.soft_err(loc, format!("{} requires a float type", kind))?;
                (23, ImmVal::F32(0))
            }
        };
        let payload_bits = if quiet { mnt_bits - 1 } else { mnt_bits };
        let limit = (1u64 << payload_bits) - 1;
        if payload > limit {
            self.soft_err(loc, format!("NaN payload exceeds {} bits", payload_bits))?;
        }
        let payload = payload & limit;
        let bits = |exp_all: u64, quiet_bit: u64| -> u64 {
            exp_all | if quiet { quiet_bit | payload } else { payload }
        };
        Ok(Operand::Imm(match imm {
            ImmVal::F32(_) => ImmVal::F32(bits(0x7F80_0000, 0x0040_0000) as u32),
            ImmVal::F16(_) => ImmVal::F16(bits(0x7C00, 0x0200) as u16),
            _ => ImmVal::F64(bits(0x7FF0_0000_0000_0000, 0x0008_0000_0000_0000)),
        }))
    }

    /// Narrow a constant-expression value into a typed immediate with
    /// range checks and the NaN-payload preservation rule.
    fn imm_operand(&mut self, loc: Loc, v: EVal, ty: Type) -> PResult<Operand> {
        let imm = match (v, ty) {
            (EVal::Int(v), t) if !t.is_float() => {
                let (lo, hi): (i128, i128) = match t {
                    Type::UB => (0, u8::MAX as i128),
                    Type::B => (i8::MIN as i128, i8::MAX as i128),
                    Type::UW => (0, u16::MAX as i128),
                    Type::W => (i16::MIN as i128, i16::MAX as i128),
                    Type::UD => (0, u32::MAX as i128),
                    Type::D => (i32::MIN as i128, i32::MAX as i128),
                    Type::UQ => (0, u64::MAX as i128),
                    Type::Q => (i64::MIN as i128, i64::MAX as i128),
                    _ => unreachable!("non-float checked"),
                };
                if v < lo || v > hi {
                    self.soft_err(
                        loc,
                        format!("literal {} out of range for :{}", v, t.name()),
                    )?;
                }
                ImmVal::from_bits(t, v as u64).expect("valid imm type")
            }
            // hex bit patterns for float immediates
            (EVal::Int(v), Type::F) => {
                if !(0..=u32::MAX as i128).contains(&v) {
                    self.soft_err(loc, "float bit pattern exceeds 32 bits")?;
                }
                ImmVal::F32(v as u32)
            }
            (EVal::Int(v), Type::HF) => {
                if !(0..=u16::MAX as i128).contains(&v) {
                    self.soft_err(loc, "half bit pattern exceeds 16 bits")?;
                }
                ImmVal::F16(v as u16)
            }
            (EVal::Int(v), Type::DF) => ImmVal::F64(v as u64),
            (EVal::Float(v), Type::F) => {
                if v.is_nan() {
                    match float::f64_to_f32_exact(v) {
                        Some(f) => ImmVal::F32(f.to_bits()),
                        None => {
                            self.soft_err(loc, "NaN payload bits would be truncated")?;
                            ImmVal::F32(float::f64_to_f32(v).to_bits())
                        }
                    }
                } else {
                    ImmVal::F32(float::f64_to_f32(v).to_bits())
                }
            }
            (EVal::Float(v), Type::HF) => {
                if v.is_nan() {
                    match float::f64_to_f16_exact(v) {
                        Some(h) => ImmVal::F16(h),
                        None => {
                            self.soft_err(loc, "NaN payload bits would be truncated")?;
                            ImmVal::F16(float::f32_to_f16(float::f64_to_f32(v)))
                        }
                    }
                } else {
                    ImmVal::F16(float::f32_to_f16(float::f64_to_f32(v)))
                }
            }
            (EVal::Float(v), Type::DF) => ImmVal::F64(v.to_bits()),
            (EVal::Float(_), t) => {
                self.soft_err(loc, format!("float literal cannot have type :{}", t.name()))?;
                ImmVal::S32(0)
            }
            (EVal::Int(_), _) => unreachable!("non-float handled by guard above"),
        };
        Ok(Operand::Imm(imm))
    }

    // ---- regions and types ----

    fn region_suffix(
        &mut self,
        spec: &'static OpSpec,
        inst: &Instruction,
        slot: Slot,
    ) -> PResult<Region> {
        let loc = self.loc();
        let written = if matches!(self.tok(), Tok::Lt) {
            Some(self.region_shape(spec, slot)?)
        } else {
            None
        };
        let ternary = spec.class == OpClass::Ternary;
        match slot {
            Slot::Dst => Ok(written.unwrap_or(if spec.is_send() {
                Region::INVALID
            } else {
                Region::DST1
            })),
            Slot::Src(i) => {
                if let Some(implied) = spec.implicit_src_region(self.platform, i) {
                    return match written {
                        None => Ok(implied),
                        Some(w) if w == implied => Ok(w),
                        Some(w) => {
                            let msg = format!(
                                "explicit region differs from the implicit region of {}",
                                spec.mnemonic
                            );
                            if self.strict_regions {
                                self.soft_err(loc, msg)?;
                            } else {
                                self.sink.warn(loc, msg);
                            }
                            Ok(w)
                        }
                    };
                }
                match written {
                    Some(w) => Ok(w),
                    None if ternary => Ok(default_ternary_region(inst.exec_size, i)),
                    None => Ok(ops::default_src_region(inst.exec_size)),
                }
            }
        }
    }

    fn region_shape(&mut self, spec: &OpSpec, slot: Slot) -> PResult<Region> {
        let loc = self.loc();
        self.expect(Tok::Lt, "'<'")?;
        let a = self.region_num()?;
        let shape = if self.eat(&Tok::Semi) {
            let b = self.region_num()?;
            if self.eat(&Tok::Comma) {
                let c = self.region_num()?;
                RegionShape::Full(a, b, c)
            } else {
                RegionShape::VH(a, b)
            }
        } else {
            RegionShape::H(a)
        };
        self.expect(Tok::Gt, "'>'")?;

        let ternary = spec.class == OpClass::Ternary;
        let reg = match (slot, shape, ternary) {
            (Slot::Dst, RegionShape::H(h), _) => HorzStride::from_value(h as u32)
                .map(|hs| Region { vs: VertStride::Invalid, w: Width::Invalid, hs }),
            (Slot::Src(i), RegionShape::VH(v, h), true) if i < 2 => {
                match (VertStride::from_value(v as u32), HorzStride::from_value(h as u32)) {
                    (Some(vs), Some(hs)) => Some(Region { vs, w: Width::Invalid, hs }),
                    _ => None,
                }
            }
            (Slot::Src(2), RegionShape::H(h), true) => HorzStride::from_value(h as u32)
                .map(|hs| Region { vs: VertStride::Invalid, w: Width::Invalid, hs }),
            (Slot::Src(_), RegionShape::Full(v, w, h), false) => {
                Region::new(v as u32, w as u32, h as u32)
            }
            _ => None,
        };
        match reg {
            Some(r) => Ok(r),
            None => Err(Abort::Syntax(loc, "malformed region for this operand".into())),
        }
    }

    fn region_num(&mut self) -> PResult<u64> {
        match self.bump().tok {
            Tok::Int(n) => Ok(n),
            _ => Err(self.syntax("expected region component".into())),
        }
    }

    fn type_suffix(&mut self, spec: &'static OpSpec, slot: Slot) -> PResult<Type> {
        let loc = self.loc();
        if self.eat(&Tok::Colon) {
            return self.type_name();
        }
        let implied = match slot {
            Slot::Dst => spec.implicit_dst_type(self.platform),
            Slot::Src(i) => spec.implicit_src_type(self.platform, i),
        };
        if let Some(t) = implied.or(self.default_type) {
            return Ok(t);
        }
        self.soft_err(loc, "operand requires a type")?;
        Ok(Type::Invalid)
    }

    fn type_name(&mut self) -> PResult<Type> {
        let loc = self.loc();
        let name = match self.bump().tok {
            Tok::Ident(n) => n,
            _ => return Err(Abort::Syntax(loc, "expected type name".into())),
        };
        match Type::from_name(&name) {
            Some(t) => Ok(t),
            None => Err(Abort::Syntax(loc, format!("unknown type: :{}", name))),
        }
    }

    // ---- constant expressions ----
    // precedence cascade: bitwise | ^ & -> shifts -> additive ->
    // multiplicative -> unary -> primary

    fn expr(&mut self) -> PResult<EVal> {
        self.bit_or()
    }

    fn bit_or(&mut self) -> PResult<EVal> {
        let mut lhs = self.bit_xor()?;
        while matches!(self.tok(), Tok::Pipe) {
            let loc = self.loc();
            self.bump();
            let rhs = self.bit_xor()?;
            lhs = self.int_op(loc, lhs, rhs, |a, b| Ok(a | b))?;
        }
        Ok(lhs)
    }

    fn bit_xor(&mut self) -> PResult<EVal> {
        let mut lhs = self.bit_and()?;
        while matches!(self.tok(), Tok::Caret) {
            let loc = self.loc();
            self.bump();
            let rhs = self.bit_and()?;
            lhs = self.int_op(loc, lhs, rhs, |a, b| Ok(a ^ b))?;
        }
        Ok(lhs)
    }

    fn bit_and(&mut self) -> PResult<EVal> {
        let mut lhs = self.shift()?;
        while matches!(self.tok(), Tok::Amp) {
            let loc = self.loc();
            self.bump();
            let rhs = self.shift()?;
            lhs = self.int_op(loc, lhs, rhs, |a, b| Ok(a & b))?;
        }
        Ok(lhs)
    }

    fn shift(&mut self) -> PResult<EVal> {
        let mut lhs = self.additive()?;
        loop {
            let left = match self.tok() {
                Tok::Shl => true,
                Tok::Shr => false,
                _ => break,
            };
            let loc = self.loc();
            self.bump();
            let rhs = self.additive()?;
            lhs = self.int_op(loc, lhs, rhs, move |a, b| {
                if !(0..64).contains(&b) {
                    return Err("shift amount out of range".to_string());
                }
                Ok(if left { (a as u64).wrapping_shl(b as u32) as i128 } else { ((a as u64) >> b) as i128 })
            })?;
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> PResult<EVal> {
        let mut lhs = self.multiplicative()?;
        loop {
            let add = match self.tok() {
                Tok::Plus => true,
                Tok::Minus => false,
                _ => break,
            };
            let loc = self.loc();
            self.bump();
            let rhs = self.multiplicative()?;
            lhs = self.arith_op(loc, lhs, rhs, add)?;
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> PResult<EVal> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.tok() {
                Tok::Star => b'*',
                Tok::Slash => b'/',
                Tok::Percent => b'%',
                _ => break,
            };
            let loc = self.loc();
            self.bump();
            let rhs = self.unary()?;
            lhs = match (lhs, rhs, op) {
                (EVal::Int(a), EVal::Int(b), b'*') => EVal::Int(a.wrapping_mul(b)),
                (EVal::Int(_), EVal::Int(0), b'/') | (EVal::Int(_), EVal::Int(0), b'%') => {
                    // integral division by zero is a hard parse error
                    return Err(Abort::Syntax(loc, "division by zero in constant expression".into()));
                }
                (EVal::Int(a), EVal::Int(b), b'/') => EVal::Int(a / b),
                (EVal::Int(a), EVal::Int(b), b'%') => EVal::Int(a % b),
                (a, b, b'*') => EVal::Float(as_f64(a) * as_f64(b)),
                (a, b, b'/') => EVal::Float(as_f64(a) / as_f64(b)),
                (_, _, _) => {
                    return Err(Abort::Syntax(loc, "'%' requires integral operands".into()));
                }
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> PResult<EVal> {
        match self.tok() {
            Tok::Minus => {
                self.bump();
                Ok(match self.unary()? {
                    EVal::Int(v) => EVal::Int(-v),
                    EVal::Float(v) => EVal::Float(-v),
                })
            }
            Tok::Tilde => {
                let loc = self.loc();
                self.bump();
                match self.unary()? {
                    EVal::Int(v) => Ok(EVal::Int(!(v as u64) as i128)),
                    EVal::Float(_) => Err(Abort::Syntax(loc, "'~' requires an integer".into())),
                }
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> PResult<EVal> {
        let loc = self.loc();
        match self.bump().tok {
            Tok::Int(v) => Ok(EVal::Int(v as i128)),
            Tok::Float(v) => Ok(EVal::Float(v)),
            Tok::LParen => {
                let v = self.expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(v)
            }
            t => Err(Abort::Syntax(loc, format!("expected expression, found {:?}", t))),
        }
    }

    fn int_op(
        &mut self,
        loc: Loc,
        a: EVal,
        b: EVal,
        f: impl Fn(i128, i128) -> Result<i128, String>,
    ) -> PResult<EVal> {
        match (a, b) {
            (EVal::Int(a), EVal::Int(b)) => match f(a, b) {
                Ok(v) => Ok(EVal::Int(v)),
                Err(e) => Err(Abort::Syntax(loc, e)),
            },
            _ => Err(Abort::Syntax(loc, "bitwise operator requires integral operands".into())),
        }
    }

    fn arith_op(&mut self, _loc: Loc, a: EVal, b: EVal, add: bool) -> PResult<EVal> {
        Ok(match (a, b) {
            (EVal::Int(a), EVal::Int(b)) => {
                EVal::Int(if add { a.wrapping_add(b) } else { a.wrapping_sub(b) })
            }
            (a, b) => {
                let (a, b) = (as_f64(a), as_f64(b));
                EVal::Float(if add { a + b } else { a - b })
            }
        })
    }
}

fn as_f64(v: EVal) -> f64 {
    match v {
        EVal::Int(v) => v as f64,
        EVal::Float(v) => v,
    }
}

/// Ternary align-1 defaults mirror the formatter's elision rules.
pub fn default_ternary_region(exec_size: u8, src_idx: usize) -> Region {
    if src_idx == 2 {
        return Region {
            vs: VertStride::Invalid,
            w: Width::Invalid,
            hs: if exec_size == 1 { HorzStride::H0 } else { HorzStride::H1 },
        };
    }
    if exec_size == 1 {
        Region { vs: VertStride::V0, w: Width::Invalid, hs: HorzStride::H0 }
    } else {
        let vs = match exec_size {
            2 => VertStride::V2,
            4 => VertStride::V4,
            _ => VertStride::V8,
        };
        Region { vs, w: Width::Invalid, hs: HorzStride::H1 }
    }
}

/// `r12` / `acc1` / `null` / `sp` style register names.
pub fn parse_reg_name(s: &str) -> Option<(RegClass, u8)> {
    match s {
        "null" => return Some((RegClass::Null, 0)),
        "sp" => return Some((RegClass::Sp, 0)),
        "ip" => return Some((RegClass::Ip, 0)),
        _ => {}
    }
    let (class, digits) = if let Some(d) = s.strip_prefix("acc") {
        (RegClass::Acc, d)
    } else if let Some(d) = s.strip_prefix("r") {
        (RegClass::Grf, d)
    } else if let Some(d) = s.strip_prefix("a") {
        (RegClass::Addr, d)
    } else if let Some(d) = s.strip_prefix("f") {
        (RegClass::Flag, d)
    } else {
        return None;
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u32 = digits.parse().ok()?;
    if n > 255 {
        return None;
    }
    Some((class, n as u8))
}

fn parse_flag_reg_name(s: &str) -> Option<u8> {
    let (class, n) = parse_reg_name(s)?;
    if class == RegClass::Flag && n < 4 {
        Some(n)
    } else {
        None
    }
}

fn parse_macro_acc(s: &str) -> Option<MacroAcc> {
    if s == "noacc" {
        return Some(MacroAcc::NoAcc);
    }
    let n: u8 = s.strip_prefix("mme")?.parse().ok()?;
    if n < 8 {
        Some(MacroAcc::Mme(n))
    } else {
        None
    }
}

fn parse_chan_off(s: &str) -> Option<u8> {
    let n: u32 = s.strip_prefix('M')?.parse().ok()?;
    if n % 4 == 0 && n < 32 {
        Some(n as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Op;
    use pretty_assertions::assert_eq;

    fn parse_ok(src: &str) -> Kernel {
        let r = parse_kernel(src, Platform::Gen9, &ParseOpts::default());
        assert!(r.kernel.is_some(), "diags: {:?}", r.diagnostics);
        r.kernel.unwrap()
    }

    fn parse_err(src: &str) -> Vec<Diagnostic> {
        let r = parse_kernel(src, Platform::Gen9, &ParseOpts::default());
        assert!(r.kernel.is_none(), "expected errors for {:?}", src);
        r.diagnostics
    }

    fn only_inst(k: &Kernel) -> &Instruction {
        assert_eq!(k.instruction_count(), 1);
        k.instructions().next().unwrap()
    }

    #[test]
    fn basic_mov() {
        let k = parse_ok("mov (8|M0) r1.0<1>:f r2.0<8;8,1>:f\n");
        let i = only_inst(&k);
        assert_eq!(i.op, Op::Mov);
        assert_eq!(i.exec_size, 8);
        assert_eq!(i.chan_off, 0);
        assert_eq!(
            i.dst,
            Some(Operand::Direct {
                class: RegClass::Grf,
                reg: 1,
                sub: 0,
                region: Region::DST1,
                ty: Type::F,
                src_mod: SrcMod::None,
            })
        );
        assert_eq!(i.srcs.len(), 1);
        assert_eq!(i.srcs[0].region(), Region::new(8, 8, 1).unwrap());
    }

    #[test]
    fn default_regions_substituted() {
        let k = parse_ok("add (16|M0) r1.0:f r2.0:f r3.0:f\n");
        let i = only_inst(&k);
        assert_eq!(i.dst.unwrap().region(), Region::DST1);
        assert_eq!(i.srcs[0].region(), Region::new(8, 8, 1).unwrap());
        let k = parse_ok("add (1|M0) r1.0:f r2.0:f r3.0:f\n");
        assert_eq!(only_inst(&k).srcs[1].region(), Region::SCALAR);
    }

    #[test]
    fn predication_and_wren() {
        let k = parse_ok("(W&~f0.1.any4h) sel (8|M8) r1.0:f r2.0:f r3.0:f\n");
        let i = only_inst(&k);
        assert!(i.mask_ctrl);
        assert_eq!(i.pred, Some(Pred { ctrl: PredCtrl::Any4H, inverted: true }));
        assert_eq!(i.flag, FlagRef { reg: 0, sub: 1 });
        assert_eq!(i.chan_off, 8);
    }

    #[test]
    fn flag_modifier_shorthand() {
        let k = parse_ok("cmp (8|M0) (le)f0.1 null:f r2.0:f r3.0:f\n");
        let i = only_inst(&k);
        assert_eq!(i.cond_mod, CondMod::Le);
        assert_eq!(i.flag, FlagRef { reg: 0, sub: 1 });
    }

    #[test]
    fn math_subfunction_and_alias() {
        let k = parse_ok("math.sin (8|M0) r1.0 r2.0\n");
        let i = only_inst(&k);
        assert_eq!(i.op, Op::Math);
        assert_eq!(i.math_fn, Some(MathFn::Sin));
        // unary subfunction takes one source, implicit :f types
        assert_eq!(i.srcs.len(), 1);
        assert_eq!(i.dst.unwrap().ty(), Type::F);
        // implicit region on gen9
        assert_eq!(i.srcs[0].region(), Region::new(8, 8, 1).unwrap());

        let k = parse_ok("pow (8|M0) r1.0 r2.0 r3.0\n");
        let i = only_inst(&k);
        assert_eq!(i.math_fn, Some(MathFn::Pow));
        assert_eq!(i.srcs.len(), 2);
    }

    #[test]
    fn math_without_sub_is_error() {
        let d = parse_err("math (8|M0) r1.0 r2.0\n");
        assert!(d.iter().any(|d| d.message.contains("subfunction")));
    }

    #[test]
    fn immediates_narrow_with_range_checks() {
        let k = parse_ok("mov (1|M0) r1.0:d 100:d\n");
        assert_eq!(only_inst(&k).srcs[0], Operand::Imm(ImmVal::S32(100)));
        let k = parse_ok("mov (1|M0) r1.0:w -32768:w\n");
        assert_eq!(only_inst(&k).srcs[0], Operand::Imm(ImmVal::S16(-32768)));
        let d = parse_err("mov (1|M0) r1.0:b 0xFF:b\n");
        assert!(d.iter().any(|d| d.message.contains("out of range")));
    }

    #[test]
    fn float_bit_pattern_immediate() {
        let k = parse_ok("mov (1|M0) r1.0:f 0x7F800000:f\n");
        let Operand::Imm(ImmVal::F32(bits)) = only_inst(&k).srcs[0] else {
            panic!("expected f32 imm");
        };
        let v = f32::from_bits(bits);
        assert!(v.is_infinite() && v.is_sign_positive());
    }

    #[test]
    fn qnan_payload_rules() {
        let k = parse_ok("mov (1|M0) r1.0:f qnan(0x1B):f\n");
        let Operand::Imm(ImmVal::F32(bits)) = only_inst(&k).srcs[0] else {
            panic!("expected f32 imm");
        };
        assert_eq!(bits, 0x7FC0_001B);
        let d = parse_err("mov (1|M0) r1.0:f qnan(0):f\n");
        assert!(d.iter().any(|d| d.message.contains("non-zero")));
    }

    #[test]
    fn expressions_with_precedence() {
        let k = parse_ok("mov (1|M0) r1.0:d 1+2*3:d\n");
        assert_eq!(only_inst(&k).srcs[0], Operand::Imm(ImmVal::S32(7)));
        let k = parse_ok("mov (1|M0) r1.0:ud (1<<4|3):ud\n");
        assert_eq!(only_inst(&k).srcs[0], Operand::Imm(ImmVal::U32(19)));
        let d = parse_err("mov (1|M0) r1.0:d 1/0:d\n");
        assert!(d.iter().any(|d| d.message.contains("division by zero")));
    }

    #[test]
    fn indirect_operands() {
        let k = parse_ok("mov (8|M0) r1.0<1>:f r[a0.2,16]<8;8,1>:f\n");
        let i = only_inst(&k);
        assert_eq!(
            i.srcs[0],
            Operand::Indirect {
                addr_sub: 2,
                offset: 16,
                region: Region::new(8, 8, 1).unwrap(),
                ty: Type::F,
                src_mod: SrcMod::None,
            }
        );
        // pre-scaled spelling folds the register number into the offset
        let k = parse_ok("mov (8|M0) r1.0<1>:f r4[a0.0,-8]<8;8,1>:f\n");
        let Operand::Indirect { offset, .. } = only_inst(&k).srcs[0] else {
            panic!("expected indirect");
        };
        assert_eq!(offset, 4 * 32 - 8);
    }

    #[test]
    fn source_modifiers() {
        let k = parse_ok("add (8|M0) r1.0:f -r2.0:f -(abs)r3.0:f\n");
        let i = only_inst(&k);
        assert_eq!(i.srcs[0].src_mod(), SrcMod::Neg);
        assert_eq!(i.srcs[1].src_mod(), SrcMod::NegAbs);
        // minus on a literal is a sign, not a modifier
        let k = parse_ok("mov (1|M0) r1.0:d -5:d\n");
        assert_eq!(only_inst(&k).srcs[0], Operand::Imm(ImmVal::S32(-5)));
    }

    #[test]
    fn labels_and_branches() {
        let k = parse_ok("if (16|M0) LBL\nadd (8|M0) r1.0:f r2.0:f r3.0:f\nLBL:\nnop\n");
        let branch = k.instructions().next().unwrap();
        let Operand::Label(LabelTarget::Block(id)) = branch.srcs[0] else {
            panic!("expected resolved label");
        };
        assert_eq!(k.block(id).name.as_deref(), Some("LBL"));
        // the label's block holds the nop
        assert_eq!(k.block(id).instrs.len(), 1);
        assert_eq!(k.block(id).instrs[0].op, Op::Nop);
    }

    #[test]
    fn bare_ident_rejected_off_branches() {
        let d = parse_err("mov (8|M0) r1.0:f LBL\nLBL:\nnop\n");
        assert!(d.iter().any(|d| d.message.contains("unexpected identifier")));
    }

    #[test]
    fn undefined_label() {
        let d = parse_err("jmpi (1|M0) NOWHERE\n");
        assert!(d.iter().any(|d| d.message.contains("undefined label")));
    }

    #[test]
    fn send_with_descriptors() {
        let k = parse_ok("send (8|M0) r5 r10 0x5 0x140B5000 {EOT}\n");
        let i = only_inst(&k);
        assert_eq!(i.ex_desc, Some(SendDesc::Imm(0x5)));
        assert_eq!(i.desc, Some(SendDesc::Imm(0x140B_5000)));
        assert!(i.opts.contains(InstOpts::EOT));
        assert_eq!(i.dst.unwrap().ty(), Type::UD);
        let k = parse_ok("send (8|M0) r5 r10 0x5 a0.0\n");
        assert_eq!(only_inst(&k).desc, Some(SendDesc::Reg { sub: 0 }));
    }

    #[test]
    fn eot_rejected_off_send() {
        let d = parse_err("add (8|M0) r1.0:f r2.0:f r3.0:f {EOT}\n");
        assert!(d.iter().any(|d| d.message.contains("EOT")));
    }

    #[test]
    fn options_parse() {
        let k = parse_ok("add (8|M0) r1.0:f r2.0:f r3.0:f {Atomic, Compacted}\n");
        let i = only_inst(&k);
        assert!(i.opts.contains(InstOpts::ATOMIC));
        assert!(i.opts.contains(InstOpts::COMPACTED));
    }

    #[test]
    fn ternary_regions() {
        let k = parse_ok("mad (8|M0) r1.0<1>:f r2.0<8;1>:f r3.0<8;1>:f r4.0<1>:f\n");
        let i = only_inst(&k);
        assert_eq!(i.srcs.len(), 3);
        assert_eq!(i.srcs[0].region().vs, VertStride::V8);
        assert_eq!(i.srcs[2].region().hs, HorzStride::H1);
    }

    #[test]
    fn macro_operands() {
        let k = parse_ok("madm (8|M0) r1.mme0:f r2.mme1:f r3.mme2:f r4.noacc:f\n");
        let i = only_inst(&k);
        let Operand::Macro { acc, .. } = i.dst.unwrap() else { panic!("expected macro dst") };
        assert_eq!(acc, MacroAcc::Mme(0));
        let Operand::Macro { acc, .. } = i.srcs[2] else { panic!("expected macro src") };
        assert_eq!(acc, MacroAcc::NoAcc);
    }

    #[test]
    fn directives_apply() {
        let k = parse_ok(
            ".default_execution_size(16)\n.default_register_type f\nadd (16|M0) r1.0 r2.0 r3.0\n",
        );
        let i = only_inst(&k);
        assert_eq!(i.exec_size, 16);
        assert_eq!(i.dst.unwrap().ty(), Type::F);
        let d = parse_err("nop\n.default_execution_size(8)\n");
        assert!(d.iter().any(|d| d.message.contains("precede")));
    }

    #[test]
    fn recovery_continues_past_errors() {
        let r = parse_kernel(
            "bogus (8|M0) r1\nmov (8|M0) r1.0<1>:f r2.0<8;8,1>:f\nalso_bogus\n",
            Platform::Gen9,
            &ParseOpts::default(),
        );
        assert!(r.kernel.is_none());
        // both bad statements reported
        assert!(r.diagnostics.iter().filter(|d| d.message.contains("unknown mnemonic")).count() >= 2);
    }

    #[test]
    fn error_cap_aborts() {
        let mut src = String::new();
        for _ in 0..50 {
            src.push_str("bogus\n");
        }
        let r = parse_kernel(&src, Platform::Gen9, &ParseOpts { max_errors: 5, strict_regions: false });
        assert!(r.kernel.is_none());
        assert_eq!(r.diagnostics.len(), 5);
    }

    #[test]
    fn lrp_rejected_on_xe() {
        let r = parse_kernel(
            "lrp (8|M0) r1.0<1>:f r2.0<8;1>:f r3.0<8;1>:f r4.0<1>:f\n",
            Platform::XeLp,
            &ParseOpts::default(),
        );
        assert!(r.kernel.is_none());
    }

    #[test]
    fn strict_region_policy() {
        // math has an implicit region; a mismatching explicit one is a
        // warning by default and an error under the strict policy
        let src = "math.sin (8|M0) r1.0 r2.0<4;4,1>\n";
        let r = parse_kernel(src, Platform::Gen9, &ParseOpts::default());
        assert!(r.kernel.is_some());
        assert!(r.diagnostics.iter().any(|d| d.message.contains("implicit region")));
        let r = parse_kernel(src, Platform::Gen9, &ParseOpts { strict_regions: true, ..Default::default() });
        assert!(r.kernel.is_none());
    }

    #[test]
    fn semicolon_separates_statements() {
        let k = parse_ok("nop; nop\n");
        assert_eq!(k.instruction_count(), 2);
    }
}
