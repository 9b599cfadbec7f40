//! Bit-exact floating-point conversions among f64, f32, f16, and the 8-bit
//! restricted "quarter" format (1s-4e-3m, bias 7), plus shortest
//! round-trip text rendering for immediates.
//!
//! NaN handling is by payload shift: the quiet bit and the top of the
//! mantissa payload move into the narrower format's mantissa; if the shift
//! would zero the payload entirely, the lowest payload bit is forced so a
//! NaN never silently becomes a normal number. Widening shifts the payload
//! back up, so `widen(narrow(x)) == x` exactly whenever `x` is
//! representable in the narrower format.

// f16: 1 sign, 5 exponent (bias 15), 10 mantissa.
const F16_EXP_BITS: u32 = 5;
const F16_MNT_BITS: u32 = 10;
// quarter: 1 sign, 4 exponent (bias 7), 3 mantissa.
const QRT_EXP_BITS: u32 = 4;
const QRT_MNT_BITS: u32 = 3;

/// Widen an f32 to f64 preserving NaN payload bits exactly.
pub fn f32_to_f64(x: f32) -> f64 {
    let bits = x.to_bits();
    if x.is_nan() {
        let sign = ((bits >> 31) as u64) << 63;
        let payload = (bits & 0x007F_FFFF) as u64;
        // payload occupies the top of the f64 mantissa
        return f64::from_bits(sign | 0x7FF0_0000_0000_0000 | (payload << 29));
    }
    x as f64
}

/// Narrow an f64 to f32. Non-NaN values round to nearest-even; NaN
/// payloads shift down with a forced non-zero payload.
pub fn f64_to_f32(x: f64) -> f32 {
    let bits = x.to_bits();
    if x.is_nan() {
        let sign = ((bits >> 63) as u32) << 31;
        let mut payload = ((bits & 0x000F_FFFF_FFFF_FFFF) >> 29) as u32;
        if payload == 0 {
            payload = 1;
        }
        return f32::from_bits(sign | 0x7F80_0000 | payload);
    }
    x as f32
}

/// Narrow an f64 to f32 only if the value survives exactly, NaN payload
/// bits included.
pub fn f64_to_f32_exact(x: f64) -> Option<f32> {
    let narrowed = f64_to_f32(x);
    if f32_to_f64(narrowed).to_bits() == x.to_bits() {
        Some(narrowed)
    } else {
        None
    }
}

/// Narrow an f64 to f16 bits only if the value survives exactly.
pub fn f64_to_f16_exact(x: f64) -> Option<u16> {
    let f = f64_to_f32_exact(x)?;
    let h = f32_to_f16(f);
    if f16_to_f32(h).to_bits() == f.to_bits() {
        Some(h)
    } else {
        None
    }
}

/// Widen f16 bits to f32, normalizing subnormals and shifting NaN
/// payloads up.
pub fn f16_to_f32(h: u16) -> f32 {
    widen_small(h as u32, F16_EXP_BITS, F16_MNT_BITS)
}

/// Narrow an f32 to f16 bits: round-to-nearest-even, subnormal
/// generation, overflow to infinity, NaN payload shift with forced
/// non-zero payload.
pub fn f32_to_f16(x: f32) -> u16 {
    narrow_small(x, F16_EXP_BITS, F16_MNT_BITS) as u16
}

/// Widen quarter bits to f32.
pub fn quarter_to_f32(q: u8) -> f32 {
    widen_small(q as u32, QRT_EXP_BITS, QRT_MNT_BITS)
}

/// Narrow an f32 to quarter bits.
pub fn f32_to_quarter(x: f32) -> u8 {
    narrow_small(x, QRT_EXP_BITS, QRT_MNT_BITS) as u8
}

/// Widen a small IEEE-style format (exp_bits/mnt_bits, implicit leading
/// one, standard inf/NaN codes) into f32.
fn widen_small(bits: u32, exp_bits: u32, mnt_bits: u32) -> f32 {
    let bias = (1u32 << (exp_bits - 1)) - 1;
    let sign = (bits >> (exp_bits + mnt_bits)) & 1;
    let exp = (bits >> mnt_bits) & ((1 << exp_bits) - 1);
    let mnt = bits & ((1 << mnt_bits) - 1);
    let exp_max = (1u32 << exp_bits) - 1;
    let out_sign = sign << 31;

    if exp == exp_max {
        if mnt == 0 {
            return f32::from_bits(out_sign | 0x7F80_0000);
        }
        // NaN: payload into the top of the f32 mantissa
        let payload = mnt << (23 - mnt_bits);
        return f32::from_bits(out_sign | 0x7F80_0000 | payload);
    }
    if exp == 0 {
        if mnt == 0 {
            return f32::from_bits(out_sign);
        }
        // subnormal: normalize into the f32 range
        let shift = mnt.leading_zeros() - (32 - mnt_bits);
        let norm_mnt = ((mnt << (shift + 1)) & ((1 << mnt_bits) - 1)) << (23 - mnt_bits);
        let e = 127 - bias - shift;
        return f32::from_bits(out_sign | (e << 23) | norm_mnt);
    }
    let e = exp + 127 - bias;
    f32::from_bits(out_sign | (e << 23) | (mnt << (23 - mnt_bits)))
}

/// Narrow an f32 into a small IEEE-style format, returned in the low bits.
fn narrow_small(x: f32, exp_bits: u32, mnt_bits: u32) -> u32 {
    let bias = (1u32 << (exp_bits - 1)) - 1;
    let exp_max = (1u32 << exp_bits) - 1;
    let bits = x.to_bits();
    let sign = (bits >> 31) << (exp_bits + mnt_bits);
    let exp = (bits >> 23) & 0xFF;
    let mnt = bits & 0x007F_FFFF;

    if exp == 0xFF {
        if mnt == 0 {
            return sign | (exp_max << mnt_bits); // infinity
        }
        let mut payload = mnt >> (23 - mnt_bits);
        if payload == 0 {
            payload = 1;
        }
        return sign | (exp_max << mnt_bits) | payload;
    }

    // unbiased exponent; subnormal f32 inputs are below every small
    // format's subnormal range and flush to zero along with small normals
    let e = exp as i32 - 127;
    let min_normal = 1 - bias as i32;
    if e > exp_max as i32 - bias as i32 {
        return sign | (exp_max << mnt_bits);
    }

    let (mut out_exp, full_mnt, drop) = if e < min_normal {
        // subnormal result: shift the implicit one into the mantissa
        let shift = (min_normal - e) as u32;
        if shift > mnt_bits + 24 {
            return sign; // underflows to zero even before rounding
        }
        (0u32, (1 << 23) | mnt, (23 - mnt_bits) + shift)
    } else {
        ((e - min_normal + 1) as u32, mnt, 23 - mnt_bits)
    };

    // round to nearest, ties to even
    let kept = full_mnt >> drop;
    let rem = full_mnt & ((1u32 << drop) - 1);
    let half = 1u32 << (drop - 1);
    let mut out_mnt = kept & ((1 << mnt_bits) - 1);
    let round_up = rem > half || (rem == half && (kept & 1) == 1);
    if round_up {
        out_mnt += 1;
        if out_exp == 0 {
            // subnormal may round up into the normal range; the carry
            // lands exactly on exponent 1 mantissa 0
            if out_mnt >> mnt_bits != 0 {
                out_exp = 1;
                out_mnt = 0;
            }
        } else if out_mnt >> mnt_bits != 0 {
            out_exp += 1;
            out_mnt = 0;
        }
    }
    if out_exp >= exp_max {
        return sign | (exp_max << mnt_bits); // overflow to infinity
    }
    sign | (out_exp << mnt_bits) | out_mnt
}

/// Render f32 bits as the shortest token that reparses to the exact same
/// bit pattern: plain decimal, then scientific, then hex-bits fallback.
pub fn fmt_f32_bits(bits: u32) -> String {
    let v = f32::from_bits(bits);
    if v.is_finite() {
        let plain = format!("{}", v);
        if reparses_f32(&plain, bits) {
            return ensure_point(plain);
        }
        let sci = format!("{:e}", v);
        if reparses_f32(&sci, bits) {
            return sci;
        }
    }
    format!("0x{:X}", bits)
}

/// Render f64 bits the same way (`:df` immediates).
pub fn fmt_f64_bits(bits: u64) -> String {
    let v = f64::from_bits(bits);
    if v.is_finite() {
        let plain = format!("{}", v);
        if plain.parse::<f64>().map(|p| p.to_bits()) == Ok(bits) {
            return ensure_point(plain);
        }
        let sci = format!("{:e}", v);
        if sci.parse::<f64>().map(|p| p.to_bits()) == Ok(bits) {
            return sci;
        }
    }
    format!("0x{:X}", bits)
}

/// Render f16 bits; widened to f32 for the decimal attempt, which is
/// exact for every finite f16.
pub fn fmt_f16_bits(bits: u16) -> String {
    let wide = f16_to_f32(bits);
    if wide.is_finite() {
        let plain = format!("{}", wide);
        if let Ok(p) = plain.parse::<f32>() {
            if f32_to_f16(p) == bits && f16_to_f32(bits).to_bits() == p.to_bits() {
                return ensure_point(plain);
            }
        }
        let sci = format!("{:e}", wide);
        if let Ok(p) = sci.parse::<f32>() {
            if f32_to_f16(p) == bits && f16_to_f32(bits).to_bits() == p.to_bits() {
                return sci;
            }
        }
    }
    format!("0x{:X}", bits)
}

fn reparses_f32(s: &str, bits: u32) -> bool {
    s.parse::<f32>().map(|p| p.to_bits()) == Ok(bits)
}

// Keep float tokens visibly float: `8` becomes `8.0`.
fn ensure_point(s: String) -> String {
    if s.contains('.') || s.contains('e') || s.contains('E') {
        s
    } else {
        format!("{}.0", s)
    }
}
