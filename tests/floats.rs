use pretty_assertions::assert_eq;

use genasm::{
    decode_kernel, encode_kernel, format_kernel, parse_kernel, EncodeOpts, FmtOpts, ParseOpts,
    Platform,
};

fn pipeline(src: &str) -> String {
    let mut k = parse_kernel(src, Platform::Gen9, &ParseOpts::default())
        .kernel
        .expect("parse");
    let bytes = encode_kernel(&mut k, Platform::Gen9, &EncodeOpts::default())
        .bytes
        .expect("encode");
    let dec = decode_kernel(&bytes, Platform::Gen9).kernel.expect("decode");
    format_kernel(&dec, Platform::Gen9, &FmtOpts::default())
}

fn imm_bits(src: &str) -> u64 {
    let mut k = parse_kernel(src, Platform::Gen9, &ParseOpts::default())
        .kernel
        .expect("parse");
    let bytes = encode_kernel(&mut k, Platform::Gen9, &EncodeOpts::default())
        .bytes
        .expect("encode");
    u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as u64
}

#[test]
fn plain_decimals_survive() {
    assert_eq!(pipeline("mov (1|M0) r1.0:f 1.5:f\n"), "mov (1|M0) r1.0:f 1.5:f\n");
    assert_eq!(pipeline("mov (1|M0) r1.0:f -0.25:f\n"), "mov (1|M0) r1.0:f -0.25:f\n");
    assert_eq!(pipeline("mov (1|M0) r1.0:hf 0.5:hf\n"), "mov (1|M0) r1.0:hf 0.5:hf\n");
}

#[test]
fn integral_floats_keep_a_point() {
    assert_eq!(pipeline("mov (1|M0) r1.0:f 8:f\n"), "mov (1|M0) r1.0:f 8.0:f\n");
}

#[test]
fn huge_magnitudes_keep_their_bits() {
    let text = pipeline("mov (1|M0) r1.0:f 1e30:f\n");
    assert_eq!(pipeline(&text), text);
    assert_eq!(imm_bits(&text), 1e30f32.to_bits() as u64);
}

#[test]
fn non_finite_values_print_as_bit_patterns() {
    assert_eq!(
        pipeline("mov (1|M0) r1.0:f 0x7F800000:f\n"),
        "mov (1|M0) r1.0:f 0x7F800000:f\n"
    );
    assert_eq!(imm_bits("mov (1|M0) r1.0:f 0x7F800000:f\n"), 0x7F800000);
}

#[test]
fn nan_payloads_are_bit_exact() {
    assert_eq!(imm_bits("mov (1|M0) r1.0:f qnan(0x1B):f\n"), 0x7FC0001B);
    assert_eq!(imm_bits("mov (1|M0) r1.0:f snan(0x1B):f\n"), 0x7F80001B);
    let text = pipeline("mov (1|M0) r1.0:f qnan(0x1B):f\n");
    assert_eq!(text, "mov (1|M0) r1.0:f 0x7FC0001B:f\n");
}

#[test]
fn f64_immediates_span_both_upper_words() {
    let mut k = parse_kernel(
        "mov (1|M0) r1.0:df 3.141592653589793:df\n",
        Platform::Gen9,
        &ParseOpts::default(),
    )
    .kernel
    .expect("parse");
    let bytes = encode_kernel(&mut k, Platform::Gen9, &EncodeOpts::default())
        .bytes
        .expect("encode");
    let imm = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
    assert_eq!(imm, std::f64::consts::PI.to_bits());
    let dec = decode_kernel(&bytes, Platform::Gen9).kernel.expect("decode");
    let text = format_kernel(&dec, Platform::Gen9, &FmtOpts::default());
    assert_eq!(text, "mov (1|M0) r1.0:df 3.141592653589793:df\n");
}

#[test]
fn ordinary_literals_round_to_nearest() {
    // 0.1 is inexact in f32; the literal rounds rather than erroring
    assert_eq!(imm_bits("mov (1|M0) r1.0:f 0.1:f\n"), 0.1f32.to_bits() as u64);
    assert_eq!(imm_bits("mov (1|M0) r1.0:f 0.5:f\n"), 0.5f32.to_bits() as u64);
}

#[test]
fn oversized_nan_payload_is_an_error() {
    // a quiet f16 NaN has nine payload bits
    let res = parse_kernel(
        "mov (1|M0) r1.0:hf qnan(0x3FF0):hf\n",
        Platform::Gen9,
        &ParseOpts::default(),
    );
    assert!(
        res.diagnostics.iter().any(|d| d.message.contains("payload")),
        "{:?}",
        res.diagnostics
    );
}
