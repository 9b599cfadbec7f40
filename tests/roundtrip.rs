use pretty_assertions::assert_eq;

use genasm::{
    decode_kernel, encode_kernel, format_kernel, parse_kernel, EncodeOpts, FmtOpts, ParseOpts,
    Platform,
};

fn assemble(src: &str) -> Vec<u8> {
    let parsed = parse_kernel(src, Platform::Gen9, &ParseOpts::default());
    assert!(
        parsed.diagnostics.is_empty(),
        "unexpected diagnostics: {:?}",
        parsed.diagnostics
    );
    let mut k = parsed.kernel.expect("kernel");
    let res = encode_kernel(&mut k, Platform::Gen9, &EncodeOpts::default());
    assert!(res.diagnostics.is_empty(), "unexpected diagnostics: {:?}", res.diagnostics);
    res.bytes.expect("bytes")
}

fn disassemble(bytes: &[u8]) -> String {
    let dec = decode_kernel(bytes, Platform::Gen9);
    assert!(dec.diagnostics.is_empty(), "unexpected diagnostics: {:?}", dec.diagnostics);
    format_kernel(&dec.kernel.expect("kernel"), Platform::Gen9, &FmtOpts::default())
}

const KERNEL: &str = "\
mov (8|M0) r1.0<1>:f r2.0<8;8,1>:f
(W) add (16|M16) r10.0<1>:d r12.0<8;8,1>:d 64:d
cmp (8|M0) (lt)f0.0 null:f r3.0<8;8,1>:f 1.0:f
(f0.0) sel (8|M0) r4.0<1>:f r3.0<8;8,1>:f 0.0:f
LOOP:
add (8|M0) r3.0<1>:f r3.0<8;8,1>:f -r5.0<8;8,1>:f
while (8|M0) LOOP
mad (8|M0) r6.0<1>:f r7.0<8;1>:f r8.0<8;1>:f r9.0<1>:f
math.pow (8|M0) r11.0 r2.0 r3.0
send (8|M0) r20 r21 0xa 0x2000000 {EOT}
";

#[test]
fn binary_survives_decode_and_reassembly() {
    let bytes = assemble(KERNEL);
    assert_eq!(bytes.len(), 10 * 16);
    let text = disassemble(&bytes);
    let again = assemble(&text);
    assert_eq!(again, bytes);
}

#[test]
fn formatted_text_is_a_fixpoint() {
    let bytes = assemble(KERNEL);
    let text = disassemble(&bytes);
    let text2 = disassemble(&assemble(&text));
    assert_eq!(text2, text);
}

#[test]
fn decoded_branch_targets_become_labels() {
    let bytes = assemble(KERNEL);
    let text = disassemble(&bytes);
    // the while target at byte 64 gets a synthesized label
    assert!(text.contains("L0040:"), "{}", text);
    assert!(text.contains("while (8|M0) L0040"), "{}", text);
}

#[test]
fn source_level_kernel_reformats_identically() {
    let parsed = parse_kernel(KERNEL, Platform::Gen9, &ParseOpts::default());
    let k = parsed.kernel.expect("kernel");
    let text = format_kernel(&k, Platform::Gen9, &FmtOpts::default());
    let reparsed = parse_kernel(&text, Platform::Gen9, &ParseOpts::default());
    let k2 = reparsed.kernel.expect("kernel");
    let text2 = format_kernel(&k2, Platform::Gen9, &FmtOpts::default());
    assert_eq!(text2, text);
    // named labels survive canonicalization
    assert!(text.contains("LOOP:"), "{}", text);
}

#[test]
fn empty_source_yields_empty_binary() {
    let bytes = assemble("// nothing here\n");
    assert!(bytes.is_empty());
    let dec = decode_kernel(&bytes, Platform::Gen9);
    assert_eq!(dec.kernel.expect("kernel").instruction_count(), 0);
}
