use genasm::diag::{Loc, Severity};
use genasm::{decode_kernel, encode_kernel, parse_kernel, EncodeOpts, ParseOpts, Platform};

#[test]
fn parser_recovers_and_reports_each_statement() {
    let src = "\
mov (8|M0) r1.0:f r2.0:f
bogus (8|M0) r1.0:f r2.0:f
mov (99|M0) r1.0:f r2.0:f
mov (8|M0) r1.0:f r2.0:f
";
    let res = parse_kernel(src, Platform::Gen9, &ParseOpts::default());
    let errors: Vec<_> = res
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 2, "{:?}", res.diagnostics);
    assert!(errors.iter().any(|d| d.message.contains("bogus")));
    assert!(errors.iter().any(|d| d.message.contains("execution size")));
    // the healthy statements still parsed
    assert!(res.kernel.is_none() || res.kernel.unwrap().instruction_count() >= 2);
}

#[test]
fn diagnostics_carry_text_locations() {
    let res = parse_kernel(
        "mov (8|M0) r1.0:f r2.0:f\nbogus\n",
        Platform::Gen9,
        &ParseOpts::default(),
    );
    assert!(res
        .diagnostics
        .iter()
        .any(|d| matches!(d.loc, Loc::Text { line: 2, .. })), "{:?}", res.diagnostics);
}

#[test]
fn error_cap_stops_the_parse() {
    let src = "bogus\n".repeat(50);
    let res = parse_kernel(&src, Platform::Gen9, &ParseOpts { max_errors: 3, strict_regions: false });
    let errors = res
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    assert_eq!(errors, 3);
}

#[test]
fn encode_errors_suppress_output_but_keep_diagnostics() {
    let mut k = parse_kernel(
        "add (1|M0) r1.0:q r2.0:q 0x123456789:q\n",
        Platform::Gen9,
        &ParseOpts::default(),
    )
    .kernel
    .expect("parse");
    let res = encode_kernel(&mut k, Platform::Gen9, &EncodeOpts::default());
    assert!(res.bytes.is_none());
    assert!(res
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Error), "{:?}", res.diagnostics);
}

#[test]
fn decode_warns_on_trailing_garbage() {
    let mut k = parse_kernel("nop\n", Platform::Gen9, &ParseOpts::default())
        .kernel
        .expect("parse");
    let mut bytes = encode_kernel(&mut k, Platform::Gen9, &EncodeOpts::default())
        .bytes
        .expect("encode");
    bytes.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
    let dec = decode_kernel(&bytes, Platform::Gen9);
    assert!(dec
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Warning
            && d.loc == Loc::Pc(16)
            && d.message.contains("trailing")));
    // the good prefix still decodes
    assert_eq!(dec.kernel.expect("kernel").instruction_count(), 1);
}

#[test]
fn decode_warns_on_unknown_opcode() {
    let mut bytes = vec![0u8; 16];
    bytes[0] = 0x7F;
    let dec = decode_kernel(&bytes, Platform::Gen9);
    assert!(dec
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Warning && d.message.contains("opcode")));
}
