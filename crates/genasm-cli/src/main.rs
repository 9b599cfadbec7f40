use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use genasm::decoder::{DiffStatus, FieldDiff, FieldValue};
use genasm::diag::Severity;
use genasm::{
    decode_kernel, diff_fields, encode_kernel, format_kernel, list_fields, parse_kernel,
    Diagnostic, EncodeOpts, FmtOpts, ParseOpts, Platform,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Gen-style GPU kernel assembler/disassembler", long_about = None)]
struct Cli {
    /// Target platform
    #[arg(long, value_enum, default_value_t = Plat::Gen9, global = true)]
    platform: Plat,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Plat {
    Gen9,
    Gen11,
    Xelp,
}

impl Plat {
    fn to_platform(self) -> Platform {
        match self {
            Plat::Gen9 => Platform::Gen9,
            Plat::Gen11 => Platform::Gen11,
            Plat::Xelp => Platform::XeLp,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble a text kernel into its binary
    Asm {
        /// Input assembly path
        #[arg(value_name = "ASMFILE")]
        input: String,
        /// Write the binary here; without it a hex listing goes to stdout
        #[arg(long, value_name = "FILE")]
        out: Option<String>,
        /// Compact every eligible instruction, not only `{Compacted}` ones
        #[arg(long)]
        auto_compact: bool,
        /// Reject implicit-region mismatches instead of warning
        #[arg(long)]
        strict_regions: bool,
        /// Stop after this many errors
        #[arg(long, default_value_t = 10)]
        max_errors: usize,
    },
    /// Disassemble a binary back to text
    Dis {
        /// Input binary path
        #[arg(value_name = "BINFILE")]
        input: String,
        /// Write output to file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<String>,
        /// Prefix each instruction with its byte offset
        #[arg(long)]
        pc: bool,
    },
    /// List every encoded field of every instruction record
    Fields {
        /// Input binary path
        #[arg(value_name = "BINFILE")]
        input: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Field-level comparison of two binaries
    Diff {
        /// First binary
        #[arg(value_name = "OLD")]
        a: String,
        /// Second binary
        #[arg(value_name = "NEW")]
        b: String,
        /// Include unchanged fields
        #[arg(long)]
        all: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, serde::Serialize)]
struct FieldOut {
    pc: u32,
    name: String,
    off: u32,
    len: u32,
    value: u64,
}

impl From<&FieldValue> for FieldOut {
    fn from(f: &FieldValue) -> Self {
        FieldOut { pc: f.pc, name: f.name.to_string(), off: f.off, len: f.len, value: f.value }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct DiffOut {
    pc: u32,
    name: String,
    off: u32,
    len: u32,
    status: String,
    old: Option<u64>,
    new: Option<u64>,
}

impl From<&FieldDiff> for DiffOut {
    fn from(d: &FieldDiff) -> Self {
        let (status, old, new) = match d.status {
            DiffStatus::Unchanged => ("unchanged", None, None),
            DiffStatus::Changed { old, new } => ("changed", Some(old), Some(new)),
            DiffStatus::Added { new } => ("added", None, Some(new)),
            DiffStatus::Removed { old } => ("removed", Some(old), None),
        };
        DiffOut {
            pc: d.pc,
            name: d.name.to_string(),
            off: d.off,
            len: d.len,
            status: status.to_string(),
            old,
            new,
        }
    }
}

fn report(diags: &[Diagnostic]) -> bool {
    let mut errs = false;
    for d in diags {
        eprintln!("{}", d);
        errs |= d.severity == Severity::Error;
    }
    errs
}

fn write_or_print(out: Option<&str>, text: &str) -> Result<()> {
    match out {
        Some(path) => std::fs::write(path, text).with_context(|| format!("writing {}", path))?,
        None => print!("{}", text),
    }
    Ok(())
}

fn hex_listing(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut s = String::new();
    let mut pc = 0usize;
    while pc < bytes.len() {
        // bit 29 of the first dword marks a compact record
        let len = if pc + 4 <= bytes.len() {
            let dw0 = u32::from_le_bytes(bytes[pc..pc + 4].try_into().unwrap());
            if dw0 & (1 << 29) != 0 {
                8
            } else {
                16
            }
        } else {
            16
        };
        let end = (pc + len).min(bytes.len());
        let _ = write!(s, "{:#06x}:", pc);
        for b in &bytes[pc..end] {
            let _ = write!(s, " {:02x}", b);
        }
        s.push('\n');
        pc = end;
    }
    s
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let platform = cli.platform.to_platform();

    match cli.cmd {
        Command::Asm { input, out, auto_compact, strict_regions, max_errors } => {
            let src = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input))?;
            let parsed = parse_kernel(&src, platform, &ParseOpts { max_errors, strict_regions });
            let had_errs = report(&parsed.diagnostics);
            let Some(mut kernel) = parsed.kernel else {
                bail!("assembly failed: {} could not be parsed", input);
            };
            if had_errs {
                bail!("assembly failed: {} had parse errors", input);
            }
            let enc = encode_kernel(&mut kernel, platform, &EncodeOpts { auto_compact, max_errors });
            report(&enc.diagnostics);
            let Some(bytes) = enc.bytes else {
                bail!("assembly failed: {} had encode errors", input);
            };
            match out {
                Some(path) => std::fs::write(&path, &bytes)
                    .with_context(|| format!("writing {}", path))?,
                None => print!("{}", hex_listing(&bytes)),
            }
        }
        Command::Dis { input, out, pc } => {
            let bytes = std::fs::read(&input).with_context(|| format!("reading {}", input))?;
            let dec = decode_kernel(&bytes, platform);
            report(&dec.diagnostics);
            let Some(kernel) = dec.kernel else {
                bail!("disassembly failed: {}", input);
            };
            let text = format_kernel(
                &kernel,
                platform,
                &FmtOpts { pc_comments: pc, ..Default::default() },
            );
            write_or_print(out.as_deref(), &text)?;
        }
        Command::Fields { input, format } => {
            let bytes = std::fs::read(&input).with_context(|| format!("reading {}", input))?;
            let fields = list_fields(&bytes, platform);
            match format {
                OutputFormat::Json => {
                    let rows: Vec<FieldOut> = fields.iter().map(FieldOut::from).collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
                OutputFormat::Text => {
                    for f in &fields {
                        println!(
                            "{:#06x} [{:>3}+{:<2}] {:<14} {:#x}",
                            f.pc, f.off, f.len, f.name, f.value
                        );
                    }
                }
            }
        }
        Command::Diff { a, b, all, format } => {
            let ba = std::fs::read(&a).with_context(|| format!("reading {}", a))?;
            let bb = std::fs::read(&b).with_context(|| format!("reading {}", b))?;
            let diffs: Vec<FieldDiff> = diff_fields(&ba, &bb, platform)
                .into_iter()
                .filter(|d| all || d.status != DiffStatus::Unchanged)
                .collect();
            match format {
                OutputFormat::Json => {
                    let rows: Vec<DiffOut> = diffs.iter().map(DiffOut::from).collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
                OutputFormat::Text => {
                    for d in &diffs {
                        println!("{}", render_diff(d));
                    }
                }
            }
        }
    }

    Ok(())
}

fn render_diff(d: &FieldDiff) -> String {
    let tail = match d.status {
        DiffStatus::Unchanged => "unchanged".to_string(),
        DiffStatus::Changed { old, new } => format!("{:#x} -> {:#x}", old, new),
        DiffStatus::Added { new } => format!("added {:#x}", new),
        DiffStatus::Removed { old } => format!("removed {:#x}", old),
    };
    format!("{:#06x} [{:>3}+{:<2}] {:<14} {}", d.pc, d.off, d.len, d.name, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(src: &str) -> Vec<u8> {
        let mut k = parse_kernel(src, Platform::Gen9, &ParseOpts::default())
            .kernel
            .expect("parse");
        encode_kernel(&mut k, Platform::Gen9, &EncodeOpts::default())
            .bytes
            .expect("encode")
    }

    #[test]
    fn asm_dis_pipeline() {
        let bytes = assemble("mov (8|M0) r1.0<1>:f r2.0<8;8,1>:f\n");
        assert_eq!(bytes.len(), 16);
        let dec = decode_kernel(&bytes, Platform::Gen9);
        let k = dec.kernel.expect("decode");
        let text = format_kernel(&k, Platform::Gen9, &FmtOpts::default());
        assert_eq!(text, "mov (8|M0) r1.0:f r2.0:f\n");
    }

    #[test]
    fn hex_listing_splits_compact_records() {
        let bytes = assemble("nop {Compacted}\nmov (8|M0) r1.0:f r2.0:f\n");
        assert_eq!(bytes.len(), 8 + 16);
        let listing = hex_listing(&bytes);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0x0000:"));
        assert!(lines[1].starts_with("0x0008:"));
    }

    #[test]
    fn diff_lines_render() {
        let a = assemble("mov (8|M0) r1.0:f r2.0:f\n");
        let b = assemble("mov (8|M0) r3.0:f r2.0:f\n");
        let diffs: Vec<FieldDiff> = diff_fields(&a, &b, Platform::Gen9)
            .into_iter()
            .filter(|d| d.status != DiffStatus::Unchanged)
            .collect();
        assert!(!diffs.is_empty());
        assert!(diffs.iter().any(|d| render_diff(d).contains("->")));
    }
}
