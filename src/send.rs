//! Send-message descriptors: the shared-function target enumeration and
//! the vendor-codec boundary. The vendor library is only ever reached
//! through [`DescriptorCodec`]; the built-in [`FallbackCodec`] keeps
//! everything working (with reduced detail) when no vendor codec is
//! present or it reports "not supported".

use serde::Serialize;

use crate::ir::Platform;

/// Shared-function unit a send message targets. The numeric value is the
/// 4-bit SFID field encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum Sfid {
    Null = 0,
    Sampler = 2,
    Gateway = 3,
    Dc2 = 4,
    Rc = 5,
    Urb = 6,
    Ts = 7,
    Dc0 = 10,
    Dc1 = 12,
}

impl Sfid {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(c: u32) -> Option<Sfid> {
        Some(match c {
            0 => Sfid::Null,
            2 => Sfid::Sampler,
            3 => Sfid::Gateway,
            4 => Sfid::Dc2,
            5 => Sfid::Rc,
            6 => Sfid::Urb,
            7 => Sfid::Ts,
            10 => Sfid::Dc0,
            12 => Sfid::Dc1,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Sfid::Null => "null",
            Sfid::Sampler => "sampler",
            Sfid::Gateway => "gateway",
            Sfid::Dc2 => "dc2",
            Sfid::Rc => "rc",
            Sfid::Urb => "urb",
            Sfid::Ts => "ts",
            Sfid::Dc0 => "dc0",
            Sfid::Dc1 => "dc1",
        }
    }

    pub fn from_name(s: &str) -> Option<Sfid> {
        Some(match s {
            "null" => Sfid::Null,
            "sampler" => Sfid::Sampler,
            "gateway" => Sfid::Gateway,
            "dc2" => Sfid::Dc2,
            "rc" => Sfid::Rc,
            "urb" => Sfid::Urb,
            "ts" => Sfid::Ts,
            "dc0" => Sfid::Dc0,
            "dc1" => Sfid::Dc1,
            _ => return None,
        })
    }
}

/// Human-readable summary of a 32-bit message descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendSummary {
    pub sfid: Sfid,
    pub msg_len: u32,
    pub resp_len: u32,
    pub header_present: bool,
    pub msg_type: u32,
    /// Unit-specific message-type name when the codec knows one.
    pub msg_type_name: Option<String>,
}

/// Narrow boundary to the vendor bitfield codec. `describe` may decline
/// (unsupported platform/unit) and callers must then fall back.
pub trait DescriptorCodec {
    fn describe(&self, platform: Platform, sfid: Sfid, desc: u32) -> Option<SendSummary>;
}

// the fixed descriptor bit positions the fallback understands
const MSG_LEN_OFF: u32 = 25;
const RESP_LEN_OFF: u32 = 20;
const HEADER_BIT: u32 = 19;
const MSG_TYPE_OFF: u32 = 14;

/// Manual bit-decode path used when no vendor codec answers.
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackCodec;

impl FallbackCodec {
    fn type_name(sfid: Sfid, msg_type: u32) -> Option<String> {
        let s = match (sfid, msg_type) {
            (Sfid::Sampler, 0) => "sample",
            (Sfid::Sampler, 1) => "sample_b",
            (Sfid::Sampler, 2) => "sample_l",
            (Sfid::Sampler, 7) => "ld",
            (Sfid::Rc, 12) => "rt_write",
            (Sfid::Rc, 13) => "rt_read",
            (Sfid::Dc0, 0) => "block_read",
            (Sfid::Dc0, 10) => "block_write",
            (Sfid::Dc1, 1) => "untyped_read",
            (Sfid::Dc1, 9) => "untyped_write",
            _ => return None,
        };
        Some(s.to_string())
    }
}

impl DescriptorCodec for FallbackCodec {
    fn describe(&self, _platform: Platform, sfid: Sfid, desc: u32) -> Option<SendSummary> {
        Some(SendSummary {
            sfid,
            msg_len: (desc >> MSG_LEN_OFF) & 0xF,
            resp_len: (desc >> RESP_LEN_OFF) & 0x1F,
            header_present: (desc >> HEADER_BIT) & 1 != 0,
            msg_type: (desc >> MSG_TYPE_OFF) & 0x1F,
            msg_type_name: Self::type_name(sfid, (desc >> MSG_TYPE_OFF) & 0x1F),
        })
    }
}

/// Summarize via the given codec, falling back to the manual decode when
/// the codec declines.
pub fn describe_desc(
    codec: Option<&dyn DescriptorCodec>,
    platform: Platform,
    sfid: Sfid,
    desc: u32,
) -> SendSummary {
    if let Some(c) = codec {
        if let Some(s) = c.describe(platform, sfid, desc) {
            return s;
        }
    }
    FallbackCodec
        .describe(platform, sfid, desc)
        .expect("fallback codec always answers")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_decodes_fields() {
        // msg_len=4, resp_len=2, header, msg_type=12 (rt_write)
        let desc = (4 << 25) | (2 << 20) | (1 << 19) | (12 << 14);
        let s = describe_desc(None, Platform::Gen9, Sfid::Rc, desc);
        assert_eq!(s.msg_len, 4);
        assert_eq!(s.resp_len, 2);
        assert!(s.header_present);
        assert_eq!(s.msg_type_name.as_deref(), Some("rt_write"));
    }

    #[test]
    fn declining_codec_falls_back() {
        struct Mute;
        impl DescriptorCodec for Mute {
            fn describe(&self, _: Platform, _: Sfid, _: u32) -> Option<SendSummary> {
                None
            }
        }
        let s = describe_desc(Some(&Mute), Platform::XeLp, Sfid::Sampler, 7 << 14);
        assert_eq!(s.msg_type, 7);
        assert_eq!(s.msg_type_name.as_deref(), Some("ld"));
    }

    #[test]
    fn sfid_codes_roundtrip() {
        for s in [Sfid::Null, Sfid::Sampler, Sfid::Dc0, Sfid::Dc1, Sfid::Ts] {
            assert_eq!(Sfid::from_code(s.code()), Some(s));
            assert_eq!(Sfid::from_name(s.name()), Some(s));
        }
    }
}
