//! Sample format description and raw byte codec.
//!
//! A [`SampleFormat`] describes how one PCM sample is laid out in memory:
//! physical width, byte order, and whether the encoding is unsigned
//! (offset-binary). Decoding normalizes every supported encoding to a
//! zero-centered signed amplitude by XOR-ing the silence pattern, so the
//! meter and the padding logic never need per-format special cases.

use std::fmt;

/// Description of a single PCM sample encoding.
///
/// Construct one of the named constants ([`SampleFormat::S16_LE`] etc.),
/// parse a classic format name with [`SampleFormat::parse`], or build an
/// arbitrary width with [`SampleFormat::custom`] - the transfer engine moves
/// any width, while metering supports 8/16/24/32 bits only and degrades
/// gracefully elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFormat {
    /// Physical sample width in bits (24-bit samples occupy 3 bytes).
    pub bits: u16,
    /// Significant bits per sample; equal to `bits` for the packed formats.
    pub significant_bits: u16,
    /// Little-endian byte order. Irrelevant for 8-bit formats.
    pub little_endian: bool,
    /// Unsigned (offset-binary) encoding; silence sits at mid-scale.
    pub unsigned: bool,
}

impl SampleFormat {
    /// Unsigned 8 bit. The historical default for raw streams.
    pub const U8: Self = Self::new(8, true, true);
    /// Signed 8 bit.
    pub const S8: Self = Self::new(8, true, false);
    /// Signed 16 bit little endian.
    pub const S16_LE: Self = Self::new(16, true, false);
    /// Signed 16 bit big endian.
    pub const S16_BE: Self = Self::new(16, false, false);
    /// Unsigned 16 bit little endian.
    pub const U16_LE: Self = Self::new(16, true, true);
    /// Unsigned 16 bit big endian.
    pub const U16_BE: Self = Self::new(16, false, true);
    /// Signed 24 bit little endian, packed in 3 bytes.
    pub const S24_3LE: Self = Self::new(24, true, false);
    /// Signed 24 bit big endian, packed in 3 bytes.
    pub const S24_3BE: Self = Self::new(24, false, false);
    /// Signed 32 bit little endian.
    pub const S32_LE: Self = Self::new(32, true, false);
    /// Signed 32 bit big endian.
    pub const S32_BE: Self = Self::new(32, false, false);
    /// Unsigned 32 bit little endian.
    pub const U32_LE: Self = Self::new(32, true, true);

    const fn new(bits: u16, little_endian: bool, unsigned: bool) -> Self {
        Self {
            bits,
            significant_bits: bits,
            little_endian,
            unsigned,
        }
    }

    /// Builds a format with an arbitrary physical width.
    ///
    /// Transfers work for any byte-aligned width; metering is only available
    /// for 8/16/24/32 bits and reports the unsupported width once.
    pub const fn custom(bits: u16, little_endian: bool, unsigned: bool) -> Self {
        Self::new(bits, little_endian, unsigned)
    }

    /// Parses a classic format name (`S16_LE`, `U8`, ...), case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        Some(match upper.as_str() {
            "U8" => Self::U8,
            "S8" => Self::S8,
            "S16_LE" | "S16" => Self::S16_LE,
            "S16_BE" => Self::S16_BE,
            "U16_LE" | "U16" => Self::U16_LE,
            "U16_BE" => Self::U16_BE,
            "S24_3LE" => Self::S24_3LE,
            "S24_3BE" => Self::S24_3BE,
            "S32_LE" | "S32" => Self::S32_LE,
            "S32_BE" => Self::S32_BE,
            "U32_LE" | "U32" => Self::U32_LE,
            _ => return None,
        })
    }

    /// Physical bytes per sample.
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits) / 8
    }

    /// Returns `true` when the width is one the meter can decode.
    pub fn is_meterable(&self) -> bool {
        matches!(self.bits, 8 | 16 | 24 | 32)
    }

    /// The raw bit pattern representing zero amplitude.
    ///
    /// Used both as padding content and as the XOR mask that maps
    /// offset-binary encodings onto the signed scale.
    pub fn silence_pattern(&self) -> u32 {
        if self.unsigned {
            1u32 << (self.bits - 1)
        } else {
            0
        }
    }

    /// Positive full-scale amplitude for percentage computation.
    ///
    /// `1 << (significant_bits - 1)`, saturated to `i32::MAX` when the shift
    /// would overflow (32 significant bits).
    pub fn full_scale(&self) -> i64 {
        if self.significant_bits >= 32 {
            i64::from(i32::MAX)
        } else {
            1i64 << (self.significant_bits - 1)
        }
    }

    /// Decodes a byte span into zero-centered signed amplitudes.
    ///
    /// Returns `false` (leaving `out` untouched) for widths the codec does
    /// not support. Decoding is lossless: the 32-bit negative boundary
    /// `0x8000_0000` stays `i32::MIN` so that [`encode`](Self::encode)
    /// reproduces the input bytes exactly.
    pub fn decode(&self, bytes: &[u8], out: &mut Vec<i32>) -> bool {
        let mask = self.silence_pattern();
        match self.bits {
            8 => {
                let m = mask as u8;
                out.extend(bytes.iter().map(|&b| i32::from((b ^ m) as i8)));
            }
            16 => {
                let m = mask as u16;
                out.extend(bytes.chunks_exact(2).map(|c| {
                    let raw = if self.little_endian {
                        u16::from_le_bytes([c[0], c[1]])
                    } else {
                        u16::from_be_bytes([c[0], c[1]])
                    };
                    i32::from((raw ^ m) as i16)
                }));
            }
            24 => {
                out.extend(bytes.chunks_exact(3).map(|c| {
                    let raw = if self.little_endian {
                        u32::from(c[0]) | u32::from(c[1]) << 8 | u32::from(c[2]) << 16
                    } else {
                        u32::from(c[0]) << 16 | u32::from(c[1]) << 8 | u32::from(c[2])
                    };
                    let val = raw ^ mask;
                    // sign-extend from bit 23
                    if val & 0x80_0000 != 0 {
                        (val | 0xff00_0000) as i32
                    } else {
                        val as i32
                    }
                }));
            }
            32 => {
                out.extend(bytes.chunks_exact(4).map(|c| {
                    let raw = if self.little_endian {
                        u32::from_le_bytes([c[0], c[1], c[2], c[3]])
                    } else {
                        u32::from_be_bytes([c[0], c[1], c[2], c[3]])
                    };
                    (raw ^ mask) as i32
                }));
            }
            _ => return false,
        }
        true
    }

    /// Encodes zero-centered amplitudes back into raw bytes.
    ///
    /// Exact inverse of [`decode`](Self::decode) for the supported widths.
    pub fn encode(&self, amps: &[i32], out: &mut Vec<u8>) -> bool {
        let mask = self.silence_pattern();
        match self.bits {
            8 => {
                let m = mask as u8;
                out.extend(amps.iter().map(|&a| (a as i8 as u8) ^ m));
            }
            16 => {
                let m = mask as u16;
                for &a in amps {
                    let raw = (a as i16 as u16) ^ m;
                    let b = if self.little_endian {
                        raw.to_le_bytes()
                    } else {
                        raw.to_be_bytes()
                    };
                    out.extend_from_slice(&b);
                }
            }
            24 => {
                for &a in amps {
                    let raw = ((a as u32) & 0x00ff_ffff) ^ mask;
                    if self.little_endian {
                        out.extend_from_slice(&[raw as u8, (raw >> 8) as u8, (raw >> 16) as u8]);
                    } else {
                        out.extend_from_slice(&[(raw >> 16) as u8, (raw >> 8) as u8, raw as u8]);
                    }
                }
            }
            32 => {
                for &a in amps {
                    let raw = (a as u32) ^ mask;
                    let b = if self.little_endian {
                        raw.to_le_bytes()
                    } else {
                        raw.to_be_bytes()
                    };
                    out.extend_from_slice(&b);
                }
            }
            _ => return false,
        }
        true
    }

    /// Fills a byte span with the format's silence pattern.
    ///
    /// The span length must be a multiple of the sample size; used for
    /// padding short playback chunks.
    pub fn fill_silence(&self, buf: &mut [u8]) {
        let mut pattern = Vec::with_capacity(self.bytes_per_sample());
        self.encode(&[0], &mut pattern);
        if pattern.is_empty() {
            // widths the codec does not know still get zero padding
            buf.fill(0);
            return;
        }
        for chunk in buf.chunks_mut(pattern.len()) {
            chunk.copy_from_slice(&pattern[..chunk.len()]);
        }
    }

    /// Human-readable description, e.g. `Signed 16 bit Little Endian`.
    pub fn description(&self) -> String {
        let sign = if self.unsigned { "Unsigned" } else { "Signed" };
        if self.bits == 8 {
            format!("{} 8 bit", sign)
        } else {
            let endian = if self.little_endian {
                "Little Endian"
            } else {
                "Big Endian"
            };
            format!("{} {} bit {}", sign, self.bits, endian)
        }
    }
}

impl Default for SampleFormat {
    fn default() -> Self {
        Self::U8
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.unsigned { 'U' } else { 'S' };
        if self.bits == 8 {
            write!(f, "{}8", sign)
        } else {
            let packed = if self.bits == 24 { "_3" } else { "_" };
            let endian = if self.little_endian { "LE" } else { "BE" };
            write!(f, "{}{}{}{}", sign, self.bits, packed, endian)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classic_names() {
        assert_eq!(SampleFormat::parse("s16_le"), Some(SampleFormat::S16_LE));
        assert_eq!(SampleFormat::parse("U8"), Some(SampleFormat::U8));
        assert_eq!(SampleFormat::parse("S24_3BE"), Some(SampleFormat::S24_3BE));
        assert_eq!(SampleFormat::parse("F32_LE"), None);
    }

    #[test]
    fn test_silence_pattern() {
        assert_eq!(SampleFormat::U8.silence_pattern(), 0x80);
        assert_eq!(SampleFormat::S16_LE.silence_pattern(), 0);
        assert_eq!(SampleFormat::U16_LE.silence_pattern(), 0x8000);
        assert_eq!(SampleFormat::U32_LE.silence_pattern(), 0x8000_0000);
    }

    #[test]
    fn test_decode_u8_is_zero_centered() {
        let mut out = Vec::new();
        assert!(SampleFormat::U8.decode(&[0x80, 0x90, 0x70, 0xff, 0x00], &mut out));
        assert_eq!(out, vec![0, 0x10, -0x10, 0x7f, -0x80]);
    }

    #[test]
    fn test_decode_s16_endianness() {
        let mut le = Vec::new();
        SampleFormat::S16_LE.decode(&[0x34, 0x12], &mut le);
        assert_eq!(le, vec![0x1234]);

        let mut be = Vec::new();
        SampleFormat::S16_BE.decode(&[0x12, 0x34], &mut be);
        assert_eq!(be, vec![0x1234]);
    }

    #[test]
    fn test_decode_s24_sign_extension() {
        let mut out = Vec::new();
        // 0xFFFFFF is -1 in 24-bit two's complement
        SampleFormat::S24_3LE.decode(&[0xff, 0xff, 0xff], &mut out);
        assert_eq!(out, vec![-1]);

        out.clear();
        // 0x800000 is the negative boundary
        SampleFormat::S24_3LE.decode(&[0x00, 0x00, 0x80], &mut out);
        assert_eq!(out, vec![-0x80_0000]);
    }

    #[test]
    fn test_decode_s32_boundary_unclamped() {
        let mut out = Vec::new();
        SampleFormat::S32_LE.decode(&[0x00, 0x00, 0x00, 0x80], &mut out);
        assert_eq!(out, vec![i32::MIN]);
    }

    #[test]
    fn test_roundtrip_all_widths() {
        let cases: &[(SampleFormat, Vec<u8>)] = &[
            (SampleFormat::U8, vec![0x00, 0x42, 0x80, 0xff]),
            (SampleFormat::S16_LE, vec![0x01, 0x02, 0xfe, 0xff]),
            (SampleFormat::S16_BE, vec![0x01, 0x02, 0xfe, 0xff]),
            (SampleFormat::U16_LE, vec![0x00, 0x80, 0x12, 0x34]),
            (SampleFormat::S24_3LE, vec![0x01, 0x02, 0x03, 0xfd, 0xfe, 0xff]),
            (SampleFormat::S24_3BE, vec![0x01, 0x02, 0x03, 0xfd, 0xfe, 0xff]),
            (SampleFormat::S32_LE, vec![0x00, 0x00, 0x00, 0x80, 1, 2, 3, 4]),
            (SampleFormat::S32_BE, vec![0x80, 0x00, 0x00, 0x00, 1, 2, 3, 4]),
        ];
        for (fmt, bytes) in cases {
            let mut amps = Vec::new();
            assert!(fmt.decode(bytes, &mut amps), "decode {}", fmt);
            let mut back = Vec::new();
            assert!(fmt.encode(&amps, &mut back), "encode {}", fmt);
            assert_eq!(&back, bytes, "roundtrip {}", fmt);
        }
    }

    #[test]
    fn test_unsupported_width_refuses() {
        let odd = SampleFormat::custom(20, true, false);
        let mut out = Vec::new();
        assert!(!odd.decode(&[0; 4], &mut out));
        assert!(out.is_empty());
        assert!(!odd.is_meterable());
    }

    #[test]
    fn test_fill_silence_u8() {
        let mut buf = [0u8; 6];
        SampleFormat::U8.fill_silence(&mut buf);
        assert_eq!(buf, [0x80; 6]);
    }

    #[test]
    fn test_fill_silence_u16_le() {
        let mut buf = [0u8; 6];
        SampleFormat::U16_LE.fill_silence(&mut buf);
        assert_eq!(buf, [0x00, 0x80, 0x00, 0x80, 0x00, 0x80]);
    }

    #[test]
    fn test_fill_silence_s16_is_zero() {
        let mut buf = [0xaau8; 4];
        SampleFormat::S16_LE.fill_silence(&mut buf);
        assert_eq!(buf, [0; 4]);
    }

    #[test]
    fn test_full_scale() {
        assert_eq!(SampleFormat::U8.full_scale(), 128);
        assert_eq!(SampleFormat::S16_LE.full_scale(), 32768);
        assert_eq!(SampleFormat::S24_3LE.full_scale(), 8_388_608);
        assert_eq!(SampleFormat::S32_LE.full_scale(), i64::from(i32::MAX));
    }

    #[test]
    fn test_display_and_description() {
        assert_eq!(SampleFormat::S16_LE.to_string(), "S16_LE");
        assert_eq!(SampleFormat::S24_3BE.to_string(), "S24_3BE");
        assert_eq!(SampleFormat::U8.to_string(), "U8");
        assert_eq!(
            SampleFormat::S16_LE.description(),
            "Signed 16 bit Little Endian"
        );
    }
}
