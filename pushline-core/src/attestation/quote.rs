// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! SGX quote parsing.
//!
//! Layout (little-endian):
//!
//! ```text
//!   0  version u16          2  sign_type u16        4  gid u32
//!   8  qe_svn u16          10  pce_svn u16         12  reserved [4]
//!  16  basename [32]       48  cpu_svn [16]        64  reserved [32]
//!  96  flags u64          104  xfrm u64           112  mrenclave [32]
//! 144  reserved [32]      176  mrsigner [32]      208  reserved [96]
//! 304  isv_prod_id u16    306  isv_svn u16        308  reserved [60]
//! 368  report_data [64]   432  signature_len u32  436  signature
//! ```

use super::AttestationError;

/// Length of the signed quote body.
pub const QUOTE_BODY_LEN: usize = 432;

const SIGNATURE_OFFSET: usize = QUOTE_BODY_LEN + 4;

pub const SGX_FLAGS_INITTED: u64 = 0x0000_0000_0000_0001;
pub const SGX_FLAGS_DEBUG: u64 = 0x0000_0000_0000_0002;
pub const SGX_FLAGS_MODE64BIT: u64 = 0x0000_0000_0000_0004;
pub const SGX_FLAGS_RESERVED: u64 = 0xFFFF_FFFF_FFFF_FFC8;
pub const SGX_XFRM_RESERVED: u64 = 0xFFFF_FFFF_FFFF_FFF8;

/// A parsed and structurally validated quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub version: u16,
    pub is_sig_linkable: bool,
    pub gid: u32,
    pub qe_svn: u16,
    pub pce_svn: u16,
    pub basename: [u8; 32],
    pub cpu_svn: [u8; 16],
    pub flags: u64,
    pub xfrm: u64,
    pub mrenclave: [u8; 32],
    pub mrsigner: [u8; 32],
    pub isv_prod_id: u16,
    pub isv_svn: u16,
    pub report_data: [u8; 64],
    pub signature: Vec<u8>,
    raw: Vec<u8>,
}

fn invalid(reason: impl Into<String>) -> AttestationError {
    AttestationError::InvalidQuote(reason.into())
}

struct Cursor<'a> {
    bytes: &'a [u8],
}

impl Cursor<'_> {
    fn u16(&self, at: usize) -> u16 {
        u16::from_le_bytes([self.bytes[at], self.bytes[at + 1]])
    }

    fn u32(&self, at: usize) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.bytes[at..at + 4]);
        u32::from_le_bytes(b)
    }

    fn u64(&self, at: usize) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.bytes[at..at + 8]);
        u64::from_le_bytes(b)
    }

    fn array<const N: usize>(&self, at: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[at..at + N]);
        out
    }

    fn zero(&self, from: usize, to: usize) -> Result<(), AttestationError> {
        if self.bytes[from..to].iter().any(|b| *b != 0) {
            return Err(invalid(format!("reserved bytes {}..{} not zero", from, to)));
        }
        Ok(())
    }
}

impl Quote {
    /// Parses a quote and checks its structural invariants.
    pub fn parse(bytes: &[u8]) -> Result<Self, AttestationError> {
        if bytes.len() < SIGNATURE_OFFSET {
            return Err(invalid(format!("quote too short: {} bytes", bytes.len())));
        }
        let c = Cursor { bytes };

        let version = c.u16(0);
        if !(1..=2).contains(&version) {
            return Err(invalid(format!("unknown version {}", version)));
        }

        let sign_type = c.u16(2);
        if sign_type & !1 != 0 {
            return Err(invalid(format!("unknown signature type {}", sign_type)));
        }

        let pce_svn = if version > 1 {
            c.u16(10)
        } else {
            c.zero(10, 12)?;
            0
        };
        c.zero(12, 16)?;
        c.zero(64, 96)?;

        let flags = c.u64(96);
        let xfrm = c.u64(104);
        if flags & SGX_FLAGS_RESERVED != 0
            || flags & SGX_FLAGS_INITTED == 0
            || flags & SGX_FLAGS_MODE64BIT == 0
        {
            return Err(invalid(format!("bad flags {:#x}", flags)));
        }
        if xfrm & SGX_XFRM_RESERVED != 0 {
            return Err(invalid(format!("bad xfrm {:#x}", xfrm)));
        }

        c.zero(144, 176)?;
        c.zero(208, 304)?;
        c.zero(308, 368)?;

        let signature_len = c.u32(QUOTE_BODY_LEN) as usize;
        if signature_len != bytes.len() - SIGNATURE_OFFSET {
            return Err(invalid(format!(
                "signature length {} does not match {} trailing bytes",
                signature_len,
                bytes.len() - SIGNATURE_OFFSET
            )));
        }

        Ok(Quote {
            version,
            is_sig_linkable: sign_type == 1,
            gid: c.u32(4),
            qe_svn: c.u16(8),
            pce_svn,
            basename: c.array(16),
            cpu_svn: c.array(48),
            flags,
            xfrm,
            mrenclave: c.array(112),
            mrsigner: c.array(176),
            isv_prod_id: c.u16(304),
            isv_svn: c.u16(306),
            report_data: c.array(368),
            signature: bytes[SIGNATURE_OFFSET..].to_vec(),
            raw: bytes.to_vec(),
        })
    }

    pub fn is_debug(&self) -> bool {
        self.flags & SGX_FLAGS_DEBUG != 0
    }

    /// The signed part of the quote.
    pub fn body(&self) -> &[u8] {
        &self.raw[..QUOTE_BODY_LEN]
    }
}

/// Assembles quote bytes; used by tests and benchmarks.
#[doc(hidden)]
pub fn build_quote(
    mrenclave: [u8; 32],
    report_data: [u8; 64],
    flags: u64,
    signature: &[u8],
) -> Vec<u8> {
    let mut quote = vec![0u8; SIGNATURE_OFFSET];
    quote[0..2].copy_from_slice(&2u16.to_le_bytes());
    quote[96..104].copy_from_slice(&flags.to_le_bytes());
    quote[104..112].copy_from_slice(&3u64.to_le_bytes());
    quote[112..144].copy_from_slice(&mrenclave);
    quote[368..432].copy_from_slice(&report_data);
    quote[432..436].copy_from_slice(&(signature.len() as u32).to_le_bytes());
    quote.extend_from_slice(signature);
    quote
}
