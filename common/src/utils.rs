//! Common Utilities
//!
//! Provides formatting helpers used when tracing burst traffic

/// Convert a byte slice to hex string for debugging
pub fn bytes_to_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render hard bits (one bit per byte) as a compact digit string
pub fn hard_bits_to_string(bits: &[u8]) -> String {
    let mut out = String::with_capacity(bits.len());
    for &bit in bits {
        out.push(if bit != 0 { '1' } else { '0' });
    }
    out
}

/// Render soft bits as a comma separated list
pub fn soft_bits_to_string(bits: &[i8]) -> String {
    let mut out = String::with_capacity(bits.len() * 4);
    for (i, bit) in bits.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&bit.to_string());
    }
    out
}
