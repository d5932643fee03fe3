//! Best-effort repair of a byte buffer that fails strict JPEG validation.
//!
//! The pendant streams JPEG bytes over a lossy link, so the start or end
//! marker occasionally goes missing. Repair only patches the two outermost
//! markers; no interior structure is touched.

/// JPEG start-of-image marker.
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker.
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Patches missing SOI/EOI markers on a JPEG byte buffer.
///
/// Idempotent: applying it twice yields the same result as once, and a
/// buffer that already starts and ends with the markers is returned
/// unchanged.
pub fn repair_jpeg(data: Vec<u8>) -> Vec<u8> {
    let mut repaired = data;

    if repaired.len() < 2 || repaired[..2] != JPEG_SOI {
        let mut prefixed = Vec::with_capacity(repaired.len() + 2);
        prefixed.extend_from_slice(&JPEG_SOI);
        prefixed.extend_from_slice(&repaired);
        repaired = prefixed;
    }

    if repaired.len() < 2 || repaired[repaired.len() - 2..] != JPEG_EOI {
        repaired.extend_from_slice(&JPEG_EOI);
    }

    repaired
}
