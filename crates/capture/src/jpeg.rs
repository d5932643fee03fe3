//! Strict structural validation of JPEG buffers.
//!
//! Walks the marker stream: SOI, length-prefixed segments, entropy-coded
//! scan data (with byte stuffing and restart markers), EOI. Extracts the
//! frame dimensions from the SOF header on the way. Scans are not
//! entropy-decoded; a buffer passes when its marker structure is intact.

use crate::repair::JPEG_SOI;

/// Dimensions parsed from a JPEG frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegInfo {
    pub width: u32,
    pub height: u32,
}

/// Reasons a buffer fails strict validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JpegError {
    #[error("missing start-of-image marker")]
    MissingSoi,

    #[error("data ends before end-of-image marker")]
    Truncated,

    #[error("unexpected marker byte 0x{0:02x}")]
    UnexpectedMarker(u8),

    #[error("invalid segment length")]
    BadSegmentLength,

    #[error("zero width or height in frame header")]
    InvalidDimensions,

    #[error("end-of-image reached without a frame header")]
    MissingFrameHeader,
}

/// Validates `data` as a structurally complete JPEG and returns its
/// dimensions.
pub fn parse_info(data: &[u8]) -> Result<JpegInfo, JpegError> {
    if data.len() < 2 || data[..2] != JPEG_SOI {
        return Err(JpegError::MissingSoi);
    }

    let mut i = 2usize;
    let mut info: Option<JpegInfo> = None;

    loop {
        if i >= data.len() {
            return Err(JpegError::Truncated);
        }
        if data[i] != 0xFF {
            return Err(JpegError::UnexpectedMarker(data[i]));
        }
        // Skip fill bytes.
        while i < data.len() && data[i] == 0xFF {
            i += 1;
        }
        if i >= data.len() {
            return Err(JpegError::Truncated);
        }
        let code = data[i];
        i += 1;

        match code {
            // EOI: trailing bytes after it are ignored.
            0xD9 => return info.ok_or(JpegError::MissingFrameHeader),

            // Standalone markers: TEM and restart markers.
            0x01 | 0xD0..=0xD7 => {}

            // A second SOI or a stray stuffed-zero marker is malformed.
            0xD8 | 0x00 => return Err(JpegError::UnexpectedMarker(code)),

            // SOS: skip the scan header, then the entropy-coded data.
            0xDA => {
                let len = read_segment_len(data, i)?;
                i += len;
                skip_entropy_coded(data, &mut i)?;
            }

            // SOF (all variants except DHT/JPG/DAC which share the range).
            0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                let len = read_segment_len(data, i)?;
                if len < 8 {
                    return Err(JpegError::BadSegmentLength);
                }
                let height = u16::from_be_bytes([data[i + 3], data[i + 4]]) as u32;
                let width = u16::from_be_bytes([data[i + 5], data[i + 6]]) as u32;
                if width == 0 || height == 0 {
                    return Err(JpegError::InvalidDimensions);
                }
                info = Some(JpegInfo { width, height });
                i += len;
            }

            // Every other marker carries a length-prefixed segment.
            _ => {
                let len = read_segment_len(data, i)?;
                i += len;
            }
        }
    }
}

/// Reads a big-endian segment length at `i`, including the length bytes
/// themselves, and checks it fits in `data`.
fn read_segment_len(data: &[u8], i: usize) -> Result<usize, JpegError> {
    if i + 2 > data.len() {
        return Err(JpegError::Truncated);
    }
    let len = u16::from_be_bytes([data[i], data[i + 1]]) as usize;
    if len < 2 {
        return Err(JpegError::BadSegmentLength);
    }
    if i + len > data.len() {
        return Err(JpegError::Truncated);
    }
    Ok(len)
}

/// Advances `i` past entropy-coded scan data, leaving it on the 0xFF of
/// the next real marker.
fn skip_entropy_coded(data: &[u8], i: &mut usize) -> Result<(), JpegError> {
    loop {
        if *i + 1 >= data.len() {
            return Err(JpegError::Truncated);
        }
        if data[*i] != 0xFF {
            *i += 1;
            continue;
        }
        match data[*i + 1] {
            // Stuffed 0xFF data byte.
            0x00 => *i += 2,
            // Fill byte.
            0xFF => *i += 1,
            // Restart marker inside the scan.
            0xD0..=0xD7 => *i += 2,
            _ => return Ok(()),
        }
    }
}

/// A minimal structurally valid 8x8 JPEG for tests.
#[cfg(test)]
pub(crate) fn tiny_jpeg() -> Vec<u8> {
    let mut data = Vec::new();
    // SOI
    data.extend_from_slice(&[0xFF, 0xD8]);
    // APP0 (JFIF header, length 16)
    data.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    data.extend_from_slice(b"JFIF\0");
    data.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    // SOF0: precision 8, height 8, width 8, 3 components (length 17)
    data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x08, 0x00, 0x08, 0x03]);
    data.extend_from_slice(&[0x01, 0x22, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01]);
    // SOS: 3 components (length 12)
    data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x0C, 0x03, 0x01, 0x00, 0x02, 0x11, 0x03]);
    data.extend_from_slice(&[0x11, 0x00, 0x3F, 0x00]);
    // Entropy-coded bytes, including a stuffed 0xFF.
    data.extend_from_slice(&[0x12, 0x34, 0xFF, 0x00, 0x56, 0x78]);
    // EOI
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

/// A structurally valid JPEG padded with entropy bytes to exactly `n`
/// bytes (`n` must be at least the size of the tiny test image).
#[cfg(test)]
pub(crate) fn jpeg_of_len(n: usize) -> Vec<u8> {
    let mut data = tiny_jpeg();
    assert!(
        n >= data.len(),
        "cannot build a jpeg smaller than {}",
        data.len()
    );
    let eoi = data.len() - 2;
    let padding = vec![0x11u8; n - data.len()];
    data.splice(eoi..eoi, padding);
    data
}
