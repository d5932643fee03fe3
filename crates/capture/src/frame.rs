//! Control-frame grammar for the pendant link.
//!
//! The device interleaves two kinds of frames on one characteristic:
//! UTF-8 control text (`IMG:<size>:<width>:<height>` to announce a capture,
//! bare `END` to close it) and raw payload bytes. Anything that is not a
//! recognized control frame is payload for whichever session is open.

/// Command written to the link to request a capture.
pub const CMD_SNAP: &str = "SNAP";

/// Prefix announcing an image transfer.
pub const IMG_HEADER_PREFIX: &str = "IMG:";

/// Token closing an image transfer.
pub const END_TOKEN: &str = "END";

/// A recognized control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    /// `IMG:<size>:<width>:<height>`, opens a transfer session.
    ///
    /// Width and height are informational; they are never validated
    /// against the received bytes.
    ImageHeader {
        expected_size: usize,
        width: u32,
        height: u32,
    },
    /// `END`, sent when the device believes the transfer is complete.
    End,
}

impl ControlFrame {
    /// Parses a text frame as a control frame.
    ///
    /// Returns `None` for anything that is not part of the control
    /// grammar. Missing or unparsable numeric header fields default to 0,
    /// so a malformed `IMG:` header still opens a session.
    pub fn parse(text: &str) -> Option<ControlFrame> {
        if text == END_TOKEN {
            return Some(ControlFrame::End);
        }
        let rest = text.strip_prefix(IMG_HEADER_PREFIX)?;
        let mut fields = rest.split(':');
        let expected_size = parse_field(fields.next());
        let width = parse_field(fields.next()) as u32;
        let height = parse_field(fields.next()) as u32;
        Some(ControlFrame::ImageHeader {
            expected_size,
            width,
            height,
        })
    }
}

fn parse_field(field: Option<&str>) -> usize {
    field.and_then(|f| f.parse().ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_header() {
        let frame = ControlFrame::parse("IMG:100:10:10").unwrap();
        assert_eq!(
            frame,
            ControlFrame::ImageHeader {
                expected_size: 100,
                width: 10,
                height: 10,
            }
        );
    }

    #[test]
    fn parses_end_token() {
        assert_eq!(ControlFrame::parse("END"), Some(ControlFrame::End));
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let frame = ControlFrame::parse("IMG:4096").unwrap();
        assert_eq!(
            frame,
            ControlFrame::ImageHeader {
                expected_size: 4096,
                width: 0,
                height: 0,
            }
        );
    }

    #[test]
    fn unparsable_fields_default_to_zero() {
        let frame = ControlFrame::parse("IMG:abc:10:xyz").unwrap();
        assert_eq!(
            frame,
            ControlFrame::ImageHeader {
                expected_size: 0,
                width: 10,
                height: 0,
            }
        );
    }

    #[test]
    fn bare_prefix_opens_with_zeros() {
        let frame = ControlFrame::parse("IMG:").unwrap();
        assert_eq!(
            frame,
            ControlFrame::ImageHeader {
                expected_size: 0,
                width: 0,
                height: 0,
            }
        );
    }

    #[test]
    fn unrelated_text_is_not_control() {
        assert_eq!(ControlFrame::parse("battery: 87%"), None);
        assert_eq!(ControlFrame::parse("ENDX"), None);
        assert_eq!(ControlFrame::parse("end"), None);
        assert_eq!(ControlFrame::parse("IMGX:1:2:3"), None);
    }

    #[test]
    fn extra_fields_are_ignored() {
        let frame = ControlFrame::parse("IMG:5:6:7:8:9").unwrap();
        assert_eq!(
            frame,
            ControlFrame::ImageHeader {
                expected_size: 5,
                width: 6,
                height: 7,
            }
        );
    }
}
