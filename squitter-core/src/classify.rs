//! Per-buffer choice of wrapper decoder.
//!
//! The ASCII preamble is decisive. Without it, the binary PASSCOM marker
//! (`0x7E 0x26`) collides with the opening of a GDL-90 ADS-B report, so any
//! well-formed report in the buffer decides for GDL-90. Anything that is
//! neither wrapper goes to the validator as one raw Mode S frame.

use crate::gdl90;
use crate::passcom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Passcom,
    Gdl90,
    Raw,
}

/// Classify a buffer. `continues_pending` is true when the stream's deframer
/// holds a partial frame that this buffer completes.
pub fn classify(data: &[u8], continues_pending: bool) -> InputKind {
    if passcom::preamble_len(data).is_some() {
        return InputKind::Passcom;
    }
    if continues_pending || carries_gdl90_report(data) {
        return InputKind::Gdl90;
    }
    // A GDL-90 ADS-B report opens with the same two bytes as the PASSCOM
    // marker. A leading flag followed by anything else is a GDL-90 frame
    // whose closing flag may be followed by a report.
    let leading_flag = data.first() == Some(&gdl90::FLAG);
    if leading_flag && data.get(1) != Some(&gdl90::MSG_ADSB_LONG) {
        return InputKind::Gdl90;
    }
    if passcom::record_region(data).is_ok() {
        return InputKind::Passcom;
    }
    if leading_flag {
        return InputKind::Gdl90;
    }
    if passcom::detect(data) {
        return InputKind::Passcom;
    }
    InputKind::Raw
}

/// True when any complete flag-delimited span is an ADS-B long report.
fn carries_gdl90_report(data: &[u8]) -> bool {
    let flags: Vec<usize> = data
        .iter()
        .enumerate()
        .filter(|(_, &b)| b == gdl90::FLAG)
        .map(|(i, _)| i)
        .collect();
    flags
        .windows(2)
        .any(|pair| matches!(gdl90::extract_adsb(&data[pair[0] + 1..pair[1]]), Ok(Some(_))))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hex_decode;

    const KLM_ID: &str = "8D4840D6202CC371C32CE0576098";

    #[test]
    fn test_raw_frame() {
        let frame = hex_decode(KLM_ID).unwrap();
        assert_eq!(classify(&frame, false), InputKind::Raw);
    }

    #[test]
    fn test_empty_buffer_is_raw() {
        assert_eq!(classify(&[], false), InputKind::Raw);
    }

    #[test]
    fn test_gdl90_report_not_mistaken_for_passcom() {
        let frame = hex_decode(KLM_ID).unwrap();
        let wire = gdl90::encode_frame(gdl90::MSG_ADSB_LONG, 0, &frame);
        assert_eq!(&wire[..2], &passcom::MARKER);
        assert_eq!(classify(&wire, false), InputKind::Gdl90);
    }

    #[test]
    fn test_gdl90_other_message() {
        let wire = gdl90::encode_frame(0x00, 0x81, &[0x41, 0x02, 0x03]);
        assert_eq!(classify(&wire, false), InputKind::Gdl90);
    }

    #[test]
    fn test_passcom_with_preamble() {
        let mut buf = b"Received packet from 192.168.4.1:61708: ".to_vec();
        buf.extend_from_slice(&[0x7E, 0x26, 0x00, 0x0E]);
        buf.extend(hex_decode(KLM_ID).unwrap());
        assert_eq!(classify(&buf, false), InputKind::Passcom);
    }

    #[test]
    fn test_passcom_ascii_hex_without_preamble() {
        let mut buf = vec![0x7E, 0x26, 0x00, 0x1C];
        buf.extend_from_slice(KLM_ID.as_bytes());
        assert_eq!(classify(&buf, false), InputKind::Passcom);
    }

    #[test]
    fn test_pending_continuation_is_gdl90() {
        assert_eq!(classify(&[0x11, 0x22, 0x7E], true), InputKind::Gdl90);
        assert_eq!(classify(&[0x11, 0x22, 0x7E], false), InputKind::Raw);
    }

    #[test]
    fn test_partial_gdl90_report_is_gdl90() {
        let frame = hex_decode(KLM_ID).unwrap();
        let wire = gdl90::encode_frame(gdl90::MSG_ADSB_LONG, 0, &frame);
        assert_eq!(classify(&wire[..8], false), InputKind::Gdl90);
    }

    #[test]
    fn test_marker_mid_buffer_is_passcom() {
        // Marker not at the start and the record overruns: still PASSCOM so
        // the failure is counted there.
        assert_eq!(
            classify(&[0x00, 0x7E, 0x26, 0x00, 0x40, 0x01], false),
            InputKind::Passcom
        );
    }

    /// Heartbeat followed by ADS-B reports, each closing flag opening the next.
    fn heartbeat_then_reports(reports: usize) -> Vec<u8> {
        let frame = hex_decode(KLM_ID).unwrap();
        let mut wire = gdl90::encode_frame(0x00, 0x81, &[0x41, 0x02, 0x03, 0x04, 0x05]);
        for _ in 0..reports {
            wire.extend_from_slice(&gdl90::encode_frame(gdl90::MSG_ADSB_LONG, 0, &frame)[1..]);
        }
        wire
    }

    #[test]
    fn test_reports_after_heartbeat_are_gdl90() {
        let wire = heartbeat_then_reports(9);
        // The heartbeat's closing flag and the next id read as a PASSCOM
        // marker with a length that fits the buffer.
        assert!(passcom::record_region(&wire).is_ok());
        assert_eq!(classify(&wire, false), InputKind::Gdl90);
    }

    #[test]
    fn test_heartbeat_then_corrupted_report_is_gdl90() {
        let mut wire = heartbeat_then_reports(1);
        let len = wire.len();
        wire.insert(len - 1, 0x00);
        assert_eq!(classify(&wire, false), InputKind::Gdl90);
    }
}
