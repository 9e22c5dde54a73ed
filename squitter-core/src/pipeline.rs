//! Buffer-to-messages pipeline.
//!
//! ```text
//! RawBuffer -> classify -> {PASSCOM | GDL-90 | raw} -> CandidateFrame*
//!           -> validate (length, DF, CRC) -> dispatch by type code -> DecodedMessage*
//! ```
//!
//! A `Decoder` belongs to one transport stream: it holds the GDL-90 pending
//! bytes and the altitude history for that stream. Results are returned as a
//! `DecodeOutcome`; folding them into shared totals is the `Aggregator`'s job.

use tracing::{debug, trace};

use crate::altitude::AltitudeDecoder;
use crate::classify::{classify, InputKind};
use crate::config::DecoderConfig;
use crate::decode;
use crate::frame;
use crate::gdl90::Gdl90Deframer;
use crate::passcom;
use crate::stats::StatsDelta;
use crate::tracker::Aggregator;
use crate::types::{
    icao_to_string, CandidateFrame, DecodeOutcome, DecodedMessage, Provenance, RawBuffer,
    ReferencePosition, Result, Sighting, ValidationError,
};

/// Stateful decoder for a single transport stream.
#[derive(Debug, Clone)]
pub struct Decoder {
    config: DecoderConfig,
    deframer: Gdl90Deframer,
    altitude: AltitudeDecoder,
}

impl Decoder {
    pub fn new(config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Decoder {
            deframer: Gdl90Deframer::new(&config.framing),
            altitude: AltitudeDecoder::new(config.altitude.clone()),
            config,
        })
    }

    /// Decode one buffer. `reference` overrides the configured reference
    /// position for local CPR.
    pub fn decode(
        &mut self,
        buffer: &RawBuffer,
        reference: Option<ReferencePosition>,
    ) -> DecodeOutcome {
        let mut out = DecodeOutcome::default();
        out.delta.buffers_processed = 1;
        let reference = reference.or(self.config.reference);

        for candidate in self.candidates(&buffer.data, &mut out.delta) {
            self.decode_candidate(&candidate, reference, buffer, &mut out);
        }

        out.delta.messages_parsed = out.messages.len() as u64;
        if out.messages.is_empty() {
            out.delta.parse_errors = 1;
        }
        out
    }

    /// Decode one buffer and merge the result into `aggregator`.
    pub fn ingest(
        &mut self,
        buffer: &RawBuffer,
        reference: Option<ReferencePosition>,
        aggregator: &Aggregator,
    ) -> Vec<DecodedMessage> {
        let outcome = self.decode(buffer, reference);
        aggregator.record(&outcome);
        outcome.messages
    }

    fn candidates(&mut self, data: &[u8], delta: &mut StatsDelta) -> Vec<CandidateFrame> {
        if data.is_empty() {
            trace!("empty buffer");
            return Vec::new();
        }

        let continues = self.deframer.continues_pending(data);
        let kind = classify(data, continues);
        trace!(?kind, len = data.len(), "buffer classified");

        if self.deframer.has_pending() && (!continues || kind != InputKind::Gdl90) {
            debug!("held GDL-90 partial frame not continued, discarded");
            self.deframer.clear();
            delta.gdl90.truncated += 1;
        }

        match kind {
            InputKind::Passcom => {
                delta.routing.passcom_messages_processed += 1;
                let extracted = passcom::extract(data);
                delta.passcom.merge(&extracted.counters);
                extracted
                    .frames
                    .into_iter()
                    .map(|f| CandidateFrame::new(f, Provenance::Passcom))
                    .collect()
            }
            InputKind::Gdl90 => {
                delta.routing.gdl90_messages_processed += 1;
                let deframed = self.deframer.deframe(data);
                delta.gdl90.merge(&deframed.counters);
                deframed
                    .payloads
                    .into_iter()
                    .map(|p| CandidateFrame::new(p, Provenance::Gdl90))
                    .collect()
            }
            InputKind::Raw => {
                delta.routing.raw_messages_processed += 1;
                vec![CandidateFrame::new(data, Provenance::Raw)]
            }
        }
    }

    fn decode_candidate(
        &mut self,
        candidate: &CandidateFrame,
        reference: Option<ReferencePosition>,
        buffer: &RawBuffer,
        out: &mut DecodeOutcome,
    ) {
        let msg = match frame::validate(candidate, &self.config.accepted_dfs) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, provenance = ?candidate.provenance, "candidate rejected");
                let counters = &mut out.delta.validation;
                match e {
                    ValidationError::LengthInvalid(_) => counters.length_invalid += 1,
                    ValidationError::CrcFail(_) => counters.crc_fail += 1,
                    ValidationError::DfRejected(_) => counters.df_rejected += 1,
                }
                return;
            }
        };
        out.delta.validation.frames_validated += 1;

        let type_code = msg.type_code();
        out.sightings.push(Sighting {
            icao: msg.icao,
            df: msg.df,
            type_code,
            seen_at: buffer.received_at,
        });

        let fields = match decode::dispatch(
            &msg,
            reference,
            buffer.received_at,
            &mut self.altitude,
            &mut out.delta,
        ) {
            Ok(fields) => fields,
            Err(e) => {
                trace!(icao = %icao_to_string(&msg.icao), error = %e, "no decoder");
                return;
            }
        };

        if let (Some(type_code), false) = (type_code, fields.is_empty()) {
            out.messages.push(DecodedMessage {
                icao: msg.icao,
                df: msg.df,
                type_code,
                provenance: msg.provenance,
                parsed_timestamp: buffer.received_at,
                fields,
            });
        }
    }
}

/// One-shot decode with a fresh decoder: no state carries between calls.
pub fn decode_buffer(
    bytes: &[u8],
    reference: Option<ReferencePosition>,
    config: &DecoderConfig,
) -> Result<(Vec<DecodedMessage>, StatsDelta)> {
    let mut decoder = Decoder::new(config.clone())?;
    let outcome = decoder.decode(&RawBuffer::now(bytes), reference);
    Ok((outcome.messages, outcome.delta))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FramingConfig;
    use crate::gdl90;
    use crate::passcom::MARKER;
    use crate::types::{hex_decode, icao_from_hex};
    use std::sync::Arc;
    use std::thread;

    const KLM_ID: &str = "8D4840D6202CC371C32CE0576098";

    fn decoder() -> Decoder {
        Decoder::new(DecoderConfig::default()).unwrap()
    }

    fn buffer(hex: &str) -> RawBuffer {
        RawBuffer::now(hex_decode(hex).unwrap())
    }

    fn lenient() -> Decoder {
        Decoder::new(DecoderConfig {
            framing: FramingConfig {
                strict_framing: false,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap()
    }

    fn klm_report() -> Vec<u8> {
        gdl90::encode_frame(gdl90::MSG_ADSB_LONG, 0, &hex_decode(KLM_ID).unwrap())
    }

    fn passcom_record(data: &[u8]) -> Vec<u8> {
        let mut buf = b"Received packet from 192.168.4.1:61708: ".to_vec();
        buf.extend_from_slice(&MARKER);
        buf.extend_from_slice(&(data.len() as u16).to_be_bytes());
        buf.extend_from_slice(data);
        buf.extend_from_slice(&[0xC4, 0xF8, 0x7E]);
        buf
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let config = DecoderConfig {
            accepted_dfs: vec![17, 20],
            ..Default::default()
        };
        assert!(Decoder::new(config).is_err());
    }

    #[test]
    fn test_raw_identification() {
        let buf = buffer(KLM_ID);
        let out = decoder().decode(&buf, None);
        assert_eq!(out.messages.len(), 1);
        let msg = &out.messages[0];
        assert_eq!(msg.icao_hex(), "4840d6");
        assert_eq!(msg.type_code, 4);
        assert_eq!(msg.callsign(), Some("KLM1023_"));
        assert_eq!(msg.category(), Some(0));
        assert_eq!(msg.provenance, Provenance::Raw);
        assert_eq!(msg.parsed_timestamp, buf.received_at);
        assert_eq!(out.sightings.len(), 1);
        assert_eq!(out.delta.routing.raw_messages_processed, 1);
        assert_eq!(out.delta.validation.frames_validated, 1);
        assert_eq!(out.delta.messages_parsed, 1);
        assert_eq!(out.delta.parse_errors, 0);
    }

    #[test]
    fn test_empty_buffer() {
        let out = decoder().decode(&RawBuffer::now(Vec::new()), None);
        assert!(out.messages.is_empty());
        assert_eq!(out.delta.buffers_processed, 1);
        assert_eq!(out.delta.parse_errors, 1);
        assert_eq!(out.delta.routing, Default::default());
    }

    #[test]
    fn test_crc_failure_counted() {
        let out = decoder().decode(&buffer("8D4840D6580B982C8BA874F80820"), None);
        assert!(out.messages.is_empty());
        assert!(out.sightings.is_empty());
        assert_eq!(out.delta.validation.crc_fail, 1);
        assert_eq!(out.delta.parse_errors, 1);
    }

    #[test]
    fn test_bad_length_counted() {
        let out = decoder().decode(&RawBuffer::now(vec![0x8D, 0x48, 0x40]), None);
        assert_eq!(out.delta.validation.length_invalid, 1);
        assert_eq!(out.delta.parse_errors, 1);
    }

    #[test]
    fn test_position_uses_configured_reference() {
        let config = DecoderConfig {
            reference: Some(ReferencePosition {
                lat: 52.258,
                lon: 3.918,
            }),
            ..Default::default()
        };
        let mut dec = Decoder::new(config).unwrap();
        let out = dec.decode(&buffer("8D40621D58C382D690C8AC2863A7"), None);
        let msg = &out.messages[0];
        assert_eq!(msg.altitude_baro_ft(), Some(38000));
        assert!((msg.latitude().unwrap() - 52.2572).abs() < 1e-4);
        assert!((msg.longitude().unwrap() - 3.9194).abs() < 1e-4);
    }

    #[test]
    fn test_unknown_type_code_is_sighting_only() {
        let mut raw = vec![0x8D, 0x48, 0x40, 0xD6, 0xE1, 0x00, 0, 0, 0, 0, 0, 0, 0, 0];
        crate::crc::seal(&mut raw);
        let out = decoder().decode(&RawBuffer::now(raw), None);
        assert!(out.messages.is_empty());
        assert_eq!(out.sightings.len(), 1);
        assert_eq!(out.sightings[0].type_code, Some(28));
        assert_eq!(out.delta.dispatch.unknown_type_code, 1);
        assert_eq!(out.delta.parse_errors, 1);
    }

    #[test]
    fn test_df11_accepted_when_configured() {
        let config = DecoderConfig {
            accepted_dfs: vec![11, 17, 18],
            ..Default::default()
        };
        let mut raw = vec![0x5D, 0x48, 0x40, 0xD6, 0, 0, 0];
        crate::crc::seal(&mut raw);
        let out = Decoder::new(config)
            .unwrap()
            .decode(&RawBuffer::now(raw.clone()), None);
        assert!(out.messages.is_empty());
        assert_eq!(out.sightings[0].df, 11);
        assert_eq!(out.sightings[0].type_code, None);

        // Rejected by DF under the default set.
        let out = decoder().decode(&RawBuffer::now(raw), None);
        assert_eq!(out.delta.validation.df_rejected, 1);
    }

    #[test]
    fn test_decode_buffer_one_shot() {
        let (messages, delta) =
            decode_buffer(&hex_decode(KLM_ID).unwrap(), None, &DecoderConfig::default()).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(delta.buffers_processed, 1);
    }

    #[test]
    fn test_gdl90_wrapped_identification() {
        let wire = klm_report();
        let out = decoder().decode(&RawBuffer::now(wire), None);
        assert_eq!(out.messages.len(), 1);
        assert_eq!(out.messages[0].callsign(), Some("KLM1023_"));
        assert_eq!(out.messages[0].provenance, Provenance::Gdl90);
        assert_eq!(out.delta.routing.gdl90_messages_processed, 1);
        assert_eq!(out.delta.gdl90.adsb_found, 1);
    }

    #[test]
    fn test_passcom_binary_and_ascii_hex_agree() {
        let frame = hex_decode(KLM_ID).unwrap();
        let binary = decoder().decode(&RawBuffer::now(passcom_record(&frame)), None);
        let ascii = decoder().decode(&RawBuffer::now(passcom_record(KLM_ID.as_bytes())), None);

        for out in [&binary, &ascii] {
            assert_eq!(out.messages.len(), 1);
            assert_eq!(out.messages[0].callsign(), Some("KLM1023_"));
            assert_eq!(out.messages[0].provenance, Provenance::Passcom);
            assert_eq!(out.delta.routing.passcom_messages_processed, 1);
        }
        assert_eq!(binary.delta.passcom.ascii_hex_conversions, 0);
        assert_eq!(ascii.delta.passcom.ascii_hex_conversions, 1);
    }

    #[test]
    fn test_passcom_corrupted_length() {
        let mut buf = passcom_record(&hex_decode(KLM_ID).unwrap());
        let at = buf.len() - 3 - 14 - 2;
        buf[at..at + 2].copy_from_slice(&0x0400u16.to_be_bytes());
        let out = decoder().decode(&RawBuffer::now(buf), None);
        assert!(out.messages.is_empty());
        assert_eq!(out.delta.passcom.corrupted_length, 1);
        assert_eq!(out.delta.parse_errors, 1);
    }

    #[test]
    fn test_split_report_joined_when_not_strict() {
        let wire = klm_report();
        let mut dec = lenient();

        let first = dec.decode(&RawBuffer::now(&wire[..8]), None);
        assert!(first.messages.is_empty());
        assert_eq!(first.delta.gdl90.truncated, 0);

        let second = dec.decode(&RawBuffer::now(&wire[8..]), None);
        assert_eq!(second.messages.len(), 1);
        assert_eq!(second.messages[0].callsign(), Some("KLM1023_"));
    }

    #[test]
    fn test_split_report_dropped_when_strict() {
        let wire = klm_report();
        let mut dec = decoder();

        let first = dec.decode(&RawBuffer::now(&wire[..8]), None);
        assert_eq!(first.delta.gdl90.truncated, 1);

        // Without a held prefix the tail is a headerless raw buffer.
        let second = dec.decode(&RawBuffer::now(&wire[8..]), None);
        assert!(second.messages.is_empty());
        assert_eq!(second.delta.routing.raw_messages_processed, 1);
    }

    #[test]
    fn test_statistics_consistent_over_stream() {
        let agg = Aggregator::new();
        let mut dec = decoder();
        let inputs = [
            KLM_ID,
            "8D40621D58C382D690C8AC2863A7",
            "8DA05F219B06B6AF189400CBC33F",
            "8D4840D6580B982C8BA874F80820",
            "8D4840D699133C1CF8E02102C60C",
            "8D4840",
        ];
        for hex in inputs {
            dec.ingest(&buffer(hex), None, &agg);
        }

        let snap = agg.snapshot();
        let c = snap.counters;
        assert_eq!(c.buffers_processed, 6);
        // Two CRC failures and one short buffer.
        assert_eq!(c.parse_errors, 3);
        assert_eq!(c.validation.crc_fail, 2);
        assert_eq!(c.validation.length_invalid, 1);
        assert_eq!(c.validation.frames_validated, 3);
        assert_eq!(c.messages_parsed, 3);
        assert_eq!(c.dispatch.positions_without_reference, 1);
        assert!((snap.success_rate - 50.0).abs() < 1e-9);
        assert_eq!(snap.aircraft_tracked, 3);

        let klm = agg.aircraft(&icao_from_hex("4840d6").unwrap()).unwrap();
        assert_eq!(klm.callsign(), Some("KLM1023_"));
        assert_eq!(klm.message_count, 1);
    }

    #[test]
    fn test_shared_aggregator_across_threads() {
        let agg = Arc::new(Aggregator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let agg = Arc::clone(&agg);
                thread::spawn(move || {
                    let mut dec = decoder();
                    for _ in 0..25 {
                        dec.ingest(&buffer(KLM_ID), None, &agg);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = agg.snapshot();
        assert_eq!(snap.counters.buffers_processed, 100);
        assert_eq!(snap.counters.messages_parsed, 100);
        assert_eq!(snap.counters.dispatch.identifications_decoded, 100);
        assert_eq!(snap.aircraft_tracked, 1);
        let klm = agg.all_aircraft().remove(0);
        assert_eq!(klm.message_count, 100);
    }

    #[test]
    fn test_reports_after_heartbeat_all_decoded() {
        let mut wire = gdl90::encode_frame(0x00, 0x81, &[0x41, 0x02, 0x03, 0x04, 0x05]);
        for _ in 0..9 {
            wire.extend_from_slice(&klm_report()[1..]);
        }
        let out = decoder().decode(&RawBuffer::now(wire), None);
        assert_eq!(out.delta.routing.gdl90_messages_processed, 1);
        assert_eq!(out.delta.gdl90.other_messages, 1);
        assert_eq!(out.delta.gdl90.adsb_found, 9);
        assert_eq!(out.messages.len(), 9);
        assert_eq!(out.delta.validation.df_rejected, 0);
    }

    #[test]
    fn test_raw_frames_after_held_partial_are_decoded() {
        let mut dec = lenient();
        dec.decode(&RawBuffer::now(&klm_report()[..8]), None);

        let mut truncated = 0;
        let mut decoded = 0;
        for _ in 0..10 {
            let out = dec.decode(&buffer(KLM_ID), None);
            truncated += out.delta.gdl90.truncated;
            decoded += out.messages.len();
            assert_eq!(out.delta.routing.raw_messages_processed, 1);
        }
        assert_eq!(decoded, 10);
        // The held partial is dropped once, when the first raw frame arrives.
        assert_eq!(truncated, 1);
    }

    #[test]
    fn test_passcom_between_split_halves_drops_partial() {
        let wire = klm_report();
        let mut dec = lenient();
        dec.decode(&RawBuffer::now(&wire[..8]), None);

        let out = dec.decode(
            &RawBuffer::now(passcom_record(&hex_decode(KLM_ID).unwrap())),
            None,
        );
        assert_eq!(out.messages.len(), 1);
        assert_eq!(out.delta.gdl90.truncated, 1);

        // The second half no longer has a prefix to join.
        let out = dec.decode(&RawBuffer::now(&wire[8..]), None);
        assert!(out.messages.is_empty());
        assert_eq!(out.delta.routing.gdl90_messages_processed, 0);
    }
}
