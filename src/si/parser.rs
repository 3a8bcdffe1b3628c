use super::types::*;
use crate::error::{DvbError, Result};

/// Decoders for MPEG-2 PSI and DVB SI sections (PAT, PMT, present/following EIT).
///
/// Every method is a pure function of its input slice: it never mutates the
/// slice and never retains a reference to it past the call. `table_id` is
/// expected at offset 0, as delivered by a demux section-filter callback.
#[derive(Debug, Default)]
pub struct SectionDecoders {}

impl SectionDecoders {
    /// Creates a new decoder. Stateless; exists to mirror the shape of a
    /// stateful parser and to give call sites a stable handle to hang
    /// `log` context on.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a Program Association Table section.
    pub fn parse_pat(&self, buffer: &[u8]) -> Result<PatTable> {
        if buffer.len() < 8 {
            return Err(DvbError::Parse("PAT section shorter than header".into()));
        }
        if buffer[0] != TABLE_ID_PAT {
            return Err(DvbError::Parse(format!(
                "not a PAT section: table_id=0x{:02x}",
                buffer[0]
            )));
        }

        let header = PatHeader {
            table_id: buffer[0],
            section_syntax_indicator: (buffer[1] & 0x80) != 0,
            section_length: (((buffer[1] as u16) << 8) | buffer[2] as u16) & 0x0FFF,
            transport_stream_id: ((buffer[3] as u16) << 8) | buffer[4] as u16,
            version_number: (buffer[5] >> 1) & 0x1F,
            current_next_indicator: (buffer[5] & 0x01) != 0,
            section_number: buffer[6],
            last_section_number: buffer[7],
        };

        let mut services = Vec::new();
        let mut pos = 8usize;
        let mut parsed_length: u32 = 9; // header size (12) - 3 bytes not counted in section_length

        while (parsed_length as u16) < header.section_length {
            if services.len() >= MAX_PAT_SERVICES {
                log::error!("PAT capacity exceeded (limit {})", MAX_PAT_SERVICES);
                return Err(DvbError::CapacityExceeded {
                    table: "PAT",
                    limit: MAX_PAT_SERVICES,
                });
            }
            if pos + 4 > buffer.len() {
                return Err(DvbError::Parse("PAT service entry truncated".into()));
            }

            let program_number = ((buffer[pos] as u16) << 8) | buffer[pos + 1] as u16;
            let pid = (((buffer[pos + 2] as u16) << 8) | buffer[pos + 3] as u16) & 0x1FFF;
            services.push(PatServiceInfo { program_number, pid });

            pos += 4;
            parsed_length += 4;
        }

        log::debug!(
            "parsed PAT: tsid={} services={}",
            header.transport_stream_id,
            services.len()
        );
        Ok(PatTable { header, services })
    }

    /// Decodes a Program Map Table section.
    pub fn parse_pmt(&self, buffer: &[u8]) -> Result<PmtTable> {
        if buffer.len() < 12 {
            return Err(DvbError::Parse("PMT section shorter than header".into()));
        }
        if buffer[0] != TABLE_ID_PMT {
            return Err(DvbError::Parse(format!(
                "not a PMT section: table_id=0x{:02x}",
                buffer[0]
            )));
        }

        let program_info_length =
            (((buffer[10] as u16) << 8) | buffer[11] as u16) & 0x0FFF;

        let header = PmtHeader {
            table_id: buffer[0],
            section_syntax_indicator: (buffer[1] & 0x80) != 0,
            section_length: (((buffer[1] as u16) << 8) | buffer[2] as u16) & 0x0FFF,
            program_number: ((buffer[3] as u16) << 8) | buffer[4] as u16,
            version_number: (buffer[5] >> 1) & 0x1F,
            current_next_indicator: (buffer[5] & 0x01) != 0,
            section_number: buffer[6],
            last_section_number: buffer[7],
            pcr_pid: (((buffer[8] as u16) << 8) | buffer[9] as u16) & 0x1FFF,
            program_info_length,
        };

        let mut pos = 12usize + program_info_length as usize;
        // Running total is seeded past the header and CRC so the loop stops
        // before the CRC rather than trying to parse it as another element.
        let mut parsed_length: u32 = 12 + program_info_length as u32 + 4 - 3;

        let mut elements = Vec::new();
        while (parsed_length as u16) < header.section_length {
            if elements.len() >= MAX_PMT_ELEMENTS {
                log::error!("PMT capacity exceeded (limit {})", MAX_PMT_ELEMENTS);
                return Err(DvbError::CapacityExceeded {
                    table: "PMT",
                    limit: MAX_PMT_ELEMENTS,
                });
            }
            if pos + 5 > buffer.len() {
                return Err(DvbError::Parse("PMT elementary entry truncated".into()));
            }

            let stream_type = buffer[pos];
            let elementary_pid = (((buffer[pos + 1] as u16) << 8) | buffer[pos + 2] as u16) & 0x1FFF;
            let es_info_length =
                (((buffer[pos + 3] as u16) << 8) | buffer[pos + 4] as u16) & 0x0FFF;

            let desc_start = pos + 5;
            let desc_end = desc_start + es_info_length as usize;
            if desc_end > buffer.len() {
                return Err(DvbError::Parse("PMT ES-info loop truncated".into()));
            }
            let has_teletext = scan_for_tag(&buffer[desc_start..desc_end], DESCRIPTOR_TAG_TELETEXT);

            elements.push(PmtElementaryInfo {
                stream_type,
                elementary_pid,
                es_info_length,
                has_teletext,
            });

            let advance = 5 + es_info_length as u32;
            pos += advance as usize;
            parsed_length += advance;
        }

        log::debug!(
            "parsed PMT: program={} elements={}",
            header.program_number,
            elements.len()
        );
        Ok(PmtTable { header, elements })
    }

    /// Decodes a present/following EIT section for the actual transport stream.
    pub fn parse_eit(&self, buffer: &[u8]) -> Result<EitTable> {
        if buffer.len() < 14 {
            return Err(DvbError::Parse("EIT section shorter than header".into()));
        }
        if buffer[0] != TABLE_ID_EIT_PF_ACTUAL {
            return Err(DvbError::Parse(format!(
                "not a present/following actual-TS EIT section: table_id=0x{:02x}",
                buffer[0]
            )));
        }

        let header = EitHeader {
            table_id: buffer[0],
            section_syntax_indicator: (buffer[1] & 0x80) != 0,
            section_length: (((buffer[1] as u16) << 8) | buffer[2] as u16) & 0x0FFF,
            service_id: ((buffer[3] as u16) << 8) | buffer[4] as u16,
            version_number: (buffer[5] >> 1) & 0x1F,
            current_next_indicator: (buffer[5] & 0x01) != 0,
            section_number: buffer[6],
            last_section_number: buffer[7],
            transport_stream_id: ((buffer[8] as u16) << 8) | buffer[9] as u16,
            original_network_id: ((buffer[10] as u16) << 8) | buffer[11] as u16,
            segment_last_section_number: buffer[12],
            last_table_id: buffer[13],
        };

        let mut events = Vec::new();
        let mut pos = 14usize;
        let mut parsed_length: u32 = 14;
        let section_limit = header.section_length.saturating_sub(1);

        while (parsed_length as u16) < section_limit {
            if events.len() >= MAX_EIT_EVENTS {
                log::error!("EIT capacity exceeded (limit {})", MAX_EIT_EVENTS);
                return Err(DvbError::CapacityExceeded {
                    table: "EIT",
                    limit: MAX_EIT_EVENTS,
                });
            }
            if pos + 12 > buffer.len() {
                return Err(DvbError::Parse("EIT event prefix truncated".into()));
            }

            let event_id = ((buffer[pos] as u16) << 8) | buffer[pos + 1] as u16;
            let mut start_time = [0u8; 5];
            start_time.copy_from_slice(&buffer[pos + 2..pos + 7]);
            let mut duration = [0u8; 3];
            duration.copy_from_slice(&buffer[pos + 7..pos + 10]);
            let running_status = (buffer[pos + 10] >> 5) & 0x07;
            let free_ca_mode = (buffer[pos + 10] & 0x10) != 0;
            let descriptors_loop_length =
                (((buffer[pos + 10] as u16) << 8) | buffer[pos + 11] as u16) & 0x0FFF;

            let desc_start = pos + 12;
            let desc_end = desc_start + descriptors_loop_length as usize;
            if desc_end > buffer.len() {
                return Err(DvbError::Parse("EIT descriptor loop truncated".into()));
            }

            let (short_event_descriptor, has_genre) =
                scan_eit_descriptors(&buffer[desc_start..desc_end]);

            events.push(EitEventInfo {
                event_id,
                start_time,
                duration,
                running_status,
                free_ca_mode,
                descriptors_loop_length,
                short_event_descriptor,
                has_genre,
            });

            let advance = 12 + descriptors_loop_length as u32;
            pos += advance as usize;
            parsed_length += advance;
        }

        log::debug!(
            "parsed EIT: service={} events={}",
            header.service_id,
            events.len()
        );
        Ok(EitTable { header, events })
    }
}

/// Scans a TLV descriptor loop for the presence of a given tag.
fn scan_for_tag(loop_bytes: &[u8], wanted_tag: u8) -> bool {
    let mut pos = 0;
    while pos + 2 <= loop_bytes.len() {
        let tag = loop_bytes[pos];
        let len = loop_bytes[pos + 1] as usize;
        if tag == wanted_tag {
            return true;
        }
        pos += 2 + len;
    }
    false
}

/// Scans an EIT event's descriptor loop for a short-event descriptor and
/// records whether a content (genre) descriptor was present. Unrecognized
/// descriptors are skipped by their length byte; a malformed trailing
/// descriptor never aborts the section.
fn scan_eit_descriptors(loop_bytes: &[u8]) -> (Option<ShortEventDescriptor>, bool) {
    let mut pos = 0;
    let mut short_event = None;
    let mut has_genre = false;

    while pos + 2 <= loop_bytes.len() {
        let tag = loop_bytes[pos];
        let len = loop_bytes[pos + 1] as usize;
        if pos + 2 + len > loop_bytes.len() {
            break;
        }
        let body = &loop_bytes[pos + 2..pos + 2 + len];

        match tag {
            DESCRIPTOR_TAG_SHORT_EVENT if body.len() >= 4 => {
                let iso_639_language_code = ((body[0] as u32) << 16)
                    | ((body[1] as u32) << 8)
                    | body[2] as u32;
                let event_name_length = body[3] as usize;
                let name_end = (4 + event_name_length).min(body.len());
                let event_name = String::from_utf8_lossy(&body[4..name_end]).into_owned();
                short_event = Some(ShortEventDescriptor {
                    descriptor_tag: tag,
                    descriptor_length: len as u8,
                    iso_639_language_code,
                    event_name_length: event_name_length as u8,
                    event_name,
                });
            }
            DESCRIPTOR_TAG_CONTENT => {
                has_genre = true;
            }
            _ => {}
        }

        pos += 2 + len;
    }

    (short_event, has_genre)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat_bytes() -> Vec<u8> {
        vec![
            0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x00, 0xE0, 0x10, 0x00, 0x01,
            0xE1, 0x00, 0, 0, 0, 0,
        ]
    }

    #[test]
    fn parses_pat_section_with_two_services() {
        let decoder = SectionDecoders::new();
        let pat = decoder.parse_pat(&pat_bytes()).unwrap();

        assert_eq!(pat.header.section_length, 13);
        assert_eq!(pat.header.transport_stream_id, 1);
        assert_eq!(pat.service_count(), 2);
        assert_eq!(
            pat.services[0],
            PatServiceInfo { program_number: 0, pid: 0x0010 }
        );
        assert_eq!(
            pat.services[1],
            PatServiceInfo { program_number: 1, pid: 0x0100 }
        );
        assert_eq!(pat.channel_count(), 1);
    }

    #[test]
    fn rejects_wrong_table_id() {
        let decoder = SectionDecoders::new();
        let mut bytes = pat_bytes();
        bytes[0] = 0x02;
        assert!(decoder.parse_pat(&bytes).is_err());
    }

    #[test]
    fn pat_capacity_exceeded_is_a_fatal_parse_error() {
        let decoder = SectionDecoders::new();
        let mut bytes = vec![0x00, 0x00, 0x00, 0x00, 0x01, 0xC1, 0x00, 0x00];
        let n: usize = MAX_PAT_SERVICES + 1;
        for i in 0..n {
            bytes.push(0x00);
            bytes.push(i as u8);
            bytes.push(0xE0);
            bytes.push(0x10);
        }
        let section_length = (n * 4 + 5) as u16;
        bytes[1] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
        bytes[2] = section_length as u8;

        let err = decoder.parse_pat(&bytes).unwrap_err();
        assert!(matches!(
            err,
            DvbError::CapacityExceeded { table: "PAT", .. }
        ));
    }

    fn pmt_with_teletext_bytes() -> Vec<u8> {
        let mut bytes = vec![
            0x02, 0x00, 0x00, // table_id, section_length placeholder (fixed below)
            0x00, 0x01, // program_number
            0xC1, // version/current_next
            0x00, 0x00, // section/last_section
            0xE1, 0x00, // pcr_pid
            0xF0, 0x00, // program_info_length = 0
            0x02, 0xE2, 0x00, 0xF0, 0x02, // stream_type, pid=0x0200, es_info_length=2
            0x56, 0x00, // teletext descriptor, tag + length(0)
            0, 0, 0, 0, // crc
        ];
        let real_length = (bytes.len() - 3) as u16;
        bytes[1] = 0xB0 | ((real_length >> 8) as u8 & 0x0F);
        bytes[2] = real_length as u8;
        bytes
    }

    #[test]
    fn parses_pmt_with_teletext_and_classifies_video() {
        let decoder = SectionDecoders::new();
        let pmt = decoder.parse_pmt(&pmt_with_teletext_bytes()).unwrap();

        assert_eq!(pmt.element_count(), 1);
        let element = &pmt.elements[0];
        assert!(element.has_teletext);
        assert_eq!(classify_stream_type(element.stream_type), StreamClass::Video);
        assert_eq!(element.elementary_pid, 0x0200);
    }

    fn eit_bytes_for_service(service_id: u16, running_status: u8, name: &str) -> Vec<u8> {
        let name_bytes = name.as_bytes();
        let short_event_len = 4 + name_bytes.len();
        let descriptors_loop_length = 2 + short_event_len;
        let mut bytes = vec![
            0x4E, 0x00, 0x00, // table_id, section_length placeholder
            (service_id >> 8) as u8,
            service_id as u8,
            0xC1,
            0x00,
            0x00,
            0x00,
            0x01, // transport_stream_id
            0x00,
            0x01, // original_network_id
            0x00, // segment_last_section_number
            0x4E, // last_table_id
        ];

        // event prefix
        bytes.extend_from_slice(&[0x00, 0x01]); // event_id
        bytes.extend_from_slice(&[0x00; 5]); // start_time
        bytes.extend_from_slice(&[0x00; 3]); // duration
        let byte10 = (running_status << 5) | ((descriptors_loop_length as u16 >> 8) as u8 & 0x0F);
        bytes.push(byte10);
        bytes.push(descriptors_loop_length as u8);

        // short event descriptor
        bytes.push(0x4D);
        bytes.push(short_event_len as u8);
        bytes.extend_from_slice(&[b'e', b'n', b'g']); // language
        bytes.push(name_bytes.len() as u8);
        bytes.extend_from_slice(name_bytes);

        bytes.extend_from_slice(&[0, 0, 0, 0]); // crc

        let real_length = (bytes.len() - 3) as u16;
        bytes[1] = 0xB0 | ((real_length >> 8) as u8 & 0x0F);
        bytes[2] = real_length as u8;
        bytes
    }

    #[test]
    fn parses_eit_event_name_for_running_event() {
        let decoder = SectionDecoders::new();
        let bytes = eit_bytes_for_service(7, 4, "News");
        let eit = decoder.parse_eit(&bytes).unwrap();

        assert_eq!(eit.header.service_id, 7);
        assert_eq!(eit.event_count(), 1);
        let event = &eit.events[0];
        assert_eq!(event.running_status, 4);
        assert_eq!(
            event.short_event_descriptor.as_ref().unwrap().event_name,
            "News"
        );
    }

    #[quickcheck_macros::quickcheck]
    fn pat_parsing_never_panics_on_arbitrary_bytes(bytes: Vec<u8>) -> bool {
        let decoder = SectionDecoders::new();
        // A pure function of its input: must return, never panic, and
        // a second call on the same bytes must agree with the first.
        let first = decoder.parse_pat(&bytes);
        let second = decoder.parse_pat(&bytes);
        match (first, second) {
            (Ok(a), Ok(b)) => a.services == b.services,
            (Err(_), Err(_)) => true,
            _ => false,
        }
    }

    #[quickcheck_macros::quickcheck]
    fn pat_capacity_overflow_is_always_rejected(extra_services: u8) -> bool {
        let n = MAX_PAT_SERVICES + 1 + (extra_services % 10) as usize;
        let mut bytes = vec![0x00, 0x00, 0x00, 0x00, 0x01, 0xC1, 0x00, 0x00];
        for i in 0..n {
            bytes.push(0x00);
            bytes.push(i as u8);
            bytes.push(0xE0);
            bytes.push(0x10);
        }
        let section_length = (n * 4 + 5) as u16;
        bytes[1] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
        bytes[2] = section_length as u8;

        let decoder = SectionDecoders::new();
        matches!(
            decoder.parse_pat(&bytes),
            Err(DvbError::CapacityExceeded { table: "PAT", .. })
        )
    }
}
