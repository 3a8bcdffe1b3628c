//! Typed records for the PSI/SI tables this crate decodes: PAT, PMT, and
//! the present/following EIT for the actual transport stream.

/// PID carrying the Program Association Table
pub const PID_PAT: u16 = 0x0000;
/// PID the present/following EIT for the actual transport stream is broadcast on
pub const PID_EIT_PF_ACTUAL: u16 = 0x0012;

/// Table ID for the Program Association Table
pub const TABLE_ID_PAT: u8 = 0x00;
/// Table ID for the Program Map Table
pub const TABLE_ID_PMT: u8 = 0x02;
/// Table ID for the present/following EIT, actual transport stream
pub const TABLE_ID_EIT_PF_ACTUAL: u8 = 0x4E;

/// Teletext descriptor tag, signals embedded teletext in a PMT ES-info loop
pub const DESCRIPTOR_TAG_TELETEXT: u8 = 0x56;
/// Short event descriptor tag, carries the human-readable event name
pub const DESCRIPTOR_TAG_SHORT_EVENT: u8 = 0x4D;
/// Content descriptor tag, carries the (undecoded) genre nibble
pub const DESCRIPTOR_TAG_CONTENT: u8 = 0x54;

/// DVB "currently running" running_status value
pub const RUNNING_STATUS_RUNNING: u8 = 4;

/// Bounded capacity of [`PatTable::services`]
pub const MAX_PAT_SERVICES: usize = 20;
/// Bounded capacity of [`PmtTable::elements`]
pub const MAX_PMT_ELEMENTS: usize = 20;
/// Bounded capacity of [`EitTable::events`]
pub const MAX_EIT_EVENTS: usize = 20;

/// Video elementary stream types recognized by channel acquisition
pub const VIDEO_STREAM_TYPES: [u8; 3] = [0x01, 0x02, 0x1B];
/// Audio elementary stream types recognized by channel acquisition
pub const AUDIO_STREAM_TYPES: [u8; 2] = [0x03, 0x04];

/// Program Association Table header fields, byte-exact per ISO/IEC 13818-1.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatHeader {
    /// Always `0x00` for a well-formed PAT
    pub table_id: u8,
    /// Whether the section follows the extended syntax (always true for PAT)
    pub section_syntax_indicator: bool,
    /// Length in bytes of the section following this field
    pub section_length: u16,
    /// Identifies the transport stream this PAT describes
    pub transport_stream_id: u16,
    /// Version of this PAT; increments when the table's content changes
    pub version_number: u8,
    /// Whether this section is the one currently applicable
    pub current_next_indicator: bool,
    /// This section's number, for tables split across sections
    pub section_number: u8,
    /// The last valid section number for this table
    pub last_section_number: u8,
}

/// One PAT service entry: a program number mapped to a PID.
///
/// By convention the entry with `program_number == 0` names the NIT pid
/// and is skipped by channel iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatServiceInfo {
    /// Program number; `0` denotes the NIT entry
    pub program_number: u16,
    /// PID of this program's PMT (or of the NIT, for the `0` entry)
    pub pid: u16,
}

/// Program Association Table: a bounded list of service entries.
#[derive(Debug, Clone, Default)]
pub struct PatTable {
    /// Section header
    pub header: PatHeader,
    /// Parsed service entries, in section order
    pub services: Vec<PatServiceInfo>,
}

impl PatTable {
    /// Number of service entries actually parsed from the section.
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Number of navigable channels: every service entry except the
    /// leading NIT entry.
    pub fn channel_count(&self) -> u8 {
        self.service_count().saturating_sub(1) as u8
    }
}

/// Program Map Table header fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct PmtHeader {
    /// Always `0x02` for a well-formed PMT
    pub table_id: u8,
    /// Whether the section follows the extended syntax (always true for PMT)
    pub section_syntax_indicator: bool,
    /// Length in bytes of the section following this field
    pub section_length: u16,
    /// The program this PMT describes
    pub program_number: u16,
    /// Version of this PMT; increments when the table's content changes
    pub version_number: u8,
    /// Whether this section is the one currently applicable
    pub current_next_indicator: bool,
    /// This section's number, for tables split across sections
    pub section_number: u8,
    /// The last valid section number for this table
    pub last_section_number: u8,
    /// PID carrying the Program Clock Reference for this program
    pub pcr_pid: u16,
    /// Length in bytes of the program-level descriptor loop
    pub program_info_length: u16,
}

/// One PMT elementary stream entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PmtElementaryInfo {
    /// Stream type byte (classifies video/audio/other, see [`classify_stream_type`])
    pub stream_type: u8,
    /// PID carrying this elementary stream
    pub elementary_pid: u16,
    /// Length in bytes of this stream's ES-info descriptor loop
    pub es_info_length: u16,
    /// Whether a teletext descriptor (tag `0x56`) was found in the ES-info loop
    pub has_teletext: bool,
}

/// Program Map Table: a bounded list of elementary stream entries.
#[derive(Debug, Clone, Default)]
pub struct PmtTable {
    /// Section header
    pub header: PmtHeader,
    /// Parsed elementary stream entries, in section order
    pub elements: Vec<PmtElementaryInfo>,
}

impl PmtTable {
    /// Number of elementary stream entries actually parsed from the section.
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }
}

/// Event Information Table header fields (present/following, actual TS).
#[derive(Debug, Clone, Copy, Default)]
pub struct EitHeader {
    /// Always `0x4E` for present/following, actual TS
    pub table_id: u8,
    /// Whether the section follows the extended syntax (always true for EIT)
    pub section_syntax_indicator: bool,
    /// Length in bytes of the section following this field
    pub section_length: u16,
    /// The service (channel) this EIT section describes
    pub service_id: u16,
    /// Version of this EIT section; increments when content changes
    pub version_number: u8,
    /// Whether this section is the one currently applicable
    pub current_next_indicator: bool,
    /// This section's number, for tables split across sections
    pub section_number: u8,
    /// The last valid section number for this table
    pub last_section_number: u8,
    /// Transport stream carrying the described service
    pub transport_stream_id: u16,
    /// Network originating the described service
    pub original_network_id: u16,
    /// Last section number within this segment
    pub segment_last_section_number: u8,
    /// table_id of the last table in this segment
    pub last_table_id: u8,
}

/// Decoded short event descriptor (tag `0x4D`): the human-readable event name.
#[derive(Debug, Clone, Default)]
pub struct ShortEventDescriptor {
    /// Always `0x4D`
    pub descriptor_tag: u8,
    /// Length in bytes of the descriptor body following this field
    pub descriptor_length: u8,
    /// ISO 639 language code, packed into the low 24 bits
    pub iso_639_language_code: u32,
    /// Length in bytes of `event_name`
    pub event_name_length: u8,
    /// Event name, decoded as UTF-8-ish bytes (lossy on invalid sequences)
    pub event_name: String,
}

/// One EIT event entry.
#[derive(Debug, Clone, Default)]
pub struct EitEventInfo {
    /// Identifies this event within the service
    pub event_id: u16,
    /// MJD date + BCD time-of-day, 5 bytes, big-endian as broadcast
    pub start_time: [u8; 5],
    /// BCD-encoded duration (hours, minutes, seconds), 3 bytes
    pub duration: [u8; 3],
    /// DVB running status (0–7); `4` means "currently running"
    pub running_status: u8,
    /// Whether the event is scrambled under a CA system
    pub free_ca_mode: bool,
    /// Length in bytes of the descriptor loop following this event's fixed prefix
    pub descriptors_loop_length: u16,
    /// Decoded short-event descriptor, if one was present in the loop
    pub short_event_descriptor: Option<ShortEventDescriptor>,
    /// Whether a content descriptor (tag `0x54`, genre) was present in the loop
    pub has_genre: bool,
}

/// Event Information Table: a bounded list of event entries for one service.
#[derive(Debug, Clone, Default)]
pub struct EitTable {
    /// Section header
    pub header: EitHeader,
    /// Parsed event entries, in section order (index 0 is "now" for p/f EIT)
    pub events: Vec<EitEventInfo>,
}

impl EitTable {
    /// Number of event entries actually parsed from the section.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

/// Classifies a PMT elementary stream type as video, audio, or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamClass {
    /// One of [`VIDEO_STREAM_TYPES`]
    Video,
    /// One of [`AUDIO_STREAM_TYPES`]
    Audio,
    /// Any other stream type (subtitles, data, reserved, ...)
    Other,
}

/// Classifies a PMT `stream_type` byte as video, audio, or neither.
pub fn classify_stream_type(stream_type: u8) -> StreamClass {
    if VIDEO_STREAM_TYPES.contains(&stream_type) {
        StreamClass::Video
    } else if AUDIO_STREAM_TYPES.contains(&stream_type) {
        StreamClass::Audio
    } else {
        StreamClass::Other
    }
}

impl EitEventInfo {
    /// Decodes `start_time` (16-bit MJD date + 3-byte BCD time) into a UTC
    /// timestamp. Returns `None` for the broadcast's "unspecified" sentinel
    /// (all bits set).
    pub fn start_time_utc(&self) -> Option<chrono::NaiveDateTime> {
        if self.start_time.iter().all(|&b| b == 0xFF) {
            return None;
        }
        let mjd = ((self.start_time[0] as u32) << 8) | self.start_time[1] as u32;
        let (year, month, day) = mjd_to_gregorian(mjd);
        let (hh, mm, ss) = decode_bcd_hms(&self.start_time[2..5])?;
        chrono::NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hh as u32, mm as u32, ss as u32)
    }

    /// Decodes `duration` (3-byte BCD hours/minutes/seconds) into a second
    /// count. Returns `None` for the "unspecified" sentinel.
    pub fn duration_seconds(&self) -> Option<u32> {
        let (h, m, s) = decode_bcd_hms(&self.duration)?;
        Some(h as u32 * 3600 + m as u32 * 60 + s as u32)
    }
}

/// Decodes a 3-byte BCD hours/minutes/seconds field, per ETSI EN 300 468.
fn decode_bcd_hms(bytes: &[u8]) -> Option<(u8, u8, u8)> {
    if bytes[0] == 0xFF && bytes[1] == 0xFF && bytes[2] == 0xFF {
        return None;
    }
    let h = (bytes[0] >> 4) * 10 + (bytes[0] & 0xF);
    let m = (bytes[1] >> 4) * 10 + (bytes[1] & 0xF);
    let s = (bytes[2] >> 4) * 10 + (bytes[2] & 0xF);
    Some((h, m, s))
}

/// Converts a 16-bit Modified Julian Date to a Gregorian (year, month, day),
/// per the algorithm in ETSI EN 300 468 annex C.
fn mjd_to_gregorian(mjd: u32) -> (i32, u32, u32) {
    let jd = mjd as u64 + 2_400_001;
    let (y, j, m, n, r, p, v, u, s, w, b, c) =
        (4716u64, 1401u64, 2u64, 12u64, 4u64, 1461u64, 3u64, 5u64, 153u64, 2u64, 274_277u64, 38u64);

    let f = jd + j + (4 * jd + b) / 146_097 * 3 / 4 - c;
    let e = r * f + v;
    let g = (e % p) / r;
    let h = u * g + w;
    let day = (h % s) / u + 1;
    let month = (h / s + m) % n + 1;
    let year = (e / p) as i64 - y as i64 + ((n + m - month) / n) as i64;

    (year as i32, month as u32, day as u32)
}

#[cfg(test)]
mod date_tests {
    use super::*;

    #[test]
    fn decodes_a_known_mjd_and_bcd_time() {
        // MJD 40587 is 1970-01-01 (the Unix epoch date).
        let event = EitEventInfo {
            start_time: [0x9E, 0x8B, 0x20, 0x15, 0x30],
            ..Default::default()
        };
        let decoded = event.start_time_utc().unwrap();
        assert_eq!(decoded.to_string(), "1970-01-01 20:15:30");
    }

    #[test]
    fn unspecified_start_time_decodes_to_none() {
        let event = EitEventInfo {
            start_time: [0xFF; 5],
            ..Default::default()
        };
        assert!(event.start_time_utc().is_none());
    }

    #[test]
    fn decodes_duration_into_seconds() {
        let event = EitEventInfo {
            duration: [0x01, 0x30, 0x00],
            ..Default::default()
        };
        assert_eq!(event.duration_seconds(), Some(3600 + 30 * 60));
    }
}
