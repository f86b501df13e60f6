//! Shared fixture builders for the integration tests
//!
//! Builds complete downloads block by block, with every field encoded the way
//! a tachograph writes it, so that a file assembled from these helpers decodes
//! without a single issue.

#![allow(dead_code)]

use ddd_decoder::dispatcher::encode_block;

/// 2024-03-05 00:00:00 UTC
pub const DAY_SECONDS: u32 = 1_709_596_800;
/// 2024-03-05 06:00:00 UTC
pub const SESSION_SECONDS: u32 = DAY_SECONDS + 6 * 3600;

pub const GEN1_SIGNATURE_LEN: usize = 128;
pub const GEN1_CERTIFICATE_LEN: usize = 194;
pub const GEN1_ACTIVITY_BUFFER: usize = 5544;
/// Record counts declared by `gen2_application_identification`
pub const GEN2_GNSS_RECORDS: usize = 252;
pub const GEN2_VEHICLE_UNIT_RECORDS: usize = 200;

/// One framed top-level block
pub fn block(tag: u16, payload: &[u8]) -> Vec<u8> {
    encode_block(tag, payload).unwrap()
}

pub fn padded(text: &str, len: usize) -> Vec<u8> {
    let mut out = text.as_bytes().to_vec();
    out.resize(len, 0x20);
    out
}

pub fn name(text: &str) -> Vec<u8> {
    let mut out = vec![0x01];
    out.extend(padded(text, 35));
    out
}

pub fn registration(nation: u8, number: &str) -> Vec<u8> {
    let mut out = vec![nation, 0x01];
    out.extend(padded(number, 13));
    out
}

pub fn card_number(card_type: u8, nation: u8, number: &str) -> Vec<u8> {
    let mut out = vec![card_type, nation];
    out.extend(padded(number, 16));
    out
}

/// Activity change word: slot bit 15, activity bits 11-12, minute bits 0-10
pub fn change(slot: u16, activity: u16, minute: u16) -> [u8; 2] {
    ((slot << 15) | (activity << 11) | minute).to_be_bytes()
}

/// Driver slot, card inserted: rest, driving from 06:00, work from 10:30, rest from 11:15
pub fn sample_changes() -> Vec<[u8; 2]> {
    vec![change(0, 0, 0), change(0, 3, 360), change(0, 2, 630), change(0, 0, 675)]
}

/// Gen2 record array: type, record size, count, then the records
pub fn record_array(record_type: u8, size: u16, records: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![record_type];
    out.extend(size.to_be_bytes());
    out.extend((records.len() as u16).to_be_bytes());
    for record in records {
        assert_eq!(record.len(), size as usize);
        out.extend(record);
    }
    out
}

/// A card file: data blocks, each followed by its signature block when signed
#[derive(Default)]
pub struct CardBuilder {
    bytes: Vec<u8>,
}

impl CardBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ef(mut self, tag: u16, payload: &[u8]) -> Self {
        self.bytes.extend(block(tag, payload));
        self
    }

    pub fn signed_ef(self, tag: u16, payload: &[u8]) -> Self {
        self.ef(tag, payload)
            .ef(0x8000 | tag, &[0xA5; GEN1_SIGNATURE_LEN])
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

pub fn gen1_application_identification() -> Vec<u8> {
    let mut out = vec![0x01, 0x00, 0x02, 0x0C, 0x0C];
    out.extend((GEN1_ACTIVITY_BUFFER as u16).to_be_bytes());
    out.extend(84u16.to_be_bytes());
    out.push(112);
    out
}

pub fn gen2_application_identification() -> Vec<u8> {
    let mut out = vec![0x01, 0x01, 0x00, 0x0C, 0x0C];
    out.extend(13_776u16.to_be_bytes());
    out.extend(200u16.to_be_bytes());
    out.extend(672u16.to_be_bytes());
    out.extend((GEN2_GNSS_RECORDS as u16).to_be_bytes());
    out.extend(56u16.to_be_bytes());
    out.extend((GEN2_VEHICLE_UNIT_RECORDS as u16).to_be_bytes());
    out
}

pub fn card_icc() -> Vec<u8> {
    let mut out = vec![0x00];
    out.extend(0x0012_3456u32.to_be_bytes());
    out.extend([0x03, 0x19, 0x01, 0x0A]);
    out.extend(padded("e1-0042", 8));
    out.push(0x01);
    out.extend([0x0A, 0x0B, 0x0C, 0x0D, 0x0E]);
    out.extend(0x0101u16.to_be_bytes());
    out
}

pub fn card_ic() -> Vec<u8> {
    let mut out = 0xCAFE_0001u32.to_be_bytes().to_vec();
    out.extend(0x0000_0002u32.to_be_bytes());
    out
}

pub fn card_identification() -> Vec<u8> {
    let mut out = vec![0x0D];
    out.extend(padded("DF00000123456701", 16));
    out.extend(name("Kraftfahrt-Bundesamt"));
    out.extend(1_600_000_000u32.to_be_bytes());
    out.extend(1_600_000_000u32.to_be_bytes());
    out.extend(1_757_000_000u32.to_be_bytes());
    out.extend(name("Mustermann"));
    out.extend(name("Erika"));
    out.extend([0x19, 0x80, 0x05, 0x12]);
    out.extend(padded("de", 2));
    out
}

pub fn driving_licence() -> Vec<u8> {
    let mut out = name("Stadt Koeln");
    out.push(0x0D);
    out.extend(padded("B072RRE2I55", 16));
    out
}

/// One daily record with the given change words
pub fn card_day_record(prev_len: u16, seconds: u32, words: &[[u8; 2]]) -> Vec<u8> {
    let len = (12 + words.len() * 2) as u16;
    let mut out = prev_len.to_be_bytes().to_vec();
    out.extend(len.to_be_bytes());
    out.extend(seconds.to_be_bytes());
    out.extend([0x00, 0x17]);
    out.extend(312u16.to_be_bytes());
    for word in words {
        out.extend(word);
    }
    out
}

/// Cyclic activity buffer holding one day at position 0
pub fn driver_activity(words: &[[u8; 2]]) -> Vec<u8> {
    let mut out = 0u16.to_be_bytes().to_vec();
    out.extend(0u16.to_be_bytes());
    let mut buffer = card_day_record(0, DAY_SECONDS, words);
    buffer.resize(GEN1_ACTIVITY_BUFFER, 0);
    out.extend(buffer);
    out
}

pub fn vehicles_used() -> Vec<u8> {
    let mut out = 0u16.to_be_bytes().to_vec();
    let mut record = Vec::new();
    record.extend([0x01, 0x86, 0xA0]);
    record.extend([0x01, 0x87, 0xD8]);
    record.extend(SESSION_SECONDS.to_be_bytes());
    record.extend((SESSION_SECONDS + 6 * 3600).to_be_bytes());
    record.extend(registration(0x0D, "K-AB 1234"));
    record.extend([0x00, 0x01]);
    out.extend(&record);
    out.extend(vec![0u8; 31 * 3]);
    out
}

pub fn places() -> Vec<u8> {
    let mut out = vec![0x00];
    out.extend(SESSION_SECONDS.to_be_bytes());
    out.extend([0x00, 0x0D, 0x00]);
    out.extend([0x01, 0x86, 0xA0]);
    out.extend(vec![0u8; 10 * 3]);
    out
}

pub fn current_usage() -> Vec<u8> {
    let mut out = SESSION_SECONDS.to_be_bytes().to_vec();
    out.extend(registration(0x0D, "K-AB 1234"));
    out
}

/// Unused slots only
pub fn empty_records(size: usize, count: usize) -> Vec<u8> {
    vec![0u8; size * count]
}

pub fn gen1_certificate() -> Vec<u8> {
    let mut out = vec![0x5A; 128];
    out.extend(vec![0x3C; 50]);
    out.extend([0, 0, 0, 0, 0, 1, 0, 1]);
    out.push(0x0D);
    out.extend(padded("D", 3));
    out.extend([0x01, 0xFF, 0xFF, 0x01]);
    out.resize(GEN1_CERTIFICATE_LEN, 0);
    out
}

/// A complete Gen1 driver card download with `words` as its only activity day
pub fn gen1_card_with(words: &[[u8; 2]]) -> Vec<u8> {
    CardBuilder::new()
        .ef(0x0002, &card_icc())
        .ef(0x0005, &card_ic())
        .signed_ef(0x0501, &gen1_application_identification())
        .signed_ef(0x0520, &card_identification())
        .signed_ef(0x0521, &driving_licence())
        .signed_ef(0x0502, &empty_records(24, 12))
        .signed_ef(0x0503, &empty_records(24, 12))
        .signed_ef(0x0504, &driver_activity(words))
        .signed_ef(0x0505, &vehicles_used())
        .signed_ef(0x0506, &places())
        .signed_ef(0x0507, &current_usage())
        .signed_ef(0x0508, &empty_records(46, 1))
        .signed_ef(0x050E, &empty_records(4, 1))
        .signed_ef(0x0522, &empty_records(5, 56))
        .ef(0xC100, &gen1_certificate())
        .ef(0xC108, &gen1_certificate())
        .build()
}

pub fn gen1_card() -> Vec<u8> {
    gen1_card_with(&sample_changes())
}

/// Gen1 VU overview (TREP 01) with no company locks or controls
pub fn gen1_vu_overview() -> Vec<u8> {
    let mut out = gen1_certificate();
    out.extend(gen1_certificate());
    out.extend(padded("WDB9634031L123456", 17));
    out.extend(registration(0x0D, "K-AB 1234"));
    out.extend((DAY_SECONDS + 86_400).to_be_bytes());
    out.extend(DAY_SECONDS.to_be_bytes());
    out.extend((DAY_SECONDS + 86_399).to_be_bytes());
    out.push(0x01);
    out.extend(0u32.to_be_bytes());
    out.extend(vec![0u8; 18]);
    out.extend(vec![0u8; 36]);
    out.push(0);
    out.push(0);
    out.extend([0xB7; GEN1_SIGNATURE_LEN]);
    out
}

/// Gen1 VU activities of one day (TREP 02)
pub fn gen1_vu_activities(seconds: u32, words: &[[u8; 2]]) -> Vec<u8> {
    let mut out = seconds.to_be_bytes().to_vec();
    out.extend([0x01, 0x86, 0xA0]);
    out.extend(0u16.to_be_bytes());
    out.extend((words.len() as u16).to_be_bytes());
    for word in words {
        out.extend(word);
    }
    out.push(0);
    out.extend(0u16.to_be_bytes());
    out.extend([0xB7; GEN1_SIGNATURE_LEN]);
    out
}

pub fn gen1_vu() -> Vec<u8> {
    let mut out = block(0x7600, &[0x00, 0x01]);
    out.extend(block(0x7601, &gen1_vu_overview()));
    out.extend(block(0x7602, &gen1_vu_activities(DAY_SECONDS, &sample_changes())));
    out
}

/// Gen2 VU activities of one day (TREP 22)
pub fn gen2_vu_activities(seconds: u32, words: &[[u8; 2]]) -> Vec<u8> {
    let mut out = record_array(0x06, 4, &[seconds.to_be_bytes().to_vec()]);
    out.extend(record_array(0x05, 3, &[vec![0x01, 0x86, 0xA0]]));
    let words: Vec<Vec<u8>> = words.iter().map(|w| w.to_vec()).collect();
    out.extend(record_array(0x01, 2, &words));
    out.extend(record_array(0x08, 64, &[vec![0x11; 64]]));
    out
}

pub fn gen2_vu_overview() -> Vec<u8> {
    let mut out = record_array(0x0A, 17, &[padded("WDB9634031L123456", 17)]);
    out.extend(record_array(0x24, 15, &[registration(0x0D, "K-AB 1234")]));
    out.extend(record_array(0x02, 1, &[vec![0x01]]));
    out.extend(record_array(0x08, 64, &[vec![0x11; 64]]));
    out
}

pub fn gen2_vu() -> Vec<u8> {
    let mut out = block(0x7600, &[0x01, 0x01]);
    out.extend(block(0x7621, &gen2_vu_overview()));
    out.extend(block(0x7622, &gen2_vu_activities(DAY_SECONDS, &sample_changes())));
    out
}

/// `±DDMM.M * 10` coordinate as a signed 24-bit field
pub fn coordinate(value: i32) -> [u8; 3] {
    let bytes = value.to_be_bytes();
    [bytes[1], bytes[2], bytes[3]]
}

/// `GNSSPlaceRecord`: time, accuracy, latitude, longitude
pub fn gnss_place(seconds: u32, latitude: i32, longitude: i32) -> Vec<u8> {
    let mut out = seconds.to_be_bytes().to_vec();
    out.push(3);
    out.extend(coordinate(latitude));
    out.extend(coordinate(longitude));
    out
}

/// Cyclic EF: newest-record pointer, the records, then unused slots up to `capacity`
pub fn cyclic_ef(records: &[Vec<u8>], size: usize, capacity: usize) -> Vec<u8> {
    let newest = records.len().saturating_sub(1) as u16;
    let mut out = newest.to_be_bytes().to_vec();
    for record in records {
        assert_eq!(record.len(), size);
        out.extend(record);
    }
    out.extend(empty_records(size, capacity - records.len()));
    out
}

pub fn gen2_vehicles_used() -> Vec<u8> {
    let mut record = Vec::new();
    record.extend([0x01, 0x86, 0xA0]);
    record.extend([0x01, 0x87, 0xD8]);
    record.extend(SESSION_SECONDS.to_be_bytes());
    record.extend((SESSION_SECONDS + 6 * 3600).to_be_bytes());
    record.extend(registration(0x0D, "K-AB 1234"));
    record.extend([0x00, 0x01]);
    record.extend(padded("WDB9634031L123456", 17));
    cyclic_ef(&[record], 48, 4)
}

pub fn gen2_places() -> Vec<u8> {
    let mut record = SESSION_SECONDS.to_be_bytes().to_vec();
    record.extend([0x00, 0x0D, 0x00]);
    record.extend([0x01, 0x86, 0xA0]);
    record.extend(gnss_place(SESSION_SECONDS, 50_562, 6_572));
    cyclic_ef(&[record], 21, 4)
}

/// EF VehicleUnits_Used: the card saw two vehicle units
pub fn vehicle_units_used() -> Vec<u8> {
    let unit = |seconds: u32, device: u8, version: &str| {
        let mut out = seconds.to_be_bytes().to_vec();
        out.extend([0x21, device]);
        out.extend(padded(version, 4));
        out
    };
    let records = vec![
        unit(SESSION_SECONDS, 0x03, "0412"),
        unit(SESSION_SECONDS + 4 * 3600, 0x04, "0500"),
    ];
    cyclic_ef(&records, 10, GEN2_VEHICLE_UNIT_RECORDS)
}

/// EF GNSS_Places: one position after three hours of driving
pub fn gnss_accumulated_driving() -> Vec<u8> {
    let time = SESSION_SECONDS + 3 * 3600;
    let mut record = time.to_be_bytes().to_vec();
    record.extend(gnss_place(time, 52_305, 13_240));
    record.extend([0x01, 0x87, 0x04]);
    cyclic_ef(&[record], 18, GEN2_GNSS_RECORDS)
}

/// EF Border_Crossings: Germany to Poland
pub fn border_crossings() -> Vec<u8> {
    let time = SESSION_SECONDS + 5 * 3600;
    let mut record = vec![0x0D, 0x28];
    record.extend(gnss_place(time, 52_200, 14_350));
    record.push(0x01);
    record.extend([0x01, 0x88, 0x00]);
    cyclic_ef(&[record], 17, 8)
}

fn tlv(tag: &[u8], value: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    match value.len() {
        len @ 0..=0x7F => out.push(len as u8),
        len => {
            out.push(0x81);
            out.push(len as u8);
        }
    }
    out.extend_from_slice(value);
    out
}

/// Gen2 ECC certificate on brainpoolP256r1
pub fn gen2_certificate() -> Vec<u8> {
    let oid = [0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x07];
    let mut key = tlv(&[0x06], &oid);
    key.extend(tlv(&[0x86], &[0x04; 65]));

    let mut body = tlv(&[0x5F, 0x29], &[0x00]);
    body.extend(tlv(&[0x42], &[0x0D, b'D', b' ', b' ', 0x05, 0xFF, 0xFF, 0x01]));
    body.extend(tlv(&[0x7F, 0x49], &key));
    body.extend(tlv(&[0x5F, 0x20], &[1, 2, 3, 4, 5, 6, 7, 8]));
    body.extend(tlv(&[0x5F, 0x25], &1_600_000_000u32.to_be_bytes()));
    body.extend(tlv(&[0x5F, 0x24], &1_900_000_000u32.to_be_bytes()));

    let mut inner = tlv(&[0x7F, 0x4E], &body);
    inner.extend(tlv(&[0x5F, 0x37], &[0x11; 64]));
    tlv(&[0x7F, 0x21], &inner)
}

/// A complete Gen2 driver card download, every Gen2-only EF filled
pub fn gen2_card() -> Vec<u8> {
    CardBuilder::new()
        .ef(0x0002, &card_icc())
        .ef(0x0005, &card_ic())
        .signed_ef(0x0501, &gen2_application_identification())
        .signed_ef(0x0520, &card_identification())
        .signed_ef(0x0521, &driving_licence())
        .signed_ef(0x0502, &empty_records(24, 12))
        .signed_ef(0x0503, &empty_records(24, 12))
        .signed_ef(0x0504, &driver_activity(&sample_changes()))
        .signed_ef(0x0505, &gen2_vehicles_used())
        .signed_ef(0x0506, &gen2_places())
        .signed_ef(0x0507, &current_usage())
        .signed_ef(0x0508, &empty_records(46, 1))
        .signed_ef(0x050E, &empty_records(4, 1))
        .signed_ef(0x0522, &cyclic_ef(&[], 5, 56))
        .signed_ef(0x0523, &vehicle_units_used())
        .signed_ef(0x0524, &gnss_accumulated_driving())
        .signed_ef(0x0528, &border_crossings())
        .ef(0xC101, &gen2_certificate())
        .ef(0xC109, &gen2_certificate())
        .build()
}
