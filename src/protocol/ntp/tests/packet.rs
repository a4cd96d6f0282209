use crate::protocol::ntp::packet::{DecodeError, NtpPacket};
use crate::protocol::ntp::timestamp::NtpTimestamp;

fn sample_packet() -> NtpPacket {
    NtpPacket {
        leap_indicator: 0,
        status: 28,
        packet_type: 1,
        precision: 236,
        estimated_error: 648,
        estimated_drift_rate: 440,
        reference_clock_id: 0x4750_5300,
        reference_time: NtpTimestamp::new(3_591_861_726, 0),
        originate_time: NtpTimestamp::new(3_591_861_727, 0x1234_5678),
        receive_time: NtpTimestamp::new(3_591_861_727, 0x2000_0000),
        transmit_time: NtpTimestamp::new(3_591_861_727, 0x2000_1000),
    }
}

#[test]
fn test_encode_size() {
    assert_eq!(sample_packet().encode().len(), NtpPacket::SIZE);
    assert_eq!(NtpPacket::default().encode(), [0u8; 48]);
}

#[test]
fn test_encode_layout() {
    let bytes = sample_packet().encode();
    assert_eq!(bytes[0], 28);
    assert_eq!(bytes[1], 1);
    assert_eq!(&bytes[2..4], &236u16.to_be_bytes());
    assert_eq!(&bytes[4..8], &648u32.to_be_bytes());
    assert_eq!(&bytes[8..12], &440u32.to_be_bytes());
    assert_eq!(&bytes[12..16], b"GPS\0");
    assert_eq!(&bytes[16..20], &3_591_861_726u32.to_be_bytes());
    assert_eq!(&bytes[20..24], &[0, 0, 0, 0]);
    assert_eq!(&bytes[28..32], &0x1234_5678u32.to_be_bytes());
    assert_eq!(&bytes[44..48], &0x2000_1000u32.to_be_bytes());
}

#[test]
fn test_leap_status_packing() {
    let mut packet = NtpPacket::default();
    packet.leap_indicator = 0b11;
    packet.status = 0b10_1010;
    let bytes = packet.encode();
    assert_eq!(bytes[0], 0b1110_1010);

    let decoded = NtpPacket::decode(&bytes).unwrap();
    assert_eq!(decoded.leap_indicator, 0b11);
    assert_eq!(decoded.status, 0b10_1010);
}

#[test]
fn test_leap_status_masks_truncate() {
    let mut packet = NtpPacket::default();
    packet.leap_indicator = 0b111;
    packet.status = 0xFF;
    let bytes = packet.encode();
    assert_eq!(bytes[0], 0xFF);
}

#[test]
fn test_decode_roundtrip() {
    let packet = sample_packet();
    assert_eq!(NtpPacket::decode(&packet.encode()).unwrap(), packet);
}

#[test]
fn test_decode_too_short() {
    let err = NtpPacket::decode(&[0u8; 47]).unwrap_err();
    assert_eq!(err, DecodeError::TooShort { needed: 48, have: 47 });
    assert!(matches!(
        NtpPacket::decode(&[]),
        Err(DecodeError::TooShort { have: 0, .. })
    ));
}

#[test]
fn test_decode_misaligned() {
    let err = NtpPacket::decode(&[0u8; 50]).unwrap_err();
    assert_eq!(err, DecodeError::Misaligned { len: 50 });
}

#[test]
fn test_decode_ignores_trailing_words() {
    let packet = sample_packet();
    let mut bytes = packet.encode().to_vec();
    bytes.extend_from_slice(&[0xAA; 20]);
    assert_eq!(NtpPacket::decode(&bytes).unwrap(), packet);
}

#[test]
fn test_decode_timestamps_match_word_decoding() {
    let bytes = sample_packet().encode();
    let decoded = NtpPacket::decode(&bytes).unwrap();

    assert_eq!(NtpTimestamp::decode(&bytes[16..24]), Some(decoded.reference_time));
    assert_eq!(NtpTimestamp::decode(&bytes[24..32]), Some(decoded.originate_time));
    assert_eq!(NtpTimestamp::decode(&bytes[32..40]), Some(decoded.receive_time));
    assert_eq!(NtpTimestamp::decode(&bytes[40..48]), Some(decoded.transmit_time));
    assert_eq!(decoded.originate_time, NtpTimestamp::new(3_591_861_727, 0x1234_5678));
}

#[test]
fn test_client_request() {
    let transmit = NtpTimestamp::new(3_591_861_726, 42);
    let request = NtpPacket::client_request(transmit);
    let bytes = request.encode();
    assert_eq!(bytes[0], 0x1b);
    assert!(bytes[1..40].iter().all(|&b| b == 0));
    assert_eq!(NtpPacket::decode(&bytes).unwrap().transmit_time, transmit);
}

#[test]
fn test_reference_id_tag() {
    assert_eq!(sample_packet().reference_id_tag(), "GPS");

    let mut packet = NtpPacket::default();
    packet.reference_clock_id = u32::from_be_bytes(*b"PPS1");
    assert_eq!(packet.reference_id_tag(), "PPS1");
    packet.reference_clock_id = 0x0000_4700;
    assert_eq!(packet.reference_id_tag(), "");
    packet.reference_clock_id = 0x4701_5300;
    assert_eq!(packet.reference_id_tag(), "G.S");
}

#[test]
fn test_decode_error_display() {
    let err = DecodeError::TooShort { needed: 48, have: 3 };
    assert_eq!(err.to_string(), "packet too short: need 48 bytes, have 3");
    assert_eq!(
        DecodeError::Misaligned { len: 49 }.to_string(),
        "packet length 49 is not a multiple of 4"
    );
}
