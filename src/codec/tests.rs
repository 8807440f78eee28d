use super::*;
use crate::test_utils::AccountEvent;

fn make_event(version: i64) -> FullyEvent<i64, AccountEvent> {
    FullyEvent::new(
        7,
        AccountEvent::Deposited { amount: 25 },
        EventBase::new(version, 1_000 + version),
    )
}

#[test]
fn test_frame_header_layout() {
    let bytes = EventBytes::from_event(&make_event(1)).unwrap();
    let frame = bytes.to_frame().unwrap();

    assert_eq!(frame[0], FrameKind::Event as u8);
    let type_len = u16::from_le_bytes([frame[1], frame[2]]) as usize;
    let id_len = u16::from_le_bytes([frame[3], frame[4]]) as usize;
    let base_len = u16::from_le_bytes([frame[5], frame[6]]) as usize;
    let body_len = i32::from_le_bytes([frame[7], frame[8], frame[9], frame[10]]) as usize;

    assert_eq!(type_len, "Deposited".len());
    assert_eq!(id_len, 1);
    assert_eq!(base_len, 16);
    assert_eq!(body_len, bytes.body.len());
    assert_eq!(frame.len(), HEADER_LEN + type_len + id_len + base_len + body_len);
    assert_eq!(&frame[HEADER_LEN..HEADER_LEN + type_len], b"Deposited");
}

#[test]
fn test_frame_decodes_to_typed_event() {
    let original = make_event(3);
    let frame = EventBytes::from_event(&original).unwrap().to_frame().unwrap();

    let decoded = EventBytes::from_frame(&frame).unwrap();
    assert_eq!(decoded.base, EventBase::new(3, 1_003));
    assert_eq!(decoded.state_id, "7");

    let event: FullyEvent<i64, AccountEvent> = decoded.to_event().unwrap();
    assert_eq!(event, original);
}

#[test]
fn test_truncated_frame_rejected() {
    let frame = EventBytes::from_event(&make_event(1))
        .unwrap()
        .to_frame()
        .unwrap();
    let err = EventBytes::from_frame(&frame[..frame.len() - 1]).unwrap_err();
    assert!(matches!(err, CodecError::Truncated { .. }));

    let err = EventBytes::from_frame(&frame[..4]).unwrap_err();
    assert!(matches!(err, CodecError::Truncated { needed: HEADER_LEN, .. }));
}

#[test]
fn test_unknown_kind_rejected() {
    let mut frame = EventBytes::from_event(&make_event(1))
        .unwrap()
        .to_frame()
        .unwrap()
        .to_vec();
    frame[0] = 9;
    assert!(matches!(
        EventBytes::from_frame(&frame),
        Err(CodecError::UnknownKind(9))
    ));

    frame[0] = FrameKind::Common as u8;
    assert!(matches!(
        EventBytes::from_frame(&frame),
        Err(CodecError::UnknownKind(0))
    ));
}

#[test]
fn test_invalid_state_id_rejected() {
    let mut bytes = EventBytes::from_event(&make_event(1)).unwrap();
    bytes.state_id = "not-a-number".to_string();
    let result: Result<FullyEvent<i64, AccountEvent>, _> = bytes.to_event();
    assert!(matches!(result, Err(CodecError::InvalidStateId(_))));
}

#[test]
fn test_type_code_mismatch_rejected() {
    let mut bytes = EventBytes::from_event(&make_event(1)).unwrap();
    bytes.type_code = "Withdrawn".to_string();
    let result: Result<FullyEvent<i64, AccountEvent>, _> = bytes.to_event();
    assert!(matches!(result, Err(CodecError::TypeCodeMismatch { .. })));
}
