use relaycode::api::{SseEvent, SseParser};

#[test]
fn test_fragmented_event_across_chunks() {
    let mut parser = SseParser::new();

    let chunk1 = b"data: {\"type\":\"content";
    let events1 = parser.process(chunk1);
    assert_eq!(events1.len(), 0);

    let chunk2 =
        b"_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n";
    let events2 = parser.process(chunk2);
    assert_eq!(events2, vec![SseEvent::TextDelta("Hi".to_string())]);
}

#[test]
fn test_multibyte_utf8_split_across_chunks() {
    let mut parser = SseParser::new();

    let line = "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"caf\u{00e9}\"}}\n\n";
    let bytes = line.as_bytes();
    // Split inside the two-byte 'é' sequence.
    let split = bytes.len() - 6;
    assert!(std::str::from_utf8(&bytes[..split]).is_err());

    let mut events = parser.process(&bytes[..split]);
    events.extend(parser.process(&bytes[split..]));
    assert_eq!(events, vec![SseEvent::TextDelta("caf\u{00e9}".to_string())]);
}

#[test]
fn test_malformed_data_line_is_skipped() {
    let mut parser = SseParser::new();
    let mut events = parser.process(b"data: {invalid json}\n\n");
    assert_eq!(events.len(), 0);

    // The parser keeps working afterwards.
    events.extend(parser.process(
        b"data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"ok\"}}\n\n",
    ));
    assert_eq!(events, vec![SseEvent::TextDelta("ok".to_string())]);
}

#[test]
fn test_payload_type_wins_over_event_line() {
    let mut parser = SseParser::new();
    // The event: line lies; the payload's own type field is authoritative.
    let chunk = b"event: ping\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n";
    let events = parser.process(chunk);
    assert_eq!(events, vec![SseEvent::TextDelta("Hi".to_string())]);
}

#[test]
fn test_tool_lifecycle_accumulates_input_json() {
    let mut parser = SseParser::new();
    let mut events = Vec::new();

    events.extend(parser.process(
        b"data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_123\",\"name\":\"write_file\"}}\n\n",
    ));
    events.extend(parser.process(
        b"data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"path\\\":\\\"src/\"}}\n\n",
    ));
    events.extend(parser.process(
        b"data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"a.ts\\\"}\"}}\n\n",
    ));
    events.extend(parser.process(b"data: {\"type\":\"content_block_stop\",\"index\":1}\n\n"));

    assert_eq!(
        events[0],
        SseEvent::ToolUseStart {
            id: "toolu_123".to_string(),
            name: "write_file".to_string(),
        }
    );
    assert_eq!(
        events[1],
        SseEvent::ToolInputDelta {
            fragment: "{\"path\":\"src/".to_string(),
        }
    );
    match &events[3] {
        SseEvent::ToolUseComplete { id, name, input } => {
            assert_eq!(id, "toolu_123");
            assert_eq!(name, "write_file");
            assert_eq!(input, &serde_json::json!({ "path": "src/a.ts" }));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn test_tool_stop_with_malformed_json_falls_back_to_raw() {
    let mut parser = SseParser::new();
    let mut events = Vec::new();

    events.extend(parser.process(
        b"data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"write_file\"}}\n\n",
    ));
    events.extend(parser.process(
        b"data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"path\\\": \\\"trunc\"}}\n\n",
    ));
    events.extend(parser.process(b"data: {\"type\":\"content_block_stop\",\"index\":0}\n\n"));

    match events.last() {
        Some(SseEvent::ToolUseComplete { input, .. }) => {
            assert_eq!(input["raw"], "{\"path\": \"trunc");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn test_tool_stop_without_input_yields_empty_object() {
    let mut parser = SseParser::new();
    let mut events = Vec::new();
    events.extend(parser.process(
        b"data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_2\",\"name\":\"list_files\"}}\n\n",
    ));
    events.extend(parser.process(b"data: {\"type\":\"content_block_stop\",\"index\":0}\n\n"));

    match events.last() {
        Some(SseEvent::ToolUseComplete { input, .. }) => {
            assert_eq!(input, &serde_json::json!({}));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn test_stop_reason_is_surfaced() {
    let mut parser = SseParser::new();
    let events = parser.process(
        b"data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":3}}\n\n",
    );
    assert_eq!(events, vec![SseEvent::StopReason("tool_use".to_string())]);
}

#[test]
fn test_done_sentinel_latches_parser() {
    let mut parser = SseParser::new();
    let events = parser.process(b"data: [DONE]\n\n");
    assert_eq!(events, vec![SseEvent::Done]);
    assert!(parser.is_finished());

    let after = parser.process(
        b"data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"late\"}}\n\n",
    );
    assert_eq!(after.len(), 0);
}

#[test]
fn test_event_done_line_latches_parser() {
    let mut parser = SseParser::new();
    let events = parser.process(b"event: done\ndata: [DONE]\n\n");
    assert_eq!(events, vec![SseEvent::Done]);
    assert!(parser.is_finished());
}

#[test]
fn test_error_payload_stops_consumption() {
    let mut parser = SseParser::new();
    let chunk = b"data: {\"error\":{\"type\":\"overloaded_error\",\"message\":\"upstream busy\"}}\n\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"late\"}}\n\n";
    let events = parser.process(chunk);
    assert_eq!(events, vec![SseEvent::Error("upstream busy".to_string())]);
    assert!(parser.is_finished());
}
