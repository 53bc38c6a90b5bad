use std::collections::HashSet;

/// Events produced while scanning a streaming JSON object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractorEvent {
    /// A watched (non-stream) key finished its string value.
    KeyValue { key: String, value: String },
    /// One decoded character of the stream key's value.
    ContentChunk { value: String },
    /// The stream key's value closed.
    ContentDone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Scanning,
    InKey,
    AfterKey,
    AfterColon,
    InStringValue,
    SkipString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EscapeState {
    None,
    /// Saw `\`, waiting for the escape character.
    Backslash,
    /// Inside `\uXXXX`, collecting hex digits.
    Unicode(String),
}

/// Character-level scanner that watches a streaming JSON object for specific
/// string-valued keys and emits decoded values before the object is complete.
/// Fed with arbitrary fragments of the object's text, in order, down to one
/// character at a time; escape sequences split across fragments re-buffer and
/// decode once whole.
///
/// Values for the designated stream key are emitted per character as
/// [`ExtractorEvent::ContentChunk`]; other watched keys accumulate and emit a
/// single [`ExtractorEvent::KeyValue`]. Non-string values are invisible.
pub struct JsonFieldExtractor {
    state: ScanState,
    current_key: String,
    current_value: String,
    escape: EscapeState,
    pending_high_surrogate: Option<u16>,
    key_is_watched: bool,
    skip_escape: bool,
    watch_keys: HashSet<String>,
    stream_key: String,
}

impl JsonFieldExtractor {
    pub fn new(watch_keys: &[&str], stream_key: &str) -> Self {
        Self {
            state: ScanState::Scanning,
            current_key: String::new(),
            current_value: String::new(),
            escape: EscapeState::None,
            pending_high_surrogate: None,
            key_is_watched: false,
            skip_escape: false,
            watch_keys: watch_keys.iter().map(|k| (*k).to_string()).collect(),
            stream_key: stream_key.to_string(),
        }
    }

    /// Process one fragment and return the events it produced, in order.
    pub fn feed(&mut self, fragment: &str) -> Vec<ExtractorEvent> {
        let mut out = Vec::new();
        for ch in fragment.chars() {
            self.process_char(ch, &mut out);
        }
        out
    }

    pub fn reset(&mut self) {
        self.state = ScanState::Scanning;
        self.current_key.clear();
        self.current_value.clear();
        self.escape = EscapeState::None;
        self.pending_high_surrogate = None;
        self.key_is_watched = false;
        self.skip_escape = false;
    }

    fn process_char(&mut self, ch: char, out: &mut Vec<ExtractorEvent>) {
        match self.state {
            ScanState::Scanning => {
                if ch == '"' {
                    self.state = ScanState::InKey;
                    self.current_key.clear();
                }
            }
            ScanState::InKey => {
                if ch == '"' {
                    self.state = ScanState::AfterKey;
                } else {
                    self.current_key.push(ch);
                }
            }
            ScanState::AfterKey => {
                if ch == ':' {
                    self.state = ScanState::AfterColon;
                    self.key_is_watched = self.watch_keys.contains(&self.current_key);
                } else if ch == ',' || ch == '}' {
                    // That quoted string was a value, not a key.
                    self.state = ScanState::Scanning;
                }
            }
            ScanState::AfterColon => {
                if ch == '"' {
                    if self.key_is_watched {
                        self.state = ScanState::InStringValue;
                        self.current_value.clear();
                        self.escape = EscapeState::None;
                        self.pending_high_surrogate = None;
                    } else {
                        self.state = ScanState::SkipString;
                        self.skip_escape = false;
                    }
                } else if !matches!(ch, ' ' | '\t' | '\n' | '\r') {
                    // Non-string value; this extractor only reads strings.
                    self.state = ScanState::Scanning;
                }
            }
            ScanState::InStringValue => self.process_string_char(ch, out),
            ScanState::SkipString => {
                if self.skip_escape {
                    self.skip_escape = false;
                } else if ch == '\\' {
                    self.skip_escape = true;
                } else if ch == '"' {
                    self.state = ScanState::Scanning;
                }
            }
        }
    }

    fn process_string_char(&mut self, ch: char, out: &mut Vec<ExtractorEvent>) {
        match std::mem::replace(&mut self.escape, EscapeState::None) {
            EscapeState::Backslash => {
                if ch == 'u' {
                    self.escape = EscapeState::Unicode(String::new());
                } else {
                    let decoded = decode_escape_char(ch);
                    self.emit_content(decoded, out);
                }
            }
            EscapeState::Unicode(mut hex) => {
                hex.push(ch);
                if hex.len() == 4 {
                    self.decode_unicode_escape(&hex, out);
                } else {
                    self.escape = EscapeState::Unicode(hex);
                }
            }
            EscapeState::None => {
                if ch == '\\' {
                    self.escape = EscapeState::Backslash;
                } else if ch == '"' {
                    if self.current_key == self.stream_key {
                        out.push(ExtractorEvent::ContentDone);
                    } else {
                        out.push(ExtractorEvent::KeyValue {
                            key: self.current_key.clone(),
                            value: std::mem::take(&mut self.current_value),
                        });
                    }
                    self.pending_high_surrogate = None;
                    self.state = ScanState::Scanning;
                } else {
                    self.emit_content(ch, out);
                }
            }
        }
    }

    fn decode_unicode_escape(&mut self, hex: &str, out: &mut Vec<ExtractorEvent>) {
        // A code point that fails to parse decodes to nothing, never an error.
        let Ok(unit) = u16::from_str_radix(hex, 16) else {
            self.pending_high_surrogate = None;
            return;
        };

        match (self.pending_high_surrogate.take(), unit) {
            (_, 0xD800..=0xDBFF) => {
                // High half; hold it until the low half arrives.
                self.pending_high_surrogate = Some(unit);
            }
            (Some(high), 0xDC00..=0xDFFF) => {
                let combined =
                    0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(unit) - 0xDC00);
                if let Some(decoded) = char::from_u32(combined) {
                    self.emit_content(decoded, out);
                }
            }
            (None, 0xDC00..=0xDFFF) => {
                // Unpaired low surrogate decodes to nothing.
            }
            (_, _) => {
                if let Some(decoded) = char::from_u32(u32::from(unit)) {
                    self.emit_content(decoded, out);
                }
            }
        }
    }

    fn emit_content(&mut self, decoded: char, out: &mut Vec<ExtractorEvent>) {
        if self.current_key == self.stream_key {
            out.push(ExtractorEvent::ContentChunk {
                value: decoded.to_string(),
            });
        } else {
            self.current_value.push(decoded);
        }
    }
}

fn decode_escape_char(ch: char) -> char {
    match ch {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        'b' => '\u{0008}',
        'f' => '\u{000C}',
        // '"', '\\', '/' and anything unrecognized pass through.
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_of(events: &[ExtractorEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                ExtractorEvent::ContentChunk { value } => Some(value.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_string_that_is_a_value_does_not_corrupt_key_detection() {
        let mut extractor = JsonFieldExtractor::new(&["path"], "content");
        let events = extractor.feed(r#"{"items": ["path", "x"], "path": "ok.ts"}"#);
        assert!(events.contains(&ExtractorEvent::KeyValue {
            key: "path".to_string(),
            value: "ok.ts".to_string(),
        }));
    }

    #[test]
    fn test_surrogate_pair_decodes_to_one_chunk() {
        let mut extractor = JsonFieldExtractor::new(&["content"], "content");
        let events = extractor.feed("{\"content\": \"\\ud83d\\ude00\"}");
        assert_eq!(content_of(&events), "\u{1F600}");
        let chunks = events
            .iter()
            .filter(|e| matches!(e, ExtractorEvent::ContentChunk { .. }))
            .count();
        assert_eq!(chunks, 1);
    }

    #[test]
    fn test_invalid_unicode_escape_decodes_to_nothing() {
        let mut extractor = JsonFieldExtractor::new(&["content"], "content");
        let events = extractor.feed(r#"{"content": "a\uzzzzb"}"#);
        assert_eq!(content_of(&events), "ab");
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut extractor = JsonFieldExtractor::new(&["path"], "content");
        extractor.feed(r#"{"path": "fir"#);
        extractor.reset();
        let events = extractor.feed(r#"{"path": "second.ts"}"#);
        assert_eq!(
            events,
            vec![ExtractorEvent::KeyValue {
                key: "path".to_string(),
                value: "second.ts".to_string(),
            }]
        );
    }
}
