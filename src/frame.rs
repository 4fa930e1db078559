//! Classification of reassembled stream lines

/// Prefix every data-bearing line starts with
pub const FRAME_PREFIX: &str = "data:";

/// Payload marking normal end of stream
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind<'a> {
    /// Carries the stripped, trimmed payload
    Data(&'a str),
    Sentinel,
    /// Anything that is not a `data:` line (comments, `event:` lines, blanks)
    Ignored,
}

/// One reassembled line and what it means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub raw: &'a str,
    pub kind: FrameKind<'a>,
}

impl<'a> Frame<'a> {
    pub fn classify(line: &'a str) -> Self {
        let kind = match line.trim().strip_prefix(FRAME_PREFIX) {
            None => FrameKind::Ignored,
            Some(rest) => {
                let payload = rest.trim();
                if payload == DONE_SENTINEL {
                    FrameKind::Sentinel
                } else {
                    FrameKind::Data(payload)
                }
            }
        };

        Self { raw: line, kind }
    }

    pub fn payload(&self) -> Option<&'a str> {
        match self.kind {
            FrameKind::Data(payload) => Some(payload),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_frames_are_trimmed() {
        let frame = Frame::classify("  data:   {\"answer\": \"x\"}  \r");
        assert_eq!(frame.kind, FrameKind::Data("{\"answer\": \"x\"}"));
        assert_eq!(frame.payload(), Some("{\"answer\": \"x\"}"));

        assert_eq!(Frame::classify("data:hello").kind, FrameKind::Data("hello"));
    }

    #[test]
    fn test_sentinel() {
        assert_eq!(Frame::classify("data: [DONE]").kind, FrameKind::Sentinel);
        assert_eq!(Frame::classify("data:[DONE]  ").kind, FrameKind::Sentinel);
        assert_eq!(
            Frame::classify("data: [DONE] extra").kind,
            FrameKind::Data("[DONE] extra")
        );
    }

    #[test]
    fn test_non_data_lines_are_ignored() {
        for line in [
            "",
            "   ",
            "event: message_start",
            ": keep-alive",
            "id: 42",
            "hello data: world",
            "DATA: shouting",
        ] {
            let frame = Frame::classify(line);
            assert_eq!(frame.kind, FrameKind::Ignored, "line {line:?}");
            assert_eq!(frame.payload(), None);
        }
    }

    #[test]
    fn test_empty_payload_is_data() {
        assert_eq!(Frame::classify("data:").kind, FrameKind::Data(""));
    }
}
