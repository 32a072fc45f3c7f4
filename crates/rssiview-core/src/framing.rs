use encoding_rs::UTF_8;

/// Longest line accepted, in bytes. A longer line is dropped whole, up to its
/// `\n`, so a peer that never sends newlines cannot grow the buffer without
/// bound.
pub const MAX_LINE_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One line without its terminating `\n`.
    Line(Vec<u8>),
    /// A line longer than [`MAX_LINE_LEN`] was discarded; carries its length.
    Oversize(usize),
}

/// Splits a byte stream into `\n`-terminated frames.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
    /// Bytes already thrown away from the current oversize line.
    discarding: Option<usize>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `data` and returns every frame completed by it.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            match self.discarding.take() {
                Some(dropped) => frames.push(Frame::Oversize(dropped + line.len())),
                None if line.len() > MAX_LINE_LEN => frames.push(Frame::Oversize(line.len())),
                None => frames.push(Frame::Line(line)),
            }
        }

        if self.buf.len() > MAX_LINE_LEN || self.discarding.is_some() {
            let dropped = self.discarding.unwrap_or(0) + self.buf.len();
            self.discarding = Some(dropped);
            self.buf.clear();
        }
        frames
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Decodes one frame as UTF-8. Malformed sequences become U+FFFD, so a bad
/// byte spoils only its own line.
pub fn decode_line(frame: &[u8]) -> String {
    UTF_8.decode_without_bom_handling(frame).0.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_split_across_reads() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"{\"RSSI\":").is_empty());
        assert_eq!(framer.pending(), 8);

        let frames = framer.push(b" -40}\r\n{}\n{\"a\"");
        assert_eq!(
            frames,
            vec![Frame::Line(b"{\"RSSI\": -40}\r".to_vec()), Frame::Line(b"{}".to_vec())]
        );
        assert_eq!(framer.pending(), 4);
    }

    #[test]
    fn empty_lines_are_still_frames() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"\n\n").len(), 2);
    }

    #[test]
    fn long_line_within_limit_survives_any_chunking() {
        let line = format!("{{\"RSSI\": -40, \"pad\": \"{}\"}}\n", "x".repeat(6000));
        for chunk in [1, 7, 1024, 4096, line.len()] {
            let mut framer = LineFramer::new();
            let frames: Vec<Frame> = line.as_bytes().chunks(chunk).flat_map(|c| framer.push(c)).collect();
            assert_eq!(frames, vec![Frame::Line(line.trim_end().as_bytes().to_vec())], "chunk {chunk}");
        }
    }

    #[test]
    fn oversize_line_is_dropped_whole_with_one_frame() {
        let mut framer = LineFramer::new();
        let mut frames = Vec::new();
        for _ in 0..3 {
            frames.extend(framer.push(&vec![b'x'; MAX_LINE_LEN / 2 + 1]));
        }
        assert!(frames.is_empty());
        assert_eq!(framer.pending(), 0);

        frames.extend(framer.push(b"tail\n{}\n"));
        assert_eq!(
            frames,
            vec![Frame::Oversize(3 * (MAX_LINE_LEN / 2 + 1) + 4), Frame::Line(b"{}".to_vec())]
        );
    }

    #[test]
    fn oversize_line_in_a_single_read() {
        let mut data = vec![b'y'; MAX_LINE_LEN + 1];
        data.extend_from_slice(b"\n{}\n");
        let frames = LineFramer::new().push(&data);
        assert_eq!(frames, vec![Frame::Oversize(MAX_LINE_LEN + 1), Frame::Line(b"{}".to_vec())]);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let text = decode_line(b"{\"RSSI\": -40\xff}");
        assert!(text.starts_with("{\"RSSI\": -40"));
        assert!(text.contains('\u{FFFD}'));
    }
}
