//! Accumulates RustScan's stdout while it streams in.
//!
//! Besides keeping every byte for the final parse, the buffer counts open-port
//! announcements as they arrive and picks up nmap's `<taskprogress>` percentages.

use crate::parser;

const OPEN_MARKER: &[u8] = b"Open ";
const SEGMENT_DELIMITER: &str = "[~]";
const XML_DECLARATION: &str = "<?xml ";
const NO_OPEN_PORTS: &str = "Looks like I didn't find any open ports";
const TASK_PROGRESS: &str = "<taskprogress";
const PERCENT_ATTR: &str = "percent=\"";

#[derive(Debug, Default)]
pub(crate) struct OutputBuffer {
    buf: Vec<u8>,
    open_ports: usize,
    /// Markers before this offset are already counted.
    marker_offset: usize,
    /// Lines before this offset are already checked for progress.
    progress_offset: usize,
}

impl OutputBuffer {
    /// Appends a chunk and returns the number of open ports seen so far.
    pub fn push(&mut self, chunk: &[u8]) -> usize {
        self.buf.extend_from_slice(chunk);
        self.count_markers();
        self.open_ports
    }

    pub fn open_ports(&self) -> usize {
        self.open_ports
    }

    // A marker may be split across two chunks, so the unmatched tail is rescanned.
    fn count_markers(&mut self) {
        while let Some(pos) = find(&self.buf[self.marker_offset..], OPEN_MARKER) {
            self.open_ports += 1;
            self.marker_offset += pos + OPEN_MARKER.len();
        }
        let tail = self.buf.len().saturating_sub(OPEN_MARKER.len() - 1);
        self.marker_offset = self.marker_offset.max(tail);
    }

    /// Latest progress percentage found in lines completed since the last call.
    pub fn take_progress(&mut self) -> Option<f32> {
        let unread = &self.buf[self.progress_offset..];
        let end = unread.iter().rposition(|&b| b == b'\n')? + 1;
        let lines = String::from_utf8_lossy(&unread[..end]);
        self.progress_offset += end;

        lines.lines().filter_map(progress_percent).next_back()
    }

    /// Extracts the XML report, or synthesizes an empty one when RustScan
    /// found nothing and printed no XML.
    ///
    /// Returns an empty buffer if neither is present, which the parser rejects.
    pub fn payload(&self, target: &str) -> Vec<u8> {
        let text = String::from_utf8_lossy(&self.buf);
        let mut no_ports = false;

        for segment in text.split(SEGMENT_DELIMITER) {
            if let Some(start) = segment.find(XML_DECLARATION) {
                return segment[start..].as_bytes().to_vec();
            }
            no_ports |= segment.contains(NO_OPEN_PORTS);
        }

        if no_ports {
            parser::empty_report(target)
        } else {
            Vec::new()
        }
    }
}

fn progress_percent(line: &str) -> Option<f32> {
    let rest = &line[line.find(TASK_PROGRESS)?..];
    let value = &rest[rest.find(PERCENT_ATTR)? + PERCENT_ATTR.len()..];
    let value = &value[..value.find('"')?];
    value.parse().ok()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
