use model::records::row::{FieldValue, Record};
use serde_json::Value;

/// Start-of-record marker: `[YYYY-MM-DD hh:mm:ss] environment.LEVEL: `.
const HEADER_PATTERN: &str =
    r"(?m)^\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})\] ([^.\n]+)\.([A-Z]+): ";

/// Accumulates raw log bytes and carves them into whole records.
///
/// A record runs from one header to the next; the trailing block is held
/// back (it may still be growing) until the caller knows the file is at EOF.
/// `start_offset` tracks the file offset of the first buffered byte so every
/// emitted record carries the offset just past its final byte.
pub struct LogRecordBuffer {
    buf: Vec<u8>,
    start_offset: u64,
    header: regex::bytes::Regex,
    fields: regex::Regex,
}

impl LogRecordBuffer {
    pub fn new(start_offset: u64) -> Self {
        LogRecordBuffer {
            buf: Vec::new(),
            start_offset,
            header: regex::bytes::Regex::new(HEADER_PATTERN).expect("log header pattern"),
            fields: regex::Regex::new(HEADER_PATTERN).expect("log header pattern"),
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete record, i.e. one already followed by another header.
    /// Returns the record and the file offset just past it.
    pub fn take_record(&mut self) -> Option<(Record, u64)> {
        let (skip, header_end) = {
            let first = self.header.find(&self.buf)?;
            (first.start(), first.end())
        };
        if skip > 0 {
            // bytes before the first header belong to no record; skip them
            self.consume(skip);
        }

        let end = self.header.find_at(&self.buf, header_end - skip)?.start();
        let raw = self.buf[..end].to_vec();
        let record = self.parse(&raw);
        let end_offset = self.consume(end);
        record.map(|r| (r, end_offset))
    }

    /// Drains the trailing block as a record. Only valid once the file is
    /// known to be fully read.
    pub fn take_final_record(&mut self) -> Option<(Record, u64)> {
        let skip = self.header.find(&self.buf)?.start();
        if skip > 0 {
            self.consume(skip);
        }
        let raw = std::mem::take(&mut self.buf);
        let end_offset = self.consume_len(raw.len());
        self.parse(&raw).map(|r| (r, end_offset))
    }

    fn consume(&mut self, len: usize) -> u64 {
        self.buf.drain(..len);
        self.consume_len(len)
    }

    fn consume_len(&mut self, len: usize) -> u64 {
        self.start_offset += len as u64;
        self.start_offset
    }

    fn parse(&self, raw: &[u8]) -> Option<Record> {
        let text = String::from_utf8_lossy(raw);
        let captures = self.fields.captures(&text)?;
        let header_end = captures.get(0)?.end();
        let message = text[header_end..].trim_end().to_string();

        Some(Record::new(vec![
            FieldValue::new("log_date", Value::String(captures[1].to_string())),
            FieldValue::new("environment", Value::String(captures[2].to_string())),
            FieldValue::new("type", Value::String(captures[3].to_string())),
            FieldValue::new("message", Value::String(message)),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carves_records_at_header_boundaries() {
        let mut buffer = LogRecordBuffer::new(0);
        buffer.extend(b"[2025-11-19 23:25:20] local.INFO: first  \n");
        buffer.extend(b"[2025-11-19 23:25:21] local.WARN: second\n");

        let (record, end) = buffer.take_record().unwrap();
        assert_eq!(record.get("type").unwrap().as_str(), Some("INFO"));
        assert_eq!(record.get("message").unwrap().as_str(), Some("first"));
        assert_eq!(end, 42);

        // the second block has no successor header yet
        assert!(buffer.take_record().is_none());

        let (last, end) = buffer.take_final_record().unwrap();
        assert_eq!(last.get("type").unwrap().as_str(), Some("WARN"));
        assert_eq!(end, 42 + 41);
    }

    #[test]
    fn partial_record_across_chunks_is_held_back() {
        let mut buffer = LogRecordBuffer::new(0);
        buffer.extend(b"[2025-11-19 23:25:20] local.INFO: spl");
        assert!(buffer.take_record().is_none());

        buffer.extend(b"it message\n[2025-11-19 23:25:21] local.INFO: tail\n");
        let (record, _) = buffer.take_record().unwrap();
        assert_eq!(record.get("message").unwrap().as_str(), Some("split message"));
    }

    #[test]
    fn preamble_before_first_header_is_skipped() {
        let mut buffer = LogRecordBuffer::new(0);
        buffer.extend(b"orphan line\n[2025-11-19 23:25:20] local.INFO: ok\n");

        let (record, end) = buffer.take_final_record().unwrap();
        assert_eq!(record.get("message").unwrap().as_str(), Some("ok"));
        assert_eq!(end as usize, "orphan line\n[2025-11-19 23:25:20] local.INFO: ok\n".len());
    }

    #[test]
    fn environment_with_dots_splits_on_first_dot() {
        let mut buffer = LogRecordBuffer::new(0);
        buffer.extend(b"[2025-11-19 23:25:20] prod.ERROR: x\n");
        let (record, _) = buffer.take_final_record().unwrap();
        assert_eq!(record.get("environment").unwrap().as_str(), Some("prod"));
        assert_eq!(record.get("log_date").unwrap().as_str(), Some("2025-11-19 23:25:20"));
    }
}
