use crate::records::row::Record;
use crate::watermark::Watermark;

/// A bounded group of records processed as a unit by the pipeline.
///
/// `tentative_watermark` is the greatest watermark-column value observed in
/// the batch (or the byte offset after the last emitted log record). It is
/// only persisted once every artifact produced from this batch has been
/// acknowledged by the server.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub rows: Vec<Record>,
    pub tentative_watermark: Watermark,
}

impl RecordBatch {
    pub fn new(rows: Vec<Record>, tentative_watermark: Watermark) -> Self {
        RecordBatch {
            rows,
            tentative_watermark,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
