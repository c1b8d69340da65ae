pub mod decode;
pub mod mysql;
pub mod postgres;
pub mod query;

use crate::error::SourceError;
use model::records::batch::RecordBatch;
use model::records::row::Record;
use model::watermark::Watermark;

/// Cursor bookkeeping shared by the relational sources: watermark and offset
/// advancement, end-of-stream detection, boundary inclusivity, and the
/// best-effort schema drift check.
#[derive(Debug)]
pub(crate) struct StreamState {
    pub watermark: Watermark,
    pub inclusive: bool,
    pub offset: u64,
    batch_size: usize,
    watermark_column: Option<String>,
    run_fields: Option<Vec<String>>,
    exhausted: bool,
}

impl StreamState {
    pub fn new(batch_size: usize, watermark_column: Option<String>, resume: Watermark, inclusive: bool) -> Self {
        StreamState {
            watermark: resume,
            inclusive,
            offset: 0,
            batch_size,
            watermark_column,
            run_fields: None,
            exhausted: false,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    /// Folds a fetched page into the cursor, producing the emitted batch with
    /// its tentative watermark, or `None` at end of stream.
    pub fn finish_batch(&mut self, rows: Vec<Record>) -> Result<Option<RecordBatch>, SourceError> {
        if rows.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        if rows.len() < self.batch_size {
            self.exhausted = true;
        }

        let mut names = rows[0].field_names();
        names.sort_unstable();
        match &self.run_fields {
            None => self.run_fields = Some(names),
            Some(first) if *first != names => {
                return Err(SourceError::SchemaDrift(format!(
                    "column set changed from {first:?} to {names:?}"
                )));
            }
            Some(_) => {}
        }

        let tentative = match &self.watermark_column {
            Some(column) => rows
                .iter()
                .filter_map(|row| row.get(column).and_then(Watermark::from_value))
                .fold(self.watermark.clone(), Watermark::max),
            // full mode has no ordering column; the watermark stays put
            None => self.watermark.clone(),
        };

        self.offset += rows.len() as u64;
        self.watermark = tentative.clone();
        self.inclusive = false;

        Ok(Some(RecordBatch::new(rows, tentative)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::records::row::FieldValue;
    use serde_json::json;

    fn row(id: i64) -> Record {
        Record::new(vec![
            FieldValue::new("id", json!(id)),
            FieldValue::new("name", json!("n")),
        ])
    }

    #[test]
    fn advances_watermark_to_batch_maximum() {
        let mut state = StreamState::new(3, Some("id".into()), Watermark::new("0"), false);
        let batch = state
            .finish_batch(vec![row(1), row(3), row(2)])
            .unwrap()
            .unwrap();

        assert_eq!(batch.tentative_watermark.as_str(), "3");
        assert!(state.exhausted(), "short page ends the stream");
    }

    #[test]
    fn full_page_keeps_streaming_and_clears_inclusive_bit() {
        let mut state = StreamState::new(2, Some("id".into()), Watermark::empty(), true);
        state.finish_batch(vec![row(1), row(2)]).unwrap().unwrap();

        assert!(!state.exhausted());
        assert!(!state.inclusive);
        assert_eq!(state.offset, 2);
    }

    #[test]
    fn empty_page_ends_the_stream() {
        let mut state = StreamState::new(2, None, Watermark::empty(), false);
        assert!(state.finish_batch(Vec::new()).unwrap().is_none());
        assert!(state.exhausted());
    }

    #[test]
    fn column_set_change_is_schema_drift() {
        let mut state = StreamState::new(10, Some("id".into()), Watermark::empty(), false);
        state.finish_batch(vec![row(1)]).unwrap();

        let drifted = Record::new(vec![FieldValue::new("renamed", json!(2))]);
        assert!(matches!(
            state.finish_batch(vec![drifted]),
            Err(SourceError::SchemaDrift(_))
        ));
    }
}
