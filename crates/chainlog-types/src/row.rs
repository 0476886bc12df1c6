//! Persisted layout of a record.
//!
//! The backing table has one row per record:
//!
//! | column          | type             |
//! |-----------------|------------------|
//! | `sequence` (PK) | 64-bit integer   |
//! | `payload`       | bounded string   |
//! | `self_hash`     | bounded string   |
//! | `backward_link` | bounded string   |
//! | `forward_link`  | bounded string   |
//!
//! Absent links are stored as the empty string.

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::RecordHash;
use crate::record::{Record, MAX_COLUMN_LEN};

/// A record exactly as stored in the table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRow {
    pub sequence: i64,
    pub payload: String,
    pub self_hash: String,
    pub backward_link: String,
    pub forward_link: String,
}

impl TryFrom<&Record> for RecordRow {
    type Error = TypeError;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        let sequence = i64::try_from(record.sequence)
            .map_err(|_| TypeError::SequenceNotStorable(record.sequence))?;
        Ok(Self {
            sequence,
            payload: record.payload.clone(),
            self_hash: record.self_hash.to_hex(),
            backward_link: link_column(record.backward_link.as_ref()),
            forward_link: link_column(record.forward_link.as_ref()),
        })
    }
}

impl TryFrom<RecordRow> for Record {
    type Error = TypeError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        if row.sequence < 1 {
            return Err(TypeError::SequenceOutOfRange(row.sequence));
        }
        if row.payload.chars().count() > MAX_COLUMN_LEN {
            return Err(TypeError::ColumnTooLong {
                column: "payload",
                max: MAX_COLUMN_LEN,
            });
        }

        Ok(Record {
            sequence: row.sequence.unsigned_abs(),
            self_hash: RecordHash::from_hex(&row.self_hash)?,
            backward_link: parse_link(&row.backward_link)?,
            forward_link: parse_link(&row.forward_link)?,
            payload: row.payload,
        })
    }
}

impl RecordRow {
    /// The key this row is stored under.
    pub fn key(&self) -> i64 {
        self.sequence
    }

    /// Returns `true` if the forward link column is empty.
    pub fn is_tail(&self) -> bool {
        self.forward_link.is_empty()
    }
}

fn link_column(link: Option<&RecordHash>) -> String {
    link.map(RecordHash::to_hex).unwrap_or_default()
}

fn parse_link(column: &str) -> Result<Option<RecordHash>, TypeError> {
    if column.is_empty() {
        Ok(None)
    } else {
        RecordHash::from_hex(column).map(Some)
    }
}
