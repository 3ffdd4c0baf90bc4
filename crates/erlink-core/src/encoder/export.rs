//! Filter export as `id,b0,b1,...` rows, one entity per line.
//!
//! Bits are written in bitset order (highest position first), the same order
//! as [`BloomFilter::to_bit_string`].

use std::io::{BufRead, BufReader, Read, Write};

use serde::{Deserialize, Serialize};

use crate::encoder::bloom::BloomFilter;
use crate::errors::{ErlinkError, ErlinkResult};
use crate::models::EntityId;

/// One serialized filter plus the entity it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRecord {
    pub entity: EntityId,
    pub bits: String,
}

impl FilterRecord {
    pub fn new(entity: EntityId, filter: &BloomFilter) -> Self {
        Self {
            entity,
            bits: filter.to_bit_string(),
        }
    }

    pub fn to_csv_row(&self) -> String {
        let mut row = self.entity.to_string();
        for ch in self.bits.chars() {
            row.push(',');
            row.push(ch);
        }
        row
    }

    pub fn from_csv_row(row: &str) -> ErlinkResult<Self> {
        let mut fields = row.trim().split(',');
        let id_field = fields
            .next()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ErlinkError::Filter("empty filter row".into()))?;
        let entity = id_field
            .trim()
            .parse::<EntityId>()
            .map_err(|e| ErlinkError::Filter(format!("bad entity id {id_field:?}: {e}")))?;
        let mut bits = String::new();
        for field in fields {
            match field.trim() {
                "0" => bits.push('0'),
                "1" => bits.push('1'),
                other => {
                    return Err(ErlinkError::Filter(format!(
                        "entity {entity}: bad bit {other:?}"
                    )))
                }
            }
        }
        if bits.is_empty() {
            return Err(ErlinkError::Filter(format!("entity {entity}: no bits")));
        }
        Ok(Self { entity, bits })
    }

    pub fn to_filter(&self, hashes: usize, seed: u64) -> ErlinkResult<BloomFilter> {
        BloomFilter::from_bit_string(&self.bits, hashes, seed)
    }
}

pub fn write_filter_csv<W: Write>(out: &mut W, records: &[FilterRecord]) -> ErlinkResult<()> {
    for record in records {
        writeln!(out, "{}", record.to_csv_row())?;
    }
    out.flush()?;
    Ok(())
}

/// Read rows until EOF; blank lines are ignored.
pub fn read_filter_csv<R: Read>(input: R) -> ErlinkResult<Vec<FilterRecord>> {
    let reader = BufReader::new(input);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(FilterRecord::from_csv_row(&line)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_row_layout() {
        let f = BloomFilter::from_bit_string("0101", 1, 0).unwrap();
        let record = FilterRecord::new(12, &f);
        assert_eq!(record.to_csv_row(), "12,0,1,0,1");
    }

    #[test]
    fn file_round_trip_with_blank_lines() {
        let mut a = BloomFilter::new(16, 2).unwrap();
        a.insert("John");
        let b = BloomFilter::new(16, 2).unwrap();
        let records = vec![FilterRecord::new(0, &a), FilterRecord::new(1, &b)];

        let mut file = tempfile::tempfile().unwrap();
        write_filter_csv(&mut file, &records).unwrap();
        writeln!(file).unwrap();

        use std::io::{Seek, SeekFrom};
        file.seek(SeekFrom::Start(0)).unwrap();
        let back = read_filter_csv(&file).unwrap();
        assert_eq!(back, records);
        assert_eq!(back[0].to_filter(2, 0).unwrap(), a);
    }

    #[test]
    fn malformed_rows_are_errors() {
        assert!(FilterRecord::from_csv_row("").is_err());
        assert!(FilterRecord::from_csv_row("x,0,1").is_err());
        assert!(FilterRecord::from_csv_row("3,0,2").is_err());
        assert!(FilterRecord::from_csv_row("3").is_err());
    }
}
