//! End-to-end tests for the file-side pipeline stages: strict reading,
//! header sanitization and the staging batch sizing. Database stages are
//! covered by unit tests building SQL; these tests exercise everything that
//! runs before the first query.

use std::io::Write;

use cdr_pipeline::loader::{effective_batch_size, PG_BIND_LIMIT};
use cdr_pipeline::reader::{CsvDialect, StrictReader};
use cdr_pipeline::sanitize::sanitize_header;
use tempfile::NamedTempFile;

fn write_file(content: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(content.as_bytes()).unwrap();
    f
}

#[test]
fn test_read_and_sanitize_messy_header() {
    let f = write_file(
        "Data Source,a-msisdn,a-msisdn,2nd col\n\
         OCC,69900001,69900001,x\n\
         OCC,69900002,69900002,y\n",
    );
    let mut reader = StrictReader::open(f.path(), CsvDialect::default()).unwrap();

    let columns = sanitize_header(reader.header());
    assert_eq!(columns, vec!["DATA_SOURCE", "A_MSISDN", "A_MSISDN_01", "C_2ND_COL"]);

    let rows: Vec<_> = reader.by_ref().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(reader.rows_yielded(), 2);
    // Every row matches the sanitized column count.
    assert!(rows.iter().all(|r| r.len() == columns.len()));
}

#[test]
fn test_first_bad_row_stops_the_file() {
    let f = write_file("A,B\n1,2\n1,2,3\n4,5\n");
    let mut reader = StrictReader::open(f.path(), CsvDialect::default()).unwrap();

    assert!(reader.next().unwrap().is_ok());
    let err = reader.next().unwrap().unwrap_err();
    assert!(err.ledger_message().starts_with("CSV_INVALID:"));
    assert!(err.message.contains("data line 3"));
}

#[test]
fn test_semicolon_dialect() {
    let f = write_file("A;B\n'x;y';2\n");
    let dialect = CsvDialect {
        delimiter: ';',
        enclosure: '\'',
    };
    let mut reader = StrictReader::open(f.path(), dialect).unwrap();
    assert_eq!(reader.header(), ["A", "B"]);
    assert_eq!(reader.next().unwrap().unwrap(), vec!["x;y", "2"]);
}

#[test]
fn test_batch_parameters_stay_under_limit() {
    // OCC files carry 25 input columns; check the whole plausible range.
    for columns in 1..=100 {
        let batch = effective_batch_size(5000, columns);
        assert!(batch >= 1);
        assert!(batch * (columns + 2) <= PG_BIND_LIMIT);
    }
}
