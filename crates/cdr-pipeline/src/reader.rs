//! Strict record reader
//!
//! Streams a delimited text file one line at a time, enforcing the record
//! contract: newline is the only record delimiter, enclosure characters must
//! balance on every line, and every data row must carry exactly the header's
//! field count. The first violation rejects the whole file; there is no
//! partial acceptance.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use crate::error::FileError;

/// CSV dialect: a single strict dialect, configurable delimiter/enclosure.
#[derive(Debug, Clone, Copy)]
pub struct CsvDialect {
    pub delimiter: char,
    pub enclosure: char,
}

impl Default for CsvDialect {
    fn default() -> Self {
        Self {
            delimiter: ',',
            enclosure: '"',
        }
    }
}

/// Split one record line into fields. Assumes enclosure characters are
/// balanced (checked before calling). Doubled enclosures inside a quoted
/// field are literal.
pub fn split_record(line: &str, dialect: CsvDialect) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == dialect.enclosure {
            if in_quotes && chars.peek() == Some(&dialect.enclosure) {
                field.push(ch);
                chars.next();
            } else {
                in_quotes = !in_quotes;
            }
        } else if ch == dialect.delimiter && !in_quotes {
            fields.push(std::mem::take(&mut field));
        } else {
            field.push(ch);
        }
    }
    fields.push(field);
    fields
}

/// Single-pass validating reader: yields validated data rows after the
/// header, failing fast on the first contract violation.
#[derive(Debug)]
pub struct StrictReader {
    lines: Lines<BufReader<File>>,
    dialect: CsvDialect,
    header: Vec<String>,
    /// Physical line number of the last line read (header is line 1).
    line_no: usize,
    rows_yielded: u64,
}

impl StrictReader {
    /// Open a file and read its header line.
    pub fn open(path: &Path, dialect: CsvDialect) -> Result<Self, FileError> {
        let file = File::open(path)
            .map_err(|e| FileError::csv(format!("Cannot open file: {}", e)))?;
        let mut lines = BufReader::new(file).lines();

        let first = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Err(FileError::csv(format!("Read error: {}", e))),
            None => return Err(FileError::csv("Empty file")),
        };
        let first = first.trim_end_matches('\r');
        if first.is_empty() {
            return Err(FileError::csv("Invalid header"));
        }
        if count_char(first, dialect.enclosure) % 2 != 0 {
            return Err(FileError::csv("Broken header line (unbalanced quotes)"));
        }

        let header = split_record(first, dialect);

        Ok(Self {
            lines,
            dialect,
            header,
            line_no: 1,
            rows_yielded: 0,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Count of data rows yielded so far. After a full successful pass this
    /// is the file's validated row count.
    pub fn rows_yielded(&self) -> u64 {
        self.rows_yielded
    }
}

fn count_char(s: &str, ch: char) -> usize {
    s.chars().filter(|&c| c == ch).count()
}

impl Iterator for StrictReader {
    type Item = Result<Vec<String>, FileError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(FileError::csv(format!("Read error: {}", e)))),
            };
            self.line_no += 1;
            let line = line.trim_end_matches('\r');

            // Blank lines are not records.
            if line.is_empty() {
                continue;
            }

            if count_char(line, self.dialect.enclosure) % 2 != 0 {
                return Some(Err(FileError::csv(format!(
                    "Broken line (unbalanced quotes) at data line {}",
                    self.line_no
                ))));
            }

            let fields = split_record(line, self.dialect);
            if fields.len() != self.header.len() {
                return Some(Err(FileError::csv(format!(
                    "Wrong column count at data line {} got={} expected={}",
                    self.line_no,
                    fields.len(),
                    self.header.len()
                ))));
            }

            self.rows_yielded += 1;
            return Some(Ok(fields));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn read_all(content: &str) -> Result<(Vec<String>, Vec<Vec<String>>), FileError> {
        let f = write_file(content);
        let mut reader = StrictReader::open(f.path(), CsvDialect::default())?;
        let header = reader.header().to_vec();
        let mut rows = Vec::new();
        for row in reader.by_ref() {
            rows.push(row?);
        }
        Ok((header, rows))
    }

    #[test]
    fn test_well_formed_file() {
        let (header, rows) = read_all("A,B,C\n1,2,3\n4,5,6\n").unwrap();
        assert_eq!(header, vec!["A", "B", "C"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["1", "2", "3"]);
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let (_, rows) = read_all("A,B\r\n1,2\r\n\r\n3,4\r\n\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["3", "4"]);
    }

    #[test]
    fn test_quoted_fields() {
        let (_, rows) = read_all("A,B\n\"x,y\",\"he said \"\"hi\"\"\"\n").unwrap();
        assert_eq!(rows[0], vec!["x,y", "he said \"hi\""]);
    }

    #[test]
    fn test_unbalanced_quotes_rejects() {
        let err = read_all("A,B\n1,2\n\"broken,3\n").unwrap_err();
        assert!(err.message.contains("unbalanced quotes"));
        assert!(err.message.contains("data line 3"), "{}", err.message);
    }

    #[test]
    fn test_column_count_mismatch_rejects() {
        let err = read_all("A,B,C\n1,2,3\n1,2\n").unwrap_err();
        assert!(err.message.contains("got=2 expected=3"), "{}", err.message);

        let err = read_all("A,B,C\n1,2,3,4\n").unwrap_err();
        assert!(err.message.contains("got=4 expected=3"), "{}", err.message);
    }

    #[test]
    fn test_empty_file_rejects() {
        let f = write_file("");
        let err = StrictReader::open(f.path(), CsvDialect::default()).unwrap_err();
        assert!(err.message.contains("Empty file"));
    }

    #[test]
    fn test_rows_yielded_counts_single_pass() {
        let f = write_file("A,B\n1,2\n\n3,4\n5,6\n");
        let mut reader = StrictReader::open(f.path(), CsvDialect::default()).unwrap();
        let mut n = 0u64;
        for row in reader.by_ref() {
            row.unwrap();
            n += 1;
        }
        // Loaded and validated counts come from the same pass.
        assert_eq!(reader.rows_yielded(), n);
        assert_eq!(n, 3);
    }
}
