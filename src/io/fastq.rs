use std::io::BufRead;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct FastqRecord {
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}

pub struct FastqReader<R: BufRead> {
    reader: R,
    buf: String,
    done: bool,
    line: usize,
}

impl<R: BufRead> FastqReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            done: false,
            line: 0,
        }
    }

    fn read_line(&mut self) -> Result<usize> {
        self.buf.clear();
        let n = self.reader.read_line(&mut self.buf)?;
        if n > 0 {
            self.line += 1;
        }
        Ok(n)
    }

    fn malformed(&self, what: &str) -> Error {
        Error::InvalidFormat(format!("FASTQ line {}: {}", self.line, what))
    }

    pub fn next_record(&mut self) -> Result<Option<FastqRecord>> {
        if self.done {
            return Ok(None);
        }

        // header line starting with '@', blank lines between records tolerated
        loop {
            if self.read_line()? == 0 {
                self.done = true;
                return Ok(None);
            }
            if !self.buf.trim().is_empty() {
                break;
            }
        }
        if !self.buf.starts_with('@') {
            return Err(self.malformed("header not starting with '@'"));
        }

        // sequence line
        if self.read_line()? == 0 {
            return Err(self.malformed("unexpected EOF after header"));
        }
        let seq = self.buf.trim_end().as_bytes().to_vec();

        // plus line
        if self.read_line()? == 0 || !self.buf.starts_with('+') {
            return Err(self.malformed("missing '+' line"));
        }

        // quality line
        if self.read_line()? == 0 {
            return Err(self.malformed("missing quality line"));
        }
        let qual = self.buf.trim_end().as_bytes().to_vec();

        // line-wrapped FASTQ is not supported
        if qual.len() != seq.len() {
            return Err(self.malformed("seq/qual length mismatch"));
        }

        Ok(Some(FastqRecord { seq, qual }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_two_records() {
        let data = b"@r1 x\nACGT\n+\nIIII\n\n@r2\nGG\n+r2\n##\n";
        let mut r = FastqReader::new(Cursor::new(&data[..]));
        let a = r.next_record().unwrap().unwrap();
        assert_eq!(a.seq, b"ACGT");
        assert_eq!(a.qual, b"IIII");
        let b = r.next_record().unwrap().unwrap();
        assert_eq!(b.seq, b"GG");
        assert_eq!(b.qual, b"##");
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn missing_header_marker_is_malformed() {
        let data = b"r1\nACGT\n+\nIIII\n";
        let mut r = FastqReader::new(Cursor::new(&data[..]));
        assert!(matches!(r.next_record(), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn truncated_record_is_malformed() {
        let data = b"@r1\nACGT\n+\n";
        let mut r = FastqReader::new(Cursor::new(&data[..]));
        assert!(matches!(r.next_record(), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn qual_length_mismatch_is_malformed() {
        let data = b"@r1\nACGT\n+\nII\n";
        let mut r = FastqReader::new(Cursor::new(&data[..]));
        assert!(matches!(r.next_record(), Err(Error::InvalidFormat(_))));
    }
}
