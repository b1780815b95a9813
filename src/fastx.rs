use std::io::BufRead;

use crate::error::{Error, Result};

/// One FASTA or FASTQ record. `qual` is `None` for FASTA records and for
/// FASTQ records truncated by EOF mid-quality (which are recovered as FASTA).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastxRecord {
    pub name: String,
    pub seq: Vec<u8>,
    pub qual: Option<Vec<u8>>,
}

/// Pull parser over a byte stream of concatenated FASTA and/or FASTQ records.
///
/// The framing rules follow the classic readfq loop: a record starts at a
/// line whose first byte is `>` or `@`; the name is the first
/// whitespace-delimited token after the prefix; sequence lines accumulate
/// until the next header-like line or a `+` separator; quality lines after a
/// `+` accumulate until their total length reaches the sequence length.
/// Sequence bytes are passed through verbatim, ambiguity codes included.
pub struct FastxReader<R: BufRead> {
    input: R,
    // Header line buffered for the next record, prefix byte stripped off.
    pending: Option<Vec<u8>>,
    line: Vec<u8>,
    line_no: u64,
}

impl<R: BufRead> FastxReader<R> {
    pub fn new(input: R) -> Self {
        FastxReader {
            input,
            pending: None,
            line: Vec::new(),
            line_no: 0,
        }
    }

    // Reads the next line with the trailing newline (and CR) trimmed.
    // Returns false at EOF.
    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        let n = self.input.read_until(b'\n', &mut self.line)?;
        if n == 0 {
            return Ok(false);
        }
        self.line_no += 1;
        if self.line.last() == Some(&b'\n') {
            self.line.pop();
        }
        if self.line.last() == Some(&b'\r') {
            self.line.pop();
        }
        Ok(true)
    }

    // Scans forward to the next header line. Non-blank data lines seen before
    // a header are a framing violation.
    fn seek_header(&mut self) -> Result<bool> {
        while self.read_line()? {
            match self.line.first() {
                Some(b'>') | Some(b'@') => {
                    self.pending = Some(self.line[1..].to_vec());
                    return Ok(true);
                }
                Some(_) => {
                    return Err(Error::Parse {
                        line: self.line_no,
                        msg: "sequence data before any record header".into(),
                    })
                }
                None => (), // blank line, keep scanning
            }
        }
        Ok(false)
    }

    /// Pulls the next record, or `Ok(None)` at end of input.
    pub fn next_record(&mut self) -> Result<Option<FastxRecord>> {
        if self.pending.is_none() && !self.seek_header()? {
            return Ok(None);
        }
        let header = self.pending.take().unwrap();
        let name = header_name(&header);

        let mut seq: Vec<u8> = Vec::new();
        let mut separator = false;
        while self.read_line()? {
            match self.line.first() {
                Some(b'>') | Some(b'@') => {
                    self.pending = Some(self.line[1..].to_vec());
                    break;
                }
                Some(b'+') => {
                    separator = true;
                    break;
                }
                _ => seq.extend_from_slice(&self.line),
            }
        }
        if !separator {
            // FASTA record, terminated by the next header or EOF.
            return Ok(Some(FastxRecord {
                name,
                seq,
                qual: None,
            }));
        }

        // FASTQ: quality runs until it is at least as long as the sequence.
        // Quality lines may start with '@' or '+', so termination is purely
        // length-driven.
        let mut qual: Vec<u8> = Vec::new();
        while qual.len() < seq.len() {
            if !self.read_line()? {
                // EOF mid-quality: recover the record as FASTA.
                return Ok(Some(FastxRecord {
                    name,
                    seq,
                    qual: None,
                }));
            }
            qual.extend_from_slice(&self.line);
        }
        Ok(Some(FastxRecord {
            name,
            seq,
            qual: Some(qual),
        }))
    }
}

impl<R: BufRead> Iterator for FastxReader<R> {
    type Item = Result<FastxRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

// First whitespace-delimited token of a header line (prefix already removed).
fn header_name(header: &[u8]) -> String {
    let end = memchr::memchr2(b' ', b'\t', header).unwrap_or(header.len());
    String::from_utf8_lossy(&header[..end]).into_owned()
}
