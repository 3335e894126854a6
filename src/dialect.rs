//! CSV dialect guessing for the link export.
//!
//! Database exports of `categorylinks` come in slightly different flavours
//! (comma or tab separated, single or double quoted). The dialect is guessed from
//! the head of the file instead of being hard-coded. Backslash is always treated
//! as the escape character, matching MySQL-style dumps.

use crate::config::{DELIMITER_CANDIDATES, READ_BUFFER_SIZE, SNIFF_SAMPLE_BYTES};
use crate::error::ExtractError;
use anyhow::{Context, Result};
use memchr::memchr_iter;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

const QUOTE_CANDIDATES: &[u8] = b"\"'";
const ESCAPE: u8 = b'\\';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    pub double_quote: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            double_quote: true,
        }
    }
}

impl Dialect {
    pub fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .escape(Some(ESCAPE))
            .double_quote(self.double_quote);
        builder
    }
}

/// Guesses the dialect of a CSV sample.
///
/// Quoting is looked at first: a quote character that opens fields tells us the
/// delimiter as well (it is whatever precedes the opening quotes). Unquoted samples
/// fall back to picking the candidate delimiter that occurs the same number of
/// times on the most lines.
pub fn sniff(sample: &[u8]) -> Result<Dialect, ExtractError> {
    let lines = complete_lines(sample);
    if lines.is_empty() {
        return Err(ExtractError::malformed_row(0, "empty sample, cannot guess dialect"));
    }

    let (quote, quoted_delimiter) = guess_quote(sample);
    let delimiter = match quoted_delimiter {
        Some(d) => d,
        None => guess_delimiter(&lines).ok_or_else(|| {
            ExtractError::malformed_row(0, "could not determine delimiter")
        })?,
    };

    let dialect = Dialect {
        delimiter,
        quote,
        double_quote: uses_doubled_quotes(sample, quote),
    };
    debug!(
        delimiter = %(dialect.delimiter as char),
        quote = %(dialect.quote as char),
        double_quote = dialect.double_quote,
        "Guessed CSV dialect"
    );
    Ok(dialect)
}

/// Opens `path` as a CSV reader using the dialect sniffed from its first bytes.
pub fn open_sniffed(path: &Path) -> Result<csv::Reader<BufReader<File>>> {
    let mut sample = Vec::with_capacity(SNIFF_SAMPLE_BYTES);
    File::open(path)
        .with_context(|| format!("Failed to open link export: {}", path.display()))?
        .take(SNIFF_SAMPLE_BYTES as u64)
        .read_to_end(&mut sample)
        .with_context(|| format!("Failed to read sample from: {}", path.display()))?;

    let dialect = sniff(&sample).unwrap_or_else(|e| {
        warn!(error = %e, "Dialect detection failed, assuming comma separated");
        Dialect::default()
    });

    let file = File::open(path)
        .with_context(|| format!("Failed to reopen link export: {}", path.display()))?;
    Ok(dialect
        .reader_builder()
        .from_reader(BufReader::with_capacity(READ_BUFFER_SIZE, file)))
}

/// Decodes single-byte (Latin-1) text. Every byte maps to the code point of the same value.
pub fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Splits on newlines, dropping a trailing line cut off by the sample boundary.
fn complete_lines(sample: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    for end in memchr_iter(b'\n', sample) {
        let line = &sample[start..end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if !line.is_empty() {
            lines.push(line);
        }
        start = end + 1;
    }
    // No newline at all: the whole sample is the only evidence we have.
    if lines.is_empty() && start < sample.len() {
        lines.push(&sample[start..]);
    }
    lines
}

fn is_delimiter(b: u8) -> bool {
    DELIMITER_CANDIDATES.contains(&b)
}

/// Counts opening quotes (quote at line start or right after a delimiter) per
/// candidate and returns the winner with the delimiter seen most often before it.
fn guess_quote(sample: &[u8]) -> (u8, Option<u8>) {
    let mut best: Option<(usize, u8, [usize; 256])> = None;

    for &q in QUOTE_CANDIDATES {
        let mut opens = 0;
        let mut preceding = [0usize; 256];
        for (i, &b) in sample.iter().enumerate() {
            if b != q {
                continue;
            }
            match i.checked_sub(1).map(|p| sample[p]) {
                None | Some(b'\n') => opens += 1,
                Some(prev) if is_delimiter(prev) => {
                    opens += 1;
                    preceding[prev as usize] += 1;
                }
                _ => {}
            }
        }
        if opens > 0 && best.as_ref().map_or(true, |(n, _, _)| opens > *n) {
            best = Some((opens, q, preceding));
        }
    }

    match best {
        Some((_, q, preceding)) => {
            let delimiter = DELIMITER_CANDIDATES
                .iter()
                .copied()
                .filter(|&d| preceding[d as usize] > 0)
                .max_by_key(|&d| (preceding[d as usize], std::cmp::Reverse(rank(d))));
            (q, delimiter)
        }
        None => (b'"', None),
    }
}

fn rank(d: u8) -> usize {
    DELIMITER_CANDIDATES
        .iter()
        .position(|&c| c == d)
        .unwrap_or(usize::MAX)
}

/// Picks the candidate whose per-line count is most consistent.
fn guess_delimiter(lines: &[&[u8]]) -> Option<u8> {
    let mut best: Option<(usize, usize, u8)> = None;

    for &d in DELIMITER_CANDIDATES {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| line.iter().filter(|&&b| b == d).count())
            .collect();

        let mut frequency: Vec<(usize, usize)> = Vec::new();
        for &c in &counts {
            match frequency.iter_mut().find(|(value, _)| *value == c) {
                Some((_, n)) => *n += 1,
                None => frequency.push((c, 1)),
            }
        }
        let Some(&(mode, agreeing)) = frequency
            .iter()
            .filter(|(value, _)| *value > 0)
            .max_by_key(|(value, n)| (*n, *value))
        else {
            continue;
        };

        if best.map_or(true, |(a, m, _)| (agreeing, mode) > (a, m)) {
            best = Some((agreeing, mode, d));
        }
    }

    best.map(|(_, _, d)| d)
}

/// Doubled quotes are assumed unless the sample shows backslash-escaped quotes
/// and never a doubled quote inside a field.
fn uses_doubled_quotes(sample: &[u8], quote: u8) -> bool {
    let escaped = sample.windows(2).any(|w| w[0] == ESCAPE && w[1] == quote);
    if !escaped {
        return true;
    }
    sample.windows(4).any(|w| {
        w[1] == quote && w[2] == quote && !is_boundary(w[0]) && !is_boundary(w[3])
    })
}

fn is_boundary(b: u8) -> bool {
    b == b'\n' || b == b'\r' || is_delimiter(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_double_quoted_commas() {
        let sample = b"\"1\",\"14\",\"Foo_bar\"\n\"2\",\"0\",\"Baz, qux\"\n";
        let dialect = sniff(sample).unwrap();
        assert_eq!(dialect.delimiter, b',');
        assert_eq!(dialect.quote, b'"');
    }

    #[test]
    fn sniff_single_quoted_tabs() {
        let sample = b"'1'\t'14'\t'Foo'\n'2'\t'0'\t'Bar'\n";
        let dialect = sniff(sample).unwrap();
        assert_eq!(dialect.delimiter, b'\t');
        assert_eq!(dialect.quote, b'\'');
    }

    #[test]
    fn sniff_unquoted_semicolons() {
        let sample = b"1;14;Foo;x\n2;0;Bar;y\n3;0;Baz;z\n";
        let dialect = sniff(sample).unwrap();
        assert_eq!(dialect.delimiter, b';');
        assert_eq!(dialect.quote, b'"');
    }

    #[test]
    fn sniff_ignores_truncated_last_line() {
        let sample = b"1,14,Foo\n2,0,Bar\n3;0;Ba";
        assert_eq!(sniff(sample).unwrap().delimiter, b',');
    }

    #[test]
    fn sniff_rejects_featureless_sample() {
        assert!(matches!(
            sniff(b"justoneword\n"),
            Err(ExtractError::MalformedRow { .. })
        ));
        assert!(sniff(b"").is_err());
    }

    #[test]
    fn backslash_escapes_disable_doubled_quotes() {
        let sample = b"\"1\",\"O\\\"Brien\"\n\"2\",\"x\"\n";
        assert!(!sniff(sample).unwrap().double_quote);
    }

    #[test]
    fn latin1_maps_high_bytes() {
        assert_eq!(latin1(b"Caf\xe9"), "Café");
        assert_eq!(latin1(b"plain"), "plain");
    }

    #[test]
    fn reader_handles_backslash_escape() {
        let dialect = Dialect {
            double_quote: false,
            ..Dialect::default()
        };
        let data = b"\"a\\\"b\",\"c\"\n";
        let mut reader = dialect.reader_builder().from_reader(&data[..]);
        let record = reader.byte_records().next().unwrap().unwrap();
        assert_eq!(&record[0], b"a\"b");
        assert_eq!(&record[1], b"c");
    }
}
