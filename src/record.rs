use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord};
use log::debug;

use crate::error::{open_input, MisaError, Result};

/// Composition class of a MISA repeat, from the `SSR type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SsrType {
    /// `p<N>`: uninterrupted repeat of an N-base unit
    Perfect(usize),
    /// `c`
    Imperfect,
    /// `c*`
    Compound,
}

impl FromStr for SsrType {
    type Err = String;

    fn from_str(code: &str) -> std::result::Result<Self, Self::Err> {
        match code {
            "c" => Ok(SsrType::Imperfect),
            "c*" => Ok(SsrType::Compound),
            _ => match code.strip_prefix('p').map(str::parse::<usize>) {
                Some(Ok(unit)) if unit > 0 => Ok(SsrType::Perfect(unit)),
                _ => Err(format!("unknown SSR type '{}'", code)),
            },
        }
    }
}

impl fmt::Display for SsrType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SsrType::Perfect(unit) => write!(f, "p{}", unit),
            SsrType::Imperfect => write!(f, "c"),
            SsrType::Compound => write!(f, "c*"),
        }
    }
}

/// One row of a MISA file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatRecord {
    /// The name of the fasta record
    pub seq_id: String,
    /// Running number of the repeat within its sequence
    pub repeat_index: u32,
    pub ssr_type: SsrType,
    /// The repeat as written by MISA, e.g. `(AG)15`
    pub ssr: String,
    /// Repeat length in bp
    pub size: u32,
    pub start: u64,
    pub end: u64,
}

fn parse_column<T>(name: &str, value: &str, line: u64) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| MisaError::MalformedRecord {
            line,
            reason: format!("{} '{}': {}", name, value, e),
        })
}

impl RepeatRecord {
    /// Build a record from the seven MISA columns. `line` is only used for
    /// the error message.
    pub fn from_fields<'a, I>(fields: I, line: u64) -> Result<RepeatRecord>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let fields: Vec<&str> = fields.into_iter().collect();
        let malformed = |reason: String| MisaError::MalformedRecord { line, reason };

        if let &[seq_id, repeat_index, ssr_type, ssr, size, start, end] = &fields[..] {
            let record = RepeatRecord {
                seq_id: seq_id.to_string(),
                repeat_index: parse_column("SSR nr.", repeat_index, line)?,
                ssr_type: ssr_type.trim().parse().map_err(malformed)?,
                ssr: ssr.trim().to_string(),
                size: parse_column("size", size, line)?,
                start: parse_column("start", start, line)?,
                end: parse_column("end", end, line)?,
            };
            if record.end < record.start {
                return Err(malformed(format!(
                    "end {} lies before start {}",
                    record.end, record.start
                )));
            }
            Ok(record)
        } else {
            Err(malformed(format!(
                "expected 7 tab separated columns, found {}",
                fields.len()
            )))
        }
    }

    /// Parse one tab separated line.
    pub fn parse_line(line: &str, line_no: u64) -> Result<RepeatRecord> {
        RepeatRecord::from_fields(line.trim_end_matches(['\r', '\n']).split('\t'), line_no)
    }

    /// The repeated unit: the text inside the first pair of parentheses,
    /// or the whole SSR string when there are none.
    pub fn motif_unit(&self) -> &str {
        let open = self.ssr.find('(');
        let close = self.ssr.find(')');
        match (open, close) {
            (Some(o), Some(c)) if o < c => &self.ssr[o + 1..c],
            _ => &self.ssr,
        }
    }

    pub fn unit_length(&self) -> usize {
        match self.ssr_type {
            SsrType::Perfect(unit) => unit,
            SsrType::Imperfect | SsrType::Compound => self.motif_unit().len(),
        }
    }
}

impl fmt::Display for RepeatRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.seq_id, self.repeat_index, self.ssr_type, self.ssr, self.size, self.start, self.end
        )
    }
}

fn is_header(record: &StringRecord) -> bool {
    record.get(0).map(|f| f.trim() == "ID").unwrap_or(false)
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|f| f.trim().is_empty())
}

/// Read every record of a MISA file, skipping its header row and blank lines.
pub fn read_records<R: io::Read>(rdr: R) -> Result<Vec<RepeatRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(rdr);

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result?;
        if is_blank(&row) || is_header(&row) {
            continue;
        }
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        records.push(RepeatRecord::from_fields(row.iter(), line)?);
    }
    debug!("read {} repeat records", records.len());
    Ok(records)
}

pub fn read_records_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<RepeatRecord>> {
    read_records(open_input(path)?)
}
