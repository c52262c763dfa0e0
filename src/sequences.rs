use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use ahash::AHashSet;
use hashbrown::HashMap;
use log::{debug, info, warn};
use needletail::parser::{write_fasta, LineEnding};

use crate::error::{open_input, read_input, MisaError, Result};
use crate::record::RepeatRecord;
use crate::report::RunInfo;

const INDEX_END: &str = "end";

/// Read the repeat rows of a filtered list: the tab separated lines after
/// the `=====` rule, up to the first blank line. Only the first repeat of a
/// sequence is kept; with a border, repeats starting before it are dropped.
pub fn read_repeat_list<R: BufRead>(rdr: R, border: Option<u64>) -> Result<Vec<RepeatRecord>> {
    let mut repeats = Vec::new();
    let mut seen: AHashSet<String> = AHashSet::new();
    let mut started = false;

    for (i, line) in rdr.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if !started {
            started = line.starts_with("=====");
            continue;
        }
        if line.is_empty() {
            break;
        }
        let record = RepeatRecord::parse_line(line, i as u64 + 1)?;
        if !seen.insert(record.seq_id.clone()) {
            continue;
        }
        match border {
            Some(b) if record.start < b => {
                debug!("{} starts at {}, inside the {} bp border", record.seq_id, record.start, b)
            }
            _ => repeats.push(record),
        }
    }
    info!("{} repeats listed for extraction", repeats.len());
    Ok(repeats)
}

/// A FASTA file held as lines.
#[derive(Debug, Default)]
pub struct SequenceDb {
    lines: Vec<String>,
}

impl SequenceDb {
    pub fn from_text(text: &str) -> SequenceDb {
        SequenceDb {
            lines: text.lines().map(String::from).collect(),
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<SequenceDb> {
        Ok(SequenceDb::from_text(&read_input(path)?))
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Join the lines in `range`, each trimmed.
    fn body(&self, range: Range<usize>) -> String {
        self.lines
            .get(range)
            .unwrap_or(&[])
            .iter()
            .map(|l| l.trim_end())
            .collect()
    }
}

/// Header positions of a FASTA file, as 1-based line numbers.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SequenceIndex {
    entries: Vec<(String, usize)>,
    /// One past the last line of the file
    end: usize,
    lookup: HashMap<String, usize>,
}

impl SequenceIndex {
    fn from_entries(entries: Vec<(String, usize)>, end: usize) -> SequenceIndex {
        let mut lookup = HashMap::with_capacity(entries.len());
        for (pos, (id, _)) in entries.iter().enumerate() {
            lookup.entry(id.clone()).or_insert(pos);
        }
        SequenceIndex {
            entries,
            end,
            lookup,
        }
    }

    /// Index every header line. Spaces in ids become underscores, as in MISA output.
    pub fn build(db: &SequenceDb) -> SequenceIndex {
        let entries = db
            .lines
            .iter()
            .enumerate()
            .filter_map(|(i, line)| {
                line.trim_end()
                    .strip_prefix('>')
                    .map(|id| (id.replace(' ', "_"), i + 1))
            })
            .collect();
        SequenceIndex::from_entries(entries, db.line_count() + 1)
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (id, line) in &self.entries {
            writeln!(out, "{}\t{}", id, line)?;
        }
        writeln!(out, "{}\t{}", INDEX_END, self.end)
    }

    pub fn read<R: BufRead>(rdr: R) -> Result<SequenceIndex> {
        let mut entries = Vec::new();
        for (i, line) in rdr.lines().enumerate() {
            let line = line?;
            let parsed = line
                .trim_end()
                .split_once('\t')
                .and_then(|(id, n)| Some((id, n.trim().parse::<usize>().ok()?)));
            let Some((id, n)) = parsed else {
                return Err(MisaError::MalformedSection {
                    section: "sequence index",
                    line: i + 1,
                    reason: format!("expected 'id<TAB>line', got '{}'", line),
                });
            };
            if id == INDEX_END {
                return Ok(SequenceIndex::from_entries(entries, n));
            }
            entries.push((id.to_string(), n));
        }
        Err(MisaError::MissingSection("sequence index end"))
    }

    /// Load the index at `path`, or build it from `db` and save it there.
    /// An existing file is reused as is.
    pub fn load_or_build<P: AsRef<Path>>(path: P, db: &SequenceDb) -> Result<SequenceIndex> {
        let path = path.as_ref();
        if path.is_file() {
            info!("reusing sequence index {:?}", path);
            return SequenceIndex::read(io::BufReader::new(open_input(path)?));
        }
        let index = SequenceIndex::build(db);
        let mut out = BufWriter::new(File::create(path)?);
        index.write(&mut out)?;
        out.flush()?;
        info!("wrote sequence index {:?} ({} sequences)", path, index.len());
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 0-based range of the body lines of `id`.
    pub fn body_range(&self, id: &str) -> Option<Range<usize>> {
        let pos = *self.lookup.get(id)?;
        let start = self.entries[pos].1;
        let next = self.entries.get(pos + 1).map(|(_, n)| *n).unwrap_or(self.end);
        Some(start..next.saturating_sub(1).max(start))
    }
}

fn is_ambiguous(region: &[u8]) -> bool {
    region.iter().any(|b| matches!(b, b'N' | b'n'))
}

/// Both flanks of the repeat are `border` bp long and free of N.
/// Positions are counted in bytes of the sequence body.
pub fn has_clean_border(sequence: &str, record: &RepeatRecord, border: u64) -> bool {
    let bases = sequence.as_bytes();
    let len = bases.len() as u64;
    let (start, end) = (record.start, record.end);
    if start == 0 || start - 1 > len || end > len {
        return false;
    }
    let up_from = start.saturating_sub(border + 1);
    if is_ambiguous(&bases[up_from as usize..(start - 1) as usize]) {
        return false;
    }
    if len - end < border {
        return false;
    }
    !is_ambiguous(&bases[end as usize..(end + border) as usize])
}

#[derive(Debug, Default)]
pub struct Extraction {
    /// `(id, sequence)` in list order
    pub sequences: Vec<(String, String)>,
    /// Repeats whose sequence passed the border check
    pub with_border: Vec<RepeatRecord>,
    /// Listed ids not found in the index
    pub missing: Vec<String>,
}

pub fn extract(
    repeats: &[RepeatRecord],
    db: &SequenceDb,
    index: &SequenceIndex,
    border: Option<u64>,
) -> Extraction {
    let mut extraction = Extraction::default();
    for record in repeats {
        let Some(range) = index.body_range(&record.seq_id) else {
            warn!("{} is not in the sequence index", record.seq_id);
            extraction.missing.push(record.seq_id.clone());
            continue;
        };
        let sequence = db.body(range);
        match border {
            None => {}
            Some(b) if has_clean_border(&sequence, record, b) => {
                extraction.with_border.push(record.clone());
            }
            Some(_) => continue,
        }
        extraction.sequences.push((record.seq_id.clone(), sequence));
    }
    info!(
        "extracted {} of {} sequences",
        extraction.sequences.len(),
        repeats.len()
    );
    extraction
}

pub fn write_sequences<W: Write>(out: &mut W, extraction: &Extraction) -> Result<()> {
    for (id, sequence) in &extraction.sequences {
        write_fasta(id.as_bytes(), sequence.as_bytes(), out, LineEnding::Unix)?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ExtractionHeader {
    pub run: RunInfo,
    pub list_file: PathBuf,
    pub db_file: PathBuf,
    pub border: Option<u64>,
    pub fasta_output: PathBuf,
    pub border_output: PathBuf,
}

/// The list of repeats with a clean border.
pub fn write_border_list<W: Write>(
    out: &mut W,
    header: &ExtractionHeader,
    extraction: &Extraction,
) -> Result<()> {
    let run = &header.run;
    writeln!(out, "{}", run.program_line())?;
    writeln!(out, "Date: {} , duration: {:.2} sec", run.timestamp, run.elapsed_secs)?;
    writeln!(out, "Repeats file: {}", header.list_file.display())?;
    writeln!(out, "Db file: {}", header.db_file.display())?;
    writeln!(
        out,
        "{} repeats with border ({} bp)",
        extraction.with_border.len(),
        header.border.unwrap_or(0)
    )?;
    writeln!(out, "{}", "=".repeat(80))?;
    for record in &extraction.with_border {
        writeln!(out, "{}", record)?;
    }
    Ok(())
}

pub fn write_info<W: Write>(
    out: &mut W,
    header: &ExtractionHeader,
    db: &SequenceDb,
    extraction: &Extraction,
) -> Result<()> {
    let run = &header.run;
    writeln!(out, "{}", run.program_line())?;
    writeln!(out, "Date: {}, duration: {:.2} sec", run.timestamp, run.elapsed_secs)?;
    writeln!(
        out,
        "Input, list of sequences and repeats from: {}",
        header.list_file.display()
    )?;
    writeln!(out, "Input, db file with sequences FASTA: {}", header.db_file.display())?;
    writeln!(out, "Num lines of sequence in db file: {}", db.line_count())?;
    if let Some(b) = header.border {
        writeln!(out, "Mandatory border of bp: {}", b)?;
    }
    writeln!(out, "Found {} repeats", extraction.sequences.len())?;
    if !extraction.missing.is_empty() {
        writeln!(out, "Not in db file: {}", extraction.missing.join(", "))?;
    }
    if header.border.is_some() {
        writeln!(
            out,
            "Output, accessions with border in FASTA format: {}",
            header.fasta_output.display()
        )?;
        writeln!(
            out,
            "Output, list of accessions with border: {}",
            header.border_output.display()
        )?;
    } else {
        writeln!(
            out,
            "Output, accessions in FASTA format: {}",
            header.fasta_output.display()
        )?;
    }
    Ok(())
}
