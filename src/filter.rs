use std::io::Write;
use std::path::PathBuf;

use clap::ValueEnum;
use hashbrown::HashMap;
use log::info;

use crate::analysis::class_name;
use crate::error::Result;
use crate::record::{RepeatRecord, SsrType};
use crate::report::RunInfo;

/// Group holding imperfect repeats when they are requested.
pub const COMBINED: &str = "combined";

/// Perfect unit lengths kept by the filter (Di to Hexa).
const KEPT_UNITS: std::ops::RangeInclusive<usize> = 2..=6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortMode {
    /// Group by motif class
    Motif,
    /// Order by repeat length
    Repeat,
}

impl SortMode {
    fn as_str(self) -> &'static str {
        match self {
            SortMode::Motif => "motif",
            SortMode::Repeat => "repeat",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RepeatFilter {
    pub min_length: u32,
    pub max_length: u32,
    /// Also keep imperfect (`c`) repeats, in the `combined` group
    pub imperfect: bool,
}

/// Records that passed the filter, per group in fixed group order.
#[derive(Debug, Default)]
pub struct FilteredRepeats {
    groups: Vec<(&'static str, Vec<RepeatRecord>)>,
}

impl RepeatFilter {
    fn group_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = KEPT_UNITS.filter_map(class_name).collect();
        if self.imperfect {
            names.push(COMBINED);
        }
        names
    }

    fn group_of(&self, record: &RepeatRecord) -> Option<&'static str> {
        match record.ssr_type {
            SsrType::Perfect(unit) if KEPT_UNITS.contains(&unit) => class_name(unit),
            SsrType::Imperfect if self.imperfect => Some(COMBINED),
            _ => None,
        }
    }

    pub fn apply(&self, records: &[RepeatRecord]) -> FilteredRepeats {
        let mut groups: Vec<(&'static str, Vec<RepeatRecord>)> = self
            .group_names()
            .into_iter()
            .map(|name| (name, Vec::new()))
            .collect();

        for record in records {
            if !(self.min_length..=self.max_length).contains(&record.size) {
                continue;
            }
            let Some(group) = self.group_of(record) else {
                continue;
            };
            if let Some((_, kept)) = groups.iter_mut().find(|(name, _)| *name == group) {
                kept.push(record.clone());
            }
        }

        let filtered = FilteredRepeats { groups };
        info!(
            "{} of {} repeats within {}..={} bp",
            filtered.len(),
            records.len(),
            self.min_length,
            self.max_length
        );
        filtered
    }
}

impl FilteredRepeats {
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, records)| records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn groups(&self) -> impl Iterator<Item = (&'static str, &[RepeatRecord])> {
        self.groups
            .iter()
            .map(|(name, records)| (*name, records.as_slice()))
    }

    pub fn group(&self, name: &str) -> &[RepeatRecord] {
        self.groups()
            .find(|(group, _)| *group == name)
            .map(|(_, records)| records)
            .unwrap_or(&[])
    }

    /// All kept records ordered by repeat length, group order within a length.
    pub fn by_length(&self) -> Vec<&RepeatRecord> {
        let mut all: Vec<&RepeatRecord> = self.groups().flat_map(|(_, r)| r.iter()).collect();
        all.sort_by_key(|record| record.size);
        all
    }

    /// Sequences carrying more than one kept repeat, in order of first appearance.
    pub fn multi_repeat_sequences(&self) -> Vec<(&str, usize)> {
        let mut order: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for (_, records) in self.groups() {
            for record in records {
                let count = counts.entry(record.seq_id.as_str()).or_insert_with(|| {
                    order.push(record.seq_id.as_str());
                    0
                });
                *count += 1;
            }
        }
        order
            .into_iter()
            .map(|id| (id, counts[id]))
            .filter(|(_, count)| *count > 1)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct FilterHeader {
    pub run: RunInfo,
    pub input: PathBuf,
    pub output: PathBuf,
    pub filter: RepeatFilter,
    pub mode: SortMode,
}

pub fn write_filtered<W: Write>(
    out: &mut W,
    header: &FilterHeader,
    filtered: &FilteredRepeats,
) -> Result<()> {
    let run = &header.run;
    writeln!(out, "{}", run.program_line())?;
    writeln!(out, "Date: {} Execution time: {:.2} sec", run.timestamp, run.elapsed_secs)?;
    writeln!(out, "Input file of sequences: {}", header.input.display())?;
    writeln!(
        out,
        "Repeat length min: {}, max: {}, sort sequence by: {} length",
        header.filter.min_length,
        header.filter.max_length,
        header.mode.as_str()
    )?;
    writeln!(
        out,
        "Output: {} Execution time: {:.2} sec",
        header.output.display(),
        run.elapsed_secs
    )?;
    writeln!(out, "{}", "=".repeat(70))?;

    match header.mode {
        SortMode::Motif => {
            for (group, records) in filtered.groups() {
                writeln!(out, "----- {}", group)?;
                for record in records {
                    writeln!(out, "{:<12} {}: {}", record.ssr, record.size, record.seq_id)?;
                }
            }
        }
        SortMode::Repeat => {
            for record in filtered.by_length() {
                writeln!(out, "{}", record)?;
            }
        }
    }

    let multi = filtered.multi_repeat_sequences();
    if !multi.is_empty() {
        writeln!(out, "\n----- Sequences with multiple repeats -----")?;
        for (seq_id, count) in multi {
            writeln!(out, "{}: {}", count, seq_id)?;
        }
    }
    Ok(())
}
