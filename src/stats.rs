use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::path::Path;

use hashbrown::HashMap;
use log::{debug, info};
use regex::Regex;

use crate::error::{open_input, MisaError, Result};

/// Sections of a MISA statistics file. Only one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    None,
    Definement,
    Results,
    Distribution,
    Motifs,
    RepeatTypes,
}

/// Header prefixes that switch the active section, in document order.
const TRIGGERS: [(&str, Section); 5] = [
    ("Definement of microsatellites", Section::Definement),
    ("RESULTS OF MICROSATELLITE SEARCH", Section::Results),
    ("Distribution to different repeat type", Section::Distribution),
    ("Frequency of identified SSR motifs", Section::Motifs),
    ("Frequency of classified repeat types", Section::RepeatTypes),
];

const EXAMINED_LENGTH: &str = "Total size of examined sequences";
const TOTAL_SSRS: &str = "Total number of identified SSRs";
const SSRS_IN_COMPOUND: &str = "Number of SSRs present in compound";

impl Section {
    /// The section a header line switches to. When several prefixes match
    /// the one declared last wins.
    pub fn triggered_by(line: &str) -> Option<Section> {
        TRIGGERS
            .iter()
            .rev()
            .find(|(prefix, _)| line.starts_with(prefix))
            .map(|(_, section)| *section)
    }

    pub fn name(self) -> &'static str {
        TRIGGERS
            .iter()
            .find(|(_, section)| *section == self)
            .map(|(prefix, _)| *prefix)
            .unwrap_or("none")
    }
}

/// Global figures reported in the results section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    /// Total size of examined sequences (bp)
    pub examined_length: u64,
    pub total_ssrs: u64,
    pub ssrs_in_compound: u64,
}

/// Everything read from a MISA statistics file.
#[derive(Debug, Clone, Default)]
pub struct StatisticsSummary {
    /// The threshold line exactly as it appeared
    pub definement_line: String,
    /// `(unit length, minimum number of repeats)` pairs
    pub defined_min_repeats: Vec<(usize, u32)>,
    pub max_unit_length: usize,
    pub abundance_by_unit_length: BTreeMap<usize, u64>,
    /// Longest observed repeat count per motif. A, T, C and G are always present.
    pub longest_by_motif: HashMap<String, u32>,
    pub total_by_motif: HashMap<String, u64>,
    pub total_abundance_by_repeat_type: HashMap<String, u64>,
    pub totals: Totals,
}

impl StatisticsSummary {
    fn empty() -> StatisticsSummary {
        let mut summary = StatisticsSummary::default();
        for base in ["A", "T", "C", "G"] {
            summary.longest_by_motif.insert(base.to_string(), 0);
        }
        summary
    }

    /// Number of SSRs with the given unit length, 0 when not reported.
    pub fn abundance(&self, unit_length: usize) -> u64 {
        self.abundance_by_unit_length
            .get(&unit_length)
            .copied()
            .unwrap_or(0)
    }

    /// Sum of the distribution table over `1..=max_unit_length`.
    pub fn abundance_sum(&self) -> u64 {
        (1..=self.max_unit_length).map(|u| self.abundance(u)).sum()
    }
}

/// Line scanning state machine over a statistics file.
struct StatisticsParser {
    section: Section,
    /// Column labels of the table in the active tabular section
    header: Option<Vec<String>>,
    threshold_token: Regex,
    summary: StatisticsSummary,
    definement_seen: bool,
    examined_length: Option<u64>,
    total_ssrs: Option<u64>,
    ssrs_in_compound: Option<u64>,
}

impl StatisticsParser {
    fn new() -> Result<StatisticsParser> {
        Ok(StatisticsParser {
            section: Section::None,
            header: None,
            threshold_token: Regex::new(r"^\((\d+)/(\d+)\)")?,
            summary: StatisticsSummary::empty(),
            definement_seen: false,
            examined_length: None,
            total_ssrs: None,
            ssrs_in_compound: None,
        })
    }

    fn enter(&mut self, next: Section) {
        debug!("{:?} -> {:?}", self.section, next);
        self.section = next;
        self.header = None;
    }

    fn malformed(&self, line_no: usize, reason: String) -> MisaError {
        MisaError::MalformedSection {
            section: self.section.name(),
            line: line_no,
            reason,
        }
    }

    fn feed(&mut self, line_no: usize, raw: &str) -> Result<()> {
        let line = raw.trim_end_matches(['\r', '\n']);

        if let Some(next) = Section::triggered_by(line) {
            self.enter(next);
            return Ok(());
        }

        match self.section {
            Section::None => Ok(()),
            Section::Definement => self.definement(line_no, line),
            Section::Results => self.results(line_no, line),
            Section::Distribution => self.distribution(line_no, line),
            Section::Motifs => self.motifs(line_no, line),
            Section::RepeatTypes => self.repeat_types(line_no, line),
        }
    }

    fn definement(&mut self, line_no: usize, line: &str) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }
        let mut pairs = Vec::new();
        for token in line.split_whitespace() {
            let caps = self
                .threshold_token
                .captures(token)
                .ok_or_else(|| self.malformed(line_no, format!("bad threshold token '{}'", token)))?;
            let unit = caps[1]
                .parse::<usize>()
                .map_err(|e| self.malformed(line_no, e.to_string()))?;
            let min_repeats = caps[2]
                .parse::<u32>()
                .map_err(|e| self.malformed(line_no, e.to_string()))?;
            pairs.push((unit, min_repeats));
        }
        let (max_unit, _) = *pairs
            .last()
            .ok_or_else(|| self.malformed(line_no, "no threshold pairs".into()))?;

        self.summary.definement_line = line.trim_end().to_string();
        self.summary.defined_min_repeats = pairs;
        self.summary.max_unit_length = max_unit;
        self.definement_seen = true;
        self.enter(Section::None);
        Ok(())
    }

    fn results(&mut self, line_no: usize, line: &str) -> Result<()> {
        let slot = if line.starts_with(EXAMINED_LENGTH) {
            &mut self.examined_length
        } else if line.starts_with(TOTAL_SSRS) {
            &mut self.total_ssrs
        } else if line.starts_with(SSRS_IN_COMPOUND) {
            &mut self.ssrs_in_compound
        } else {
            return Ok(());
        };

        let value = line
            .rsplit_once(':')
            .map(|(_, num)| num.trim().parse::<u64>());
        match value {
            Some(Ok(n)) => {
                *slot = Some(n);
                Ok(())
            }
            Some(Err(e)) => Err(self.malformed(line_no, format!("'{}': {}", line, e))),
            None => Err(self.malformed(line_no, format!("no value in '{}'", line))),
        }
    }

    fn distribution(&mut self, line_no: usize, line: &str) -> Result<()> {
        if !line.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(());
        }
        let parsed = line.trim_end().split_once('\t').and_then(|(unit, count)| {
            Some((unit.trim().parse::<usize>().ok()?, count.trim().parse::<u64>().ok()?))
        });
        match parsed {
            Some((unit, count)) => {
                self.summary.abundance_by_unit_length.insert(unit, count);
                Ok(())
            }
            None => Err(self.malformed(line_no, format!("expected 'unit<TAB>count', got '{}'", line))),
        }
    }

    /// Returns the data cells of a table row, or `None` when the row is the
    /// header, precedes the header, or ends the table.
    fn table_row<'l>(&mut self, line: &'l str) -> Option<Vec<&'l str>> {
        if line.starts_with("Repeats") {
            self.header = Some(line.trim_end().split('\t').map(String::from).collect());
            return None;
        }
        self.header.as_ref()?;
        let line = line.trim_end();
        if line.is_empty() {
            self.enter(Section::None);
            return None;
        }
        Some(line.split('\t').collect())
    }

    fn last_cell_total(&self, line_no: usize, cells: &[&str]) -> Result<u64> {
        match cells {
            [_, .., total] => total
                .trim()
                .parse::<u64>()
                .map_err(|e| self.malformed(line_no, format!("total '{}': {}", total, e))),
            _ => Err(self.malformed(line_no, "row without a total column".into())),
        }
    }

    fn motifs(&mut self, line_no: usize, line: &str) -> Result<()> {
        let Some(cells) = self.table_row(line) else {
            return Ok(());
        };
        let total = self.last_cell_total(line_no, &cells)?;
        let motif = cells[0].trim().to_string();

        let header_len = self.header.as_ref().map(Vec::len).unwrap_or(0);
        // cells line up with the header from the right
        let longest = (1..cells.len() - 1)
            .rev()
            .find(|&j| !cells[j].trim().is_empty())
            .map(|j| {
                let label = (header_len + j)
                    .checked_sub(cells.len())
                    .filter(|&h| h >= 1)
                    .and_then(|h| self.header.as_ref().and_then(|hd| hd.get(h)));
                match label {
                    Some(label) => label.trim().parse::<u32>().map_err(|e| {
                        self.malformed(line_no, format!("repeat label '{}': {}", label, e))
                    }),
                    None => Err(self.malformed(line_no, "row wider than header".into())),
                }
            })
            .transpose()?;

        if let Some(longest) = longest {
            self.summary.longest_by_motif.insert(motif.clone(), longest);
        }
        self.summary.total_by_motif.insert(motif, total);
        Ok(())
    }

    fn repeat_types(&mut self, line_no: usize, line: &str) -> Result<()> {
        let Some(cells) = self.table_row(line) else {
            return Ok(());
        };
        let total = self.last_cell_total(line_no, &cells)?;
        self.summary
            .total_abundance_by_repeat_type
            .insert(cells[0].trim().to_string(), total);
        Ok(())
    }

    fn finish(self) -> Result<StatisticsSummary> {
        if !self.definement_seen {
            return Err(MisaError::MissingSection(Section::Definement.name()));
        }
        let results = Section::Results.name();
        let mut summary = self.summary;
        summary.totals = Totals {
            examined_length: self.examined_length.ok_or(MisaError::MissingSection(results))?,
            total_ssrs: self.total_ssrs.ok_or(MisaError::MissingSection(results))?,
            ssrs_in_compound: self.ssrs_in_compound.unwrap_or_else(|| {
                debug!("no compound SSR count reported, assuming 0");
                0
            }),
        };
        info!(
            "parsed statistics: {} bp examined, {} SSRs, {} motifs, {} repeat types",
            summary.totals.examined_length,
            summary.totals.total_ssrs,
            summary.total_by_motif.len(),
            summary.total_abundance_by_repeat_type.len()
        );
        Ok(summary)
    }
}

/// Parse a MISA statistics file.
pub fn parse_statistics<R: BufRead>(rdr: R) -> Result<StatisticsSummary> {
    let mut parser = StatisticsParser::new()?;
    for (i, line) in rdr.lines().enumerate() {
        parser.feed(i + 1, &line?)?;
    }
    parser.finish()
}

pub fn parse_statistics_from_path<P: AsRef<Path>>(path: P) -> Result<StatisticsSummary> {
    parse_statistics(io::BufReader::new(open_input(path)?))
}
