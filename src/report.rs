use std::io::{self, Write};
use std::path::PathBuf;

use crate::analysis::{class_name, Analysis};

/// Percentage a repeat type must exceed to be listed for Tri and longer units.
pub const DISPLAY_THRESHOLD: f64 = 1.0;

/// Marker the longest-motif locator searches for.
pub const LONGEST_MARKER: &str = " Longest motives ";

/// Identity of a run, written at the top of every output file.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub program: String,
    pub version: String,
    /// Local time the report was written, already formatted
    pub timestamp: String,
    /// Wall clock seconds spent before writing
    pub elapsed_secs: f64,
}

impl RunInfo {
    pub fn program_line(&self) -> String {
        format!("Program: {} {}", self.program, self.version)
    }
}

/// Header fields of the statistics report.
#[derive(Debug, Clone)]
pub struct AnalysisHeader {
    pub run: RunInfo,
    pub statistics_file: PathBuf,
    pub misa_file: PathBuf,
}

fn percent_of(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

/// Write the statistics analysis report.
pub fn write_analysis<W: Write>(
    out: &mut W,
    header: &AnalysisHeader,
    analysis: &Analysis,
) -> io::Result<()> {
    let summary = &analysis.summary;
    let max_unit = summary.max_unit_length.min(10);

    writeln!(out, "{}", header.run.program_line())?;
    writeln!(out, "Statistic file analysed: {}", header.statistics_file.display())?;
    writeln!(
        out,
        "Definement of microsatellites (MISA): {}",
        summary.definement_line
    )?;
    writeln!(out, "Misa file analysed: {}", header.misa_file.display())?;
    writeln!(
        out,
        "Date: {} Execution time: {:.2} sec",
        header.run.timestamp, header.run.elapsed_secs
    )?;
    writeln!(
        out,
        "Note: Numbers label with '(MISA)' are not calculated but read from input"
    )?;
    if analysis.composition.is_some() {
        writeln!(out, "Option repeatclasses: true")?;
    }
    writeln!(out, "{}\n", "=".repeat(50))?;

    writeln!(
        out,
        "Total length of Sequence examined (bp) (MISA): {}",
        summary.totals.examined_length
    )?;
    writeln!(out, "Total number of SSR (MISA) : {:>8}", summary.totals.total_ssrs)?;
    writeln!(out, "Total length of SSR (bp)   : {:>8}", analysis.total_ssr_length)?;
    writeln!(out, "Relative abundance (SSR/Mb): {:11.2}", analysis.relative_abundance)?;
    writeln!(out, "Relative density (bp/Mb)   : {:11.2}", analysis.relative_density)?;

    // distribution of motif length
    writeln!(out, "\n====== Distribution of motif length  =========")?;
    writeln!(
        out,
        "{:<5} {:<4}%   {:6}  {:>7}",
        "Motif", "", "Number", "Length[bp]"
    )?;
    writeln!(out, "{}", "-".repeat(40))?;
    for unit in 1..=max_unit {
        let abundance = summary.abundance(unit);
        writeln!(
            out,
            "{:<5}: {:4.1}% ({:>6})    {:>7}",
            class_name(unit).unwrap_or(""),
            percent_of(abundance, summary.totals.total_ssrs),
            abundance,
            unit as u64 * abundance
        )?;
    }
    writeln!(out, "{}", "-".repeat(40))?;
    writeln!(
        out,
        "{:<5} {:<5}   {:6}     {:>7}",
        "Total", "", analysis.abundance_sum, analysis.total_ssr_length
    )?;
    if !analysis.consistent {
        writeln!(out, "ERROR, total number is NOT consistent")?;
    }

    if let Some(counts) = &analysis.composition {
        let compound = summary.totals.ssrs_in_compound;
        writeln!(out, "\n-------- Number of SSRs by repeat class (experimental) ------")?;
        writeln!(out, "Perfect SSRs: (p)                : {:>8}", counts.perfect)?;
        writeln!(out, "Imperfect SSRs (c)               : {:>8}", counts.imperfect)?;
        writeln!(out, "Compound SSRs (c*)               : {:>8}", counts.compound)?;
        writeln!(out, "                        Subtotal : {:>8}", counts.subtotal())?;
        writeln!(out, "SSRs in compound formation (MISA): {:>8}", compound)?;
        writeln!(
            out,
            "                           Total : {:>8}",
            counts.subtotal() + compound
        )?;
    }

    write_longest(out, analysis, max_unit)?;
    write_repeat_types(out, analysis, max_unit)?;
    Ok(())
}

fn write_longest<W: Write>(out: &mut W, analysis: &Analysis, max_unit: usize) -> io::Result<()> {
    let longest = &analysis.summary.longest_by_motif;
    let base = |b: &str| longest.get(b).copied().unwrap_or(0);

    writeln!(out, "\n========{}=======", LONGEST_MARKER)?;
    writeln!(
        out,
        "Mono  A: {}, T: {}, C: {}, G: {}",
        base("A"),
        base("T"),
        base("C"),
        base("G")
    )?;
    for unit in 2..=max_unit {
        let motifs = analysis
            .longest_motifs_per_class
            .get(&unit)
            .map(|set| set.iter().map(String::as_str).collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        writeln!(
            out,
            "{:<5} {:>5}: {}",
            class_name(unit).unwrap_or(""),
            analysis.longest_per_class.get(&unit).copied().unwrap_or(0),
            motifs
        )?;
    }
    // the blank line closes the block for the locator
    writeln!(out)?;
    Ok(())
}

fn write_repeat_types<W: Write>(
    out: &mut W,
    analysis: &Analysis,
    max_unit: usize,
) -> io::Result<()> {
    writeln!(out, "======= Total abundance of repeat types =======")?;
    for unit in 1..=max_unit {
        writeln!(out, "---------  {}-nucleotides", class_name(unit).unwrap_or(""))?;
        let Some(shares) = analysis.repeat_types.get(&unit) else {
            continue;
        };
        for share in shares {
            if unit <= 2 || share.percent > DISPLAY_THRESHOLD {
                writeln!(
                    out,
                    "{}: {:5.1}% ({:>5})",
                    share.label, share.percent, share.count
                )?;
            }
        }
    }
    Ok(())
}
