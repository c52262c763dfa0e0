use std::io::{BufRead, Write};
use std::path::PathBuf;

use ahash::AHashSet;
use hashbrown::HashMap;
use log::{debug, info};

use crate::analysis::{class_name, CLASS_NAMES};
use crate::error::{MisaError, Result};
use crate::record::{RepeatRecord, SsrType};
use crate::report::{RunInfo, LONGEST_MARKER};

/// SSR strings, e.g. `(AG)15`, that reach the longest length of their class.
#[derive(Debug, Default)]
pub struct LongestRepeats {
    by_class: HashMap<&'static str, AHashSet<String>>,
}

fn repeat_name(motif: &str, count: &str) -> String {
    format!("({}){}", motif, count)
}

impl LongestRepeats {
    /// Read the longest motives block of an analysis report.
    pub fn from_report<R: BufRead>(rdr: R) -> Result<LongestRepeats> {
        let mut lines = Vec::new();
        let mut started = false;
        for line in rdr.lines() {
            let line = line?;
            let line = line.trim_end();
            if !started {
                started = line.contains(LONGEST_MARKER);
            } else if line.is_empty() {
                break;
            } else {
                lines.push(line.to_string());
            }
        }
        if !started {
            return Err(MisaError::MissingSection("Longest motives"));
        }

        let mut longest = LongestRepeats::default();
        for (i, line) in lines.iter().enumerate() {
            longest.add_line(i + 1, line)?;
        }
        Ok(longest)
    }

    fn add_line(&mut self, line_no: usize, line: &str) -> Result<()> {
        let malformed = |reason: &str| MisaError::MalformedSection {
            section: "Longest motives",
            line: line_no,
            reason: format!("{} in '{}'", reason, line),
        };

        if let Some(bases) = line.strip_prefix("Mono") {
            // Mono  A: 47, T: 43, C: 0, G: 10
            let mut names = AHashSet::new();
            for entry in bases.split(',') {
                let (base, count) = entry
                    .split_once(':')
                    .ok_or_else(|| malformed("expected 'base: count'"))?;
                let count = count.trim();
                if count != "0" {
                    names.insert(repeat_name(base.trim(), count));
                }
            }
            self.by_class.insert("Mono", names);
            return Ok(());
        }

        // Tri     16: AGA, ATA, ATG
        let (class_len, motifs) = line
            .split_once(':')
            .ok_or_else(|| malformed("expected 'class length: motifs'"))?;
        let mut fields = class_len.split_whitespace();
        let (Some(class), Some(count), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(malformed("expected 'class length'"));
        };
        let Some(class) = CLASS_NAMES.iter().copied().find(|name| *name == class) else {
            return Err(malformed("unknown class"));
        };
        let names = motifs
            .split(',')
            .map(str::trim)
            .filter(|motif| !motif.is_empty())
            .map(|motif| repeat_name(motif, count))
            .collect();
        self.by_class.insert(class, names);
        Ok(())
    }

    pub fn contains(&self, class: &str, ssr: &str) -> bool {
        self.by_class
            .get(class)
            .map(|names| names.contains(ssr))
            .unwrap_or(false)
    }

    /// Perfect records whose SSR is one of the longest of its class, grouped
    /// by class in Mono..Deca order. Classes without hits are left out.
    pub fn locate<'r>(&self, records: &'r [RepeatRecord]) -> Vec<(&'static str, Vec<&'r RepeatRecord>)> {
        let mut grouped: HashMap<&'static str, Vec<&'r RepeatRecord>> = HashMap::new();
        for record in records {
            let SsrType::Perfect(unit) = record.ssr_type else {
                continue;
            };
            let Some(class) = class_name(unit) else {
                debug!("no class for unit length {} of {}", unit, record.ssr);
                continue;
            };
            if self.contains(class, &record.ssr) {
                grouped.entry(class).or_default().push(record);
            }
        }
        let located: Vec<_> = CLASS_NAMES
            .iter()
            .filter_map(|class| grouped.remove(class).map(|hits| (*class, hits)))
            .collect();
        info!(
            "{} sequences carry a longest repeat",
            located.iter().map(|(_, hits)| hits.len()).sum::<usize>()
        );
        located
    }
}

#[derive(Debug, Clone)]
pub struct LongestHeader {
    pub run: RunInfo,
    pub analysis_file: PathBuf,
    pub misa_file: PathBuf,
    pub output: PathBuf,
}

pub fn write_longest<W: Write>(
    out: &mut W,
    header: &LongestHeader,
    located: &[(&'static str, Vec<&RepeatRecord>)],
) -> Result<()> {
    let run = &header.run;
    writeln!(out, "{}", run.program_line())?;
    writeln!(out, "Date: {} Execution time: {:.2} sec", run.timestamp, run.elapsed_secs)?;
    writeln!(out, "Input file of repeat analysis: {}", header.analysis_file.display())?;
    writeln!(out, "Input file of sequences: {}", header.misa_file.display())?;
    writeln!(out, "Output: {}", header.output.display())?;
    writeln!(out, "{}", "=".repeat(50))?;
    for (class, records) in located {
        writeln!(out, "----- {}", class)?;
        for record in records {
            writeln!(out, "{} {}: {}", record.ssr, record.size, record.seq_id)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analysis;
    use crate::record::read_records;
    use crate::report::{write_analysis, AnalysisHeader};
    use crate::stats::parse_statistics;
    use crate::stats::tests::STATISTICS;
    use std::io::Cursor;

    const REPORT: &str = "\
Relative density (bp/Mb)   :       36.00

======== Longest motives =======
Mono  A: 11, T: 10, C: 0, G: 10
Di        8: AG, CT
Tri       7: AAG
Penta     0:

======= Total abundance of repeat types =======
Hexa      5: AAAAAG
";

    const MISA: &str = "\
s1\t1\tp1\t(A)11\t11\t1\t11
s1\t2\tp1\t(C)0\t0\t20\t20
s2\t1\tp2\t(AG)8\t16\t5\t20
s3\t1\tp2\t(AG)7\t14\t5\t18
s3\t2\tp2\t(CT)8\t16\t40\t55
s4\t1\tp3\t(AAG)7\t21\t1\t21
s4\t2\tc\t(AAG)7\t21\t100\t120
s5\t1\tp6\t(AAAAAG)5\t30\t1\t30
";

    #[test]
    fn test_block_parsing() {
        let longest = LongestRepeats::from_report(Cursor::new(REPORT)).unwrap();
        assert!(longest.contains("Mono", "(A)11"));
        assert!(longest.contains("Mono", "(G)10"));
        assert!(!longest.contains("Mono", "(C)0"));
        assert!(longest.contains("Di", "(AG)8"));
        assert!(longest.contains("Di", "(CT)8"));
        assert!(!longest.contains("Di", "(AG)7"));
        assert!(longest.contains("Tri", "(AAG)7"));
        // the block ends at the blank line
        assert!(!longest.contains("Hexa", "(AAAAAG)5"));
    }

    #[test]
    fn test_locate_groups_in_class_order() {
        let longest = LongestRepeats::from_report(Cursor::new(REPORT)).unwrap();
        let records = read_records(Cursor::new(MISA)).unwrap();
        let located = longest.locate(&records);
        let summary: Vec<(&str, Vec<&str>)> = located
            .iter()
            .map(|(class, hits)| (*class, hits.iter().map(|r| r.seq_id.as_str()).collect()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Mono", vec!["s1"]),
                ("Di", vec!["s2", "s3"]),
                ("Tri", vec!["s4"]),
            ]
        );
    }

    #[test]
    fn test_missing_marker_is_an_error() {
        let err = LongestRepeats::from_report(Cursor::new("no block here\n")).unwrap_err();
        assert!(matches!(err, MisaError::MissingSection(_)));
    }

    #[test]
    fn test_reads_rendered_analysis_report() {
        let summary = parse_statistics(Cursor::new(STATISTICS)).unwrap();
        let analysis = Analysis::new(summary, None);
        let header = AnalysisHeader {
            run: RunInfo {
                program: "misax".into(),
                version: "0.1.0".into(),
                timestamp: "2025-01-01 12:00".into(),
                elapsed_secs: 0.0,
            },
            statistics_file: "s".into(),
            misa_file: "m".into(),
        };
        let mut rendered = Vec::new();
        write_analysis(&mut rendered, &header, &analysis).unwrap();

        let longest = LongestRepeats::from_report(Cursor::new(rendered)).unwrap();
        assert!(longest.contains("Di", "(AG)8"));
        assert!(longest.contains("Di", "(CT)8"));
        assert!(longest.contains("Hexa", "(AAAAAG)5"));
        assert!(longest.contains("Mono", "(A)11"));
    }

    #[test]
    fn test_output_layout() {
        let longest = LongestRepeats::from_report(Cursor::new(REPORT)).unwrap();
        let records = read_records(Cursor::new(MISA)).unwrap();
        let located = longest.locate(&records);
        let header = LongestHeader {
            run: RunInfo {
                program: "misax".into(),
                version: "0.1.0".into(),
                timestamp: "2025-01-01 12:00".into(),
                elapsed_secs: 0.0,
            },
            analysis_file: "repeats_analysis.txt".into(),
            misa_file: "x.misa".into(),
            output: "longest-sequences-list.txt".into(),
        };
        let mut buf = Vec::new();
        write_longest(&mut buf, &header, &located).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with(
            "----- Mono\n(A)11 11: s1\n----- Di\n(AG)8 16: s2\n(CT)8 16: s3\n----- Tri\n(AAG)7 21: s4\n"
        ));
    }
}
