use std::io::Write;
use std::path::PathBuf;

use ahash::AHashSet;
use log::info;

use crate::error::Result;
use crate::record::{RepeatRecord, SsrType};
use crate::report::RunInfo;

/// Imperfect and compound repeats, one per distinct SSR string.
#[derive(Debug, Default)]
pub struct ImperfectSummary {
    pub imperfect: usize,
    pub compound: usize,
    /// Longest repeat first, file order among equal lengths
    pub repeats: Vec<RepeatRecord>,
}

impl ImperfectSummary {
    pub fn from_records(records: &[RepeatRecord]) -> ImperfectSummary {
        let mut seen: AHashSet<&str> = AHashSet::new();
        let mut summary = ImperfectSummary::default();
        for record in records {
            match record.ssr_type {
                SsrType::Imperfect | SsrType::Compound => {}
                SsrType::Perfect(_) => continue,
            }
            if !seen.insert(record.ssr.as_str()) {
                continue;
            }
            if record.ssr_type == SsrType::Imperfect {
                summary.imperfect += 1;
            } else {
                summary.compound += 1;
            }
            summary.repeats.push(record.clone());
        }
        summary
            .repeats
            .sort_by(|a, b| b.size.cmp(&a.size));
        info!(
            "{} distinct imperfect and {} compound repeats",
            summary.imperfect, summary.compound
        );
        summary
    }

    pub fn total(&self) -> usize {
        self.repeats.len()
    }
}

#[derive(Debug, Clone)]
pub struct ImperfectHeader {
    pub run: RunInfo,
    pub misa_file: PathBuf,
    pub output: PathBuf,
}

pub fn write_imperfect<W: Write>(
    out: &mut W,
    header: &ImperfectHeader,
    summary: &ImperfectSummary,
) -> Result<()> {
    let run = &header.run;
    writeln!(out, "{}", run.program_line())?;
    writeln!(out, "Date: {}, duration: {:.2} sec", run.timestamp, run.elapsed_secs)?;
    writeln!(out, "Input, MISA file: {}", header.misa_file.display())?;
    writeln!(
        out,
        "Imperfect: {}, compound: {}, Total: {}",
        summary.imperfect,
        summary.compound,
        summary.total()
    )?;
    writeln!(out, "Order: longest first, shortest last")?;
    writeln!(out, "Output: {}", header.output.display())?;
    writeln!(out, "{}", "=".repeat(70))?;
    for record in &summary.repeats {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            record.seq_id, record.ssr_type, record.size, record.ssr
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::read_records;
    use std::io::Cursor;

    const MISA: &str = "\
s1\t1\tc\t(AG)4tt(AG)5\t20\t1\t20
s1\t2\tp2\t(AG)10\t20\t40\t59
s2\t1\tc*\t(AT)6(GC)5*\t40\t1\t40
s3\t1\tc\t(AG)4tt(AG)5\t20\t7\t26
s3\t2\tc\t(A)12g(A)10\t23\t50\t72
s4\t1\tc\t(TC)6aa(TC)5\t24\t3\t26
";

    #[test]
    fn test_distinct_repeats_longest_first() {
        let records = read_records(Cursor::new(MISA)).unwrap();
        let summary = ImperfectSummary::from_records(&records);
        assert_eq!(summary.imperfect, 3);
        assert_eq!(summary.compound, 1);
        assert_eq!(summary.total(), 4);
        let order: Vec<(&str, u32)> = summary
            .repeats
            .iter()
            .map(|r| (r.seq_id.as_str(), r.size))
            .collect();
        assert_eq!(order, vec![("s2", 40), ("s4", 24), ("s3", 23), ("s1", 20)]);
    }

    #[test]
    fn test_output_rows() {
        let records = read_records(Cursor::new(MISA)).unwrap();
        let summary = ImperfectSummary::from_records(&records);
        let header = ImperfectHeader {
            run: RunInfo {
                program: "misax".into(),
                version: "0.1.0".into(),
                timestamp: "2025-01-01 12:00".into(),
                elapsed_secs: 0.0,
            },
            misa_file: "x.misa".into(),
            output: "imperfect.txt".into(),
        };
        let mut buf = Vec::new();
        write_imperfect(&mut buf, &header, &summary).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Imperfect: 3, compound: 1, Total: 4\n"));
        assert!(text.ends_with(
            "s2\tc*\t40\t(AT)6(GC)5*\ns4\tc\t24\t(TC)6aa(TC)5\ns3\tc\t23\t(A)12g(A)10\ns1\tc\t20\t(AG)4tt(AG)5\n"
        ));
    }
}
