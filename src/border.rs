use std::io::{BufRead, Write};

use clap::ValueEnum;

use crate::error::{MisaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Layout {
    /// Fixed width columns
    Space,
    /// Tab separated columns
    Tab,
}

impl Layout {
    /// Default output name for the layout.
    pub fn file_name(self) -> &'static str {
        match self {
            Layout::Space => "border-space.txt",
            Layout::Tab => "border-tab.txt",
        }
    }
}

/// Reduce each repeat row of a border list to id, SSR, start and end.
/// Lines without a tab (the header) are copied unchanged.
pub fn format_border<R: BufRead, W: Write>(
    rdr: R,
    out: &mut W,
    layout: Layout,
    truncate_id: bool,
) -> Result<usize> {
    let mut rows = 0;
    for (i, line) in rdr.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if !line.contains('\t') {
            writeln!(out, "{}", line)?;
            continue;
        }

        let line = line.replace("\t\t", "\t");
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 7 {
            return Err(MisaError::MalformedRecord {
                line: i as u64 + 1,
                reason: format!("expected 7 columns, found {}", cols.len()),
            });
        }
        let seq_id = if truncate_id {
            cols[0].split('_').next().unwrap_or(cols[0])
        } else {
            cols[0]
        };
        match layout {
            Layout::Space => writeln!(
                out,
                "{:<30} {:>4} {:>7} {:>7}",
                seq_id, cols[3], cols[5], cols[6]
            )?,
            Layout::Tab => writeln!(out, "{}\t{}\t{}\t{}", seq_id, cols[3], cols[5], cols[6])?,
        }
        rows += 1;
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const BORDER: &str = "\
Db file: db.fa
2 repeats with border (50 bp)
========
scaffold756_39.3\t41\tp2\t(CT)15\t30\t54494\t54523
ctg2\t1\tp3\t(AAG)5\t\t15\t100\t114
";

    fn format(layout: Layout, truncate_id: bool) -> String {
        let mut buf = Vec::new();
        let rows = format_border(Cursor::new(BORDER), &mut buf, layout, truncate_id).unwrap();
        assert_eq!(rows, 2);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_tab_layout_collapses_double_tabs() {
        let text = format(Layout::Tab, false);
        assert_eq!(
            text,
            "Db file: db.fa\n2 repeats with border (50 bp)\n========\n\
scaffold756_39.3\t(CT)15\t54494\t54523\nctg2\t(AAG)5\t100\t114\n"
        );
    }

    #[test]
    fn test_space_layout_with_truncated_ids() {
        let text = format(Layout::Space, true);
        let rows: Vec<&str> = text.lines().skip(3).collect();
        assert_eq!(
            rows[0],
            format!("{:<30} {:>4} {:>7} {:>7}", "scaffold756", "(CT)15", "54494", "54523")
        );
        assert!(rows[1].starts_with("ctg2 "));
    }

    #[test]
    fn test_short_row_is_rejected() {
        let mut buf = Vec::new();
        let err = format_border(Cursor::new("a\tb\tc\n"), &mut buf, Layout::Tab, false).unwrap_err();
        assert!(matches!(err, MisaError::MalformedRecord { line: 1, .. }));
    }
}
