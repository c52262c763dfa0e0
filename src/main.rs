/*
 * misax - MISA microsatellite statistics and repeat extraction
 *
 * Copyright (c) 2025 Yumi Sims, Wellcome Sanger Institute
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */


use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

mod analysis;
mod border;
mod error;
mod filter;
mod imperfect;
mod longest;
mod record;
mod report;
mod sequences;
mod stats;

use analysis::Analysis;
use border::Layout;
use filter::{RepeatFilter, SortMode};
use report::RunInfo;

#[derive(Parser, Debug)]
#[command(
    name = "misax",
    version,
    about = "Summarise MISA microsatellite output and extract repeat sequences"
)]
struct Cli {
    /// Increase verbosity level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse a MISA statistics file
    Statistics {
        /// MISA statistics file
        statistics: PathBuf,
        /// MISA repeat file, read only with --repeatclasses
        misa: PathBuf,
        /// Recount perfect, imperfect and compound repeats from the repeat file
        #[arg(short = 'r', long = "repeatclasses")]
        repeat_classes: bool,
        #[arg(short = 'o', long = "output", default_value = "repeats_analysis.txt")]
        output: PathBuf,
    },
    /// Keep Di to Hexa repeats within a length window
    Filter {
        /// MISA repeat file
        misa: PathBuf,
        /// Minimum repeat length in bp
        min: u32,
        /// Maximum repeat length in bp
        max: u32,
        #[arg(value_enum)]
        mode: SortMode,
        /// Also keep imperfect repeats
        #[arg(short = 'i', long = "imperfect")]
        imperfect: bool,
        #[arg(short = 'o', long = "output", default_value = "filtered-repeats-sequence-list.txt")]
        output: PathBuf,
    },
    /// List sequences carrying the longest repeat of each class
    Longest {
        /// Report written by the statistics command
        analysis: PathBuf,
        /// MISA repeat file
        misa: PathBuf,
        #[arg(short = 'o', long = "output", default_value = "longest-sequences-list.txt")]
        output: PathBuf,
    },
    /// Extract the sequences of a filtered repeat list from a FASTA file
    Sequences {
        /// List written by `filter` in repeat mode
        list: PathBuf,
        /// FASTA file the repeats were called on
        db: PathBuf,
        /// Require N-free flanks of this many bp on both sides
        #[arg(short = 'b', long = "border")]
        border: Option<u64>,
        /// Sequence index, built when missing
        #[arg(long = "index", default_value = "index.txt")]
        index: PathBuf,
        /// FASTA output [default: repeats-sequences.fas, or repeats-sequences-border.fas with --border]
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        #[arg(long = "border-list", default_value = "border.txt")]
        border_list: PathBuf,
        #[arg(long = "info", default_value = "getsequences-info.txt")]
        info: PathBuf,
    },
    /// Reformat a border list to id, SSR, start and end
    Border {
        /// Border list written by `sequences`
        input: PathBuf,
        #[arg(value_enum)]
        layout: Layout,
        /// Cut sequence ids at the first underscore
        #[arg(long = "idtrunc")]
        truncate_id: bool,
        /// [default: border-space.txt or border-tab.txt]
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// List distinct imperfect and compound repeats, longest first
    Imperfect {
        /// MISA repeat file
        misa: PathBuf,
        #[arg(short = 'o', long = "output", default_value = "imperfect.txt")]
        output: PathBuf,
    },
}

fn run_info(started: Instant) -> RunInfo {
    RunInfo {
        program: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M").to_string(),
        elapsed_secs: started.elapsed().as_secs_f64(),
    }
}

fn create_output(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn read_records(path: &Path) -> Result<Vec<record::RepeatRecord>> {
    record::read_records_from_path(path)
        .with_context(|| format!("Failed to read repeats from {}", path.display()))
}

fn run_statistics(
    statistics: &Path,
    misa: &Path,
    repeat_classes: bool,
    output: &Path,
) -> Result<()> {
    let started = Instant::now();
    let summary = stats::parse_statistics_from_path(statistics)
        .with_context(|| format!("Failed to parse statistics file {}", statistics.display()))?;
    let records = if repeat_classes {
        Some(read_records(misa)?)
    } else {
        None
    };
    let analysis = Analysis::new(summary, records.as_deref());

    let header = report::AnalysisHeader {
        run: run_info(started),
        statistics_file: statistics.to_path_buf(),
        misa_file: misa.to_path_buf(),
    };
    let mut out = create_output(output)?;
    report::write_analysis(&mut out, &header, &analysis)?;
    out.flush()?;
    info!("Analysis written to {}", output.display());
    Ok(())
}

fn run_filter(misa: &Path, filter: RepeatFilter, mode: SortMode, output: &Path) -> Result<()> {
    let started = Instant::now();
    if filter.min_length > filter.max_length {
        bail!(
            "minimum length {} is larger than maximum length {}",
            filter.min_length,
            filter.max_length
        );
    }
    let records = read_records(misa)?;
    let filtered = filter.apply(&records);
    if filtered.is_empty() {
        warn!("no repeats of {} within {}..={} bp", misa.display(), filter.min_length, filter.max_length);
    }

    let header = filter::FilterHeader {
        run: run_info(started),
        input: misa.to_path_buf(),
        output: output.to_path_buf(),
        filter,
        mode,
    };
    let mut out = create_output(output)?;
    filter::write_filtered(&mut out, &header, &filtered)?;
    out.flush()?;
    info!("{} repeats written to {}", filtered.len(), output.display());
    Ok(())
}

fn run_longest(analysis: &Path, misa: &Path, output: &Path) -> Result<()> {
    let started = Instant::now();
    let report = error::open_input(analysis)?;
    let longest = longest::LongestRepeats::from_report(BufReader::new(report))
        .with_context(|| format!("Failed to read longest motives from {}", analysis.display()))?;
    let records = read_records(misa)?;
    let located = longest.locate(&records);

    let header = longest::LongestHeader {
        run: run_info(started),
        analysis_file: analysis.to_path_buf(),
        misa_file: misa.to_path_buf(),
        output: output.to_path_buf(),
    };
    let mut out = create_output(output)?;
    longest::write_longest(&mut out, &header, &located)?;
    out.flush()?;
    Ok(())
}

struct SequenceArgs {
    list: PathBuf,
    db: PathBuf,
    border: Option<u64>,
    index: PathBuf,
    output: Option<PathBuf>,
    border_list: PathBuf,
    info: PathBuf,
}

fn run_sequences(args: SequenceArgs) -> Result<()> {
    let started = Instant::now();
    let list = error::open_input(&args.list)?;
    let repeats = sequences::read_repeat_list(BufReader::new(list), args.border)
        .with_context(|| format!("Failed to read repeat list {}", args.list.display()))?;
    let db = sequences::SequenceDb::from_path(&args.db)
        .with_context(|| format!("Failed to read FASTA file {}", args.db.display()))?;
    let index = sequences::SequenceIndex::load_or_build(&args.index, &db)
        .with_context(|| format!("Failed to load sequence index {}", args.index.display()))?;
    if index.is_empty() {
        warn!("sequence index {} lists no sequences", args.index.display());
    }
    let extraction = sequences::extract(&repeats, &db, &index, args.border);

    let fasta_output = args.output.unwrap_or_else(|| {
        PathBuf::from(match args.border {
            Some(_) => "repeats-sequences-border.fas",
            None => "repeats-sequences.fas",
        })
    });
    let header = sequences::ExtractionHeader {
        run: run_info(started),
        list_file: args.list.clone(),
        db_file: args.db.clone(),
        border: args.border,
        fasta_output: fasta_output.clone(),
        border_output: args.border_list.clone(),
    };

    let mut out = create_output(&fasta_output)?;
    sequences::write_sequences(&mut out, &extraction)?;
    out.flush()?;

    if args.border.is_some() && !extraction.with_border.is_empty() {
        let mut out = create_output(&args.border_list)?;
        sequences::write_border_list(&mut out, &header, &extraction)?;
        out.flush()?;
    }

    let mut out = create_output(&args.info)?;
    sequences::write_info(&mut out, &header, &db, &extraction)?;
    out.flush()?;
    info!(
        "{} sequences written to {}",
        extraction.sequences.len(),
        fasta_output.display()
    );
    Ok(())
}

fn run_border(input: &Path, layout: Layout, truncate_id: bool, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| PathBuf::from(layout.file_name()));
    let rdr = BufReader::new(error::open_input(input)?);
    let mut out = create_output(&output)?;
    let rows = border::format_border(rdr, &mut out, layout, truncate_id)
        .with_context(|| format!("Failed to reformat border list {}", input.display()))?;
    out.flush()?;
    info!("{} rows written to {}", rows, output.display());
    Ok(())
}

fn run_imperfect(misa: &Path, output: &Path) -> Result<()> {
    let started = Instant::now();
    let records = read_records(misa)?;
    let summary = imperfect::ImperfectSummary::from_records(&records);

    let header = imperfect::ImperfectHeader {
        run: run_info(started),
        misa_file: misa.to_path_buf(),
        output: output.to_path_buf(),
    };
    let mut out = create_output(output)?;
    imperfect::write_imperfect(&mut out, &header, &summary)?;
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Command::Statistics {
            statistics,
            misa,
            repeat_classes,
            output,
        } => run_statistics(&statistics, &misa, repeat_classes, &output),
        Command::Filter {
            misa,
            min,
            max,
            mode,
            imperfect,
            output,
        } => {
            let filter = RepeatFilter {
                min_length: min,
                max_length: max,
                imperfect,
            };
            run_filter(&misa, filter, mode, &output)
        }
        Command::Longest {
            analysis,
            misa,
            output,
        } => run_longest(&analysis, &misa, &output),
        Command::Sequences {
            list,
            db,
            border,
            index,
            output,
            border_list,
            info,
        } => run_sequences(SequenceArgs {
            list,
            db,
            border,
            index,
            output,
            border_list,
            info,
        }),
        Command::Border {
            input,
            layout,
            truncate_id,
            output,
        } => run_border(&input, layout, truncate_id, output),
        Command::Imperfect { misa, output } => run_imperfect(&misa, &output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_every_stage() {
        let cli = Cli::try_parse_from(["misax", "-vv", "filter", "x.misa", "10", "40", "repeat", "-i"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Command::Filter { min: 10, max: 40, mode: SortMode::Repeat, imperfect: true, .. }
        ));

        let cli = Cli::try_parse_from(["misax", "sequences", "list.txt", "db.fa", "-b", "50"]).unwrap();
        let Command::Sequences { border, index, .. } = cli.command else {
            panic!("expected sequences");
        };
        assert_eq!(border, Some(50));
        assert_eq!(index, PathBuf::from("index.txt"));

        assert!(Cli::try_parse_from(["misax", "border", "border.txt", "comma"]).is_err());
    }

    #[test]
    fn test_filter_rejects_inverted_window() {
        let dir = tempfile::tempdir().unwrap();
        let misa = dir.path().join("x.misa");
        std::fs::write(&misa, "s1\t1\tp2\t(AG)4\t8\t10\t17\n").unwrap();
        let filter = RepeatFilter {
            min_length: 40,
            max_length: 10,
            imperfect: false,
        };
        let out = dir.path().join("out.txt");
        assert!(run_filter(&misa, filter, SortMode::Motif, &out).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_sequences_stage_writes_border_list_only_on_hits() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.txt");
        std::fs::write(
            &list,
            "header\n=====\ns1\t1\tp2\t(AG)5\t10\t9\t18\n\n----- trailer\n",
        )
        .unwrap();
        let db = dir.path().join("db.fa");
        std::fs::write(&db, ">s1\nNNNNNNNNAGAGAGAGAGCCCCCCCCCC\n").unwrap();

        let args = |border: Option<u64>| SequenceArgs {
            list: list.clone(),
            db: db.clone(),
            border,
            index: dir.path().join("index.txt"),
            output: Some(dir.path().join("out.fas")),
            border_list: dir.path().join("border.txt"),
            info: dir.path().join("info.txt"),
        };

        run_sequences(args(Some(5))).unwrap();
        assert!(!dir.path().join("border.txt").exists());

        run_sequences(args(None)).unwrap();
        let fasta = std::fs::read_to_string(dir.path().join("out.fas")).unwrap();
        assert_eq!(fasta, ">s1\nNNNNNNNNAGAGAGAGAGCCCCCCCCCC\n");
        assert!(dir.path().join("index.txt").exists());
        let info = std::fs::read_to_string(dir.path().join("info.txt")).unwrap();
        assert!(info.contains("Found 1 repeats\n"));
    }

    fn statistics_inputs(dir: &Path) -> (PathBuf, PathBuf) {
        let statistics = dir.join("genome.fa.statistics");
        std::fs::write(&statistics, crate::stats::tests::STATISTICS).unwrap();
        (statistics, dir.join("genome.fa.misa"))
    }

    #[test]
    fn test_statistics_stage_missing_statistics_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("repeats_analysis.txt");
        let err = run_statistics(
            &dir.path().join("absent.statistics"),
            &dir.path().join("absent.misa"),
            false,
            &out,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<error::MisaError>(),
            Some(error::MisaError::MissingInput { .. })
        ));
        assert!(!out.exists());
    }

    #[test]
    fn test_statistics_stage_ignores_repeat_file_without_flag() {
        let dir = tempfile::tempdir().unwrap();
        let (statistics, misa) = statistics_inputs(dir.path());
        let out = dir.path().join("repeats_analysis.txt");
        run_statistics(&statistics, &misa, false, &out).unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains(" Longest motives "));
        assert!(!text.contains("Option repeatclasses"));
    }

    #[test]
    fn test_statistics_stage_needs_repeat_file_with_flag() {
        let dir = tempfile::tempdir().unwrap();
        let (statistics, misa) = statistics_inputs(dir.path());
        let out = dir.path().join("repeats_analysis.txt");
        let err = run_statistics(&statistics, &misa, true, &out).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<error::MisaError>(),
            Some(error::MisaError::MissingInput { .. })
        ));
        assert!(!out.exists());

        std::fs::write(&misa, "s1\t1\tp2\t(AG)6\t12\t1\t12\n").unwrap();
        run_statistics(&statistics, &misa, true, &out).unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains("Option repeatclasses: true\n"));
        assert!(text.contains("Perfect SSRs: (p)                :        1\n"));
    }

    #[test]
    fn test_missing_input_names_the_path_once() {
        let err = error::open_input("absent.misa").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("absent.misa"));
        assert!(!message.contains("os error"));
    }
}
