use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::record::{RepeatRecord, SsrType};
use crate::stats::StatisticsSummary;

/// Names of the unit length classes, index 0 is unit length 1.
pub const CLASS_NAMES: [&str; 10] = [
    "Mono", "Di", "Tri", "Tetra", "Penta", "Hexa", "Septa", "Octa", "Nona", "Deca",
];

/// Repeat type label length -> unit length, e.g. `AG/CT` has 5 characters.
const LABEL_LENGTH_CLASSES: [(usize, usize); 10] = [
    (3, 1),
    (5, 2),
    (7, 3),
    (9, 4),
    (11, 5),
    (13, 6),
    (15, 7),
    (17, 8),
    (19, 9),
    (21, 10),
];

pub fn class_name(unit_length: usize) -> Option<&'static str> {
    unit_length
        .checked_sub(1)
        .and_then(|i| CLASS_NAMES.get(i))
        .copied()
}

/// Unit length class of a repeat type label, from its length alone.
pub fn label_class(label: &str) -> Option<usize> {
    LABEL_LENGTH_CLASSES
        .iter()
        .find(|(len, _)| *len == label.len())
        .map(|(_, class)| *class)
}

/// A repeat type and its share of the class total.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatTypeShare {
    pub label: String,
    pub count: u64,
    pub percent: f64,
}

/// Perfect, imperfect and compound SSRs counted from a MISA file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositionCounts {
    pub perfect: u64,
    pub imperfect: u64,
    pub compound: u64,
}

impl CompositionCounts {
    pub fn from_records(records: &[RepeatRecord]) -> CompositionCounts {
        let mut counts = CompositionCounts::default();
        for record in records {
            match record.ssr_type {
                SsrType::Perfect(_) => counts.perfect += 1,
                SsrType::Imperfect => counts.imperfect += 1,
                SsrType::Compound => counts.compound += 1,
            }
        }
        counts
    }

    pub fn subtotal(&self) -> u64 {
        self.perfect + self.imperfect + self.compound
    }
}

/// Figures derived from a statistics summary.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub summary: StatisticsSummary,
    /// SSRs per Mb
    pub relative_abundance: f64,
    /// SSR bp per Mb
    pub relative_density: f64,
    pub total_ssr_length: u64,
    /// Sum of the distribution table
    pub abundance_sum: u64,
    /// `abundance_sum` equals the reported SSR total
    pub consistent: bool,
    /// Unit length (2..=max) -> longest repeat count of any motif
    pub longest_per_class: BTreeMap<usize, u32>,
    /// Unit length (2..=max) -> every motif reaching that count
    pub longest_motifs_per_class: BTreeMap<usize, BTreeSet<String>>,
    /// Unit length -> repeat types ordered by label length then label.
    /// Classes with a zero total are absent.
    pub repeat_types: BTreeMap<usize, Vec<RepeatTypeShare>>,
    pub composition: Option<CompositionCounts>,
}

fn per_megabase(value: u64, examined_length: u64) -> f64 {
    if examined_length == 0 {
        return 0.0;
    }
    value as f64 / (examined_length as f64 / 1_000_000.0)
}

impl Analysis {
    /// Derive the analysis. `records` enables the composition recount.
    pub fn new(summary: StatisticsSummary, records: Option<&[RepeatRecord]>) -> Analysis {
        let max_unit = summary.max_unit_length;
        let examined = summary.totals.examined_length;

        let total_ssr_length = (1..=max_unit)
            .map(|u| u as u64 * summary.abundance(u))
            .sum();
        let abundance_sum = summary.abundance_sum();
        let consistent = abundance_sum == summary.totals.total_ssrs;
        if !consistent {
            warn!(
                "distribution sums to {} SSRs but {} were reported",
                abundance_sum, summary.totals.total_ssrs
            );
        }

        let (longest_per_class, longest_motifs_per_class) = longest_motifs(&summary);
        let repeat_types = repeat_type_shares(&summary);
        let composition = records.map(CompositionCounts::from_records);

        Analysis {
            relative_abundance: per_megabase(summary.totals.total_ssrs, examined),
            relative_density: per_megabase(total_ssr_length, examined),
            total_ssr_length,
            abundance_sum,
            consistent,
            longest_per_class,
            longest_motifs_per_class,
            repeat_types,
            composition,
            summary,
        }
    }
}

fn longest_motifs(
    summary: &StatisticsSummary,
) -> (BTreeMap<usize, u32>, BTreeMap<usize, BTreeSet<String>>) {
    let classes = 2..=summary.max_unit_length;

    let mut longest: BTreeMap<usize, u32> = classes.clone().map(|u| (u, 0)).collect();
    for (motif, &count) in &summary.longest_by_motif {
        if let Some(max) = longest.get_mut(&motif.len()) {
            if count > *max {
                *max = count;
            }
        }
    }

    // second pass, so ties found before the maximum was reached are kept
    let mut motifs: BTreeMap<usize, BTreeSet<String>> =
        classes.map(|u| (u, BTreeSet::new())).collect();
    for (motif, &count) in &summary.longest_by_motif {
        if longest.get(&motif.len()) == Some(&count) {
            if let Some(set) = motifs.get_mut(&motif.len()) {
                set.insert(motif.clone());
            }
        }
    }

    (longest, motifs)
}

fn repeat_type_shares(summary: &StatisticsSummary) -> BTreeMap<usize, Vec<RepeatTypeShare>> {
    let mut grouped: BTreeMap<usize, Vec<(&String, u64)>> = BTreeMap::new();
    for (label, &count) in &summary.total_abundance_by_repeat_type {
        match label_class(label) {
            Some(class) => grouped.entry(class).or_default().push((label, count)),
            None => debug!("ignoring repeat type '{}' of unknown length", label),
        }
    }

    let mut shares = BTreeMap::new();
    for (class, mut entries) in grouped {
        let total: u64 = entries.iter().map(|(_, count)| count).sum();
        if total == 0 {
            debug!("skipping {} class with zero abundance", class);
            continue;
        }
        entries.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(b.0)));
        let rows = entries
            .into_iter()
            .map(|(label, count)| RepeatTypeShare {
                label: label.clone(),
                count,
                percent: count as f64 * 100.0 / total as f64,
            })
            .collect();
        shares.insert(class, rows);
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Totals;

    fn summary(max_unit_length: usize) -> StatisticsSummary {
        StatisticsSummary {
            max_unit_length,
            ..Default::default()
        }
    }

    #[test]
    fn test_relative_abundance_and_density() {
        let mut s = summary(2);
        s.abundance_by_unit_length.insert(1, 10);
        s.abundance_by_unit_length.insert(2, 5);
        s.totals = Totals {
            examined_length: 1_000_000,
            total_ssrs: 15,
            ssrs_in_compound: 0,
        };
        let analysis = Analysis::new(s, None);
        assert_eq!(analysis.total_ssr_length, 20);
        assert!((analysis.relative_abundance - 15.0).abs() < 1e-9);
        assert!((analysis.relative_density - 20.0).abs() < 1e-9);
        assert!(analysis.consistent);
        assert!(analysis.composition.is_none());
    }

    #[test]
    fn test_inconsistent_totals_are_flagged() {
        let mut s = summary(1);
        s.abundance_by_unit_length.insert(1, 10);
        s.totals.examined_length = 500_000;
        s.totals.total_ssrs = 11;
        let analysis = Analysis::new(s, None);
        assert!(!analysis.consistent);
        assert_eq!(analysis.abundance_sum, 10);
        assert!((analysis.relative_abundance - 22.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_examined_length_does_not_divide() {
        let analysis = Analysis::new(summary(2), None);
        assert_eq!(analysis.relative_abundance, 0.0);
        assert_eq!(analysis.relative_density, 0.0);
    }

    #[test]
    fn test_longest_motif_ties_are_all_kept() {
        let mut s = summary(3);
        for (motif, count) in [("AG", 10), ("CT", 10), ("AT", 8), ("AAG", 5), ("A", 30)] {
            s.longest_by_motif.insert(motif.to_string(), count);
        }
        let analysis = Analysis::new(s, None);
        assert_eq!(analysis.longest_per_class[&2], 10);
        let di: Vec<&str> = analysis.longest_motifs_per_class[&2]
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(di, vec!["AG", "CT"]);
        assert_eq!(analysis.longest_per_class[&3], 5);
        assert!(!analysis.longest_per_class.contains_key(&1));
    }

    #[test]
    fn test_motifs_longer_than_max_unit_are_ignored() {
        let mut s = summary(2);
        s.longest_by_motif.insert("AAG".to_string(), 12);
        let analysis = Analysis::new(s, None);
        assert!(!analysis.longest_per_class.contains_key(&3));
        assert!(analysis.longest_motifs_per_class[&2].is_empty());
    }

    #[test]
    fn test_label_class_table() {
        assert_eq!(label_class("A/T"), Some(1));
        assert_eq!(label_class("AG/CT"), Some(2));
        assert_eq!(label_class("AAG/CTT"), Some(3));
        assert_eq!(label_class("AAAAAAAAAG/CTTTTTTTTT"), Some(10));
        assert_eq!(label_class("AAAT"), None);
        assert_eq!(class_name(2), Some("Di"));
        assert_eq!(class_name(0), None);
        assert_eq!(class_name(11), None);
    }

    #[test]
    fn test_repeat_type_percentages_sum_to_100() {
        let mut s = summary(3);
        for (label, count) in [
            ("AC/GT", 3),
            ("AG/CT", 6),
            ("AT/AT", 1),
            ("AAG/CTT", 7),
            ("ACG/CGT", 0),
            ("AGG/CCT", 2),
            ("WRONG", 4),
            ("XY", 9),
        ] {
            s.total_abundance_by_repeat_type.insert(label.to_string(), count);
        }
        let analysis = Analysis::new(s, None);
        for shares in analysis.repeat_types.values() {
            let sum: f64 = shares.iter().map(|s| s.percent).sum();
            assert!((sum - 100.0).abs() < 1e-9);
        }
        let di: Vec<&str> = analysis.repeat_types[&2]
            .iter()
            .map(|s| s.label.as_str())
            .collect();
        assert_eq!(di, vec!["AC/GT", "AG/CT", "AT/AT", "WRONG"]);
    }

    #[test]
    fn test_zero_total_class_is_skipped() {
        let mut s = summary(4);
        s.total_abundance_by_repeat_type
            .insert("AAAT/ATTT".to_string(), 0);
        let analysis = Analysis::new(s, None);
        assert!(!analysis.repeat_types.contains_key(&4));
    }

    #[test]
    fn test_composition_recount() {
        let records: Vec<RepeatRecord> = [
            "s1\t1\tp1\t(A)12\t12\t1\t12",
            "s1\t2\tp2\t(AG)6\t12\t40\t51",
            "s2\t1\tc\t(AG)6aa(AG)5\t24\t5\t28",
            "s2\t2\tc*\t(AT)6(GC)5*\t22\t100\t121",
        ]
        .iter()
        .enumerate()
        .map(|(i, l)| RepeatRecord::parse_line(l, i as u64 + 1).unwrap())
        .collect();
        let analysis = Analysis::new(summary(2), Some(&records));
        let counts = analysis.composition.unwrap();
        assert_eq!(counts.perfect, 2);
        assert_eq!(counts.imperfect, 1);
        assert_eq!(counts.compound, 1);
        assert_eq!(counts.subtotal(), 4);
    }
}
