//! Human-readable summaries of a PR's diff.

use crate::types::ChangedFile;

/// How many files the summary lists under "Most changed".
pub const TOP_FILES: usize = 5;

/// Summary text recorded with each change and sent with code-change notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSummary {
    /// `"<N> files, +<additions> -<deletions>"`.
    pub diff_stats: String,
    /// Per-status counts followed by the most-changed files.
    pub summary: String,
    /// Filenames in the order the host listed them.
    pub files_changed: Vec<String>,
}

/// Summarizes a file list. The input order is left untouched.
pub fn summarize(files: &[ChangedFile]) -> ChangeSummary {
    let additions: u64 = files.iter().map(|f| f.additions).sum();
    let deletions: u64 = files.iter().map(|f| f.deletions).sum();
    let diff_stats = format!("{} files, +{} -{}", files.len(), additions, deletions);

    // Status groups keep first-seen order.
    let mut groups: Vec<(&str, usize)> = Vec::new();
    for file in files {
        match groups.iter_mut().find(|(status, _)| *status == file.status) {
            Some((_, count)) => *count += 1,
            None => groups.push((&file.status, 1)),
        }
    }
    let groups = groups
        .iter()
        .map(|(status, count)| format!("{count} file(s) {status}"))
        .collect::<Vec<_>>()
        .join(", ");

    // sort_by is stable, so equal churn keeps listing order.
    let mut ranked: Vec<&ChangedFile> = files.iter().collect();
    ranked.sort_by(|a, b| b.churn().cmp(&a.churn()));
    let top = ranked
        .iter()
        .take(TOP_FILES)
        .map(|f| format!("{} (+{}/-{})", f.filename, f.additions, f.deletions))
        .collect::<Vec<_>>()
        .join(", ");

    ChangeSummary {
        diff_stats,
        summary: format!("{groups}. Most changed: {top}"),
        files_changed: files.iter().map(|f| f.filename.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::arb_changed_file;
    use proptest::prelude::*;

    fn file(name: &str, status: &str, additions: u64, deletions: u64) -> ChangedFile {
        ChangedFile {
            filename: name.to_string(),
            status: status.to_string(),
            additions,
            deletions,
            patch: None,
        }
    }

    #[test]
    fn worked_example() {
        let files = vec![
            file("a.ts", "modified", 10, 2),
            file("b.ts", "added", 50, 0),
            file("c.ts", "modified", 1, 1),
        ];
        let s = summarize(&files);
        assert_eq!(s.diff_stats, "3 files, +61 -3");
        assert_eq!(
            s.summary,
            "2 file(s) modified, 1 file(s) added. Most changed: b.ts (+50/-0), a.ts (+10/-2), c.ts (+1/-1)"
        );
        assert_eq!(s.files_changed, vec!["a.ts", "b.ts", "c.ts"]);
    }

    #[test]
    fn lists_at_most_five_files_with_stable_ties() {
        let files: Vec<_> = (0..7)
            .map(|i| file(&format!("f{i}"), "modified", 1, 0))
            .collect();
        let s = summarize(&files);
        assert!(s.summary.ends_with(
            "Most changed: f0 (+1/-0), f1 (+1/-0), f2 (+1/-0), f3 (+1/-0), f4 (+1/-0)"
        ));
    }

    #[test]
    fn empty_file_list() {
        let s = summarize(&[]);
        assert_eq!(s.diff_stats, "0 files, +0 -0");
        assert_eq!(s.summary, ". Most changed: ");
        assert!(s.files_changed.is_empty());
    }

    proptest! {
        #[test]
        fn diff_stats_totals(churn in prop::collection::vec((0u64..1000, 0u64..1000), 0..20)) {
            let files: Vec<_> = churn
                .iter()
                .enumerate()
                .map(|(i, (a, d))| file(&format!("f{i}"), "modified", *a, *d))
                .collect();
            let a: u64 = churn.iter().map(|(a, _)| a).sum();
            let d: u64 = churn.iter().map(|(_, d)| d).sum();
            prop_assert_eq!(summarize(&files).diff_stats, format!("{} files, +{} -{}", files.len(), a, d));
        }

        #[test]
        fn lists_files_in_order_and_caps_top(files in prop::collection::vec(arb_changed_file(), 0..12)) {
            let s = summarize(&files);
            let names: Vec<_> = files.iter().map(|f| f.filename.clone()).collect();
            prop_assert_eq!(&s.files_changed, &names);
            let listed = s.summary.matches(" (+").count();
            prop_assert_eq!(listed, files.len().min(TOP_FILES));
        }

        #[test]
        fn group_counts_add_up(statuses in prop::collection::vec(prop::sample::select(vec!["added", "modified", "removed"]), 1..30)) {
            let files: Vec<_> = statuses
                .iter()
                .enumerate()
                .map(|(i, s)| file(&format!("f{i}"), s, 0, 0))
                .collect();
            let summary = summarize(&files).summary;
            let groups = summary.split(". Most changed:").next().unwrap();
            let total: usize = groups
                .split(", ")
                .map(|g| g.split(' ').next().unwrap().parse::<usize>().unwrap())
                .sum();
            prop_assert_eq!(total, files.len());
        }
    }
}
