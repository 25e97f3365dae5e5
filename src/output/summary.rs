use std::fmt::Write;
use std::path::Path;

use crate::scheduler::RunSummary;

use super::styling::{bright, bright_green, bright_yellow, cyan, dim};

/// Prints the outcome of a run to stdout.
pub fn print_summary(summary: &RunSummary, root: &Path) {
    println!("{}", render_summary(summary, root));
}

fn render_summary(summary: &RunSummary, root: &Path) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "{} {}", bright("📊"), bright("Summary").underlined());
    let _ = writeln!(
        output,
        "  {} {}",
        cyan("Pipelines extracted:"),
        bright_green(summary.pipelines_extracted)
    );
    if summary.pipelines_skipped > 0 {
        let _ = writeln!(
            output,
            "  {} {}",
            cyan("Pipelines skipped:  "),
            bright_yellow(summary.pipelines_skipped)
        );
    }
    let _ = writeln!(
        output,
        "  {} {}",
        cyan("Files written:      "),
        summary.files_written
    );
    let _ = writeln!(
        output,
        "  {} {}",
        cyan("Peak parallel tasks:"),
        summary.peak_concurrency
    );
    let _ = write!(
        output,
        "  {} {}",
        cyan("Snapshot directory: "),
        dim(root.display())
    );

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(skipped: usize) -> RunSummary {
        RunSummary {
            pipelines_extracted: 2,
            pipelines_skipped: skipped,
            files_written: 34,
            peak_concurrency: 10,
        }
    }

    #[test]
    fn test_render_summary_lists_counts() {
        console::set_colors_enabled(false);
        let rendered = render_summary(&summary(0), Path::new("./mocks"));

        assert!(rendered.contains("Pipelines extracted: 2"));
        assert!(rendered.contains("Files written:       34"));
        assert!(rendered.contains("Peak parallel tasks: 10"));
        assert!(rendered.contains("./mocks"));
        assert!(!rendered.contains("skipped"));
    }

    #[test]
    fn test_render_summary_mentions_skipped_pipelines() {
        console::set_colors_enabled(false);
        let rendered = render_summary(&summary(1), Path::new("./mocks"));
        assert!(rendered.contains("Pipelines skipped:   1"));
    }
}
