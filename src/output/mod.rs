mod progress;
mod styling;
mod summary;

pub use progress::RunProgress;
pub use styling::{dim, magenta_bold};
pub use summary::print_summary;

/// Prints the extractor banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("📦 extractor"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("CI pipeline mock extractor")
    );
}
