pub mod golden_section;

pub use golden_section::{GOLDEN_RATIO, golden_section_search};

/// Whether `current` differs from `previous` by at most `rtol_percent`
/// percent of `previous`. A zero baseline only accepts an exact match.
pub fn within_percent(previous: f64, current: f64, rtol_percent: f64) -> bool {
    if previous == 0.0 {
        return current == 0.0;
    }
    ((current - previous) / previous).abs() * 100.0 <= rtol_percent
}
