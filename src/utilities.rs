//! Small helpers shared across the crawl: the accumulator queue and stable
//! fingerprints for run identification.

pub mod thread_safe_queue;

/// SHA-256 fingerprint of an unordered set of strings.
///
/// The parts are sorted and de-duplicated first, so the same seed list in a
/// different order (or with repeats) yields the same fingerprint. This is
/// what ties a checkpoint file to the run that wrote it.
///
/// # Example
/// ```
/// use moss_harvest::utilities::fingerprint;
///
/// let a = fingerprint(&["pypi:keras", "cran:ggplot2"]);
/// let b = fingerprint(&["cran:ggplot2", "pypi:keras", "pypi:keras"]);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn fingerprint<S: AsRef<str>>(parts: &[S]) -> String {
    use sha2::{Digest, Sha256};
    let mut sorted: Vec<&str> = parts.iter().map(|p| p.as_ref()).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut hasher = Sha256::new();
    for part in sorted {
        hasher.update(part.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
