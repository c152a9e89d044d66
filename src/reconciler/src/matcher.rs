//! Exact, case-sensitive string-set helpers.

/// Whether `needle` is present in `haystack`.
pub fn contains<S: AsRef<str>>(needle: &str, haystack: &[S]) -> bool {
    haystack.iter().any(|candidate| candidate.as_ref() == needle)
}

/// Every element of `candidates` that is not in `reference`, in the order of `candidates`.
pub fn set_difference<R, C>(reference: &[R], candidates: &[C]) -> Vec<String>
where
    R: AsRef<str>,
    C: AsRef<str>,
{
    candidates
        .iter()
        .map(AsRef::as_ref)
        .filter(|candidate| !contains(candidate, reference))
        .map(String::from)
        .collect()
}
