//! Volume names owned by a user.

/// Names of the volumes belonging to `username`, one per suffix, in suffix order.
///
/// Suffixes carry their own delimiter (`-home`), so the two parts are joined verbatim.
pub fn derive_volume_names<S: AsRef<str>>(username: &str, suffixes: &[S]) -> Vec<String> {
    suffixes
        .iter()
        .map(|suffix| format!("{username}{}", suffix.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_volume_names_in_suffix_order() {
        let names = derive_volume_names("pbotros", &["-home", "-datasets"]);
        assert_eq!(names, vec!["pbotros-home", "pbotros-datasets"]);
    }

    #[test]
    fn test_suffix_joined_verbatim() {
        let names = derive_volume_names("btice", &["_scratch", ".nfs"]);
        assert_eq!(names, vec!["btice_scratch", "btice.nfs"]);
    }

    #[test]
    fn test_no_suffixes_no_volumes() {
        let none: [&str; 0] = [];
        assert!(derive_volume_names("btice", &none).is_empty());
    }
}
