//! Name canonicalization. Everything that compares two names compares
//! their normalized keys, never the raw strings.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::IdentityKeyPolicy;
use crate::model::StudentRecord;
use crate::signal;

/// Canonical comparison key for a free-text name.
///
/// Case-folds, strips diacritics (NFD, then drops combining marks), and
/// collapses every run of non-alphanumeric characters to a single space.
/// Idempotent: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let mut key = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_alphanumeric() {
            if pending_space && !key.is_empty() {
                key.push(' ');
            }
            pending_space = false;
            for lower in c.to_lowercase() {
                key.push(lower);
            }
        } else {
            pending_space = true;
        }
    }
    key
}

/// Grouping key for duplicate detection. Empty means "cannot be keyed";
/// such records are never grouped.
///
/// Under `NameBirthYear`, records without a parseable year get a distinct
/// marker suffix so they cannot merge with year-bearing records.
pub fn identity_key(record: &StudentRecord, policy: IdentityKeyPolicy) -> String {
    let name_key = normalize(&record.display_name);
    if name_key.is_empty() {
        return String::new();
    }
    match policy {
        IdentityKeyPolicy::Name => name_key,
        IdentityKeyPolicy::NameBirthYear => {
            match record.birth_date.as_deref().and_then(signal::birth_year) {
                Some(year) => format!("{name_key}|{year}"),
                None => format!("{name_key}|?"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn student(name: &str, birth_date: Option<&str>) -> StudentRecord {
        StudentRecord {
            id: 1,
            display_name: name.to_string(),
            birth_date: birth_date.map(String::from),
            group_ref: None,
            dependents: BTreeMap::new(),
        }
    }

    #[test]
    fn casefold_and_trim() {
        assert_eq!(normalize("  ANA   SILVA "), "ana silva");
    }

    #[test]
    fn strips_diacritics() {
        assert_eq!(normalize("José da Conceição"), "jose da conceicao");
        assert_eq!(normalize("Müller"), "muller");
    }

    #[test]
    fn punctuation_collapses_to_single_space() {
        assert_eq!(normalize("Ana-Maria d'Ávila"), "ana maria d avila");
        assert_eq!(normalize("O'Neil, John"), "o neil john");
    }

    #[test]
    fn all_punctuation_is_empty() {
        assert_eq!(normalize("---"), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn idempotent() {
        for raw in ["  ANA   SILVA ", "José d'Ávila", "x—y–z", "ŁUKASZ"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn identity_key_name_only() {
        let r = student("Ana SILVA", Some("2015-03-02"));
        assert_eq!(identity_key(&r, IdentityKeyPolicy::Name), "ana silva");
    }

    #[test]
    fn identity_key_with_birth_year() {
        let r = student("Ana SILVA", Some("2015-03-02"));
        assert_eq!(identity_key(&r, IdentityKeyPolicy::NameBirthYear), "ana silva|2015");
    }

    #[test]
    fn unknown_year_keys_apart_from_known_year() {
        let with_year = student("Ana Silva", Some("2015-03-02"));
        let without = student("Ana Silva", None);
        let garbled = student("Ana Silva", Some("03/02"));
        let a = identity_key(&with_year, IdentityKeyPolicy::NameBirthYear);
        let b = identity_key(&without, IdentityKeyPolicy::NameBirthYear);
        let c = identity_key(&garbled, IdentityKeyPolicy::NameBirthYear);
        assert_ne!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn unnameable_record_has_empty_key() {
        let r = student("???", Some("2015-03-02"));
        assert_eq!(identity_key(&r, IdentityKeyPolicy::NameBirthYear), "");
    }
}
