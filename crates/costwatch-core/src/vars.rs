//! `<name>` placeholder substitution for endpoint templates.

use std::collections::BTreeMap;

use crate::error::SubstitutionError;

/// Substitution passes allowed before the input is declared non-terminating.
/// A replacement value may legitimately introduce further placeholders, but
/// any sane nesting settles well below this.
const MAX_PASSES: usize = 64;

/// Replaces every `<name>` span in `text` using `vars`.
///
/// Lookup order per placeholder: the mapping first; if the mapped value is
/// identical to its own upper-cased form, it names a process environment
/// variable and the final value is read from there. Absent mapping entries
/// and absent environment variables both resolve to the empty string.
///
/// # Errors
///
/// Returns [`SubstitutionError::Unterminated`] when placeholders remain after
/// the pass budget, which only happens for self-referential inputs.
pub fn substitute(
    text: &str,
    vars: &BTreeMap<String, String>,
) -> Result<String, SubstitutionError> {
    let mut out = text.to_owned();
    for _ in 0..MAX_PASSES {
        let Some((start, end)) = find_placeholder(&out) else {
            return Ok(out);
        };
        let name = &out[start + 1..end - 1];
        let mut value = vars.get(name).cloned().unwrap_or_default();
        if value == value.to_uppercase() {
            value = std::env::var(&value).unwrap_or_default();
        }
        let span = out[start..end].to_owned();
        out = out.replace(&span, &value);
    }
    Err(SubstitutionError::Unterminated {
        limit: MAX_PASSES,
        text: out,
    })
}

/// Byte range of the leftmost `<...>` span, shortest match.
fn find_placeholder(text: &str) -> Option<(usize, usize)> {
    let start = text.find('<')?;
    let close = text[start..].find('>')?;
    Some((start, start + close + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let out = substitute("https://api.example.test/usage", &vars(&[])).unwrap();
        assert_eq!(out, "https://api.example.test/usage");
    }

    #[test]
    fn placeholder_resolves_from_mapping() {
        let out = substitute("<X>", &vars(&[("X", "v")])).unwrap();
        assert_eq!(out, "v");
    }

    #[test]
    fn uppercase_value_falls_back_to_environment() {
        std::env::set_var("COSTWATCH_TEST_FOO", "bar");
        let out = substitute("<Y>", &vars(&[("Y", "COSTWATCH_TEST_FOO")])).unwrap();
        assert_eq!(out, "bar");
    }

    #[test]
    fn absent_mapping_entry_resolves_to_empty() {
        let out = substitute("a<missing>b", &vars(&[])).unwrap();
        assert_eq!(out, "ab");
    }

    #[test]
    fn repeated_placeholder_is_replaced_everywhere() {
        let out = substitute("<id>/<id>", &vars(&[("id", "vm-1")])).unwrap();
        assert_eq!(out, "vm-1/vm-1");
    }

    #[test]
    fn nested_replacement_resolves_in_later_pass() {
        let out = substitute("<a>", &vars(&[("a", "x<b>y"), ("b", "z")])).unwrap();
        assert_eq!(out, "xzy");
    }

    #[test]
    fn self_referential_input_errors_instead_of_looping() {
        let err = substitute("<a>", &vars(&[("a", "<a>")])).unwrap_err();
        assert!(matches!(err, SubstitutionError::Unterminated { .. }));
    }
}
