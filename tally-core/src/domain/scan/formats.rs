// tally-core/src/domain/scan/formats.rs

// Named regex registries for `valid_format` and `missing_format`.
// Patterns stay within the RE2/POSIX subset every supported warehouse accepts
// (no look-arounds, no backreferences).

pub const NUMBER_FORMAT_PREFIX: &str = "number_";

pub const VALIDITY_FORMATS: &[(&str, &str)] = &[
    ("number_whole", r"^\-?[0-9]+$"),
    ("number_decimal_point", r"^\-?[0-9]+\.[0-9]+$"),
    ("number_decimal_comma", r"^\-?[0-9]+,[0-9]+$"),
    ("number_percentage", r"^\-?[0-9]+([\.,][0-9]+)? ?%$"),
    ("number_money_usd", r"^\-?\$ ?[0-9]{1,3}(,?[0-9]{3})*(\.[0-9]{2})?$"),
    ("number_money_eur", r"^\-?[0-9]{1,3}(\.?[0-9]{3})*(,[0-9]{2})? ?€$"),
    ("number_money_gbp", r"^\-?£ ?[0-9]{1,3}(,?[0-9]{3})*(\.[0-9]{2})?$"),
    ("email", r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$"),
    ("phone_number", r"^\+?[0-9 ()\.\-]{6,20}$"),
    ("credit_card_number", r"^[0-9]{4}[ \-]?[0-9]{4}[ \-]?[0-9]{4}[ \-]?[0-9]{1,4}$"),
    ("ip_address", r"^([0-9]{1,3}\.){3}[0-9]{1,3}$"),
    (
        "uuid",
        r"^[0-9a-fA-F]{8}\-[0-9a-fA-F]{4}\-[0-9a-fA-F]{4}\-[0-9a-fA-F]{4}\-[0-9a-fA-F]{12}$",
    ),
    ("date_eu", r"^([0-2]?[0-9]|3[01])[/\.\-](0?[1-9]|1[0-2])[/\.\-][0-9]{4}$"),
    ("date_us", r"^(0?[1-9]|1[0-2])[/\.\-]([0-2]?[0-9]|3[01])[/\.\-][0-9]{4}$"),
    ("date_inverse", r"^[0-9]{4}[/\.\-](0?[1-9]|1[0-2])[/\.\-]([0-2]?[0-9]|3[01])$"),
    ("time", r"^([01]?[0-9]|2[0-3]):[0-5][0-9](:[0-5][0-9])?$"),
];

pub const MISSING_FORMATS: &[(&str, &str)] = &[("empty", r"^$"), ("whitespace", r"^\s*$")];

pub fn validity_format(name: &str) -> Option<&'static str> {
    lookup(VALIDITY_FORMATS, name)
}

pub fn missing_format(name: &str) -> Option<&'static str> {
    lookup(MISSING_FORMATS, name)
}

/// `number_*` formats describe numbers stored as text; the builder casts them.
pub fn is_number_format(name: &str) -> bool {
    name.starts_with(NUMBER_FORMAT_PREFIX)
}

fn lookup(registry: &[(&str, &'static str)], name: &str) -> Option<&'static str> {
    registry
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, pattern)| *pattern)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_every_registered_pattern_compiles() {
        for (name, pattern) in VALIDITY_FORMATS.iter().chain(MISSING_FORMATS) {
            assert!(Regex::new(pattern).is_ok(), "format {name} does not compile");
        }
    }

    #[test]
    fn test_email_format_matches() {
        let re = Regex::new(validity_format("email").unwrap()).unwrap();
        assert!(re.is_match("jane.doe@example.org"));
        assert!(!re.is_match("not an email"));
    }

    #[test]
    fn test_number_formats() {
        assert!(is_number_format("number_whole"));
        assert!(!is_number_format("email"));
        let re = Regex::new(validity_format("number_decimal_point").unwrap()).unwrap();
        assert!(re.is_match("-12.50"));
        assert!(!re.is_match("12,50"));
    }

    #[test]
    fn test_missing_formats() {
        let re = Regex::new(missing_format("whitespace").unwrap()).unwrap();
        assert!(re.is_match("   "));
        assert!(missing_format("unknown").is_none());
    }
}
