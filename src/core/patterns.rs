//! Purpose: Build anchored, case-insensitive alternation patterns from literals.
//! Exports: `insensitive_patterns`, `compile_insensitive`.
//! Role: Value validation for enumerated config fields (e.g. test severity).
//! Invariants: Output is `^(...)$`; each character becomes `[<upper><lower>]`,
//! or a `(?:..|..)` group when a case form spans several characters.
//! Invariants: Class metacharacters are escaped; every word matches itself.
use regex::Regex;

use crate::core::error::{Error, ErrorKind};

pub fn insensitive_patterns(patterns: &[&str]) -> String {
    let alternatives = patterns
        .iter()
        .map(|pattern| pattern.chars().map(bracket_both_cases).collect::<String>())
        .collect::<Vec<_>>();
    format!("^({})$", alternatives.join("|"))
}

pub fn compile_insensitive(patterns: &[&str]) -> Result<Regex, Error> {
    let source = insensitive_patterns(patterns);
    Regex::new(&source).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message(format!("invalid generated pattern {source}"))
            .with_source(err)
    })
}

fn bracket_both_cases(ch: char) -> String {
    let upper = ch.to_uppercase().collect::<String>();
    let lower = ch.to_lowercase().collect::<String>();
    if upper.chars().count() != 1 || lower.chars().count() != 1 {
        return multi_char_cases(ch, &upper, &lower);
    }
    let mut out = String::from("[");
    push_class_literal(&upper, &mut out);
    push_class_literal(&lower, &mut out);
    out.push(']');
    out
}

// Case forms longer than one char (`ß` uppercases to `SS`) cannot share a class.
fn multi_char_cases(ch: char, upper: &str, lower: &str) -> String {
    let mut forms: Vec<String> = Vec::with_capacity(3);
    for form in [upper.to_string(), lower.to_string(), ch.to_string()] {
        if !forms.contains(&form) {
            forms.push(form);
        }
    }
    let escaped = forms.iter().map(|form| regex::escape(form)).collect::<Vec<_>>();
    format!("(?:{})", escaped.join("|"))
}

// `&&` and `~~` are set operators inside a class, so `&` and `~` are escaped too.
fn push_class_literal(text: &str, out: &mut String) {
    for ch in text.chars() {
        if matches!(ch, '\\' | ']' | '[' | '^' | '-' | '&' | '~') {
            out.push('\\');
        }
        out.push(ch);
    }
}

#[cfg(test)]
mod tests {
    use super::{compile_insensitive, insensitive_patterns};
    use regex::Regex;

    #[test]
    fn single_word_expands_each_character() {
        assert_eq!(insensitive_patterns(&["run"]), "^([Rr][Uu][Nn])$");
    }

    #[test]
    fn multiple_words_become_alternatives() {
        assert_eq!(
            insensitive_patterns(&["warn", "error"]),
            "^([Ww][Aa][Rr][Nn]|[Ee][Rr][Rr][Oo][Rr])$"
        );
    }

    #[test]
    fn non_alphabetic_characters_repeat() {
        assert_eq!(insensitive_patterns(&["a_1"]), "^([Aa][__][11])$");
    }

    #[test]
    fn bracket_metacharacters_are_escaped() {
        let source = insensitive_patterns(&["a-b"]);
        assert_eq!(source, r"^([Aa][\-\-][Bb])$");
        let re = Regex::new(&source).expect("compiles");
        assert!(re.is_match("A-b"));
        assert!(!re.is_match("A_b"));
    }

    #[test]
    fn class_set_operators_are_escaped() {
        assert_eq!(insensitive_patterns(&["a&b"]), r"^([Aa][\&\&][Bb])$");
        for word in ["a&b", "a~b", "r&&d", "x~~y", "&~&", "[^-]\\"] {
            let re = compile_insensitive(&[word]).expect("regex");
            assert!(re.is_match(word), "{word} should match itself");
            assert!(re.is_match(&word.to_uppercase()), "{word} uppercased should match");
        }
        let re = compile_insensitive(&["a&b"]).expect("regex");
        assert!(!re.is_match("a&&b"));
        assert!(!re.is_match("ab"));
    }

    #[test]
    fn multi_char_case_forms_use_groups() {
        assert_eq!(insensitive_patterns(&["ß"]), "^((?:SS|ß))$");
        let re = compile_insensitive(&["straße"]).expect("regex");
        for candidate in ["straße", "STRASSE", "Straße"] {
            assert!(re.is_match(candidate), "{candidate} should match");
        }
        assert!(!re.is_match("STRASE"));
    }

    #[test]
    fn matches_every_casing_and_nothing_else() {
        let re = compile_insensitive(&["run"]).expect("regex");
        for candidate in ["run", "ruN", "rUn", "rUN", "Run", "RuN", "RUn", "RUN"] {
            assert!(re.is_match(candidate), "{candidate} should match");
        }
        for candidate in ["running", "ru", "rerun", " run", ""] {
            assert!(!re.is_match(candidate), "{candidate} should not match");
        }
    }

    #[test]
    fn empty_input_matches_only_empty_subject() {
        let re = compile_insensitive(&[]).expect("regex");
        assert!(re.is_match(""));
        assert!(!re.is_match("x"));
    }
}
