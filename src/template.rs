use std::borrow::Cow;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::value::to_display_string;

/// Replace every placeholder matched by `delimiter` with its evaluated value.
///
/// Placeholders whose expression evaluates to the absent sentinel (`None`)
/// are left verbatim. Text without any match is returned borrowed.
pub fn substitute<'a, F>(delimiter: &Regex, source: &'a str, mut evaluate: F) -> Cow<'a, str>
where
    F: FnMut(&str) -> Option<Value>,
{
    if !delimiter.is_match(source) {
        return Cow::Borrowed(source);
    }
    delimiter.replace_all(source, |caps: &Captures<'_>| {
        let expression = caps.get(1).map_or("", |m| m.as_str());
        match evaluate(expression) {
            Some(value) => to_display_string(Some(&value)),
            None => caps[0].to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn default_delimiter() -> Regex {
        Regex::new(crate::config::DEFAULT_TEMPLATE_DELIMITER).unwrap()
    }

    #[test]
    fn untouched_without_placeholders() {
        let out = substitute(&default_delimiter(), "plain $ {text}", |_| Some(json!("x")));
        assert!(matches!(out, Cow::Borrowed("plain $ {text}")));
    }

    #[test]
    fn every_placeholder_is_replaced() {
        let mut seen = Vec::new();
        let out = substitute(&default_delimiter(), "${a}-${b}-${a}", |e| {
            seen.push(e.to_string());
            Some(json!(e.len()))
        });
        assert_eq!(out, "1-1-1");
        assert_eq!(seen, vec!["a", "b", "a"]);
    }

    #[test]
    fn absent_results_keep_the_placeholder() {
        let out = substitute(&default_delimiter(), "Hi ${name}, ${n}", |e| {
            (e == "n").then(|| json!(3))
        });
        assert_eq!(out, "Hi ${name}, 3");
    }

    #[test]
    fn repeated_calls_do_not_skip_matches() {
        let re = default_delimiter();
        for _ in 0..3 {
            assert_eq!(substitute(&re, "${x}", |_| Some(json!(1))), "1");
        }
    }

    #[test]
    fn custom_delimiters_work() {
        let re = Regex::new(r"\{\{\s*(.+?)\s*\}\}").unwrap();
        assert_eq!(substitute(&re, "{{ a }}!", |_| Some(json!("A"))), "A!");
    }
}
