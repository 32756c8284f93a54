//! `$name` substitution, applied to the raw line before tokenizing.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::context::Variables;
use crate::error::{VshError, VshResult};

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\$(\w+)").unwrap()
});

/// Replaces every `$name` in `line`. Each distinct name is looked up once,
/// in the order it first appears. If any name is unbound the line is left
/// untouched and the leftmost unbound reference is reported.
pub fn resolve(line: &str, variables: &dyn Variables) -> VshResult<String> {
    let mut bindings = HashMap::new();
    for name in VARIABLE
        .captures_iter(line)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
    {
        if bindings.contains_key(name) {
            continue;
        }
        let value = variables
            .lookup(name)
            .ok_or_else(|| VshError::UnboundVariable(format!("${name}")))?;
        bindings.insert(name, value);
    }
    if bindings.is_empty() {
        return Ok(line.to_string());
    }

    // The pattern is greedy over word characters, so `$ab` is always taken
    // whole and never as `$a` followed by `b`.
    Ok(VARIABLE
        .replace_all(line, |caps: &Captures| {
            let name = caps.get(1).map_or("", |m| m.as_str());
            bindings.get(name).cloned().unwrap_or_default()
        })
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        values: HashMap<String, String>,
        lookups: RefCell<Vec<String>>,
    }

    impl Recorder {
        fn with(pairs: &[(&str, &str)]) -> Self {
            Self {
                values: pairs
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
                lookups: RefCell::default(),
            }
        }
    }

    impl Variables for Recorder {
        fn lookup(&self, name: &str) -> Option<String> {
            self.lookups.borrow_mut().push(name.to_string());
            self.values.get(name).cloned()
        }
    }

    #[test]
    fn repeated_name_is_looked_up_once() {
        let vars = Recorder::with(&[("a", "1")]);
        assert_eq!(resolve("echo $a $a", &vars).unwrap(), "echo 1 1");
        assert_eq!(vars.lookups.borrow().as_slice(), ["a"]);
    }

    #[test]
    fn unbound_name_fails_without_substitution() {
        let vars = Recorder::with(&[("a", "1")]);
        let err = resolve("echo $a $missing", &vars).unwrap_err();
        assert!(matches!(err, VshError::UnboundVariable(ref name) if name == "$missing"));
    }

    #[test]
    fn leftmost_unbound_name_is_reported() {
        let vars = Recorder::default();
        let err = resolve("echo $zeta $alpha", &vars).unwrap_err();
        assert!(matches!(err, VshError::UnboundVariable(ref name) if name == "$zeta"));
        assert_eq!(vars.lookups.borrow().as_slice(), ["zeta"]);
    }

    #[test]
    fn longer_names_are_not_clobbered() {
        let vars = Recorder::with(&[("a", "short"), ("ab", "long")]);
        assert_eq!(resolve("$ab $a", &vars).unwrap(), "long short");
    }

    #[test]
    fn numbered_and_adjacent_references() {
        let vars = Recorder::with(&[("0", "s.vsh"), ("1", "x"), ("argc", "1")]);
        assert_eq!(resolve("$0:$1/$argc", &vars).unwrap(), "s.vsh:x/1");
    }

    #[test]
    fn lone_dollar_is_literal() {
        let vars = Recorder::default();
        assert_eq!(resolve("cost $ 5 $-x", &vars).unwrap(), "cost $ 5 $-x");
        assert!(vars.lookups.borrow().is_empty());
    }
}
