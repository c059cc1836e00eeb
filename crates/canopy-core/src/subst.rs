//! `${name}` placeholder expansion for preview inspection.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder regex"))
}

/// Expand `${name}` placeholders from `variables`.
///
/// Unknown placeholders are left verbatim so an unresolved variable stays
/// visible in the preview instead of silently vanishing.
pub fn substitute(input: &str, variables: &HashMap<String, String>) -> String {
    if variables.is_empty() {
        return input.to_string();
    }
    placeholder()
        .replace_all(input, |caps: &Captures<'_>| {
            match variables.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_placeholders() {
        let out = substitute("/services/${env}/config", &vars(&[("env", "prod")]));
        assert_eq!(out, "/services/prod/config");
    }

    #[test]
    fn unknown_placeholders_stay_verbatim() {
        let out = substitute("/services/${env}/config", &vars(&[("other", "x")]));
        assert_eq!(out, "/services/${env}/config");
    }

    #[test]
    fn multiple_placeholders_in_one_string() {
        let out = substitute(
            "${proto}://${host}/path",
            &vars(&[("proto", "zk"), ("host", "node-1")]),
        );
        assert_eq!(out, "zk://node-1/path");
    }

    #[test]
    fn empty_variable_map_is_identity() {
        let out = substitute("/plain/${env}", &HashMap::new());
        assert_eq!(out, "/plain/${env}");
    }
}
