//! Location filter for feed documents.
//!
//! Patterns are evaluated in the order they were configured and the first
//! match wins. Warnings that match no pattern are dropped silently.

use regex::Regex;

use crate::errors::WarnError;
use crate::models::{Warning, WeatherInfo};

/// Ordered set of compiled location patterns.
#[derive(Debug, Clone)]
pub struct LocationMatcher {
    patterns: Vec<Regex>,
}

impl LocationMatcher {
    /// Compile `patterns`, keeping their order.
    ///
    /// An empty or invalid pattern fails construction.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, WarnError> {
        let mut compiled = Vec::with_capacity(patterns.len());

        for p in patterns {
            let p = p.as_ref();
            if p.trim().is_empty() {
                return Err(WarnError::Config(
                    "Empty location pattern would match every region".to_string(),
                ));
            }
            tracing::debug!("Add location pattern {}", p);
            let re = Regex::new(p).map_err(|e| {
                tracing::error!("Cannot compile location pattern {:?}: {}", p, e);
                WarnError::Config(format!("Invalid location pattern {:?}: {}", p, e))
            })?;
            compiled.push(re);
        }

        if compiled.is_empty() {
            tracing::warn!("No location patterns configured, every warning will be dropped");
        }
        tracing::debug!(
            "Matcher has {} regular expressions for matching locations",
            compiled.len()
        );

        Ok(Self { patterns: compiled })
    }

    /// Index of the first pattern matching `location`.
    pub fn first_match(&self, location: &str) -> Option<usize> {
        self.patterns.iter().position(|re| re.is_match(location))
    }

    pub fn is_relevant(&self, location: &str) -> bool {
        self.first_match(location).is_some()
    }

    /// The configured patterns, in evaluation order.
    pub fn patterns(&self) -> Vec<&str> {
        self.patterns.iter().map(Regex::as_str).collect()
    }

    /// Consume a document and return the relevant warnings.
    ///
    /// Active warnings come first, then preliminary ones; within each map
    /// categories are visited in ascending key order. Each returned warning
    /// carries the key it was read under as its category id.
    pub fn select(&self, info: WeatherInfo) -> Vec<Warning> {
        let mut selected = Vec::new();

        for (category_id, warnings) in info.warnings.into_iter().chain(info.preliminary) {
            for mut w in warnings {
                if self.is_relevant(&w.location) {
                    w.category_id = category_id;
                    selected.push(w);
                }
            }
        }

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::warning_json;

    fn info(doc: serde_json::Value) -> WeatherInfo {
        serde_json::from_value(doc).unwrap()
    }

    fn locations(list: &[Warning]) -> Vec<&str> {
        list.iter().map(|w| w.location.as_str()).collect()
    }

    #[test]
    fn test_new_rejects_invalid_pattern() {
        let result = LocationMatcher::new(&["Kreis (Vechta"]);
        assert!(matches!(result, Err(WarnError::Config(_))));
    }

    #[test]
    fn test_new_rejects_empty_pattern() {
        let result = LocationMatcher::new(&["Helgoland", ""]);
        assert!(matches!(result, Err(WarnError::Config(_))));
    }

    #[test]
    fn test_new_keeps_order() {
        let m = LocationMatcher::new(&["Bielefeld", "Berchtesgaden", "Diepholz"]).unwrap();
        assert_eq!(m.patterns(), vec!["Bielefeld", "Berchtesgaden", "Diepholz"]);
    }

    #[test]
    fn test_first_match_wins_for_overlapping_patterns() {
        let m = LocationMatcher::new(&["Starnberger", "Starnberger See"]).unwrap();
        assert_eq!(m.first_match("Starnberger See"), Some(0));

        let m = LocationMatcher::new(&["Starnberger See", "Starnberger"]).unwrap();
        assert_eq!(m.first_match("Starnberger See"), Some(0));
        assert_eq!(m.first_match("Kreis Starnberg"), None);
        assert_eq!(m.first_match("Landkreis Starnberger Land"), Some(1));
    }

    #[test]
    fn test_starnberger_see_gets_category_one() {
        let doc = info(serde_json::json!({
            "time": 1_627_052_765_000i64,
            "warnings": { "1": [warning_json("Starnberger See", "FROST", 0)] },
            "vorabInformation": {},
            "copyright": "Copyright Deutscher Wetterdienst"
        }));
        let m = LocationMatcher::new(&["Starnberger.*"]).unwrap();
        let list = m.select(doc);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].category_id, 1);
    }

    #[test]
    fn test_select_expected_locations_from_both_maps() {
        let doc = info(serde_json::json!({
            "time": 1_627_052_765_000i64,
            "warnings": {
                "31": [
                    warning_json("Kreis Ludwigsburg", "GEWITTER", 0),
                    warning_json("Kreis Vechta", "STARKREGEN", 0)
                ],
                "5": [warning_json("Kreis und Stadt Heilbronn", "GEWITTER", 0)],
                "57": [warning_json("Elbe von Hamburg bis Cuxhaven", "STURMBÖEN", 0)]
            },
            "vorabInformation": {
                "11": [
                    warning_json("Helgoland", "STURM", 0),
                    warning_json("Kreis Berchtesgadener Land", "DAUERREGEN", 0)
                ]
            },
            "copyright": "Copyright Deutscher Wetterdienst"
        }));
        let m = LocationMatcher::new(&[
            "Ludwigsburg",
            "Vechta",
            "Heilbronn",
            "^Elbe",
            "Helgoland",
            "Berchtesgaden",
        ])
        .unwrap();

        let list = m.select(doc);
        assert_eq!(
            locations(&list),
            vec![
                "Kreis und Stadt Heilbronn",
                "Kreis Ludwigsburg",
                "Kreis Vechta",
                "Elbe von Hamburg bis Cuxhaven",
                "Helgoland",
                "Kreis Berchtesgadener Land",
            ]
        );
        assert_eq!(list[0].category_id, 5);
        assert_eq!(list[4].category_id, 11);
    }

    #[test]
    fn test_select_drops_unmatched() {
        let doc = info(serde_json::json!({
            "time": 1,
            "warnings": {
                "1": [
                    warning_json("Kreis Altötting", "FROST", 0),
                    warning_json("Kreis und Stadt Passau", "FROST", 0)
                ]
            },
            "vorabInformation": {}
        }));
        let m = LocationMatcher::new(&["Passau"]).unwrap();
        let list = m.select(doc);
        assert_eq!(locations(&list), vec!["Kreis und Stadt Passau"]);
    }

    #[test]
    fn test_select_with_no_patterns_is_empty() {
        let doc = info(serde_json::json!({
            "time": 1,
            "warnings": { "1": [warning_json("Helgoland", "STURM", 0)] },
            "vorabInformation": {}
        }));
        let m = LocationMatcher::new::<&str>(&[]).unwrap();
        assert!(m.select(doc).is_empty());
    }

    #[test]
    fn test_warning_matching_two_patterns_is_emitted_once() {
        let doc = info(serde_json::json!({
            "time": 1,
            "warnings": { "2": [warning_json("Kreis Rostock - Küste", "STURM", 0)] },
            "vorabInformation": {}
        }));
        let m = LocationMatcher::new(&["Rostock", "Küste"]).unwrap();
        assert_eq!(m.select(doc).len(), 1);
    }
}
