//! Element facts: properties, attributes, styles and event bindings
//!
//! Facts are organized into one bucket per kind, keyed by name. Within a
//! snapshot the last write for a key wins, except class names which are
//! space-joined the way a browser would accumulate them.

use crate::event::Handler;
use serde_json::Value;
use std::collections::BTreeMap;

/// A single unorganized fact, as application code writes them
#[derive(Debug, Clone)]
pub enum Fact {
    Property(String, Value),
    Attribute(String, String),
    AttributeNs {
        namespace: String,
        key: String,
        value: String,
    },
    Style(String, String),
    Event(String, Handler),
}

impl Fact {
    pub fn property(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Property(key.into(), value.into())
    }

    pub fn attribute(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Attribute(key.into(), value.into())
    }

    pub fn attribute_ns(
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::AttributeNs {
            namespace: namespace.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn style(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Style(key.into(), value.into())
    }

    pub fn on(event: impl Into<String>, handler: Handler) -> Self {
        Self::Event(event.into(), handler)
    }

    /// `className` property shorthand
    pub fn class(name: impl Into<String>) -> Self {
        Self::Property("className".to_string(), Value::String(name.into()))
    }
}

/// Namespaced attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsAttribute {
    pub namespace: String,
    pub value: String,
}

/// Facts bucketed by kind
#[derive(Debug, Clone, Default)]
pub struct OrganizedFacts {
    pub properties: BTreeMap<String, Value>,
    pub attributes: BTreeMap<String, String>,
    pub attributes_ns: BTreeMap<String, NsAttribute>,
    pub styles: BTreeMap<String, String>,
    pub events: BTreeMap<String, Handler>,
}

impl OrganizedFacts {
    pub fn organize(facts: impl IntoIterator<Item = Fact>) -> Self {
        let mut organized = Self::default();
        for fact in facts {
            match fact {
                Fact::Property(key, value) => {
                    if key == "className" {
                        if let (Some(Value::String(existing)), Value::String(added)) =
                            (organized.properties.get_mut(&key), &value)
                        {
                            existing.push(' ');
                            existing.push_str(added);
                            continue;
                        }
                    }
                    organized.properties.insert(key, value);
                }
                Fact::Attribute(key, value) => {
                    if key == "class" {
                        if let Some(existing) = organized.attributes.get_mut(&key) {
                            existing.push(' ');
                            existing.push_str(&value);
                            continue;
                        }
                    }
                    organized.attributes.insert(key, value);
                }
                Fact::AttributeNs {
                    namespace,
                    key,
                    value,
                } => {
                    organized
                        .attributes_ns
                        .insert(key, NsAttribute { namespace, value });
                }
                Fact::Style(key, value) => {
                    organized.styles.insert(key, value);
                }
                Fact::Event(key, handler) => {
                    organized.events.insert(key, handler);
                }
            }
        }
        organized
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
            && self.attributes.is_empty()
            && self.attributes_ns.is_empty()
            && self.styles.is_empty()
            && self.events.is_empty()
    }

    /// All keys across buckets, prefixed by bucket name
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        keys.extend(self.properties.keys().map(|k| format!("property:{k}")));
        keys.extend(self.attributes.keys().map(|k| format!("attribute:{k}")));
        keys.extend(self.attributes_ns.keys().map(|k| format!("attribute_ns:{k}")));
        keys.extend(self.styles.keys().map(|k| format!("style:{k}")));
        keys.extend(self.events.keys().map(|k| format!("event:{k}")));
        keys
    }
}

/// Namespaced attribute delta; `value: None` removes the attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDelta {
    pub namespace: String,
    pub value: Option<String>,
}

/// Per-bucket deltas between two fact sets
///
/// Removal sentinels: `None` for properties, attributes and events, an empty
/// string for styles, a `NsDelta` without value for namespaced attributes.
#[derive(Debug, Clone, Default)]
pub struct FactsDiff {
    pub properties: BTreeMap<String, Option<Value>>,
    pub attributes: BTreeMap<String, Option<String>>,
    pub attributes_ns: BTreeMap<String, NsDelta>,
    pub styles: BTreeMap<String, String>,
    pub events: BTreeMap<String, Option<Handler>>,
}

impl FactsDiff {
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
            && self.attributes.is_empty()
            && self.attributes_ns.is_empty()
            && self.styles.is_empty()
            && self.events.is_empty()
    }

    /// Number of individual deltas
    pub fn len(&self) -> usize {
        self.properties.len()
            + self.attributes.len()
            + self.attributes_ns.len()
            + self.styles.len()
            + self.events.len()
    }

    /// All touched keys, prefixed by bucket name as in [`OrganizedFacts::keys`]
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        keys.extend(self.properties.keys().map(|k| format!("property:{k}")));
        keys.extend(self.attributes.keys().map(|k| format!("attribute:{k}")));
        keys.extend(self.attributes_ns.keys().map(|k| format!("attribute_ns:{k}")));
        keys.extend(self.styles.keys().map(|k| format!("style:{k}")));
        keys.extend(self.events.keys().map(|k| format!("event:{k}")));
        keys
    }
}

fn diff_bucket<T, D>(
    old: &BTreeMap<String, T>,
    new: &BTreeMap<String, T>,
    unchanged: impl Fn(&str, &T, &T) -> bool,
    removed: impl Fn(&T) -> D,
    changed: impl Fn(&T) -> D,
) -> BTreeMap<String, D> {
    let mut out = BTreeMap::new();
    for (key, old_value) in old {
        match new.get(key) {
            None => {
                out.insert(key.clone(), removed(old_value));
            }
            Some(new_value) if !unchanged(key, old_value, new_value) => {
                out.insert(key.clone(), changed(new_value));
            }
            Some(_) => {}
        }
    }
    for (key, new_value) in new {
        if !old.contains_key(key) {
            out.insert(key.clone(), changed(new_value));
        }
    }
    out
}

/// Diff two fact sets; `None` when nothing changed
pub fn diff_facts(old: &OrganizedFacts, new: &OrganizedFacts) -> Option<FactsDiff> {
    let diff = FactsDiff {
        // live `value`/`checked` may have been edited by the user, so always re-set them
        properties: diff_bucket(
            &old.properties,
            &new.properties,
            |key, a, b| a == b && key != "value" && key != "checked",
            |_| None,
            |v| Some(v.clone()),
        ),
        attributes: diff_bucket(
            &old.attributes,
            &new.attributes,
            |_, a, b| a == b,
            |_| None,
            |v| Some(v.clone()),
        ),
        attributes_ns: diff_bucket(
            &old.attributes_ns,
            &new.attributes_ns,
            |_, a, b| a == b,
            |old| NsDelta {
                namespace: old.namespace.clone(),
                value: None,
            },
            |new| NsDelta {
                namespace: new.namespace.clone(),
                value: Some(new.value.clone()),
            },
        ),
        styles: diff_bucket(
            &old.styles,
            &new.styles,
            |_, a, b| a == b,
            |_| String::new(),
            |v| v.clone(),
        ),
        events: diff_bucket(
            &old.events,
            &new.events,
            |_, a, b| a.equivalent(b),
            |_| None,
            |h| Some(h.clone()),
        ),
    };

    if diff.is_empty() {
        None
    } else {
        Some(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn last_write_wins_within_bucket() {
        let facts = OrganizedFacts::organize([
            Fact::style("color", "red"),
            Fact::style("color", "blue"),
            Fact::attribute("id", "a"),
            Fact::attribute("id", "b"),
        ]);
        assert_eq!(facts.styles["color"], "blue");
        assert_eq!(facts.attributes["id"], "b");
    }

    #[test]
    fn class_names_accumulate() {
        let facts = OrganizedFacts::organize([Fact::class("a"), Fact::class("b")]);
        assert_eq!(facts.properties["className"], json!("a b"));

        let facts = OrganizedFacts::organize([
            Fact::attribute("class", "x"),
            Fact::attribute("class", "y"),
        ]);
        assert_eq!(facts.attributes["class"], "x y");
    }

    #[test]
    fn identical_facts_produce_no_diff() {
        let handler = Handler::message(1u8);
        let old = OrganizedFacts::organize([
            Fact::style("margin", "0"),
            Fact::on("click", handler.clone()),
        ]);
        let new = OrganizedFacts::organize([
            Fact::style("margin", "0"),
            Fact::on("click", handler),
        ]);
        assert!(diff_facts(&old, &new).is_none());
    }

    #[test]
    fn removals_use_bucket_sentinels() {
        let old = OrganizedFacts::organize([
            Fact::property("title", "t"),
            Fact::attribute("id", "main"),
            Fact::attribute_ns("http://www.w3.org/1999/xlink", "href", "#a"),
            Fact::style("color", "red"),
            Fact::on("click", Handler::message(())),
        ]);
        let diff = diff_facts(&old, &OrganizedFacts::default()).unwrap();

        assert_eq!(diff.properties["title"], None);
        assert_eq!(diff.attributes["id"], None);
        assert_eq!(diff.attributes_ns["href"].value, None);
        assert_eq!(
            diff.attributes_ns["href"].namespace,
            "http://www.w3.org/1999/xlink"
        );
        assert_eq!(diff.styles["color"], "");
        assert!(diff.events["click"].is_none());
        assert_eq!(diff.len(), 5);
    }

    #[test]
    fn value_property_is_always_reemitted() {
        let old = OrganizedFacts::organize([Fact::property("value", "abc")]);
        let new = OrganizedFacts::organize([Fact::property("value", "abc")]);
        let diff = diff_facts(&old, &new).unwrap();
        assert_eq!(diff.properties["value"], Some(json!("abc")));
    }

    #[test]
    fn new_handler_with_different_decoder_is_emitted() {
        let old = OrganizedFacts::organize([Fact::on("input", Handler::message(1u8))]);
        let new = OrganizedFacts::organize([Fact::on("input", Handler::message(1u8))]);
        let diff = diff_facts(&old, &new).unwrap();
        assert!(diff.events["input"].is_some());
    }
}
