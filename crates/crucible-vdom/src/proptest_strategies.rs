//! Proptest strategies for reconciliation property tests
//!
//! Trees are kept small and drawn from tiny vocabularies (tags, keys, fact
//! names) so that two independently generated trees overlap often enough to
//! exercise in-place patching rather than wholesale redraws.

use crate::event::{Handler, Mapper};
use crate::facts::Fact;
use crate::node::*;
use proptest::prelude::*;
use std::rc::Rc;

/// Short lowercase text, sometimes empty
pub fn arb_text() -> impl Strategy<Value = String> {
    "[a-c]{0,3}"
}

pub fn arb_tag() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("div"), Just("span"), Just("p")]
}

pub fn arb_fact() -> impl Strategy<Value = Fact> {
    prop_oneof![
        3 => (prop_oneof![Just("id"), Just("title")], arb_text())
            .prop_map(|(key, value)| Fact::attribute(key, value)),
        2 => (prop_oneof![Just("color"), Just("margin")], "[a-c]{1,2}")
            .prop_map(|(key, value)| Fact::style(key, value)),
        2 => any::<bool>().prop_map(|b| Fact::property("hidden", b)),
        1 => arb_text().prop_map(Fact::class),
        1 => "[a-c]{1,2}".prop_map(|v| Fact::attribute_ns("urn:x", "href", v)),
        1 => (0u32..3).prop_map(|n| Fact::on("click", Handler::message(n))),
    ]
}

pub fn arb_facts() -> impl Strategy<Value = Vec<Fact>> {
    prop::collection::vec(arb_fact(), 0..4)
}

fn counter_view(n: &u8) -> Node {
    element("em", [], [text(n.to_string())])
}

/// Text and memoized leaves
pub fn arb_leaf() -> impl Strategy<Value = Node> {
    prop_oneof![
        6 => arb_text().prop_map(text),
        1 => (0u8..3).prop_map(|n| lazy(counter_view, Rc::new(n))),
    ]
}

/// Children with distinct keys in arbitrary order
pub fn arb_keyed_children<S>(inner: S) -> impl Strategy<Value = Vec<(String, Node)>>
where
    S: Strategy<Value = Node> + Clone + 'static,
{
    prop::collection::btree_set(0u8..8, 0..6).prop_flat_map(move |keys| {
        let len = keys.len();
        let keys: Vec<u8> = keys.into_iter().collect();
        (
            Just(keys).prop_shuffle(),
            prop::collection::vec(inner.clone(), len),
        )
            .prop_map(|(keys, nodes)| {
                keys.into_iter()
                    .map(|k| format!("k{k}"))
                    .zip(nodes)
                    .collect::<Vec<_>>()
            })
    })
}

/// Recursive snapshot generator with bounded depth
pub fn arb_node() -> impl Strategy<Value = Node> {
    arb_leaf().prop_recursive(
        3,  // depth
        24, // total nodes
        4,  // children per element
        |inner| {
            prop_oneof![
                4 => (arb_tag(), arb_facts(), prop::collection::vec(inner.clone(), 0..4))
                    .prop_map(|(tag, facts, children)| element(tag, facts, children)),
                2 => (arb_facts(), arb_keyed_children(inner.clone()))
                    .prop_map(|(facts, children)| keyed("ul", facts, children)),
                1 => (1u32..4, inner.clone())
                    .prop_map(|(k, node)| map(Mapper::new(move |n: u32| n * k), node)),
            ]
        },
    )
}

/// Elements, keyed elements and text only; every snapshot slot has a live node
pub fn arb_plain_node() -> impl Strategy<Value = Node> {
    arb_text().prop_map(text).prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            2 => (arb_tag(), arb_facts(), prop::collection::vec(inner.clone(), 0..4))
                .prop_map(|(tag, facts, children)| element(tag, facts, children)),
            1 => arb_keyed_children(inner).prop_map(|children| keyed("ul", [], children)),
        ]
    })
}

/// A keyed list of small elements, for reorder-heavy properties
pub fn arb_keyed_list() -> impl Strategy<Value = Node> {
    let item = arb_text().prop_map(|s| element("li", [], [text(s)])).boxed();
    arb_keyed_children(item).prop_map(|children| keyed("ol", [], children))
}
