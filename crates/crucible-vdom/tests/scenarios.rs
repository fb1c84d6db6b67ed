use crucible_vdom::patch::{describe, InsertSource};
use crucible_vdom::*;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use test_case::test_case;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

type Inbox = Rc<RefCell<Vec<(u32, bool)>>>;

fn inbox_sink() -> (EventRoot, Inbox) {
    let inbox: Inbox = Rc::new(RefCell::new(Vec::new()));
    let writer = inbox.clone();
    let root = EventRoot::sink(move |msg: Message, is_sync| match msg.downcast::<u32>() {
        Ok(n) => writer.borrow_mut().push((*n, is_sync)),
        Err(_) => panic!("sink received a non-u32 message"),
    });
    (root, inbox)
}

fn mount(tree: &Node) -> (Document, NodeId, EventRoot, Inbox) {
    init_tracing();
    let (root, inbox) = inbox_sink();
    let mut doc = Document::new();
    let id = render(&mut doc, tree, &root).unwrap();
    (doc, id, root, inbox)
}

fn keyed_items(keys: &[&str]) -> Node {
    keyed(
        "ul",
        [],
        keys.iter()
            .map(|k| (k.to_string(), element("li", [], [text(*k)]))),
    )
}

#[test]
fn text_update_mutates_only_the_text_node() {
    let old = element("div", [], [text("a")]);
    let new = element("div", [], [text("b")]);
    let (mut doc, div, root, _) = mount(&old);
    let text_id = doc.children(div).unwrap()[0];
    let created = doc.stats().nodes_created;

    let patches = diff(&old, &new).unwrap();
    assert_eq!(describe(&patches), vec!["text@1"]);

    let div_after = apply(&mut doc, div, &old, patches, &root).unwrap();
    assert_eq!(div_after, div);
    assert_eq!(doc.children(div).unwrap(), &[text_id]);
    assert_eq!(doc.text(text_id), Some("b"));
    assert_eq!(doc.stats().nodes_created, created);
}

#[test]
fn keyed_insert_leaves_existing_node_in_place() {
    let x = element("span", [], [text("x")]);
    let old = keyed("ul", [], [("k1", x.clone())]);
    let new = keyed("ul", [], [("k0", element("span", [], [text("y")])), ("k1", x)]);
    let (mut doc, ul, root, _) = mount(&old);
    let x_live = doc.children(ul).unwrap()[0];
    let x_text = doc.children(x_live).unwrap()[0];

    let patches = diff(&old, &new).unwrap();
    let PatchKind::Reorder(reorder) = &patches[0].kind else {
        panic!("expected a keyed reorder, got {patches:?}");
    };
    assert!(reorder.patches.is_empty());
    assert_eq!(reorder.inserts.len(), 1);
    assert_eq!(reorder.inserts[0].position, Some(0));
    assert!(matches!(reorder.inserts[0].source, InsertSource::Render(_)));

    apply(&mut doc, ul, &old, patches, &root).unwrap();
    let kids = doc.children(ul).unwrap();
    assert_eq!(kids.len(), 2);
    assert_eq!(kids[1], x_live);
    assert_eq!(doc.children(x_live).unwrap(), &[x_text]);
    assert_eq!(doc.to_html(ul).unwrap(), "<ul><span>y</span><span>x</span></ul>");
}

#[test]
fn keyed_swap_reuses_live_nodes() {
    let old = keyed_items(&["a", "b", "c"]);
    let new = keyed_items(&["b", "a", "c"]);
    let (mut doc, ul, root, _) = mount(&old);
    let before = doc.children(ul).unwrap().to_vec();
    let created = doc.stats().nodes_created;

    let patches = diff(&old, &new).unwrap();
    apply(&mut doc, ul, &old, patches, &root).unwrap();

    assert_eq!(doc.children(ul).unwrap(), &[before[1], before[0], before[2]]);
    assert_eq!(doc.stats().nodes_created, created);
    assert_eq!(doc.stats().nodes_freed, 0);
}

#[test]
fn retag_rewires_events_without_touching_the_tree() {
    let click = Handler::message(1u32);
    let button = || element("button", [Fact::on("click", click.clone())], [text("x")]);
    let f = Mapper::new(|n: u32| n + 10);
    let g = Mapper::new(|n: u32| n + 20);
    let old = map(f, button());
    let new = map(g, button());

    let (mut doc, live, root, inbox) = mount(&old);
    let stats = doc.stats();

    let patches = diff(&old, &new).unwrap();
    assert_eq!(describe(&patches), vec!["retag@0"]);
    assert_eq!(apply(&mut doc, live, &old, patches, &root).unwrap(), live);
    assert_eq!(doc.stats(), stats);

    doc.dispatch_event(live, "click", &json!({})).unwrap();
    assert_eq!(inbox.borrow().as_slice(), &[(21, false)]);
}

#[test]
fn nested_taggers_compose_innermost_first() {
    let inner = map(
        Mapper::new(|n: u32| n * 2),
        element("i", [Fact::on("click", Handler::message(3u32))], []),
    );
    let tree = map(Mapper::new(|n: u32| n + 1), inner);
    let (doc, live, _, inbox) = mount(&tree);

    doc.dispatch_event(live, "click", &json!(null)).unwrap();
    assert_eq!(inbox.borrow().as_slice(), &[(7, false)]);
}

#[test]
fn retag_through_a_thunk_targets_the_right_record() {
    fn view(k: &u32) -> Node {
        let k = *k;
        map(
            Mapper::new(move |n: u32| n + k),
            element("b", [Fact::on("click", Handler::message(1u32))], []),
        )
    }
    let outer = Mapper::new(|n: u32| n * 100);
    let old = element("div", [], [map(outer.clone(), lazy(view, Rc::new(1)))]);
    let new = element("div", [], [map(outer, lazy(view, Rc::new(2)))]);

    let (mut doc, div, root, inbox) = mount(&old);
    let b = doc.children(div).unwrap()[0];
    let patches = diff(&old, &new).unwrap();
    assert_eq!(describe(&patches), vec!["thunk@2", "  retag@0", "  facts@1"]);
    apply(&mut doc, div, &old, patches, &root).unwrap();

    assert_eq!(doc.children(div).unwrap(), &[b]);
    doc.dispatch_event(b, "click", &json!({})).unwrap();
    assert_eq!(inbox.borrow().as_slice(), &[(300, false)]);
}

#[test_case(text("a"), element("div", [], [text("a")]) ; "text to element")]
#[test_case(element("div", [], [text("a")]), text("b") ; "element to text")]
#[test_case(element("div", [], []), keyed("ol", [], [("k", text("x"))]) ; "element to keyed with other tag")]
#[test_case(keyed_items(&["a"]), map(Mapper::new(|n: u32| n), text("m")) ; "keyed to tagged")]
#[test_case(map(Mapper::new(|n: u32| n), text("m")), element("p", [], []) ; "tagged to element")]
fn replace_fallback_matches_fresh_render(old: Node, new: Node) {
    let (mut doc, live, root, _) = mount(&old);
    let patches = diff(&old, &new).unwrap();
    assert!(patches.iter().any(|p| matches!(p.kind, PatchKind::Redraw(_))));

    let live = apply(&mut doc, live, &old, patches, &root).unwrap();
    let mut fresh = Document::new();
    let expected = render(&mut fresh, &new, &root).unwrap();
    assert_eq!(doc.to_html(live).unwrap(), fresh.to_html(expected).unwrap());
    assert_eq!(doc.check_integrity(live).unwrap(), doc.len());
}

#[test]
fn attribute_delta_names_every_changed_key() {
    let old = element(
        "a",
        [
            Fact::attribute("href", "/x"),
            Fact::attribute("title", "t"),
            Fact::style("color", "red"),
        ],
        [],
    );
    let new = element(
        "a",
        [
            Fact::attribute("href", "/y"),
            Fact::attribute("rel", "next"),
            Fact::style("margin", "0"),
        ],
        [],
    );
    let patches = diff(&old, &new).unwrap();
    let PatchKind::Facts(delta) = &patches[0].kind else {
        panic!("expected facts patch");
    };
    let keys: Vec<&str> = delta.attributes.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["href", "rel", "title"]);
    assert_eq!(delta.attributes["title"], None);
    assert_eq!(delta.styles["color"], "");
    assert_eq!(delta.styles["margin"], "0");

    let (mut doc, live, root, _) = mount(&old);
    apply(&mut doc, live, &old, patches, &root).unwrap();
    assert_eq!(
        doc.to_html(live).unwrap(),
        "<a href=\"/y\" rel=\"next\" style=\"margin:0\"></a>"
    );
}

#[test]
fn listener_kind_change_replaces_the_listener() {
    let old = element("input", [Fact::on("input", Handler::message(1u32))], []);
    let new = element(
        "input",
        [Fact::on(
            "input",
            Handler::may_prevent_default(|_: &Value| Some((2u32, true))),
        )],
        [],
    );
    let (mut doc, live, root, inbox) = mount(&old);
    let patches = diff(&old, &new).unwrap();
    apply(&mut doc, live, &old, patches, &root).unwrap();

    let stats = doc.stats();
    assert_eq!(stats.listeners_attached, 2);
    assert_eq!(stats.listeners_detached, 1);
    assert_eq!(
        doc.listener(live, "input").unwrap().handler().kind(),
        HandlerKind::MayPreventDefault
    );

    let outcome = doc.dispatch_event(live, "input", &json!({})).unwrap();
    assert!(outcome.default_prevented);
    assert_eq!(inbox.borrow().as_slice(), &[(2, false)]);
}

#[test]
fn removed_listener_is_detached() {
    let old = element("div", [Fact::on("click", Handler::message(1u32))], []);
    let new = element("div", [], []);
    let (mut doc, live, root, _) = mount(&old);
    let patches = diff(&old, &new).unwrap();
    apply(&mut doc, live, &old, patches, &root).unwrap();
    assert!(doc.listener(live, "click").is_none());
    assert_eq!(doc.stats().listeners_detached, 1);
}

struct Gauge;

impl Widget for Gauge {
    type State = u32;
    type Handle = Vec<u32>;
    type Patch = u32;

    fn render(&self, state: &u32) -> VdomResult<Vec<u32>> {
        Ok(vec![*state])
    }

    fn diff(&self, old: &u32, new: &u32) -> VdomResult<Option<u32>> {
        Ok((old != new).then_some(*new))
    }

    fn apply(&self, handle: &mut Vec<u32>, patch: &u32) -> VdomResult<()> {
        handle.push(*patch);
        Ok(())
    }
}

struct Broken;

impl Widget for Broken {
    type State = ();
    type Handle = ();
    type Patch = ();

    fn render(&self, _: &()) -> VdomResult<()> {
        Ok(())
    }

    fn diff(&self, _: &(), _: &()) -> VdomResult<Option<()>> {
        Err(VdomError::widget("diff hook exploded"))
    }

    fn apply(&self, _: &mut (), _: &()) -> VdomResult<()> {
        Ok(())
    }
}

#[test]
fn custom_widget_is_patched_through_its_hook() {
    let old = element("div", [], [custom([], WidgetInstance::new(Gauge, 1))]);
    let new = element("div", [], [custom([], WidgetInstance::new(Gauge, 4))]);
    let (mut doc, div, root, _) = mount(&old);
    let gauge = doc.children(div).unwrap()[0];

    let patches = diff(&old, &new).unwrap();
    assert_eq!(describe(&patches), vec!["custom@1"]);
    apply(&mut doc, div, &old, patches, &root).unwrap();

    assert_eq!(doc.children(div).unwrap(), &[gauge]);
    assert_eq!(doc.widget_handle::<Vec<u32>>(gauge), Some(&vec![1, 4]));
}

#[test]
fn custom_widget_of_other_type_is_redrawn() {
    let old = custom([], WidgetInstance::new(Gauge, 1));
    let new = custom([], WidgetInstance::new(Broken, ()));
    assert_eq!(describe(&diff(&old, &new).unwrap()), vec!["redraw@0"]);
}

#[test]
fn widget_hook_errors_reach_the_caller() {
    let old = custom([], WidgetInstance::new(Broken, ()));
    let new = custom([], WidgetInstance::new(Broken, ()));
    let err = diff(&old, &new).unwrap_err();
    assert!(matches!(err, VdomError::Widget(_)));
    assert!(!err.is_engine_bug());
}

#[test]
fn unchanged_thunk_skips_its_subtree() {
    fn view(items: &Vec<&'static str>) -> Node {
        element("ul", [], items.iter().map(|i| element("li", [], [text(*i)])))
    }
    let items = Rc::new(vec!["a", "b"]);
    let old = element("div", [], [text("h"), lazy(view, items.clone())]);
    let new = element("div", [], [text("h2"), lazy(view, items)]);
    assert_eq!(describe(&diff(&old, &new).unwrap()), vec!["text@1"]);
}

#[test]
fn stop_propagation_is_reported_as_synchronous() {
    let tree = element(
        "div",
        [Fact::on("click", Handler::message(9u32))],
        [element(
            "button",
            [Fact::on(
                "click",
                Handler::may_stop_propagation(|_: &Value| Some((5u32, true))),
            )],
            [],
        )],
    );
    let (doc, div, _, inbox) = mount(&tree);
    let button = doc.children(div).unwrap()[0];
    let outcome = doc.dispatch_event(button, "click", &json!({})).unwrap();

    assert!(outcome.propagation_stopped);
    assert_eq!(inbox.borrow().as_slice(), &[(5, true)]);
}

#[test]
fn reconciler_tracks_a_sequence_of_snapshots() {
    init_tracing();
    let mut reconciler =
        Reconciler::mount(keyed_items(&["a"]), |_, _| {}, ReconcileConfig::strict()).unwrap();
    for keys in [
        &["a", "b"][..],
        &["b", "a"][..],
        &["c", "b", "a", "d"][..],
        &["d"][..],
        &[][..],
        &["a", "b", "c"][..],
    ] {
        reconciler.update(keyed_items(keys)).unwrap();
        let mut fresh = Document::new();
        let expected = render(&mut fresh, &keyed_items(keys), &EventRoot::sink(|_, _| {})).unwrap();
        assert_eq!(reconciler.html().unwrap(), fresh.to_html(expected).unwrap());
    }
}

#[test]
fn config_from_toml_drives_duplicate_suffix() {
    let config = ReconcileConfig::from_toml_str("duplicate_key_suffix = \"#again\"").unwrap();
    let mut reconciler = Reconciler::mount(keyed_items(&[]), |_, _| {}, config).unwrap();
    reconciler.update(keyed_items(&["x", "x"])).unwrap();
    assert_eq!(reconciler.html().unwrap(), "<ul><li>x</li><li>x</li></ul>");
}
