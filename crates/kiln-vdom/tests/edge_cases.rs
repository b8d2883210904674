//! Edge case tests for kiln-vdom
//!
//! Patching against a real `kiln_dom::Document`: keyed moves, data diffs,
//! listener reuse, slot relocation, SSR markers and SVG namespaces.

use std::cell::RefCell;
use std::rc::Rc;

use kiln_dom::{dispatch, Document, DomEvent, EventTarget, NodeId, SVG_NS, XLINK_NS};
use kiln_vdom::{
    destroy, h, patch, slot, Child, NoHooks, PatchHooks, SlotContent, Tag, VData, VNode, SKIP_ALL, SSR_CHILD_ID,
    SSR_VNODE_ID,
};

fn make_host(doc: &mut Document) -> NodeId {
    let host = doc.create_element("my-host");
    let body = doc.body();
    doc.append_child(body, host);
    host
}

fn root(children: Vec<Child>) -> VNode {
    h(Tag::Fragment, None, children)
}

fn mount(doc: &mut Document, host: NodeId, children: Vec<Child>) -> VNode {
    patch(doc, &mut NoHooks, VNode::from_element(host), root(children), false, None, None)
}

fn update(doc: &mut Document, prev: VNode, children: Vec<Child>) -> VNode {
    patch(doc, &mut NoHooks, prev, root(children), true, None, None)
}

fn keyed(keys: &[&str]) -> Vec<Child> {
    keys.iter()
        .map(|k| h("li", Some(VData::new().key(*k)), vec![(*k).into()]).into())
        .collect()
}

fn texts(doc: &Document, parent: NodeId) -> Vec<String> {
    doc.child_nodes(parent).into_iter().map(|c| doc.text_content(c)).collect()
}

// ============================================================================
// IDEMPOTENCE
// ============================================================================

fn rich_tree() -> Vec<Child> {
    vec![
        h(
            "section",
            Some(
                VData::new()
                    .attr("id", "main")
                    .attr("hidden", false)
                    .attr("checked", true)
                    .class("a b")
                    .style("color", "red")
                    .prop("value", 3)
                    .on("click", |_| {}),
            ),
            vec!["hello ".into(), 42.into(), h("b", None, vec!["bold".into()]).into()],
        )
        .into(),
        h("ul", None, keyed(&["x", "y", "z"])).into(),
    ]
}

#[test]
fn test_identical_render_performs_no_mutations() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let v1 = mount(&mut doc, host, rich_tree());

    let before = doc.mutation_count();
    let v2 = update(&mut doc, v1, rich_tree());
    assert_eq!(doc.mutation_count(), before);

    let _v3 = update(&mut doc, v2, rich_tree());
    assert_eq!(doc.mutation_count(), before);
}

#[test]
fn test_initial_render_builds_tree() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let vnode = mount(&mut doc, host, rich_tree());

    let children = doc.child_nodes(host);
    assert_eq!(children.len(), 2);
    let section = children[0];
    assert_eq!(vnode.children()[0].elm(), Some(section));
    assert_eq!(doc.get_attribute(section, "id"), Some("main"));
    assert_eq!(doc.get_attribute(section, "checked"), Some(""));
    assert!(!doc.has_attribute(section, "hidden"));
    assert!(doc.has_class(section, "a") && doc.has_class(section, "b"));
    assert_eq!(doc.style_property(section, "color"), Some("red"));
    assert_eq!(doc.get_property(section, "value"), Some(&serde_json::json!(3)));
    assert_eq!(doc.text_content(section), "hello 42bold");
    assert_eq!(texts(&doc, children[1]), vec!["x", "y", "z"]);
}

// ============================================================================
// KEYED CHILDREN
// ============================================================================

#[test]
fn test_keyed_reorder_moves_nodes() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let v1 = mount(&mut doc, host, keyed(&["a", "b", "c", "d"]));
    let before = doc.child_nodes(host);

    let _v2 = update(&mut doc, v1, keyed(&["d", "b", "a", "c"]));
    let after = doc.child_nodes(host);
    assert_eq!(after, vec![before[3], before[1], before[0], before[2]]);
    assert_eq!(texts(&doc, host), vec!["d", "b", "a", "c"]);
}

#[test]
fn test_keyed_reverse() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let v1 = mount(&mut doc, host, keyed(&["1", "2", "3", "4", "5"]));
    let mut before = doc.child_nodes(host);

    let _v2 = update(&mut doc, v1, keyed(&["5", "4", "3", "2", "1"]));
    before.reverse();
    assert_eq!(doc.child_nodes(host), before);
}

#[test]
fn test_keyed_insert_and_remove() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let v1 = mount(&mut doc, host, keyed(&["a", "b", "c"]));
    let before = doc.child_nodes(host);

    let v2 = update(&mut doc, v1, keyed(&["a", "x", "b", "c", "y"]));
    let after = doc.child_nodes(host);
    assert_eq!(texts(&doc, host), vec!["a", "x", "b", "c", "y"]);
    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[1]);
    assert_eq!(after[3], before[2]);

    let _v3 = update(&mut doc, v2, keyed(&["c", "a"]));
    assert_eq!(doc.child_nodes(host), vec![before[2], before[0]]);
    assert_eq!(doc.parent(before[1]), None);
}

#[test]
fn test_keyed_shuffle_from_middle() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let v1 = mount(&mut doc, host, keyed(&["a", "b", "c", "d", "e"]));
    let before = doc.child_nodes(host);

    let _v2 = update(&mut doc, v1, keyed(&["b", "e", "a", "c", "d"]));
    assert_eq!(texts(&doc, host), vec!["b", "e", "a", "c", "d"]);
    let after = doc.child_nodes(host);
    for id in &before {
        assert!(after.contains(id), "node was recreated");
    }
}

#[test]
fn test_same_key_different_tag_recreates() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let v1 = mount(
        &mut doc,
        host,
        vec![
            h("li", Some(VData::new().key("a")), vec![]).into(),
            h("li", Some(VData::new().key("b")), vec![]).into(),
        ],
    );
    let before = doc.child_nodes(host);

    let _v2 = update(
        &mut doc,
        v1,
        vec![
            h("div", Some(VData::new().key("a")), vec![]).into(),
            h("li", Some(VData::new().key("b")), vec![]).into(),
        ],
    );
    let after = doc.child_nodes(host);
    assert_eq!(after.len(), 2);
    assert_ne!(after[0], before[0]);
    assert_eq!(doc.tag_name(after[0]), Some("div"));
    assert_eq!(after[1], before[1]);
    assert_eq!(doc.parent(before[0]), None);
}

#[test]
fn test_namespace_change_recreates() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let v1 = mount(&mut doc, host, vec![h("a", None, vec![]).into()]);
    let before = doc.child_nodes(host)[0];

    let _v2 = update(&mut doc, v1, vec![h("a", Some(VData::new().namespace(SVG_NS)), vec![]).into()]);
    let after = doc.child_nodes(host)[0];
    assert_ne!(after, before);
    assert_eq!(doc.namespace(after), Some(SVG_NS));
}

#[test]
fn test_unkeyed_grow_and_shrink() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let v1 = mount(&mut doc, host, vec!["a".into(), h("p", None, vec![]).into()]);
    let first = doc.child_nodes(host);

    let v2 = update(
        &mut doc,
        v1,
        vec!["b".into(), h("p", None, vec![]).into(), h("p", None, vec![]).into()],
    );
    let grown = doc.child_nodes(host);
    assert_eq!(grown.len(), 3);
    assert_eq!(grown[0], first[0]);
    assert_eq!(grown[1], first[1]);
    assert_eq!(doc.text_content(grown[0]), "b");

    let _v3 = update(&mut doc, v2, vec!["b".into()]);
    assert_eq!(doc.child_nodes(host), vec![first[0]]);
}

// ============================================================================
// DATA DIFFS
// ============================================================================

#[test]
fn test_attribute_diff_is_minimal() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let div = |data: VData| vec![h("div", Some(data), vec![]).into()];

    let v1 = mount(&mut doc, host, div(VData::new().attr("a", "1").attr("b", "2")));
    let elm = doc.child_nodes(host)[0];

    let before = doc.mutation_count();
    let v2 = update(&mut doc, v1, div(VData::new().attr("a", "1").attr("b", "3").attr("c", "4")));
    assert_eq!(doc.mutation_count() - before, 2);
    assert_eq!(doc.get_attribute(elm, "b"), Some("3"));
    assert_eq!(doc.get_attribute(elm, "c"), Some("4"));

    let before = doc.mutation_count();
    let _v3 = update(&mut doc, v2, div(VData::new().attr("a", "1")));
    assert_eq!(doc.mutation_count() - before, 2);
    assert!(!doc.has_attribute(elm, "b"));
    assert!(!doc.has_attribute(elm, "c"));
}

#[test]
fn test_boolean_attribute_toggle() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let button = |on: bool| vec![h("button", Some(VData::new().attr("disabled", on)), vec![]).into()];

    let v1 = mount(&mut doc, host, button(true));
    let elm = doc.child_nodes(host)[0];
    assert_eq!(doc.get_attribute(elm, "disabled"), Some(""));

    let v2 = update(&mut doc, v1, button(false));
    assert!(!doc.has_attribute(elm, "disabled"));

    let _v3 = update(&mut doc, v2, button(true));
    assert!(doc.has_attribute(elm, "disabled"));
}

#[test]
fn test_class_map_toggle() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let div = |on: bool| vec![h("div", Some(VData::new().class_map([("on", on), ("off", !on)])), vec![]).into()];

    let v1 = mount(&mut doc, host, div(true));
    let elm = doc.child_nodes(host)[0];
    assert!(doc.has_class(elm, "on"));
    assert!(!doc.has_class(elm, "off"));

    let _v2 = update(&mut doc, v1, div(false));
    assert!(!doc.has_class(elm, "on"));
    assert!(doc.has_class(elm, "off"));
}

#[test]
fn test_text_node_updated_in_place() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let v1 = mount(&mut doc, host, vec!["before".into()]);
    let node = doc.child_nodes(host)[0];

    let _v2 = update(&mut doc, v1, vec!["after".into()]);
    assert_eq!(doc.child_nodes(host), vec![node]);
    assert_eq!(doc.text_content(node), "after");
}

#[test]
fn test_skip_all_hint_keeps_existing_dom() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let v1 = mount(
        &mut doc,
        host,
        vec![h("div", Some(VData::new().attr("x", "1").skip(SKIP_ALL)), vec!["static".into()]).into()],
    );
    let elm = doc.child_nodes(host)[0];
    assert_eq!(doc.get_attribute(elm, "x"), Some("1"));
    assert_eq!(doc.text_content(elm), "static");

    let before = doc.mutation_count();
    let _v2 = update(
        &mut doc,
        v1,
        vec![h("div", Some(VData::new().attr("x", "2").skip(SKIP_ALL)), vec!["changed".into()]).into()],
    );
    assert_eq!(doc.mutation_count(), before);
    assert_eq!(doc.text_content(elm), "static");
}

// ============================================================================
// LISTENERS
// ============================================================================

#[test]
fn test_listener_reused_with_fresh_handler() {
    let doc = RefCell::new(Document::new());
    let host = make_host(&mut doc.borrow_mut());
    let hits: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    let button = |label: &'static str| -> Vec<Child> {
        let hits = Rc::clone(&hits);
        vec![h("button", Some(VData::new().on("click", move |_| hits.borrow_mut().push(label))), vec![]).into()]
    };

    let v1 = mount(&mut doc.borrow_mut(), host, button("first"));
    let elm = doc.borrow().child_nodes(host)[0];
    assert_eq!(doc.borrow().listener_count(elm), 1);

    let before = doc.borrow().mutation_count();
    let v2 = update(&mut doc.borrow_mut(), v1, button("second"));
    assert_eq!(doc.borrow().mutation_count(), before);
    assert_eq!(doc.borrow().listener_count(elm), 1);

    dispatch(&doc, EventTarget::Node(elm), &mut DomEvent::new("click"));
    assert_eq!(*hits.borrow(), vec!["second"]);

    let _v3 = update(&mut doc.borrow_mut(), v2, vec![h("button", None, vec![]).into()]);
    assert_eq!(doc.borrow().listener_count(elm), 0);
}

#[test]
fn test_destroy_removes_listeners_recursively() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let vnode = mount(
        &mut doc,
        host,
        vec![h(
            "div",
            Some(VData::new().on("click", |_| {})),
            vec![h("span", Some(VData::new().on("keydown", |_| {})), vec![]).into()],
        )
        .into()],
    );
    let div = doc.child_nodes(host)[0];
    let span = doc.child_nodes(div)[0];
    assert_eq!(doc.listener_count(div), 1);
    assert_eq!(doc.listener_count(span), 1);

    destroy(&mut doc, &vnode);
    assert_eq!(doc.listener_count(div), 0);
    assert_eq!(doc.listener_count(span), 0);
}

#[test]
fn test_removed_element_loses_listeners() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let v1 = mount(
        &mut doc,
        host,
        vec![h("button", Some(VData::new().key("b").on("click", |_| {})), vec![]).into()],
    );
    let elm = doc.child_nodes(host)[0];

    let _v2 = update(&mut doc, v1, vec![h("p", Some(VData::new().key("p")), vec![]).into()]);
    assert_eq!(doc.parent(elm), None);
    assert_eq!(doc.listener_count(elm), 0);
}

// ============================================================================
// SLOTS
// ============================================================================

#[derive(Default)]
struct RecordingHooks {
    started: Vec<Vec<NodeId>>,
    finished: Vec<Vec<NodeId>>,
}

impl PatchHooks for RecordingHooks {
    fn relocation_started(&mut self, _doc: &Document, nodes: &[NodeId]) {
        self.started.push(nodes.to_vec());
    }

    fn relocation_finished(&mut self, _doc: &Document, nodes: &[NodeId]) {
        self.finished.push(nodes.to_vec());
    }
}

fn slotted_host(doc: &mut Document) -> (NodeId, NodeId, NodeId) {
    let host = make_host(doc);
    let light = doc.create_text("light");
    let title = doc.create_element("h1");
    doc.set_attribute(title, "slot", "title");
    doc.append_child(host, light);
    doc.append_child(host, title);
    (host, light, title)
}

fn card(main_children: Vec<Child>) -> VNode {
    root(vec![
        h("header", None, vec![slot(Some("title")).into()]).into(),
        h("main", None, main_children).into(),
    ])
}

#[test]
fn test_slot_relocates_default_and_named_content() {
    let mut doc = Document::new();
    let (host, light, title) = slotted_host(&mut doc);
    let content = SlotContent::capture(&doc, host);
    let mut hooks = RecordingHooks::default();

    let vnode = patch(
        &mut doc,
        &mut hooks,
        VNode::from_element(host),
        card(vec![slot(None).into()]),
        false,
        Some(&content),
        None,
    );

    let children = doc.child_nodes(host);
    assert_eq!(children.len(), 2);
    assert_eq!(doc.parent(title), Some(children[0]));
    assert_eq!(doc.parent(light), Some(children[1]));
    assert_eq!(hooks.started, vec![vec![title], vec![light]]);
    assert_eq!(hooks.finished, hooks.started);
    assert_eq!(vnode.children()[1].children()[0].relocated(), &[light]);
}

#[test]
fn test_slot_rerender_is_stable() {
    let mut doc = Document::new();
    let (host, light, _title) = slotted_host(&mut doc);
    let content = SlotContent::capture(&doc, host);

    let v1 = patch(&mut doc, &mut NoHooks, VNode::from_element(host), card(vec![slot(None).into()]), false, Some(&content), None);
    let main = doc.child_nodes(host)[1];

    let before = doc.mutation_count();
    let _v2 = patch(&mut doc, &mut NoHooks, v1, card(vec![slot(None).into()]), true, Some(&content), None);
    assert_eq!(doc.mutation_count(), before);
    assert_eq!(doc.parent(light), Some(main));
}

#[test]
fn test_removed_slot_detaches_content_until_rendered_again() {
    let mut doc = Document::new();
    let (host, light, _title) = slotted_host(&mut doc);
    let content = SlotContent::capture(&doc, host);

    let v1 = patch(&mut doc, &mut NoHooks, VNode::from_element(host), card(vec![slot(None).into()]), false, Some(&content), None);
    let main = doc.child_nodes(host)[1];

    let v2 = patch(&mut doc, &mut NoHooks, v1, card(vec![false.into()]), true, Some(&content), None);
    assert_eq!(doc.parent(light), None);
    assert!(content.contains(light));

    let _v3 = patch(&mut doc, &mut NoHooks, v2, card(vec![slot(None).into()]), true, Some(&content), None);
    assert_eq!(doc.parent(light), Some(main));
}

#[test]
fn test_empty_slot_renders_nothing() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let content = SlotContent::default();

    let _vnode = patch(
        &mut doc,
        &mut NoHooks,
        VNode::from_element(host),
        root(vec![slot(None).into(), h("p", None, vec![]).into()]),
        false,
        Some(&content),
        None,
    );
    let children = doc.child_nodes(host);
    assert_eq!(children.len(), 1);
    assert_eq!(doc.tag_name(children[0]), Some("p"));
}

#[test]
fn test_content_added_after_render_moves_into_slot() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let mut content = SlotContent::default();
    let render = || root(vec![slot(None).into(), h("p", None, vec![]).into()]);

    let v1 = patch(&mut doc, &mut NoHooks, VNode::from_element(host), render(), false, Some(&content), None);
    let late = doc.create_element("span");
    doc.append_child(host, late);
    content.add(&doc, late);

    let mut hooks = RecordingHooks::default();
    let v2 = patch(&mut doc, &mut hooks, v1, render(), true, Some(&content), None);
    let children = doc.child_nodes(host);
    assert_eq!(children.len(), 2);
    assert_eq!(children[0], late);
    assert_eq!(doc.tag_name(children[1]), Some("p"));
    assert_eq!(hooks.started, vec![vec![late]]);

    let before = doc.mutation_count();
    let _v3 = patch(&mut doc, &mut NoHooks, v2, render(), true, Some(&content), None);
    assert_eq!(doc.mutation_count(), before);
}

// ============================================================================
// SSR MARKERS
// ============================================================================

#[test]
fn test_ssr_markers_on_initial_render() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let tree = root(vec![
        "text".into(),
        h("div", None, vec![h("span", None, vec![]).into()]).into(),
    ]);

    let v1 = patch(&mut doc, &mut NoHooks, VNode::from_element(host), tree, false, None, Some(7));
    assert_eq!(doc.get_attribute(host, SSR_VNODE_ID), Some("7"));
    let div = doc.child_nodes(host)[1];
    assert_eq!(doc.get_attribute(div, SSR_CHILD_ID), Some("7.1"));
    let span = doc.child_nodes(div)[0];
    assert_eq!(doc.get_attribute(span, SSR_CHILD_ID), Some("7.0"));

    let _v2 = patch(
        &mut doc,
        &mut NoHooks,
        v1,
        root(vec!["text".into(), h("div", None, vec![]).into(), h("p", None, vec![]).into()]),
        true,
        None,
        Some(7),
    );
    let p = doc.child_nodes(host)[2];
    assert!(!doc.has_attribute(p, SSR_CHILD_ID));
}

// ============================================================================
// SVG
// ============================================================================

#[test]
fn test_svg_namespace_until_foreign_object() {
    let mut doc = Document::new();
    let host = make_host(&mut doc);
    let _vnode = mount(
        &mut doc,
        host,
        vec![h(
            "svg",
            None,
            vec![
                h("use", Some(VData::new().attr("xlink:href", "#icon")), vec![]).into(),
                h("foreignObject", None, vec![h("div", None, vec![]).into()]).into(),
            ],
        )
        .into()],
    );

    let svg = doc.child_nodes(host)[0];
    assert_eq!(doc.namespace(svg), Some(SVG_NS));
    let children = doc.child_nodes(svg);
    let (use_elm, foreign) = (children[0], children[1]);
    assert_eq!(doc.namespace(use_elm), Some(SVG_NS));
    assert_eq!(doc.get_attribute_ns(use_elm, XLINK_NS, "href"), Some("#icon"));
    assert_eq!(doc.namespace(foreign), Some(SVG_NS));
    let div = doc.child_nodes(foreign)[0];
    assert_eq!(doc.namespace(div), None);
}
