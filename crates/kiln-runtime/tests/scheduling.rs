//! Scheduling Tests
//!
//! Update priorities, synchronous flushes for user interaction and
//! writes made while rendering.

mod common;

use std::rc::Rc;

use common::{count, entries, mount, new_log, position, probe, sync_module, Log};
use kiln_runtime::dom::DomEvent;
use kiln_runtime::vdom::Child;
use kiln_runtime::{Component, ComponentDefinition, ComponentModule, Cx};
use serde_json::json;

#[test]
fn test_updates_run_in_priority_order() {
    let platform = common::platform();
    let log = new_log();
    let module = ComponentModule::new()
        .define("x-low", probe("low", &log, |_| Ok(vec![])))
        .define("x-normal", probe("normal", &log, |_| Ok(vec![])))
        .define("x-high", probe("high", &log, |_| Ok(vec![])));
    sync_module(&platform, "prio", module);

    let low = mount(&platform, None, "x-low");
    let normal = mount(&platform, None, "x-normal");
    let high = mount(&platform, None, "x-high");
    platform.register_component(&json!(["x-low", "prio", null, [["n", 1, 4]], [], 0, 2])).unwrap();
    platform.register_component(&json!(["x-normal", "prio", null, [["n", 1, 4]], [], 0, 0])).unwrap();
    platform.register_component(&json!(["x-high", "prio", null, [["n", 1, 4]], [], 0, 1])).unwrap();
    platform.run_until_idle();
    log.borrow_mut().clear();

    for elm in [low, normal, high] {
        platform.set_prop(elm, "n", 1).unwrap();
    }
    assert_eq!(platform.pending_tasks(), 3);
    platform.run_until_idle();

    assert_eq!(
        entries(&log)
            .into_iter()
            .filter(|e| e.ends_with(":render"))
            .collect::<Vec<_>>(),
        vec!["high:render", "normal:render", "low:render"]
    );
    assert_eq!(platform.pending_tasks(), 0);
}

#[test]
fn test_interaction_flushes_synchronously() {
    let platform = common::platform();
    let log = new_log();
    sync_module(&platform, "btn", ComponentModule::new().define("x-btn", probe("btn", &log, |_| Ok(vec![]))));
    let elm = mount(&platform, None, "x-btn");
    platform
        .register_component(&json!(["x-btn", "btn", null, [], [["click", "onClick"], ["scroll", "onScroll"]]]))
        .unwrap();
    platform.run_until_idle();
    log.borrow_mut().clear();

    platform.dispatch_event(elm, &mut DomEvent::new("click"));
    assert_eq!(entries(&log), vec!["btn:onClick:click", "btn:will_update", "btn:render", "btn:did_update"]);

    log.borrow_mut().clear();
    platform.dispatch_event(elm, &mut DomEvent::new("scroll"));
    assert_eq!(entries(&log), vec!["btn:onScroll:scroll"]);
    assert!(platform.host_state(elm).unwrap().queued);

    platform.run_until_idle();
    assert_eq!(count(&log, "btn:render"), 1);
}

struct SelfWriting {
    log: Log,
}

impl Component for SelfWriting {
    fn render(&mut self, cx: &Cx) -> anyhow::Result<Vec<Child>> {
        let n = cx.get("n").as_i64().unwrap_or(0);
        self.log.borrow_mut().push(format!("render {n}"));
        // stored, but no second render is queued
        cx.set("shadow", n + 1)?;
        Ok(vec![n.into()])
    }
}

#[test]
fn test_writes_during_render_do_not_requeue() {
    let platform = common::platform();
    let log = new_log();
    let inner = Rc::clone(&log);
    sync_module(
        &platform,
        "self",
        ComponentModule::new()
            .define("x-self", ComponentDefinition::new(move || SelfWriting { log: Rc::clone(&inner) })),
    );
    let elm = mount(&platform, None, "x-self");
    platform.register_component(&json!(["x-self", "self", null, [["n", 1, 4], ["shadow", 5]]])).unwrap();
    platform.run_until_idle();
    assert_eq!(entries(&log), vec!["render 0"]);

    platform.set_prop(elm, "n", 4).unwrap();
    platform.run_until_idle();
    assert_eq!(entries(&log), vec!["render 0", "render 4"]);
    assert!(!platform.host_state(elm).unwrap().queued);
    assert_eq!(platform.document().text_content(elm), "4");
}

#[test]
fn test_flush_now_runs_queued_updates() {
    let platform = common::platform();
    let log = new_log();
    sync_module(&platform, "sync", ComponentModule::new().define("x-sync", probe("sync", &log, |_| Ok(vec![]))));
    let elm = mount(&platform, None, "x-sync");
    platform.register_component(&json!(["x-sync", "sync", null, [["n", 1, 4]]])).unwrap();
    platform.run_until_idle();

    platform.set_prop(elm, "n", 9).unwrap();
    assert_eq!(platform.pending_tasks(), 1);
    platform.flush_now();
    assert_eq!(platform.pending_tasks(), 0);
    assert_eq!(count(&log, "sync:did_update"), 1);

    // the tick requested by the write finds nothing left to do
    platform.run_until_idle();
    assert_eq!(count(&log, "sync:render"), 2);
}

#[test]
fn test_children_queued_behind_parent_render() {
    let platform = common::platform();
    let log = new_log();
    let module = ComponentModule::new()
        .define("x-a", probe("a", &log, |_| Ok(vec![])))
        .define("x-b", probe("b", &log, |_| Ok(vec![])))
        .define("x-c", probe("c", &log, |_| Ok(vec![])));
    sync_module(&platform, "tree", module);

    let a = mount(&platform, None, "x-a");
    let b = mount(&platform, Some(a), "x-b");
    mount(&platform, Some(b), "x-c");
    for tag in ["x-a", "x-b", "x-c"] {
        platform.register_component(&json!([tag, "tree"])).unwrap();
    }
    platform.run_until_idle();

    assert!(position(&log, "a:render") < position(&log, "b:render"));
    assert!(position(&log, "b:render") < position(&log, "c:render"));
    assert!(position(&log, "c:did_load") < position(&log, "b:did_load"));
    assert!(position(&log, "b:did_load") < position(&log, "a:did_load"));
}
