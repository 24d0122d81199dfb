use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tse::{ConfigOverrides, ContentMode, Document, Engine, NodeId};

const MS: Duration = Duration::from_millis(1);

fn ctx(v: Value) -> Map<String, Value> {
    serde_json::from_value(v).unwrap()
}

fn started(markup: &str) -> Engine {
    let mut engine = Engine::new(Document::parse(markup)).unwrap();
    engine.initialize(ConfigOverrides::default()).unwrap();
    engine
}

fn by_id(engine: &Engine, id: &str) -> NodeId {
    engine.document().element_by_id(id).unwrap()
}

fn append_paragraph(engine: &mut Engine, text: &str) -> NodeId {
    let doc = engine.document_mut();
    let body = doc.body().unwrap();
    let p = doc.create_element("p");
    let t = doc.create_text(text);
    doc.append_child(p, t).unwrap();
    doc.append_child(body, p).unwrap();
    p
}

#[test]
fn initial_scan_renders_placeholders() {
    let engine = started("<p id=\"sum\">Sum: ${2+2}</p>");
    let p = by_id(&engine, "sum");
    assert_eq!(engine.document().text_content(p), "Sum: 4");
}

#[test]
fn set_content_renders_with_custom_context() {
    let mut engine = started("<p id=\"greet\"></p>");
    engine.add_to_context(ctx(json!({"name": "Ann"})));
    let p = by_id(&engine, "greet");
    engine.set_content(p, "Hi ${name}", ContentMode::Text);
    assert_eq!(engine.document().text_content(p), "Hi Ann");

    engine.set_content(p, "<b>${name}</b>", ContentMode::Markup);
    assert_eq!(engine.document().inner_html(p), "<b>Ann</b>");
}

#[test]
fn custom_context_shadows_base_without_overwriting_it() {
    let mut engine = Engine::new(Document::new()).unwrap();
    engine.set_base_context(ctx(json!({"x": 1, "y": 1})));
    engine.add_to_context(ctx(json!({"x": 2})));
    assert_eq!(engine.evaluate("x"), Some(json!(2)));
    engine.add_to_context(ctx(json!({"x": 3})));
    assert_eq!(engine.evaluate("x"), Some(json!(3)));
    assert_eq!(engine.evaluate("y"), Some(json!(1)));
    assert_eq!(engine.evaluate_with("x + y", &ctx(json!({"y": 10}))), Some(json!(13)));
}

#[test]
fn eval_context_feeds_the_base_layer() {
    let mut engine = Engine::new(Document::parse("<p id=\"p\">${site} ${x}</p>")).unwrap();
    engine.add_to_context(ctx(json!({"x": "custom"})));
    let overrides = ConfigOverrides::from_json(r#"{"evalContext": {"site": "docs", "x": "base"}}"#)
        .unwrap();
    engine.initialize(overrides).unwrap();
    let p = by_id(&engine, "p");
    assert_eq!(engine.document().text_content(p), "docs custom");
}

#[test]
fn disabled_subtree_is_left_alone_until_enabled() {
    let mut engine = started("<div id=\"d\" data-tse-disable><p id=\"p\">${1+1}</p></div>");
    let (d, p) = (by_id(&engine, "d"), by_id(&engine, "p"));
    assert!(engine.is_disabled(p));
    assert_eq!(engine.document().text_content(p), "${1+1}");

    engine.scan(None);
    assert_eq!(engine.document().text_content(p), "${1+1}");

    engine.enable(d);
    assert!(!engine.is_disabled(p));
    assert_eq!(engine.document().text_content(p), "2");
}

#[test]
fn disable_stops_interception_inside_the_subtree() {
    let mut engine = started("<div id=\"d\"><p id=\"p\"></p></div>");
    let (d, p) = (by_id(&engine, "d"), by_id(&engine, "p"));
    engine.disable(d);
    assert_eq!(engine.document().attribute(d, "data-tse-disable"), Some(""));
    engine.document_mut().set_text_content(p, "${1+1}");
    engine.run_until_idle();
    assert_eq!(engine.document().text_content(p), "${1+1}");
}

#[test]
fn removing_the_marker_by_hand_rescans_after_the_debounce() {
    let mut engine = started("<div id=\"d\" data-tse-disable>${'on'}</div>");
    let d = by_id(&engine, "d");
    engine.document_mut().remove_attribute(d, "data-tse-disable");
    engine.pump();
    assert_eq!(engine.document().text_content(d), "${'on'}");
    engine.run_until_idle();
    assert_eq!(engine.document().text_content(d), "on");
}

#[test]
fn attribute_binding_sets_the_live_property() {
    let engine = started("<input id=\"i\" data-tse-bind-value=\"'abc'\">");
    let input = by_id(&engine, "i");
    assert_eq!(engine.document().property(input, "value"), Some(&json!("abc")));
    assert_eq!(
        engine.document().attribute(input, "data-tse-bind-value"),
        Some("'abc'")
    );
}

#[test]
fn changed_binding_attribute_is_rebound() {
    let mut engine = started("<input id=\"i\" data-tse-bind-value=\"1\">");
    let input = by_id(&engine, "i");
    engine
        .document_mut()
        .set_attribute(input, "data-tse-bind-value", "1 + 1");
    engine.run_until_idle();
    assert_eq!(engine.document().property(input, "value"), Some(&json!(2)));
}

#[test]
fn rapid_insertions_coalesce_into_one_pass() {
    let mut engine = started("");
    let inserted: Vec<NodeId> = (0..5)
        .map(|i| {
            let p = append_paragraph(&mut engine, &format!("${{{i} * 2}}"));
            engine.advance(2 * MS);
            p
        })
        .collect();
    assert_eq!(engine.processing_passes(), 0);
    engine.run_until_idle();
    assert_eq!(engine.processing_passes(), 1);
    let texts: Vec<String> = inserted
        .iter()
        .map(|&p| engine.document().text_content(p))
        .collect();
    assert_eq!(texts, vec!["0", "2", "4", "6", "8"]);
}

#[test]
fn character_data_changes_are_rerendered() {
    let mut engine = started("<p id=\"p\">static</p>");
    engine.add_to_context(ctx(json!({"name": "Ann"})));
    let p = by_id(&engine, "p");
    let text = engine.document().children(p)[0];
    engine.document_mut().set_node_value(text, "Hello ${name}");
    engine.advance(5 * MS);
    assert_eq!(engine.document().text(text), Some("Hello ${name}"));
    engine.advance(5 * MS);
    assert_eq!(engine.document().text(text), Some("Hello Ann"));
}

#[test]
fn native_setters_are_intercepted() {
    let mut engine = started("<div id=\"d\"><p id=\"p\"></p></div>");
    engine.add_to_context(ctx(json!({"name": "Ann"})));
    let (d, p) = (by_id(&engine, "d"), by_id(&engine, "p"));
    assert!(engine.is_intercepting());

    let doc = engine.document_mut();
    doc.set_text_content(p, "Hi ${name}");
    assert_eq!(doc.text_content(p), "Hi Ann");
    doc.set_attribute(p, "title", "${name.length}");
    assert_eq!(doc.attribute(p, "title"), Some("3"));
    doc.set_inner_html(d, "<em>${name}</em>");
    assert_eq!(doc.inner_html(d), "<em>Ann</em>");
    doc.set_attribute(d, "data-tse-disable", "${name}");
    assert_eq!(doc.attribute(d, "data-tse-disable"), Some("${name}"));
}

#[test]
fn destroy_restores_native_behavior_and_drops_pending_work() {
    let mut engine = started("<p id=\"p\"></p>");
    let p = by_id(&engine, "p");
    let late = append_paragraph(&mut engine, "${1}");
    engine.pump();
    engine.destroy();
    assert!(!engine.is_intercepting());
    assert!(!engine.is_watching());
    assert_eq!(engine.document().observer_count(), 0);

    engine.run_until_idle();
    assert_eq!(engine.processing_passes(), 0);
    assert_eq!(engine.document().text_content(late), "${1}");

    engine.document_mut().set_text_content(p, "${1}");
    assert_eq!(engine.document().text_content(p), "${1}");

    // Destroy is idempotent.
    engine.destroy();
    assert!(!engine.is_intercepting());
}

#[test]
fn initialization_waits_for_a_loading_document() {
    let mut doc = Document::loading();
    let body = doc.body().unwrap();
    let p = doc.create_element("p");
    let t = doc.create_text("${1+1}");
    doc.append_child(p, t).unwrap();
    doc.append_child(body, p).unwrap();

    let mut engine = Engine::new(doc).unwrap();
    engine.initialize(ConfigOverrides::default()).unwrap();
    assert!(!engine.is_watching());
    assert_eq!(engine.document().text_content(p), "${1+1}");

    engine.document_mut().finish_loading();
    engine.pump();
    assert!(engine.is_watching());
    assert_eq!(engine.document().text_content(p), "2");
}

#[test]
fn configure_recreates_the_watcher_for_a_new_debounce() {
    let mut engine = started("");
    engine
        .configure(ConfigOverrides::from_json(r#"{"debounceTime": 50}"#).unwrap())
        .unwrap();
    assert_eq!(engine.config().debounce_time, 50 * MS);
    assert_eq!(engine.document().observer_count(), 1);

    let p = append_paragraph(&mut engine, "${'late'}");
    engine.advance(20 * MS);
    assert_eq!(engine.document().text_content(p), "${'late'}");
    engine.advance(30 * MS);
    assert_eq!(engine.document().text_content(p), "late");
}

#[test]
fn reconfiguring_keeps_mutations_awaiting_the_debounce() {
    let mut engine = started("");
    let p = append_paragraph(&mut engine, "${1 + 1}");
    engine.advance(2 * MS);
    engine
        .configure(ConfigOverrides::from_json(r#"{"debounceTime": 50}"#).unwrap())
        .unwrap();
    assert_eq!(engine.document().text_content(p), "${1 + 1}");
    engine.run_until_idle();
    assert_eq!(engine.document().text_content(p), "2");
    assert_eq!(engine.processing_passes(), 1);
}

#[test]
fn reconfiguring_keeps_mutations_not_yet_delivered() {
    let mut engine = started("");
    let p = append_paragraph(&mut engine, "${'queued'}");
    engine
        .configure(ConfigOverrides::from_json(r#"{"debounceTime": 30}"#).unwrap())
        .unwrap();
    engine.advance(29 * MS);
    assert_eq!(engine.document().text_content(p), "${'queued'}");
    engine.advance(MS);
    assert_eq!(engine.document().text_content(p), "queued");
}

#[test]
fn switching_observation_off_processes_pending_mutations() {
    let mut engine = started("");
    let p = append_paragraph(&mut engine, "${3 * 3}");
    engine.advance(2 * MS);
    engine
        .configure(ConfigOverrides {
            observe_mutations: Some(false),
            ..Default::default()
        })
        .unwrap();
    assert!(!engine.is_watching());
    assert_eq!(engine.document().text_content(p), "9");
    assert_eq!(engine.processing_passes(), 1);
}

#[test]
fn observation_can_be_switched_off() {
    let mut engine = Engine::new(Document::new()).unwrap();
    engine
        .initialize(ConfigOverrides {
            observe_mutations: Some(false),
            ..Default::default()
        })
        .unwrap();
    assert!(!engine.is_watching());
    let p = append_paragraph(&mut engine, "${1}");
    engine.run_until_idle();
    assert_eq!(engine.document().text_content(p), "${1}");
    engine.scan(Some(p));
    assert_eq!(engine.document().text_content(p), "1");
}

#[test]
fn custom_prefix_and_delimiter() {
    let mut engine = Engine::new(Document::parse(
        "<p id=\"p\">{{ 6 * 7 }}</p><input id=\"i\" x-bind-checked=\"true\">",
    ))
    .unwrap();
    let overrides = ConfigOverrides::from_json(
        r#"{"attributePrefix": "x-bind-", "templateDelimiter": "\\{\\{\\s*(.+?)\\s*\\}\\}"}"#,
    )
    .unwrap();
    engine.initialize(overrides).unwrap();
    assert_eq!(engine.document().text_content(by_id(&engine, "p")), "42");
    let input = by_id(&engine, "i");
    assert_eq!(engine.document().property(input, "checked"), Some(&json!(true)));
}

#[test]
fn rescanning_is_idempotent() {
    let mut engine = started("<p id=\"p\">${'a' + 'b'}</p><a id=\"a\" href=\"/x\">${1}</a>");
    let before = engine.document().inner_html(engine.document().body().unwrap());
    engine.scan(None).scan(None);
    let after = engine.document().inner_html(engine.document().body().unwrap());
    assert_eq!(before, after);
    assert_eq!(engine.processing_passes(), 0);
}

#[test]
fn errors_render_inline() {
    let engine = started("<p id=\"p\">${missing.value}</p>");
    let p = by_id(&engine, "p");
    assert_eq!(
        engine.document().text_content(p),
        "[Error: missing is not defined]"
    );
    assert_eq!(engine.version(), env!("CARGO_PKG_VERSION"));
}
