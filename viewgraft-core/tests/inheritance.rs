//! Edit-spec application against worked base archs: every position kind,
//! the `data` wrapper, `$0` wrapping, moves, and attribute surgery.

use pretty_assertions::assert_eq;
use viewgraft_core::{apply_inheritance_specs, Arch, ViewError};

fn apply(base: &str, spec: &str) -> String {
    let mut arch = Arch::parse(base).unwrap();
    let doc = Arch::parse(spec).unwrap();
    apply_inheritance_specs(&mut arch, &doc, None).unwrap();
    arch.to_xml()
}

fn apply_err(base: &str, spec: &str) -> ViewError {
    let mut arch = Arch::parse(base).unwrap();
    let doc = Arch::parse(spec).unwrap();
    apply_inheritance_specs(&mut arch, &doc, None).unwrap_err()
}

const BASE: &str = r#"<form string="Title"><field name="target"/></form>"#;

#[test]
fn replace_with_content() {
    assert_eq!(
        apply(
            BASE,
            r#"<field name="target" position="replace"><field name="replacement"/></field>"#,
        ),
        r#"<form string="Title"><field name="replacement"/></form>"#
    );
}

#[test]
fn replace_with_nothing_deletes() {
    assert_eq!(
        apply(BASE, r#"<field name="target" position="replace"/>"#),
        r#"<form string="Title"/>"#
    );
}

#[test]
fn insert_after() {
    assert_eq!(
        apply(
            BASE,
            r#"<field name="target" position="after"><field name="inserted"/></field>"#,
        ),
        r#"<form string="Title"><field name="target"/><field name="inserted"/></form>"#
    );
}

#[test]
fn insert_before() {
    assert_eq!(
        apply(
            BASE,
            r#"<field name="target" position="before"><field name="inserted"/></field>"#,
        ),
        r#"<form string="Title"><field name="inserted"/><field name="target"/></form>"#
    );
}

#[test]
fn insert_inside_defaults_and_appends() {
    let mut arch = Arch::parse(BASE).unwrap();
    // bare spec without position defaults to inside
    let default_spec =
        Arch::parse(r#"<field name="target"><field name="inserted"/></field>"#).unwrap();
    apply_inheritance_specs(&mut arch, &default_spec, None).unwrap();
    let explicit =
        Arch::parse(r#"<field name="target" position="inside"><field name="inserted 2"/></field>"#)
            .unwrap();
    apply_inheritance_specs(&mut arch, &explicit, None).unwrap();
    assert_eq!(
        arch.to_xml(),
        r#"<form string="Title"><field name="target"><field name="inserted"/><field name="inserted 2"/></field></form>"#
    );
}

#[test]
fn data_wrapper_unpacks_in_order() {
    assert_eq!(
        apply(
            BASE,
            r#"<data><field name="target"><field name="inserted 0"/></field><field name="target"><field name="inserted 1"/></field></data>"#,
        ),
        r#"<form string="Title"><field name="target"><field name="inserted 0"/><field name="inserted 1"/></field></form>"#
    );
}

#[test]
fn text_around_elements_is_preserved() {
    let base = r#"<form string="F">(<div/>)</form>"#;
    assert_eq!(
        apply(base, r#"<div position="inside">a<p/>b<p/>c</div>"#),
        r#"<form string="F">(<div>a<p/>b<p/>c</div>)</form>"#
    );
    assert_eq!(
        apply(base, r#"<div position="after">a<p/>b<p/>c</div>"#),
        r#"<form string="F">(<div/>a<p/>b<p/>c)</form>"#
    );
    assert_eq!(
        apply(base, r#"<div position="before">a<p/>b<p/>c</div>"#),
        r#"<form string="F">(a<p/>b<p/>c<div/>)</form>"#
    );
}

#[test]
fn wrap_via_placeholder() {
    assert_eq!(
        apply(
            "<template><div><p>Content</p></div></template>",
            r#"<xpath expr="//p" position="replace"><div class="some">$0</div></xpath>"#,
        ),
        r#"<template><div><div class="some"><p>Content</p></div></div></template>"#
    );
}

#[test]
fn replace_inner_keeps_element_and_attrs() {
    assert_eq!(
        apply(
            r#"<form><div class="keep"><p>old</p>text</div></form>"#,
            r#"<xpath expr="//div" position="replace" mode="inner"><span>new</span></xpath>"#,
        ),
        r#"<form><div class="keep"><span>new</span></div></form>"#
    );
}

#[test]
fn replace_root_takes_single_element_and_template_name() {
    assert_eq!(
        apply(
            r#"<t t-name="tpl"><p/></t>"#,
            r#"<xpath expr="/t" position="replace"><div class="new"/></xpath>"#,
        ),
        r#"<div class="new" t-name="tpl"/>"#
    );
    let err = apply_err(
        "<form/>",
        r#"<xpath expr="/form" position="replace"><a/><b/></xpath>"#,
    );
    assert!(matches!(err, ViewError::InvalidSpec { .. }));
}

#[test]
fn invalid_position_is_rejected() {
    let err = apply_err(
        BASE,
        r#"<field name="target" position="serious_series"><field name="whoops"/></field>"#,
    );
    assert!(matches!(err, ViewError::InvalidPosition { position } if position == "serious_series"));
}

#[test]
fn version_mismatch_is_target_not_found() {
    let err = apply_err(
        r#"<form><element foo="42"/></form>"#,
        r#"<element foo="42" version="7.0"><field name="placeholder"/></element>"#,
    );
    assert!(matches!(err, ViewError::TargetNotFound { .. }));
}

#[test]
fn missing_target_reports_the_spec() {
    let err = apply_err(BASE, r#"<field name="targut"/>"#);
    match err {
        ViewError::TargetNotFound { spec } => assert_eq!(spec, r#"<field name="targut">"#),
        other => panic!("unexpected error {other:?}"),
    }
}

// ============================================================================
// move
// ============================================================================

const MOVE_BASE: &str =
    r#"<template><div><p class="some">Content</p></div><div class="target"/></template>"#;
const MOVE_WRAPPED: &str =
    r#"<template><div>aaaa<p class="some">Content</p>bbbb</div><div class="target"/></template>"#;

#[test]
fn move_into_replace() {
    let spec = r#"<xpath expr="//div[@class='target']" position="replace"><xpath expr="//p" position="move"/></xpath>"#;
    assert_eq!(
        apply(MOVE_BASE, spec),
        r#"<template><div/><p class="some">Content</p></template>"#
    );
    assert_eq!(
        apply(MOVE_WRAPPED, spec),
        r#"<template><div>aaaabbbb</div><p class="some">Content</p></template>"#
    );
}

#[test]
fn move_inside() {
    let spec = r#"<xpath expr="//div[@class='target']" position="inside"><xpath expr="//p" position="move"/></xpath>"#;
    assert_eq!(
        apply(MOVE_WRAPPED, spec),
        r#"<template><div>aaaabbbb</div><div class="target"><p class="some">Content</p></div></template>"#
    );
}

#[test]
fn move_before_and_after() {
    let before = r#"<xpath expr="//div[@class='target']" position="before"><xpath expr="//p" position="move"/></xpath>"#;
    assert_eq!(
        apply(MOVE_BASE, before),
        r#"<template><div/><p class="some">Content</p><div class="target"/></template>"#
    );
    let after = r#"<xpath expr="//div[@class='target']" position="after"><xpath expr="//p" position="move"/></xpath>"#;
    assert_eq!(
        apply(MOVE_BASE, after),
        r#"<template><div/><div class="target"/><p class="some">Content</p></template>"#
    );
}

#[test]
fn move_mixes_with_plain_content_in_spec_order() {
    let move_first = r#"<xpath expr="//div[@class='target']" position="after"><xpath expr="//p" position="move"/><p class="new_p">Content2</p></xpath>"#;
    assert_eq!(
        apply(MOVE_BASE, move_first),
        r#"<template><div/><div class="target"/><p class="some">Content</p><p class="new_p">Content2</p></template>"#
    );
    let move_last = r#"<xpath expr="//div[@class='target']" position="after"><p class="new_p">Content2</p><xpath expr="//p" position="move"/></xpath>"#;
    assert_eq!(
        apply(MOVE_WRAPPED, move_last),
        r#"<template><div>aaaabbbb</div><div class="target"/><p class="new_p">Content2</p><p class="some">Content</p></template>"#
    );
}

#[test]
fn move_of_missing_element_fails() {
    let err = apply_err(
        MOVE_BASE,
        r#"<xpath expr="//div[@class='target']" position="after"><xpath expr="//p[@name='none']" position="move"/></xpath>"#,
    );
    assert!(matches!(err, ViewError::TargetNotFound { .. }));
}

#[test]
fn move_spec_must_be_childless() {
    let err = apply_err(
        MOVE_BASE,
        r#"<xpath expr="//div[@class='target']" position="after"><xpath expr="//p" position="move"><p class="new_p">Content2</p></xpath></xpath>"#,
    );
    assert!(matches!(err, ViewError::InvalidMove { .. }));
}

// A move spec nested below another element is not recognized as a move and
// lands in the output as literal content. Known quirk, pinned here.
#[test]
fn move_spec_not_direct_child_is_literal_content() {
    let spec = r#"<xpath expr="//div[@class='target']" position="after"><div class="wrapper"><xpath expr="//p" position="move"><p class="new_p">Content2</p></xpath></div></xpath>"#;
    assert_eq!(
        apply(MOVE_BASE, spec),
        r#"<template><div><p class="some">Content</p></div><div class="target"/><div class="wrapper"><xpath expr="//p" position="move"><p class="new_p">Content2</p></xpath></div></template>"#
    );
}

// ============================================================================
// attributes
// ============================================================================

#[test]
fn attribute_set_and_token_surgery() {
    let spec = r#"<footer position="attributes"><attribute name="thing">bob tata lolo</attribute><attribute name="thing" add="bibi and co" remove="tata" separator=" "/><attribute name="otherthing">bob, tata,lolo</attribute><attribute name="otherthing" remove="tata, bob"/></footer>"#;
    assert_eq!(
        apply("<form><footer/></form>", spec),
        r#"<form><footer thing="bob lolo bibi and co" otherthing="lolo"/></form>"#
    );
}

#[test]
fn empty_attribute_value_deletes() {
    assert_eq!(
        apply(
            r#"<form><footer thing="x"/></form>"#,
            r#"<footer position="attributes"><attribute name="thing"/><attribute name="absent"/></footer>"#,
        ),
        "<form><footer/></form>"
    );
}

#[test]
fn attribute_value_with_add_is_rejected() {
    let err = apply_err(
        "<form><footer/></form>",
        r#"<footer position="attributes"><attribute name="thing" add="a">boom</attribute></footer>"#,
    );
    assert!(matches!(err, ViewError::InvalidSpec { .. }));
}

#[test]
fn replacing_string_attribute_then_content() {
    // several specs in one document touch the same tree sequentially
    let base = r#"<form string="Base title"><separator name="separator"/><footer><button name="action_archive"/></footer></form>"#;
    let spec = r#"<data><form position="attributes"><attribute name="string">Replacement title</attribute></form><footer position="replace"><footer><button name="action_unarchive"/></footer></footer><separator name="separator" position="replace"><p>Replacement data</p></separator></data>"#;
    assert_eq!(
        apply(base, spec),
        r#"<form string="Replacement title"><p>Replacement data</p><footer><button name="action_unarchive"/></footer></form>"#
    );
}
