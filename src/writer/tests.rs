use super::*;
use crate::error::ErrorKind;
use crate::reader::{EventType, PullParser, XmlEvent, XmlPullParser};
use crate::FEATURE_PROCESS_NAMESPACES;
use pretty_assertions::assert_eq;

fn serializer() -> Serializer<Vec<u8>> {
    Serializer::with_output(Vec::new(), None).unwrap()
}

fn output(mut s: Serializer<Vec<u8>>) -> String {
    String::from_utf8(s.take_output().unwrap()).unwrap()
}

#[test]
fn test_empty_element_with_attribute() {
    let mut s = serializer();
    s.start_tag(None, "a").unwrap().attribute(None, "x", "1").unwrap();
    s.end_tag(None, "a").unwrap();
    s.end_document().unwrap();
    assert_eq!(output(s), r#"<a x="1" />"#);
}

#[test]
fn test_nested_elements_and_text() {
    let mut s = serializer();
    s.start_tag(None, "a").unwrap();
    s.start_tag(None, "b").unwrap().text("hi").unwrap();
    s.end_tag(None, "b").unwrap();
    s.end_tag(None, "a").unwrap();
    assert_eq!(output(s), "<a><b>hi</b></a>");
}

#[test]
fn test_prefix_minted_for_element() {
    let mut s = serializer();
    s.start_tag(Some("urn:x"), "a").unwrap();
    s.end_document().unwrap();
    assert_eq!(output(s), r#"<n0:a xmlns:n0="urn:x" />"#);
}

#[test]
fn test_prefix_minted_for_attribute() {
    let mut s = serializer();
    s.start_tag(None, "a").unwrap().attribute(Some("urn:x"), "k", "v").unwrap();
    s.end_tag(None, "a").unwrap();
    assert_eq!(output(s), r#"<a n0:k="v" xmlns:n0="urn:x" />"#);
}

#[test]
fn test_minted_prefixes_do_not_collide() {
    let mut s = serializer();
    s.set_prefix(Some("n0"), Some("urn:taken")).unwrap();
    s.start_tag(None, "a").unwrap().attribute(Some("urn:x"), "k", "v").unwrap();
    s.end_tag(None, "a").unwrap();
    assert_eq!(output(s), r#"<a n1:k="v" xmlns:n0="urn:taken" xmlns:n1="urn:x" />"#);
}

#[test]
fn test_default_namespace_binding() {
    let mut s = serializer();
    s.set_prefix(Some(""), Some("urn:d")).unwrap();
    s.start_tag(Some("urn:d"), "root").unwrap();
    s.start_tag(Some("urn:d"), "child").unwrap().text("hi").unwrap();
    s.end_tag(Some("urn:d"), "child").unwrap();
    s.end_tag(Some("urn:d"), "root").unwrap();
    assert_eq!(output(s), r#"<root xmlns="urn:d"><child>hi</child></root>"#);
}

#[test]
fn test_binding_scoped_to_element() {
    let mut s = serializer();
    s.start_tag(None, "r").unwrap();
    s.set_prefix(Some("p"), Some("urn:p")).unwrap();
    s.start_tag(Some("urn:p"), "a").unwrap();
    s.end_tag(Some("urn:p"), "a").unwrap();
    s.start_tag(Some("urn:p"), "b").unwrap();
    s.end_tag(Some("urn:p"), "b").unwrap();
    s.end_tag(None, "r").unwrap();
    assert_eq!(
        output(s),
        r#"<r><p:a xmlns:p="urn:p" /><n0:b xmlns:n0="urn:p" /></r>"#
    );
}

#[test]
fn test_prefix_for() {
    let mut s = serializer();
    s.set_prefix(Some("p"), Some("urn:p")).unwrap();
    s.start_tag(Some("urn:p"), "a").unwrap();
    assert_eq!(s.prefix_for("urn:p", false).unwrap().as_deref(), Some("p"));
    assert_eq!(s.prefix_for("urn:none", false).unwrap(), None);
    assert_eq!(s.prefix_for("urn:new", true).unwrap().as_deref(), Some("n0"));
}

#[test]
fn test_text_escaping() {
    let mut s = serializer();
    s.start_tag(None, "a").unwrap().text("x<y & z>w \"q\" 'a'").unwrap();
    s.end_tag(None, "a").unwrap();
    assert_eq!(output(s), "<a>x&lt;y &amp; z&gt;w \"q\" 'a'</a>");
}

#[test]
fn test_attribute_quote_choice() {
    let mut s = serializer();
    s.start_tag(None, "a")
        .unwrap()
        .attribute(None, "q", r#"say "hi""#)
        .unwrap()
        .attribute(None, "s", "it's")
        .unwrap();
    s.end_tag(None, "a").unwrap();
    assert_eq!(output(s), r#"<a q='say "hi"' s="it's" />"#);
}

#[test]
fn test_attribute_line_breaks_escaped() {
    let mut s = serializer();
    s.start_tag(None, "a").unwrap().attribute(None, "v", "x\ny\tz").unwrap();
    s.end_tag(None, "a").unwrap();
    assert_eq!(output(s), r#"<a v="x&#10;y&#9;z" />"#);
}

#[test]
fn test_non_ascii_without_unicode_encoding() {
    let mut s = serializer();
    s.start_tag(None, "a").unwrap().text("caf\u{e9} \u{1F600}").unwrap();
    s.end_tag(None, "a").unwrap();
    assert_eq!(output(s), "<a>caf&#233; &#128512;</a>");
}

#[test]
fn test_non_ascii_with_utf8() {
    let mut s = Serializer::with_output(Vec::new(), Some("UTF-8")).unwrap();
    s.start_tag(None, "a").unwrap().text("caf\u{e9} \u{1F600}").unwrap();
    s.end_tag(None, "a").unwrap();
    assert_eq!(output(s), "<a>caf\u{e9} \u{1F600}</a>");
}

#[test]
fn test_latin1_output() {
    let mut s = Serializer::with_output(Vec::new(), Some("ISO-8859-1")).unwrap();
    s.start_tag(None, "a").unwrap().text("\u{e9}").unwrap();
    s.end_tag(None, "a").unwrap();
    assert_eq!(s.take_output().unwrap(), b"<a>&#233;</a>".to_vec());
}

#[test]
fn test_utf16_output() {
    let mut s = Serializer::with_output(Vec::new(), Some("UTF-16LE")).unwrap();
    s.start_tag(None, "a").unwrap();
    s.end_tag(None, "a").unwrap();
    let bytes = s.take_output().unwrap();
    assert_eq!(bytes, vec![b'<', 0, b'a', 0, b' ', 0, b'/', 0, b'>', 0]);
}

#[test]
fn test_start_document() {
    let mut s = Serializer::with_output(Vec::new(), Some("UTF-8")).unwrap();
    s.start_document(Some("UTF-8"), Some(true)).unwrap();
    s.start_tag(None, "a").unwrap();
    s.end_document().unwrap();
    assert_eq!(output(s), "<?xml version='1.0' encoding='UTF-8' standalone='yes' ?><a />");

    let mut s = serializer();
    s.start_document(None, None).unwrap();
    assert_eq!(output(s), "<?xml version='1.0' ?>");
}

#[test]
fn test_other_content() {
    let mut s = serializer();
    s.docdecl(" r").unwrap();
    s.start_tag(None, "r").unwrap();
    s.comment(" c ").unwrap();
    s.processing_instruction("pi data").unwrap();
    s.cdsect("x<y").unwrap();
    s.entity_ref("amp").unwrap();
    s.ignorable_whitespace(" ").unwrap();
    s.end_tag(None, "r").unwrap();
    assert_eq!(
        output(s),
        "<!DOCTYPE r><r><!-- c --><?pi data?><![CDATA[x<y]]>&amp; </r>"
    );
}

#[test]
fn test_indentation() {
    let mut s = serializer();
    s.set_feature(FEATURE_INDENT_OUTPUT, true).unwrap();
    assert!(s.feature(FEATURE_INDENT_OUTPUT));
    s.start_tag(None, "a").unwrap();
    s.start_tag(None, "b").unwrap();
    s.end_tag(None, "b").unwrap();
    s.start_tag(None, "c").unwrap().text("t").unwrap();
    s.end_tag(None, "c").unwrap();
    s.end_tag(None, "a").unwrap();
    assert_eq!(output(s), "\r\n<a>\r\n  <b />\r\n  <c>t</c>\r\n</a>");
}

#[test]
fn test_end_document_closes_open_elements() {
    let mut s = serializer();
    s.start_tag(None, "a").unwrap();
    s.start_tag(None, "b").unwrap().text("x").unwrap();
    s.end_document().unwrap();
    assert_eq!(output(s), "<a><b>x</b></a>");

    let mut s = serializer();
    s.start_tag(None, "root").unwrap();
    s.end_document().unwrap();
    assert_eq!(output(s), "<root />");
}

#[test]
fn test_depth_and_current_element() {
    let mut s = serializer();
    assert_eq!(s.depth(), 0);
    s.start_tag(Some("urn:x"), "a").unwrap();
    assert_eq!(s.depth(), 1);
    assert_eq!(s.name(), Some("a"));
    assert_eq!(s.namespace(), Some("urn:x"));
    s.text("t").unwrap();
    assert_eq!(s.depth(), 1);
    s.start_tag(None, "b").unwrap();
    assert_eq!(s.depth(), 2);
    s.end_tag(None, "b").unwrap();
    assert_eq!(s.depth(), 1);
    s.end_tag(Some("urn:x"), "a").unwrap();
    assert_eq!(s.depth(), 0);
    assert_eq!(s.name(), None);
}

#[test]
fn test_attribute_outside_start_tag() {
    let mut s = serializer();
    let err = s.attribute(None, "x", "1").map(|_| ()).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::IllegalState));

    s.start_tag(None, "a").unwrap().text("t").unwrap();
    let err = s.attribute(None, "x", "1").map(|_| ()).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::IllegalState));
}

#[test]
fn test_mismatched_end_tag() {
    let mut s = serializer();
    s.start_tag(None, "a").unwrap();
    let err = s.end_tag(None, "b").map(|_| ()).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::MismatchedEndTag));
    assert_eq!(err.to_string(), "</{}b> does not match start");

    let err = s.end_tag(Some(""), "a").map(|_| ()).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::MismatchedEndTag));

    let mut s = serializer();
    let err = s.end_tag(None, "a").map(|_| ()).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::MismatchedEndTag));
}

#[test]
fn test_default_namespace_for_no_namespace_element() {
    let mut s = serializer();
    s.set_prefix(Some(""), Some("urn:d")).unwrap();
    let err = s.start_tag(Some(""), "a").map(|_| ()).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::IllegalDefaultNamespace));
}

#[test]
fn test_no_namespace_child_undeclares_default() {
    let mut s = serializer();
    s.set_prefix(Some(""), Some("urn:d")).unwrap();
    s.start_tag(Some("urn:d"), "a").unwrap();
    s.start_tag(Some(""), "b").unwrap();
    s.end_tag(Some(""), "b").unwrap();
    s.end_tag(Some("urn:d"), "a").unwrap();
    assert_eq!(output(s), r#"<a xmlns="urn:d"><b xmlns="" /></a>"#);
}

#[test]
fn test_no_output() {
    let mut s: Serializer<Vec<u8>> = Serializer::new();
    let err = s.start_tag(None, "a").map(|_| ()).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NoOutput));
}

#[test]
fn test_unsupported_encoding_and_feature() {
    let err = Serializer::with_output(Vec::new(), Some("EBCDIC")).map(|_| ()).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::UnsupportedEncoding));

    let mut s = serializer();
    let err = s.set_feature("http://example.com/no-such-feature", true).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::UnsupportedFeature));
}

#[test]
fn test_set_output_resets_state() {
    let mut s = serializer();
    s.start_tag(Some("urn:x"), "a").unwrap();
    s.set_output(Vec::new(), None).unwrap();
    assert_eq!(s.depth(), 0);
    s.start_tag(Some("urn:y"), "b").unwrap();
    s.end_tag(Some("urn:y"), "b").unwrap();
    assert_eq!(output(s), r#"<n0:b xmlns:n0="urn:y" />"#);
}

/// Parse with namespaces on, keeping only the events that survive a rewrite
fn semantic_events(doc: &str) -> Vec<XmlEvent> {
    let mut parser = PullParser::new();
    parser.set_input_str(doc);
    parser.set_feature(FEATURE_PROCESS_NAMESPACES, true).unwrap();
    parser
        .events()
        .map(|e| e.unwrap())
        .map(|e| match e {
            XmlEvent::StartTag { namespace, name, attributes, .. } => XmlEvent::StartTag {
                namespace,
                prefix: None,
                name,
                attributes: attributes
                    .into_iter()
                    .map(|mut a| {
                        a.prefix = None;
                        a
                    })
                    .collect(),
                empty: false,
            },
            XmlEvent::EndTag { namespace, name, .. } => XmlEvent::EndTag { namespace, prefix: None, name },
            other => other,
        })
        .collect()
}

fn rewrite(doc: &str) -> String {
    let mut parser = PullParser::new();
    parser.set_input_str(doc);
    parser.set_feature(FEATURE_PROCESS_NAMESPACES, true).unwrap();
    let mut s = Serializer::with_output(Vec::new(), Some("UTF-8")).unwrap();

    loop {
        match parser.next().unwrap() {
            EventType::StartTag => {
                let namespace = parser.namespace().unwrap_or("").to_string();
                let name = parser.name().unwrap_or("").to_string();
                s.start_tag(Some(&namespace), &name).unwrap();
                for attr in parser.attributes() {
                    s.attribute(Some(&attr.namespace), &attr.name, &attr.value).unwrap();
                }
            }
            EventType::EndTag => {
                let namespace = parser.namespace().unwrap_or("").to_string();
                let name = parser.name().unwrap_or("").to_string();
                s.end_tag(Some(&namespace), &name).unwrap();
            }
            EventType::Text => {
                s.text(parser.text().unwrap_or("")).unwrap();
            }
            EventType::IgnorableWhitespace => {
                s.ignorable_whitespace(parser.text().unwrap_or("")).unwrap();
            }
            EventType::EndDocument => break,
            _ => {}
        }
    }
    s.end_document().unwrap();
    output(s)
}

#[test]
fn test_semantic_round_trip() {
    let docs = [
        "<a/>",
        "<a x='1' y=\"two &amp; three\">text &lt;here&gt;</a>",
        "<r xmlns='urn:d' xmlns:p='urn:p'><p:c p:k='v'>x</p:c><d/></r>",
        "<a>line1\nline2 \u{e9}\u{1F600}</a>",
        "<a v='tab\there'><b/>\n<c>&#65;&#x42;</c></a>",
    ];
    for doc in docs {
        let written = rewrite(doc);
        assert_eq!(semantic_events(&written), semantic_events(doc), "rewritten as {written}");
    }
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_text_survives_rewrite(text in "[a-z<>&\"' \n\u{e9}\u{4e2d}]{1,40}") {
            let mut s = Serializer::with_output(Vec::new(), Some("UTF-8")).unwrap();
            s.start_tag(None, "a").unwrap().attribute(None, "v", &text).unwrap().text(&text).unwrap();
            s.end_document().unwrap();
            let written = output(s);

            let mut parser = PullParser::new();
            parser.set_input_str(&written);
            prop_assert_eq!(parser.next().unwrap(), EventType::StartTag);
            prop_assert_eq!(parser.attribute_value_by_name(None, "v"), Some(text.as_str()));
            prop_assert_eq!(parser.next().unwrap(), EventType::Text);
            prop_assert_eq!(parser.text(), Some(text.as_str()));
        }
    }
}
