//! Parser for YouTube's timedtext XML caption format.
//!
//! ```xml
//! <transcript>
//!   <text start="0.0" dur="1.54">Hey there</text>
//!   <text start="1.54" dur="4.16">how are you &amp;amp; you?</text>
//! </transcript>
//! ```
//!
//! Caption bodies arrive entity-encoded twice (XML, then HTML), and may carry
//! inline formatting tags; both layers are removed so each snippet holds the
//! text as displayed.

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

use super::CaptionSnippet;

#[derive(thiserror::Error, Debug)]
pub enum TimedTextError {
    #[error("document contains no <transcript> element")]
    NotATranscript,

    #[error("invalid {attribute} attribute: {value:?}")]
    BadAttribute { attribute: &'static str, value: String },

    #[error("xml parse: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("xml attribute: {0}")]
    Attribute(#[from] AttrError),

    #[error("pattern compilation failed")]
    Pattern,
}

fn tag_pattern() -> Result<&'static Regex, TimedTextError> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"<[^>]*>").ok())
        .as_ref()
        .ok_or(TimedTextError::Pattern)
}

/// Timing and accumulated body of the `<text>` element being read
struct OpenElement {
    start: f64,
    duration: f64,
    body: String,
}

/// Parse a timedtext document into ordered snippets.
///
/// Elements without a body are skipped, matching how the player renders them.
pub fn parse(xml: &str) -> Result<Vec<CaptionSnippet>, TimedTextError> {
    let tags = tag_pattern()?;
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut saw_transcript = false;
    let mut open: Option<OpenElement> = None;
    let mut snippets = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"transcript" => saw_transcript = true,
                b"text" if open.is_none() => {
                    let (start, duration) = timing(&e)?;
                    open = Some(OpenElement {
                        start,
                        duration,
                        body: String::new(),
                    });
                }
                _ => {}
            },
            Event::Empty(e) if e.name().as_ref() == b"transcript" => saw_transcript = true,
            Event::Text(t) => {
                if let Some(element) = open.as_mut() {
                    // Bare HTML entities are not valid XML; leave them for the HTML pass
                    let text = t
                        .unescape()
                        .unwrap_or_else(|_| Cow::Owned(String::from_utf8_lossy(&t).into_owned()));
                    element.body.push_str(&text);
                }
            }
            Event::CData(t) => {
                if let Some(element) = open.as_mut() {
                    element.body.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::End(e) if e.name().as_ref() == b"text" => {
                if let Some(element) = open.take() {
                    if element.body.is_empty() {
                        continue;
                    }
                    let html_decoded = html_escape::decode_html_entities(&element.body);
                    snippets.push(CaptionSnippet {
                        text: tags.replace_all(&html_decoded, "").into_owned(),
                        start: element.start,
                        duration: element.duration,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_transcript {
        return Err(TimedTextError::NotATranscript);
    }
    Ok(snippets)
}

fn timing(element: &BytesStart<'_>) -> Result<(f64, f64), TimedTextError> {
    let mut start = 0.0;
    let mut duration = 0.0;
    for attr in element.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"start" => start = parse_seconds("start", &attr.unescape_value()?)?,
            b"dur" => duration = parse_seconds("dur", &attr.unescape_value()?)?,
            _ => {}
        }
    }
    Ok((start, duration))
}

fn parse_seconds(attribute: &'static str, value: &str) -> Result<f64, TimedTextError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| TimedTextError::BadAttribute {
            attribute,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ordered_snippets() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript>
<text start="0.03" dur="1.5">Hello</text>
<text start="1.53" dur="2">world</text>
</transcript>"#;

        let snippets = parse(xml).unwrap();
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].text, "Hello");
        assert_eq!(snippets[0].start, 0.03);
        assert_eq!(snippets[0].duration, 1.5);
        assert_eq!(snippets[1].text, "world");
        assert_eq!(snippets[1].start, 1.53);
    }

    #[test]
    fn test_double_encoded_entities_and_tags() {
        let xml = r#"<transcript><text start="0" dur="1">it&amp;#39;s &lt;i&gt;fine&lt;/i&gt; &amp;amp; good</text></transcript>"#;
        let snippets = parse(xml).unwrap();
        assert_eq!(snippets[0].text, "it's fine & good");
    }

    #[test]
    fn test_named_html_entities_are_decoded() {
        let xml = r#"<transcript><text start="0" dur="1">caf&amp;eacute; &amp;hellip; &amp;mdash; &amp;rsquo;</text></transcript>"#;
        let snippets = parse(xml).unwrap();
        assert_eq!(snippets[0].text, "café … — ’");
    }

    #[test]
    fn test_bare_html_entity_survives_xml_pass() {
        let xml = r#"<transcript><text start="0" dur="1">na&iuml;ve</text></transcript>"#;
        assert_eq!(parse(xml).unwrap()[0].text, "naïve");
    }

    #[test]
    fn test_multiline_body_is_kept() {
        let xml = "<transcript><text start=\"0\" dur=\"1\">first line\nsecond line</text></transcript>";
        assert_eq!(parse(xml).unwrap()[0].text, "first line\nsecond line");
    }

    #[test]
    fn test_empty_elements_are_skipped() {
        let xml = r#"<transcript><text start="0" dur="1"/><text start="1" dur="1"></text><text start="2" dur="1">kept</text></transcript>"#;
        let snippets = parse(xml).unwrap();
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].text, "kept");
    }

    #[test]
    fn test_missing_duration_defaults_to_zero() {
        let xml = r#"<transcript><text start="4.2">no dur</text></transcript>"#;
        let snippets = parse(xml).unwrap();
        assert_eq!(snippets[0].duration, 0.0);
    }

    #[test]
    fn test_rejects_non_transcript_documents() {
        assert!(matches!(
            parse("<html>blocked</html>"),
            Err(TimedTextError::NotATranscript)
        ));
    }

    #[test]
    fn test_rejects_bad_timing() {
        let xml = r#"<transcript><text start="soon" dur="1">x</text></transcript>"#;
        assert!(matches!(
            parse(xml),
            Err(TimedTextError::BadAttribute { attribute: "start", .. })
        ));
    }
}
