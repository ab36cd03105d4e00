//! Flat XML documents: a root element whose children hold text.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::Event;

/// Text of the direct children of the document element, keyed by element
/// name. Only the first occurrence of a name is kept; empty elements map to
/// an empty string.
pub(crate) fn child_texts(xml: &str) -> Result<HashMap<String, String>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut seen_root = false;
    let mut current: Option<String> = None;
    let mut fields: HashMap<String, String> = HashMap::new();

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => {
                depth += 1;
                seen_root = true;
                if depth == 2 {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    current = if fields.contains_key(&name) {
                        None
                    } else {
                        fields.insert(name.clone(), String::new());
                        Some(name)
                    };
                }
            }
            Event::Empty(e) => {
                seen_root = true;
                if depth == 1 {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    fields.entry(name).or_default();
                }
            }
            Event::End(_) => {
                if depth == 2 {
                    current = None;
                }
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "unbalanced end tag".to_string())?;
            }
            Event::Text(t) => {
                if let (2, Some(name)) = (depth, &current) {
                    let text = t.unescape().map_err(|e| e.to_string())?;
                    fields.entry(name.clone()).or_default().push_str(&text);
                }
            }
            Event::CData(c) => {
                if let (2, Some(name)) = (depth, &current) {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    fields.entry(name.clone()).or_default().push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err("no document element".to_string());
    }
    if depth != 0 {
        return Err("unexpected end of document".to_string());
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_first_level_text() {
        let fields = child_texts(
            "<?xml version=\"1.0\"?><info><id>files</id><name>Files</name>\
             <name lang=\"de\">Dateien</name><default_enable/>\
             <description><![CDATA[File <b>management</b>]]></description>\
             <dependencies><nextcloud min-version=\"25\"/></dependencies></info>",
        )
        .unwrap();

        assert_eq!(fields["name"], "Files");
        assert_eq!(fields["default_enable"], "");
        assert_eq!(fields["description"], "File <b>management</b>");
        assert_eq!(fields["dependencies"], "");
        assert!(!fields.contains_key("nextcloud"));
    }

    #[test]
    fn entities_are_unescaped() {
        let fields = child_texts("<r><summary>Tom &amp; Jerry</summary></r>").unwrap();
        assert_eq!(fields["summary"], "Tom & Jerry");
    }

    #[test]
    fn malformed_documents() {
        assert!(child_texts("").is_err());
        assert!(child_texts("<r><a>text</r>").is_err());
        assert!(child_texts("<r><a>text</a>").is_err());
    }
}
