//! Rule identifier extraction from XML rule-definition files.
//!
//! Parsing is a two-stage attempt:
//!
//! 1. Parse the content as-is.
//! 2. If that fails *only* because the content has several top-level
//!    elements (concatenated fragments), wrap it in one synthetic root and
//!    parse again.
//!
//! Anything still unparseable yields no identifiers plus an
//! [`ExtractError`] diagnostic. Extraction never fails outright.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::errors::ExtractError;
use crate::models::{ParseStatus, RuleId};

const RULE_ELEMENT: &[u8] = b"rule";
const ID_ATTRIBUTE: &[u8] = b"id";
const SYNTHETIC_ROOT: &str = "rulegate-fragments";

/// Result of extracting identifiers from one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Identifiers in document order. Duplicates are preserved.
    pub ids: Vec<RuleId>,
    /// Set when the content could not be parsed even after wrapping.
    pub failure: Option<ExtractError>,
    /// Whether the synthetic-root fallback was needed.
    pub wrapped: bool,
}

impl Extraction {
    pub fn status(&self) -> ParseStatus {
        match &self.failure {
            None => ParseStatus::Ok,
            Some(e) => ParseStatus::ParseError(e.to_string()),
        }
    }
}

/// Extract every numeric `id` of every `<rule>` element in `content`.
pub fn extract_rule_ids(content: &str) -> Extraction {
    match parse_document(content.trim_start_matches('\u{feff}')) {
        Ok(ids) => {
            debug!(count = ids.len(), "extracted rule ids");
            Extraction {
                ids,
                failure: None,
                wrapped: false,
            }
        }
        Err(ExtractError::MultipleRoots { .. }) => {
            debug!("multiple top-level elements, retrying with a synthetic root");
            let wrapped = wrap_fragments(content);
            match parse_document(&wrapped) {
                Ok(ids) => Extraction {
                    ids,
                    failure: None,
                    wrapped: true,
                },
                Err(e) => {
                    warn!(error = %e, "rule content is malformed even with a synthetic root");
                    Extraction {
                        ids: Vec::new(),
                        failure: Some(e),
                        wrapped: true,
                    }
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "rule content is malformed");
            Extraction {
                ids: Vec::new(),
                failure: Some(e),
                wrapped: false,
            }
        }
    }
}

/// Wrap `content` in a synthetic root element.
///
/// A leading XML declaration must stay outside the new root, so it is
/// dropped before wrapping.
fn wrap_fragments(content: &str) -> String {
    let body = content.trim_start_matches('\u{feff}').trim_start();
    let body = match body.strip_prefix("<?xml") {
        Some(rest) => match rest.find("?>") {
            Some(end) => &rest[end + 2..],
            None => body,
        },
        None => body,
    };
    format!("<{root}>{body}</{root}>", root = SYNTHETIC_ROOT, body = body)
}

/// Parse a single XML document, collecting rule ids.
///
/// Ids are only returned when the whole document is well-formed.
fn parse_document(content: &str) -> Result<Vec<RuleId>, ExtractError> {
    let mut reader = Reader::from_str(content);
    let mut ids = Vec::new();
    let mut depth: usize = 0;
    let mut seen_root = false;

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader.read_event().map_err(|e| ExtractError::Malformed {
            position,
            detail: e.to_string(),
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                if depth == 0 {
                    if seen_root {
                        return Err(ExtractError::MultipleRoots { position });
                    }
                    seen_root = true;
                }
                collect_rule_id(e, position, &mut ids)?;
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
            }
            Event::End(_) => {
                if depth == 0 {
                    return Err(ExtractError::Malformed {
                        position,
                        detail: "closing tag without matching opening tag".into(),
                    });
                }
                depth -= 1;
            }
            Event::Text(ref t) if depth == 0 => {
                if t.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                if seen_root {
                    return Err(ExtractError::MultipleRoots { position });
                }
                return Err(ExtractError::Malformed {
                    position,
                    detail: "text before the root element".into(),
                });
            }
            Event::CData(_) if depth == 0 => {
                return Err(ExtractError::Malformed {
                    position,
                    detail: "character data outside the root element".into(),
                });
            }
            Event::Decl(_) if seen_root => {
                return Err(ExtractError::Malformed {
                    position,
                    detail: "XML declaration is only allowed at the start".into(),
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth > 0 {
        return Err(ExtractError::Malformed {
            position: reader.buffer_position() as u64,
            detail: "unclosed element at end of input".into(),
        });
    }
    if !seen_root {
        return Err(ExtractError::NoRootElement);
    }
    Ok(ids)
}

/// Validate an element's attributes and record its id when it is a `<rule>`.
fn collect_rule_id(
    element: &BytesStart<'_>,
    position: u64,
    ids: &mut Vec<RuleId>,
) -> Result<(), ExtractError> {
    let is_rule = element.name().as_ref() == RULE_ELEMENT;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| ExtractError::Malformed {
            position,
            detail: e.to_string(),
        })?;
        if !is_rule || attr.key.as_ref() != ID_ATTRIBUTE {
            continue;
        }
        let value = attr.unescape_value().map_err(|e| ExtractError::Malformed {
            position,
            detail: e.to_string(),
        })?;
        match parse_rule_id(&value) {
            Some(id) => ids.push(id),
            None => debug!(value = %value, "ignoring non-numeric rule id"),
        }
    }
    Ok(())
}

/// Accept only values made entirely of ASCII decimal digits.
fn parse_rule_id(value: &str) -> Option<RuleId> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse::<u64>().ok().map(RuleId)
}
