//! Comment pragma parser.
//!
//! Frontends that cannot add attributes to their markup (third-party widgets,
//! CMS-rendered HTML) annotate it out of band with comments:
//!
//! ```text
//! <!-- hydra block-uid=c1 editable-field=title(.t) -->  ...  <!-- /hydra -->
//! <!-- hydra block-uid=c2 media-field=image(img) /-->
//! ```
//!
//! The paired form applies to every element up to the closing comment; the
//! self-closing form applies to the next element sibling only. A field value of
//! `name(selector)` binds the field to the first element matching `selector`
//! within the annotated root; without a selector the root itself is the field.

use miette::{Diagnostic, SourceSpan};
use smol_str::SmolStr;
use thiserror::Error;

use crate::schema::FieldKind;
use crate::types::{AddSide, BlockId};

/// Leading keyword that marks a comment as a pragma.
pub const PRAGMA_KEYWORD: &str = "hydra";

/// A field binding declared by a pragma or attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinding {
    pub kind: FieldKind,
    /// Field path as written (`title`, `../title`, `/title`).
    pub path: SmolStr,
    /// Selector relative to the annotated root.
    pub selector: Option<String>,
}

/// Annotations carried by one pragma.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PragmaAttrs {
    pub block_uid: Option<BlockId>,
    pub fields: Vec<FieldBinding>,
    pub readonly: Option<bool>,
    pub add: Option<AddSide>,
    pub block_selector: Option<String>,
}

/// A classified pragma comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pragma {
    /// `<!-- hydra ... -->`, open range.
    Open(PragmaAttrs),
    /// `<!-- hydra ... /-->`, next sibling only.
    SelfClosing(PragmaAttrs),
    /// `<!-- /hydra -->`.
    Close,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PragmaErrorKind {
    #[error("unterminated {0}")]
    Unterminated(&'static str),
    #[error("key {0} needs a value")]
    MissingValue(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("block-uid given twice")]
    DuplicateUid,
}

/// A malformed pragma, with the offending span of the comment text.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
#[error("malformed hydra pragma: {kind}")]
#[diagnostic(code(hydra::pragma))]
pub struct PragmaError {
    pub kind: PragmaErrorKind,
    #[source_code]
    src: String,
    #[label("here")]
    span: SourceSpan,
    #[help]
    advice: Option<String>,
}

impl PragmaError {
    fn new(kind: PragmaErrorKind, src: &str, start: usize, len: usize) -> Self {
        let advice = match &kind {
            PragmaErrorKind::Unterminated(_) => Some("close the selector with `)`".to_string()),
            PragmaErrorKind::InvalidValue { key, .. } if key == "block-add" => {
                Some("block-add takes `bottom` or `right`".to_string())
            }
            _ => None,
        };
        Self {
            kind,
            src: src.to_string(),
            span: (start, len).into(),
            advice,
        }
    }

    pub fn span(&self) -> SourceSpan {
        self.span
    }
}

/// Classify and parse comment data (the text between `<!--` and `-->`).
///
/// Returns `Ok(None)` for ordinary comments.
pub fn parse_comment(data: &str) -> Result<Option<Pragma>, PragmaError> {
    let trimmed = data.trim();
    if trimmed == "/hydra" {
        return Ok(Some(Pragma::Close));
    }
    let Some(body) = trimmed.strip_prefix(PRAGMA_KEYWORD) else {
        return Ok(None);
    };
    if !body.is_empty() && !body.starts_with(char::is_whitespace) && body != "/" {
        // e.g. `<!-- hydrangea -->`
        return Ok(None);
    }

    let (body, self_closing) = match body.trim_end().strip_suffix('/') {
        Some(b) => (b, true),
        None => (body, false),
    };
    let body_offset = data.len() - data.trim_start().len() + PRAGMA_KEYWORD.len();

    let attrs = parse_attrs(data, body, body_offset)?;
    Ok(Some(if self_closing {
        Pragma::SelfClosing(attrs)
    } else {
        Pragma::Open(attrs)
    }))
}

/// Split on whitespace outside parentheses and quotes, keeping byte offsets.
fn tokenize<'a>(
    src: &str,
    body: &'a str,
    offset: usize,
) -> Result<Vec<(usize, &'a str)>, PragmaError> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start: Option<usize> = None;
    let mut open_at = 0;

    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                open_at = i;
                start.get_or_insert(i);
            }
            (None, '(') => {
                depth += 1;
                open_at = i;
                start.get_or_insert(i);
            }
            (None, ')') => {
                depth = depth.saturating_sub(1);
            }
            (None, c) if c.is_whitespace() && depth == 0 => {
                if let Some(s) = start.take() {
                    tokens.push((offset + s, &body[s..i]));
                }
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }
    if quote.is_some() {
        return Err(PragmaError::new(
            PragmaErrorKind::Unterminated("quoted value"),
            src,
            offset + open_at,
            1,
        ));
    }
    if depth > 0 {
        return Err(PragmaError::new(
            PragmaErrorKind::Unterminated("selector"),
            src,
            offset + open_at,
            1,
        ));
    }
    if let Some(s) = start {
        tokens.push((offset + s, &body[s..]));
    }
    Ok(tokens)
}

fn unquote(v: &str) -> &str {
    let v = v.trim();
    for q in ['"', '\''] {
        if let Some(inner) = v.strip_prefix(q).and_then(|s| s.strip_suffix(q)) {
            return inner;
        }
    }
    v
}

/// Split `name(selector)` into name and selector.
fn split_field_value(value: &str) -> (SmolStr, Option<String>) {
    let value = unquote(value);
    match value.find('(') {
        Some(open) if value.ends_with(')') => {
            let selector = value[open + 1..value.len() - 1].trim();
            let selector = (!selector.is_empty()).then(|| unquote(selector).to_string());
            (SmolStr::new(value[..open].trim()), selector)
        }
        _ => (SmolStr::new(value), None),
    }
}

fn parse_attrs<'a>(src: &str, body: &'a str, offset: usize) -> Result<PragmaAttrs, PragmaError> {
    let mut attrs = PragmaAttrs::default();

    for (pos, token) in tokenize(src, body, offset)? {
        let (key, value) = match token.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v)),
            None => (token.trim(), None),
        };
        let require = |value: Option<&'a str>| -> Result<&'a str, PragmaError> {
            value
                .map(unquote)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    PragmaError::new(
                        PragmaErrorKind::MissingValue(key.to_string()),
                        src,
                        pos,
                        token.len(),
                    )
                })
        };

        match key {
            "block-uid" => {
                if attrs.block_uid.is_some() {
                    return Err(PragmaError::new(
                        PragmaErrorKind::DuplicateUid,
                        src,
                        pos,
                        token.len(),
                    ));
                }
                attrs.block_uid = Some(require(value)?.into());
            }
            "editable-field" | "media-field" | "linkable-field" => {
                let kind = match key {
                    "media-field" => FieldKind::Media,
                    "linkable-field" => FieldKind::Linkable,
                    _ => FieldKind::Editable,
                };
                let (path, selector) = split_field_value(require(value)?);
                if path.is_empty() {
                    return Err(PragmaError::new(
                        PragmaErrorKind::MissingValue(key.to_string()),
                        src,
                        pos,
                        token.len(),
                    ));
                }
                attrs.fields.push(FieldBinding {
                    kind,
                    path,
                    selector,
                });
            }
            "block-readonly" => {
                attrs.readonly = Some(match value.map(unquote) {
                    None | Some("") | Some("true") => true,
                    Some("false") => false,
                    Some(other) => {
                        return Err(PragmaError::new(
                            PragmaErrorKind::InvalidValue {
                                key: key.to_string(),
                                value: other.to_string(),
                            },
                            src,
                            pos,
                            token.len(),
                        ));
                    }
                });
            }
            "block-add" => {
                let raw = require(value)?;
                attrs.add = Some(AddSide::parse(raw).ok_or_else(|| {
                    PragmaError::new(
                        PragmaErrorKind::InvalidValue {
                            key: key.to_string(),
                            value: raw.to_string(),
                        },
                        src,
                        pos,
                        token.len(),
                    )
                })?);
            }
            "block-selector" => {
                attrs.block_selector = Some(require(value)?.to_string());
            }
            other => {
                tracing::warn!(key = other, "hydra pragma: ignoring unknown key");
            }
        }
    }

    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinary_comment() {
        assert_eq!(parse_comment(" just a note ").unwrap(), None);
        assert_eq!(parse_comment("hydrangea").unwrap(), None);
    }

    #[test]
    fn test_close() {
        assert_eq!(parse_comment(" /hydra ").unwrap(), Some(Pragma::Close));
    }

    #[test]
    fn test_open_with_selector() {
        let pragma = parse_comment(" hydra block-uid=c1 editable-field=title(.t) ")
            .unwrap()
            .unwrap();
        let Pragma::Open(attrs) = pragma else {
            panic!("expected open pragma");
        };
        assert_eq!(attrs.block_uid.as_deref(), Some("c1"));
        assert_eq!(
            attrs.fields,
            vec![FieldBinding {
                kind: FieldKind::Editable,
                path: "title".into(),
                selector: Some(".t".into()),
            }]
        );
    }

    #[test]
    fn test_self_closing() {
        let pragma = parse_comment(" hydra block-uid=c2 media-field=image block-readonly /")
            .unwrap()
            .unwrap();
        let Pragma::SelfClosing(attrs) = pragma else {
            panic!("expected self-closing pragma");
        };
        assert_eq!(attrs.fields[0].kind, FieldKind::Media);
        assert_eq!(attrs.fields[0].selector, None);
        assert_eq!(attrs.readonly, Some(true));
    }

    #[test]
    fn test_selector_with_spaces() {
        let pragma = parse_comment(r#" hydra block-uid=x editable-field=body(div > p.lead) "#)
            .unwrap()
            .unwrap();
        let Pragma::Open(attrs) = pragma else {
            panic!("expected open pragma");
        };
        assert_eq!(attrs.fields[0].selector.as_deref(), Some("div > p.lead"));
    }

    #[test]
    fn test_unterminated_selector() {
        let err = parse_comment(" hydra block-uid=x editable-field=title(.t ").unwrap_err();
        assert_eq!(err.kind, PragmaErrorKind::Unterminated("selector"));
        assert_eq!(err.span().offset(), " hydra block-uid=x editable-field=title".len());
    }

    #[test]
    fn test_bad_add_direction() {
        let err = parse_comment(" hydra block-uid=x block-add=left ").unwrap_err();
        assert!(matches!(err.kind, PragmaErrorKind::InvalidValue { .. }));
    }

    #[test]
    fn test_missing_uid_value() {
        let err = parse_comment(" hydra block-uid= ").unwrap_err();
        assert_eq!(err.kind, PragmaErrorKind::MissingValue("block-uid".into()));
    }
}
