//! Translation of `beforeinput` events into text edits.
//!
//! The browser layer cancels the native edit and applies the translated
//! edits to the model instead, so the DOM only ever changes through a
//! re-render from the admin UI's reply.

use super::{Location, Mark, RichText, TextEdit, TextPoint, TextRange};
use crate::error::RichTextError;

/// What to do with an input event.
#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    /// Cancel the native edit and apply these instead.
    Edits(Vec<TextEdit>),
    /// Cancel the native edit; nothing changes (backspace at the start).
    Noop,
    /// Leave the event to the browser and reconcile from the DOM afterwards.
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Backward,
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Char,
    Word,
}

/// Translate an `InputEvent.inputType` with its data against the current
/// selection.
pub fn translate_input(
    doc: &RichText,
    input_type: &str,
    data: Option<&str>,
    selection: &TextRange,
) -> Result<InputAction, RichTextError> {
    let (start, end) = doc.ordered(selection)?;
    let start_point = doc.point_at(&start);
    let clear = || -> Vec<TextEdit> {
        if start == end {
            Vec::new()
        } else {
            vec![TextEdit::DeleteRange {
                range: TextRange::new(doc.point_at(&start), doc.point_at(&end)),
            }]
        }
    };

    let action = match input_type {
        "insertText" | "insertReplacementText" | "insertFromPaste" | "insertFromDrop" => {
            let Some(text) = data.filter(|t| !t.is_empty()) else {
                return Ok(InputAction::Noop);
            };
            let mut edits = clear();
            edits.push(TextEdit::InsertText {
                at: start_point,
                text: text.to_string(),
            });
            InputAction::Edits(edits)
        }
        "insertParagraph" => {
            let mut edits = clear();
            edits.push(TextEdit::SplitBlock { at: start_point });
            InputAction::Edits(edits)
        }
        "insertLineBreak" => {
            let mut edits = clear();
            edits.push(TextEdit::InsertText {
                at: start_point,
                text: "\n".into(),
            });
            InputAction::Edits(edits)
        }
        "deleteContentBackward" => delete(doc, &start, &end, Direction::Backward, Unit::Char),
        "deleteContentForward" => delete(doc, &start, &end, Direction::Forward, Unit::Char),
        "deleteWordBackward" => delete(doc, &start, &end, Direction::Backward, Unit::Word),
        "deleteWordForward" => delete(doc, &start, &end, Direction::Forward, Unit::Word),
        "deleteByCut" | "deleteContent" | "deleteByDrag" => match clear() {
            edits if edits.is_empty() => InputAction::Noop,
            edits => InputAction::Edits(edits),
        },
        "formatBold" => toggle(doc, selection, Mark::Strong)?,
        "formatItalic" => toggle(doc, selection, Mark::Em)?,
        "formatStrikeThrough" => toggle(doc, selection, Mark::Del)?,
        "formatUnderline" => toggle(doc, selection, Mark::U)?,
        other => {
            tracing::debug!(input_type = other, "unsupported input type");
            InputAction::Unsupported
        }
    };
    Ok(action)
}

/// Toggle a mark over the selection based on whether it is already active.
pub(crate) fn toggle(doc: &RichText, range: &TextRange, mark: Mark) -> Result<InputAction, RichTextError> {
    if range.is_collapsed() {
        return Ok(InputAction::Noop);
    }
    let active = doc.active_marks(range)?.iter().any(|m| m.same_kind(&mark));
    let edit = if active {
        TextEdit::RemoveMark {
            range: range.clone(),
            mark,
        }
    } else {
        TextEdit::AddMark {
            range: range.clone(),
            mark,
        }
    };
    Ok(InputAction::Edits(vec![edit]))
}

fn delete(doc: &RichText, start: &Location, end: &Location, dir: Direction, unit: Unit) -> InputAction {
    if start != end {
        return InputAction::Edits(vec![TextEdit::DeleteRange {
            range: TextRange::new(doc.point_at(start), doc.point_at(end)),
        }]);
    }
    let Some(block) = doc.block(&start.block) else {
        return InputAction::Noop;
    };
    let chars: Vec<char> = block.text().chars().collect();
    let at = start.offset;

    let range = match dir {
        Direction::Backward if at == 0 => {
            // Merge into the previous text block.
            let blocks = doc.text_blocks();
            let Some(prev) = blocks
                .iter()
                .position(|p| *p == start.block)
                .and_then(|i| i.checked_sub(1))
                .map(|i| &blocks[i])
            else {
                return InputAction::Noop;
            };
            let prev_len = doc.block(prev).map(|b| b.text_len()).unwrap_or(0);
            TextRange::new(
                doc.point_at(&Location {
                    block: prev.clone(),
                    offset: prev_len,
                }),
                doc.point_at(start),
            )
        }
        Direction::Forward if at == chars.len() => {
            let blocks = doc.text_blocks();
            let Some(next) = blocks
                .iter()
                .position(|p| *p == start.block)
                .and_then(|i| blocks.get(i + 1))
            else {
                return InputAction::Noop;
            };
            TextRange::new(
                doc.point_at(start),
                doc.point_at(&Location {
                    block: next.clone(),
                    offset: 0,
                }),
            )
        }
        Direction::Backward => {
            let from = match unit {
                Unit::Char => at - 1,
                Unit::Word => word_start(&chars, at),
            };
            TextRange::new(TextPoint::new(doc.point_at(start).node_id, from), doc.point_at(start))
        }
        Direction::Forward => {
            let to = match unit {
                Unit::Char => at + 1,
                Unit::Word => word_end(&chars, at),
            };
            TextRange::new(doc.point_at(start), TextPoint::new(doc.point_at(start).node_id, to))
        }
    };
    InputAction::Edits(vec![TextEdit::DeleteRange { range }])
}

fn word_start(chars: &[char], mut at: usize) -> usize {
    while at > 0 && chars[at - 1].is_whitespace() {
        at -= 1;
    }
    while at > 0 && !chars[at - 1].is_whitespace() {
        at -= 1;
    }
    at
}

fn word_end(chars: &[char], mut at: usize) -> usize {
    while at < chars.len() && chars[at].is_whitespace() {
        at += 1;
    }
    while at < chars.len() && !chars[at].is_whitespace() {
        at += 1;
    }
    at
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc() -> RichText {
        RichText::from_value(&json!([
            {"type": "p", "children": [{"text": "one two"}]},
            {"type": "p", "children": [{"text": "three"}]}
        ]))
        .unwrap()
    }

    fn caret(id: &str, offset: usize) -> TextRange {
        TextRange::caret(TextPoint::new(id, offset))
    }

    fn run(doc: &mut RichText, input_type: &str, data: Option<&str>, sel: TextRange) -> Option<TextPoint> {
        let InputAction::Edits(edits) = translate_input(doc, input_type, data, &sel).unwrap() else {
            return None;
        };
        let mut caret = None;
        for edit in &edits {
            caret = Some(doc.apply(edit).unwrap());
        }
        caret
    }

    #[test]
    fn test_typing_replaces_selection() {
        let mut d = doc();
        let sel = TextRange::new(TextPoint::new("0", 4), TextPoint::new("0", 7));
        let caret = run(&mut d, "insertText", Some("2"), sel).unwrap();
        assert_eq!(d.plain_text(), "one 2\nthree");
        assert_eq!(caret, TextPoint::new("0", 5));
    }

    #[test]
    fn test_backspace_at_block_start_merges() {
        let mut d = doc();
        let caret = run(&mut d, "deleteContentBackward", None, caret("1", 0)).unwrap();
        assert_eq!(d.plain_text(), "one twothree");
        assert_eq!(caret, TextPoint::new("0", 7));
    }

    #[test]
    fn test_backspace_at_document_start_is_noop() {
        let d = doc();
        assert_eq!(
            translate_input(&d, "deleteContentBackward", None, &caret("0", 0)).unwrap(),
            InputAction::Noop
        );
    }

    #[test]
    fn test_word_delete() {
        let mut d = doc();
        run(&mut d, "deleteWordBackward", None, caret("0", 7)).unwrap();
        assert_eq!(d.plain_text(), "one \nthree");
        let mut d = doc();
        run(&mut d, "deleteWordForward", None, caret("0", 0)).unwrap();
        assert_eq!(d.plain_text(), " two\nthree");
    }

    #[test]
    fn test_enter_splits() {
        let mut d = doc();
        let caret = run(&mut d, "insertParagraph", None, caret("0", 3)).unwrap();
        assert_eq!(d.plain_text(), "one\n two\nthree");
        assert_eq!(caret, TextPoint::new("1", 0));
    }

    #[test]
    fn test_format_bold_toggles() {
        let mut d = doc();
        let sel = TextRange::new(TextPoint::new("0", 0), TextPoint::new("0", 3));
        run(&mut d, "formatBold", None, sel.clone()).unwrap();
        assert_eq!(d.active_marks(&sel).unwrap(), vec![Mark::Strong]);
        run(&mut d, "formatBold", None, sel.clone()).unwrap();
        assert!(d.active_marks(&sel).unwrap().is_empty());
    }

    #[test]
    fn test_unsupported() {
        let d = doc();
        assert_eq!(
            translate_input(&d, "historyUndo", None, &caret("0", 0)).unwrap(),
            InputAction::Unsupported
        );
    }
}
