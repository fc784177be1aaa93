//! Edits against the rich-text tree.
//!
//! Pure text edits inside one leaf are applied in place so the tree keeps its
//! shape and every node id. Edits that cross leaves, split blocks or change
//! formatting flatten the affected text block into marked runs, edit the runs
//! and rebuild the inline content in a canonical nesting order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    Element, Location, Mark, RichNode, RichText, TextLeaf, TextPoint, TextRange, element_at_mut,
    path_id,
};
use crate::error::RichTextError;

/// A text-level edit expressed in node ids and character offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum TextEdit {
    InsertText { at: TextPoint, text: String },
    DeleteRange { range: TextRange },
    SplitBlock { at: TextPoint },
    AddMark { range: TextRange, mark: Mark },
    RemoveMark { range: TextRange, mark: Mark },
}

/// A maximal stretch of text with one set of marks.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Run {
    pub text: String,
    /// Sorted by nesting rank.
    pub marks: Vec<Mark>,
    pub leaf: serde_json::Map<String, Value>,
}

// === Runs ===

fn collect_runs(nodes: &[RichNode], marks: &mut Vec<Mark>, out: &mut Vec<Run>) {
    for node in nodes {
        match node {
            RichNode::Text(t) => out.push(Run {
                text: t.text.clone(),
                marks: marks.clone(),
                leaf: t.attrs.clone(),
            }),
            RichNode::Element(e) => match Mark::from_element(e) {
                Some(mark) => {
                    marks.push(mark);
                    collect_runs(&e.children, marks, out);
                    marks.pop();
                }
                // Unmarked inline wrappers (span) are flattened away.
                None => collect_runs(&e.children, marks, out),
            },
        }
    }
}

/// Flatten a text block into runs.
pub(crate) fn runs_of(block: &Element) -> Vec<Run> {
    let mut out = Vec::new();
    collect_runs(&block.children, &mut Vec::new(), &mut out);
    for run in &mut out {
        run.marks.sort_by_key(Mark::rank);
    }
    out
}

fn char_byte(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}

/// Runs covering characters `from..to`.
fn slice_runs(runs: &[Run], from: usize, to: usize) -> Vec<Run> {
    let mut out = Vec::new();
    let mut pos = 0;
    for run in runs {
        let len = run.text.chars().count();
        let (start, end) = (pos.max(from), (pos + len).min(to));
        if start < end {
            let text = &run.text[char_byte(&run.text, start - pos)..char_byte(&run.text, end - pos)];
            out.push(Run {
                text: text.to_string(),
                ..run.clone()
            });
        }
        pos += len;
    }
    out
}

fn normalize(runs: Vec<Run>) -> Vec<Run> {
    let mut out: Vec<Run> = Vec::new();
    for mut run in runs.into_iter().filter(|r| !r.text.is_empty()) {
        run.marks.sort_by_key(Mark::rank);
        run.marks.dedup_by(|a, b| a.same_kind(b));
        match out.last_mut() {
            Some(prev) if prev.marks == run.marks && prev.leaf == run.leaf => {
                prev.text.push_str(&run.text)
            }
            _ => out.push(run),
        }
    }
    out
}

fn build(runs: &[Run]) -> Vec<RichNode> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < runs.len() {
        let Some(mark) = runs[i].marks.first().cloned() else {
            out.push(RichNode::Text(TextLeaf {
                text: runs[i].text.clone(),
                attrs: runs[i].leaf.clone(),
            }));
            i += 1;
            continue;
        };
        let mut j = i;
        while j < runs.len() && runs[j].marks.contains(&mark) {
            j += 1;
        }
        let inner: Vec<Run> = runs[i..j]
            .iter()
            .map(|r| Run {
                marks: r.marks.iter().filter(|m| **m != mark).cloned().collect(),
                ..r.clone()
            })
            .collect();
        out.push(RichNode::Element(mark.to_element(build(&inner))));
        i = j;
    }
    out
}

/// Replace a block's inline content with `runs`.
fn rebuild(block: &mut Element, runs: Vec<Run>) {
    let runs = normalize(runs);
    block.children = build(&runs);
    if block.children.is_empty() {
        block.children.push(RichNode::text(""));
    }
}

// === Leaves ===

struct LeafSpan {
    path: Vec<usize>,
    start: usize,
    len: usize,
}

fn collect_leaves(nodes: &[RichNode], prefix: &mut Vec<usize>, pos: &mut usize, out: &mut Vec<LeafSpan>) {
    for (i, node) in nodes.iter().enumerate() {
        prefix.push(i);
        match node {
            RichNode::Text(t) => {
                let len = t.text.chars().count();
                out.push(LeafSpan {
                    path: prefix.clone(),
                    start: *pos,
                    len,
                });
                *pos += len;
            }
            RichNode::Element(e) => collect_leaves(&e.children, prefix, pos, out),
        }
        prefix.pop();
    }
}

fn leaves(block: &Element) -> Vec<LeafSpan> {
    let mut out = Vec::new();
    collect_leaves(&block.children, &mut Vec::new(), &mut 0, &mut out);
    out
}

fn leaf_mut<'a>(nodes: &'a mut [RichNode], path: &[usize]) -> Option<&'a mut TextLeaf> {
    let (first, rest) = path.split_first()?;
    match nodes.get_mut(*first)? {
        RichNode::Text(t) if rest.is_empty() => Some(t),
        RichNode::Element(e) => leaf_mut(&mut e.children, rest),
        RichNode::Text(_) => None,
    }
}

/// Leaf receiving an insertion at `offset`, preferring leaves under `within`.
fn insertion_leaf<'a>(spans: &'a [LeafSpan], offset: usize, within: &[usize]) -> Option<&'a LeafSpan> {
    let hits = |s: &&LeafSpan| s.start <= offset && offset <= s.start + s.len;
    spans
        .iter()
        .filter(hits)
        .find(|s| !within.is_empty() && s.path.starts_with(within))
        .or_else(|| {
            spans
                .iter()
                .filter(hits)
                .find(|s| s.start < offset || offset == 0)
        })
        .or_else(|| spans.iter().find(hits))
}

// === Apply ===

impl RichText {
    /// Apply an edit, returning the caret after it.
    pub fn apply(&mut self, edit: &TextEdit) -> Result<TextPoint, RichTextError> {
        let caret = match edit {
            TextEdit::InsertText { at, text } => self.insert_text(at, text)?,
            TextEdit::DeleteRange { range } => self.delete_range(range)?,
            TextEdit::SplitBlock { at } => self.split_block(at)?,
            TextEdit::AddMark { range, mark } => self.set_mark(range, mark, true)?,
            TextEdit::RemoveMark { range, mark } => self.set_mark(range, mark, false)?,
        };
        tracing::trace!(?edit, caret = ?caret, "rich text edit applied");
        Ok(caret)
    }

    fn insert_text(&mut self, at: &TextPoint, text: &str) -> Result<TextPoint, RichTextError> {
        let loc = self.locate(at)?;
        let node_path = self.path_of(&at.node_id).unwrap_or_default();
        let within = node_path.get(loc.block.len()..).unwrap_or_default().to_vec();
        let block = element_at_mut(&mut self.nodes, &loc.block)
            .ok_or_else(|| RichTextError::UnknownNode(at.node_id.clone()))?;

        let spans = leaves(block);
        let target = insertion_leaf(&spans, loc.offset, &within).map(|s| (s.path.clone(), s.start));
        match target.and_then(|(path, start)| leaf_mut(&mut block.children, &path).map(|l| (l, start))) {
            Some((leaf, start)) => {
                let byte = char_byte(&leaf.text, loc.offset - start);
                leaf.text.insert_str(byte, text);
            }
            None => {
                block.children.push(RichNode::text(text));
                self.assign_ids();
            }
        }
        Ok(self.point_at(&Location {
            block: loc.block,
            offset: loc.offset + text.chars().count(),
        }))
    }

    fn delete_range(&mut self, range: &TextRange) -> Result<TextPoint, RichTextError> {
        let (start, end) = self.ordered(range)?;
        if start == end {
            return Ok(self.point_at(&start));
        }

        if start.block == end.block {
            let block = element_at_mut(&mut self.nodes, &start.block)
                .ok_or(RichTextError::CrossBlockRange)?;
            let spans = leaves(block);
            let inside = spans
                .iter()
                .find(|s| s.start <= start.offset && end.offset <= s.start + s.len)
                .map(|s| (s.path.clone(), s.start));
            if let Some((leaf, leaf_start)) =
                inside.and_then(|(p, st)| leaf_mut(&mut block.children, &p).map(|l| (l, st)))
            {
                let from = char_byte(&leaf.text, start.offset - leaf_start);
                let to = char_byte(&leaf.text, end.offset - leaf_start);
                leaf.text.replace_range(from..to, "");
                return Ok(self.point_at(&start));
            }

            let runs = runs_of(block);
            let total = block.text_len();
            let mut kept = slice_runs(&runs, 0, start.offset);
            kept.extend(slice_runs(&runs, end.offset, total));
            rebuild(block, kept);
            self.assign_ids();
            return Ok(self.point_at(&start));
        }

        // Merge sibling blocks: keep the head of the first and the tail of the last.
        let (Some((a_idx, parent)), Some((b_idx, b_parent))) =
            (start.block.split_last(), end.block.split_last())
        else {
            return Err(RichTextError::CrossBlockRange);
        };
        if parent != b_parent {
            return Err(RichTextError::CrossBlockRange);
        }
        let tail = {
            let b = self.block(&end.block).ok_or(RichTextError::CrossBlockRange)?;
            slice_runs(&runs_of(b), end.offset, b.text_len())
        };
        let siblings = if parent.is_empty() {
            &mut self.nodes
        } else {
            &mut element_at_mut(&mut self.nodes, parent)
                .ok_or(RichTextError::CrossBlockRange)?
                .children
        };
        siblings.drain(a_idx + 1..=*b_idx);
        let a = element_at_mut(siblings, &[*a_idx]).ok_or(RichTextError::CrossBlockRange)?;
        let mut kept = slice_runs(&runs_of(a), 0, start.offset);
        kept.extend(tail);
        rebuild(a, kept);
        self.assign_ids();
        Ok(self.point_at(&start))
    }

    fn split_block(&mut self, at: &TextPoint) -> Result<TextPoint, RichTextError> {
        let loc = self.locate(at)?;
        let Some((index, parent)) = loc.block.split_last() else {
            return Err(RichTextError::NotTextBlock(at.node_id.clone()));
        };
        let block = element_at_mut(&mut self.nodes, &loc.block)
            .ok_or_else(|| RichTextError::UnknownNode(at.node_id.clone()))?;

        let runs = runs_of(block);
        let total = block.text_len();
        let mut second = Element::new(block.kind.clone(), Vec::new());
        second.attrs = block.attrs.clone();
        rebuild(&mut second, slice_runs(&runs, loc.offset, total));
        rebuild(block, slice_runs(&runs, 0, loc.offset));

        let siblings = if parent.is_empty() {
            &mut self.nodes
        } else {
            &mut element_at_mut(&mut self.nodes, parent)
                .ok_or_else(|| RichTextError::UnknownNode(at.node_id.clone()))?
                .children
        };
        siblings.insert(index + 1, RichNode::Element(second));
        self.assign_ids();

        let mut new_path = parent.to_vec();
        new_path.push(index + 1);
        Ok(TextPoint::new(path_id(&new_path), 0))
    }

    fn set_mark(&mut self, range: &TextRange, mark: &Mark, add: bool) -> Result<TextPoint, RichTextError> {
        let (start, end) = self.ordered(range)?;
        if start == end {
            return Ok(self.point_at(&end));
        }
        for path in self.text_blocks() {
            if path < start.block || path > end.block {
                continue;
            }
            let Some(block) = element_at_mut(&mut self.nodes, &path) else {
                continue;
            };
            let total = block.text_len();
            let from = if path == start.block { start.offset } else { 0 };
            let to = if path == end.block { end.offset } else { total };
            let runs = runs_of(block);

            let mut out = slice_runs(&runs, 0, from);
            for mut run in slice_runs(&runs, from, to) {
                run.marks.retain(|m| !m.same_kind(mark));
                if add {
                    run.marks.push(mark.clone());
                }
                out.push(run);
            }
            out.extend(slice_runs(&runs, to, total));
            rebuild(block, out);
        }
        self.assign_ids();
        Ok(self.point_at(&end))
    }
}
