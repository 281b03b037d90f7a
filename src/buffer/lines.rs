//! 行ストア
//!
//! バッファ本文を行のバイト列として保持する。行は終端文字を含まず、
//! NUL バイトはそのまま格納する。ストアは常に1行以上を持ち、
//! 末尾の空行は「ファイルが行終端で終わっている」ことを表す。

use super::cursor::{CursorPosition, Region};
use crate::error::BufferError;
use crate::file::metadata::LineEnding;

/// 1行分のテキスト
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Line {
    text: Vec<u8>,
    /// 読み込み時に見つかった終端（編集で作られた行は `None`）
    ending: Option<LineEnding>,
}

impl Line {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(text: impl Into<Vec<u8>>) -> Self {
        Self {
            text: text.into(),
            ending: None,
        }
    }

    pub fn with_ending(text: impl Into<Vec<u8>>, ending: LineEnding) -> Self {
        Self {
            text: text.into(),
            ending: Some(ending),
        }
    }

    pub fn text(&self) -> &[u8] {
        &self.text
    }

    pub fn ending(&self) -> Option<LineEnding> {
        self.ending
    }

    pub fn set_text(&mut self, text: impl Into<Vec<u8>>) {
        self.text = text.into();
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// 空にならない行の並び
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineStore {
    lines: Vec<Line>,
}

impl LineStore {
    /// 空行1行だけのストア
    pub fn new() -> Self {
        Self {
            lines: vec![Line::new()],
        }
    }

    /// 行の並びから構築（空なら空行を補う）
    pub fn from_lines(mut lines: Vec<Line>) -> Self {
        if lines.is_empty() {
            lines.push(Line::new());
        }
        Self { lines }
    }

    /// テキスト片から構築（テスト・編集用）
    pub fn from_texts<I, T>(texts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        Self::from_lines(
            texts
                .into_iter()
                .map(|text| Line::from_bytes(text.as_ref()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// 常に偽（空にはならない）
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn line(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    pub fn line_mut(&mut self, index: usize) -> Option<&mut Line> {
        self.lines.get_mut(index)
    }

    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.lines.iter()
    }

    pub fn first(&self) -> &Line {
        &self.lines[0]
    }

    pub fn last(&self) -> &Line {
        &self.lines[self.lines.len() - 1]
    }

    /// 行を末尾に追加
    pub fn push(&mut self, line: Line) {
        self.lines.push(line);
    }

    /// 表示上の行数（末尾の空行は数えない）
    pub fn reported_line_count(&self) -> usize {
        self.lines.len() - usize::from(self.last().is_empty())
    }

    /// 位置がストア内にあるか確認する
    pub fn validate(&self, pos: CursorPosition) -> Result<CursorPosition, BufferError> {
        match self.lines.get(pos.line) {
            Some(line) if pos.column <= line.len() => Ok(pos),
            _ => Err(BufferError::InvalidCursor {
                line: pos.line,
                column: pos.column,
            }),
        }
    }

    /// 末尾行が空でなければ空行を足す
    ///
    /// 足した場合は真を返す。
    pub fn ensure_trailing_blank(&mut self) -> bool {
        if self.last().is_empty() {
            return false;
        }
        self.lines.push(Line::new());
        true
    }

    /// 別のストアをカーソル位置に挿入し、挿入末尾の位置を返す
    ///
    /// カーソル行は列位置で分割され、挿入の先頭行は前半に、
    /// 挿入の末尾行は後半の前に連結される。
    pub fn ingraft(
        &mut self,
        at: CursorPosition,
        incoming: LineStore,
    ) -> Result<CursorPosition, BufferError> {
        let at = self.validate(at)?;
        let mut incoming = incoming.lines.into_iter();
        let target = &mut self.lines[at.line];

        let tail = target.text.split_off(at.column);
        let tail_ending = target.ending;

        // LineStore は空でないので先頭は必ずある
        let Some(first) = incoming.next() else {
            target.text.extend_from_slice(&tail);
            return Ok(at);
        };
        let mut rest: Vec<Line> = incoming.collect();

        if rest.is_empty() {
            let column = at.column + first.text.len();
            target.text.extend_from_slice(&first.text);
            target.text.extend_from_slice(&tail);
            return Ok(CursorPosition::at(at.line, column));
        }

        target.text.extend_from_slice(&first.text);
        target.ending = first.ending;

        let inserted = rest.len();
        if let Some(last) = rest.last_mut() {
            last.text.extend_from_slice(&tail);
            last.ending = tail_ending;
        }
        let column = rest
            .last()
            .map_or(0, |last| last.text.len() - tail.len());

        let insert_at = at.line + 1;
        self.lines.splice(insert_at..insert_at, rest);

        Ok(CursorPosition::at(at.line + inserted, column))
    }

    /// 範囲のコピーを新しいストアとして取り出す
    pub fn extract_region(&self, region: Region) -> Result<LineStore, BufferError> {
        let start = self.validate(region.start)?;
        let end = self.validate(region.end)?;

        if start.line == end.line {
            let text = &self.lines[start.line].text[start.column..end.column];
            return Ok(Self::from_lines(vec![Line::from_bytes(text)]));
        }

        let mut lines = Vec::with_capacity(end.line - start.line + 1);
        let first = &self.lines[start.line];
        lines.push(Line {
            text: first.text[start.column..].to_vec(),
            ending: first.ending,
        });
        lines.extend(self.lines[start.line + 1..end.line].iter().cloned());
        lines.push(Line::from_bytes(&self.lines[end.line].text[..end.column]));

        Ok(Self::from_lines(lines))
    }
}

impl Default for LineStore {
    fn default() -> Self {
        Self::new()
    }
}
