//! 開いているバッファの環状リスト
//!
//! バッファはアリーナ（`Vec` のスロット）に置き、前後関係は添字で持つ。
//! 閉じたスロットは空きリストに戻して再利用する。スロットごとの世代番号を
//! `BufferId` に含めるので、閉じたバッファの ID が後から別のバッファを指すことはない。

use super::cursor::CursorPosition;
use super::lines::LineStore;
use crate::error::BufferError;
use crate::file::metadata::{LineFormat, StatSnapshot};
use std::path::PathBuf;

/// バッファの一意識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId {
    index: usize,
    generation: u32,
}

/// 1つの編集対象ファイルの状態
#[derive(Debug, Clone, Default)]
pub struct OpenBuffer {
    /// ファイル名（空なら未保存の新規バッファ）
    pub filename: PathBuf,
    /// 本文
    pub lines: LineStore,
    /// カーソル位置
    pub cursor: CursorPosition,
    /// 変更フラグ
    pub modified: bool,
    /// 改行形式
    pub format: LineFormat,
    /// 最後の読み書き時点の stat
    pub stat: Option<StatSnapshot>,
    /// 保持しているロックファイル
    pub lock_path: Option<PathBuf>,
    /// 横スクロールの先頭列（折り返し表示の切り替えで再検証する）
    pub first_column: usize,
}

impl OpenBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_named(&self) -> bool {
        !self.filename.as_os_str().is_empty()
    }
}

#[derive(Debug)]
struct Slot {
    buffer: OpenBuffer,
    prev: usize,
    next: usize,
}

#[derive(Debug, Default)]
struct Entry {
    /// 閉じるたびに進む
    generation: u32,
    slot: Option<Slot>,
}

/// 環状バッファリスト
#[derive(Debug, Default)]
pub struct BufferList {
    entries: Vec<Entry>,
    free: Vec<usize>,
    current: Option<usize>,
    first: Option<usize>,
    count: usize,
}

impl BufferList {
    pub fn new() -> Self {
        Self::default()
    }

    /// 空のバッファを現在のバッファの直後に追加し、現在のバッファにする
    pub fn create_buffer(&mut self) -> BufferId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.entries.push(Entry::default());
                self.entries.len() - 1
            }
        };

        let (prev, next) = match self.current {
            Some(current) => (current, self.slot(current).next),
            None => (index, index),
        };

        self.entries[index].slot = Some(Slot {
            buffer: OpenBuffer::new(),
            prev,
            next,
        });

        if let Some(current) = self.current {
            self.slot_mut(current).next = index;
            self.slot_mut(next).prev = index;
        } else {
            self.first = Some(index);
        }

        self.current = Some(index);
        self.count += 1;
        log::debug!("created buffer #{} ({} open)", index, self.count);

        self.id_at(index)
    }

    /// 現在のバッファをリストから外して返す
    ///
    /// 直前のバッファが現在のバッファになる。最後の1つは閉じられない。
    pub fn close_current(&mut self) -> Result<OpenBuffer, BufferError> {
        let current = self.current.ok_or(BufferError::NoBuffer)?;
        if self.count == 1 {
            return Err(BufferError::LastBuffer);
        }

        let entry = &mut self.entries[current];
        let orphan = entry.slot.take().ok_or(BufferError::NoBuffer)?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(current);

        if self.first == Some(current) {
            self.first = Some(orphan.next);
        }
        self.slot_mut(orphan.prev).next = orphan.next;
        self.slot_mut(orphan.next).prev = orphan.prev;

        self.current = Some(orphan.prev);
        self.count -= 1;
        log::debug!("closed buffer #{} ({} open)", current, self.count);

        Ok(orphan.buffer)
    }

    /// 次のバッファへ移動
    pub fn switch_next(&mut self) -> Result<BufferId, BufferError> {
        let current = self.current.ok_or(BufferError::NoBuffer)?;
        let next = self.slot(current).next;
        self.current = Some(next);
        Ok(self.id_at(next))
    }

    /// 前のバッファへ移動
    pub fn switch_prev(&mut self) -> Result<BufferId, BufferError> {
        let current = self.current.ok_or(BufferError::NoBuffer)?;
        let prev = self.slot(current).prev;
        self.current = Some(prev);
        Ok(self.id_at(prev))
    }

    /// 指定したバッファを現在のバッファにする
    pub fn switch_to(&mut self, id: BufferId) -> Result<(), BufferError> {
        if self.get(id).is_none() {
            return Err(BufferError::NoBuffer);
        }
        self.current = Some(id.index);
        Ok(())
    }

    pub fn current_id(&self) -> Option<BufferId> {
        self.current.map(|index| self.id_at(index))
    }

    pub fn first_id(&self) -> Option<BufferId> {
        self.first.map(|index| self.id_at(index))
    }

    pub fn current(&self) -> Option<&OpenBuffer> {
        let index = self.current?;
        self.entries[index].slot.as_ref().map(|slot| &slot.buffer)
    }

    pub fn current_mut(&mut self) -> Option<&mut OpenBuffer> {
        let index = self.current?;
        self.entries[index].slot.as_mut().map(|slot| &mut slot.buffer)
    }

    pub fn get(&self, id: BufferId) -> Option<&OpenBuffer> {
        self.entries
            .get(id.index)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.slot.as_ref())
            .map(|slot| &slot.buffer)
    }

    pub fn get_mut(&mut self, id: BufferId) -> Option<&mut OpenBuffer> {
        self.entries
            .get_mut(id.index)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.slot.as_mut())
            .map(|slot| &mut slot.buffer)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 開いているバッファが1つだけか
    pub fn is_single(&self) -> bool {
        self.count == 1
    }

    /// 先頭のバッファから順に列挙する
    pub fn ids(&self) -> Vec<BufferId> {
        let mut ids = Vec::with_capacity(self.count);
        let Some(first) = self.first else {
            return ids;
        };

        let mut index = first;
        loop {
            ids.push(self.id_at(index));
            index = self.slot(index).next;
            if index == first || ids.len() >= self.count {
                break;
            }
        }
        ids
    }

    /// 全バッファを取り出してリストを空にする
    pub fn drain(&mut self) -> Vec<OpenBuffer> {
        let buffers = self
            .entries
            .drain(..)
            .filter_map(|entry| entry.slot)
            .map(|slot| slot.buffer)
            .collect();
        self.free.clear();
        self.current = None;
        self.first = None;
        self.count = 0;
        buffers
    }

    fn id_at(&self, index: usize) -> BufferId {
        BufferId {
            index,
            generation: self.entries[index].generation,
        }
    }

    // 生きているスロットの添字だけが prev/next に現れる
    fn slot(&self, index: usize) -> &Slot {
        match self.entries.get(index).and_then(|entry| entry.slot.as_ref()) {
            Some(slot) => slot,
            None => unreachable!("buffer list link to a closed slot #{}", index),
        }
    }

    fn slot_mut(&mut self, index: usize) -> &mut Slot {
        match self.entries.get_mut(index).and_then(|entry| entry.slot.as_mut()) {
            Some(slot) => slot,
            None => unreachable!("buffer list link to a closed slot #{}", index),
        }
    }
}
