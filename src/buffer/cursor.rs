//! カーソル位置管理
//!
//! 行ストア内の位置（行番号とバイト列位置）

/// カーソル位置を表現する構造体
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct CursorPosition {
    /// 行番号（0ベース）
    pub line: usize,
    /// 列番号（0ベース、バイト単位）
    pub column: usize,
}

impl CursorPosition {
    /// 新しいカーソル位置を作成（原点に配置）
    pub fn new() -> Self {
        Self { line: 0, column: 0 }
    }

    /// 指定された位置にカーソルを作成
    pub fn at(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// カーソルを原点に移動
    pub fn move_to_origin(&mut self) {
        self.line = 0;
        self.column = 0;
    }

    /// カーソルを指定位置に移動
    pub fn move_to(&mut self, line: usize, column: usize) {
        self.line = line;
        self.column = column;
    }
}

/// 書き出し対象の範囲（開始を含み、終了を含まない）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: CursorPosition,
    pub end: CursorPosition,
}

impl Region {
    /// 2点から範囲を作る（順序は問わない）
    pub fn new(a: CursorPosition, b: CursorPosition) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_movement() {
        let mut cursor = CursorPosition::at(3, 7);
        cursor.move_to_origin();
        assert_eq!(cursor, CursorPosition::new());
        cursor.move_to(2, 1);
        assert_eq!(cursor, CursorPosition::at(2, 1));
    }

    #[test]
    fn test_region_orders_endpoints() {
        let later = CursorPosition::at(4, 0);
        let earlier = CursorPosition::at(1, 9);
        let region = Region::new(later, earlier);
        assert_eq!(region.start, earlier);
        assert_eq!(region.end, later);
    }
}
