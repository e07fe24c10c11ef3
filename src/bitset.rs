//! 16 位固定长度位集，记录区块中哪些纵向 section 存在

/// 可记录的 section 槽位数
pub const SECTION_SLOTS: usize = 16;

/// 固定 16 位的位集，只能置位不能清除
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitSet16(u16);

impl BitSet16 {
    pub fn new() -> Self {
        Self(0)
    }

    /// 标记第 `i` 位。`i >= 16` 时 panic
    pub fn set(&mut self, i: usize) {
        assert!(i < SECTION_SLOTS, "位索引越界: {} (容量 {})", i, SECTION_SLOTS);
        self.0 |= 1 << i;
    }

    pub fn is_set(&self, i: usize) -> bool {
        i < SECTION_SLOTS && self.0 & (1 << i) != 0
    }

    /// 打包后的字节表示（大端序，第 i 位对应槽位 i）
    pub fn bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}
