//! 区块模型：从 NBT 树中取出转换所需的字段并校验

use crate::bitset::{BitSet16, SECTION_SLOTS};
use crate::nbt::empty_compound;
use fastnbt::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// 光照数组长度（16×16×16 个 4 位值）
pub const LIGHT_ARRAY_LEN: usize = 2048;

const X_POS: &str = "xPos";
const Z_POS: &str = "zPos";
const SECTIONS: &str = "Sections";
const HEIGHTMAP: &[&str] = &["HeightMap", "Heightmaps"];
const TILE_ENTITIES: &str = "TileEntities";
const ENTITIES: &str = "Entities";
const BLOCK_STATES: &str = "BlockStates";
const BIOMES: &str = "Biomes";

/// 1.18 起的区块不再有 Level 包装，section 列表改名为 `sections`，
/// 且包含负 Y，无法放进 16 个槽位
const MODERN_SECTIONS: &str = "sections";
const BLOCK_LIGHT: &str = "BlockLight";
const SKY_LIGHT: &str = "SkyLight";

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("区块根节点不是 Compound")]
    NotCompound,
    #[error("缺少字段 {0}")]
    MissingField(&'static str),
    #[error("字段 {0} 类型错误")]
    InvalidField(&'static str),
    #[error("section {y} 的 {kind} 长度无效: {len}")]
    InvalidLight {
        kind: &'static str,
        y: i64,
        len: usize,
    },
    #[error("section Y 越界: {0}")]
    SectionOutOfRange(i64),
    #[error("重复的 section Y: {0}")]
    DuplicateSection(u8),
    #[error("不支持的区块格式: 字段 {0} (1.18 及以后的世界)")]
    UnsupportedFormat(&'static str),
}

/// 区块的绝对坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// 所在区域文件的坐标
    pub fn region(&self) -> (i32, i32) {
        (self.x >> 5, self.z >> 5)
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// 区块中 16 格高的一层
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSection {
    pub y: u8,
    pub block_light: Option<Vec<u8>>,
    pub sky_light: Option<Vec<u8>>,
    pub block_states: Value,
    pub biomes: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub coord: ChunkCoord,
    pub sections: Vec<ChunkSection>,
    pub heightmap: Value,
    pub tile_entities: Vec<Value>,
    pub entities: Vec<Value>,
}

impl Chunk {
    /// 从解码后的区块 NBT 构造区块。
    ///
    /// 没有方块状态的 section 会被丢弃；丢弃后没有任何 section 的区块
    /// 返回 `Ok(None)`。保留下来的 section 必须满足光照数组长度为 2048、
    /// Y 位于 0..16 且不重复，否则整个区块校验失败。
    pub fn from_nbt(root: Value) -> Result<Option<Self>, ChunkError> {
        let mut map = match root {
            Value::Compound(map) => map,
            _ => return Err(ChunkError::NotCompound),
        };
        // 旧版格式把区块数据包在 Level 下
        if let Some(Value::Compound(level)) = map.remove("Level") {
            map = level;
        }

        if map.contains_key(MODERN_SECTIONS) {
            return Err(ChunkError::UnsupportedFormat(MODERN_SECTIONS));
        }

        let x = take_int(&mut map, X_POS)?;
        let z = take_int(&mut map, Z_POS)?;

        let raw_sections = match map.remove(SECTIONS) {
            Some(Value::List(list)) => list,
            Some(_) => return Err(ChunkError::InvalidField("Sections")),
            None => Vec::new(),
        };

        let mut present = BitSet16::new();
        let mut sections = Vec::with_capacity(raw_sections.len());
        for raw in raw_sections {
            let Some(section) = ChunkSection::from_nbt(raw)? else {
                continue;
            };
            let slot = section.y as usize;
            if present.is_set(slot) {
                return Err(ChunkError::DuplicateSection(section.y));
            }
            present.set(slot);
            sections.push(section);
        }

        if sections.is_empty() {
            return Ok(None);
        }

        let heightmap = take_first(&mut map, HEIGHTMAP).unwrap_or_else(empty_compound);
        let tile_entities = take_list(&mut map, TILE_ENTITIES)?;
        let entities = take_list(&mut map, ENTITIES)?;

        Ok(Some(Self {
            coord: ChunkCoord::new(x, z),
            sections,
            heightmap,
            tile_entities,
            entities,
        }))
    }
}

impl ChunkSection {
    /// 没有方块状态时返回 `Ok(None)`，此时不检查其他字段
    fn from_nbt(raw: Value) -> Result<Option<Self>, ChunkError> {
        let mut map = match raw {
            Value::Compound(map) => map,
            _ => return Err(ChunkError::InvalidField("Sections")),
        };

        let Some(block_states) = map.remove(BLOCK_STATES) else {
            return Ok(None);
        };

        let y = match map.remove("Y") {
            Some(value) => as_int(&value).ok_or(ChunkError::InvalidField("Y"))?,
            None => return Err(ChunkError::MissingField("Y")),
        };

        let block_light = take_light(&mut map, BLOCK_LIGHT, y)?;
        let sky_light = take_light(&mut map, SKY_LIGHT, y)?;

        if !(0..SECTION_SLOTS as i64).contains(&y) {
            return Err(ChunkError::SectionOutOfRange(y));
        }

        Ok(Some(Self {
            y: y as u8,
            block_light,
            sky_light,
            block_states,
            biomes: map.remove(BIOMES).unwrap_or_else(empty_compound),
        }))
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Byte(v) => Some(*v as i64),
        Value::Short(v) => Some(*v as i64),
        Value::Int(v) => Some(*v as i64),
        Value::Long(v) => Some(*v),
        _ => None,
    }
}

fn take_first(map: &mut HashMap<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter().find_map(|key| map.remove(*key))
}

fn take_int(map: &mut HashMap<String, Value>, key: &'static str) -> Result<i32, ChunkError> {
    match map.remove(key) {
        Some(Value::Int(v)) => Ok(v),
        Some(_) => Err(ChunkError::InvalidField(key)),
        None => Err(ChunkError::MissingField(key)),
    }
}

fn take_list(map: &mut HashMap<String, Value>, key: &'static str) -> Result<Vec<Value>, ChunkError> {
    match map.remove(key) {
        Some(Value::List(list)) => Ok(list),
        Some(_) => Err(ChunkError::InvalidField(key)),
        None => Ok(Vec::new()),
    }
}

/// 长度为 0 的数组视为不存在
fn take_light(
    map: &mut HashMap<String, Value>,
    key: &'static str,
    y: i64,
) -> Result<Option<Vec<u8>>, ChunkError> {
    match map.remove(key) {
        Some(Value::ByteArray(arr)) => match arr.len() {
            0 => Ok(None),
            LIGHT_ARRAY_LEN => Ok(Some(arr.iter().map(|&b| b as u8).collect())),
            len => Err(ChunkError::InvalidLight { kind: key, y, len }),
        },
        Some(_) => Err(ChunkError::InvalidField(key)),
        None => Ok(None),
    }
}
