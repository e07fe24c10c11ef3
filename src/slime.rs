//! Slime 世界格式写入
//!
//! 布局（全部大端序）:
//!
//! ```text
//! u16 magic = 0xB10B
//! u8  version = 1
//! 4 × [u32 压缩长度][u32 原始长度][zstd 数据]
//!     区块表 / tiles / entities / extra
//! ```

use crate::chunk::{Chunk, ChunkCoord};
use crate::nbt::{self, Canonical};
use crate::world::World;
use byteorder::{BigEndian, WriteBytesExt};
use fastnbt::Value;
use std::collections::HashMap;
use std::io::{self, Write};
use thiserror::Error;

pub const SLIME_MAGIC: u16 = 0xB10B;
pub const SLIME_VERSION: u8 = 1;

/// zstd 默认压缩等级
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

pub const TILES_KEY: &str = "tiles";
pub const ENTITIES_KEY: &str = "entities";

const LIGHT_ABSENT: u8 = 0;
const LIGHT_PRESENT: u8 = 1;

#[derive(Debug, Error)]
pub enum SlimeError {
    #[error("I/O 错误: {0}")]
    Io(#[from] io::Error),
    #[error("NBT 编解码失败: {0}")]
    Nbt(#[from] fastnbt::error::Error),
    #[error("数据段过大: {0} 字节")]
    SectionTooLarge(usize),
    #[error("无效的文件头: {0:#06x}")]
    BadMagic(u16),
    #[error("不支持的版本: {0}")]
    UnsupportedVersion(u8),
    #[error("解压后大小不符: 期望 {expected}, 实际 {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("无效的光照标记: {0}")]
    InvalidFlag(u8),
    #[error("多余数据: {0} 字节")]
    TrailingData(usize),
    #[error("缺少字段 {0}")]
    MissingField(&'static str),
}

/// 写入选项
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub compression_level: i32,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

/// 区块表排序键
pub fn slime_chunk_key(coord: ChunkCoord) -> i64 {
    coord.z as i64 * 0x7fff_ffff + coord.x as i64
}

/// 按排序键升序排列的区块。合法坐标范围内键不会重复
pub fn sorted_chunks(world: &World) -> Vec<&Chunk> {
    let mut chunks: Vec<&Chunk> = world.chunks().collect();
    chunks.sort_unstable_by_key(|c| slime_chunk_key(c.coord));
    chunks
}

/// 将世界写为 Slime 格式
pub fn encode<W: Write>(world: &World, sink: W, options: &EncodeOptions) -> Result<(), SlimeError> {
    SlimeWriter::new(sink, options)?.write_world(world)
}

/// Slime 写入器。同一个 zstd 压缩器在四个数据段之间复用
pub struct SlimeWriter<W: Write> {
    writer: W,
    compressor: zstd::bulk::Compressor<'static>,
}

impl<W: Write> SlimeWriter<W> {
    pub fn new(writer: W, options: &EncodeOptions) -> Result<Self, SlimeError> {
        let compressor = zstd::bulk::Compressor::new(options.compression_level)?;
        Ok(Self { writer, compressor })
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn write_world(&mut self, world: &World) -> Result<(), SlimeError> {
        let chunks = sorted_chunks(world);

        self.write_header()?;
        self.write_chunks(&chunks)?;
        self.write_pooled(TILES_KEY, chunks.iter().copied().flat_map(|c| &c.tile_entities))?;
        self.write_pooled(ENTITIES_KEY, chunks.iter().copied().flat_map(|c| &c.entities))?;
        self.write_extra()?;
        self.writer.flush()?;
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), SlimeError> {
        self.writer.write_u16::<BigEndian>(SLIME_MAGIC)?;
        self.writer.write_u8(SLIME_VERSION)?;
        Ok(())
    }

    fn write_chunks(&mut self, chunks: &[&Chunk]) -> Result<(), SlimeError> {
        let mut out = Vec::new();
        out.write_u32::<BigEndian>(len_u32(chunks.len())?)?;
        for chunk in chunks {
            write_chunk(&mut out, chunk)?;
        }
        self.write_framed(&out)
    }

    /// 所有区块的条目合并为 `{ key: [...] }`
    fn write_pooled<'a>(
        &mut self,
        key: &str,
        items: impl Iterator<Item = &'a Value>,
    ) -> Result<(), SlimeError> {
        let pooled: HashMap<&str, Vec<Canonical>> =
            HashMap::from([(key, items.map(Canonical).collect())]);
        let body = fastnbt::to_bytes(&pooled)?;
        self.write_framed(&body)
    }

    /// 预留的扩展数据，目前为空 Compound
    fn write_extra(&mut self) -> Result<(), SlimeError> {
        let body = nbt::encode(&nbt::empty_compound(), "")?;
        self.write_framed(&body)
    }

    /// `[u32 压缩长度][u32 原始长度][压缩数据]`
    fn write_framed(&mut self, body: &[u8]) -> Result<(), SlimeError> {
        let uncompressed = len_u32(body.len())?;
        let compressed = self.compressor.compress(body)?;

        self.writer.write_u32::<BigEndian>(len_u32(compressed.len())?)?;
        self.writer.write_u32::<BigEndian>(uncompressed)?;
        self.writer.write_all(&compressed)?;
        Ok(())
    }
}

fn len_u32(len: usize) -> Result<u32, SlimeError> {
    u32::try_from(len).map_err(|_| SlimeError::SectionTooLarge(len))
}

fn write_chunk(out: &mut Vec<u8>, chunk: &Chunk) -> Result<(), SlimeError> {
    out.write_i32::<BigEndian>(chunk.coord.x)?;
    out.write_i32::<BigEndian>(chunk.coord.z)?;
    write_nbt(out, &chunk.heightmap)?;

    out.write_u32::<BigEndian>(len_u32(chunk.sections.len())?)?;
    for section in &chunk.sections {
        write_light(out, section.block_light.as_deref())?;
        write_light(out, section.sky_light.as_deref())?;
        write_nbt(out, &section.block_states)?;
        write_nbt(out, &section.biomes)?;
    }
    Ok(())
}

fn write_light(out: &mut Vec<u8>, light: Option<&[u8]>) -> io::Result<()> {
    match light {
        Some(bytes) => {
            out.write_u8(LIGHT_PRESENT)?;
            out.write_all(bytes)
        }
        None => out.write_u8(LIGHT_ABSENT),
    }
}

/// 带 u32 长度前缀的 NBT 标签
fn write_nbt(out: &mut Vec<u8>, value: &Value) -> Result<(), SlimeError> {
    let bytes = nbt::encode(value, "")?;
    out.write_u32::<BigEndian>(len_u32(bytes.len())?)?;
    out.write_all(&bytes)?;
    Ok(())
}
