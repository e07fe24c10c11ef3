//! Slime 世界格式读取，用于校验与查看转换结果

use crate::chunk::{ChunkCoord, LIGHT_ARRAY_LEN};
use crate::nbt;
use crate::slime::{SlimeError, ENTITIES_KEY, SLIME_MAGIC, SLIME_VERSION, TILES_KEY};
use byteorder::{BigEndian, ReadBytesExt};
use fastnbt::Value;
use std::collections::HashMap;
use std::io::{self, Cursor, Read};

#[derive(Debug, Clone, PartialEq)]
pub struct SlimeSection {
    pub block_light: Option<Vec<u8>>,
    pub sky_light: Option<Vec<u8>>,
    pub block_states: Value,
    pub biomes: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlimeChunk {
    pub coord: ChunkCoord,
    pub heightmap: Value,
    pub sections: Vec<SlimeSection>,
}

/// 解析后的 Slime 文件
#[derive(Debug, Clone, PartialEq)]
pub struct SlimeFile {
    pub version: u8,
    pub chunks: Vec<SlimeChunk>,
    pub tile_entities: Vec<Value>,
    pub entities: Vec<Value>,
    pub extra: Value,
}

/// 读取完整的 Slime 数据流，末尾不允许有多余数据
pub fn read_slime<R: Read>(mut source: R) -> Result<SlimeFile, SlimeError> {
    let magic = source.read_u16::<BigEndian>()?;
    if magic != SLIME_MAGIC {
        return Err(SlimeError::BadMagic(magic));
    }
    let version = source.read_u8()?;
    if version != SLIME_VERSION {
        return Err(SlimeError::UnsupportedVersion(version));
    }

    let chunk_table = read_framed(&mut source)?;
    let tiles = read_framed(&mut source)?;
    let entities = read_framed(&mut source)?;
    let extra = read_framed(&mut source)?;

    let mut rest = Vec::new();
    source.read_to_end(&mut rest)?;
    if !rest.is_empty() {
        return Err(SlimeError::TrailingData(rest.len()));
    }

    Ok(SlimeFile {
        version,
        chunks: parse_chunk_table(&chunk_table)?,
        tile_entities: parse_pooled(&tiles, TILES_KEY)?,
        entities: parse_pooled(&entities, ENTITIES_KEY)?,
        extra: fastnbt::from_bytes(&extra)?,
    })
}

fn read_framed<R: Read>(source: &mut R) -> Result<Vec<u8>, SlimeError> {
    let compressed_len = source.read_u32::<BigEndian>()? as usize;
    let uncompressed_len = source.read_u32::<BigEndian>()? as usize;

    let compressed = read_exactly(source, compressed_len)?;
    // 声明的原始长度同样来自文件，流式解压并最多多读一个字节用于判断超长
    let mut body = Vec::new();
    zstd::stream::read::Decoder::with_buffer(compressed.as_slice())?
        .take(uncompressed_len as u64 + 1)
        .read_to_end(&mut body)?;
    if body.len() != uncompressed_len {
        return Err(SlimeError::SizeMismatch {
            expected: uncompressed_len,
            actual: body.len(),
        });
    }
    Ok(body)
}

/// 长度来自文件，不按声明长度预分配
fn read_exactly<R: Read>(source: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    source.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("期望 {} 字节, 实际 {}", len, buf.len()),
        ));
    }
    Ok(buf)
}

fn parse_chunk_table(body: &[u8]) -> Result<Vec<SlimeChunk>, SlimeError> {
    let mut cursor = Cursor::new(body);
    let count = cursor.read_u32::<BigEndian>()?;

    let mut chunks = Vec::new();
    for _ in 0..count {
        let x = cursor.read_i32::<BigEndian>()?;
        let z = cursor.read_i32::<BigEndian>()?;
        let heightmap = read_nbt(&mut cursor)?;

        let section_count = cursor.read_u32::<BigEndian>()?;
        let mut sections = Vec::new();
        for _ in 0..section_count {
            sections.push(SlimeSection {
                block_light: read_light(&mut cursor)?,
                sky_light: read_light(&mut cursor)?,
                block_states: read_nbt(&mut cursor)?,
                biomes: read_nbt(&mut cursor)?,
            });
        }

        chunks.push(SlimeChunk {
            coord: ChunkCoord::new(x, z),
            heightmap,
            sections,
        });
    }

    let remaining = body.len() - cursor.position() as usize;
    if remaining != 0 {
        return Err(SlimeError::TrailingData(remaining));
    }
    Ok(chunks)
}

fn read_light(cursor: &mut Cursor<&[u8]>) -> Result<Option<Vec<u8>>, SlimeError> {
    match cursor.read_u8()? {
        0 => Ok(None),
        1 => {
            let mut light = vec![0u8; LIGHT_ARRAY_LEN];
            cursor.read_exact(&mut light)?;
            Ok(Some(light))
        }
        flag => Err(SlimeError::InvalidFlag(flag)),
    }
}

fn read_nbt(cursor: &mut Cursor<&[u8]>) -> Result<Value, SlimeError> {
    let len = cursor.read_u32::<BigEndian>()? as usize;
    let bytes = read_exactly(cursor, len)?;
    let (_, value) = nbt::decode_named(&bytes)?;
    Ok(value)
}

fn parse_pooled(body: &[u8], key: &'static str) -> Result<Vec<Value>, SlimeError> {
    let mut root: HashMap<String, Value> = fastnbt::from_bytes(body)?;
    match root.remove(key) {
        Some(Value::List(items)) => Ok(items),
        _ => Err(SlimeError::MissingField(key)),
    }
}
