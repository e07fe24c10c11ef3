//! 测试用区域文件构造
#![allow(dead_code)]

use fastnbt::{ByteArray, IntArray, LongArray, Value};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

pub const SECTOR_SIZE: usize = 4096;
pub const LIGHT: usize = 2048;

/// 区域内的一个区块槽位
pub struct Slot {
    pub x: usize,
    pub z: usize,
    /// 写入记录头的压缩标记
    pub compression: u8,
    /// 实际使用的压缩方式，通常与标记一致
    pub encoding: u8,
    /// 未压缩的 NBT 字节
    pub nbt: Vec<u8>,
}

impl Slot {
    pub fn zlib(x: usize, z: usize, chunk: &Value) -> Self {
        Self {
            x,
            z,
            compression: 2,
            encoding: 2,
            nbt: fastnbt::to_bytes(chunk).unwrap(),
        }
    }

    pub fn gzip(x: usize, z: usize, chunk: &Value) -> Self {
        Self {
            compression: 1,
            encoding: 1,
            ..Self::zlib(x, z, chunk)
        }
    }
}

fn compress(compression: u8, data: &[u8]) -> Vec<u8> {
    match compression {
        1 => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        _ => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
    }
}

/// 写入区域文件: 位置表 + 时间戳表 + 按扇区对齐的区块数据
pub fn write_region(path: &Path, slots: &[Slot]) {
    let mut locations = vec![0u8; SECTOR_SIZE];
    let timestamps = vec![0u8; SECTOR_SIZE];
    let mut body = Vec::new();
    let mut current_sector = 2u32;

    for slot in slots {
        let compressed = compress(slot.encoding, &slot.nbt);
        let mut record = Vec::new();
        record.extend_from_slice(&((compressed.len() + 1) as u32).to_be_bytes());
        record.push(slot.compression);
        record.extend_from_slice(&compressed);
        let sector_count = (record.len() + SECTOR_SIZE - 1) / SECTOR_SIZE;
        record.resize(sector_count * SECTOR_SIZE, 0);

        let idx = (slot.x + slot.z * 32) * 4;
        let entry = (current_sector << 8) | sector_count as u32;
        locations[idx..idx + 4].copy_from_slice(&entry.to_be_bytes());

        body.extend_from_slice(&record);
        current_sector += sector_count as u32;
    }

    let mut out = locations;
    out.extend_from_slice(&timestamps);
    out.extend_from_slice(&body);
    fs::write(path, out).unwrap();
}

pub fn compound(entries: Vec<(&str, Value)>) -> Value {
    Value::Compound(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<HashMap<_, _>>(),
    )
}

pub fn light(len: usize, fill: i8) -> Value {
    Value::ByteArray(ByteArray::new(vec![fill; len]))
}

/// section 描述
pub struct SectionSpec {
    pub y: i8,
    pub states: bool,
    pub block_light: Option<usize>,
    pub sky_light: Option<usize>,
}

impl SectionSpec {
    pub fn new(y: i8) -> Self {
        Self {
            y,
            states: true,
            block_light: None,
            sky_light: None,
        }
    }

    pub fn without_states(mut self) -> Self {
        self.states = false;
        self
    }

    pub fn block_light(mut self, len: usize) -> Self {
        self.block_light = Some(len);
        self
    }

    pub fn sky_light(mut self, len: usize) -> Self {
        self.sky_light = Some(len);
        self
    }

    pub fn to_nbt(&self) -> Value {
        let mut entries = vec![("Y", Value::Byte(self.y))];
        if self.states {
            entries.push((
                "BlockStates",
                Value::LongArray(LongArray::new(vec![self.y as i64 + 1; 8])),
            ));
        }
        if let Some(len) = self.block_light {
            entries.push(("BlockLight", light(len, 0x0F)));
        }
        if let Some(len) = self.sky_light {
            entries.push(("SkyLight", light(len, 0x7F)));
        }
        compound(entries)
    }
}

/// 旧版（Level 包装）区块
pub fn chunk_nbt(x: i32, z: i32, sections: &[SectionSpec]) -> Value {
    let level = compound(vec![
        ("xPos", Value::Int(x)),
        ("zPos", Value::Int(z)),
        ("Sections", Value::List(sections.iter().map(SectionSpec::to_nbt).collect())),
        ("HeightMap", Value::IntArray(IntArray::new(vec![x * 100 + z; 256]))),
        (
            "TileEntities",
            Value::List(vec![compound(vec![
                ("id", Value::String("minecraft:chest".into())),
                ("x", Value::Int(x * 16)),
                ("z", Value::Int(z * 16)),
            ])]),
        ),
        (
            "Entities",
            Value::List(vec![compound(vec![("id", Value::String("minecraft:pig".into()))])]),
        ),
    ]);
    compound(vec![("DataVersion", Value::Int(1976)), ("Level", level)])
}
