//! 将解析后的 Slime 文件转换为 JSON，便于查看

use crate::slime_reader::{SlimeChunk, SlimeFile, SlimeSection};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use fastnbt::Value;
use serde_json::{json, Map, Value as JsonValue};

/// 完整转储，包括每个 section 的光照与 NBT 内容
pub fn slime_to_json(file: &SlimeFile) -> JsonValue {
    json!({
        "version": file.version,
        "chunks": file.chunks.iter().map(chunk_to_json).collect::<Vec<_>>(),
        "tile_entities": file.tile_entities.iter().map(nbt_to_json).collect::<Vec<_>>(),
        "entities": file.entities.iter().map(nbt_to_json).collect::<Vec<_>>(),
        "extra": nbt_to_json(&file.extra),
    })
}

/// 摘要：只有区块坐标与各类数量
pub fn slime_summary(file: &SlimeFile) -> JsonValue {
    let sections: usize = file.chunks.iter().map(|c| c.sections.len()).sum();
    json!({
        "version": file.version,
        "chunks": file.chunks.len(),
        "sections": sections,
        "tile_entities": file.tile_entities.len(),
        "entities": file.entities.len(),
        "coords": file.chunks.iter().map(|c| [c.coord.x, c.coord.z]).collect::<Vec<_>>(),
    })
}

fn chunk_to_json(chunk: &SlimeChunk) -> JsonValue {
    json!({
        "x": chunk.coord.x,
        "z": chunk.coord.z,
        "heightmap": nbt_to_json(&chunk.heightmap),
        "sections": chunk.sections.iter().map(section_to_json).collect::<Vec<_>>(),
    })
}

fn section_to_json(section: &SlimeSection) -> JsonValue {
    json!({
        "block_light": section.block_light.as_deref().map(|b| BASE64.encode(b)),
        "sky_light": section.sky_light.as_deref().map(|b| BASE64.encode(b)),
        "block_states": nbt_to_json(&section.block_states),
        "biomes": nbt_to_json(&section.biomes),
    })
}

/// NBT 值转 JSON。数值数组保持为 JSON 数组，字节数组用 base64
pub fn nbt_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Byte(v) => json!(v),
        Value::Short(v) => json!(v),
        Value::Int(v) => json!(v),
        Value::Long(v) => json!(v),
        Value::Float(v) => json!(v),
        Value::Double(v) => json!(v),
        Value::String(s) => json!(s),
        Value::ByteArray(arr) => {
            let bytes: Vec<u8> = arr.iter().map(|&b| b as u8).collect();
            json!(BASE64.encode(bytes))
        }
        Value::IntArray(arr) => json!(arr.iter().collect::<Vec<_>>()),
        Value::LongArray(arr) => json!(arr.iter().collect::<Vec<_>>()),
        Value::List(list) => JsonValue::Array(list.iter().map(nbt_to_json).collect()),
        Value::Compound(map) => {
            let obj: Map<String, JsonValue> = map
                .iter()
                .map(|(k, v)| (k.clone(), nbt_to_json(v)))
                .collect();
            JsonValue::Object(obj)
        }
    }
}
