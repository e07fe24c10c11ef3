//! 与 fastnbt 编解码器的边界
//!
//! fastnbt 只能以 Compound 作为根节点。为了把任意类型的值编码为带名字的
//! 独立 NBT 标签，这里把值包进一个只有一个字段的匿名 Compound，再剥掉
//! 外层的头部（`0x0A 0x00 0x00`）和结尾的 End 标记。
//!
//! 编码时 Compound 的字段按名字排序，输出与 HashMap 的迭代顺序无关。

use fastnbt::error::{Error, Result};
use fastnbt::Value;
use serde::de::Error as _;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::io::Read;

/// 外层匿名 Compound 的头部: 类型 10 + 长度为 0 的名字
const WRAPPER_HEAD: [u8; 3] = [0x0A, 0x00, 0x00];
const TAG_END: u8 = 0x00;

/// 按字段名排序序列化的 NBT 值
pub struct Canonical<'a>(pub &'a Value);

impl Serialize for Canonical<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Value::List(items) => serializer.collect_seq(items.iter().map(Canonical)),
            Value::Compound(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
                serializer.collect_map(entries.into_iter().map(|(k, v)| (k, Canonical(v))))
            }
            other => other.serialize(serializer),
        }
    }
}

/// 从数据流解码一个 NBT 根节点
pub fn decode<R: Read>(reader: R) -> Result<Value> {
    fastnbt::from_reader(reader)
}

/// 将值编码为名为 `root_name` 的 NBT 标签
pub fn encode(value: &Value, root_name: &str) -> Result<Vec<u8>> {
    let wrapper: HashMap<&str, Canonical> = HashMap::from([(root_name, Canonical(value))]);
    let bytes = fastnbt::to_bytes(&wrapper)?;

    if bytes.len() < WRAPPER_HEAD.len() + 1 || bytes[..3] != WRAPPER_HEAD {
        return Err(Error::custom("意外的 NBT 包装格式"));
    }
    Ok(bytes[WRAPPER_HEAD.len()..bytes.len() - 1].to_vec())
}

/// 解码 `encode` 生成的标签，返回 (名字, 值)
pub fn decode_named(bytes: &[u8]) -> Result<(String, Value)> {
    let mut wrapped = Vec::with_capacity(bytes.len() + WRAPPER_HEAD.len() + 1);
    wrapped.extend_from_slice(&WRAPPER_HEAD);
    wrapped.extend_from_slice(bytes);
    wrapped.push(TAG_END);

    let map: HashMap<String, Value> = fastnbt::from_bytes(&wrapped)?;
    if map.len() != 1 {
        return Err(Error::custom(format!(
            "期望一个 NBT 标签, 实际 {} 个",
            map.len()
        )));
    }
    map.into_iter()
        .next()
        .ok_or_else(|| Error::custom("缺少 NBT 标签"))
}

/// 空 Compound
pub fn empty_compound() -> Value {
    Value::Compound(HashMap::new())
}
