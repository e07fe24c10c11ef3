//! Minecraft Anvil 世界转换工具
//!
//! 读取 Anvil 区域文件（.mca），合并全部区块后写为单文件的 Slime 格式

pub mod bitset;
pub mod chunk;
pub mod config;
pub mod dump;
pub mod nbt;
pub mod region;
pub mod slime;
pub mod slime_reader;
pub mod world;

pub use bitset::BitSet16;
pub use chunk::{Chunk, ChunkCoord, ChunkError, ChunkSection};
pub use config::Config;
pub use dump::{slime_summary, slime_to_json};
pub use region::{ChunkStream, RegionError, RegionReader, SectorTable};
pub use slime::{encode, EncodeOptions, SlimeError, SlimeWriter};
pub use slime_reader::{read_slime, SlimeFile};
pub use world::{ingest_world, IngestOptions, IngestReport, Ingested, World};
