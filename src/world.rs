//! 发现区域文件，并行读取并合并为世界

use crate::chunk::{Chunk, ChunkCoord};
use crate::nbt;
use crate::region::{RegionError, RegionReader};
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

/// 默认的区域文件扩展名
pub const REGION_EXTENSION: &str = "mca";

static REGION_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^r\.(-?\d+)\.(-?\d+)\.\w+$").expect("区域文件名正则无效"));

/// 单个区域文件读取出的区块
pub type RegionChunks = HashMap<ChunkCoord, Chunk>;

/// 读取选项
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// 区域文件扩展名（不含点）
    pub extension: String,
    /// 任一区域文件失败即整体失败
    pub strict: bool,
    /// 并行线程数，`None` 使用 rayon 全局线程池
    pub threads: Option<usize>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            extension: REGION_EXTENSION.to_string(),
            strict: false,
            threads: None,
        }
    }
}

/// 按绝对坐标索引的全部区块，不保证迭代顺序
#[derive(Debug, Default, Clone)]
pub struct World {
    chunks: HashMap<ChunkCoord, Chunk>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入区块，返回被替换的旧区块
    pub fn insert(&mut self, chunk: Chunk) -> Option<Chunk> {
        self.chunks.insert(chunk.coord, chunk)
    }

    pub fn get(&self, coord: &ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(coord)
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl FromIterator<Chunk> for World {
    fn from_iter<I: IntoIterator<Item = Chunk>>(iter: I) -> Self {
        let mut world = World::new();
        for chunk in iter {
            world.insert(chunk);
        }
        world
    }
}

/// 读取失败的区域文件
#[derive(Debug)]
pub struct RegionFailure {
    pub path: PathBuf,
    pub error: anyhow::Error,
}

/// 读取统计，用于区分“目录为空”和“全部失败”
#[derive(Debug, Default)]
pub struct IngestReport {
    pub regions_found: usize,
    pub regions_read: usize,
    pub failures: Vec<RegionFailure>,
    pub chunks: usize,
    /// 被多个区域文件重复声明的坐标（后处理的区域覆盖先处理的）
    pub duplicates: Vec<ChunkCoord>,
}

impl IngestReport {
    pub fn all_failed(&self) -> bool {
        self.regions_found > 0 && self.regions_read == 0
    }
}

#[derive(Debug)]
pub struct Ingested {
    pub world: World,
    pub report: IngestReport,
}

/// 解析区域文件名，返回 (rx, rz)
pub fn parse_region_filename(filename: &str) -> Option<(i32, i32)> {
    let caps = REGION_FILE_RE.captures(filename)?;
    let rx = caps.get(1)?.as_str().parse().ok()?;
    let rz = caps.get(2)?.as_str().parse().ok()?;
    Some((rx, rz))
}

/// 世界目录下有 region 子目录时使用它，否则把输入本身当作区域目录
pub fn resolve_region_dir(root: &Path) -> PathBuf {
    let nested = root.join("region");
    if nested.is_dir() {
        nested
    } else {
        root.to_path_buf()
    }
}

/// 列出目录中的区域文件，按区域坐标和文件名排序，决定合并顺序
pub fn discover_region_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("无法读取目录 {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()));
    select_region_files(entries, extension)
        .with_context(|| format!("无法读取目录项 {}", dir.display()))
}

/// 过滤并排序目录项。任何目录项读取失败都会返回错误，不会静默跳过
fn select_region_files<I>(entries: I, extension: &str) -> io::Result<Vec<PathBuf>>
where
    I: IntoIterator<Item = io::Result<PathBuf>>,
{
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?;
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension) {
            files.push(path);
        }
    }

    files.sort_by_cached_key(|p| {
        let name = p
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        (parse_region_filename(&name), name)
    });
    Ok(files)
}

/// 读取整个世界。单个区域文件失败只记录在报告中，严格模式下才返回错误
pub fn ingest_world(root: &Path, options: &IngestOptions) -> Result<Ingested> {
    let region_dir = resolve_region_dir(root);
    let files = discover_region_files(&region_dir, &options.extension)?;
    info!(
        "发现 {} 个区域文件: {}",
        files.len(),
        region_dir.display()
    );

    let results = match options.threads {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .context("无法创建线程池")?
            .install(|| read_regions(&files)),
        None => read_regions(&files),
    };

    let ingested = merge_regions(files, results);
    if options.strict && !ingested.report.failures.is_empty() {
        let failures = &ingested.report.failures;
        bail!(
            "{} 个区域文件读取失败 (严格模式), 首个: {}: {:#}",
            failures.len(),
            failures[0].path.display(),
            failures[0].error
        );
    }
    Ok(ingested)
}

/// 每个区域文件一个任务；collect 即等待全部完成，结果顺序与输入一致
fn read_regions(files: &[PathBuf]) -> Vec<Result<RegionChunks>> {
    files.par_iter().map(|path| read_region_file(path)).collect()
}

/// 按文件顺序在单线程中合并，重复坐标以后出现的为准
pub fn merge_regions(files: Vec<PathBuf>, results: Vec<Result<RegionChunks>>) -> Ingested {
    let mut report = IngestReport {
        regions_found: files.len(),
        ..Default::default()
    };
    let mut world = World::new();

    for (path, result) in files.into_iter().zip(results) {
        match result {
            Ok(chunks) => {
                report.regions_read += 1;
                debug!("{}: {} 个区块", path.display(), chunks.len());
                for chunk in chunks.into_values() {
                    let coord = chunk.coord;
                    if world.insert(chunk).is_some() {
                        warn!("区块 {} 被多个区域文件声明, 使用 {}", coord, path.display());
                        report.duplicates.push(coord);
                    }
                }
            }
            Err(error) => {
                warn!("跳过区域文件 {}: {:#}", path.display(), error);
                report.failures.push(RegionFailure { path, error });
            }
        }
    }

    report.duplicates.sort_unstable();
    report.chunks = world.len();
    info!("世界中共发现 {} 个区块", world.len());
    Ingested { world, report }
}

/// 读取单个区域文件，文件句柄在返回时释放
pub fn read_region_file(path: &Path) -> Result<RegionChunks> {
    let mut reader = RegionReader::open_file(path)
        .with_context(|| format!("无法打开区域文件 {}", path.display()))?;
    read_region(&mut reader).with_context(|| format!("读取 {} 失败", path.display()))
}

/// 扫描区域内全部 32×32 个槽位。遇到第一个错误即放弃整个区域。
///
/// 读取器带有 `r.X.Z` 形式的文件路径时，会检查区块是否属于该区域
pub fn read_region<R: Read + Seek>(reader: &mut RegionReader<R>) -> Result<RegionChunks> {
    let region = reader
        .path()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .and_then(parse_region_filename);
    let mut chunks = RegionChunks::new();

    for (x, z) in reader.occupied_slots() {
        let stream = match reader.read_chunk(x, z) {
            Ok(stream) => stream,
            Err(RegionError::ChunkNotFound { .. }) => continue,
            Err(e) => return Err(e).with_context(|| format!("无法读取区块 ({}, {})", x, z)),
        };

        let value =
            nbt::decode(stream).with_context(|| format!("无法解析区块 ({}, {})", x, z))?;

        let chunk = match Chunk::from_nbt(value)
            .with_context(|| format!("区块 ({}, {}) 校验失败", x, z))?
        {
            Some(chunk) => chunk,
            None => continue,
        };

        if let Some(expected) = region {
            if chunk.coord.region() != expected {
                warn!(
                    "区块 {} 不属于区域 r.{}.{} (槽位 {}, {})",
                    chunk.coord, expected.0, expected.1, x, z
                );
            }
        }

        chunks.insert(chunk.coord, chunk);
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkSection;
    use crate::nbt::empty_compound;
    use anyhow::anyhow;
    use fastnbt::Value;
    use tempfile::TempDir;

    fn chunk(x: i32, z: i32, tag: i32) -> Chunk {
        Chunk {
            coord: ChunkCoord::new(x, z),
            sections: vec![ChunkSection {
                y: 0,
                block_light: None,
                sky_light: None,
                block_states: Value::Int(tag),
                biomes: empty_compound(),
            }],
            heightmap: empty_compound(),
            tile_entities: vec![],
            entities: vec![],
        }
    }

    fn region_of(chunks: Vec<Chunk>) -> RegionChunks {
        chunks.into_iter().map(|c| (c.coord, c)).collect()
    }

    #[test]
    fn parses_region_filenames() {
        assert_eq!(parse_region_filename("r.0.0.mca"), Some((0, 0)));
        assert_eq!(parse_region_filename("r.-3.12.mca"), Some((-3, 12)));
        assert_eq!(parse_region_filename("r.1.2.mcr"), Some((1, 2)));
        assert_eq!(parse_region_filename("level.dat"), None);
        assert_eq!(parse_region_filename("r.a.0.mca"), None);
    }

    #[test]
    fn discovers_only_region_files_in_order() {
        let dir = TempDir::new().unwrap();
        for name in ["r.1.0.mca", "r.-1.0.mca", "r.0.-2.mca", "notes.txt", "r.0.0.mcr"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("sub.mca")).unwrap();

        let files = discover_region_files(dir.path(), "mca").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["r.-1.0.mca", "r.0.-2.mca", "r.1.0.mca"]);
    }

    #[test]
    fn unreadable_entry_is_an_error() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("r.0.0.mca");
        fs::write(&good, b"").unwrap();

        let entries = vec![
            Ok(good.clone()),
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "拒绝访问")),
        ];
        let error = select_region_files(entries, "mca").unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::PermissionDenied);

        assert_eq!(select_region_files(vec![Ok(good.clone())], "mca").unwrap(), vec![good]);
    }

    #[test]
    fn chunk_outside_named_region_is_kept() {
        use crate::region::{COMPRESSION_ZLIB, SECTOR_SIZE};
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        // r.0.0 中存放了坐标属于 r.1.0 的区块
        let section = Value::Compound(HashMap::from([
            ("Y".to_string(), Value::Byte(0)),
            ("BlockStates".to_string(), Value::Int(1)),
        ]));
        let nbt = fastnbt::to_bytes(&Value::Compound(HashMap::from([
            ("xPos".to_string(), Value::Int(40)),
            ("zPos".to_string(), Value::Int(0)),
            ("Sections".to_string(), Value::List(vec![section])),
        ])))
        .unwrap();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&nbt).unwrap();
        let payload = encoder.finish().unwrap();

        let mut bytes = vec![0u8; SECTOR_SIZE * 2];
        bytes[0..4].copy_from_slice(&((2u32 << 8) | 1).to_be_bytes());
        bytes.extend_from_slice(&((payload.len() + 1) as i32).to_be_bytes());
        bytes.push(COMPRESSION_ZLIB);
        bytes.extend_from_slice(&payload);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0.mca");
        fs::write(&path, bytes).unwrap();

        let reader = RegionReader::open_file(&path).unwrap();
        assert_eq!(reader.path(), Some(path.as_path()));

        let chunks = read_region_file(&path).unwrap();
        assert!(chunks.contains_key(&ChunkCoord::new(40, 0)));
    }

    #[test]
    fn prefers_nested_region_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_region_dir(dir.path()), dir.path());
        fs::create_dir(dir.path().join("region")).unwrap();
        assert_eq!(resolve_region_dir(dir.path()), dir.path().join("region"));
    }

    #[test]
    fn failed_region_is_reported_and_skipped() {
        let files = vec![PathBuf::from("r.0.0.mca"), PathBuf::from("r.1.0.mca")];
        let results = vec![
            Err(anyhow!("损坏")),
            Ok(region_of(vec![chunk(32, 0, 1), chunk(33, 0, 2)])),
        ];
        let ingested = merge_regions(files, results);

        assert_eq!(ingested.world.len(), 2);
        assert_eq!(ingested.report.regions_found, 2);
        assert_eq!(ingested.report.regions_read, 1);
        assert_eq!(ingested.report.failures.len(), 1);
        assert_eq!(ingested.report.failures[0].path, PathBuf::from("r.0.0.mca"));
        assert!(!ingested.report.all_failed());
    }

    #[test]
    fn later_region_wins_on_duplicate() {
        let files = vec![PathBuf::from("a.mca"), PathBuf::from("b.mca")];
        let results = vec![
            Ok(region_of(vec![chunk(5, 5, 1)])),
            Ok(region_of(vec![chunk(5, 5, 2), chunk(6, 5, 3)])),
        ];
        let ingested = merge_regions(files, results);

        let winner = ingested.world.get(&ChunkCoord::new(5, 5)).unwrap();
        assert_eq!(winner.sections[0].block_states, Value::Int(2));
        assert_eq!(ingested.report.duplicates, vec![ChunkCoord::new(5, 5)]);
        assert_eq!(ingested.report.chunks, 2);
    }

    #[test]
    fn empty_and_all_failed_are_distinguishable() {
        let empty = merge_regions(vec![], vec![]);
        assert!(empty.world.is_empty());
        assert!(!empty.report.all_failed());

        let failed = merge_regions(vec![PathBuf::from("r.0.0.mca")], vec![Err(anyhow!("x"))]);
        assert!(failed.world.is_empty());
        assert!(failed.report.all_failed());
    }

    #[test]
    fn world_collects_chunks() {
        let world: World = vec![chunk(0, 0, 0), chunk(1, 0, 0)].into_iter().collect();
        assert_eq!(world.len(), 2);
        assert!(world.get(&ChunkCoord::new(1, 0)).is_some());
        assert!(world.get(&ChunkCoord::new(2, 0)).is_none());
    }
}
