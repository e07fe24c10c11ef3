//! Anvil 区域文件（.mca）的随机访问读取

use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::{GzDecoder, ZlibDecoder};
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 扇区大小（字节）
pub const SECTOR_SIZE: usize = 4096;

/// 区域边长（区块数）
pub const REGION_WIDTH: usize = 32;

/// 扇区表项数
pub const SECTOR_TABLE_ENTRIES: usize = REGION_WIDTH * REGION_WIDTH;

pub const COMPRESSION_GZIP: u8 = 1;
pub const COMPRESSION_ZLIB: u8 = 2;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("I/O 错误: {0}")]
    Io(#[from] io::Error),
    /// 扇区表中该槽位为空，不属于格式错误
    #[error("区块 ({x}, {z}) 不存在")]
    ChunkNotFound { x: usize, z: usize },
    #[error("无效的区块长度: {0}")]
    InvalidChunkLength(i32),
    #[error("无效的压缩格式: {0}")]
    InvalidCompression(u8),
}

/// 区域文件头部的扇区表，每项为 `offset << 8 | sector_count`
#[derive(Debug, Clone)]
pub struct SectorTable {
    entries: Vec<u32>,
}

impl SectorTable {
    /// 从数据源读取恰好一个扇区并解析
    pub fn read<R: Read>(source: &mut R) -> io::Result<Self> {
        let mut raw = vec![0u8; SECTOR_SIZE];
        source.read_exact(&mut raw)?;

        let mut entries = vec![0u32; SECTOR_TABLE_ENTRIES];
        Cursor::new(raw).read_u32_into::<BigEndian>(&mut entries)?;
        Ok(Self { entries })
    }

    fn index(x: usize, z: usize) -> usize {
        assert!(
            x < REGION_WIDTH && z < REGION_WIDTH,
            "区域内坐标越界: ({}, {})",
            x,
            z
        );
        x + z * REGION_WIDTH
    }

    pub fn entry(&self, x: usize, z: usize) -> u32 {
        self.entries[Self::index(x, z)]
    }

    /// 区块起始扇区，0 表示不存在
    pub fn offset(&self, x: usize, z: usize) -> u32 {
        self.entry(x, z) >> 8
    }

    pub fn sector_count(&self, x: usize, z: usize) -> u8 {
        (self.entry(x, z) & 0xff) as u8
    }
}

/// 延迟解压的区块数据流
pub enum ChunkStream {
    Gzip(GzDecoder<Cursor<Vec<u8>>>),
    Zlib(ZlibDecoder<Cursor<Vec<u8>>>),
}

/// gzip 魔数
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// zlib 头: CM 必须为 8 (deflate)，且 CMF/FLG 组成的 16 位整数能被 31 整除
fn is_zlib_header(payload: &[u8]) -> bool {
    match payload {
        [cmf, flg, ..] => (cmf & 0x0f) == 8 && ((*cmf as u16) << 8 | *flg as u16) % 31 == 0,
        _ => false,
    }
}

impl ChunkStream {
    /// 按压缩标记选择解压方式。
    ///
    /// 立即检查数据头与标记是否一致，解压本身仍是延迟的
    pub fn new(compression: u8, payload: Vec<u8>) -> Result<Self, RegionError> {
        match compression {
            COMPRESSION_GZIP if payload.starts_with(&GZIP_MAGIC) => {
                Ok(Self::Gzip(GzDecoder::new(Cursor::new(payload))))
            }
            COMPRESSION_ZLIB if is_zlib_header(&payload) => {
                Ok(Self::Zlib(ZlibDecoder::new(Cursor::new(payload))))
            }
            other => Err(RegionError::InvalidCompression(other)),
        }
    }

    fn compression(&self) -> u8 {
        match self {
            Self::Gzip(_) => COMPRESSION_GZIP,
            Self::Zlib(_) => COMPRESSION_ZLIB,
        }
    }
}

impl fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkStream")
            .field("compression", &self.compression())
            .finish()
    }
}

impl Read for ChunkStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Gzip(decoder) => decoder.read(buf),
            Self::Zlib(decoder) => decoder.read(buf),
        }
    }
}

/// 单个区域文件的读取器，独占数据源。不支持并发访问
#[derive(Debug)]
pub struct RegionReader<R> {
    source: R,
    table: SectorTable,
    path: Option<PathBuf>,
}

impl RegionReader<File> {
    pub fn open_file(path: &Path) -> Result<Self, RegionError> {
        let file = File::open(path)?;
        let mut reader = Self::open(file)?;
        reader.path = Some(path.to_path_buf());
        Ok(reader)
    }
}

impl<R: Read + Seek> RegionReader<R> {
    /// 读取扇区表，数据源不足一个扇区时返回 I/O 错误
    pub fn open(mut source: R) -> Result<Self, RegionError> {
        source.seek(SeekFrom::Start(0))?;
        let table = SectorTable::read(&mut source)?;
        Ok(Self {
            source,
            table,
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn sector_table(&self) -> &SectorTable {
        &self.table
    }

    pub fn chunk_exists(&self, x: usize, z: usize) -> bool {
        self.table.entry(x, z) != 0
    }

    /// 按 x 优先的顺序列出所有非空槽位
    pub fn occupied_slots(&self) -> Vec<(usize, usize)> {
        (0..REGION_WIDTH)
            .flat_map(|x| (0..REGION_WIDTH).map(move |z| (x, z)))
            .filter(|&(x, z)| self.chunk_exists(x, z))
            .collect()
    }

    /// 读取区域内 (x, z) 处的区块，返回尚未解压的数据流
    pub fn read_chunk(&mut self, x: usize, z: usize) -> Result<ChunkStream, RegionError> {
        let offset = self.table.offset(x, z);
        if offset == 0 {
            return Err(RegionError::ChunkNotFound { x, z });
        }

        self.source
            .seek(SeekFrom::Start(offset as u64 * SECTOR_SIZE as u64))?;

        let mut header = [0u8; 5];
        self.source.read_exact(&mut header)?;
        let mut header = Cursor::new(header);
        let length = header.read_i32::<BigEndian>()?;
        let compression = header.read_u8()?;

        if length < 1 {
            return Err(RegionError::InvalidChunkLength(length));
        }

        // 长度来自文件，用 take 限制读取，避免按声明长度预分配
        let expected = (length - 1) as u64;
        let mut payload = Vec::new();
        (&mut self.source).take(expected).read_to_end(&mut payload)?;
        if (payload.len() as u64) < expected {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("区块数据不完整: 期望 {} 字节, 实际 {}", expected, payload.len()),
            )
            .into());
        }

        ChunkStream::new(compression, payload)
    }
}
