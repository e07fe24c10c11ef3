//! Minecraft Anvil 世界转换为 Slime 格式

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use slimeconv::{
    encode, ingest_world, read_slime, slime_summary, slime_to_json, Config, IngestReport,
};

/// Minecraft Anvil 世界转换为 Slime 格式
#[derive(Parser)]
#[command(name = "slimeconv", version, about)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 转换世界为 Slime 文件
    Convert {
        /// 世界文件夹或 region 文件夹
        world: PathBuf,
        /// 输出文件路径
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 覆盖已存在的输出文件
        #[arg(long, visible_alias = "override")]
        overwrite: bool,
        /// 任一区域文件失败即中止
        #[arg(long)]
        strict: bool,
        /// 并行线程数
        #[arg(long)]
        threads: Option<usize>,
        /// zstd 压缩等级
        #[arg(long)]
        level: Option<i32>,
    },
    /// 查看 Slime 文件内容
    Inspect {
        /// Slime 文件路径
        file: PathBuf,
        /// 输出完整 JSON（包含光照与 NBT）
        #[arg(long)]
        json: bool,
    },
    /// 生成默认配置文件
    Config {
        /// 输出路径（默认: slimeconv.toml）
        #[arg(short, long, default_value = "slimeconv.toml")]
        output: PathBuf,
        /// 覆盖已存在的文件
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(default)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load_from_file(&path),
        None => Ok(Config::load()),
    }
}

fn default_output(world: &Path) -> PathBuf {
    let name = world
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "world".to_string());
    world.with_file_name(format!("{}.slime", name))
}

fn print_report(report: &IngestReport) {
    println!(
        "区域文件: 发现 {}, 成功 {}, 失败 {}",
        report.regions_found,
        report.regions_read,
        report.failures.len()
    );
    for failure in &report.failures {
        println!("  失败 {}: {:#}", failure.path.display(), failure.error);
    }
    if !report.duplicates.is_empty() {
        println!("重复坐标: {} 个", report.duplicates.len());
    }
    println!("区块: {}", report.chunks);
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Convert {
            world,
            output,
            overwrite,
            strict,
            threads,
            level,
        } => {
            let output_path = output.unwrap_or_else(|| default_output(&world));
            if output_path.exists() && !overwrite {
                anyhow::bail!("输出文件已存在: {:?}\n使用 --overwrite 覆盖", output_path);
            }

            // 命令行参数优先于配置
            let mut ingest = config.ingest.to_options();
            ingest.strict |= strict;
            if let Some(threads) = threads {
                ingest.threads = Some(threads);
            }
            let mut encode_options = config.output.to_options();
            if let Some(level) = level {
                encode_options.compression_level = level;
            }

            println!("转换世界: {:?}", world);
            println!("输出文件: {:?}", output_path);
            println!();

            let start = Instant::now();
            let ingested = ingest_world(&world, &ingest)?;
            print_report(&ingested.report);
            if ingested.report.all_failed() {
                log::warn!("所有区域文件都读取失败, 输出将不包含任何区块");
            }

            let file = File::create(&output_path)
                .with_context(|| format!("无法创建输出文件 {}", output_path.display()))?;
            let written = encode(&ingested.world, BufWriter::new(file), &encode_options);
            if let Err(e) = written {
                // 输出格式无法部分恢复，删除不完整的文件
                let _ = fs::remove_file(&output_path);
                return Err(e).context("写入 Slime 文件失败");
            }

            println!("\n耗时: {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Inspect { file, json } => {
            let reader = BufReader::new(
                File::open(&file).with_context(|| format!("无法打开 {}", file.display()))?,
            );
            let slime = read_slime(reader).with_context(|| format!("无法解析 {}", file.display()))?;
            let output = if json {
                slime_to_json(&slime)
            } else {
                slime_summary(&slime)
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Config { output, force } => {
            if output.exists() && !force {
                anyhow::bail!("文件已存在: {:?}\n使用 --force 覆盖", output);
            }

            Config::default().save_to_file(&output)?;
            println!("已生成配置文件: {:?}\n", output);
            print!("{}", Config::default_toml());
        }
    }

    Ok(())
}
