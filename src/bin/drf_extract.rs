//! `drf-extract` — Program A: DRF day-file decoder/extractor CLI (§6).

use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Datelike;
use clap::Parser;
use log::warn;

use seismux::drf::{self, EmitterConfig, HeaderStyle, Separator, TimestampStyle};
use seismux::width::Width;

/// Extract a time window from a DRF day-indexed recording and emit text.
#[derive(Parser, Debug)]
#[command(name = "drf-extract", version, about, disable_help_flag = true)]
struct Opt {
    /// Output path; stdout if omitted.
    #[arg(short = 'o')]
    output: Option<PathBuf>,

    /// Downsample factor, 1..1_000_000.
    #[arg(short = 'd', default_value_t = 1)]
    downsample: usize,

    /// Restrict output to one channel, named by its `component` field.
    #[arg(short = 'c')]
    channel: Option<String>,

    /// Main config file (channel table, system number, record dir).
    #[arg(short = 'w', default_value = "winsdr.ini")]
    config_file: PathBuf,

    /// Dump the day-file header and exit.
    #[arg(short = 'h')]
    dump_header: bool,

    /// Full header: include per-channel volts/count.
    #[arg(short = 'f')]
    full_header: bool,

    /// PSN text header; requires `-c`, incompatible with `-t`.
    #[arg(short = 'p')]
    psn_header: bool,

    /// Interpret `start_time` as local time (degrades to UTC; see
    /// `time_fmt::parse_start_time`).
    #[arg(short = 'l')]
    local: bool,

    /// Suppress the header line entirely.
    #[arg(short = 'n')]
    no_header: bool,

    /// Prepend each row with an offset-from-start timestamp.
    #[arg(short = 't')]
    offset_timestamp: bool,

    /// Prepend each row with a unix-epoch timestamp.
    #[arg(short = 'T')]
    epoch_timestamp: bool,

    /// Use a space instead of a comma to separate fields.
    #[arg(short = 's')]
    space_separator: bool,

    /// Override the directory `-w`'s config file is resolved under.
    #[arg(short = 'P')]
    config_root: Option<PathBuf>,

    /// Override the day-file record directory from the config file.
    #[arg(short = 'R')]
    record_root: Option<PathBuf>,

    /// Print version and exit.
    #[arg(short = 'v')]
    version: bool,

    /// `MMDD_HHMM`, `MMDDYY_HHMM`, `MMDD_HHMMSS`, or `MMDDYY_HHMMSS`.
    start_time: Option<String>,

    /// Minutes of data to extract.
    minutes: Option<u32>,
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    stderrlog::new()
        .module(module_path!())
        .module("seismux")
        .quiet(false)
        .verbosity(1)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;

    if opt.version {
        println!("drf-extract {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if opt.psn_header && opt.channel.is_none() {
        bail!("-p requires -c");
    }
    if opt.psn_header && (opt.offset_timestamp || opt.epoch_timestamp) {
        bail!("-p is incompatible with -t/-T");
    }
    if !(1..=1_000_000).contains(&opt.downsample) {
        bail!("-d must be in 1..=1_000_000");
    }

    let config_path = match &opt.config_root {
        Some(root) => root.join(&opt.config_file),
        None => opt.config_file.clone(),
    };
    let cfg = drf::Config::load(&config_path).with_context(|| format!("loading {}", config_path.display()))?;
    let record_dir = opt.record_root.clone().unwrap_or_else(|| cfg.record_dir.clone());

    let start_time = opt.start_time.as_ref().ok_or_else(|| anyhow::anyhow!("start_time is required"))?;
    let reference_year = chrono::Utc::now().year();
    let target = seismux::time_fmt::parse_start_time(start_time, reference_year, opt.local)?;

    let (mut file, block_index) = drf::open_and_seek(&record_dir, cfg.system_number, cfg.num_channels(), target)?;

    if opt.dump_header {
        print_header(&file.header, &cfg, opt.full_header);
        return Ok(());
    }

    let minutes = opt.minutes.ok_or_else(|| anyhow::anyhow!("minutes is required"))?;

    let channel_filter = match &opt.channel {
        Some(name) => Some(
            cfg.channels
                .iter()
                .position(|c| &c.component == name)
                .ok_or_else(|| anyhow::anyhow!("unknown channel {name:?}"))?,
        ),
        None => None,
    };

    let width = file.header.width();
    let sample_rate = file.header.sample_rate;
    let num_channels = cfg.num_channels();

    let block_start = file.header.index[block_index].start_time;
    let skip_secs = (target.timestamp() - block_start).max(0) as usize;
    let skip_samples = skip_secs * sample_rate as usize * num_channels;
    let ticks_needed = minutes as usize * 60 * sample_rate as usize;

    let header_style = if opt.no_header {
        HeaderStyle::None
    } else if opt.psn_header {
        HeaderStyle::Psn
    } else {
        HeaderStyle::Compact { with_volts: opt.full_header }
    };
    let timestamp = if opt.epoch_timestamp {
        TimestampStyle::Epoch
    } else if opt.offset_timestamp {
        TimestampStyle::Offset
    } else {
        TimestampStyle::None
    };
    let separator = if opt.space_separator { Separator::Space } else { Separator::Comma };

    let emitter_cfg = EmitterConfig {
        num_channels,
        sample_rate,
        start_time_secs: target.timestamp() as f64,
        skip_samples,
        samples_to_save: Some(ticks_needed),
        channel_filter,
        downsample: opt.downsample,
        separator,
        timestamp,
        header: header_style,
        channel_names: cfg.channels.iter().map(|c| c.component.clone()).collect(),
        volts_per_count: cfg.channels.iter().map(drf::ChannelConfig::volts_per_count).collect(),
        adc_bits: cfg.channels.first().map_or(24, |c| c.adc_bits),
        gain: cfg.channels.first().map_or(1.0, |c| c.gain),
    };

    let out: Box<dyn Write> = match &opt.output {
        Some(path) => Box::new(BufWriter::new(std::fs::File::create(path)?)),
        None => Box::new(std::io::stdout()),
    };
    let mut emitter = drf::Emitter::new(emitter_cfg, out);

    run_extraction(file, block_index, &record_dir, cfg.system_number, num_channels, width, &mut emitter)?;

    Ok(())
}

fn run_extraction(
    mut current: drf::DrfFile,
    mut block_index: usize,
    record_dir: &std::path::Path,
    system_number: u32,
    num_channels: usize,
    width: Width,
    emitter: &mut drf::Emitter<Box<dyn Write>>,
) -> Result<()> {
    loop {
        if block_index >= current.header.num_blocks as usize {
            let date = seismux::time_fmt::UtcDate::from_unix_secs(current.header.last_block_start_time).next();
            let next_path = drf::day_file_path(record_dir, system_number, date);
            match drf::DrfFile::open(&next_path, num_channels) {
                Ok(next_file) => {
                    current = next_file;
                    block_index = 0;
                    continue;
                }
                Err(_) => break, // missing next-day file at EOF is a clean stop
            }
        }

        let desc = current.header.index[block_index];
        let samples_per_block = current.header.samples_per_block as usize;
        let raw = current.read_block(&desc)?;
        let info_len = seismux::drf::block::BlockInfo::on_disk_len();
        if raw.len() < info_len {
            warn!("short block at index {block_index}, stopping extraction");
            break;
        }
        seismux::drf::block::BlockInfo::parse(&raw)?; // validates the magic

        match seismux::drf::block::decompress(width, &raw[info_len..], samples_per_block) {
            Ok(flat) => emitter.process_flat(&flat)?,
            Err(e) => {
                warn!("decompress error at block {block_index}: {e}, stopping extraction");
                break;
            }
        }

        if emitter.is_stopped() {
            break;
        }
        block_index += 1;
    }
    Ok(())
}

fn print_header(hdr: &drf::DrfHeader, cfg: &drf::Config, full: bool) {
    println!("Sample rate: {}", hdr.sample_rate);
    println!("Samples per block: {}", hdr.samples_per_block);
    println!("Number of channels: {}", hdr.num_channels);
    println!("Number of blocks: {}", hdr.num_blocks);
    println!("Width: {:?}", hdr.width());
    if full {
        for ch in &cfg.channels {
            println!("  {} volts/count: {:e}", ch.component, ch.volts_per_count());
        }
    }
}
