//! De-interleaving, filtering, downsampling, and text emission (§4.3).
//!
//! The Emitter walks a decompressed flat (tick, channel) array and applies
//! the priority-ordered pipeline from §4.3: skip → stop → channel filter →
//! downsample → format → header-on-first-sample.

use std::io::Write;

use crate::error::Result;

/// Value separator between fields on a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// `,` (default).
    Comma,
    /// ` ` (`-s`).
    Space,
}

impl Separator {
    fn as_char(self) -> char {
        match self {
            Separator::Comma => ',',
            Separator::Space => ' ',
        }
    }
}

/// How (and whether) to prefix each row with a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampStyle {
    /// No timestamp prefix.
    None,
    /// `-t`: offset seconds from the user-requested start.
    Offset,
    /// `-T`: unix epoch seconds.
    Epoch,
}

/// Header style emitted before the first sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStyle {
    /// `-n`: no header.
    None,
    /// Compact header; `with_volts` adds per-channel volts/count (`-f`).
    Compact { with_volts: bool },
    /// `-p`: PSN ASCII event-file header (requires single-channel mode).
    Psn,
}

/// Everything the Emitter needs that doesn't change while emitting.
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Total channel count in the decompressed stream.
    pub num_channels: usize,
    /// Samples per second per channel.
    pub sample_rate: u32,
    /// Exact user-requested start time, unix seconds (first emitted
    /// sample's timestamp, exactly).
    pub start_time_secs: f64,
    /// Raw (pre-downsample) samples to discard before the first block,
    /// in flat-array units (`skip_seconds * sample_rate * num_channels`,
    /// i.e. one unit per (tick, channel) scalar, not per tick).
    pub skip_samples: usize,
    /// Raw ticks still to consume before stopping, or `None` for
    /// unbounded (caller controls termination by running out of input).
    pub samples_to_save: Option<usize>,
    /// Restrict output to a single channel index, or `None` for all.
    pub channel_filter: Option<usize>,
    /// Downsample factor; `1` disables downsampling.
    pub downsample: usize,
    /// Row field separator.
    pub separator: Separator,
    /// Timestamp prefix style.
    pub timestamp: TimestampStyle,
    /// Header style.
    pub header: HeaderStyle,
    /// Channel names, for header lines; indexed like the raw stream.
    pub channel_names: Vec<String>,
    /// Volts-per-count, for `-f`; same indexing as `channel_names`.
    pub volts_per_count: Vec<f64>,
    /// ADC bits, for the PSN header.
    pub adc_bits: u32,
    /// Analog gain, for the PSN header.
    pub gain: f64,
}

/// Walks decompressed flat sample arrays and writes formatted text.
pub struct Emitter<W: Write> {
    cfg: EmitterConfig,
    out: W,
    sample_delta: f64,
    skip_remaining: usize,
    stopped: bool,
    ticks_remaining: Option<usize>,
    channel_cursor: usize,
    tick_index: u64,
    ds_count: usize,
    ds_sum: Vec<i64>,
    ds_group_start_tick: u64,
    row_values: Vec<i32>,
    header_written: bool,
    saved_rows: usize,
}

impl<W: Write> Emitter<W> {
    /// Create a new emitter. `out` receives the formatted text.
    pub fn new(cfg: EmitterConfig, out: W) -> Self {
        let sample_delta = 1.0 / cfg.sample_rate as f64;
        let skip_remaining = cfg.skip_samples;
        let ticks_remaining = cfg.samples_to_save;
        let num_channels = cfg.num_channels;
        Emitter {
            cfg,
            out,
            sample_delta,
            skip_remaining,
            stopped: false,
            ticks_remaining,
            channel_cursor: 0,
            tick_index: 0,
            ds_count: 0,
            ds_sum: vec![0i64; num_channels],
            ds_group_start_tick: 0,
            row_values: Vec::new(),
            header_written: false,
            saved_rows: 0,
        }
    }

    /// Consume a decompressed, tick-major, channel-interleaved flat array
    /// (the [`crate::drf::block::decompress`] output).
    pub fn process_flat(&mut self, flat: &[i32]) -> Result<()> {
        for &raw in flat {
            if self.stopped {
                break;
            }
            if self.skip_remaining > 0 {
                self.skip_remaining -= 1;
                self.advance_cursor();
                continue;
            }

            let channel = self.channel_cursor;
            let is_last_channel_in_tick = channel + 1 == self.cfg.num_channels;
            self.advance_cursor();

            let wanted = match self.cfg.channel_filter {
                Some(want) => channel == want,
                None => true,
            };
            if wanted {
                if self.ds_count == 0 {
                    self.ds_group_start_tick = self.tick_index;
                }
                self.ds_sum[channel] += raw as i64;
            }

            if is_last_channel_in_tick {
                self.tick_index += 1;
                if wanted || self.cfg.channel_filter.is_none() {
                    self.ds_count += 1;
                }
                if self.ds_count == self.cfg.downsample.max(1) {
                    self.flush_group()?;
                }
                if let Some(n) = self.ticks_remaining.as_mut() {
                    if *n == 0 {
                        self.stopped = true;
                    } else {
                        *n -= 1;
                        if *n == 0 {
                            self.stopped = true;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn advance_cursor(&mut self) {
        self.channel_cursor = (self.channel_cursor + 1) % self.cfg.num_channels;
    }

    fn group_time(&self) -> f64 {
        self.cfg.start_time_secs + (self.ds_group_start_tick as f64) * self.sample_delta
    }

    fn flush_group(&mut self) -> Result<()> {
        let n = self.ds_count as i64;
        let channels: Vec<i32> = match self.cfg.channel_filter {
            Some(ch) => vec![(self.ds_sum[ch] / n) as i32],
            None => self.ds_sum.iter().map(|&s| (s / n) as i32).collect(),
        };
        self.write_row(&channels)?;
        self.ds_count = 0;
        for s in &mut self.ds_sum {
            *s = 0;
        }
        Ok(())
    }

    fn write_row(&mut self, values: &[i32]) -> Result<()> {
        if !self.header_written {
            self.write_header()?;
            self.header_written = true;
        }
        let t = self.group_time();

        if self.cfg.channel_filter.is_some() {
            // Single-channel mode: every value is its own row.
            let mut line = String::new();
            self.push_timestamp(&mut line, t);
            line.push_str(&values[0].to_string());
            line.push('\n');
            self.out.write_all(line.as_bytes())?;
        } else {
            let mut line = String::new();
            self.push_timestamp(&mut line, t);
            let sep = self.cfg.separator.as_char();
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    line.push(sep);
                }
                line.push_str(&v.to_string());
            }
            line.push('\n');
            self.out.write_all(line.as_bytes())?;
        }
        self.saved_rows += 1;
        Ok(())
    }

    fn push_timestamp(&self, line: &mut String, t: f64) {
        match self.cfg.timestamp {
            TimestampStyle::None => {}
            TimestampStyle::Offset => {
                line.push_str(&crate::time_fmt::format_offset(self.cfg.start_time_secs, t));
                line.push(self.cfg.separator.as_char());
            }
            TimestampStyle::Epoch => {
                line.push_str(&crate::time_fmt::format_epoch(t));
                line.push(self.cfg.separator.as_char());
            }
        }
    }

    fn write_header(&mut self) -> Result<()> {
        match self.cfg.header {
            HeaderStyle::None => {}
            HeaderStyle::Compact { with_volts } => {
                let expected = self.ticks_remaining.unwrap_or(0) + /* already consumed none yet */ 0;
                writeln!(
                    self.out,
                    "# Start time: {}",
                    crate::time_fmt::format_header_time(self.cfg.start_time_secs)
                )?;
                writeln!(self.out, "# Sample rate: {}", self.cfg.sample_rate)?;
                writeln!(self.out, "# Number of Channels: {}", self.cfg.num_channels)?;
                if with_volts {
                    for (name, vpc) in self.cfg.channel_names.iter().zip(&self.cfg.volts_per_count) {
                        writeln!(self.out, "# {name} volts/count: {vpc:e}")?;
                    }
                }
                writeln!(self.out, "# Expected samples per channel: {expected}")?;
            }
            HeaderStyle::Psn => {
                let name = self
                    .cfg
                    .channel_filter
                    .and_then(|i| self.cfg.channel_names.get(i))
                    .cloned()
                    .unwrap_or_default();
                writeln!(self.out, "! PSN ASCII Event File Format 2.0")?;
                writeln!(
                    self.out,
                    "! Start time: {}",
                    crate::time_fmt::format_header_time(self.cfg.start_time_secs)
                )?;
                writeln!(self.out, "! Channel: {name}")?;
                writeln!(self.out, "! Number of samples: {}", self.ticks_remaining.unwrap_or(0))?;
                writeln!(self.out, "! SPS: {}", self.cfg.sample_rate)?;
                writeln!(self.out, "! A/D bits: {}", self.cfg.adc_bits)?;
                writeln!(self.out, "! PGA gain: {}", self.cfg.gain)?;
                writeln!(self.out, "Data:")?;
            }
        }
        Ok(())
    }

    /// Number of rows actually written so far.
    #[must_use]
    pub fn saved_rows(&self) -> usize {
        self.saved_rows
    }

    /// Whether the emitter has already satisfied `samples_to_save` and
    /// will discard any further input.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Consume the emitter, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cfg(num_channels: usize, rate: u32) -> EmitterConfig {
        EmitterConfig {
            num_channels,
            sample_rate: rate,
            start_time_secs: 0.0,
            skip_samples: 0,
            samples_to_save: None,
            channel_filter: None,
            downsample: 1,
            separator: Separator::Comma,
            timestamp: TimestampStyle::None,
            header: HeaderStyle::None,
            channel_names: vec!["CH1".into(), "CH2".into(), "CH3".into()],
            volts_per_count: vec![1.0, 1.0, 1.0],
            adc_bits: 24,
            gain: 1.0,
        }
    }

    #[test]
    fn deinterleave_three_channel_two_rate() {
        let cfg = base_cfg(3, 2);
        let mut emitter = Emitter::new(cfg, Vec::new());
        let flat = vec![10, 20, 30, 11, 21, 31]; // c0s0,c1s0,c2s0, c0s1,c1s1,c2s1
        emitter.process_flat(&flat).unwrap();
        let out = String::from_utf8(emitter.into_inner()).unwrap();
        assert_eq!(out, "10,20,30\n11,21,31\n");
    }

    #[test]
    fn downsample_by_three() {
        let mut cfg = base_cfg(1, 1);
        cfg.downsample = 3;
        let mut emitter = Emitter::new(cfg, Vec::new());
        let flat = vec![1, 2, 3, 4, 5, 6, 7, 8, 9];
        emitter.process_flat(&flat).unwrap();
        let out = String::from_utf8(emitter.into_inner()).unwrap();
        assert_eq!(out, "2\n5\n8\n");
    }

    #[test]
    fn skip_discards_leading_samples() {
        let mut cfg = base_cfg(1, 1);
        cfg.skip_samples = 3;
        let mut emitter = Emitter::new(cfg, Vec::new());
        emitter.process_flat(&[1, 2, 3, 4, 5]).unwrap();
        let out = String::from_utf8(emitter.into_inner()).unwrap();
        assert_eq!(out, "4\n5\n");
    }

    #[test]
    fn stop_after_samples_to_save() {
        let mut cfg = base_cfg(1, 1);
        cfg.samples_to_save = Some(2);
        let mut emitter = Emitter::new(cfg, Vec::new());
        emitter.process_flat(&[1, 2, 3, 4, 5]).unwrap();
        let out = String::from_utf8(emitter.into_inner()).unwrap();
        assert_eq!(out, "1\n2\n");
    }

    #[test]
    fn channel_filter_one_row_per_value() {
        let mut cfg = base_cfg(3, 2);
        cfg.channel_filter = Some(1);
        let mut emitter = Emitter::new(cfg, Vec::new());
        emitter.process_flat(&[10, 20, 30, 11, 21, 31]).unwrap();
        let out = String::from_utf8(emitter.into_inner()).unwrap();
        assert_eq!(out, "20\n21\n");
    }

    #[test]
    fn first_sample_timestamp_matches_requested_start_exactly() {
        let mut cfg = base_cfg(1, 10);
        cfg.start_time_secs = 1_700_000_000.25;
        cfg.timestamp = TimestampStyle::Epoch;
        let mut emitter = Emitter::new(cfg, Vec::new());
        emitter.process_flat(&[42]).unwrap();
        let out = String::from_utf8(emitter.into_inner()).unwrap();
        assert_eq!(out, "1700000000.250,42\n");
    }

    #[test]
    fn space_separator() {
        let mut cfg = base_cfg(2, 1);
        cfg.separator = Separator::Space;
        let mut emitter = Emitter::new(cfg, Vec::new());
        emitter.process_flat(&[1, 2]).unwrap();
        let out = String::from_utf8(emitter.into_inner()).unwrap();
        assert_eq!(out, "1 2\n");
    }
}
