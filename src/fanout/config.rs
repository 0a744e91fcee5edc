//! Fan-out server config (§6): line-oriented key/value, `#` comments,
//! `@file` include. Same minimal-loader posture as [`crate::drf::config`]
//! (§1 scopes INI-style parsing out as an external collaborator).

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::drf::config::ChannelConfig;
use crate::error::{Result, SeismuxError};

/// Fan-out server configuration, assembled from the keys in §6's table.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Identity advertised in ring messages / the wire info line.
    pub module_id: String,
    /// Bind address; empty means any.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Ring-buffer key to attach to.
    pub in_ring: String,
    /// Seconds between heartbeats.
    pub heartbeat_interval: Duration,
    /// Per-channel metadata, in wire order.
    pub channels: Vec<ChannelConfig>,
    /// Nominal samples/sec/channel, advertised in the info line (§4.6 step
    /// 1) until the first ring message's own rate is known.
    pub sample_rate: u16,
    /// Nominal board type, advertised the same way; each `'D'` message
    /// still carries its own `board_type` that actually selects width and
    /// wire flags (§4.4), this is cosmetic only.
    pub board_type: u8,
    /// Socket idle timeout, milliseconds.
    pub socket_timeout_ms: u64,
    /// Seconds with no ring data before considering the source stalled.
    /// Read but, per §9's open question, unused by the multi-subscriber
    /// server.
    pub no_data_wait_secs: u64,
    /// Seconds to wait before restarting after a stall. Same caveat as
    /// `no_data_wait_secs`.
    pub restart_wait_secs: u64,
    /// Verbosity level, 0-3.
    pub debug: u8,
    /// Ack policy hint; read, not interpreted by this crate (no ack
    /// protocol is implemented — the server never parses subscriber
    /// inbound bytes, see §4.6 step 3).
    pub send_ack: u8,
    /// Whether a console status UI is requested (rendering itself is an
    /// external collaborator, §1; this flag just gets read and exposed).
    pub console_display: bool,
    /// Whether SIGINT should request a clean shutdown.
    pub control_c_exit: bool,
    /// Seconds between status-report renders.
    pub refresh_interval: Duration,
    /// Whether to read stdin for interactive status-log reset.
    pub check_stdin: bool,
}

impl ServerConfig {
    /// Load from `path`, following `@file` includes (one level; nested
    /// includes are followed transitively, cycles are not detected since
    /// no source in this pack exercises them).
    pub fn load(path: &Path) -> Result<ServerConfig> {
        let mut lines = Vec::new();
        collect_lines(path, &mut lines)?;
        Self::parse(&lines)
    }

    fn parse(lines: &[String]) -> Result<ServerConfig> {
        let mut module_id = None;
        let mut host = None;
        let mut port = None;
        let mut in_ring = None;
        let mut heartbeat = None;
        let mut channels = Vec::new();
        let mut socket_timeout_ms = 60_000u64;
        let mut no_data_wait_secs = 0u64;
        let mut restart_wait_secs = 0u64;
        let mut debug = 0u8;
        let mut send_ack = 0u8;
        let mut console_display = false;
        let mut control_c_exit = false;
        let mut refresh_secs = 1u64;
        let mut check_stdin = false;
        let mut sample_rate = 0u16;
        let mut board_type = 3u8;

        for (lineno, line) in lines.iter().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                SeismuxError::config(format!("line {}: expected 'key = value'", lineno + 1))
            })?;
            let key = key.trim();
            let value = value.trim();

            if key.eq_ignore_ascii_case("Chan") {
                let fields: Vec<&str> = value.split_whitespace().collect();
                if fields.len() != 6 {
                    return Err(SeismuxError::config(format!(
                        "line {}: Chan needs 6 fields, got {}",
                        lineno + 1,
                        fields.len()
                    )));
                }
                channels.push(ChannelConfig {
                    station: fields[0].to_string(),
                    component: fields[1].to_string(),
                    network: fields[2].to_string(),
                    location: fields[3].to_string(),
                    adc_bits: parse_field(fields[4], lineno, "ADC bits")?,
                    gain: parse_field(fields[5], lineno, "gain")?,
                    adc_volts: 5.0,
                });
                continue;
            }

            match key.to_ascii_lowercase().as_str() {
                "moduleid" => module_id = Some(value.to_string()),
                "host" => host = Some(value.to_string()),
                "port" => port = Some(parse_field(value, lineno, "Port")?),
                "inring" => in_ring = Some(value.to_string()),
                "heartbeatint" => heartbeat = Some(parse_field::<u64>(value, lineno, "HeartbeatInt")?),
                "sockettimeout" => socket_timeout_ms = parse_field(value, lineno, "SocketTimeout")?,
                "nodatawaittime" => no_data_wait_secs = parse_field(value, lineno, "NoDataWaitTime")?,
                "restartwaittime" => restart_wait_secs = parse_field(value, lineno, "RestartWaitTime")?,
                "debug" => debug = parse_field(value, lineno, "Debug")?,
                "sendack" => send_ack = parse_field(value, lineno, "SendAck")?,
                "consoledisplay" => console_display = parse_field::<u8>(value, lineno, "ConsoleDisplay")? != 0,
                "controlcexit" => control_c_exit = parse_field::<u8>(value, lineno, "ControlCExit")? != 0,
                "refreshtime" => refresh_secs = parse_field(value, lineno, "RefreshTime")?,
                "checkstdin" => check_stdin = parse_field::<u8>(value, lineno, "CheckStdin")? != 0,
                "samplerate" => sample_rate = parse_field(value, lineno, "SampleRate")?,
                "boardtype" => board_type = parse_field(value, lineno, "BoardType")?,
                other => {
                    return Err(SeismuxError::config(format!("line {}: unknown key {other:?}", lineno + 1)));
                }
            }
        }

        Ok(ServerConfig {
            module_id: module_id.ok_or_else(|| SeismuxError::config("ModuleId is required"))?,
            host: host.ok_or_else(|| SeismuxError::config("Host is required"))?,
            port: port.ok_or_else(|| SeismuxError::config("Port is required"))?,
            in_ring: in_ring.ok_or_else(|| SeismuxError::config("InRing is required"))?,
            heartbeat_interval: Duration::from_secs(heartbeat.ok_or_else(|| SeismuxError::config("HeartbeatInt is required"))?),
            channels,
            sample_rate,
            board_type,
            socket_timeout_ms,
            no_data_wait_secs,
            restart_wait_secs,
            debug,
            send_ack,
            console_display,
            control_c_exit,
            refresh_interval: Duration::from_secs(refresh_secs),
            check_stdin,
        })
    }
}

fn parse_field<F: std::str::FromStr>(value: &str, lineno: usize, name: &str) -> Result<F> {
    value
        .parse()
        .map_err(|_| SeismuxError::config(format!("line {}: bad {name} value {value:?}", lineno + 1)))
}

fn collect_lines(path: &Path, out: &mut Vec<String>) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| SeismuxError::config(format!("{}: {e}", path.display())))?;
    let base_dir: PathBuf = path.parent().map(Path::to_path_buf).unwrap_or_default();
    for raw in text.lines() {
        let trimmed = raw.trim();
        if let Some(include) = trimmed.strip_prefix('@') {
            collect_lines(&base_dir.join(include.trim()), out)?;
        } else {
            out.push(raw.to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal() {
        let lines: Vec<String> = "\
            ModuleId = srv1\n\
            Host =\n\
            Port = 4000\n\
            InRing = ring1\n\
            HeartbeatInt = 5\n\
            Chan = STA1 CH1 NT 00 24 1.0\n"
            .lines()
            .map(str::to_string)
            .collect();
        let cfg = ServerConfig::parse(&lines).unwrap();
        assert_eq!(cfg.module_id, "srv1");
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.channels.len(), 1);
        assert_eq!(cfg.socket_timeout_ms, 60_000);
        assert_eq!(cfg.sample_rate, 0);
        assert_eq!(cfg.board_type, 3);
    }

    #[test]
    fn parse_honors_sample_rate_and_board_type() {
        let lines: Vec<String> = "\
            ModuleId = srv1\n\
            Host =\n\
            Port = 4000\n\
            InRing = ring1\n\
            HeartbeatInt = 5\n\
            SampleRate = 100\n\
            BoardType = 2\n\
            Chan = STA1 CH1 NT 00 16 1.0\n"
            .lines()
            .map(str::to_string)
            .collect();
        let cfg = ServerConfig::parse(&lines).unwrap();
        assert_eq!(cfg.sample_rate, 100);
        assert_eq!(cfg.board_type, 2);
    }

    #[test]
    fn rejects_unknown_key() {
        let lines: Vec<String> = vec!["Bogus = 1".to_string()];
        assert!(ServerConfig::parse(&lines).is_err());
    }

    #[test]
    fn rejects_missing_required_key() {
        let lines: Vec<String> = vec!["Host = x".to_string()];
        assert!(ServerConfig::parse(&lines).is_err());
    }

    #[test]
    fn includes_are_expanded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("chans.conf"), "Chan = STA1 CH1 NT 00 24 1.0\n").unwrap();
        std::fs::write(
            dir.path().join("main.conf"),
            "ModuleId = srv1\nHost =\nPort = 4000\nInRing = ring1\nHeartbeatInt = 5\n@chans.conf\n",
        )
        .unwrap();
        let cfg = ServerConfig::load(&dir.path().join("main.conf")).unwrap();
        assert_eq!(cfg.channels.len(), 1);
    }
}
