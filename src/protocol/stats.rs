//! # Node Statistics
//!
//! Snapshot parsed from `stats` frames. Statistics are pull-based: the
//! dispatcher replaces the node's cached snapshot and emits nothing, and
//! anything interested in load reads `Node::stats()` directly.
//!
//! ## Load Penalty:
//! Each snapshot scores how busy the node is. Lower is better; the node
//! registry uses it to pick where new players should go.
//! - **players**: one point per playing player
//! - **cpu**: `1.05^(100 * systemLoad) * 10 - 10`
//! - **nulled frames**: `2 * ((1.03^(500 * nulled / 3000)) * 300 - 300)`
//! - **deficit frames**: `(1.03^(500 * deficit / 3000)) * 600 - 600`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub free: u64,
    pub used: u64,
    pub allocated: u64,
    pub reservable: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub cores: u32,
    pub system_load: f64,
    pub lavalink_load: f64,
}

/// Audio frame counters over the last minute. Nodes without players omit them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStats {
    pub sent: i64,
    pub nulled: i64,
    pub deficit: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub players: u32,
    pub playing_players: u32,
    /// Node uptime in milliseconds
    pub uptime: u64,
    pub memory: MemoryStats,
    pub cpu: CpuStats,
    #[serde(default)]
    pub frame_stats: Option<FrameStats>,
    /// When this snapshot arrived; not part of the wire format
    #[serde(skip_deserializing, default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

/// Breakdown of a snapshot's load score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Penalty {
    pub players: f64,
    pub cpu: f64,
    pub null_frames: f64,
    pub deficit_frames: f64,
    pub total: f64,
}

impl Stats {
    pub fn penalty(&self) -> Penalty {
        let players = self.playing_players as f64;
        let cpu = 1.05f64.powf(100.0 * self.cpu.system_load) * 10.0 - 10.0;

        let (null_frames, deficit_frames) = match &self.frame_stats {
            Some(frames) => {
                let nulled = (1.03f64.powf(500.0 * (frames.nulled as f64 / 3000.0)) * 300.0 - 300.0) * 2.0;
                let deficit = 1.03f64.powf(500.0 * (frames.deficit as f64 / 3000.0)) * 600.0 - 600.0;
                (nulled, deficit)
            }
            None => (0.0, 0.0),
        };

        Penalty {
            players,
            cpu,
            null_frames,
            deficit_frames,
            total: players + cpu + null_frames + deficit_frames,
        }
    }
}
