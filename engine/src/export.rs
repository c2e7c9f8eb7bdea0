//! Full-state JSON export for off-system analysis.
//!
//! Snapshots everything an operator needs to audit the game: configuration,
//! aggregate totals, raw balances and choices, the whole state document, the
//! computed leaderboard, and the market slices. Files land under
//! `<data>/exports/` with a timestamped name.

use crate::leaderboard::UserStats;
use crate::ledger::Ledger;
use crate::round::time_left_ms;
use glyphmine_types::{Balances, RoundState, Symbol, UserId};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub current_block: u64,
    pub total_rewards_per_block: u64,
    pub base_reward: u64,
    pub block_duration_sec: u64,
    pub next_block_at: u64,
    pub time_left_ms: u64,
    pub last_system_choice: Option<Symbol>,
    pub autorun_remaining_blocks: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub total_accounts: usize,
    pub total_glyphs: u64,
    pub total_block_history_entries: usize,
    pub total_leaderboard_entries: usize,
    pub total_packs: u64,
    pub total_dollar_balance: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub generated_at: String,
    pub metadata: ExportMetadata,
    pub summary: ExportSummary,
    pub balances: Balances,
    pub current_choices: BTreeMap<UserId, Symbol>,
    pub state: RoundState,
    pub leaderboard: Vec<UserStats>,
}

/// Assemble the export payload from a consistent snapshot.
pub fn build_payload(
    state: &RoundState,
    ledger: &Ledger,
    leaderboard: Vec<UserStats>,
    autorun_remaining_blocks: Option<u64>,
    now: DateTime<Utc>,
) -> ExportPayload {
    let now_ms = now.timestamp_millis().max(0) as u64;
    let total_packs = state.market.packs.values().fold(0u64, |acc, v| acc.saturating_add(*v));
    let total_dollar_balance = state
        .market
        .dollars
        .values()
        .fold(0u64, |acc, v| acc.saturating_add(*v));

    ExportPayload {
        generated_at: now.to_rfc3339(),
        metadata: ExportMetadata {
            current_block: state.current_block,
            total_rewards_per_block: state.total_rewards_per_block,
            base_reward: state.base_reward,
            block_duration_sec: state.block_duration_sec,
            next_block_at: state.next_block_at,
            time_left_ms: time_left_ms(state, now_ms),
            last_system_choice: state.last_system_choice,
            autorun_remaining_blocks,
        },
        summary: ExportSummary {
            total_accounts: ledger.accounts(),
            total_glyphs: ledger.total(),
            total_block_history_entries: state.block_history.len(),
            total_leaderboard_entries: leaderboard.len(),
            total_packs,
            total_dollar_balance,
        },
        balances: ledger.balances().clone(),
        current_choices: state.current_choices.clone(),
        state: state.clone(),
        leaderboard,
    }
}

/// Write a payload under `<data_dir>/exports/`, returning the file path.
pub fn write_export(data_dir: &Path, payload: &ExportPayload) -> anyhow::Result<PathBuf> {
    let export_dir = data_dir.join("exports");
    std::fs::create_dir_all(&export_dir).context("create export directory")?;

    let timestamp: DateTime<Utc> = payload
        .generated_at
        .parse()
        .unwrap_or_else(|_| Utc::now());
    let file_name = format!(
        "glyphs-export-{}.json",
        timestamp.format("%Y-%m-%dT%H-%M-%S")
    );
    let path = export_dir.join(file_name);

    let json = serde_json::to_string_pretty(payload).context("serialize export payload")?;
    std::fs::write(&path, json).context("write export file")?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::compute_stats;
    use chrono::TimeZone;

    #[test]
    fn test_payload_totals() {
        let mut state = RoundState::default();
        state.current_block = 4;
        state.next_block_at = 10_000;
        state.market.packs.insert("alice".into(), 2);
        state.market.packs.insert("bob".into(), 1);
        state.market.dollars.insert("alice".into(), 7);

        let mut ledger = Ledger::default();
        ledger.set("alice", 100);
        ledger.set("bob", 200);

        let now = Utc.timestamp_millis_opt(4_000).unwrap();
        let stats = compute_stats(&state, &ledger);
        let payload = build_payload(&state, &ledger, stats, Some(3), now);

        assert_eq!(payload.metadata.current_block, 4);
        assert_eq!(payload.metadata.time_left_ms, 6_000);
        assert_eq!(payload.metadata.autorun_remaining_blocks, Some(3));
        assert_eq!(payload.summary.total_accounts, 2);
        assert_eq!(payload.summary.total_glyphs, 300);
        assert_eq!(payload.summary.total_packs, 3);
        assert_eq!(payload.summary.total_dollar_balance, 7);
        assert_eq!(payload.summary.total_leaderboard_entries, 2);
    }

    #[test]
    fn test_write_export_creates_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = RoundState::default();
        let ledger = Ledger::default();
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 12, 30, 45).unwrap();
        let payload = build_payload(&state, &ledger, vec![], None, now);

        let path = write_export(dir.path(), &payload).unwrap();
        assert!(path.ends_with("exports/glyphs-export-2025-03-09T12-30-45.json"));

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["metadata"]["currentBlock"], 1);
    }
}
