//! The engine facade: one process-wide owner of game state.
//!
//! All mutation funnels through a single `RwLock`; every handler completes
//! its read-modify-write synchronously under the lock (nothing awaits while
//! holding it), so handlers never observe each other's partial updates.
//! Overlapping scheduler ticks are rejected by the explicit [`RoundPhase`]
//! guard. Persistence is handed off as serialized snapshots to the
//! write-coalescing store worker, and side effects fan out on a broadcast
//! channel that must never block resolution.

use crate::auction::{self, LoserRefundPolicy, Settlement};
use crate::export::{self, ExportPayload};
use crate::grumble::{self, DepartureOutcome, RemainderPolicy, Resolution};
use crate::leaderboard::{self, LeaderboardCache, LeaderboardView};
use crate::ledger::Ledger;
use crate::market::{self, DollarUpdate, PackOpenResult};
use crate::reward;
use crate::round::{self, RoundPhase, UserRoundRecord};
use crate::store::{Document, JsonStore, StoreWriter};
use anyhow::Context;
use glyphmine_types::{
    symbol::validate_alphabet, BlockRecord, GameError, GrumbleBet, GrumbleState, Result,
    RoundState, Symbol,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Wall-clock epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Directory holding `state.json`, `balances.json`, and exports.
    pub data_dir: PathBuf,
    /// Scheduler period; bounds worst-case resolution latency.
    pub tick_interval: Duration,
    /// Quiet window for coalescing document writes.
    pub write_debounce: Duration,
    pub remainder_policy: RemainderPolicy,
    pub refund_policy: LoserRefundPolicy,
    /// Capacity of the event broadcast channel.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            tick_interval: Duration::from_secs(1),
            write_debounce: Duration::from_millis(100),
            remainder_policy: RemainderPolicy::default(),
            refund_policy: LoserRefundPolicy::default(),
            event_buffer: 256,
        }
    }
}

/// Side effects committed by the engine, broadcast after the state change
/// has already been applied and queued for persistence. Subscribers render
/// and notify; they can never abort a resolution.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    BlockAdvanced { block: u64, system_choice: Symbol },
    GrumbleResolved(Resolution),
    GrumbleReopened { preserved_pool: u64 },
    AuctionEnded(Settlement),
    AutorunFinished,
}

/// A player's current bets across the main round and the grumble.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBetInfo {
    pub mining_choice: Option<Symbol>,
    pub grumble_bet: Option<GrumbleBet>,
}

/// A player's market view.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub packs: u64,
    pub dollars: u64,
    pub total_claimed_dollars: u64,
    pub claim_limit: u64,
    pub claim_button_disabled: bool,
    pub claim_limit_reached: bool,
}

struct Shared {
    state: RoundState,
    ledger: Ledger,
    leaderboard: LeaderboardCache,
    phase: RoundPhase,
    active: bool,
    autorun_remaining: Option<u64>,
}

pub struct Engine {
    config: EngineConfig,
    shared: RwLock<Shared>,
    writer: Mutex<Option<StoreWriter>>,
    events: broadcast::Sender<EngineEvent>,
    grumble_timer: Mutex<Option<JoinHandle<()>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Load the persisted documents and start the persistence worker.
    ///
    /// The scheduler is not started here; call [`Engine::spawn_ticker`].
    pub fn start(config: EngineConfig) -> anyhow::Result<Arc<Self>> {
        validate_alphabet().map_err(|err| anyhow::anyhow!(err))?;

        let store = JsonStore::new(&config.data_dir).context("open data directory")?;
        let mut state = store.load_state();
        let balances = store.load_balances();
        let now = now_ms();
        state.restore(now);

        info!(
            block = state.current_block,
            accounts = balances.len(),
            history = state.block_history.len(),
            "engine state loaded"
        );

        let writer = StoreWriter::spawn(store, config.write_debounce);
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let engine = Arc::new(Self {
            shared: RwLock::new(Shared {
                state,
                ledger: Ledger::new(balances),
                leaderboard: LeaderboardCache::default(),
                phase: RoundPhase::Open,
                active: true,
                autorun_remaining: None,
            }),
            writer: Mutex::new(Some(writer)),
            events,
            grumble_timer: Mutex::new(None),
            ticker: Mutex::new(None),
            config,
        });

        // A custom grumble countdown from a previous run resumes here.
        let resume_at = {
            let shared = engine.shared.try_read().expect("no other handles yet");
            shared
                .state
                .grumble
                .as_ref()
                .filter(|g| g.is_active)
                .and_then(|g| g.custom_timer_ends_at)
        };
        if let Some(ends_at) = resume_at {
            info!(ends_at, "resuming custom grumble countdown");
            engine.arm_grumble_timer(ends_at);
        }

        Ok(engine)
    }

    /// Subscribe to committed engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            debug!("no event subscribers");
        }
    }

    fn persist(&self, doc: Document, json: String) {
        let writer = self.writer.lock().expect("writer lock poisoned");
        match writer.as_ref() {
            Some(writer) => writer.schedule(doc, json),
            None => warn!(?doc, "engine is shut down, dropping snapshot"),
        }
    }

    fn persist_state(&self, shared: &Shared) {
        match serde_json::to_string(&shared.state) {
            Ok(json) => self.persist(Document::State, json),
            Err(err) => warn!(%err, "failed to serialize state snapshot"),
        }
    }

    fn persist_balances(&self, shared: &Shared) {
        match serde_json::to_string(shared.ledger.balances()) {
            Ok(json) => self.persist(Document::Balances, json),
            Err(err) => warn!(%err, "failed to serialize balances snapshot"),
        }
    }

    fn require_active(shared: &Shared) -> Result<()> {
        if shared.active {
            Ok(())
        } else {
            Err(GameError::Inactive)
        }
    }

    // === Scheduler ===

    /// Run the fixed-period tick until shutdown.
    pub fn spawn_ticker(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let interval = self.config.tick_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                engine.tick(now_ms()).await;
            }
        });
        let mut slot = self.ticker.lock().expect("ticker lock poisoned");
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// One scheduler tick: poll auction expiry, the grumble end condition,
    /// and the block deadline. Returns the events committed by this tick.
    ///
    /// Safe against overlap: a tick that observes a resolution in flight
    /// skips round advancement (logged, never surfaced), and skipped ticks
    /// never lose rounds — the next tick past the deadline resolves.
    pub async fn tick(&self, now: u64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        {
            let mut guard = self.shared.write().await;
            let shared = &mut *guard;

            for id in auction::expired_ids(&shared.state, now) {
                match auction::resolve(
                    &mut shared.state,
                    &mut shared.ledger,
                    &id,
                    self.config.refund_policy,
                ) {
                    Ok(Some(settlement)) => {
                        info!(auction = %id, winners = settlement.winners.len(), "auction expired");
                        events.push(EngineEvent::AuctionEnded(settlement));
                    }
                    Ok(None) => {}
                    Err(err) => warn!(auction = %id, %err, "auction expiry resolution failed"),
                }
            }

            // The custom countdown path; block-based grumbles settle below,
            // with the round's own drawn rune.
            if grumble::using_custom_timer(&shared.state) && grumble::should_resolve(&shared.state, now)
            {
                let choice = reward::draw_system_choice(&mut rand::thread_rng());
                if let Some(resolution) = grumble::resolve(
                    &mut shared.state,
                    &mut shared.ledger,
                    choice,
                    self.config.remainder_policy,
                ) {
                    events.push(EngineEvent::GrumbleResolved(resolution));
                }
            }

            if round::tick_due(&shared.state, now) {
                if shared.phase == RoundPhase::Resolving {
                    debug!("round resolution already in progress, skipping tick");
                } else {
                    shared.phase = RoundPhase::Resolving;
                    let system_choice = reward::draw_system_choice(&mut rand::thread_rng());
                    events.extend(self.resolve_and_advance(shared, system_choice, now));
                    shared.phase = RoundPhase::Open;
                }
            }

            if !events.is_empty() {
                self.persist_state(shared);
                self.persist_balances(shared);
            }
        }

        for event in &events {
            self.emit(event.clone());
        }
        events
    }

    /// Resolve the current round with an explicit drawn rune and advance.
    ///
    /// This is the deterministic entry the scheduler wraps with a random
    /// draw; exposed so operators (and tests) can inject the rune.
    pub async fn advance_round(&self, system_choice: Symbol, now: u64) -> Result<Vec<EngineEvent>> {
        let events = {
            let mut shared = self.shared.write().await;
            if shared.phase == RoundPhase::Resolving {
                return Err(GameError::ResolutionInProgress);
            }
            shared.phase = RoundPhase::Resolving;
            let events = self.resolve_and_advance(&mut shared, system_choice, now);
            shared.phase = RoundPhase::Open;
            self.persist_state(&shared);
            self.persist_balances(&shared);
            events
        };
        for event in &events {
            self.emit(event.clone());
        }
        Ok(events)
    }

    fn resolve_and_advance(
        &self,
        shared: &mut Shared,
        system_choice: Symbol,
        now: u64,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let record = round::resolve_round(
            &mut shared.state,
            &mut shared.ledger,
            &mut rand::thread_rng(),
            system_choice,
            now,
        );
        round::advance_block(&mut shared.state, system_choice, now);
        info!(
            block = shared.state.current_block,
            system_choice = %system_choice,
            participants = record.as_ref().map(|r| r.member_results.len()).unwrap_or(0),
            "block advanced"
        );
        events.push(EngineEvent::BlockAdvanced {
            block: shared.state.current_block,
            system_choice,
        });

        // A block-timed grumble shares the round's drawn rune.
        if !grumble::using_custom_timer(&shared.state) && grumble::should_resolve(&shared.state, now)
        {
            if let Some(resolution) = grumble::resolve(
                &mut shared.state,
                &mut shared.ledger,
                system_choice,
                self.config.remainder_policy,
            ) {
                events.push(EngineEvent::GrumbleResolved(resolution));
            }
        }

        if let Some(remaining) = shared.autorun_remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                shared.autorun_remaining = None;
                events.push(EngineEvent::AutorunFinished);
            }
        }
        events
    }

    // === Round commands ===

    /// Record (or re-record) a player's rune for the current round.
    pub async fn record_choice(&self, user: &str, choice: Symbol) -> Result<()> {
        let mut shared = self.shared.write().await;
        Self::require_active(&shared)?;
        round::record_choice(&mut shared.state, user, choice);
        self.persist_state(&shared);
        Ok(())
    }

    pub async fn set_block_duration(&self, seconds: u64, now: u64) -> Result<()> {
        let mut shared = self.shared.write().await;
        round::set_block_duration(&mut shared.state, seconds, now)?;
        self.persist_state(&shared);
        Ok(())
    }

    pub async fn set_current_block(&self, block: u64) -> Result<()> {
        let mut shared = self.shared.write().await;
        round::set_current_block(&mut shared.state, block)?;
        self.persist_state(&shared);
        Ok(())
    }

    pub async fn set_base_reward(&self, amount: u64) -> Result<()> {
        let mut shared = self.shared.write().await;
        round::set_base_reward(&mut shared.state, amount)?;
        self.persist_state(&shared);
        Ok(())
    }

    pub async fn set_total_rewards(&self, amount: u64) -> Result<()> {
        let mut shared = self.shared.write().await;
        round::set_total_rewards(&mut shared.state, amount)?;
        self.persist_state(&shared);
        Ok(())
    }

    pub async fn reset_balances(&self) {
        let mut shared = self.shared.write().await;
        shared.ledger.reset();
        shared.leaderboard.invalidate();
        self.persist_balances(&shared);
    }

    pub async fn reset_records(&self) {
        let mut shared = self.shared.write().await;
        round::reset_records(&mut shared.state);
        shared.leaderboard.invalidate();
        self.persist_state(&shared);
    }

    pub async fn reset_all(&self, now: u64) {
        let mut shared = self.shared.write().await;
        let Shared { state, ledger, .. } = &mut *shared;
        round::reset_all(state, ledger, now);
        shared.leaderboard.invalidate();
        self.persist_state(&shared);
        self.persist_balances(&shared);
    }

    /// Admin override of a user's GLYPHS balance.
    pub async fn set_balance(&self, user: &str, amount: u64) -> u64 {
        let mut shared = self.shared.write().await;
        let updated = shared.ledger.set(user, amount);
        self.persist_balances(&shared);
        updated
    }

    /// Soft start/stop. The scheduler keeps running; player commands are
    /// gated while stopped.
    pub async fn set_active(&self, active: bool) {
        let mut shared = self.shared.write().await;
        shared.active = active;
        info!(active, "engine activity toggled");
    }

    pub async fn is_active(&self) -> bool {
        self.shared.read().await.active
    }

    /// Arm (or clear) the autorun countdown: after N more blocks the engine
    /// emits [`EngineEvent::AutorunFinished`].
    pub async fn set_autorun(&self, blocks: Option<u64>) {
        let mut shared = self.shared.write().await;
        shared.autorun_remaining = blocks.filter(|b| *b > 0);
    }

    pub async fn autorun_remaining(&self) -> Option<u64> {
        self.shared.read().await.autorun_remaining
    }

    // === Grumble commands ===

    pub async fn grumble_start(&self) -> Result<GrumbleState> {
        let mut shared = self.shared.write().await;
        Self::require_active(&shared)?;
        let grumble = grumble::start(&mut shared.state)?.clone();
        self.persist_state(&shared);
        Ok(grumble)
    }

    pub async fn grumble_join(&self, user: &str, guess: Symbol, amount: u64) -> Result<u64> {
        let mut shared = self.shared.write().await;
        Self::require_active(&shared)?;
        let Shared { state, ledger, .. } = &mut *shared;
        let pool = grumble::join(state, ledger, user, guess, amount)?;
        self.persist_state(&shared);
        self.persist_balances(&shared);
        Ok(pool)
    }

    /// Set or clear the custom countdown and (re)arm its one-shot task.
    pub async fn grumble_set_timer(self: &Arc<Self>, seconds: u64, now: u64) -> Result<Option<u64>> {
        let ends_at = {
            let mut shared = self.shared.write().await;
            let ends_at = grumble::set_timer(&mut shared.state, seconds, now)?;
            self.persist_state(&shared);
            ends_at
        };

        self.clear_grumble_timer();
        if let Some(ends_at) = ends_at {
            self.arm_grumble_timer(ends_at);
        }
        Ok(ends_at)
    }

    pub async fn grumble_restart(&self) -> Result<()> {
        let mut shared = self.shared.write().await;
        grumble::restart(&mut shared.state)?;
        self.persist_state(&shared);
        drop(shared);
        self.clear_grumble_timer();
        Ok(())
    }

    /// Resolve an active grumble immediately with a random draw (used by the
    /// custom countdown task).
    pub async fn resolve_grumble_now(&self) -> Option<Resolution> {
        let resolution = {
            let mut shared = self.shared.write().await;
            let choice = reward::draw_system_choice(&mut rand::thread_rng());
            let Shared { state, ledger, .. } = &mut *shared;
            let resolution = grumble::resolve(state, ledger, choice, self.config.remainder_policy);
            if resolution.is_some() {
                self.persist_state(&shared);
                self.persist_balances(&shared);
            }
            resolution
        };
        if let Some(resolution) = resolution.clone() {
            self.emit(EngineEvent::GrumbleResolved(resolution));
        }
        resolution
    }

    /// Member-removal hook from the platform gateway.
    pub async fn member_departed(&self, user: &str) -> DepartureOutcome {
        let outcome = {
            let mut shared = self.shared.write().await;
            let outcome = grumble::handle_member_departure(&mut shared.state, user);
            if outcome != DepartureOutcome::NoAction {
                self.persist_state(&shared);
            }
            outcome
        };
        if let DepartureOutcome::SessionReopened { preserved_pool } = outcome {
            warn!(user, preserved_pool, "grumble winner departed, session reopened");
            self.clear_grumble_timer();
            self.emit(EngineEvent::GrumbleReopened { preserved_pool });
        }
        outcome
    }

    fn arm_grumble_timer(self: &Arc<Self>, ends_at: u64) {
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let delay = ends_at.saturating_sub(now_ms());
            tokio::time::sleep(Duration::from_millis(delay)).await;
            engine.resolve_grumble_now().await;
        });
        let mut slot = self.grumble_timer.lock().expect("grumble timer lock poisoned");
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    fn clear_grumble_timer(&self) {
        let mut slot = self.grumble_timer.lock().expect("grumble timer lock poisoned");
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    // === Market commands ===

    pub async fn purchase_pack(&self, user: &str) -> Result<u64> {
        let mut shared = self.shared.write().await;
        Self::require_active(&shared)?;
        let Shared { state, ledger, .. } = &mut *shared;
        let packs = market::purchase_pack(&mut state.market, ledger, user)?;
        self.persist_state(&shared);
        self.persist_balances(&shared);
        Ok(packs)
    }

    /// Admin grant of unopened packs.
    pub async fn grant_packs(&self, user: &str, count: u64) -> u64 {
        let mut shared = self.shared.write().await;
        let packs = market::add_packs(&mut shared.state.market, user, count);
        self.persist_state(&shared);
        packs
    }

    pub async fn open_pack(&self, user: &str, roles: &[String]) -> Result<PackOpenResult> {
        let mut shared = self.shared.write().await;
        Self::require_active(&shared)?;
        let Shared { state, ledger, .. } = &mut *shared;
        let result = market::open_pack(
            &mut state.market,
            ledger,
            &mut rand::thread_rng(),
            user,
            roles.iter().map(String::as_str),
        )?;
        self.persist_state(&shared);
        self.persist_balances(&shared);
        Ok(result)
    }

    pub async fn add_dollars(&self, user: &str, amount: u64) -> DollarUpdate {
        let mut shared = self.shared.write().await;
        let update = market::add_dollars(&mut shared.state.market, user, amount);
        self.persist_state(&shared);
        update
    }

    pub async fn claim_dollars(&self, user: &str) -> Result<u64> {
        let mut shared = self.shared.write().await;
        Self::require_active(&shared)?;
        let claimed = market::claim(&mut shared.state.market, user)?;
        self.persist_state(&shared);
        Ok(claimed)
    }

    pub async fn set_claim_limit(&self, limit: u64) {
        let mut shared = self.shared.write().await;
        market::set_claim_limit(&mut shared.state.market, limit);
        self.persist_state(&shared);
    }

    pub async fn reset_claim_counter(&self) {
        let mut shared = self.shared.write().await;
        market::reset_claim_counter(&mut shared.state.market);
        self.persist_state(&shared);
    }

    pub async fn set_claim_enabled(&self, enabled: bool) {
        let mut shared = self.shared.write().await;
        market::set_claim_enabled(&mut shared.state.market, enabled);
        self.persist_state(&shared);
    }

    // === Auction commands ===

    pub async fn auction_create(
        &self,
        description: &str,
        roles_to_tag: Vec<String>,
        end_time: u64,
        number_of_winners: u32,
        now: u64,
    ) -> Result<String> {
        let mut shared = self.shared.write().await;
        let id = auction::create(
            &mut shared.state,
            description,
            roles_to_tag,
            end_time,
            number_of_winners,
            now,
        )?;
        self.persist_state(&shared);
        Ok(id)
    }

    pub async fn auction_bid(
        &self,
        auction_id: &str,
        user: &str,
        amount: u64,
        now: u64,
    ) -> Result<()> {
        let mut shared = self.shared.write().await;
        Self::require_active(&shared)?;
        let Shared { state, ledger, .. } = &mut *shared;
        auction::place_bid(state, ledger, auction_id, user, amount, now)?;
        self.persist_state(&shared);
        self.persist_balances(&shared);
        Ok(())
    }

    /// Force-resolve an auction (expiry is normally discovered by the tick).
    pub async fn auction_resolve(&self, auction_id: &str) -> Result<Option<Settlement>> {
        let settlement = {
            let mut shared = self.shared.write().await;
            let Shared { state, ledger, .. } = &mut *shared;
            let settlement =
                auction::resolve(state, ledger, auction_id, self.config.refund_policy)?;
            if settlement.is_some() {
                self.persist_state(&shared);
                self.persist_balances(&shared);
            }
            settlement
        };
        if let Some(settlement) = settlement.clone() {
            self.emit(EngineEvent::AuctionEnded(settlement));
        }
        Ok(settlement)
    }

    // === Queries ===

    pub async fn time_left_ms(&self, now: u64) -> u64 {
        round::time_left_ms(&self.shared.read().await.state, now)
    }

    pub async fn balance(&self, user: &str) -> u64 {
        self.shared.read().await.ledger.get(user)
    }

    pub async fn last_round_summary(&self) -> Option<BlockRecord> {
        round::last_round_summary(&self.shared.read().await.state).cloned()
    }

    pub async fn user_history(&self, user: &str) -> Vec<UserRoundRecord> {
        round::user_history(&self.shared.read().await.state, user)
    }

    pub async fn grumble_state(&self) -> Option<GrumbleState> {
        self.shared.read().await.state.grumble.clone()
    }

    pub async fn grumble_time_left_ms(&self, now: u64) -> u64 {
        grumble::time_left_ms(&self.shared.read().await.state, now)
    }

    pub async fn user_bet_info(&self, user: &str) -> UserBetInfo {
        let shared = self.shared.read().await;
        UserBetInfo {
            mining_choice: shared.state.current_choices.get(user).copied(),
            grumble_bet: grumble::bet_of(&shared.state, user).cloned(),
        }
    }

    pub async fn market_snapshot(&self, user: &str) -> MarketSnapshot {
        let shared = self.shared.read().await;
        let market = &shared.state.market;
        MarketSnapshot {
            packs: market::pack_count(market, user),
            dollars: market::dollar_balance(market, user),
            total_claimed_dollars: market.total_claimed_dollars,
            claim_limit: market.claim_limit,
            claim_button_disabled: market.claim_button_disabled,
            claim_limit_reached: market::claim_limit_reached(market),
        }
    }

    pub async fn auction_state(&self, auction_id: &str) -> Option<glyphmine_types::AuctionState> {
        auction::get(&self.shared.read().await.state, auction_id).cloned()
    }

    pub async fn active_auctions(&self, now: u64) -> Vec<glyphmine_types::AuctionState> {
        auction::active(&self.shared.read().await.state, now)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Ranked leaderboard view through the keyed cache.
    pub async fn leaderboard(&self, requester: Option<&str>, now: u64) -> LeaderboardView {
        let mut shared = self.shared.write().await;
        let Shared { state, ledger, leaderboard: cache, .. } = &mut *shared;
        let stats = cache.get_or_compute(state, ledger, now);
        leaderboard::view_for(&stats, requester)
    }

    /// Full state snapshot for rendering; a clone, never a live reference.
    pub async fn state_snapshot(&self) -> RoundState {
        self.shared.read().await.state.clone()
    }

    /// Write a full export file and return its path.
    pub async fn export(&self) -> anyhow::Result<(std::path::PathBuf, ExportPayload)> {
        let payload = {
            let mut shared = self.shared.write().await;
            let autorun = shared.autorun_remaining;
            let Shared { state, ledger, leaderboard: cache, .. } = &mut *shared;
            let stats = cache.get_or_compute(state, ledger, now_ms());
            export::build_payload(state, ledger, stats.as_ref().clone(), autorun, chrono::Utc::now())
        };
        let data_dir = self.config.data_dir.clone();
        let path = {
            let payload = payload.clone();
            tokio::task::spawn_blocking(move || export::write_export(&data_dir, &payload))
                .await
                .context("export task panicked")??
        };
        Ok((path, payload))
    }

    // === Lifecycle ===

    /// Force pending document writes to disk.
    pub async fn flush(&self) {
        let writer = {
            let slot = self.writer.lock().expect("writer lock poisoned");
            slot.as_ref().map(|w| w.flush_handle())
        };
        if let Some(flush) = writer {
            flush.await;
        }
    }

    /// Stop timers, flush pending writes, and release the store worker.
    pub async fn shutdown(&self) {
        info!("engine shutting down");
        {
            let mut slot = self.ticker.lock().expect("ticker lock poisoned");
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        self.clear_grumble_timer();

        // Take a final snapshot so nothing mutated since the last debounce
        // window is lost.
        {
            let shared = self.shared.read().await;
            self.persist_state(&shared);
            self.persist_balances(&shared);
        }

        let writer = self.writer.lock().expect("writer lock poisoned").take();
        if let Some(writer) = writer {
            writer.shutdown().await;
        }
    }

    #[cfg(test)]
    pub(crate) async fn force_phase(&self, phase: RoundPhase) {
        self.shared.write().await.phase = phase;
    }
}
