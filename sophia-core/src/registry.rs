//! Player registry: creation, lookup and transactional updates.
//!
//! Every mutating engine operation runs inside a [`PlayerTransaction`]: the
//! per-player lock is taken with a bounded wait, a working copy is loaded,
//! and nothing reaches the store until [`PlayerTransaction::commit`].
//! Dropping an uncommitted transaction discards the working copy.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use tracing::{debug, info};

use crate::config::{PlayerConfig, ProgressionConfig, SophiaConfig};
use crate::content::{ContentLibrary, Fallacy};
use crate::error::{Result, SophiaError};
use crate::persistence::PlayerStore;
use crate::player::PlayerState;
use crate::types::{Alignment, PlayerId};

/// Owns every [`PlayerState`] and serializes writes per player.
#[derive(Debug)]
pub struct PlayerRegistry {
    store: Arc<dyn PlayerStore>,
    locks: DashMap<PlayerId, Arc<Mutex<()>>>,
    player_config: PlayerConfig,
    progression: ProgressionConfig,
    lock_timeout: Duration,
    starting_loadout: Vec<Fallacy>,
}

impl PlayerRegistry {
    /// Build a registry over `store`, resolving the starting loadout.
    ///
    /// # Errors
    /// `SophiaError::Config` if a starting fallacy is not in the content.
    pub fn new(
        store: Arc<dyn PlayerStore>,
        config: &SophiaConfig,
        content: &ContentLibrary,
    ) -> Result<Self> {
        let starting_loadout = config
            .player
            .starting_fallacies
            .iter()
            .map(|id| {
                content.fallacy(id).cloned().map_err(|_| {
                    SophiaError::Config(format!("starting fallacy {id} is not defined"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            store,
            locks: DashMap::new(),
            player_config: config.player.clone(),
            progression: config.progression.clone(),
            lock_timeout: Duration::from_millis(config.concurrency.lock_timeout_ms),
            starting_loadout,
        })
    }

    /// Player defaults and capacities.
    #[must_use]
    pub fn player_config(&self) -> &PlayerConfig {
        &self.player_config
    }

    /// Level thresholds.
    #[must_use]
    pub fn progression(&self) -> &ProgressionConfig {
        &self.progression
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn PlayerStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Create, persist and return a fresh character.
    ///
    /// # Errors
    /// `SophiaError::Validation` for a blank name; store failures otherwise.
    pub fn create_player(&self, name: &str, alignment: Alignment) -> Result<PlayerState> {
        let player = PlayerState::new(
            name,
            alignment,
            &self.player_config,
            &self.progression,
            self.starting_loadout.clone(),
        )?;
        self.store.save(&player)?;
        info!(player = %player.id, name = %player.name, %alignment, "Player created");
        Ok(player)
    }

    /// Fetch the stored state.
    ///
    /// # Errors
    /// `SophiaError::NotFound` for unknown ids.
    pub fn get_player(&self, id: &PlayerId) -> Result<PlayerState> {
        self.store
            .load(id)?
            .ok_or_else(|| SophiaError::not_found("player", id.as_str()))
    }

    /// Replace the stored state wholesale (last writer wins).
    ///
    /// # Errors
    /// `SophiaError::Conflict` if the player is locked past the timeout;
    /// store failures otherwise.
    pub fn save_player(&self, state: &PlayerState) -> Result<()> {
        let _guard = self.acquire(&state.id)?;
        let mut state = state.clone();
        state.updated_at = Utc::now();
        self.store.save(&state)
    }

    /// Every stored player id.
    ///
    /// # Errors
    /// Store failures.
    pub fn list_players(&self) -> Result<Vec<PlayerId>> {
        self.store.list()
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Lock `id` and load a working copy.
    ///
    /// # Errors
    /// `SophiaError::Conflict` if the lock is not acquired in time;
    /// `SophiaError::NotFound` for unknown ids.
    pub fn begin(&self, id: &PlayerId) -> Result<PlayerTransaction<'_>> {
        // Lock entries are only created for ids the store knows.
        if !self.locks.contains_key(id) {
            self.get_player(id)?;
        }
        let guard = self.acquire(id)?;
        let player = self.get_player(id)?;
        Ok(PlayerTransaction {
            registry: self,
            player,
            committed: false,
            _guard: guard,
        })
    }

    /// Run `f` against a working copy and commit if it succeeds.
    ///
    /// # Errors
    /// Whatever `begin`, `f` or the commit returns. The stored state is
    /// untouched on error.
    pub fn transact<T>(
        &self,
        id: &PlayerId,
        f: impl FnOnce(&mut PlayerState) -> Result<T>,
    ) -> Result<(T, PlayerState)> {
        let mut tx = self.begin(id)?;
        let out = f(&mut tx.player)?;
        tx.commit()?;
        Ok((out, tx.into_state()))
    }

    fn acquire(&self, id: &PlayerId) -> Result<ArcMutexGuard<RawMutex, ()>> {
        let lock = self.locks.entry(id.clone()).or_default().clone();
        let start = Instant::now();
        let guard = lock.try_lock_arc_for(self.lock_timeout).ok_or_else(|| {
            SophiaError::Conflict(format!(
                "player {id} is busy; gave up after {} ms",
                self.lock_timeout.as_millis()
            ))
        })?;
        debug!(
            player = %id,
            waited_us = start.elapsed().as_micros(),
            "Player lock acquired"
        );
        Ok(guard)
    }
}

/// A locked working copy of one player.
///
/// Dereferences to the [`PlayerState`] being edited. The lock is held until
/// the transaction is dropped, including after a commit.
pub struct PlayerTransaction<'r> {
    registry: &'r PlayerRegistry,
    player: PlayerState,
    committed: bool,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl PlayerTransaction<'_> {
    /// Persist the working copy. The lock stays held.
    ///
    /// # Errors
    /// Store failures; the stored state is then unchanged.
    pub fn commit(&mut self) -> Result<()> {
        self.player.updated_at = Utc::now();
        self.registry.store.save(&self.player)?;
        self.committed = true;
        Ok(())
    }

    /// Whether `commit` has succeeded.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Release the lock and return the working copy.
    #[must_use]
    pub fn into_state(self) -> PlayerState {
        self.player.clone()
    }
}

impl Deref for PlayerTransaction<'_> {
    type Target = PlayerState;

    fn deref(&self) -> &PlayerState {
        &self.player
    }
}

impl DerefMut for PlayerTransaction<'_> {
    fn deref_mut(&mut self) -> &mut PlayerState {
        &mut self.player
    }
}

impl Drop for PlayerTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            debug!(player = %self.player.id, "Transaction released without commit");
        }
    }
}

impl std::fmt::Debug for PlayerTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerTransaction")
            .field("player", &self.player.id)
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}
