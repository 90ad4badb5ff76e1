//! Paging state machine for one feed instance.
//!
//! ```text
//! Idle ──begin──▶ Loading ──complete──▶ Idle (exhausted when the page was short)
//!                    │
//!                    └────fail────▶ Error ──begin──▶ Loading (retry, same boundary)
//! ```
//!
//! Every load is identified by a [`LoadTicket`]. Restarting the feed bumps the
//! generation, so the result of a load started before the restart no longer
//! matches and is discarded.

use serde::Serialize;

use crate::cursor::PageBoundary;
use crate::error::LoadError;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "camelCase")]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Error(LoadError),
}

impl LoadState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn error(&self) -> Option<&LoadError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// Why a page request did not start a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    AlreadyLoading,
    Exhausted,
    Closed,
}

/// Handle for one in-flight load: which boundary to ask for, and which
/// generation of the feed asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    boundary: Option<PageBoundary>,
}

impl LoadTicket {
    pub fn boundary(&self) -> Option<&PageBoundary> {
        self.boundary.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Result of a completion that no longer applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleTicket;

#[derive(Debug, Clone, Default)]
pub struct PagingState {
    load_state: LoadState,
    next_boundary: Option<PageBoundary>,
    exhausted: bool,
    generation: u64,
}

impl PagingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn next_boundary(&self) -> Option<&PageBoundary> {
        self.next_boundary.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Move to `Loading` and hand out a ticket for the stored boundary.
    /// Refused while a load is in flight or once the feed is exhausted.
    pub fn begin(&mut self) -> Result<LoadTicket, SkipReason> {
        if self.load_state.is_loading() {
            return Err(SkipReason::AlreadyLoading);
        }
        if self.exhausted {
            return Err(SkipReason::Exhausted);
        }

        self.load_state = LoadState::Loading;
        Ok(LoadTicket {
            generation: self.generation,
            boundary: self.next_boundary.clone(),
        })
    }

    fn accepts(&self, ticket: &LoadTicket) -> bool {
        self.load_state.is_loading() && ticket.generation == self.generation
    }

    /// Record a successful load. `short_page` forces exhaustion even when a
    /// loader returned a boundary alongside fewer items than requested.
    pub fn complete(
        &mut self,
        ticket: &LoadTicket,
        next_boundary: Option<PageBoundary>,
        short_page: bool,
    ) -> Result<(), StaleTicket> {
        if !self.accepts(ticket) {
            return Err(StaleTicket);
        }

        self.exhausted = next_boundary.is_none() || short_page;
        self.next_boundary = if self.exhausted { None } else { next_boundary };
        self.load_state = LoadState::Idle;
        Ok(())
    }

    /// Record a failed load. The boundary is kept for the retry.
    pub fn fail(&mut self, ticket: &LoadTicket, err: LoadError) -> Result<(), StaleTicket> {
        if !self.accepts(ticket) {
            return Err(StaleTicket);
        }

        self.load_state = LoadState::Error(err);
        Ok(())
    }

    /// Forget everything and start over from the newest end. Outstanding
    /// tickets become stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.load_state = LoadState::Idle;
        self.next_boundary = None;
        self.exhausted = false;
    }
}
