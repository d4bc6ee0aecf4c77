// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Event coalescer and rate limiter for NSG reconciles.
//!
//! Bursty "something changed" signals are folded into at most one reconcile per
//! cooldown window. The loop owns its two flags exclusively; callers only ever
//! enqueue a message through [`CoalescerHandle::signal`], which never blocks.
//!
//! ```text
//!            signal()                      cooldown fires
//!   Idle ───────────────▶ Pending-Blocked ───────────────▶ Pending-Ready
//!    ▲                                                          │
//!    └──────────────── reconcile, restart cooldown ◀────────────┘
//! ```
//!
//! The loop starts in `Pending-Ready`, so the first reconcile happens as soon as
//! it runs. A signal that arrives while a reconcile is in flight stays queued and
//! is acted upon once the following cooldown has elapsed.

use crate::metrics;
use crate::reconciler::ReconcilePass;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// The two conditions that gate a reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerState {
    /// A change was signalled since the last reconcile started
    pub pending: bool,
    /// The cooldown since the last reconcile has elapsed
    pub cooldown_elapsed: bool,
}

impl CoalescerState {
    /// State at startup: a reconcile is due immediately.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            pending: true,
            cooldown_elapsed: true,
        }
    }

    /// Whether both conditions hold.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.pending && self.cooldown_elapsed
    }

    /// Record a change notification.
    pub fn signal(&mut self) {
        self.pending = true;
    }

    /// Record the end of the cooldown window.
    pub fn cooldown_expired(&mut self) {
        self.cooldown_elapsed = true;
    }

    /// Record the start of a reconcile.
    pub fn begin_reconcile(&mut self) {
        self.pending = false;
        self.cooldown_elapsed = false;
    }
}

/// Cloneable, non-blocking sender of change signals.
#[derive(Debug, Clone)]
pub struct CoalescerHandle {
    tx: mpsc::UnboundedSender<&'static str>,
}

impl CoalescerHandle {
    /// Request a reconcile. Never blocks.
    ///
    /// `reason` is only used for logging and metrics.
    pub fn signal(&self, reason: &'static str) {
        metrics::record_signal(reason);
        if self.tx.send(reason).is_err() {
            debug!(reason, "Coalescer stopped, dropping signal");
        }
    }
}

/// Single-owner control loop that decides when to reconcile.
pub struct Coalescer {
    rx: mpsc::UnboundedReceiver<&'static str>,
    cooldown: Duration,
    state: CoalescerState,
}

impl Coalescer {
    /// Create a coalescer and the handle used to signal it.
    ///
    /// Signals sent before [`Coalescer::run`] is called are queued.
    #[must_use]
    pub fn new(cooldown: Duration) -> (Self, CoalescerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx,
                cooldown,
                state: CoalescerState::initial(),
            },
            CoalescerHandle { tx },
        )
    }

    /// Run the loop, reconciling sequentially with `reconciler`.
    ///
    /// Failed passes are logged and the loop continues; the next release
    /// retries from scratch. Returns once every handle has been dropped and no
    /// signal is pending.
    pub async fn run<R: ReconcilePass>(mut self, reconciler: R) {
        let cooldown = tokio::time::sleep(self.cooldown);
        tokio::pin!(cooldown);
        let mut timer_armed = false;
        let mut closed = false;

        info!(cooldown = ?self.cooldown, "Coalescer started");

        loop {
            if self.state.ready() {
                self.state.begin_reconcile();
                info!("Reconciling NSG");

                let start = Instant::now();
                match reconciler.reconcile_once().await {
                    Ok(summary) => {
                        metrics::record_reconciliation_success(start.elapsed());
                        info!(
                            desired = summary.desired,
                            foreign = summary.foreign,
                            removed = summary.removed,
                            skipped = summary.skipped,
                            written = summary.written,
                            elapsed = ?start.elapsed(),
                            "NSG reconciled"
                        );
                    }
                    Err(e) => {
                        metrics::record_reconciliation_error(start.elapsed());
                        error!(
                            error = %e,
                            elapsed = ?start.elapsed(),
                            "NSG reconcile failed, will retry after cooldown"
                        );
                    }
                }

                cooldown
                    .as_mut()
                    .reset(tokio::time::Instant::now() + self.cooldown);
                timer_armed = true;
                continue;
            }

            if closed && !self.state.pending {
                info!("All signal handles dropped, coalescer exiting");
                return;
            }

            tokio::select! {
                () = &mut cooldown, if timer_armed => {
                    timer_armed = false;
                    self.state.cooldown_expired();
                    debug!("NSG update cooldown elapsed");
                }
                message = self.rx.recv(), if !closed => {
                    match message {
                        Some(reason) => {
                            debug!(reason, "Update signaled");
                            self.state.signal();
                        }
                        None => closed = true,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "coalescer_tests.rs"]
mod coalescer_tests;
