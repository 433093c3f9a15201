//! Point-in-time batch reconstructor.
//!
//! Streams the ledger in `(specimen_id, date, movement_id)` order, one page
//! at a time, and yields each specimen's complete event group exactly once.
//! A page boundary may cut through a specimen's rows; the cut-off tail is
//! held as `pending` and only released once a later row belongs to a
//! different specimen or the ledger is exhausted. Page size therefore
//! changes memory use and round trips, never results.
//!
//! Memory stays bounded by one page plus the pending group.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::calc;
use crate::config::ReasonRules;
use crate::db::ledger;
use crate::error::Result;
use crate::model::{MovementDate, MovementRecord, QuantitySnapshot, SpecimenId};

// ---------------------------------------------------------------------------
// Paging seam
// ---------------------------------------------------------------------------

/// Source of ledger pages in `(specimen_id, date, movement_id)` order.
pub trait LedgerPager {
    /// Rows `offset..offset + limit` of the ordered ledger. A result shorter
    /// than `limit` marks the last page.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn fetch_page(&mut self, offset: usize, limit: usize) -> Result<Vec<MovementRecord>>;
}

/// Pages over the `movements` table, optionally restricted to
/// `date <= as_of`.
pub struct SqlitePager<'conn> {
    conn: &'conn Connection,
    as_of: Option<MovementDate>,
}

impl<'conn> SqlitePager<'conn> {
    #[must_use]
    pub const fn new(conn: &'conn Connection, as_of: Option<MovementDate>) -> Self {
        Self { conn, as_of }
    }
}

impl LedgerPager for SqlitePager<'_> {
    fn fetch_page(&mut self, offset: usize, limit: usize) -> Result<Vec<MovementRecord>> {
        ledger::fetch_page(self.conn, self.as_of, offset, limit)
    }
}

/// Pages over rows held in memory. Rows are sorted into ledger order and
/// filtered by `as_of` on construction.
#[derive(Debug, Clone, Default)]
pub struct MemoryPager {
    rows: Vec<MovementRecord>,
    fetches: usize,
}

impl MemoryPager {
    #[must_use]
    pub fn new(mut rows: Vec<MovementRecord>, as_of: Option<MovementDate>) -> Self {
        if let Some(as_of) = as_of {
            rows.retain(|row| row.date <= as_of);
        }
        rows.sort_by(|a, b| {
            (a.specimen_id, a.date, a.movement_id).cmp(&(b.specimen_id, b.date, b.movement_id))
        });
        Self { rows, fetches: 0 }
    }

    /// Number of pages handed out so far.
    #[must_use]
    pub const fn fetches(&self) -> usize {
        self.fetches
    }
}

impl LedgerPager for MemoryPager {
    fn fetch_page(&mut self, offset: usize, limit: usize) -> Result<Vec<MovementRecord>> {
        self.fetches += 1;
        let start = offset.min(self.rows.len());
        let end = offset.saturating_add(limit).min(self.rows.len());
        Ok(self.rows[start..end].to_vec())
    }
}

// ---------------------------------------------------------------------------
// SpecimenGroups
// ---------------------------------------------------------------------------

/// All rows of one specimen up to the as-of date, in calculation order.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecimenGroup {
    pub specimen_id: SpecimenId,
    pub events: Vec<MovementRecord>,
}

/// Iterator over finalized specimen groups.
///
/// Yields `Err` once if a page read fails and then stops. When the cancel
/// flag is raised the iterator stops before the next page; the pending
/// group is dropped because later pages could still extend it.
pub struct SpecimenGroups<'a, P: LedgerPager> {
    pager: &'a mut P,
    page_size: usize,
    offset: usize,
    pending: Option<SpecimenGroup>,
    ready: VecDeque<SpecimenGroup>,
    exhausted: bool,
    cancel: Option<&'a AtomicBool>,
    cancelled: bool,
    pages_fetched: usize,
    events_read: usize,
}

impl<'a, P: LedgerPager> SpecimenGroups<'a, P> {
    /// A `page_size` of zero is treated as one.
    pub fn new(pager: &'a mut P, page_size: usize, cancel: Option<&'a AtomicBool>) -> Self {
        Self {
            pager,
            page_size: page_size.max(1),
            offset: 0,
            pending: None,
            ready: VecDeque::new(),
            exhausted: false,
            cancel,
            cancelled: false,
            pages_fetched: 0,
            events_read: 0,
        }
    }

    #[must_use]
    pub const fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    #[must_use]
    pub const fn events_read(&self) -> usize {
        self.events_read
    }

    /// Whether iteration stopped because the cancel flag was raised.
    #[must_use]
    pub const fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    fn absorb(&mut self, page: Vec<MovementRecord>) {
        for event in page {
            match self.pending.as_mut() {
                Some(group) if group.specimen_id == event.specimen_id => group.events.push(event),
                _ => {
                    let next = SpecimenGroup {
                        specimen_id: event.specimen_id,
                        events: vec![event],
                    };
                    if let Some(done) = self.pending.replace(next) {
                        self.ready.push_back(done);
                    }
                }
            }
        }
    }
}

impl<P: LedgerPager> Iterator for SpecimenGroups<'_, P> {
    type Item = Result<SpecimenGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(group) = self.ready.pop_front() {
                return Some(Ok(group));
            }
            if self.exhausted {
                return None;
            }
            if self
                .cancel
                .is_some_and(|flag| flag.load(Ordering::Relaxed))
            {
                self.cancelled = true;
                self.exhausted = true;
                self.pending = None;
                tracing::info!(
                    pages = self.pages_fetched,
                    events = self.events_read,
                    "reconstruction cancelled"
                );
                return None;
            }

            let page = match self.pager.fetch_page(self.offset, self.page_size) {
                Ok(page) => page,
                Err(err) => {
                    self.exhausted = true;
                    self.pending = None;
                    return Some(Err(err));
                }
            };
            self.pages_fetched += 1;
            self.events_read += page.len();
            self.offset += page.len();
            tracing::debug!(
                page = self.pages_fetched,
                rows = page.len(),
                offset = self.offset,
                "fetched ledger page"
            );

            let last_page = page.len() < self.page_size;
            self.absorb(page);
            if last_page {
                self.exhausted = true;
                if let Some(tail) = self.pending.take() {
                    self.ready.push_back(tail);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// reconstruct
// ---------------------------------------------------------------------------

/// Knobs for one reconstruction run.
#[derive(Debug, Clone, Copy)]
pub struct ReconstructOptions<'a> {
    pub page_size: usize,
    pub cancel: Option<&'a AtomicBool>,
}

impl ReconstructOptions<'_> {
    #[must_use]
    pub const fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            cancel: None,
        }
    }
}

/// One accepted specimen as of the report date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconstructedSpecimen {
    pub snapshot: QuantitySnapshot,
    /// First row with an increment reason: how the specimen arrived.
    pub first_in: Option<MovementRecord>,
    /// Last row with a decrement reason: how the specimen left.
    pub last_out: Option<MovementRecord>,
    pub events: Vec<MovementRecord>,
}

/// Result of a reconstruction run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointInTimeReport {
    pub as_of: Option<MovementDate>,
    pub entries: BTreeMap<SpecimenId, ReconstructedSpecimen>,
    pub pages_fetched: usize,
    pub events_read: usize,
    pub groups_evaluated: usize,
    /// `false` when the run was cancelled; `entries` then holds every
    /// specimen finalized before cancellation.
    pub completed: bool,
}

/// Stream `pager`, calculate each finalized group, and keep the ones
/// `accept` approves.
///
/// # Errors
///
/// Returns the first page read error; results gathered so far are
/// discarded.
pub fn reconstruct<P, F>(
    pager: &mut P,
    rules: &ReasonRules,
    options: &ReconstructOptions<'_>,
    mut accept: F,
) -> Result<PointInTimeReport>
where
    P: LedgerPager,
    F: FnMut(&QuantitySnapshot, &[MovementRecord]) -> bool,
{
    let mut groups = SpecimenGroups::new(pager, options.page_size, options.cancel);
    let mut entries = BTreeMap::new();
    let mut groups_evaluated = 0;

    for group in groups.by_ref() {
        let group = group?;
        groups_evaluated += 1;
        let snapshot = calc::calculate(&group.events, rules);
        if !accept(&snapshot, &group.events) {
            continue;
        }
        entries.insert(
            group.specimen_id,
            ReconstructedSpecimen {
                snapshot,
                first_in: calc::first_increment(&group.events).cloned(),
                last_out: calc::last_decrement(&group.events).cloned(),
                events: group.events,
            },
        );
    }

    Ok(PointInTimeReport {
        as_of: None,
        entries,
        pages_fetched: groups.pages_fetched(),
        events_read: groups.events_read(),
        groups_evaluated,
        completed: !groups.was_cancelled(),
    })
}

/// Reconstruct every specimen as of `as_of` (inclusive) straight from the
/// ledger, bypassing stored counters.
///
/// # Errors
///
/// Returns an error if a page read fails.
pub fn reconstruct_as_of<F>(
    conn: &Connection,
    as_of: MovementDate,
    rules: &ReasonRules,
    options: &ReconstructOptions<'_>,
    accept: F,
) -> Result<PointInTimeReport>
where
    F: FnMut(&QuantitySnapshot, &[MovementRecord]) -> bool,
{
    let mut pager = SqlitePager::new(conn, Some(as_of));
    let mut report = reconstruct(&mut pager, rules, options, accept)?;
    report.as_of = Some(as_of);

    tracing::info!(
        %as_of,
        accepted = report.entries.len(),
        groups = report.groups_evaluated,
        pages = report.pages_fetched,
        completed = report.completed,
        "point-in-time reconstruction finished"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
