//! Result merging
//!
//! Combines the per-slice row streams of one query into a single logical
//! stream. Three mutually exclusive strategies, selected by query shape:
//! scalar aggregate re-combination, global order-preserving k-way merge,
//! and plain concatenation. An optional offset/limit range applies to the
//! merged stream, never per slice: a slice-local ordinal says nothing about
//! a row's logical position.

use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::data::{add_values, compare_values, Row};
use crate::store::RowStream;
use crate::{Result, SliceError};

use super::{AggregateOp, AggregateSpec, SliceQuery, SortKey};

// ============================================================================
// Merged Rows
// ============================================================================

/// The logical result stream of one fanned-out query.
///
/// Computed incrementally: rows are pulled from the per-slice streams on
/// demand. Any stream error ends the iteration after surfacing the error
/// once; the remaining per-slice streams are dropped at that point.
pub struct MergedRows {
    kind: MergeKind,
    skip: usize,
    remaining: Option<usize>,
}

enum MergeKind {
    /// Each stream fully emitted, in slice-list order.
    Concat { streams: VecDeque<RowStream> },
    /// K-way merge over locally sorted streams.
    Ordered {
        streams: Vec<RowStream>,
        heads: Vec<Option<Row>>,
        keys: Vec<SortKey>,
        primed: bool,
    },
    /// One combined row from N single-row partials.
    Aggregate {
        streams: Vec<RowStream>,
        specs: Vec<AggregateSpec>,
        done: bool,
    },
    /// Terminal state: everything released.
    Closed,
}

impl MergedRows {
    /// Build the merge job for `query` over the collected streams.
    pub fn new(streams: Vec<RowStream>, query: &SliceQuery) -> Self {
        let kind = if !query.aggregates.is_empty() {
            MergeKind::Aggregate {
                streams,
                specs: query.aggregates.clone(),
                done: false,
            }
        } else if !query.sort_keys.is_empty() {
            MergeKind::Ordered {
                heads: Vec::with_capacity(streams.len()),
                streams,
                keys: query.sort_keys.clone(),
                primed: false,
            }
        } else {
            MergeKind::Concat {
                streams: streams.into(),
            }
        };
        let (skip, remaining) = match query.range {
            Some(range) => (range.offset, range.limit),
            None => (0, None),
        };
        Self {
            kind,
            skip,
            remaining,
        }
    }

    /// Release all per-slice streams without draining them.
    pub fn close(&mut self) {
        self.kind = MergeKind::Closed;
    }

    fn fail(&mut self, error: SliceError) -> Option<Result<Row>> {
        self.close();
        Some(Err(error))
    }

    /// Pull the next merged row, ignoring the range.
    fn merged_next(&mut self) -> Option<Result<Row>> {
        match &mut self.kind {
            MergeKind::Closed => None,
            MergeKind::Concat { streams } => loop {
                let stream = streams.front_mut()?;
                match stream.next() {
                    Some(row) => return Some(row),
                    None => {
                        streams.pop_front();
                    }
                }
            },
            MergeKind::Ordered {
                streams,
                heads,
                keys,
                primed,
            } => {
                if !*primed {
                    *primed = true;
                    for stream in streams.iter_mut() {
                        match stream.next() {
                            Some(Ok(row)) => heads.push(Some(row)),
                            Some(Err(e)) => return Some(Err(e)),
                            None => heads.push(None),
                        }
                    }
                }
                let best = match select_head(heads, keys) {
                    Ok(best) => best?,
                    Err(e) => return Some(Err(e)),
                };
                let row = heads[best].take();
                match streams[best].next() {
                    Some(Ok(next)) => heads[best] = Some(next),
                    Some(Err(e)) => return Some(Err(e)),
                    None => {}
                }
                row.map(Ok)
            }
            MergeKind::Aggregate {
                streams,
                specs,
                done,
            } => {
                if *done {
                    return None;
                }
                *done = true;
                Some(combine_aggregates(streams, specs))
            }
        }
    }
}

impl Iterator for MergedRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Result<Row>> {
        loop {
            if self.remaining == Some(0) {
                self.close();
                return None;
            }
            let row = match self.merged_next() {
                Some(Ok(row)) => row,
                Some(Err(e)) => return self.fail(e),
                None => {
                    self.close();
                    return None;
                }
            };
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(remaining) = &mut self.remaining {
                *remaining -= 1;
            }
            return Some(Ok(row));
        }
    }
}

// ============================================================================
// Ordered Merge
// ============================================================================

/// Index of the head row that comes first in the requested global order,
/// or `None` when every stream is exhausted. Ties keep the lowest slice
/// index, which makes the merge stable across slices.
fn select_head(heads: &[Option<Row>], keys: &[SortKey]) -> Result<Option<usize>> {
    let mut best: Option<usize> = None;
    for (i, head) in heads.iter().enumerate() {
        let Some(row) = head else { continue };
        match best {
            None => best = Some(i),
            Some(b) => {
                let current = heads[b].as_ref().unwrap();
                if compare_rows(row, current, keys)? == Ordering::Less {
                    best = Some(i);
                }
            }
        }
    }
    Ok(best)
}

/// Compare two rows under the query's sort keys, direction applied per key.
fn compare_rows(a: &Row, b: &Row, keys: &[SortKey]) -> Result<Ordering> {
    for key in keys {
        let (va, vb) = match (a.get(key.column), b.get(key.column)) {
            (Some(va), Some(vb)) => (va, vb),
            _ => {
                return Err(SliceError::Unsupported(format!(
                    "sort column {} out of range",
                    key.column
                )))
            }
        };
        let ordering = compare_values(va, vb).ok_or_else(|| {
            SliceError::Unsupported(format!(
                "incomparable sort values {:?} and {:?}",
                va, vb
            ))
        })?;
        let ordering = if key.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return Ok(ordering);
        }
    }
    Ok(Ordering::Equal)
}

// ============================================================================
// Aggregate Merge
// ============================================================================

/// Re-derive the global scalar row from N single-row partials.
fn combine_aggregates(streams: &mut [RowStream], specs: &[AggregateSpec]) -> Result<Row> {
    for spec in specs {
        if spec.op == AggregateOp::Avg {
            return Err(SliceError::Unsupported(
                "aggregate operator AVG cannot be re-combined from per-slice partials".into(),
            ));
        }
    }

    let mut combined: Option<Row> = None;
    for stream in streams.iter_mut() {
        let partial = match stream.next() {
            Some(row) => row?,
            None => {
                return Err(SliceError::Internal(
                    "aggregate query returned no row from a slice".into(),
                ))
            }
        };
        combined = Some(match combined {
            None => partial,
            Some(current) => fold_partial(current, &partial, specs)?,
        });
    }
    combined.ok_or_else(|| SliceError::Internal("aggregate query had no target stream".into()))
}

fn fold_partial(mut current: Row, partial: &Row, specs: &[AggregateSpec]) -> Result<Row> {
    for spec in specs {
        let (Some(acc), Some(next)) = (current.get(spec.column), partial.get(spec.column)) else {
            return Err(SliceError::Unsupported(format!(
                "aggregate column {} out of range",
                spec.column
            )));
        };
        let folded = match spec.op {
            AggregateOp::Count | AggregateOp::Sum => add_values(acc, next)?,
            AggregateOp::Max | AggregateOp::Min => {
                let ordering = compare_values(acc, next).ok_or_else(|| {
                    SliceError::Unsupported(format!(
                        "incomparable aggregate values {:?} and {:?}",
                        acc, next
                    ))
                })?;
                let keep_current = match spec.op {
                    AggregateOp::Max => ordering != Ordering::Less,
                    _ => ordering != Ordering::Greater,
                };
                if keep_current {
                    acc.clone()
                } else {
                    next.clone()
                }
            }
            AggregateOp::Avg => unreachable!("rejected before combining"),
        };
        current[spec.column] = folded;
    }
    Ok(current)
}

// ============================================================================
// Tests
// ============================================================================
