//! BIO span merging
//!
//! Turns token-level backend output into one candidate per entity. Spans
//! are visited in `(start, end)` order:
//!
//! - `B-x` starts a run, `I-x` extends a run of the same type
//! - `I-x` without a matching run starts a new one
//! - `O` closes the current run
//! - a span overlapping the current run extends it when the type matches
//!   and is discarded otherwise
//!
//! Spans outside the text or not on char boundaries are dropped.

use lexicon_core::{Span, SpanLabel};
use tracing::{debug, warn};

use crate::Candidate;

/// Merges BIO-tagged spans into non-overlapping candidates
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanMerger;

impl SpanMerger {
    pub fn new() -> Self {
        Self
    }

    /// Merge spans for `source` into ordered, non-overlapping candidates
    pub fn merge(&self, source: &str, spans: &[Span]) -> Vec<Candidate> {
        let mut valid: Vec<&Span> = spans
            .iter()
            .filter(|span| {
                let ok = span.is_within(source);
                if !ok {
                    warn!(
                        start = span.start,
                        end = span.end,
                        text_len = source.len(),
                        "Discarding span outside text bounds"
                    );
                }
                ok
            })
            .collect();
        valid.sort_by_key(|span| (span.start, span.end));

        let mut merged: Vec<Candidate> = Vec::new();
        let mut current: Option<Candidate> = None;

        for span in valid {
            let entity_type = match span.label.entity_type() {
                Some(t) => t,
                None => {
                    close_run(&mut current, &mut merged);
                    continue;
                }
            };

            if let Some(run) = current.as_mut() {
                let overlaps = span.start < run.end;
                let continues = matches!(span.label, SpanLabel::Inside(_));

                if run.entity_type == entity_type && (overlaps || continues) {
                    run.end = run.end.max(span.end);
                    run.scores.push(span.score);
                    continue;
                }
                if overlaps {
                    debug!(
                        start = span.start,
                        label = %span.label,
                        "Discarding span overlapping an entity of another type"
                    );
                    continue;
                }
                close_run(&mut current, &mut merged);
            }

            // Closed runs can still overlap a span that starts inside them
            if let Some(last) = merged.last() {
                if span.start < last.end {
                    if last.entity_type == entity_type {
                        current = merged.pop();
                        if let Some(run) = current.as_mut() {
                            run.end = run.end.max(span.end);
                            run.scores.push(span.score);
                        }
                    } else {
                        debug!(
                            start = span.start,
                            label = %span.label,
                            "Discarding span overlapping an entity of another type"
                        );
                    }
                    continue;
                }
            }

            if matches!(span.label, SpanLabel::Inside(_)) {
                debug!(
                    start = span.start,
                    entity_type = %entity_type,
                    "Inside tag without a matching begin, starting a new entity"
                );
            }
            current = Some(Candidate::new(entity_type, span.start, span.end, span.score));
        }

        close_run(&mut current, &mut merged);
        merged
    }
}

fn close_run(current: &mut Option<Candidate>, merged: &mut Vec<Candidate>) {
    if let Some(run) = current.take() {
        merged.push(run);
    }
}
