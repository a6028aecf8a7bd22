//! Title-aware normalization of person entities
//!
//! For every person candidate the normalizer looks at the entity's own
//! leading tokens and a small window of raw tokens before it, then:
//!
//! - retains academic and religious titles ("Dr. Siti Nurhaliza")
//! - drops office titles ("Presiden Joko Widodo" -> "Joko Widodo")
//! - splits a location qualified by an office title into its own entity
//!   ("Gubernur Jawa Barat Ridwan Kamil" -> "Ridwan Kamil" + "Jawa Barat")
//! - joins name segments linked by a lineage marker ("Ahmad bin Yusuf")
//!
//! Normalizing an already-normalized candidate set returns it unchanged.

use std::sync::Arc;

use lexicon_core::EntityType;
use tracing::debug;

use crate::titles::{TitleCategory, TitleRuleTable};
use crate::tokens::{tokenize, Token};
use crate::Candidate;

/// Rewrites person candidates according to a [`TitleRuleTable`]
#[derive(Debug, Clone)]
pub struct TitleNormalizer {
    table: Arc<TitleRuleTable>,
    /// Raw tokens scanned before a person entity
    context_window: usize,
}

/// Tokens of one source text with their match keys and entity tags
struct TokenView<'a> {
    tokens: Vec<Token<'a>>,
    keys: Vec<String>,
}

impl<'a> TokenView<'a> {
    fn new(source: &'a str) -> Self {
        let tokens = tokenize(source);
        let keys = tokens.iter().map(Token::key).collect();
        Self { tokens, keys }
    }

    /// Type of the non-person candidate covering token `idx`, if any
    fn tag(&self, idx: usize, others: &[Candidate]) -> Option<EntityType> {
        let token = &self.tokens[idx];
        others
            .iter()
            .find(|c| token.overlaps(c.start, c.end))
            .map(|c| c.entity_type)
    }
}

/// Result of normalizing a single person candidate
struct PersonOutcome {
    person: Option<Candidate>,
    location: Option<Candidate>,
}

impl TitleNormalizer {
    pub fn new(table: Arc<TitleRuleTable>, context_window: usize) -> Self {
        Self {
            table,
            context_window,
        }
    }

    pub fn table(&self) -> &Arc<TitleRuleTable> {
        &self.table
    }

    pub fn context_window(&self) -> usize {
        self.context_window
    }

    /// Normalize all candidates of one text
    ///
    /// Non-person candidates pass through untouched; new location candidates
    /// may be added. The result is sorted by offset and non-overlapping.
    pub fn normalize(&self, source: &str, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let view = TokenView::new(source);
        let candidates = self.join_lineage(&view, candidates);

        let (persons, mut result): (Vec<Candidate>, Vec<Candidate>) = candidates
            .into_iter()
            .partition(|c| c.entity_type == EntityType::Person);

        let mut kept: Vec<Candidate> = Vec::with_capacity(persons.len());
        let mut emitted: Vec<Candidate> = Vec::new();

        for person in &persons {
            let floor = kept.last().map_or(0, |p| p.end);
            let outcome = self.normalize_person(&view, person, floor, &result);
            emitted.extend(outcome.location);
            kept.extend(outcome.person);
        }

        for location in emitted {
            let duplicate = result
                .iter()
                .chain(kept.iter())
                .any(|c| c.overlaps(location.start, location.end));
            if duplicate {
                debug!(
                    start = location.start,
                    end = location.end,
                    "Skipping location already covered by an entity"
                );
                continue;
            }
            result.push(location);
        }

        result.extend(kept);
        result.sort_by_key(|c| (c.start, c.end));
        result
    }

    /// Join a person with the name segment after a lineage marker
    fn join_lineage(&self, view: &TokenView<'_>, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by_key(|c| (c.start, c.end));
        let tokens = &view.tokens;

        let mut i = 0;
        while i < candidates.len() {
            if candidates[i].entity_type != EntityType::Person {
                i += 1;
                continue;
            }

            loop {
                let (start, end) = (candidates[i].start, candidates[i].end);
                let closes = tokens
                    .iter()
                    .rev()
                    .find(|t| t.overlaps(start, end))
                    .map_or(true, |t| t.closes_phrase);
                if closes {
                    break;
                }

                let Some(marker) = tokens.iter().position(|t| t.start >= end) else {
                    break;
                };
                let Some((len, TitleCategory::Lineage)) =
                    self.table.match_starting_at(&view.keys, marker)
                else {
                    break;
                };
                let segment = marker + len;
                let marker_tagged = (marker..segment)
                    .any(|k| candidates.iter().any(|c| tokens[k].overlaps(c.start, c.end)));
                if segment >= tokens.len() || tokens[segment - 1].closes_phrase || marker_tagged {
                    break;
                }

                // Titles between the marker and the name ("bin H. Yusuf")
                let mut segment = segment;
                while segment < tokens.len()
                    && !candidates.iter().any(|c| tokens[segment].overlaps(c.start, c.end))
                    && matches!(
                        self.table.match_starting_at(&view.keys[segment..segment + 1], 0),
                        Some((_, TitleCategory::Academic | TitleCategory::Religious))
                    )
                {
                    segment += 1;
                }
                if segment >= tokens.len() {
                    break;
                }

                let next = &tokens[segment];
                if let Some(j) = candidates
                    .iter()
                    .position(|c| next.overlaps(c.start, c.end))
                {
                    if j <= i || candidates[j].entity_type != EntityType::Person {
                        break;
                    }
                    let absorbed = candidates.remove(j);
                    debug!(
                        start = start,
                        end = absorbed.end,
                        "Joining lineage-linked person entities"
                    );
                    candidates[i].end = absorbed.end;
                    candidates[i].scores.extend(absorbed.scores);
                    continue;
                }

                let mut k = segment;
                while k < tokens.len()
                    && self.is_name_token(&tokens[k])
                    && !candidates.iter().any(|c| tokens[k].overlaps(c.start, c.end))
                {
                    k += 1;
                    if tokens[k - 1].closes_phrase {
                        break;
                    }
                }
                if k == segment {
                    break;
                }
                debug!(start = start, end = tokens[k - 1].end, "Joining lineage name segment");
                candidates[i].end = tokens[k - 1].end;
            }

            i += 1;
        }

        candidates
    }

    /// Capitalized word that is not itself a title or place
    fn is_name_token(&self, token: &Token<'_>) -> bool {
        token.is_capitalized() && !self.table.contains_word(token.text)
    }

    /// Index (into `own`) of the first token of the actual name
    fn name_anchor(&self, view: &TokenView<'_>, own: &[usize]) -> usize {
        let keys: Vec<String> = own.iter().map(|&i| view.keys[i].clone()).collect();

        let mut j = 0;
        while j < own.len() {
            match self.table.match_starting_at(&keys, j) {
                Some((len, TitleCategory::NonAcademic)) => {
                    j += len;
                    // A place qualifying the office belongs to the title
                    while let Some((len, TitleCategory::Geographic)) =
                        self.table.match_starting_at(&keys, j)
                    {
                        j += len;
                    }
                }
                Some((len, TitleCategory::Academic | TitleCategory::Religious)) => j += len,
                _ => break,
            }
        }

        // Segments joined by a lineage marker are rescanned from the last
        // marker so the scan sees the same tokens on every pass.
        let last_marker = (j..own.len()).rev().find(|&k| {
            matches!(
                self.table.match_starting_at(&keys, k),
                Some((1, TitleCategory::Lineage))
            )
        });
        if let Some(marker) = last_marker {
            let linked = (j..marker).all(|k| {
                self.is_name_token(&view.tokens[own[k]])
                    || matches!(
                        self.table.match_starting_at(&keys[k..k + 1], 0),
                        Some((
                            _,
                            TitleCategory::Academic
                                | TitleCategory::Religious
                                | TitleCategory::Lineage
                        ))
                    )
            });
            if linked && marker + 1 < own.len() {
                return marker + 1;
            }
        }

        j
    }

    /// Leading place tokens of the entity that qualify an office title
    /// standing just before it ("Gubernur | Jawa Barat Ridwan Kamil")
    fn office_qualifier(
        &self,
        view: &TokenView<'_>,
        own: &[usize],
        anchor: usize,
        floor: usize,
        others: &[Candidate],
    ) -> usize {
        if anchor != 0 || own[0] == 0 {
            return 0;
        }
        let prev = own[0] - 1;
        let token = &view.tokens[prev];
        if token.start < floor || token.closes_phrase || view.tag(prev, others).is_some() {
            return 0;
        }
        if !matches!(
            self.table.match_ending_at(&view.keys[..own[0]], own[0]),
            Some((_, TitleCategory::NonAcademic))
        ) {
            return 0;
        }

        let keys: Vec<String> = own.iter().map(|&i| view.keys[i].clone()).collect();
        let mut j = 0;
        while let Some((len, TitleCategory::Geographic)) = self.table.match_starting_at(&keys, j) {
            j += len;
        }
        // the name itself must survive
        if j >= own.len() {
            return 0;
        }
        j
    }

    fn normalize_person(
        &self,
        view: &TokenView<'_>,
        person: &Candidate,
        floor: usize,
        others: &[Candidate],
    ) -> PersonOutcome {
        let tokens = &view.tokens;
        let own: Vec<usize> = (0..tokens.len())
            .filter(|&i| tokens[i].overlaps(person.start, person.end))
            .collect();
        if own.is_empty() {
            return PersonOutcome {
                person: Some(person.clone()),
                location: None,
            };
        }

        let anchor = self.name_anchor(view, &own);
        let anchor = anchor + self.office_qualifier(view, &own, anchor, floor, others);

        // Raw tokens before the entity, nearest first, then restored to
        // reading order. Own leading tokens always take part in the scan.
        let remaining = self.context_window.saturating_sub(anchor);
        let mut seq: Vec<usize> = (0..own[0])
            .rev()
            .take_while(|&i| tokens[i].start >= floor && !tokens[i].closes_phrase)
            .take(remaining)
            .collect();
        seq.reverse();
        seq.extend_from_slice(&own[..anchor]);
        let seq_keys: Vec<String> = seq.iter().map(|&i| view.keys[i].clone()).collect();

        let mut retained = match own.get(anchor) {
            Some(_) if anchor == 0 => person.start,
            Some(&idx) => tokens[idx].start,
            None => person.end,
        };
        let mut pending: Option<(usize, usize)> = None;
        let mut location = None;
        let mut p = seq.len();

        while p > 0 {
            let step = match view.tag(seq[p - 1], others) {
                Some(EntityType::Location) => Some((1, TitleCategory::Geographic)),
                Some(_) => None,
                None => {
                    let mut free = p - 1;
                    while free > 0 && view.tag(seq[free - 1], others).is_none() {
                        free -= 1;
                    }
                    self.table.match_ending_at(&seq_keys[free..p], p - free)
                }
            };
            let Some((len, category)) = step else {
                break;
            };

            match category {
                TitleCategory::NonAcademic => {
                    if let Some((lo, hi)) = pending {
                        location = self.emit_location(view, &seq[lo..hi], person, others);
                    }
                    let title = seq_keys[p - len..p].join(" ");
                    debug!(title = %title, "Dropping non-academic title");
                    break;
                }
                TitleCategory::Academic | TitleCategory::Religious => {
                    if pending.is_some() {
                        break;
                    }
                    p -= len;
                    retained = tokens[seq[p]].start;
                }
                TitleCategory::Lineage => {
                    if pending.is_some() {
                        break;
                    }
                    let mut q = p - len;
                    while q > 0
                        && view.tag(seq[q - 1], others).is_none()
                        && self.is_name_token(&tokens[seq[q - 1]])
                        && !tokens[seq[q - 1]].closes_phrase
                    {
                        q -= 1;
                    }
                    if q == p - len {
                        break;
                    }
                    p = q;
                    retained = tokens[seq[p]].start;
                }
                TitleCategory::Geographic => {
                    let hi = pending.map_or(p, |(_, hi)| hi);
                    pending = Some((p - len, hi));
                    p -= len;
                }
            }
        }

        if anchor >= own.len() {
            debug!(
                start = person.start,
                end = person.end,
                "Discarding person entity without a name"
            );
            return PersonOutcome {
                person: None,
                location,
            };
        }

        let mut normalized = person.clone();
        if retained > person.start {
            normalized.penalized = true;
        }
        normalized.start = retained;

        PersonOutcome {
            person: Some(normalized),
            location,
        }
    }

    /// Location candidate for a run of place tokens preceding a person
    fn emit_location(
        &self,
        view: &TokenView<'_>,
        run: &[usize],
        person: &Candidate,
        others: &[Candidate],
    ) -> Option<Candidate> {
        let tokens = &view.tokens;

        // Connectors ("of") are lowercase; trim them from both edges
        let first = run.iter().position(|&i| tokens[i].is_capitalized())?;
        let last = run.iter().rposition(|&i| tokens[i].is_capitalized())?;
        let start = tokens[run[first]].start;
        let end = tokens[run[last]].end;

        let tagged: Vec<f32> = others
            .iter()
            .filter(|c| c.entity_type == EntityType::Location && c.overlaps(start, end))
            .flat_map(|c| c.scores.iter().copied())
            .collect();
        let scores = if tagged.is_empty() {
            person.scores.clone()
        } else {
            tagged
        };

        Some(Candidate {
            entity_type: EntityType::Location,
            start,
            end,
            scores,
            penalized: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::titles::TitleRule;

    fn normalizer() -> TitleNormalizer {
        TitleNormalizer::new(Arc::new(TitleRuleTable::builtin().unwrap()), 3)
    }

    fn cand(source: &str, text: &str, entity_type: EntityType, score: f32) -> Candidate {
        let start = source.find(text).unwrap();
        Candidate::new(entity_type, start, start + text.len(), score)
    }

    fn texts<'a>(source: &'a str, result: &[Candidate]) -> Vec<(&'a str, EntityType)> {
        result
            .iter()
            .map(|c| (c.text(source), c.entity_type))
            .collect()
    }

    #[test]
    fn test_strips_office_title_outside_entity() {
        let source = "Presiden Joko Widodo meresmikan bendungan";
        let result = normalizer().normalize(
            source,
            vec![cand(source, "Joko Widodo", EntityType::Person, 0.9)],
        );

        assert_eq!(texts(source, &result), vec![("Joko Widodo", EntityType::Person)]);
        assert!(!result[0].penalized);
    }

    #[test]
    fn test_strips_office_title_inside_entity() {
        let source = "Presiden Joko Widodo meresmikan bendungan";
        let result = normalizer().normalize(
            source,
            vec![cand(source, "Presiden Joko Widodo", EntityType::Person, 0.9)],
        );

        assert_eq!(texts(source, &result), vec![("Joko Widodo", EntityType::Person)]);
        assert!(result[0].penalized);
    }

    #[test]
    fn test_splits_location_after_office_title() {
        let source = "Gubernur Jawa Barat Ridwan Kamil hadir";
        let result = normalizer().normalize(
            source,
            vec![cand(
                source,
                "Gubernur Jawa Barat Ridwan Kamil",
                EntityType::Person,
                0.8,
            )],
        );

        assert_eq!(
            texts(source, &result),
            vec![
                ("Jawa Barat", EntityType::Location),
                ("Ridwan Kamil", EntityType::Person),
            ]
        );
        assert!(result.iter().all(|c| c.penalized));
    }

    #[test]
    fn test_splits_location_inside_entity_after_outside_title() {
        let source = "Gubernur Jawa Barat Ridwan Kamil hadir";
        let n = normalizer();
        let result = n.normalize(
            source,
            vec![cand(source, "Jawa Barat Ridwan Kamil", EntityType::Person, 0.8)],
        );

        assert_eq!(
            texts(source, &result),
            vec![
                ("Jawa Barat", EntityType::Location),
                ("Ridwan Kamil", EntityType::Person),
            ]
        );
        assert_eq!(n.normalize(source, result.clone()), result);
    }

    #[test]
    fn test_place_named_person_without_title_is_kept() {
        let source = "kemarin Bandung Ridwan Kamil hadir";
        let result = normalizer().normalize(
            source,
            vec![cand(source, "Bandung Ridwan Kamil", EntityType::Person, 0.8)],
        );
        assert_eq!(
            texts(source, &result),
            vec![("Bandung Ridwan Kamil", EntityType::Person)]
        );
    }

    #[test]
    fn test_location_already_tagged_is_not_duplicated() {
        let source = "Gubernur Jawa Barat Ridwan Kamil hadir";
        let result = normalizer().normalize(
            source,
            vec![
                cand(source, "Jawa Barat", EntityType::Location, 0.95),
                cand(source, "Ridwan Kamil", EntityType::Person, 0.9),
            ],
        );

        assert_eq!(
            texts(source, &result),
            vec![
                ("Jawa Barat", EntityType::Location),
                ("Ridwan Kamil", EntityType::Person),
            ]
        );
        assert!(!result[0].penalized);
    }

    #[test]
    fn test_english_location_connector_trimmed() {
        let source = "Governor of West Java Ridwan Kamil";
        let normalizer = TitleNormalizer::new(Arc::new(TitleRuleTable::builtin().unwrap()), 4);
        let result = normalizer.normalize(
            source,
            vec![cand(source, "Ridwan Kamil", EntityType::Person, 0.9)],
        );

        assert_eq!(
            texts(source, &result),
            vec![
                ("West Java", EntityType::Location),
                ("Ridwan Kamil", EntityType::Person),
            ]
        );
    }

    #[test]
    fn test_retains_academic_title() {
        let source = "Dr. Siti Nurhaliza memberi kuliah";
        let result = normalizer().normalize(
            source,
            vec![cand(source, "Siti Nurhaliza", EntityType::Person, 0.9)],
        );

        assert_eq!(
            texts(source, &result),
            vec![("Dr. Siti Nurhaliza", EntityType::Person)]
        );
        assert!(!result[0].penalized);
    }

    #[test]
    fn test_retains_titles_and_stops_at_office() {
        let source = "Menteri Prof. Dr. Ir. Budi Santoso";
        let normalizer = TitleNormalizer::new(Arc::new(TitleRuleTable::builtin().unwrap()), 5);
        let result = normalizer.normalize(
            source,
            vec![cand(source, "Budi Santoso", EntityType::Person, 0.9)],
        );

        assert_eq!(
            texts(source, &result),
            vec![("Prof. Dr. Ir. Budi Santoso", EntityType::Person)]
        );
    }

    #[test]
    fn test_religious_title_retained() {
        let source = "KH. Ahmad Dahlan mendirikan Muhammadiyah";
        let result = normalizer().normalize(
            source,
            vec![cand(source, "Ahmad Dahlan", EntityType::Person, 0.9)],
        );

        assert_eq!(
            texts(source, &result),
            vec![("KH. Ahmad Dahlan", EntityType::Person)]
        );
    }

    #[test]
    fn test_context_window_limits_scan() {
        let source = "Prof. Dr. Ir. Budi Santoso";
        let normalizer = TitleNormalizer::new(Arc::new(TitleRuleTable::builtin().unwrap()), 1);
        let result = normalizer.normalize(
            source,
            vec![cand(source, "Budi Santoso", EntityType::Person, 0.9)],
        );

        assert_eq!(texts(source, &result), vec![("Ir. Budi Santoso", EntityType::Person)]);
    }

    #[test]
    fn test_scan_does_not_cross_previous_person() {
        let source = "Andi Dr. Budi";
        let result = normalizer().normalize(
            source,
            vec![
                cand(source, "Andi", EntityType::Person, 0.9),
                cand(source, "Budi", EntityType::Person, 0.9),
            ],
        );

        assert_eq!(
            texts(source, &result),
            vec![("Andi", EntityType::Person), ("Dr. Budi", EntityType::Person)]
        );
    }

    #[test]
    fn test_geographic_run_without_title_is_boundary() {
        let source = "warga Bandung Dr. Siti";
        let result = normalizer().normalize(
            source,
            vec![cand(source, "Siti", EntityType::Person, 0.9)],
        );

        assert_eq!(texts(source, &result), vec![("Dr. Siti", EntityType::Person)]);
    }

    #[test]
    fn test_empty_name_discarded() {
        let source = "Presiden meresmikan bendungan";
        let result = normalizer().normalize(
            source,
            vec![cand(source, "Presiden", EntityType::Person, 0.9)],
        );

        assert!(result.is_empty());
    }

    #[test]
    fn test_tie_policy_strips_ambiguous_title() {
        let table = TitleRuleTable::from_rules(vec![
            TitleRule::new("Rektor", TitleCategory::Academic),
            TitleRule::new("Rektor", TitleCategory::NonAcademic),
        ]);
        let normalizer = TitleNormalizer::new(Arc::new(table), 3);
        let source = "Rektor Ari Kuncoro";
        let result = normalizer.normalize(
            source,
            vec![cand(source, "Rektor Ari Kuncoro", EntityType::Person, 0.9)],
        );

        assert_eq!(texts(source, &result), vec![("Ari Kuncoro", EntityType::Person)]);
    }

    #[test]
    fn test_lineage_joins_person_entities() {
        let source = "Ahmad bin Yusuf ditahan";
        let result = normalizer().normalize(
            source,
            vec![
                cand(source, "Ahmad", EntityType::Person, 0.8),
                cand(source, "Yusuf", EntityType::Person, 0.6),
            ],
        );

        assert_eq!(
            texts(source, &result),
            vec![("Ahmad bin Yusuf", EntityType::Person)]
        );
        assert_eq!(result[0].scores, vec![0.8, 0.6]);
        assert!(!result[0].penalized);
    }

    #[test]
    fn test_lineage_joins_capitalized_segment() {
        let source = "Siti binti Abdullah Rahman bersaksi";
        let result = normalizer().normalize(
            source,
            vec![cand(source, "Siti", EntityType::Person, 0.8)],
        );

        assert_eq!(
            texts(source, &result),
            vec![("Siti binti Abdullah Rahman", EntityType::Person)]
        );
    }

    #[test]
    fn test_lineage_in_context_pulls_preceding_name() {
        let source = "Dr. Ahmad bin Yusuf";
        let result = normalizer().normalize(
            source,
            vec![cand(source, "Yusuf", EntityType::Person, 0.8)],
        );

        assert_eq!(
            texts(source, &result),
            vec![("Dr. Ahmad bin Yusuf", EntityType::Person)]
        );
    }

    #[test]
    fn test_non_person_entities_untouched() {
        let source = "Menteri Keuangan di Jakarta";
        let input = vec![cand(source, "Jakarta", EntityType::Location, 0.9)];
        let result = normalizer().normalize(source, input.clone());
        assert_eq!(result, input);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let cases = [
            ("Gubernur Jawa Barat Ridwan Kamil hadir", "Gubernur Jawa Barat Ridwan Kamil"),
            ("Presiden Joko Widodo", "Presiden Joko Widodo"),
            ("Dr. Siti Nurhaliza", "Siti Nurhaliza"),
            ("Dr. Ahmad bin Yusuf", "Yusuf"),
        ];

        let normalizer = normalizer();
        for (source, entity) in cases {
            let once = normalizer.normalize(
                source,
                vec![cand(source, entity, EntityType::Person, 0.9)],
            );
            let twice = normalizer.normalize(source, once.clone());
            assert_eq!(once, twice, "not idempotent for {source:?}");
        }
    }
}
