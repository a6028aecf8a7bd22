//! Raw spans to final entities
//!
//! `SpanMerger` -> `TitleNormalizer` -> `ConfidenceAggregator`

use std::sync::Arc;

use lexicon_core::{Entity, EntityType, Span};

use crate::confidence::ConfidenceAggregator;
use crate::merge::SpanMerger;
use crate::normalizer::TitleNormalizer;
use crate::titles::TitleRuleTable;
use crate::Candidate;

/// Entity post-processing pipeline
#[derive(Debug, Clone)]
pub struct EntityPipeline {
    merger: SpanMerger,
    normalizer: TitleNormalizer,
    aggregator: ConfidenceAggregator,
    /// Texts shorter than this many characters produce no entities
    min_text_length: usize,
}

impl EntityPipeline {
    pub fn new(
        table: Arc<TitleRuleTable>,
        context_window: usize,
        title_penalty: f32,
        min_text_length: usize,
    ) -> Self {
        Self {
            merger: SpanMerger::new(),
            normalizer: TitleNormalizer::new(table, context_window),
            aggregator: ConfidenceAggregator::new(title_penalty),
            min_text_length,
        }
    }

    /// Whether `text` is too short to be worth tagging
    pub fn is_too_short(&self, text: &str) -> bool {
        text.chars().count() < self.min_text_length
    }

    /// Merge and normalize, keeping per-token scores
    pub fn candidates(&self, source: &str, spans: &[Span]) -> Vec<Candidate> {
        let merged = self.merger.merge(source, spans);
        self.normalizer.normalize(source, merged)
    }

    /// Full pipeline: ordered entities with aggregated confidence
    pub fn process(&self, source: &str, spans: &[Span]) -> Vec<Entity> {
        if self.is_too_short(source) {
            return Vec::new();
        }

        self.candidates(source, spans)
            .iter()
            .map(|c| {
                Entity::from_source(
                    source,
                    c.entity_type,
                    c.start,
                    c.end,
                    self.aggregator.aggregate(c),
                )
            })
            .collect()
    }

    /// Person names found in `source`, in order of appearance
    pub fn person_names(&self, source: &str, spans: &[Span]) -> Vec<String> {
        self.process(source, spans)
            .into_iter()
            .filter(|e| e.entity_type == EntityType::Person)
            .map(|e| e.text)
            .collect()
    }

    pub fn normalizer(&self) -> &TitleNormalizer {
        &self.normalizer
    }

    pub fn rules_digest(&self) -> &str {
        self.normalizer.table().digest()
    }

    pub fn context_window(&self) -> usize {
        self.normalizer.context_window()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexicon_core::SpanLabel;
    use proptest::prelude::*;

    fn pipeline() -> EntityPipeline {
        EntityPipeline::new(Arc::new(TitleRuleTable::builtin().unwrap()), 3, 0.05, 3)
    }

    /// Tag every whitespace token of `source` with the given labels
    fn tagged(source: &str, labels: &[&str]) -> Vec<Span> {
        let mut offset = 0;
        source
            .split_whitespace()
            .zip(labels)
            .map(|(word, label)| {
                let start = offset + source[offset..].find(word).unwrap();
                offset = start + word.len();
                Span::new(start, offset, word, label.parse().unwrap(), 0.9)
            })
            .collect()
    }

    #[test]
    fn test_presiden_example() {
        let source = "Presiden Joko Widodo";
        let spans = tagged(source, &["B-PER", "I-PER", "I-PER"]);
        let entities = pipeline().process(source, &spans);

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "Joko Widodo");
        assert_eq!(entities[0].entity_type, EntityType::Person);
        assert!((entities[0].confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_gubernur_example() {
        let source = "Gubernur Jawa Barat Ridwan Kamil";
        let spans = tagged(source, &["B-PER", "I-PER", "I-PER", "I-PER", "I-PER"]);
        let entities = pipeline().process(source, &spans);

        let found: Vec<(&str, EntityType)> = entities
            .iter()
            .map(|e| (e.text.as_str(), e.entity_type))
            .collect();
        assert_eq!(
            found,
            vec![
                ("Jawa Barat", EntityType::Location),
                ("Ridwan Kamil", EntityType::Person),
            ]
        );
    }

    #[test]
    fn test_doctor_example() {
        let source = "Dr. Siti Nurhaliza";
        let spans = tagged(source, &["O", "B-PER", "I-PER"]);
        let entities = pipeline().process(source, &spans);

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "Dr. Siti Nurhaliza");
        assert!((entities[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_short_text_yields_nothing() {
        let spans = vec![Span::new(0, 2, "Al", SpanLabel::Begin(EntityType::Person), 0.9)];
        assert!(pipeline().process("Al", &spans).is_empty());
    }

    #[test]
    fn test_person_names() {
        let source = "Andi dan Budi";
        let spans = tagged(source, &["B-PER", "O", "B-PER"]);
        assert_eq!(pipeline().person_names(source, &spans), vec!["Andi", "Budi"]);
    }

    const VOCAB: &[&str] = &[
        "Presiden", "Gubernur", "Wakil", "Menteri", "Dr.", "Prof.", "H.", "bin", "binti",
        "Jawa", "Barat", "of", "West", "Java", "Joko", "Widodo", "Siti", "Ahmad", "Yusuf",
        "Ridwan", "Kamil", "dan", "di", "Bandung", "Rektor", "S.H.", "Governor",
    ];
    const LABELS: &[&str] = &["O", "B-PER", "I-PER", "B-LOC", "I-LOC", "B-ORG"];

    fn arb_tagged_text() -> impl Strategy<Value = (String, Vec<Span>)> {
        prop::collection::vec((0..VOCAB.len(), 0..LABELS.len(), 0.0f32..=1.0), 1..12).prop_map(
            |items| {
                let mut source = String::new();
                let mut spans = Vec::new();
                for (word, label, score) in items {
                    if !source.is_empty() {
                        source.push(' ');
                    }
                    let start = source.len();
                    source.push_str(VOCAB[word]);
                    spans.push(Span::new(
                        start,
                        source.len(),
                        VOCAB[word],
                        LABELS[label].parse().unwrap(),
                        score,
                    ));
                }
                (source, spans)
            },
        )
    }

    proptest! {
        #[test]
        fn prop_normalization_is_idempotent((source, spans) in arb_tagged_text()) {
            let pipeline = pipeline();
            let once = pipeline.candidates(&source, &spans);
            let twice = pipeline.normalizer().normalize(&source, once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_entities_valid_and_non_overlapping((source, spans) in arb_tagged_text()) {
            let entities = pipeline().process(&source, &spans);
            for entity in &entities {
                prop_assert!(entity.start < entity.end);
                prop_assert!(entity.end <= source.len());
                prop_assert_eq!(&source[entity.start..entity.end], entity.text.as_str());
                prop_assert!((0.0..=1.0).contains(&entity.confidence));
            }
            for (i, a) in entities.iter().enumerate() {
                for b in &entities[i + 1..] {
                    prop_assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
                }
            }
        }
    }
}
