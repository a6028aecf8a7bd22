//! Dictionary and pattern tagger
//!
//! A [`TaggingBackend`] that needs no model server: known places and
//! institutions come from a dictionary, organization names from regex
//! patterns, and remaining runs of capitalized words are tagged as persons.
//! Output is token-level BIO spans, exactly like a sequence tagger, so the
//! full normalization pipeline applies to it.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use regex::Regex;

use lexicon_core::{EntityType, Result, Span, SpanLabel, TaggingBackend};

use crate::tokens::{tokenize, Token};

/// Dictionary entry for entity matching
#[derive(Debug, Clone)]
pub struct DictionaryEntry {
    pub term: String,
    pub entity_type: EntityType,
}

/// A token range claimed by one rule
#[derive(Debug, Clone, Copy)]
struct Claim {
    first: usize,
    last: usize,
    entity_type: EntityType,
    confidence: f32,
}

/// Rule-based tagger using a gazetteer, regex patterns and capitalization
pub struct GazetteerTagger {
    model_id: String,
    /// Pattern rules (regex -> entity type)
    patterns: Vec<(Regex, EntityType, f32)>,
    /// Dictionary of known terms
    dictionary: HashMap<String, DictionaryEntry>,
    /// Lookup index (lowercase token sequence -> (entry key, is alias))
    lookup: HashMap<Vec<String>, (String, bool)>,
    /// Longest dictionary term, in tokens
    max_term_len: usize,
    /// Capitalized words that never start or continue a person name
    stopwords: HashSet<String>,
    /// Score for capitalization-based person runs
    person_confidence: f32,
}

impl GazetteerTagger {
    /// Create a tagger with the default Indonesian gazetteer
    pub fn new() -> Self {
        let mut tagger = Self {
            model_id: "gazetteer-id-v1".to_string(),
            patterns: Vec::new(),
            dictionary: HashMap::new(),
            lookup: HashMap::new(),
            max_term_len: 0,
            stopwords: HashSet::new(),
            person_confidence: 0.75,
        };

        tagger.init_patterns();
        tagger.init_dictionary();
        tagger.init_stopwords();
        tagger
    }

    /// Override the model identifier reported in fingerprints
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    fn init_patterns(&mut self) {
        // Companies
        self.add_pattern(r"\b(?:PT|CV)\.?(?:\s+[A-Z][A-Za-z&]*)+", EntityType::Organization, 0.9);
        self.add_pattern(r"\bTbk\b", EntityType::Organization, 0.85);

        // Courts and prosecution offices with their seat
        self.add_pattern(
            r"\b(?:Pengadilan|Kejaksaan)\s+(?:Negeri|Tinggi|Agama|Tata\s+Usaha\s+Negara)(?:\s+[A-Z][a-z]+)+",
            EntityType::Organization,
            0.9,
        );

        // Ministries, universities and parties
        self.add_pattern(
            r"\b(?:Kementerian|Universitas|Partai|Institut|Badan|Dinas)(?:\s+[A-Z][a-z]+)+",
            EntityType::Organization,
            0.85,
        );
    }

    fn init_dictionary(&mut self) {
        // Provinces and regions
        self.add_term("Jawa Barat", EntityType::Location, vec!["Jabar"]);
        self.add_term("Jawa Tengah", EntityType::Location, vec!["Jateng"]);
        self.add_term("Jawa Timur", EntityType::Location, vec!["Jatim"]);
        self.add_term("DKI Jakarta", EntityType::Location, vec!["Jakarta"]);
        self.add_term("DI Yogyakarta", EntityType::Location, vec!["Yogyakarta", "Jogja", "Yogya"]);
        self.add_term("Sumatera Utara", EntityType::Location, vec!["Sumut"]);
        self.add_term("Sumatera Barat", EntityType::Location, vec!["Sumbar"]);
        self.add_term("Sulawesi Selatan", EntityType::Location, vec!["Sulsel"]);
        self.add_term("Kalimantan Timur", EntityType::Location, vec!["Kaltim"]);
        self.add_term("Nusa Tenggara Barat", EntityType::Location, vec!["NTB"]);
        self.add_term("Nusa Tenggara Timur", EntityType::Location, vec!["NTT"]);
        self.add_term("Bali", EntityType::Location, vec![]);
        self.add_term("Banten", EntityType::Location, vec![]);
        self.add_term("Aceh", EntityType::Location, vec![]);
        self.add_term("Papua", EntityType::Location, vec![]);
        self.add_term("Indonesia", EntityType::Location, vec![]);

        // Cities
        for city in [
            "Bandung", "Surabaya", "Semarang", "Medan", "Makassar", "Palembang", "Denpasar",
            "Malang", "Bogor", "Depok", "Bekasi", "Tangerang", "Padang", "Manado", "Solo",
        ] {
            self.add_term(city, EntityType::Location, vec![]);
        }

        // State institutions
        self.add_term("Mahkamah Agung", EntityType::Organization, vec!["MA"]);
        self.add_term("Mahkamah Konstitusi", EntityType::Organization, vec!["MK"]);
        self.add_term(
            "Komisi Pemberantasan Korupsi",
            EntityType::Organization,
            vec!["KPK"],
        );
        self.add_term("Kejaksaan Agung", EntityType::Organization, vec!["Kejagung"]);
        self.add_term("Dewan Perwakilan Rakyat", EntityType::Organization, vec!["DPR"]);
        self.add_term(
            "Kepolisian Negara Republik Indonesia",
            EntityType::Organization,
            vec!["Polri"],
        );
        self.add_term("Tentara Nasional Indonesia", EntityType::Organization, vec!["TNI"]);
        self.add_term("Bank Indonesia", EntityType::Organization, vec!["BI"]);
        self.add_term("Badan Pemeriksa Keuangan", EntityType::Organization, vec!["BPK"]);
    }

    fn init_stopwords(&mut self) {
        for word in [
            // Function words that start sentences
            "Dalam", "Pada", "Di", "Ke", "Dari", "Yang", "Dan", "Atau", "Atas", "Oleh", "Untuk",
            "Dengan", "Bahwa", "Namun", "Sementara", "Kemudian", "Saat", "Ini", "Itu", "Para",
            "The", "A", "An", "In", "On", "At", "Of", "And", "For", "This", "That",
            // Courtroom vocabulary
            "Terdakwa", "Penggugat", "Tergugat", "Pemohon", "Termohon", "Pelapor", "Terlapor",
            "Hakim", "Jaksa", "Penuntut", "Umum", "Kuasa", "Hukum", "Pengacara", "Advokat",
            "Saksi", "Majelis", "Sidang", "Perkara", "Putusan", "Nomor", "Pasal",
            "Defendant", "Plaintiff", "Attorney", "Judge", "Court", "Prosecutor", "Witness",
            // Forms of address
            "Bapak", "Ibu", "Pak", "Bu", "Saudara", "Saudari", "Mr", "Mrs", "Ms",
        ] {
            self.stopwords.insert(word.to_lowercase());
        }
    }

    /// Add a regex pattern
    fn add_pattern(&mut self, pattern: &str, entity_type: EntityType, confidence: f32) {
        if let Ok(regex) = Regex::new(pattern) {
            self.patterns.push((regex, entity_type, confidence));
        }
    }

    /// Add a dictionary term
    fn add_term(&mut self, term: &str, entity_type: EntityType, aliases: Vec<&str>) {
        let mut index = |words: &str, alias: bool| {
            let key: Vec<String> = words.split_whitespace().map(str::to_lowercase).collect();
            self.max_term_len = self.max_term_len.max(key.len());
            self.lookup.insert(key, (term.to_string(), alias));
        };

        index(term, false);
        for alias in aliases {
            index(alias, true);
        }

        self.dictionary.insert(
            term.to_string(),
            DictionaryEntry {
                term: term.to_string(),
                entity_type,
            },
        );
    }

    /// Claims from regex patterns
    fn claims_by_patterns(&self, text: &str, tokens: &[Token<'_>]) -> Vec<Claim> {
        let mut claims = Vec::new();

        for (regex, entity_type, confidence) in &self.patterns {
            for mat in regex.find_iter(text) {
                let covered: Vec<usize> = (0..tokens.len())
                    .filter(|&i| tokens[i].overlaps(mat.start(), mat.end()))
                    .collect();
                if let (Some(&first), Some(&last)) = (covered.first(), covered.last()) {
                    claims.push(Claim {
                        first,
                        last,
                        entity_type: *entity_type,
                        confidence: *confidence,
                    });
                }
            }
        }

        claims
    }

    /// Claims from dictionary lookup, longest term first
    fn claims_by_dictionary(&self, tokens: &[Token<'_>]) -> Vec<Claim> {
        let words: Vec<String> = tokens.iter().map(|t| t.text.to_lowercase()).collect();
        let mut claims = Vec::new();

        let mut i = 0;
        while i < words.len() {
            let longest = self.max_term_len.min(words.len() - i);
            let hit = (1..=longest).rev().find_map(|len| {
                self.lookup
                    .get(&words[i..i + len])
                    .map(|(term, alias)| (len, term, *alias))
            });

            match hit {
                Some((len, term, alias)) => {
                    if let Some(entry) = self.dictionary.get(term) {
                        claims.push(Claim {
                            first: i,
                            last: i + len - 1,
                            entity_type: entry.entity_type,
                            confidence: if alias { 0.9 } else { 0.95 },
                        });
                    }
                    i += len;
                }
                None => i += 1,
            }
        }

        claims
    }

    /// Remove overlapping claims, keeping the highest confidence
    fn deduplicate(&self, mut claims: Vec<Claim>) -> Vec<Claim> {
        // Sort by start position, then by confidence (descending), then longest
        claims.sort_by(|a, b| {
            a.first
                .cmp(&b.first)
                .then(b.confidence.total_cmp(&a.confidence))
                .then(b.last.cmp(&a.last))
        });

        let mut result: Vec<Claim> = Vec::new();
        for claim in claims {
            let overlaps = result
                .iter()
                .any(|kept| claim.first <= kept.last && kept.first <= claim.last);
            if !overlaps {
                result.push(claim);
            }
        }

        result.sort_by_key(|c| c.first);
        result
    }

    fn is_person_word(&self, token: &Token<'_>) -> bool {
        token.is_capitalized() && !self.stopwords.contains(&token.text.to_lowercase())
    }

    /// Tag `text` synchronously
    pub fn tag_text(&self, text: &str) -> Vec<Span> {
        let tokens = tokenize(text);
        let mut claims = self.claims_by_patterns(text, &tokens);
        claims.extend(self.claims_by_dictionary(&tokens));
        let claims = self.deduplicate(claims);

        let mut labels: Vec<(SpanLabel, f32)> = vec![(SpanLabel::Outside, 1.0); tokens.len()];
        for claim in &claims {
            labels[claim.first] = (SpanLabel::Begin(claim.entity_type), claim.confidence);
            for label in &mut labels[claim.first + 1..=claim.last] {
                *label = (SpanLabel::Inside(claim.entity_type), claim.confidence);
            }
        }

        // Remaining capitalized runs are person names
        let mut in_run = false;
        for (i, token) in tokens.iter().enumerate() {
            let free = labels[i].0 == SpanLabel::Outside;
            if free && self.is_person_word(token) {
                let label = if in_run {
                    SpanLabel::Inside(EntityType::Person)
                } else {
                    SpanLabel::Begin(EntityType::Person)
                };
                labels[i] = (label, self.person_confidence);
                in_run = !token.closes_phrase;
            } else {
                in_run = false;
            }
        }

        tokens
            .iter()
            .zip(labels)
            .map(|(token, (label, score))| {
                Span::new(token.start, token.end, token.text, label, score)
            })
            .collect()
    }
}

impl Default for GazetteerTagger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaggingBackend for GazetteerTagger {
    async fn tag(&self, text: &str) -> Result<Vec<Span>> {
        Ok(self.tag_text(text))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::SpanMerger;

    fn entities(text: &str) -> Vec<(String, EntityType)> {
        let tagger = GazetteerTagger::new();
        let spans = tagger.tag_text(text);
        SpanMerger::new()
            .merge(text, &spans)
            .into_iter()
            .map(|c| (c.text(text).to_string(), c.entity_type))
            .collect()
    }

    #[test]
    fn test_dictionary_locations() {
        let found = entities("Gubernur Jawa Barat Ridwan Kamil berkunjung ke Bandung");
        assert_eq!(
            found,
            vec![
                ("Gubernur".to_string(), EntityType::Person),
                ("Jawa Barat".to_string(), EntityType::Location),
                ("Ridwan Kamil".to_string(), EntityType::Person),
                ("Bandung".to_string(), EntityType::Location),
            ]
        );
    }

    #[test]
    fn test_alias_lookup() {
        let found = entities("Penyidik KPK memeriksa saksi di Jakarta");
        assert!(found.contains(&("KPK".to_string(), EntityType::Organization)));
        assert!(found.contains(&("Jakarta".to_string(), EntityType::Location)));
    }

    #[test]
    fn test_alias_scores_below_full_term() {
        let tagger = GazetteerTagger::new();
        let score = |text: &str, word: &str| {
            tagger
                .tag_text(text)
                .into_iter()
                .find(|span| span.text == word)
                .map(|span| span.score)
        };
        assert_eq!(score("Banjir melanda Jabar", "Jabar"), Some(0.9));
        assert_eq!(score("Banjir melanda Bandung", "Bandung"), Some(0.95));
    }

    #[test]
    fn test_organization_patterns() {
        let found = entities("Direksi PT Maju Bersama digugat di Pengadilan Negeri Jakarta Selatan");
        assert!(found.contains(&("PT Maju Bersama".to_string(), EntityType::Organization)));
        assert!(found.contains(&(
            "Pengadilan Negeri Jakarta Selatan".to_string(),
            EntityType::Organization
        )));
    }

    #[test]
    fn test_stopwords_are_not_names() {
        let found = entities("Terdakwa Budi Santoso didampingi pengacara");
        assert_eq!(found, vec![("Budi Santoso".to_string(), EntityType::Person)]);
    }

    #[test]
    fn test_lineage_marker_left_outside() {
        let tagger = GazetteerTagger::new();
        let text = "Ahmad bin Yusuf";
        let spans = tagger.tag_text(text);

        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].label, SpanLabel::Begin(EntityType::Person));
        assert_eq!(spans[1].label, SpanLabel::Outside);
        assert_eq!(spans[2].label, SpanLabel::Begin(EntityType::Person));
    }

    #[test]
    fn test_comma_breaks_person_run() {
        let found = entities("Andi Wijaya, Budi Santoso");
        assert_eq!(
            found,
            vec![
                ("Andi Wijaya".to_string(), EntityType::Person),
                ("Budi Santoso".to_string(), EntityType::Person),
            ]
        );
    }

    #[tokio::test]
    async fn test_backend_trait() {
        let tagger = GazetteerTagger::new().with_model_id("test-gazetteer");
        assert_eq!(tagger.model_id(), "test-gazetteer");
        assert!(tagger.is_ready());

        let texts = vec!["Joko Widodo".to_string(), "di Bandung".to_string()];
        let batch = tagger.tag_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1][1].label, SpanLabel::Begin(EntityType::Location));
    }
}
