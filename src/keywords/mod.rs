//! Keyword extraction from free-text questions.
//!
//! The question is tagged, content words (nouns, proper nouns and optionally
//! verbs) are kept, normalized to their singular form and deduplicated in
//! first-seen order.

pub mod lexicon;
pub mod normalizer;

pub use lexicon::{LexiconTagger, Tag, Tagger, Token};
pub use normalizer::{KeywordNormalizer, LemmaTableNormalizer};

use crate::config::{ExtractorConfig, NumeralPolicy};
use crate::error::{NlqError, Result};
use itertools::Itertools;
use std::collections::HashSet;
use tracing::debug;

pub struct KeywordExtractor {
    tagger: Box<dyn Tagger>,
    normalizer: Box<dyn KeywordNormalizer>,
    config: ExtractorConfig,
    domain_terms: HashSet<String>,
}

impl KeywordExtractor {
    /// Extractor with the lexicon tagger and the lemma-table normalizer.
    pub fn new(config: ExtractorConfig) -> Self {
        let normalizer = LemmaTableNormalizer::new(config.min_strip_len);
        Self::with_strategies(config, Box::new(LexiconTagger::new()), Box::new(normalizer))
    }

    pub fn with_strategies(
        config: ExtractorConfig,
        tagger: Box<dyn Tagger>,
        normalizer: Box<dyn KeywordNormalizer>,
    ) -> Self {
        let domain_terms = config.domain_terms.iter().map(|t| t.to_lowercase()).collect();
        Self {
            tagger,
            normalizer,
            config,
            domain_terms,
        }
    }

    /// Extract keywords, failing with `NoKeywordsFound` when nothing survives.
    pub fn extract(&self, question: &str) -> Result<Vec<String>> {
        let tokens = self.tagger.tag(question);
        let mut keywords: Vec<String> = Vec::new();

        for token in &tokens {
            let lower = token.text.to_lowercase();
            if token.tag == Tag::Numeral {
                if self.config.numeral_policy == NumeralPolicy::Merge {
                    if let Some(last) = keywords.last_mut() {
                        last.push(' ');
                        last.push_str(&lower);
                    }
                }
                continue;
            }
            if self.domain_terms.contains(&lower) {
                keywords.push(self.normalizer.normalize(&lower));
                continue;
            }
            if !self.is_content(token) {
                continue;
            }
            keywords.push(self.normalizer.normalize(&lower));
        }

        let keywords: Vec<String> = keywords.into_iter().unique().collect();
        debug!("Extracted keywords from '{}': {:?}", question, keywords);

        if keywords.is_empty() {
            return Err(NlqError::NoKeywordsFound);
        }
        Ok(keywords)
    }

    fn is_content(&self, token: &Token) -> bool {
        let tag_kept = match token.tag {
            Tag::Noun | Tag::ProperNoun => true,
            Tag::Verb => self.config.include_verbs,
            Tag::Numeral | Tag::Stop => false,
        };
        tag_kept && token.text.chars().count() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(policy: NumeralPolicy) -> KeywordExtractor {
        KeywordExtractor::new(ExtractorConfig {
            numeral_policy: policy,
            ..ExtractorConfig::default()
        })
    }

    #[test]
    fn test_drops_numerals_by_default() {
        let keywords = extractor(NumeralPolicy::Drop)
            .extract("¿cuál es el comentario para la descarga 8621?")
            .unwrap();
        assert_eq!(keywords, vec!["comentario", "descarga"]);
    }

    #[test]
    fn test_merges_numerals_into_previous_keyword() {
        let keywords = extractor(NumeralPolicy::Merge)
            .extract("¿cuál es el comentario para la descarga 8621?")
            .unwrap();
        assert_eq!(keywords, vec!["comentario", "descarga 8621"]);
    }

    #[test]
    fn test_leading_numeral_is_dropped_even_when_merging() {
        let keywords = extractor(NumeralPolicy::Merge).extract("8621 comentario").unwrap();
        assert_eq!(keywords, vec!["comentario"]);
    }

    #[test]
    fn test_plurals_are_deduplicated() {
        let keywords = extractor(NumeralPolicy::Drop)
            .extract("descargas y descarga con comentarios en meses")
            .unwrap();
        assert_eq!(keywords, vec!["descarga", "comentario", "mes"]);
    }

    #[test]
    fn test_single_characters_and_stop_words_only() {
        let result = extractor(NumeralPolicy::Drop).extract("¿qué es x en la 42?");
        assert!(matches!(result, Err(NlqError::NoKeywordsFound)));
    }

    #[test]
    fn test_verbs_are_configurable() {
        let with_verbs = KeywordExtractor::new(ExtractorConfig {
            include_verbs: true,
            ..ExtractorConfig::default()
        });
        assert_eq!(
            with_verbs.extract("muestra la configuracion").unwrap(),
            vec!["muestra", "configuracion"]
        );
        assert_eq!(
            extractor(NumeralPolicy::Drop).extract("muestra la configuracion").unwrap(),
            vec!["configuracion"]
        );
    }

    #[test]
    fn test_domain_terms_survive_the_tagger() {
        struct EverythingIsStop;
        impl Tagger for EverythingIsStop {
            fn tag(&self, text: &str) -> Vec<Token> {
                text.split_whitespace()
                    .map(|w| Token { text: w.to_string(), tag: Tag::Stop })
                    .collect()
            }
        }
        let extractor = KeywordExtractor::with_strategies(
            ExtractorConfig::default(),
            Box::new(EverythingIsStop),
            Box::new(LemmaTableNormalizer::default()),
        );
        assert_eq!(extractor.extract("la inyección de hoy").unwrap(), vec!["inyección"]);
    }
}
