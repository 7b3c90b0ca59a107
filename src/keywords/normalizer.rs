use std::collections::HashMap;

/// Strategy turning an extracted word into its keyword form (singular lemma).
pub trait KeywordNormalizer: Send + Sync {
    fn normalize(&self, word: &str) -> String;
}

/// Lemma lookup with a suffix-stripping fallback.
///
/// When the table leaves a word unchanged, a trailing `es` (else `s`) is
/// stripped, but only from words longer than `min_strip_len` characters so
/// short words such as "mes" survive.
#[derive(Debug, Clone)]
pub struct LemmaTableNormalizer {
    lemmas: HashMap<String, String>,
    min_strip_len: usize,
}

impl Default for LemmaTableNormalizer {
    fn default() -> Self {
        Self::new(3)
    }
}

impl LemmaTableNormalizer {
    pub fn new(min_strip_len: usize) -> Self {
        let lemmas = [
            ("meses", "mes"),
            ("inyecciones", "inyección"),
            ("configuraciones", "configuración"),
            ("potencias", "potencia"),
            ("series", "serie"),
            ("análisis", "análisis"),
            ("gas", "gas"),
            ("bias", "bias"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { lemmas, min_strip_len }
    }

    pub fn with_lemma(mut self, word: &str, lemma: &str) -> Self {
        self.lemmas.insert(word.to_lowercase(), lemma.to_lowercase());
        self
    }

    fn strip_plural(&self, word: &str) -> String {
        if word.chars().count() <= self.min_strip_len {
            return word.to_string();
        }
        if let Some(stem) = word.strip_suffix("es") {
            stem.to_string()
        } else if let Some(stem) = word.strip_suffix('s') {
            stem.to_string()
        } else {
            word.to_string()
        }
    }
}

impl KeywordNormalizer for LemmaTableNormalizer {
    fn normalize(&self, word: &str) -> String {
        let lower = word.to_lowercase();
        match self.lemmas.get(&lower) {
            Some(lemma) => lemma.clone(),
            None => self.strip_plural(&lower),
        }
    }
}
