//! Lexicon-based part-of-speech tagging.
//!
//! A deliberately small classifier: stop-words for Spanish and English, a list
//! of request verbs, and shape rules for numerals and proper nouns. A real
//! morphological tagger can replace it through the [`Tagger`] trait.

use lazy_static::lazy_static;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Noun,
    ProperNoun,
    Verb,
    Numeral,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub tag: Tag,
}

pub trait Tagger: Send + Sync {
    fn tag(&self, text: &str) -> Vec<Token>;
}

lazy_static! {
    static ref STOP_WORDS: HashSet<&'static str> = [
        // Spanish
        "a", "al", "algo", "algún", "alguna", "algunas", "alguno", "algunos", "ante", "antes",
        "aquel", "aquella", "aquellas", "aquellos", "aquí", "así", "bajo", "bien", "cada",
        "como", "cómo", "con", "contra", "cual", "cuál", "cuales", "cuáles", "cuando",
        "cuándo", "cuanta", "cuánta", "cuantas", "cuántas", "cuanto", "cuánto", "cuantos",
        "cuántos", "de", "del", "desde", "donde", "dónde", "durante", "e", "el", "él", "ella",
        "ellas", "ellos", "en", "entre", "era", "eran", "es", "esa", "esas", "ese", "eso",
        "esos", "esta", "está", "estaba", "estado", "están", "estas", "este", "esto", "estos",
        "fue", "fueron", "ha", "había", "han", "hasta", "hay", "hubo", "la", "las", "le", "les",
        "lo", "los", "más", "me", "mi", "mis", "mucho", "muy", "nada", "ni", "no", "nos",
        "o", "otra", "otro", "para", "pero", "poco", "por", "porque", "que", "qué", "quien",
        "quién", "quienes", "se", "sea", "según", "ser", "si", "sí", "sido", "sin", "sobre",
        "son", "su", "sus", "también", "tan", "te", "todo", "todos", "tu", "tus", "u", "un",
        "una", "unas", "uno", "unos", "y", "ya", "yo",
        // English
        "about", "all", "an", "and", "any", "are", "as", "at", "be", "been", "by", "can",
        "could", "did", "do", "does", "for", "from", "had", "has", "have", "how", "i", "in",
        "into", "is", "it", "its", "many", "me", "much", "my", "of", "on", "or", "please",
        "should", "some", "than", "that", "the", "their", "there", "these", "this", "those",
        "to", "was", "were", "what", "when", "where", "which", "who", "why", "will", "with",
        "would", "you", "your",
    ]
    .into_iter()
    .collect();

    static ref REQUEST_VERBS: HashSet<&'static str> = [
        "busca", "buscar", "dame", "dime", "encuentra", "lista", "listar", "mostrar",
        "muestra", "muéstrame", "quiero", "saber", "tiene", "tienen", "tuvo", "ver",
        "find", "get", "give", "list", "show", "tell", "want",
    ]
    .into_iter()
    .collect();
}

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Tags tokens from fixed word lists and token shape.
#[derive(Debug, Clone, Default)]
pub struct LexiconTagger;

impl LexiconTagger {
    pub fn new() -> Self {
        Self
    }

    fn classify(word: &str, sentence_initial: bool) -> Tag {
        let lower = word.to_lowercase();
        if word.chars().all(|c| c.is_ascii_digit()) {
            Tag::Numeral
        } else if STOP_WORDS.contains(lower.as_str()) {
            Tag::Stop
        } else if REQUEST_VERBS.contains(lower.as_str()) {
            Tag::Verb
        } else if !sentence_initial && word.chars().next().map_or(false, char::is_uppercase) {
            Tag::ProperNoun
        } else {
            Tag::Noun
        }
    }
}

impl Tagger for LexiconTagger {
    fn tag(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut sentence_initial = true;
        let mut current = String::new();

        let mut flush = |current: &mut String, sentence_initial: &mut bool| {
            if !current.is_empty() {
                let word = std::mem::take(current);
                let tag = Self::classify(&word, *sentence_initial);
                tokens.push(Token { text: word, tag });
                *sentence_initial = false;
            }
        };

        for c in text.chars() {
            if c.is_alphanumeric() || c == '_' {
                current.push(c);
            } else {
                flush(&mut current, &mut sentence_initial);
                if matches!(c, '.' | '?' | '!' | '¿' | '¡') {
                    sentence_initial = true;
                }
            }
        }
        flush(&mut current, &mut sentence_initial);
        tokens
    }
}
