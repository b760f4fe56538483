//! Entity/relation extraction collaborator.
//!
//! The core consumes named entities plus a flat dependency-parse token
//! list through [`EntityParser`]. [`HeuristicParser`] is the built-in
//! offline adapter: capitalization-based entity spotting and a small
//! verb lexicon for subject/verb/object tagging. A production
//! deployment can plug a real NLP parser behind the same trait.

use std::collections::HashSet;

/// Grammatical role of a token relative to its head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepRel {
    /// Nominal subject
    Nsubj,
    /// Direct object
    Dobj,
    /// Prepositional object
    Pobj,
    Other,
}

/// Coarse part-of-speech tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosTag {
    Verb,
    Noun,
    /// Preposition / adposition
    Adp,
    Other,
}

/// One token of a dependency parse. `head` indexes into the owning
/// [`ParsedDoc::tokens`]; a root token points at itself.
#[derive(Debug, Clone)]
pub struct DepToken {
    pub text: String,
    pub lemma: String,
    pub pos: PosTag,
    pub dep: DepRel,
    pub head: usize,
}

/// Output of the external parser for one text.
#[derive(Debug, Clone, Default)]
pub struct ParsedDoc {
    /// Entity surface strings, in order of appearance.
    pub entities: Vec<String>,
    pub tokens: Vec<DepToken>,
}

/// Entity and dependency parsing contract.
pub trait EntityParser: Send + Sync {
    fn parse(&self, text: &str) -> ParsedDoc;
}

const PREPOSITIONS: &[&str] = &[
    "in", "on", "at", "of", "with", "to", "from", "by", "for", "into", "about",
];

/// (surface form, lemma) pairs for verbs the heuristic tagger knows.
const VERB_LEXICON: &[(&str, &str)] = &[
    ("is", "be"),
    ("are", "be"),
    ("was", "be"),
    ("were", "be"),
    ("has", "have"),
    ("have", "have"),
    ("had", "have"),
    ("founded", "found"),
    ("found", "find"),
    ("created", "create"),
    ("built", "build"),
    ("wrote", "write"),
    ("owns", "own"),
    ("owned", "own"),
    ("loves", "love"),
    ("likes", "like"),
    ("works", "work"),
    ("leads", "lead"),
    ("runs", "run"),
    ("makes", "make"),
    ("uses", "use"),
    ("sells", "sell"),
    ("bought", "buy"),
    ("acquired", "acquire"),
    ("joined", "join"),
    ("met", "meet"),
    ("knows", "know"),
    ("develops", "develop"),
    ("developed", "develop"),
    ("produces", "produce"),
    ("invented", "invent"),
    ("discovered", "discover"),
    ("published", "publish"),
    ("studies", "study"),
    ("teaches", "teach"),
    ("visited", "visit"),
    ("moved", "move"),
    ("became", "become"),
];

/// Offline heuristic parser: no models, no network.
#[derive(Debug, Default, Clone)]
pub struct HeuristicParser {
    stopwords: HashSet<&'static str>,
}

impl HeuristicParser {
    pub fn new() -> Self {
        let stopwords = [
            "and", "or", "but", "the", "a", "an", "this", "that", "these", "those", "it", "its",
            "he", "she", "they", "we", "you", "who", "what", "which", "where", "when", "how",
        ]
        .into_iter()
        .collect();
        Self { stopwords }
    }

    fn verb_lemma(word: &str) -> Option<&'static str> {
        VERB_LEXICON
            .iter()
            .find(|(surface, _)| *surface == word)
            .map(|(_, lemma)| *lemma)
    }

    fn is_entity_word(&self, word: &str) -> bool {
        word.chars().next().is_some_and(char::is_uppercase)
            && word.len() >= 2
            && !self.stopwords.contains(word.to_lowercase().as_str())
    }
}

impl EntityParser for HeuristicParser {
    fn parse(&self, text: &str) -> ParsedDoc {
        let raw_words: Vec<&str> = text.split_whitespace().collect();

        // Entities: maximal runs of capitalized non-stopword tokens.
        let mut entities = Vec::new();
        let mut seen = HashSet::new();
        let mut run: Vec<String> = Vec::new();
        for raw in &raw_words {
            let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
            if !word.is_empty() && self.is_entity_word(word) {
                run.push(word.to_string());
            } else if !run.is_empty() {
                let entity = run.join(" ");
                if seen.insert(entity.clone()) {
                    entities.push(entity);
                }
                run.clear();
            }
            // A sentence terminator also closes a run, handled above
            // because the trimmed word differs from the raw token only
            // in punctuation.
        }
        if !run.is_empty() {
            let entity = run.join(" ");
            if seen.insert(entity.clone()) {
                entities.push(entity);
            }
        }

        // Dependency tagging: one left-to-right pass per sentence.
        let mut tokens: Vec<DepToken> = Vec::new();
        let mut pending_subjects: Vec<usize> = Vec::new();
        let mut last_verb: Option<usize> = None;
        let mut after_preposition = false;

        for raw in &raw_words {
            let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
            if word.is_empty() {
                continue;
            }
            let idx = tokens.len();
            let lower = word.to_lowercase();

            if let Some(lemma) = Self::verb_lemma(&lower) {
                tokens.push(DepToken {
                    text: word.to_string(),
                    lemma: lemma.to_string(),
                    pos: PosTag::Verb,
                    dep: DepRel::Other,
                    head: idx,
                });
                for subject in pending_subjects.drain(..) {
                    tokens[subject].dep = DepRel::Nsubj;
                    tokens[subject].head = idx;
                }
                last_verb = Some(idx);
                after_preposition = false;
            } else if PREPOSITIONS.contains(&lower.as_str()) {
                tokens.push(DepToken {
                    text: word.to_string(),
                    lemma: lower.clone(),
                    pos: PosTag::Adp,
                    dep: DepRel::Other,
                    head: last_verb.unwrap_or(idx),
                });
                after_preposition = true;
            } else if self.stopwords.contains(lower.as_str()) {
                tokens.push(DepToken {
                    text: word.to_string(),
                    lemma: lower.clone(),
                    pos: PosTag::Other,
                    dep: DepRel::Other,
                    head: idx,
                });
            } else {
                let (dep, head) = match last_verb {
                    Some(verb) if after_preposition => (DepRel::Pobj, verb),
                    Some(verb) => (DepRel::Dobj, verb),
                    None => (DepRel::Other, idx),
                };
                tokens.push(DepToken {
                    text: word.to_string(),
                    lemma: lower.clone(),
                    pos: PosTag::Noun,
                    dep,
                    head,
                });
                if last_verb.is_none() {
                    pending_subjects.push(idx);
                }
            }

            // Sentence terminator resets clause state.
            if raw.ends_with(['.', '!', '?']) {
                pending_subjects.clear();
                last_verb = None;
                after_preposition = false;
            }
        }

        ParsedDoc { entities, tokens }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_capitalized_entities() {
        let parser = HeuristicParser::new();
        let parsed = parser.parse("Marie Curie discovered radium in Paris.");
        assert!(parsed.entities.contains(&"Marie Curie".to_string()));
        assert!(parsed.entities.contains(&"Paris".to_string()));
    }

    #[test]
    fn stopwords_are_not_entities() {
        let parser = HeuristicParser::new();
        let parsed = parser.parse("The cat sat. Which one?");
        assert!(parsed.entities.is_empty());
    }

    #[test]
    fn tags_subject_verb_object() {
        let parser = HeuristicParser::new();
        let parsed = parser.parse("Paris founded France.");

        let subj = parsed.tokens.iter().find(|t| t.text == "Paris").unwrap();
        assert_eq!(subj.dep, DepRel::Nsubj);
        assert_eq!(parsed.tokens[subj.head].pos, PosTag::Verb);
        assert_eq!(parsed.tokens[subj.head].lemma, "found");

        let obj = parsed.tokens.iter().find(|t| t.text == "France").unwrap();
        assert_eq!(obj.dep, DepRel::Dobj);
        assert_eq!(obj.head, subj.head);
    }

    #[test]
    fn noun_after_preposition_is_pobj() {
        let parser = HeuristicParser::new();
        let parsed = parser.parse("Alice works in Berlin");
        let pobj = parsed.tokens.iter().find(|t| t.text == "Berlin").unwrap();
        assert_eq!(pobj.dep, DepRel::Pobj);
    }

    #[test]
    fn sentence_boundary_resets_clause_state() {
        let parser = HeuristicParser::new();
        let parsed = parser.parse("Alice works. Berlin");
        let berlin = parsed.tokens.iter().find(|t| t.text == "Berlin").unwrap();
        // Berlin belongs to a new clause with no verb, so it has no object role
        assert_eq!(berlin.dep, DepRel::Other);
    }

    #[test]
    fn duplicate_entities_are_reported_once() {
        let parser = HeuristicParser::new();
        let parsed = parser.parse("Paris is Paris");
        assert_eq!(
            parsed.entities.iter().filter(|e| *e == "Paris").count(),
            1
        );
    }

    #[test]
    fn empty_text_parses_to_nothing() {
        let parser = HeuristicParser::new();
        let parsed = parser.parse("");
        assert!(parsed.entities.is_empty());
        assert!(parsed.tokens.is_empty());
    }
}
