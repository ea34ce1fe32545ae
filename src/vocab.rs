use once_cell::sync::Lazy;
use regex::Regex;

/// Locale used when a requested tag has no registered table
pub const DEFAULT_LOCALE: &str = "en-US";

/// Named vocabulary categories, in table order
///
/// Order matters: the Swedish title-case pass walks the categories in the
/// order they appear in the table, so reordering changes output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Spelled-out small numbers
    Numbers,
    /// Weekday and month names
    Dates,
    /// Everyday greetings and courtesy phrases
    CommonPhrases,
    /// Formal connective phrases
    FormalPhrases,
    /// Emotion words
    Emotions,
    /// Interrogative words, anchored to end of utterance
    QuestionWords,
    /// Exclamation triggers, anchored to end of utterance
    Exclamations,
    /// Reporting verb + optional connective + reported clause
    Quotations,
    /// Coordinating and subordinating conjunctions
    Conjunctions,
}

/// Per-locale mapping from category to compiled pattern
pub struct Vocabulary {
    /// Locale tag, e.g. "sv-SE"
    pub tag: &'static str,
    /// Human-readable locale name, used in export filenames
    pub display_name: &'static str,
    categories: Vec<(Category, Regex)>,
    /// Bare conjunction alternation, without the `\b` anchoring of the
    /// compiled category pattern. The comma-insertion rule is built from
    /// this at table-construction time.
    conjunction_spacing: Regex,
}

impl Vocabulary {
    /// Pattern for a single category, if the locale defines it
    #[must_use]
    pub fn category(&self, which: Category) -> Option<&Regex> {
        self.categories
            .iter()
            .find(|(cat, _)| *cat == which)
            .map(|(_, re)| re)
    }

    /// All categories in table order
    pub fn categories(&self) -> impl Iterator<Item = &(Category, Regex)> {
        self.categories.iter()
    }

    /// Conjunction pattern flanked by whitespace instead of `\b` anchors,
    /// used for comma insertion
    #[must_use]
    pub const fn conjunction_spacing(&self) -> &Regex {
        &self.conjunction_spacing
    }
}

const SV_CONJUNCTIONS: &str =
    "och|eller|men|för|att|eftersom|därför|så|när|om|innan|efter|sedan|fastän|trots";
const EN_CONJUNCTIONS: &str =
    "and|or|but|because|since|as|so|when|if|while|after|before|though|although";

struct CategorySpec {
    category: Category,
    pattern: String,
}

fn word_list(category: Category, words: &str) -> CategorySpec {
    CategorySpec {
        category,
        pattern: format!(r"(?i)\b({words})\b"),
    }
}

/// Word list that only matches when no terminal punctuation follows it, so
/// the match runs to the end of the utterance
fn tail_word_list(category: Category, words: &str) -> CategorySpec {
    CategorySpec {
        category,
        pattern: format!(r"(?i)\b({words})\b[^.!?]*$"),
    }
}

fn quotation_list(verbs: &str, connective: &str) -> CategorySpec {
    CategorySpec {
        category: Category::Quotations,
        pattern: format!(r"(?i)\b({verbs})\b\s+({connective}\s+)?([^.!?]+)"),
    }
}

fn swedish_specs() -> Vec<CategorySpec> {
    vec![
        word_list(
            Category::Numbers,
            "ett|två|tre|fyra|fem|sex|sju|åtta|nio|tio",
        ),
        word_list(
            Category::Dates,
            "måndag|tisdag|onsdag|torsdag|fredag|lördag|söndag\
             |januari|februari|mars|april|maj|juni|juli|augusti\
             |september|oktober|november|december",
        ),
        word_list(
            Category::CommonPhrases,
            "godmorgon|goddag|godkväll|hejdå|tack|varsågod|förlåt|ursäkta|snälla|vänligen",
        ),
        word_list(
            Category::FormalPhrases,
            "härmed|således|följaktligen|dessutom|emellertid|dock|samt|även|enligt|beträffande",
        ),
        word_list(
            Category::Emotions,
            "glad|ledsen|arg|rädd|överraskad|trött|stressad|lugn|orolig|nöjd",
        ),
        tail_word_list(
            Category::QuestionWords,
            "vad|hur|varför|när|var|vem|vilken|vilket|vilka|vems|hurdan\
             |varifrån|vart|varav|varmed|vartill",
        ),
        tail_word_list(
            Category::Exclamations,
            "wow|fantastiskt|underbart|härligt|otroligt|jättebra|toppen|superbra\
             |kanon|grymt|perfekt|lysande|strålande|utmärkt|brilliant|fenomenalt",
        ),
        quotation_list(
            "sa|säger|berättade|nämnde|frågade|svarade|påstod|menade\
             |förklarade|beskrev|uttryckte|konstaterade|påpekade",
            "att",
        ),
        word_list(Category::Conjunctions, SV_CONJUNCTIONS),
    ]
}

fn english_specs() -> Vec<CategorySpec> {
    vec![
        tail_word_list(
            Category::QuestionWords,
            "what|how|why|when|where|who|which|whose|whom",
        ),
        tail_word_list(
            Category::Exclamations,
            "wow|amazing|great|awesome|excellent|fantastic|terrific|wonderful|brilliant",
        ),
        quotation_list(
            "said|says|told|mentioned|asked|answered|claimed|meant\
             |explained|described|expressed|stated|pointed out",
            "that",
        ),
        word_list(Category::Conjunctions, EN_CONJUNCTIONS),
    ]
}

fn build_vocabulary(
    tag: &'static str,
    display_name: &'static str,
    specs: Vec<CategorySpec>,
    conjunctions: &str,
) -> Result<Vocabulary, regex::Error> {
    let mut categories = Vec::with_capacity(specs.len());
    for spec in specs {
        categories.push((spec.category, Regex::new(&spec.pattern)?));
    }
    let conjunction_spacing = Regex::new(&format!(r"(?i)\s+({conjunctions})\s+"))?;
    Ok(Vocabulary {
        tag,
        display_name,
        categories,
        conjunction_spacing,
    })
}

fn build_tables() -> Result<Vec<Vocabulary>, regex::Error> {
    Ok(vec![
        build_vocabulary("sv-SE", "Svenska", swedish_specs(), SV_CONJUNCTIONS)?,
        build_vocabulary("en-US", "English (US)", english_specs(), EN_CONJUNCTIONS)?,
    ])
}

#[allow(clippy::expect_used)] // Static patterns, exercised by tests
static TABLES: Lazy<Vec<Vocabulary>> =
    Lazy::new(|| build_tables().expect("static vocabulary patterns compile"));

/// All registered locales, selector order
pub fn all() -> &'static [Vocabulary] {
    &TABLES
}

/// Table for a locale tag, falling back to [`DEFAULT_LOCALE`] for
/// unrecognized tags
#[must_use]
pub fn lookup(tag: &str) -> &'static Vocabulary {
    TABLES
        .iter()
        .find(|v| v.tag == tag)
        .or_else(|| TABLES.iter().find(|v| v.tag == DEFAULT_LOCALE))
        .unwrap_or(&TABLES[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_compile() {
        let tables = build_tables().unwrap();
        assert_eq!(tables.len(), 2);
    }

    #[test]
    fn test_lookup_known_tags() {
        assert_eq!(lookup("sv-SE").tag, "sv-SE");
        assert_eq!(lookup("en-US").tag, "en-US");
    }

    #[test]
    fn test_lookup_falls_back_to_default() {
        assert_eq!(lookup("de-DE").tag, DEFAULT_LOCALE);
        assert_eq!(lookup("").tag, DEFAULT_LOCALE);
    }

    #[test]
    fn test_english_is_subset_of_swedish_categories() {
        let en = lookup("en-US");
        let sv = lookup("sv-SE");
        for (category, _) in en.categories() {
            assert!(
                sv.category(*category).is_some(),
                "Swedish table missing {category:?}"
            );
        }
        assert!(en.category(Category::Numbers).is_none());
        assert!(en.category(Category::Emotions).is_none());
    }

    #[test]
    fn test_question_words_anchor_to_end() {
        let re = lookup("en-US").category(Category::QuestionWords).unwrap();
        assert!(re.is_match("tell me what time it is"));
        // Terminal punctuation after the question word blocks the match
        assert!(!re.is_match("what? yes"));
        assert!(!re.is_match("where did it go."));
    }

    #[test]
    fn test_question_words_match_last_occurrence_to_end() {
        let re = lookup("en-US").category(Category::QuestionWords).unwrap();
        let m = re.find("what I mean is who goes there").unwrap();
        assert_eq!(m.as_str(), "what I mean is who goes there");
    }

    #[test]
    fn test_swedish_dates_case_insensitive() {
        let re = lookup("sv-SE").category(Category::Dates).unwrap();
        assert!(re.is_match("på Måndag"));
        assert!(re.is_match("i JANUARI"));
    }

    #[test]
    fn test_conjunction_spacing_requires_whitespace() {
        let re = lookup("en-US").conjunction_spacing();
        assert!(re.is_match("bread and butter"));
        // No surrounding whitespace, no match
        assert!(!re.is_match("android"));
        assert!(!re.is_match("and then"));
    }

    #[test]
    fn test_swedish_table_order_ends_with_conjunctions() {
        let sv = lookup("sv-SE");
        let order: Vec<Category> = sv.categories().map(|(c, _)| *c).collect();
        assert_eq!(order.first(), Some(&Category::Numbers));
        assert_eq!(order.last(), Some(&Category::Conjunctions));
    }
}
