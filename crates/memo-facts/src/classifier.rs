/// Replies longer than this many words are never retained.
pub const DEFAULT_MAX_WORDS: usize = 100;

/// Space-padded phrases that suggest a statement of fact: copulas, causal
/// connectives, definitional phrases, relationship verbs and hedging adverbs.
const FACT_MARKERS: &[&str] = &[
    // definitions
    " is ", " are ", " was ", " were ", " means ", " stands for ", " used to ",
    " include ", " such as ", " examples ", " definition ", " important ",
    " consists of ", " helps ", " allows ", " can be ", " typically ",
    " commonly ", " usually ", " consists ", " refers to ", " characteristics ",
    " types ", " consist of ", " based on ", " requires ", " needs ",
    " must ", " should ", " will ", " has ", " have ", " had ",
    // relationships
    " connects ", " integrates ", " interacts ", " communicates ",
    " depends on ", " relies on ", " uses ", " implements ",
    // properties
    " property ", " attribute ", " feature ", " capability ",
    " functionality ", " behavior ", " structure ", " architecture ",
    // actions
    " performs ", " executes ", " processes ", " handles ",
    " manages ", " controls ", " operates ", " functions ",
    // states
    " state ", " status ", " condition ", " mode ",
    " configuration ", " setting ", " parameter ",
    // connectives and hedges
    " because ", " since ", " as ", " due to ", " therefore ", " thus ",
    " in fact ", " actually ", " indeed ", " specifically ", " particularly ",
    " especially ", " notably ", " importantly ", " significantly ",
    " primarily ", " mainly ", " mostly ", " largely ", " generally ",
    " frequently ", " often ", " always ", " never ", " sometimes ",
    " occasionally ", " rarely ",
];

/// Domain nouns matched as plain substrings.
const DOMAIN_TERMS: &[&str] = &[
    // software
    "api", "database", "server", "client", "protocol", "interface",
    "function", "method", "class", "object", "variable", "constant",
    "module", "package", "library", "framework", "architecture",
    "system", "application", "service", "component", "feature",
    // film and production
    "movie", "film", "character", "plot", "story", "director",
    "actor", "actress", "scene", "sequence", "theme", "genre",
    "cinema", "cinematic", "visual", "special effects", "soundtrack",
    "score", "editing", "cinematography", "production", "writer",
    "screenplay", "script", "dialogue", "monologue", "performance",
    "acting", "role", "protagonist", "antagonist", "supporting", "cast",
    "crew", "budget", "box office", "revenue", "release", "premiere",
    "theater", "audience", "review", "critic", "rating", "award",
    "nomination", "academy", "oscar", "golden globe", "bafta", "cannes",
    "venice", "berlin", "sundance", "tribeca", "independent", "studio",
    "company", "distributor", "marketing", "promotion", "trailer",
    "teaser", "poster", "artwork", "design", "concept", "development",
    "pre-production", "post-production", "sound", "music",
    "visual effects", "stunts", "action", "drama", "comedy", "thriller",
    "horror", "sci-fi", "fantasy", "romance", "documentary", "animation",
    "live action", "3d", "imax", "format", "resolution", "aspect ratio",
    "song", "sound design", "mixing", "color", "grading",
];

/// Why a reply was (or was not) retained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub marker: Option<&'static str>,
    pub term: Option<&'static str>,
    pub words: usize,
    pub retained: bool,
}

/// Cheap fact detector: a marker phrase or domain term, within a word budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FactClassifier {
    max_words: usize,
}

impl Default for FactClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORDS)
    }
}

impl FactClassifier {
    pub fn new(max_words: usize) -> Self {
        Self { max_words }
    }

    pub fn max_words(&self) -> usize {
        self.max_words
    }

    pub fn is_fact(&self, text: &str) -> bool {
        self.classify(text).retained
    }

    pub fn classify(&self, text: &str) -> Classification {
        let lower = text.to_lowercase();
        let marker = FACT_MARKERS.iter().copied().find(|m| lower.contains(m));
        let term = DOMAIN_TERMS.iter().copied().find(|t| lower.contains(t));
        let words = text.split_whitespace().count();

        Classification {
            marker,
            term,
            words,
            retained: (marker.is_some() || term.is_some()) && words <= self.max_words,
        }
    }
}

/// [`FactClassifier::is_fact`] with the default word ceiling.
pub fn is_fact(text: &str) -> bool {
    FactClassifier::default().is_fact(text)
}
